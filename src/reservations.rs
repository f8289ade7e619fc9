//! Reservation snapshot - persistent JSON store of every booking observed
//!
//! Records are merged by id and never removed. Only the sync functions in
//! this module mutate the snapshot; everything else reads it.

use crate::booking::{BookingApi, Page, Reservation, SyncWindow};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Local snapshot of reservations, ordered by first observation
pub struct ReservationStore {
    snapshot_path: PathBuf,
    data: Vec<Reservation>,
    ids: HashSet<i64>,
}

impl ReservationStore {
    pub fn new(config: &Config) -> Self {
        Self {
            snapshot_path: config.snapshot_file.clone(),
            data: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Load snapshot from disk
    pub fn load(&mut self) -> Result<usize> {
        let loaded: Vec<Reservation> = store::load_json(&self.snapshot_path)?;
        self.data.clear();
        self.ids.clear();
        // A hand-edited file may carry duplicates; keep the first
        self.merge(loaded);
        Ok(self.data.len())
    }

    /// Save snapshot to disk atomically
    pub fn save(&self) -> Result<()> {
        store::save_json(&self.snapshot_path, &self.data)
    }

    /// Append records whose id is not yet known; returns how many were added
    pub fn merge(&mut self, records: Vec<Reservation>) -> usize {
        let mut added = 0;
        for record in records {
            if self.ids.insert(record.id) {
                self.data.push(record);
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn all(&self) -> &[Reservation] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pull every page of reservations in `window` and merge them into the snapshot.
///
/// Returns the number of newly observed reservations. Pages merged before a
/// transport failure stay merged and saved; the error is returned so the
/// caller can log it and wait for the next tick. An undecodable page counts
/// as an empty page.
pub fn sync(
    api: &dyn BookingApi,
    snapshot: &mut ReservationStore,
    window: &SyncWindow,
    max_pages: u32,
) -> Result<usize> {
    let mut added = 0;
    let mut page = 1;

    loop {
        if page > max_pages {
            warn!(max_pages, "Reservation listing never ran dry, stopping");
            break;
        }

        let records = match api.list_reservations(window, page) {
            Ok(Page::Records(records)) => records,
            Ok(Page::Empty) => break,
            Err(Error::Decode(e)) => {
                warn!(page, error = %e, "Undecodable reservations page, treating as empty");
                break;
            }
            Err(e) => {
                error!(page, error = %e, "Reservation sync aborted");
                return Err(e);
            }
        };

        let merged = snapshot.merge(records);
        if merged > 0 {
            snapshot.save()?;
            added += merged;
        }

        page += 1;
    }

    if added > 0 {
        info!(added, total = snapshot.len(), kind = ?window.kind, "Merged new reservations");
    } else {
        info!(kind = ?window.kind, "No new reservations found");
    }

    Ok(added)
}
