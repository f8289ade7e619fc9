//! Flat JSON files under the data directory
//!
//! Each file is read whole and rewritten whole on every mutation. There is a
//! single writer process, so no locking; writes go through a temp file and an
//! atomic rename so a crash never leaves a truncated file behind.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

/// Load a JSON document, treating a missing or unparseable file as empty
pub fn load_json<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }

    match serde_json::from_str(&content) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unparseable JSON file, treating as empty");
            Ok(T::default())
        }
    }
}

/// Save a JSON document atomically
pub fn save_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    // Ensure parent directory exists
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    // Write to temp file in same directory (for atomic rename)
    let mut temp = NamedTempFile::new_in(parent)?;
    let json = serde_json::to_string_pretty(value)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let loaded: Vec<String> = load_json(&temp_dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/ids.json");

        save_json(&path, &vec!["1:10".to_string(), "2:20".to_string()]).unwrap();
        let loaded: Vec<String> = load_json(&path).unwrap();
        assert_eq!(loaded, vec!["1:10", "2:20"]);
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "[{\"id\": 1,").unwrap();

        let loaded: Vec<serde_json::Value> = load_json(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ids.json");

        save_json(&path, &vec![1, 2, 3]).unwrap();
        save_json(&path, &vec![4]).unwrap();

        let loaded: Vec<i64> = load_json(&path).unwrap();
        assert_eq!(loaded, vec![4]);
        // No temp files left behind
        let entries = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
