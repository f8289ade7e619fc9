//! Guest auto-reply daemon
//!
//! CLI for the polling loop and for running single tasks by hand.

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use guest_autoreply::assistant::OpenAiGenerator;
use guest_autoreply::booking::{HttpBookingClient, Reservation};
use guest_autoreply::config::Config;
use guest_autoreply::dispatch::{Dispatcher, ReplyMarkers};
use guest_autoreply::filters::SensitiveTermSet;
use guest_autoreply::flags::FlagSet;
use guest_autoreply::notify;
use guest_autoreply::reservations::ReservationStore;
use guest_autoreply::scheduler::{Poller, TaskSchedule};
use guest_autoreply::triage::TriagePolicy;
use guest_autoreply::Result;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Guest auto-reply - answers guest messages on the booking platform
#[derive(Parser)]
#[command(name = "guest-autoreply")]
#[command(about = "Poll reservations and answer guest messages automatically")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling loop (sync, resync and sweep on their schedules)
    Run,

    /// Merge bookings created in the last few minutes
    Sync,

    /// Merge every booking arriving around today
    Resync,

    /// Triage and answer the latest message of every known reservation
    Sweep,

    /// Show local state: snapshot, reply markers, sensitive terms
    Status,

    /// Print the most recent booking
    Latest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Sync => cmd_sync(&config),
        Commands::Resync => cmd_resync(&config),
        Commands::Sweep => cmd_sweep(&config),
        Commands::Status => cmd_status(&config),
        Commands::Latest => cmd_latest(&config),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_run(config: &Config) -> Result<()> {
    info!("Guest auto-reply daemon starting");

    let mut schedule = TaskSchedule::new(config)?;

    with_poller(config, |poller| -> Result<()> {
        info!(
            reservations = poller.snapshot().len(),
            replied = poller.dispatcher().markers().len(),
            "Loaded local state"
        );

        // Main loop
        loop {
            for task in schedule.check_due(Utc::now()) {
                if let Err(e) = poller.run_task(task, Local::now().naive_local()) {
                    error!(%task, error = %e, "Task failed");
                }
            }

            std::thread::sleep(Duration::from_millis(config.poll_interval_ms));
        }
    })
}

fn cmd_sync(config: &Config) -> Result<()> {
    with_poller(config, |poller| {
        let added = poller.sync_new(Local::now().naive_local())?;
        println!("{} new reservations ({} known)", added, poller.snapshot().len());
        Ok(())
    })
}

fn cmd_resync(config: &Config) -> Result<()> {
    with_poller(config, |poller| {
        let added = poller.resync(Local::now().naive_local())?;
        println!("{} new reservations ({} known)", added, poller.snapshot().len());
        Ok(())
    })
}

fn cmd_sweep(config: &Config) -> Result<()> {
    with_poller(config, |poller| {
        let report = poller.sweep(Local::now().date_naive())?;
        println!(
            "checked {}, stale {}, excluded {}, ignored {}, escalated {}, already replied {}, sent {}, failed {}",
            report.checked,
            report.stale,
            report.excluded,
            report.ignored,
            report.escalated,
            report.already_replied,
            report.sent,
            report.failed
        );
        Ok(())
    })
}

fn cmd_status(config: &Config) -> Result<()> {
    let mut snapshot = ReservationStore::new(config);
    let reservations = snapshot.load()?;

    let mut markers = ReplyMarkers::new(config);
    let replied = markers.load()?;

    let sensitive = SensitiveTermSet::load(&config.sensitive_terms_file)?;

    println!("Data directory: {}", config.data_dir.display());
    println!("Reservations: {}", reservations);
    println!("Replied messages: {}", replied);
    println!("Sensitive terms: {}", sensitive.len());
    println!(
        "Booking API key: {}",
        if config.booking_api_key.is_some() { "set" } else { "missing" }
    );

    Ok(())
}

fn cmd_latest(config: &Config) -> Result<()> {
    let api = HttpBookingClient::new(config)?;
    let bookings = api.recent_reservations()?;

    match bookings.first() {
        Some(latest) => println!("{}", latest_summary(latest)),
        None => println!("Nessuna prenotazione trovata."),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Build every collaborator from `config` and hand the poller to `f`
fn with_poller<T>(config: &Config, f: impl FnOnce(&mut Poller) -> Result<T>) -> Result<T> {
    let api = HttpBookingClient::new(config)?;
    let generator = OpenAiGenerator::new(config)?;
    let notifier = notify::from_config(config)?;

    let flags = FlagSet::load(config);
    let sensitive = SensitiveTermSet::load(&config.sensitive_terms_file)?;
    info!(terms = sensitive.len(), "Loaded sensitive terms");
    let policy = TriagePolicy::new(config, sensitive, &flags);

    let mut snapshot = ReservationStore::new(config);
    snapshot.load()?;

    let mut markers = ReplyMarkers::new(config);
    markers.load()?;

    let dispatcher = Dispatcher::new(&api, &generator, &*notifier, markers);
    let mut poller = Poller::new(config, &api, snapshot, policy, flags, dispatcher);
    f(&mut poller)
}

fn latest_summary(reservation: &Reservation) -> String {
    let arrival = reservation
        .arrival
        .map(|d| d.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "Ultima prenotazione: #{} {} ({}) - arrivo: {}",
        reservation.id,
        reservation.guest_display_name(),
        reservation.apartment_name(),
        arrival
    )
}
