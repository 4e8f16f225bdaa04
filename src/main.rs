mod cli;
mod config;
mod identity;

use std::process;

use tracing::{Level, warn};

use doctrack::archive::DirArchive;
use doctrack::notify::OutboxNotifier;
use doctrack::{Storage, Tracker};

use config::Config;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let tracker = match build_tracker(&config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to initialize: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(&config, &tracker) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Opens the store and wires in configured policies and collaborators.
fn build_tracker(config: &Config) -> Result<Tracker, String> {
    let path = config.database_path()?;
    let storage =
        Storage::open(&path).map_err(|e| format!("failed to open {}: {e}", path.display()))?;

    let policies = config.ballot_policies()?;
    for policy in policies.open_pools() {
        warn!(
            purpose = %policy.purpose,
            "no voters configured; every position taken will be counted"
        );
    }

    let mut tracker = Tracker::new(storage)
        .with_registry(config.registry()?)
        .with_policies(policies)
        .with_expiry(config.expiry_policy()?);
    if let Some(outbox) = &config.mail.outbox {
        tracker = tracker.with_notifier(OutboxNotifier::new(outbox));
    }
    if let (Some(drafts), Some(archive)) = (&config.archive.drafts_dir, &config.archive.archive_dir) {
        tracker = tracker.with_archive(DirArchive::new(drafts, archive));
    }
    Ok(tracker)
}
