use std::path::Path;

use anyhow::Result;
use ledgersync_engine::{run_sync, SyncDirection};

/// Execute the `sync` command: pull, push, and export per entity type.
pub async fn execute(
    config_path: &Path,
    direction: Option<SyncDirection>,
    entities: &[String],
) -> Result<()> {
    let loaded = super::load(config_path)?;
    let mut options = loaded.config.sync_options();
    if let Some(direction) = direction {
        options.direction = direction;
    }
    if !entities.is_empty() {
        options.entities = super::parse_entities(entities)?;
    }

    let store = loaded.primary()?;
    let local = loaded.local()?;

    let report = run_sync(&store, &local, &loaded.registry, &options).await;
    loaded.save_primary(&store)?;

    println!("Sync for project '{}':", loaded.config.project);
    for outcome in &report.entities {
        let status = match &outcome.error {
            None => "OK".to_string(),
            Some(e) => format!("FAILED ({e})"),
        };
        println!(
            "  {:12} pulled {:>6}  pushed {:>6}  exported {:>6}  skipped {:>4}  {}",
            outcome.entity, outcome.pulled, outcome.pushed, outcome.exported, outcome.skipped, status
        );
    }
    println!("  Duration: {:.2}s", report.duration_secs);

    // Machine-readable summary
    println!("@@SYNC_JSON@@{}", serde_json::to_string(&report)?);

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} entity type(s) failed", report.failures().count())
    }
}
