use std::path::Path;

use anyhow::Result;
use ledgersync_state::LocalStore;

/// Execute the `history` command: list recent sync runs.
pub fn execute(config_path: &Path, limit: usize) -> Result<()> {
    let loaded = super::load(config_path)?;
    let local = loaded.local()?;
    let runs = local.recent_runs(limit)?;
    if runs.is_empty() {
        println!("No sync runs recorded.");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<5} {:12} {:7} {:10} read {:>6}  written {:>6}  skipped {:>4}  {}",
            run.id,
            run.entity,
            run.kind,
            run.status,
            run.stats.records_read,
            run.stats.records_written,
            run.stats.records_skipped,
            run.started_at
        );
        if let Some(err) = &run.stats.error_message {
            println!("       {err}");
        }
    }
    Ok(())
}
