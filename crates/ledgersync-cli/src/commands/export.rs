use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ledgersync_engine::delimited::write_table_file;
use ledgersync_engine::export::export_all;
use ledgersync_types::entity::EntityType;

/// Execute the `export` command: one delimited file per entity type.
pub async fn execute(config_path: &Path, output: Option<PathBuf>, entities: &[String]) -> Result<()> {
    let loaded = super::load(config_path)?;
    let dir = output
        .or_else(|| loaded.config.sync.export_dir.clone())
        .context("No output directory: pass --output or set sync.export_dir")?;
    let delimiter = loaded.config.sync_options().delimiter;
    let selected = if entities.is_empty() {
        EntityType::ALL.to_vec()
    } else {
        super::parse_entities(entities)?
    };

    let store = loaded.primary()?;
    let registry = &loaded.registry;
    for entity in selected {
        let records = export_all(&store, registry, entity)
            .await
            .with_context(|| format!("Failed to export {entity}"))?;
        let path = write_table_file(
            &dir,
            registry.table_name_of(entity),
            &records,
            registry.primary_key_of(entity),
            delimiter,
        )
        .with_context(|| format!("Failed to write {entity} export"))?;
        println!("{:12} {:>6} record(s) -> {}", entity, records.len(), path.display());
    }
    Ok(())
}
