use std::path::Path;

use anyhow::Result;
use ledgersync_state::LocalStore;
use ledgersync_types::entity::EntityType;

/// Execute the `check` command: validate config and open both stores.
pub fn execute(config_path: &Path) -> Result<()> {
    let loaded = super::load(config_path)?;
    println!("Config structure:  OK");

    let primary_ok = match loaded.primary() {
        Ok(store) => {
            println!("Primary store:     OK");
            for entity in EntityType::ALL {
                let collection = loaded.registry.collection_of(entity);
                println!("  {:12} {:>6} document(s) in '{}'", entity, store.count(collection), collection);
            }
            true
        }
        Err(e) => {
            println!("Primary store:     FAILED");
            println!("  {e:#}");
            false
        }
    };

    let local_ok = match loaded.local() {
        Ok(local) => {
            let mut ok = true;
            for entity in EntityType::ALL {
                if let Err(e) = local.ensure_table(&loaded.registry.table_spec(entity)) {
                    println!("  {entity}: {e}");
                    ok = false;
                }
            }
            println!("Local store:       {}", if ok { "OK" } else { "FAILED" });
            ok
        }
        Err(e) => {
            println!("Local store:       FAILED");
            println!("  {e:#}");
            false
        }
    };

    if primary_ok && local_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
