use colored::Colorize;
use kubeprov_core::config::{DEFAULT_WORK_DIR, expand_home};
use kubeprov_core::{Overrides, ProvisionError, load_request_file};
use kubeprov_inventory::{InventoryStore, SectionKind};
use std::path::{Path, PathBuf};

/// Print the inventory, or the size of each group with `summary`
pub fn show(config: Option<&Path>, overrides: &Overrides, summary: bool) -> anyhow::Result<()> {
    let path = inventory_path(config, overrides)?;
    let store = InventoryStore::new(&path);
    if !store.exists() {
        return Err(ProvisionError::InventoryNotFound(path).into());
    }
    let inventory = store.read(false)?;

    if !summary {
        print!("{}", inventory);
        return Ok(());
    }

    println!("{}", path.display().to_string().cyan());
    for section in inventory.sections() {
        if section.kind == SectionKind::Hosts {
            println!("  {:<16} {}", section.name.bold(), section.entries.len());
        }
    }
    println!("  {} host(s)", inventory.len());
    Ok(())
}

fn inventory_path(config: Option<&Path>, overrides: &Overrides) -> anyhow::Result<PathBuf> {
    let file = load_request_file(config, overrides)?;
    if let Some(path) = file.inventory_path {
        return Ok(expand_home(path));
    }
    let work_dir = match file.work_dir {
        Some(dir) => expand_home(dir),
        None => dirs::home_dir()
            .ok_or_else(|| ProvisionError::config("home directory not found, set work_dir explicitly"))?
            .join(DEFAULT_WORK_DIR),
    };
    Ok(work_dir.join("inventory").join("inventory.cfg"))
}
