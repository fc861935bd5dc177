//! Inventory file persistence

use crate::ini;
use crate::model::Inventory;
use kubeprov_core::{ProvisionError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads and writes the inventory file at a fixed path
pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the inventory.
    ///
    /// A missing file is an empty inventory when provisioning a new cluster
    /// and an error when adding nodes to an existing one.
    pub fn read(&self, add_node: bool) -> Result<Inventory> {
        if !self.path.exists() {
            if add_node {
                return Err(ProvisionError::InventoryNotFound(self.path.clone()));
            }
            tracing::debug!(
                "Inventory {} not found, starting empty",
                self.path.display()
            );
            return Ok(Inventory::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ProvisionError::read(&self.path, e))?;
        let inventory = ini::parse(&self.path, &content)?;
        tracing::debug!(
            "Loaded inventory {} with {} hosts",
            self.path.display(),
            inventory.len()
        );
        Ok(inventory)
    }

    /// Write the inventory atomically: a temp file in the same directory is
    /// renamed over the target.
    pub fn write(&self, inventory: &Inventory) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| ProvisionError::persistence(&dir, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| ProvisionError::persistence(&dir, e))?;
        temp.write_all(ini::render(inventory).as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| ProvisionError::persistence(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| ProvisionError::persistence(&self.path, e.error))?;

        tracing::debug!(
            "Wrote inventory {} with {} hosts",
            self.path.display(),
            inventory.len()
        );
        Ok(())
    }
}
