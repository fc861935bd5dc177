//! Patching of `group_vars/<group>.yml` files

use kubeprov_core::{ProvisionError, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Update top-level keys of `<dir>/<group>.yml` for each group in `custom`.
///
/// An existing file is first copied to `<group>.yml.orig`. A missing file
/// starts from an empty mapping. Returns the files written.
pub fn update_group_vars(
    dir: &Path,
    custom: &BTreeMap<String, BTreeMap<String, Value>>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(custom.len());
    if custom.is_empty() {
        return Ok(written);
    }

    std::fs::create_dir_all(dir).map_err(|e| ProvisionError::persistence(dir, e))?;

    for (group, values) in custom {
        let path = dir.join(format!("{}.yml", group));
        let mut mapping = load_mapping(&path)?;

        if path.exists() {
            let backup = dir.join(format!("{}.yml.orig", group));
            std::fs::copy(&path, &backup).map_err(|e| ProvisionError::persistence(&backup, e))?;
            tracing::debug!("Backed up {} to {}", path.display(), backup.display());
        }

        for (key, value) in values {
            mapping.insert(Value::String(key.clone()), value.clone());
        }

        let content = serde_yaml::to_string(&mapping).map_err(|source| ProvisionError::Yaml {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, content).map_err(|e| ProvisionError::persistence(&path, e))?;
        tracing::info!("Updated {} ({} keys)", path.display(), values.len());
        written.push(path);
    }

    Ok(written)
}

fn load_mapping(path: &Path) -> Result<Mapping> {
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ProvisionError::read(path, e))?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ProvisionError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ProvisionError::config(format!(
            "{} must contain a YAML mapping",
            path.display()
        ))),
    }
}
