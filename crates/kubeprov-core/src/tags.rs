//! Instance tag parsing

use crate::error::{ProvisionError, Result};
use std::collections::BTreeMap;

/// Parse a flat `key=value` list into a map.
///
/// The value is everything after the first `=`. Entries without `=` or with an
/// empty key are rejected. A later duplicate key replaces the earlier value.
pub fn parse_tags<S: AsRef<str>>(tags: &[S]) -> Result<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for tag in tags {
        let tag = tag.as_ref();
        let (key, value) = tag.split_once('=').ok_or_else(|| {
            ProvisionError::config(format!("malformed tag '{}', expected key=value", tag))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ProvisionError::config(format!(
                "malformed tag '{}', key is empty",
                tag
            )));
        }
        parsed.insert(key.to_string(), value.trim().to_string());
    }
    Ok(parsed)
}
