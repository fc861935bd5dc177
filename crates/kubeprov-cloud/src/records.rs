//! Raw instance records
//!
//! Each role's created instances are written to `<work_dir>/<role>_instances.json`
//! as a JSON array. Records are normalized, with the provider's own object
//! kept under `raw`.

use chrono::{DateTime, Utc};
use kubeprov_core::{ProvisionError, ProvisionedInstance, Result, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// A created instance as reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Provider-specific instance ID
    pub id: String,

    pub name: String,

    pub role: Role,

    pub private_ip: Option<String>,

    pub public_ip: Option<String>,

    pub zone: Option<String>,

    /// When the record was taken
    pub created_at: DateTime<Utc>,

    /// Provider response for this instance
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            private_ip: None,
            public_ip: None,
            zone: None,
            created_at: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_private_ip(mut self, ip: Option<String>) -> Self {
        self.private_ip = ip;
        self
    }

    pub fn with_public_ip(mut self, ip: Option<String>) -> Self {
        self.public_ip = ip;
        self
    }

    pub fn with_zone(mut self, zone: Option<String>) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn to_instance(&self) -> ProvisionedInstance {
        ProvisionedInstance {
            id: self.id.clone(),
            name: self.name.clone(),
            private_ip: self.private_ip.clone(),
            public_ip: self.public_ip.clone(),
            zone: self.zone.clone(),
            role: self.role,
        }
    }
}

/// Write `records` to `path`, replacing any previous content
pub async fn write_records(path: &Path, records: &[InstanceRecord]) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| ProvisionError::persistence(dir, e))?;
            tracing::debug!("Created directory: {}", dir.display());
        }
    }

    let content = serde_json::to_string_pretty(records)?;
    fs::write(path, content)
        .await
        .map_err(|e| ProvisionError::persistence(path, e))?;

    tracing::debug!("Saved {} instance records to {}", records.len(), path.display());
    Ok(())
}

pub async fn read_records(path: &Path) -> Result<Vec<InstanceRecord>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::read(path, e))?;
    let records: Vec<InstanceRecord> = serde_json::from_str(&content)?;
    tracing::debug!("Loaded {} instance records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_records_save_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("masters_instances.json");

        let records = vec![
            InstanceRecord::new("i-0abc", "k8s-heron-q1w2e3", Role::Master)
                .with_private_ip(Some("10.0.1.10".to_string()))
                .with_public_ip(Some("54.1.2.3".to_string()))
                .with_raw(serde_json::json!({"InstanceId": "i-0abc", "State": "running"})),
        ];

        write_records(&path, &records).await.unwrap();
        let loaded = read_records(&path).await.unwrap();
        assert_eq!(loaded, records);

        let instance = loaded[0].to_instance();
        assert_eq!(instance.name, "k8s-heron-q1w2e3");
        assert_eq!(instance.public_ip.as_deref(), Some("54.1.2.3"));
    }

    #[tokio::test]
    async fn test_missing_records_file() {
        let temp_dir = tempdir().unwrap();
        let result = read_records(&temp_dir.path().join("nodes_instances.json")).await;
        assert!(matches!(result, Err(ProvisionError::Read { .. })));
    }
}
