//! Module manifest (`module.json`)
//!
//! One manifest per module directory, next to the scripts it describes.
//! Identity fields are written at clone time and never rewritten; only the
//! `sync` timestamps move, and they never move backwards.

use crate::error::{Result, SyncError};
use crate::types::{ModuleType, PortalRef, ScriptLanguage, ScriptType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub manifest_version: u32,
    pub portal: PortalRef,
    pub module: ModuleIdentity,
    #[serde(default)]
    pub metadata: ModuleMetadata,
    #[serde(default)]
    pub scripts: ManifestScripts,
    pub sync: SyncTimestamps,
}

/// Identity of the module on its portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIdentity {
    pub id: u64,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_id: Option<String>,
}

/// Snapshot of module metadata taken at clone/pull time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub filename: String,
    pub language: ScriptLanguage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<ScriptEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad: Option<ScriptEntry>,
}

impl ManifestScripts {
    pub fn get(&self, script: ScriptType) -> Option<&ScriptEntry> {
        match script {
            ScriptType::Collection => self.collection.as_ref(),
            ScriptType::Ad => self.ad.as_ref(),
        }
    }

    pub fn set(&mut self, script: ScriptType, entry: Option<ScriptEntry>) {
        match script {
            ScriptType::Collection => self.collection = entry,
            ScriptType::Ad => self.ad = entry,
        }
    }

    /// Present scripts in a stable order
    pub fn entries(&self) -> impl Iterator<Item = (ScriptType, &ScriptEntry)> {
        ScriptType::ALL
            .into_iter()
            .filter_map(move |script| self.get(script).map(|entry| (script, entry)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTimestamps {
    pub cloned_at: DateTime<Utc>,
    pub last_pulled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pulled_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pushed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_committed_at: Option<DateTime<Utc>>,
}

fn later(current: DateTime<Utc>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    current.max(candidate)
}

fn later_opt(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(candidate, |c| c.max(candidate)))
}

impl SyncTimestamps {
    pub fn cloned(at: DateTime<Utc>, version: Option<u64>) -> Self {
        Self {
            cloned_at: at,
            last_pulled_at: at,
            last_pulled_version: version,
            last_pushed_at: None,
            last_committed_at: None,
        }
    }

    pub fn record_pull(&mut self, at: DateTime<Utc>, version: Option<u64>) {
        self.last_pulled_at = later(self.last_pulled_at, at);
        if let Some(version) = version {
            self.last_pulled_version = Some(self.last_pulled_version.map_or(version, |v| v.max(version)));
        }
    }

    pub fn record_push(&mut self, at: DateTime<Utc>) {
        self.last_pushed_at = later_opt(self.last_pushed_at, at);
    }

    pub fn record_commit(&mut self, at: DateTime<Utc>) {
        self.last_committed_at = later_opt(self.last_committed_at, at);
    }
}

impl ModuleManifest {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check the manifest version
    pub fn from_json(raw: &str) -> Result<Self> {
        let manifest: ModuleManifest = serde_json::from_str(raw).map_err(|e| {
            SyncError::StorageFailure(format!("Invalid module manifest: {}", e))
        })?;
        if manifest.manifest_version != MANIFEST_VERSION {
            return Err(SyncError::StorageFailure(format!(
                "Unsupported manifest version {} (expected {})",
                manifest.manifest_version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Display name if set, otherwise the module name
    pub fn title(&self) -> &str {
        self.module
            .display_name
            .as_deref()
            .unwrap_or(&self.module.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> ModuleManifest {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        ModuleManifest {
            manifest_version: MANIFEST_VERSION,
            portal: PortalRef::new("p-1", "acme.logicmonitor.com"),
            module: ModuleIdentity {
                id: 42,
                module_type: ModuleType::DataSource,
                name: "My DS".into(),
                display_name: None,
                lineage_id: Some("lin-9".into()),
            },
            metadata: ModuleMetadata {
                collect_interval: Some(300),
                ..Default::default()
            },
            scripts: ManifestScripts {
                collection: Some(ScriptEntry {
                    filename: "collection.groovy".into(),
                    language: ScriptLanguage::Groovy,
                }),
                ad: None,
            },
            sync: SyncTimestamps::cloned(at, Some(1714550400)),
        }
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["manifestVersion"], 1);
        assert_eq!(json["module"]["type"], "datasource");
        assert_eq!(json["module"]["lineageId"], "lin-9");
        assert_eq!(json["metadata"]["collectInterval"], 300);
        assert_eq!(json["scripts"]["collection"]["filename"], "collection.groovy");
        assert!(json["scripts"].get("ad").is_none());
        assert!(json["sync"].get("lastPushedAt").is_none());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let raw = sample().to_json().unwrap().replace("\"manifestVersion\": 1", "\"manifestVersion\": 7");
        let err = ModuleManifest::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("Unsupported manifest version 7"));
    }

    #[test]
    fn test_sync_timestamps_never_move_backwards() {
        let mut manifest = sample();
        let cloned = manifest.sync.cloned_at;

        manifest.sync.record_pull(cloned - Duration::days(1), Some(1));
        assert_eq!(manifest.sync.last_pulled_at, cloned);
        assert_eq!(manifest.sync.last_pulled_version, Some(1714550400));

        manifest.sync.record_push(cloned + Duration::hours(2));
        manifest.sync.record_push(cloned + Duration::hours(1));
        assert_eq!(manifest.sync.last_pushed_at, Some(cloned + Duration::hours(2)));

        manifest.sync.record_commit(cloned + Duration::hours(3));
        assert_eq!(manifest.sync.last_committed_at, Some(cloned + Duration::hours(3)));
    }

    #[test]
    fn test_title_prefers_display_name() {
        let mut manifest = sample();
        assert_eq!(manifest.title(), "My DS");
        manifest.module.display_name = Some("My Data Source".into());
        assert_eq!(manifest.title(), "My Data Source");
    }
}
