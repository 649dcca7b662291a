//! Core data types shared across the synchronization layer
//!
//! Module kinds, script kinds and portal references appear in manifests,
//! bindings, recent-document entries and document planes, so they live here
//! rather than in any one component.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record identifier
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Kind of portal module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    DataSource,
    ConfigSource,
    TopologySource,
    PropertySource,
    LogSource,
    DiagnosticSource,
    EventSource,
}

impl ModuleType {
    pub const ALL: [ModuleType; 7] = [
        ModuleType::DataSource,
        ModuleType::ConfigSource,
        ModuleType::TopologySource,
        ModuleType::PropertySource,
        ModuleType::LogSource,
        ModuleType::DiagnosticSource,
        ModuleType::EventSource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::DataSource => "datasource",
            ModuleType::ConfigSource => "configsource",
            ModuleType::TopologySource => "topologysource",
            ModuleType::PropertySource => "propertysource",
            ModuleType::LogSource => "logsource",
            ModuleType::DiagnosticSource => "diagnosticsource",
            ModuleType::EventSource => "eventsource",
        }
    }

    /// Directory grouping modules of this type inside a portal directory
    pub fn plural_dir(&self) -> &'static str {
        match self {
            ModuleType::DataSource => "datasources",
            ModuleType::ConfigSource => "configsources",
            ModuleType::TopologySource => "topologysources",
            ModuleType::PropertySource => "propertysources",
            ModuleType::LogSource => "logsources",
            ModuleType::DiagnosticSource => "diagnosticsources",
            ModuleType::EventSource => "eventsources",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("Unknown module type: {}", s))
    }
}

/// Which of a module's scripts a document edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Collection script
    Collection,
    /// Active-discovery script
    Ad,
}

impl ScriptType {
    pub const ALL: [ScriptType; 2] = [ScriptType::Collection, ScriptType::Ad];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Collection => "collection",
            ScriptType::Ad => "ad",
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScriptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(ScriptType::Collection),
            "ad" => Ok(ScriptType::Ad),
            other => Err(format!("Unknown script type: {}", other)),
        }
    }
}

/// Script language, which also fixes the file extension on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    Groovy,
    Powershell,
}

impl ScriptLanguage {
    pub const ALL: [ScriptLanguage; 2] = [ScriptLanguage::Groovy, ScriptLanguage::Powershell];

    pub fn extension(&self) -> &'static str {
        match self {
            ScriptLanguage::Groovy => "groovy",
            ScriptLanguage::Powershell => "ps1",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "groovy" => Some(ScriptLanguage::Groovy),
            "ps1" => Some(ScriptLanguage::Powershell),
            _ => None,
        }
    }
}

/// Remote portal a module belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRef {
    pub id: String,
    pub hostname: String,
}

impl PortalRef {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
        }
    }
}
