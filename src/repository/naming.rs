//! Directory and file naming for module trees
//!
//! Module names come from the portal and are untrusted: they may contain path
//! separators, characters Windows refuses, or be nothing but dots.

use crate::types::{ModuleType, ScriptLanguage, ScriptType};
use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement for characters that cannot appear in a directory name
pub const PLACEHOLDER: char = '_';

/// Name used when sanitizing leaves nothing
pub const DEFAULT_FALLBACK_NAME: &str = "unnamed-module";

/// Manifest file written into every module directory
pub const MANIFEST_FILE: &str = "module.json";

static RESERVED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("valid reserved-char regex"));

static RESERVED_DEVICE_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(con|prn|aux|nul|com[1-9]|lpt[1-9])(\..*)?$")
        .expect("valid device-name regex")
});

/// Make a module name safe to use as a single directory name
pub fn sanitize_module_name(name: &str) -> String {
    sanitize_with_fallback(name, DEFAULT_FALLBACK_NAME)
}

/// [`sanitize_module_name`] with a caller-chosen fallback
pub fn sanitize_with_fallback(name: &str, fallback: &str) -> String {
    let replaced = RESERVED_CHARS.replace_all(name, PLACEHOLDER.to_string().as_str());
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        return fallback.to_string();
    }

    if RESERVED_DEVICE_NAMES.is_match(trimmed) {
        return format!("{}{}", trimmed, PLACEHOLDER);
    }

    trimmed.to_string()
}

/// Script file name, e.g. `collection.groovy`
pub fn script_file_name(script: ScriptType, language: ScriptLanguage) -> String {
    format!("{}.{}", script.as_str(), language.extension())
}

/// Path segments from the repository root to a module directory
pub fn module_path_segments(
    portal_hostname: &str,
    module_type: ModuleType,
    module_name: &str,
    fallback: &str,
) -> [String; 3] {
    [
        sanitize_with_fallback(portal_hostname, "portal"),
        module_type.plural_dir().to_string(),
        sanitize_with_fallback(module_name, fallback),
    ]
}

/// Repository-relative path for already-sanitized segments, with a trailing slash
pub fn join_segments(segments: &[String]) -> String {
    format!("{}/", segments.join("/"))
}

/// Repository-relative module path, e.g. `acme.example.com/datasources/My DS/`
pub fn module_path(portal_hostname: &str, module_type: ModuleType, module_name: &str) -> String {
    join_segments(&module_path_segments(
        portal_hostname,
        module_type,
        module_name,
        DEFAULT_FALLBACK_NAME,
    ))
}
