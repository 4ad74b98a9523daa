//! General utility helper functions
//!
//! This module contains helper functions for connection string splitting,
//! container naming and human-readable sizes.

use crate::error::{BlobTourError, Result};
use regex::Regex;
use uuid::Uuid;

/// Split a connection string into its `key=value` settings, in order.
///
/// Empty segments (such as a trailing `;`) are skipped. Values may contain
/// `=`, only the first one separates key from value. Keys are compared
/// case-insensitively when checking for duplicates.
pub fn parse_connection_string(connection_string: &str) -> Result<Vec<(String, String)>> {
    let mut settings: Vec<(String, String)> = Vec::new();

    for segment in connection_string.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = segment.split_once('=').ok_or_else(|| {
            BlobTourError::connection_string(format!(
                "setting '{segment}' is not of the form name=value"
            ))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(BlobTourError::connection_string(format!(
                "setting '{segment}' has an empty name"
            )));
        }
        if settings.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
            return Err(BlobTourError::connection_string(format!(
                "setting '{key}' appears more than once"
            )));
        }

        settings.push((key.to_string(), value.trim().to_string()));
    }

    if settings.is_empty() {
        return Err(BlobTourError::connection_string("no settings found"));
    }

    Ok(settings)
}

/// Generate a collision-free container name: `<prefix>-<uuid>`
pub fn generate_container_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Validate a container name against the service's naming rules.
///
/// 3-63 characters; lowercase letters, digits and hyphens; starts and ends
/// with a letter or digit; no consecutive hyphens.
pub fn validate_container_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$")?;

    if !re.is_match(name) || name.contains("--") {
        return Err(BlobTourError::invalid_argument(format!(
            "invalid container name '{name}': use 3-63 lowercase letters, digits or single hyphens"
        )));
    }

    Ok(())
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_string() {
        let parsed = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=demo;AccountKey=a2V5==;",
        )
        .unwrap();

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], ("DefaultEndpointsProtocol".to_string(), "https".to_string()));
        assert_eq!(parsed[2], ("AccountKey".to_string(), "a2V5==".to_string()));
    }

    #[test]
    fn test_parse_connection_string_errors() {
        assert!(parse_connection_string("").is_err());
        assert!(parse_connection_string(";;").is_err());
        assert!(parse_connection_string("AccountName").is_err());
        assert!(parse_connection_string("=value").is_err());
        assert!(parse_connection_string("AccountName=a;accountname=b").is_err());
    }

    #[test]
    fn test_generate_container_name() {
        let name = generate_container_name("demoblockblobcontainer");
        assert!(name.starts_with("demoblockblobcontainer-"));
        assert!(validate_container_name(&name).is_ok());
        assert_ne!(name, generate_container_name("demoblockblobcontainer"));
    }

    #[test]
    fn test_validate_container_name() {
        assert!(validate_container_name("abc").is_ok());
        assert!(validate_container_name("demo-container-1").is_ok());

        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name("Demo").is_err());
        assert!(validate_container_name("-demo").is_err());
        assert!(validate_container_name("demo-").is_err());
        assert!(validate_container_name("de--mo").is_err());
        assert!(validate_container_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
    }
}
