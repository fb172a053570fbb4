//! Input validation utilities for registration data and storage keys
//!
//! Every value that reaches the registry or the filesystem comes from an
//! upload form, so lengths are bounded and anything used to build a path is
//! checked for traversal.

use anyhow::{anyhow, Result};
use std::path::{Component, Path, PathBuf};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for plate numbers
pub const MAX_PLATE_LENGTH: usize = 20;

/// Maximum length for driver names
pub const MAX_DRIVER_NAME_LENGTH: usize = 100;

/// Maximum length for free-form vehicle attributes (color, type)
pub const MAX_ATTRIBUTE_LENGTH: usize = 50;

/// Maximum length for storage keys and the paths recorded for them
pub const MAX_PATH_LENGTH: usize = 200;

/// Longest suffix (dot included) kept as an extension when shortening file names
pub const MAX_EXTENSION_LENGTH: usize = 10;

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum (in characters)
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    let len = value.chars().count();
    if len > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} characters (got {})",
            field_name,
            max_length,
            len
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} is required", field_name));
    }
    Ok(())
}

/// Validate a plate number. Plates key artifact paths, so separators and
/// `..` are rejected.
pub fn validate_plate_number(plate: &str) -> Result<()> {
    validate_non_empty(plate, "plate_number")?;
    validate_length(plate, MAX_PLATE_LENGTH, "plate_number")?;

    if plate.contains("..") || plate.contains('/') || plate.contains('\\') {
        return Err(anyhow!(
            "plate_number contains invalid characters (no path separators or '..' allowed)"
        ));
    }
    if plate.chars().any(char::is_control) {
        return Err(anyhow!("plate_number contains control characters"));
    }

    Ok(())
}

/// Validate driver name
pub fn validate_driver_name(name: &str) -> Result<()> {
    validate_non_empty(name, "driver_name")?;
    validate_length(name, MAX_DRIVER_NAME_LENGTH, "driver_name")
}

/// Validate an optional attribute; absent values always pass
pub fn validate_attribute(value: Option<&str>, field_name: &str) -> Result<()> {
    match value {
        Some(v) => validate_length(v, MAX_ATTRIBUTE_LENGTH, field_name),
        None => Ok(()),
    }
}

/// Trim a value and map blank input to `None`
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reduce a client supplied file name to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`, turns whitespace into `_`,
/// drops everything else and strips leading dots. Returns `None` when nothing
/// usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    // Only the final component counts; clients may send full paths
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Shorten a file name to at most `max_chars` characters, cutting the stem
/// and keeping a short extension when there is room for it.
pub fn truncate_file_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name[dot..].chars().count() <= MAX_EXTENSION_LENGTH => {
            name.split_at(dot)
        }
        _ => (name, ""),
    };
    let ext_len = ext.chars().count();
    if ext_len >= max_chars {
        return name.chars().take(max_chars).collect();
    }

    let stem: String = stem.chars().take(max_chars - ext_len).collect();
    format!("{}{}", stem, ext)
}

// ============================================================================
// Path Validation (Prevent Path Traversal)
// ============================================================================

/// Validate a relative storage key and join it onto `base_dir`
pub fn validate_path_components(path: &Path, base_dir: &Path, field_name: &str) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("{} contains invalid UTF-8", field_name))?;

    validate_non_empty(path_str, field_name)?;
    validate_length(path_str, MAX_PATH_LENGTH, field_name)?;

    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => {
                return Err(anyhow!(
                    "{} contains '..' component (path traversal attempt)",
                    field_name
                ));
            }
            _ => {
                return Err(anyhow!("{} must be a relative path", field_name));
            }
        }
    }

    Ok(base_dir.join(path))
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_plate_number() {
        assert!(validate_plate_number("ABC-1234").is_ok());
        assert!(validate_plate_number("xyz 999").is_ok());

        assert!(validate_plate_number("").is_err());
        assert!(validate_plate_number("   ").is_err());
        assert!(validate_plate_number("../etc").is_err());
        assert!(validate_plate_number("AB/12").is_err());
        assert!(validate_plate_number(&"A".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_driver_name() {
        assert!(validate_driver_name("Jamie Doe").is_ok());
        assert!(validate_driver_name("").is_err());
        assert!(validate_driver_name(&"n".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_attribute() {
        assert!(validate_attribute(None, "car_color").is_ok());
        assert!(validate_attribute(Some("blue"), "car_color").is_ok());
        assert!(validate_attribute(Some(&"x".repeat(51)), "car_color").is_err());
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(None), None);
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" red ".to_string())),
            Some("red".to_string())
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("photo.jpg"), Some("photo.jpg".to_string()));
        assert_eq!(
            sanitize_file_name("my photo (1).png"),
            Some("my_photo_1.png".to_string())
        );
        assert_eq!(
            sanitize_file_name("../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\face.jpeg"),
            Some("face.jpeg".to_string())
        );
        assert_eq!(sanitize_file_name("..."), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn test_truncate_file_name() {
        assert_eq!(truncate_file_name("face.jpg", 20), "face.jpg");

        let long = format!("{}.jpg", "a".repeat(200));
        let short = truncate_file_name(&long, 50);
        assert_eq!(short.len(), 50);
        assert!(short.ends_with(".jpg"));
        assert!(short.starts_with("aaaa"));

        // Extension too long to be worth keeping
        let odd = format!("photo.{}", "x".repeat(40));
        assert_eq!(truncate_file_name(&odd, 12), "photo.xxxxxx");

        assert_eq!(truncate_file_name("abcdef.jpg", 3), "abc");
        assert_eq!(truncate_file_name("face.jpg", 0), "");
    }

    #[test]
    fn test_validate_path_components() {
        let base = Path::new("/srv/static");

        let joined =
            validate_path_components(Path::new("qr_codes/ABC.png"), base, "key").unwrap();
        assert_eq!(joined, PathBuf::from("/srv/static/qr_codes/ABC.png"));

        assert!(validate_path_components(Path::new("../secret"), base, "key").is_err());
        assert!(validate_path_components(Path::new("/etc/passwd"), base, "key").is_err());
        assert!(validate_path_components(Path::new(""), base, "key").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.5, 0.0, 1.0, "threshold").is_ok());
        assert!(validate_range(0.0, 0.0, 1.0, "threshold").is_ok());
        assert!(validate_range(1.5, 0.0, 1.0, "threshold").is_err());
        assert!(validate_range(-0.1, 0.0, 1.0, "threshold").is_err());
    }
}
