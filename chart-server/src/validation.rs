//! # Input Validation
//!
//! Checks applied to chart names, versions and uploaded filenames before
//! anything is written to storage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;
use crate::index::chart::{parse_chart_filename, CHART_PACKAGE_EXTENSION, PROVENANCE_EXTENSION};

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 128;

/// Maximum allowed chart name length
pub const MAX_CHART_NAME_LENGTH: usize = 250;

/// Maximum allowed filename length
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum allowed number of multipart fields in one upload
pub const MAX_MULTIPART_FIELDS: usize = 10;

static CHART_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
        .expect("Chart name regex should compile - this is a static pattern")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Input too long: {actual} exceeds maximum {max}")]
    TooLong { actual: usize, max: usize },

    #[error("Empty {field}")]
    Empty { field: &'static str },

    #[error("Invalid characters in {field}: {input}")]
    InvalidCharacters { field: &'static str, input: String },

    #[error("Not a chart package filename: {filename}")]
    NotAPackage { filename: String },
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

pub fn validate_chart_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty { field: "chart name" });
    }
    if name.len() > MAX_CHART_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: name.len(),
            max: MAX_CHART_NAME_LENGTH,
        });
    }
    if !CHART_NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidCharacters {
            field: "chart name",
            input: name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    if version.is_empty() {
        return Err(ValidationError::Empty { field: "version" });
    }
    if version.len() > MAX_VERSION_LENGTH {
        return Err(ValidationError::TooLong {
            actual: version.len(),
            max: MAX_VERSION_LENGTH,
        });
    }
    if version.contains(['/', '\\'])
        || version.contains("..")
        || version.chars().any(char::is_control)
    {
        return Err(ValidationError::InvalidCharacters {
            field: "version",
            input: version.to_string(),
        });
    }
    Ok(())
}

/// Validate an uploaded package filename and split it into name and version.
pub fn validate_package_filename(filename: &str) -> Result<(String, String), ValidationError> {
    validate_plain_filename(filename)?;
    let (name, version) =
        parse_chart_filename(filename).ok_or_else(|| ValidationError::NotAPackage {
            filename: filename.to_string(),
        })?;
    validate_chart_name(&name)?;
    validate_version(&version)?;
    Ok((name, version))
}

/// Validate an uploaded provenance filename: `<name>-<version>.tgz.prov`.
pub fn validate_provenance_filename(filename: &str) -> Result<(String, String), ValidationError> {
    let package = filename
        .strip_suffix(PROVENANCE_EXTENSION)
        .map(|stem| format!("{stem}{CHART_PACKAGE_EXTENSION}"))
        .ok_or_else(|| ValidationError::NotAPackage {
            filename: filename.to_string(),
        })?;
    validate_package_filename(&package)
}

/// Validate a filename requested from `/charts/:filename`.
pub fn validate_plain_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.is_empty() {
        return Err(ValidationError::Empty { field: "filename" });
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: filename.len(),
            max: MAX_FILENAME_LENGTH,
        });
    }
    if filename.contains(['/', '\\', '\0']) || filename.starts_with('.') {
        return Err(ValidationError::InvalidCharacters {
            field: "filename",
            input: filename.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_chart_name() {
        for ok in ["mychart", "my-chart", "chart_2", "a.b"] {
            assert!(validate_chart_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "-chart", ".hidden", "has space", "semi;colon"] {
            assert!(validate_chart_name(bad).is_err(), "{bad}");
        }
        assert!(matches!(
            validate_chart_name(&"a".repeat(MAX_CHART_NAME_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1.2.3-rc.1+build").is_ok());
        assert!(validate_version("").is_err());
        assert!(validate_version("1.0/../../etc").is_err());
        assert!(validate_version(&"1".repeat(MAX_VERSION_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_package_filename() {
        assert_eq!(
            validate_package_filename("my-chart-1.2.3.tgz").unwrap(),
            ("my-chart".to_string(), "1.2.3".to_string())
        );
        assert!(validate_package_filename("../mychart-1.0.0.tgz").is_err());
        assert!(validate_package_filename("mychart.tgz").is_err());
        assert!(validate_package_filename("mychart-1.0.0.zip").is_err());
    }

    #[test]
    fn test_validate_provenance_filename() {
        assert_eq!(
            validate_provenance_filename("mychart-0.1.0.tgz.prov").unwrap(),
            ("mychart".to_string(), "0.1.0".to_string())
        );
        assert!(validate_provenance_filename("mychart-0.1.0.tgz").is_err());
    }
}
