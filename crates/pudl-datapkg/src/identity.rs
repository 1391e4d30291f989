//! Bundle identity checks
//!
//! Packages generated by the same ETL run share a bundle UUID, and the bundle
//! may carry a DOI once archived. Both are checked before anything is built.

use crate::error::{DatapkgError, Result};
use regex::Regex;
use std::sync::LazyLock;
use uuid::{Uuid, Variant};

/// DOI syntax, accepting bare `10.x/y`, `doi:` and doi.org URL forms
#[allow(clippy::expect_used)]
static DOI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(doi:\s*|(?:https?://)?(?:dx\.)?doi\.org/)?(10\.\d+(\.\d+)*/.+)$").expect("valid DOI pattern")
});

/// Parse a bundle UUID, accepting only RFC 4122 version 4 identifiers
pub fn validate_bundle_uuid(package: &str, value: &str) -> Result<Uuid> {
    let invalid = || DatapkgError::InvalidBundleUuid {
        package: package.to_string(),
        value: value.to_string(),
    };

    let uuid = Uuid::parse_str(value).map_err(|_| invalid())?;
    if uuid.get_version_num() != 4 || uuid.get_variant() != Variant::RFC4122 {
        return Err(invalid());
    }
    Ok(uuid)
}

pub fn is_doi(value: &str) -> bool {
    DOI_REGEX.is_match(value.trim())
}

pub fn validate_doi(package: &str, value: &str) -> Result<()> {
    if is_doi(value) {
        Ok(())
    } else {
        Err(DatapkgError::InvalidDoi {
            package: package.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_v4_uuid() {
        let fresh = Uuid::new_v4().to_string();
        assert_eq!(validate_bundle_uuid("pudl", &fresh).unwrap().to_string(), fresh);
    }

    #[test]
    fn test_rejects_non_uuid() {
        let err = validate_bundle_uuid("pudl", "not-a-uuid").unwrap_err();
        assert!(err.is_identity());
    }

    #[test]
    fn test_rejects_other_versions() {
        // version 1
        assert!(validate_bundle_uuid("pudl", "a8098c1a-f86e-11da-bd1a-00112444be1e").is_err());
        // version nibble 4 but NCS variant
        assert!(validate_bundle_uuid("pudl", "6fa459ea-ee8a-4ca4-094e-d1e7f2cb4d5a").is_err());
        assert!(validate_bundle_uuid("pudl", "00000000-0000-0000-0000-000000000000").is_err());
    }

    #[test]
    fn test_doi_forms() {
        for doi in [
            "10.5281/zenodo.3653159",
            "doi:10.5281/zenodo.3653159",
            "https://doi.org/10.5281/zenodo.3653159",
            "http://dx.doi.org/10.1000.10/123",
        ] {
            assert!(is_doi(doi), "{doi}");
        }
    }

    #[test]
    fn test_invalid_doi() {
        assert!(!is_doi("zenodo.3653159"));
        assert!(!is_doi("10.5281"));
        assert!(validate_doi("pudl", "https://example.com/10").unwrap_err().is_identity());
    }
}
