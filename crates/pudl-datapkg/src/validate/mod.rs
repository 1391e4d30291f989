//! Descriptor conformance checks
//!
//! These check the JSON descriptors only. Conformance of the data files to
//! the declared schemas lives in [`data`].
//!
//! Checks return every problem found rather than stopping at the first, so
//! a single failed run tells the user everything that is wrong.

pub mod data;

pub use data::{validate_data, DataError, DataReport, ErrorCode, TableReport, MAX_SAMPLE_VALUES};

use crate::catalog::Schema;
use crate::package::{PackageDescriptor, PACKAGE_PROFILE};
use crate::resource::{ResourceDescriptor, CREATED_FORMAT, RESOURCE_PROFILE};
use chrono::NaiveDateTime;
use pudl_common::checksum::is_valid_hash;
use std::collections::HashSet;
use std::path::{Component, Path};

/// Names must be lowercase alphanumerics, `.`, `_` or `-`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

fn is_valid_created(created: &str) -> bool {
    NaiveDateTime::parse_from_str(created, CREATED_FORMAT).is_ok()
}

/// Problems with a single resource descriptor; empty when valid
pub fn validate_resource(resource: &ResourceDescriptor) -> Vec<String> {
    let mut errors = Vec::new();

    if !is_valid_name(&resource.name) {
        errors.push(format!("name '{}' must match ^[a-z0-9._-]+$", resource.name));
    }
    if resource.profile != RESOURCE_PROFILE {
        errors.push(format!("profile must be '{}', got '{}'", RESOURCE_PROFILE, resource.profile));
    }

    let path = Path::new(&resource.path);
    if resource.path.is_empty()
        || path.is_absolute()
        || path.components().any(|c| matches!(c, Component::ParentDir))
    {
        errors.push(format!("path '{}' must be relative to the package", resource.path));
    }

    if resource.format != "csv" || resource.mediatype != "text/csv" {
        errors.push(format!(
            "format/mediatype must be csv/text/csv, got {}/{}",
            resource.format, resource.mediatype
        ));
    }
    if !resource.encoding.eq_ignore_ascii_case("utf-8") {
        errors.push(format!("encoding must be utf-8, got '{}'", resource.encoding));
    }
    if let Some(ref compression) = resource.compression {
        if compression != "gz" || !resource.path.ends_with(".gz") {
            errors.push(format!("compression '{}' does not match path '{}'", compression, resource.path));
        }
    }
    if !is_valid_hash(&resource.hash) {
        errors.push(format!("hash '{}' is not of the form sha256:<hex>", resource.hash));
    }
    if !is_valid_created(&resource.created) {
        errors.push(format!("created '{}' is not an ISO 8601 UTC timestamp", resource.created));
    }
    if resource.sources.is_empty() {
        errors.push("sources must not be empty".to_string());
    }

    validate_schema(&resource.schema, &mut errors);

    let temporal = &resource.coverage.temporal;
    match (temporal.start_date, temporal.end_date) {
        (Some(start), Some(end)) if start > end => {
            errors.push(format!("temporal coverage starts ({}) after it ends ({})", start, end));
        }
        (Some(_), None) | (None, Some(_)) => {
            errors.push("temporal coverage must have both or neither of start_date and end_date".to_string());
        }
        _ => {}
    }

    let spatial = &resource.coverage.spatial;
    match (&spatial.state, &spatial.iso_3166_2) {
        (Some(state), Some(iso)) => {
            if state.len() != 2 || !state.chars().all(|c| c.is_ascii_uppercase()) {
                errors.push(format!("state '{}' is not a two letter code", state));
            }
            if *iso != format!("{}-{}", spatial.iso_3166_1_alpha_2, state) {
                errors.push(format!("iso_3166-2 '{}' does not match state '{}'", iso, state));
            }
        }
        (None, None) => {}
        _ => errors.push("state and iso_3166-2 must be given together".to_string()),
    }

    errors
}

fn validate_schema(schema: &Schema, errors: &mut Vec<String>) {
    if schema.fields.is_empty() {
        errors.push("schema has no fields".to_string());
    }

    let mut names = HashSet::new();
    for field in &schema.fields {
        if field.name.is_empty() {
            errors.push("schema field with empty name".to_string());
        }
        if !names.insert(field.name.as_str()) {
            errors.push(format!("duplicate schema field '{}'", field.name));
        }
    }

    for key in &schema.primary_key {
        if !names.contains(key.as_str()) {
            errors.push(format!("primary key field '{}' is not in the schema", key));
        }
    }

    for fk in &schema.foreign_keys {
        for field in &fk.fields {
            if !names.contains(field.as_str()) {
                errors.push(format!("foreign key field '{}' is not in the schema", field));
            }
        }
        if fk.fields.is_empty() || fk.fields.len() != fk.reference.fields.len() {
            errors.push(format!(
                "foreign key to '{}' maps {} fields onto {}",
                fk.reference.resource,
                fk.fields.len(),
                fk.reference.fields.len()
            ));
        }
        if fk.reference.resource.is_empty() {
            errors.push("foreign key without a referenced resource".to_string());
        }
    }
}

/// Problems with a package descriptor and every resource in it
pub fn validate_package(package: &PackageDescriptor) -> Vec<String> {
    let mut errors = Vec::new();

    if !is_valid_name(&package.name) {
        errors.push(format!("name '{}' must match ^[a-z0-9._-]+$", package.name));
    }
    if package.profile != PACKAGE_PROFILE {
        errors.push(format!("profile must be '{}', got '{}'", PACKAGE_PROFILE, package.profile));
    }
    if package.id.get_version_num() != 4 {
        errors.push(format!("id '{}' is not a version 4 UUID", package.id));
    }
    if let Some(bundle) = package.bundle_uuid {
        if bundle.get_version_num() != 4 {
            errors.push(format!("datapkg-bundle-uuid '{}' is not a version 4 UUID", bundle));
        }
    }
    if package.title.trim().is_empty() {
        errors.push("title must not be empty".to_string());
    }
    if !is_valid_created(&package.created) {
        errors.push(format!("created '{}' is not an ISO 8601 UTC timestamp", package.created));
    }
    if package.licenses.is_empty() {
        errors.push("at least one license is required".to_string());
    }
    if package.resources.is_empty() {
        errors.push("package has no resources".to_string());
    }

    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for resource in &package.resources {
        if !names.insert(resource.name.as_str()) {
            errors.push(format!("duplicate resource name '{}'", resource.name));
        }
        if !paths.insert(resource.path.as_str()) {
            errors.push(format!("duplicate resource path '{}'", resource.path));
        }
        errors.extend(
            validate_resource(resource)
                .into_iter()
                .map(|e| format!("resource '{}': {}", resource.name, e)),
        );
    }

    errors
}
