//! Structural validation helpers for registration inputs.

use crate::{MAX_INDEXED_FIELDS, error::ConfigError, model::entity::EntityDef};
use std::collections::BTreeSet;

pub(crate) const MAX_INDEX_NAME_LEN: usize = 200;

/// Ensure an entity path is non-empty and ASCII.
pub(crate) fn validate_entity_path(path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::EmptyEntityPath);
    }
    if !path.is_ascii() {
        return Err(ConfigError::NonAsciiEntityPath {
            path: path.to_string(),
        });
    }

    Ok(())
}

/// Ensure field names are non-empty and unique within the definition.
pub(crate) fn validate_fields(def: &EntityDef) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();

    for field in &def.fields {
        if field.name.is_empty() {
            return Err(ConfigError::EmptyFieldName {
                entity: def.path.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::DuplicateField {
                entity: def.path.clone(),
                field: field.name.clone(),
            });
        }
    }

    Ok(())
}

/// Ensure a resolved bucket name is within the maximum length.
pub(crate) fn validate_index_name_len(name: &str) -> Result<(), ConfigError> {
    if name.len() > MAX_INDEX_NAME_LEN {
        return Err(ConfigError::IndexNameTooLong {
            name: name.to_string(),
            max: MAX_INDEX_NAME_LEN,
        });
    }

    Ok(())
}

/// Ensure the materialized descriptor count stays bounded.
pub(crate) fn validate_descriptor_count(entity: &str, count: usize) -> Result<(), ConfigError> {
    if count > MAX_INDEXED_FIELDS {
        return Err(ConfigError::TooManyIndexedFields {
            entity: entity.to_string(),
            max: MAX_INDEXED_FIELDS,
        });
    }

    Ok(())
}

///
/// TESTS
///
