//! Error types for denormalization operations

use crate::{Descriptor, EntityId, SchemaName};
use thiserror::Error;

/// Errors raised while turning caller input into descriptors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Malformed reference {id}: {reason}")]
    MalformedReference { id: EntityId, reason: String },

    #[error("Ambiguous schema for collection, candidates: {candidates:?}")]
    AmbiguousSchema { candidates: Vec<SchemaName> },
}

/// Errors raised while resolving descriptors against the repository.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Entity not found: {descriptor}")]
    EntityNotFound { descriptor: Descriptor },

    #[error("Relationship cycle detected: {path:?}")]
    CycleDetected { path: Vec<Descriptor> },
}

/// Repository and cache storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("No repository source configured")]
    SourceNotConfigured,

    #[error("Invalid entity in {schema} partition: {reason}")]
    InvalidEntity { schema: SchemaName, reason: String },

    #[error("Path {path} for {schema} does not hold an object")]
    PathNotAnObject { schema: SchemaName, path: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all denormalization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DenormError {
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DenormError {
    /// True for the not-found condition callers may want to degrade on.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DenormError::Resolution(ResolutionError::EntityNotFound { .. })
        )
    }
}

/// Result type alias for denormalization operations.
pub type DenormResult<T> = Result<T, DenormError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_error_display_malformed() {
        let err = DescriptorError::MalformedReference {
            id: EntityId::new("42"),
            reason: "missing type".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Malformed reference"));
        assert!(msg.contains("42"));
        assert!(msg.contains("missing type"));
    }

    #[test]
    fn test_descriptor_error_display_ambiguous() {
        let err = DescriptorError::AmbiguousSchema {
            candidates: vec![SchemaName::new("articles"), SchemaName::new("people")],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Ambiguous schema"));
        assert!(msg.contains("articles"));
        assert!(msg.contains("people"));
    }

    #[test]
    fn test_resolution_error_display_not_found() {
        let err = ResolutionError::EntityNotFound {
            descriptor: Descriptor::new("1", "articles"),
        };
        assert_eq!(format!("{}", err), "Entity not found: articles#1");
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = format!("{}", StorageError::LockPoisoned);
        assert!(msg.contains("lock poisoned"));
    }

    #[test]
    fn test_denorm_error_from_variants() {
        let descriptor = DenormError::from(DescriptorError::AmbiguousSchema { candidates: vec![] });
        assert!(matches!(descriptor, DenormError::Descriptor(_)));

        let resolution = DenormError::from(ResolutionError::CycleDetected { path: vec![] });
        assert!(matches!(resolution, DenormError::Resolution(_)));

        let storage = DenormError::from(StorageError::SourceNotConfigured);
        assert!(matches!(storage, DenormError::Storage(_)));

        let config = DenormError::from(ConfigError::Parse {
            reason: "bad".to_string(),
        });
        assert!(matches!(config, DenormError::Config(_)));
    }

    #[test]
    fn test_is_not_found() {
        let err = DenormError::from(ResolutionError::EntityNotFound {
            descriptor: Descriptor::new("1", "articles"),
        });
        assert!(err.is_not_found());
        assert!(!DenormError::from(StorageError::LockPoisoned).is_not_found());
    }
}
