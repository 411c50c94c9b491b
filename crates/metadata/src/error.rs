//! Error types for the metadata layer
//!
//! Every failure in this crate is a configuration or programming mistake made by the caller.
//! Errors are raised synchronously at the point of violation and never retried.

use thiserror::Error;

/// Result type alias for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Broad classification of a [`MetadataError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or absent required input
    Argument,
    /// Structural violation of the model
    InvalidOperation,
    /// The requested shape cannot be supported
    NotSupported,
}

/// Errors raised while building or consuming entity metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Invalid argument '{argument}': {reason}")]
    ArgumentInvalid { argument: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("The entity type '{name}' cannot be added to the model because an entity type with the same name already exists")]
    DuplicateEntityType { name: String },

    #[error("The entity type '{entity_type}' cannot be removed because it is referenced by foreign key {foreign_key} on '{dependent}'")]
    EntityTypeInUseByForeignKey {
        entity_type: String,
        foreign_key: String,
        dependent: String,
    },

    #[error("The entity type '{entity_type}' cannot be removed because '{derived}' derives from it")]
    EntityTypeInUseByDerived { entity_type: String, derived: String },

    #[error("The entity type '{entity_type}' cannot derive from '{base_type}' because it would create an inheritance cycle")]
    CircularInheritance { entity_type: String, base_type: String },

    #[error("The property '{property}' cannot be added to '{entity_type}' because a member with the same name already exists")]
    DuplicateProperty { entity_type: String, property: String },

    #[error("The property '{property}' on '{entity_type}' cannot be removed because it is part of {usage}")]
    PropertyInUse {
        entity_type: String,
        property: String,
        usage: String,
    },

    #[error("A key on {properties} already exists on '{entity_type}'")]
    DuplicateKey { entity_type: String, properties: String },

    #[error("The key {key} on '{entity_type}' cannot be removed because it is referenced by a foreign key")]
    KeyInUse { entity_type: String, key: String },

    #[error("{kind} '{name}' was not found")]
    NotFound { kind: String, name: String },

    #[error("A foreign key on {foreign_key} referencing {principal_key} already exists")]
    DuplicateForeignKey {
        foreign_key: String,
        principal_key: String,
    },

    #[error("The foreign key {foreign_key} has {dependent_count} properties but the referenced key on '{principal}' has {principal_count}")]
    ForeignKeyCountMismatch {
        foreign_key: String,
        principal: String,
        dependent_count: usize,
        principal_count: usize,
    },

    #[error("The foreign key {foreign_key} is not compatible with the key {principal_key}: {reason}")]
    IncompatibleForeignKey {
        foreign_key: String,
        principal_key: String,
        reason: String,
    },

    #[error("The navigation '{navigation}' on '{entity_type}' cannot be configured: {reason}")]
    NavigationConflict {
        entity_type: String,
        navigation: String,
        reason: String,
    },

    #[error("The property '{property}' cannot be marked as nullable because its type '{clr_type}' cannot hold null")]
    CannotBeNullable { property: String, clr_type: String },

    #[error("The entity type '{entity_type}' has no CLR type and cannot be bound to class members")]
    NoClrType { entity_type: String },

    #[error("The backing field '{field}' configured for '{entity_type}.{property}' was not found")]
    MissingBackingField {
        entity_type: String,
        property: String,
        field: String,
    },

    #[error("The field '{field}' of type '{field_type}' cannot back '{entity_type}.{property}' of type '{property_type}'")]
    BadBackingFieldType {
        entity_type: String,
        property: String,
        field: String,
        field_type: String,
        property_type: String,
    },

    #[error("No backing field or setter was found for '{entity_type}.{property}'")]
    NoFieldOrSetter { entity_type: String, property: String },

    #[error("The class '{class}' has no property named '{property}'")]
    NoClrProperty { class: String, property: String },

    #[error("The property '{class}.{property}' has no getter")]
    NoGetter { class: String, property: String },

    #[error("The navigation '{class}.{property}' has no setter and no collection instance to add to")]
    NoSetter { class: String, property: String },

    #[error("The navigation '{class}.{navigation}' is declared as the array type '{clr_type}'; arrays cannot be mutated in place")]
    ArrayNotSupported {
        class: String,
        navigation: String,
        clr_type: String,
    },

    #[error("The navigation '{class}.{navigation}' has type '{clr_type}' which is not a mutable collection")]
    BadType {
        class: String,
        navigation: String,
        clr_type: String,
    },

    #[error("Cannot create a collection of type '{clr_type}' for navigation '{class}.{navigation}'")]
    CannotCreateType {
        class: String,
        navigation: String,
        clr_type: String,
    },

    #[error("Values of type '{type_name}' cannot be stored as typed annotations")]
    UnsupportedType { type_name: String },

    #[error("The annotation value '{value}' is not a valid '{type_tag}': {reason}")]
    InvalidAnnotationValue {
        type_tag: String,
        value: String,
        reason: String,
    },
}

impl MetadataError {
    /// Create an argument error
    pub fn argument<A: ToString, R: ToString>(argument: A, reason: R) -> Self {
        Self::ArgumentInvalid {
            argument: argument.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration<T: ToString>(message: T) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    /// Create a not-found error for the given element kind
    pub fn not_found<K: ToString, N: ToString>(kind: K, name: N) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentInvalid { .. } | Self::Configuration { .. } => ErrorKind::Argument,
            Self::ArrayNotSupported { .. }
            | Self::BadType { .. }
            | Self::UnsupportedType { .. } => ErrorKind::NotSupported,
            _ => ErrorKind::InvalidOperation,
        }
    }

    /// Errors that only surface when a collection is first mutated
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::NoSetter { .. } | Self::CannotCreateType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(MetadataError::argument("name", "empty").kind(), ErrorKind::Argument);
        assert_eq!(
            MetadataError::UnsupportedType { type_name: "Foo".into() }.kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            MetadataError::DuplicateEntityType { name: "Customer".into() }.kind(),
            ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn test_deferred_errors() {
        let err = MetadataError::NoSetter {
            class: "Customer".into(),
            property: "Orders".into(),
        };
        assert!(err.is_deferred());
        assert!(!MetadataError::not_found("Entity type", "Order").is_deferred());
    }

    #[test]
    fn test_error_messages() {
        let err = MetadataError::DuplicateEntityType { name: "Customer".into() };
        assert!(err.to_string().contains("'Customer'"));

        let err = MetadataError::not_found("Property", "Order.Total");
        assert_eq!(err.to_string(), "Property 'Order.Total' was not found");
    }
}
