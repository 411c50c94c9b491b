//! Relationship conventions
//!
//! A relationship request names the principal and dependent entity types and, optionally, the
//! navigations on each side, the foreign key properties, the principal key properties and
//! whether the relationship is required. [`RelationshipResolver`] turns a request into a
//! [`RelationshipPlan`] by consulting what already exists in the model, then applies the plan
//! as a single unit: either the whole relationship is added or the model is left untouched.

pub mod plan;
pub mod resolver;

pub use plan::*;
pub use resolver::*;

use std::fmt;

use crate::model::EntityTypeId;

/// Shape of a relationship, as seen by the side that declared it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    OneToMany,
    ManyToOne,
    OneToOne,
}

impl RelationshipKind {
    /// One-to-one relationships use a unique foreign key
    pub fn is_unique(self) -> bool {
        matches!(self, Self::OneToOne)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneToMany => write!(f, "one-to-many"),
            Self::ManyToOne => write!(f, "many-to-one"),
            Self::OneToOne => write!(f, "one-to-one"),
        }
    }
}

/// Everything the caller said about a relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRequest {
    pub kind: RelationshipKind,
    pub principal: EntityTypeId,
    pub dependent: EntityTypeId,
    /// Reference navigation declared on the dependent
    pub navigation_to_principal: Option<String>,
    /// Navigation declared on the principal; a collection unless the relationship is one-to-one
    pub navigation_to_dependent: Option<String>,
    pub foreign_key_properties: Option<Vec<String>>,
    pub principal_key_properties: Option<Vec<String>>,
    pub required: Option<bool>,
}

impl RelationshipRequest {
    /// Declared from the principal: `Customer` has many `Order`s
    pub fn one_to_many(
        principal: EntityTypeId,
        dependent: EntityTypeId,
        collection: Option<&str>,
        reference: Option<&str>,
    ) -> Self {
        Self::new(RelationshipKind::OneToMany, principal, dependent, reference, collection)
    }

    /// Declared from the dependent: each `Order` has one `Customer`
    pub fn many_to_one(
        dependent: EntityTypeId,
        principal: EntityTypeId,
        reference: Option<&str>,
        collection: Option<&str>,
    ) -> Self {
        Self::new(RelationshipKind::ManyToOne, principal, dependent, reference, collection)
    }

    pub fn one_to_one(
        principal: EntityTypeId,
        dependent: EntityTypeId,
        navigation_to_dependent: Option<&str>,
        navigation_to_principal: Option<&str>,
    ) -> Self {
        Self::new(
            RelationshipKind::OneToOne,
            principal,
            dependent,
            navigation_to_principal,
            navigation_to_dependent,
        )
    }

    fn new(
        kind: RelationshipKind,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        navigation_to_principal: Option<&str>,
        navigation_to_dependent: Option<&str>,
    ) -> Self {
        Self {
            kind,
            principal,
            dependent,
            navigation_to_principal: navigation_to_principal.map(str::to_string),
            navigation_to_dependent: navigation_to_dependent.map(str::to_string),
            foreign_key_properties: None,
            principal_key_properties: None,
            required: None,
        }
    }

    pub fn with_foreign_key<S: AsRef<str>>(mut self, properties: &[S]) -> Self {
        self.foreign_key_properties = Some(properties.iter().map(|p| p.as_ref().to_string()).collect());
        self
    }

    pub fn with_principal_key<S: AsRef<str>>(mut self, properties: &[S]) -> Self {
        self.principal_key_properties = Some(properties.iter().map(|p| p.as_ref().to_string()).collect());
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
}
