//! CLR type descriptors - scalar, nullable, entity and collection types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::annotations::TypedValue;

/// Member visibility as seen by the metadata layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Public,
    Internal,
    Protected,
    Private,
}

/// Primitive types that can be stored in properties and typed annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Guid,
}

impl ScalarType {
    /// Every supported scalar type
    pub const ALL: [ScalarType; 19] = [
        Self::Bool,
        Self::Char,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::String,
        Self::Bytes,
        Self::DateTime,
        Self::DateTimeOffset,
        Self::TimeSpan,
        Self::Guid,
    ];

    /// Stable tag used by the typed annotation codec
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetime_offset",
            Self::TimeSpan => "timespan",
            Self::Guid => "guid",
        }
    }

    /// Resolve a codec tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|scalar| scalar.tag() == tag)
    }

    /// Value types cannot hold null unless wrapped in [`ClrType::Nullable`]
    pub fn is_value_type(self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// The default value of a value type; reference types default to null
    pub fn default_value(self) -> Option<TypedValue> {
        TypedValue::default_for(self)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// User-defined collection class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomCollection {
    pub name: String,
    /// Parameterless constructor, if one is declared
    pub constructor: Option<Accessibility>,
    pub is_abstract: bool,
    /// Implements the mutable collection contract (add/remove/contains)
    pub is_mutable_collection: bool,
}

impl CustomCollection {
    /// A concrete collection class with a public parameterless constructor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: Some(Accessibility::Public),
            is_abstract: false,
            is_mutable_collection: true,
        }
    }

    pub fn with_constructor(mut self, constructor: Option<Accessibility>) -> Self {
        self.constructor = constructor;
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn with_mutable_collection(mut self, is_mutable: bool) -> Self {
        self.is_mutable_collection = is_mutable;
        self
    }
}

/// Declared shape of a collection-typed member
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionShape {
    /// `E[]`
    Array,
    /// `IEnumerable<E>`
    Enumerable,
    /// `ICollection<E>`
    Collection,
    /// `ISet<E>`
    Set,
    /// `IList<E>`
    List,
    /// `HashSet<E>`
    HashSet,
    /// `List<E>`
    Vec,
    Custom(CustomCollection),
}

impl CollectionShape {
    /// Interfaces are never instantiated directly
    pub fn is_interface(&self) -> bool {
        matches!(self, Self::Enumerable | Self::Collection | Self::Set | Self::List)
    }

    /// Concrete, non-abstract and constructible without arguments from outside the type
    pub fn has_public_default_constructor(&self) -> bool {
        match self {
            Self::HashSet | Self::Vec => true,
            Self::Custom(custom) => {
                custom.is_mutable_collection
                    && !custom.is_abstract
                    && custom.constructor == Some(Accessibility::Public)
            }
            _ => false,
        }
    }

    /// Whether a value of shape `source` can be stored in a member of this shape
    pub fn is_assignable_from(&self, source: &CollectionShape) -> bool {
        match self {
            Self::Enumerable => true,
            Self::Collection => match source {
                Self::Collection | Self::Set | Self::List | Self::HashSet | Self::Vec => true,
                Self::Custom(custom) => custom.is_mutable_collection,
                _ => false,
            },
            Self::Set => matches!(source, Self::Set | Self::HashSet),
            Self::List => matches!(source, Self::List | Self::Vec),
            other => other == source,
        }
    }

    /// Set semantics: adding an element twice keeps one copy
    pub fn has_set_semantics(&self) -> bool {
        matches!(self, Self::Set | Self::HashSet)
    }
}

/// A collection type together with its element entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionType {
    pub shape: CollectionShape,
    pub element: String,
}

impl CollectionType {
    pub fn new(shape: CollectionShape, element: impl Into<String>) -> Self {
        Self {
            shape,
            element: element.into(),
        }
    }

    /// `HashSet<element>`
    pub fn hash_set(element: impl Into<String>) -> Self {
        Self::new(CollectionShape::HashSet, element)
    }

    /// `List<element>`
    pub fn vec(element: impl Into<String>) -> Self {
        Self::new(CollectionShape::Vec, element)
    }

    pub fn is_assignable_from(&self, source: &CollectionType) -> bool {
        self.element == source.element && self.shape.is_assignable_from(&source.shape)
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            CollectionShape::Array => write!(f, "{}[]", self.element),
            CollectionShape::Enumerable => write!(f, "IEnumerable<{}>", self.element),
            CollectionShape::Collection => write!(f, "ICollection<{}>", self.element),
            CollectionShape::Set => write!(f, "ISet<{}>", self.element),
            CollectionShape::List => write!(f, "IList<{}>", self.element),
            CollectionShape::HashSet => write!(f, "HashSet<{}>", self.element),
            CollectionShape::Vec => write!(f, "List<{}>", self.element),
            CollectionShape::Custom(custom) => write!(f, "{}<{}>", custom.name, self.element),
        }
    }
}

/// Type of a property, field or navigation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClrType {
    Scalar(ScalarType),
    /// A value type wrapped so it can hold null
    Nullable(ScalarType),
    /// Reference to another entity class
    Entity(String),
    Collection(CollectionType),
}

impl ClrType {
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Self::Scalar(scalar) | Self::Nullable(scalar) => Some(*scalar),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Scalar(scalar) => !scalar.is_value_type(),
            Self::Nullable(_) | Self::Entity(_) | Self::Collection(_) => true,
        }
    }

    /// The nullable variant of this type; reference types are returned unchanged
    pub fn make_nullable(&self) -> ClrType {
        match self {
            Self::Scalar(scalar) if scalar.is_value_type() => Self::Nullable(*scalar),
            other => other.clone(),
        }
    }

    /// The type with any nullable wrapper removed
    pub fn underlying(&self) -> ClrType {
        match self {
            Self::Nullable(scalar) => Self::Scalar(*scalar),
            other => other.clone(),
        }
    }

    /// The value an unset member of this type holds
    pub fn default_value(&self) -> Option<TypedValue> {
        match self {
            Self::Scalar(scalar) => scalar.default_value(),
            _ => None,
        }
    }

    /// Same underlying type, ignoring nullability
    pub fn is_compatible_with(&self, other: &ClrType) -> bool {
        self.underlying() == other.underlying()
    }

    /// Whether a value of type `source` can be stored in a member of this type
    pub fn is_assignable_from(&self, source: &ClrType) -> bool {
        match (self, source) {
            (Self::Nullable(target), Self::Scalar(value)) => target == value,
            (Self::Collection(target), Self::Collection(value)) => target.is_assignable_from(value),
            (target, value) => target == value,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

impl From<ScalarType> for ClrType {
    fn from(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }
}

impl fmt::Display for ClrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{}", scalar),
            Self::Nullable(scalar) => write!(f, "{}?", scalar),
            Self::Entity(name) => f.write_str(name),
            Self::Collection(collection) => write!(f, "{}", collection),
        }
    }
}
