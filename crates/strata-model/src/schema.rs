//! Schema registry
//!
//! Every versioned entity type is described once by a [`TypeSchema`]: its
//! placement in the ownership tree, its content fields (copied verbatim into
//! snapshots), its cross-reference fields (resolved indirectly) and its child
//! collections. Descriptors are validated when the [`SchemaRegistry`] is
//! built and cached for the lifetime of the registry.
//!
//! # Example
//!
//! ```rust
//! use strata_model::{Layout, SchemaRegistry, TypeSchema, ValueKind};
//!
//! let registry = SchemaRegistry::builder()
//!     .register(
//!         TypeSchema::root("Song")
//!             .content("title", ValueKind::Text)
//!             .collection("tracks", "Track", Layout::List),
//!     )
//!     .register(TypeSchema::child("Track", "Song", "tracks").content("name", ValueKind::Text))
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.get("Track").is_ok());
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Kind of an immutable content value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Key type of a keyed child collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Keyed by an immutable value
    Value(ValueKind),
    /// Keyed by another entity of the named type
    Entity(String),
}

/// Storage layout of a child collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Unordered membership, children carry no key
    Set,
    /// Ordered by an `i64` ordinal key
    List,
    /// Keyed by a value or an entity
    Map(KeyKind),
}

/// Ownership role of an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Tree anchor, no owner
    Root,
    /// Member of a [`Layout::Set`] collection
    Child,
    /// Member of a [`Layout::Map`] collection
    KeyedChild,
    /// Member of a [`Layout::List`] collection
    IndexedChild,
}

/// Where a type sits in the ownership tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Root,
    Child {
        /// Owner type name
        owner: String,
        /// Collection field of the owner holding this type
        collection: String,
    },
}

/// Content field descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentField {
    pub name: String,
    pub kind: ValueKind,
}

/// Cross-reference field descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceField {
    pub name: String,
    /// Type name of the referenced entity
    pub target: String,
}

/// Child collection descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionField {
    pub name: String,
    /// Type name of the child entities
    pub element: String,
    pub layout: Layout,
}

/// Kind of one declared construction parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Owner entity of the named type
    Owner(String),
    /// Collection key
    Key(KeyKind),
    /// List ordinal
    Ordinal,
}

/// Descriptor of one entity type
///
/// Built with the consuming builder methods and validated by
/// [`SchemaRegistryBuilder::build`]. Field slots are positional: the n-th
/// declared content field is content slot n of every entity of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    name: String,
    placement: Placement,
    content: Vec<ContentField>,
    references: Vec<ReferenceField>,
    collections: Vec<CollectionField>,
    kind: EntityKind,
}

impl TypeSchema {
    /// Describe a root type
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placement: Placement::Root,
            content: Vec::new(),
            references: Vec::new(),
            collections: Vec::new(),
            kind: EntityKind::Root,
        }
    }

    /// Describe a child type stored in `owner.collection`
    #[must_use]
    pub fn child(
        name: impl Into<String>,
        owner: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            placement: Placement::Child {
                owner: owner.into(),
                collection: collection.into(),
            },
            content: Vec::new(),
            references: Vec::new(),
            collections: Vec::new(),
            // Resolved from the owner's collection layout at build time
            kind: EntityKind::Child,
        }
    }

    /// Declare a content field
    #[must_use]
    pub fn content(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.content.push(ContentField {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare a cross-reference field
    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.references.push(ReferenceField {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    /// Declare a child collection
    #[must_use]
    pub fn collection(
        mut self,
        name: impl Into<String>,
        element: impl Into<String>,
        layout: Layout,
    ) -> Self {
        self.collections.push(CollectionField {
            name: name.into(),
            element: element.into(),
            layout,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn content_fields(&self) -> &[ContentField] {
        &self.content
    }

    #[inline]
    #[must_use]
    pub fn reference_fields(&self) -> &[ReferenceField] {
        &self.references
    }

    #[inline]
    #[must_use]
    pub fn collection_fields(&self) -> &[CollectionField] {
        &self.collections
    }

    /// Slot of a content field
    #[must_use]
    pub fn content_slot(&self, field: &str) -> Option<usize> {
        self.content.iter().position(|f| f.name == field)
    }

    /// Slot of a cross-reference field
    #[must_use]
    pub fn reference_slot(&self, field: &str) -> Option<usize> {
        self.references.iter().position(|f| f.name == field)
    }

    /// Slot of a child collection
    #[must_use]
    pub fn collection_slot(&self, field: &str) -> Option<usize> {
        self.collections.iter().position(|f| f.name == field)
    }

    /// Owner type name, `None` for roots
    #[must_use]
    pub fn owner_type(&self) -> Option<&str> {
        match &self.placement {
            Placement::Root => None,
            Placement::Child { owner, .. } => Some(owner),
        }
    }

    /// Declared construction parameters, in order
    #[must_use]
    pub fn construction_parameter_types(&self, registry: &SchemaRegistry) -> Vec<ParamKind> {
        let Placement::Child { owner, collection } = &self.placement else {
            return Vec::new();
        };
        let mut params = vec![ParamKind::Owner(owner.clone())];
        let layout = registry
            .get(owner)
            .ok()
            .and_then(|o| {
                o.collection_slot(collection)
                    .map(|slot| o.collections[slot].layout.clone())
            });
        match layout {
            Some(Layout::List) => params.push(ParamKind::Ordinal),
            Some(Layout::Map(key)) => params.push(ParamKind::Key(key)),
            Some(Layout::Set) | None => {}
        }
        params
    }

    fn field_names(&self) -> impl Iterator<Item = &str> {
        self.content
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.references.iter().map(|f| f.name.as_str()))
            .chain(self.collections.iter().map(|f| f.name.as_str()))
    }
}

/// Schema violations, raised once while building a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Type registered twice
    #[error("type '{0}' is registered twice")]
    DuplicateType(String),

    /// Field name used twice within one type
    #[error("type '{type_name}' declares field '{field}' twice")]
    DuplicateField { type_name: String, field: String },

    /// Lookup or declaration names a type that is not registered
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// Child collection holds a type that is not a child placed in it
    #[error("collection '{type_name}.{field}' holds '{element}', which is not an entity owned by that collection")]
    NonEntityCollection {
        type_name: String,
        field: String,
        element: String,
    },

    /// Child placement names an owner collection that does not exist
    #[error("type '{type_name}' is placed in '{owner}.{collection}', which is not a collection")]
    UnknownCollection {
        type_name: String,
        owner: String,
        collection: String,
    },
}

/// Validated, immutable set of type descriptors
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: IndexMap<String, Arc<TypeSchema>>,
}

impl SchemaRegistry {
    /// Start building a registry
    #[inline]
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Cached descriptor of a type
    ///
    /// # Errors
    /// Returns [`SchemaError::UnknownType`] if the type is not registered
    pub fn get(&self, type_name: &str) -> Result<&Arc<TypeSchema>, SchemaError> {
        self.types
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Collects descriptors and validates them together
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    pending: Vec<TypeSchema>,
}

impl SchemaRegistryBuilder {
    /// Add a type descriptor
    #[must_use]
    pub fn register(mut self, schema: TypeSchema) -> Self {
        self.pending.push(schema);
        self
    }

    /// Validate every descriptor and freeze the registry
    ///
    /// # Errors
    /// Returns the first [`SchemaError`] found
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut by_name: IndexMap<String, TypeSchema> = IndexMap::new();
        for schema in self.pending {
            if by_name.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateType(schema.name));
            }
            let mut seen = HashSet::new();
            for field in schema.field_names() {
                if !seen.insert(field) {
                    return Err(SchemaError::DuplicateField {
                        type_name: schema.name.clone(),
                        field: field.to_string(),
                    });
                }
            }
            by_name.insert(schema.name.clone(), schema);
        }

        let mut kinds = Vec::with_capacity(by_name.len());
        for schema in by_name.values() {
            validate_fields(schema, &by_name)?;
            kinds.push(resolve_kind(schema, &by_name)?);
        }

        let types = by_name
            .into_iter()
            .zip(kinds)
            .map(|((name, mut schema), kind)| {
                schema.kind = kind;
                (name, Arc::new(schema))
            })
            .collect();

        let registry = SchemaRegistry { types };
        tracing::debug!(types = registry.len(), "schema registry built");
        Ok(registry)
    }
}

fn validate_fields(
    schema: &TypeSchema,
    all: &IndexMap<String, TypeSchema>,
) -> Result<(), SchemaError> {
    for reference in &schema.references {
        if !all.contains_key(&reference.target) {
            return Err(SchemaError::UnknownType(reference.target.clone()));
        }
    }

    for collection in &schema.collections {
        let element = all
            .get(&collection.element)
            .ok_or_else(|| SchemaError::UnknownType(collection.element.clone()))?;
        let owned_here = matches!(
            &element.placement,
            Placement::Child { owner, collection: field }
                if *owner == schema.name && *field == collection.name
        );
        if !owned_here {
            return Err(SchemaError::NonEntityCollection {
                type_name: schema.name.clone(),
                field: collection.name.clone(),
                element: collection.element.clone(),
            });
        }
        if let Layout::Map(KeyKind::Entity(key_type)) = &collection.layout {
            if !all.contains_key(key_type) {
                return Err(SchemaError::UnknownType(key_type.clone()));
            }
        }
    }
    Ok(())
}

fn resolve_kind(
    schema: &TypeSchema,
    all: &IndexMap<String, TypeSchema>,
) -> Result<EntityKind, SchemaError> {
    let Placement::Child { owner, collection } = &schema.placement else {
        return Ok(EntityKind::Root);
    };
    let owner_schema = all
        .get(owner)
        .ok_or_else(|| SchemaError::UnknownType(owner.clone()))?;
    let field = owner_schema
        .collections
        .iter()
        .find(|c| c.name == *collection && c.element == schema.name)
        .ok_or_else(|| SchemaError::UnknownCollection {
            type_name: schema.name.clone(),
            owner: owner.clone(),
            collection: collection.clone(),
        })?;
    Ok(match field.layout {
        Layout::Set => EntityKind::Child,
        Layout::List => EntityKind::IndexedChild,
        Layout::Map(_) => EntityKind::KeyedChild,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> TypeSchema {
        TypeSchema::root("Song")
            .content("title", ValueKind::Text)
            .collection("tracks", "Track", Layout::List)
            .collection("tags", "Tag", Layout::Map(KeyKind::Value(ValueKind::Text)))
    }

    fn track() -> TypeSchema {
        TypeSchema::child("Track", "Song", "tracks")
            .content("name", ValueKind::Text)
            .reference("link", "Track")
    }

    fn tag() -> TypeSchema {
        TypeSchema::child("Tag", "Song", "tags")
    }

    #[test]
    fn registry_resolves_kinds() {
        let registry = SchemaRegistry::builder()
            .register(song())
            .register(track())
            .register(tag())
            .build()
            .unwrap();

        assert_eq!(registry.get("Song").unwrap().kind(), EntityKind::Root);
        assert_eq!(registry.get("Track").unwrap().kind(), EntityKind::IndexedChild);
        assert_eq!(registry.get("Tag").unwrap().kind(), EntityKind::KeyedChild);
    }

    #[test]
    fn construction_parameters_follow_layout() {
        let registry = SchemaRegistry::builder()
            .register(song())
            .register(track())
            .register(tag())
            .build()
            .unwrap();

        let track = registry.get("Track").unwrap();
        assert_eq!(
            track.construction_parameter_types(&registry),
            vec![ParamKind::Owner("Song".into()), ParamKind::Ordinal]
        );
        let tag = registry.get("Tag").unwrap();
        assert_eq!(
            tag.construction_parameter_types(&registry),
            vec![
                ParamKind::Owner("Song".into()),
                ParamKind::Key(KeyKind::Value(ValueKind::Text))
            ]
        );
        assert!(registry
            .get("Song")
            .unwrap()
            .construction_parameter_types(&registry)
            .is_empty());
    }

    #[test]
    fn rejects_duplicate_type() {
        let result = SchemaRegistry::builder()
            .register(TypeSchema::root("Song"))
            .register(TypeSchema::root("Song"))
            .build();
        assert_eq!(result.unwrap_err(), SchemaError::DuplicateType("Song".into()));
    }

    #[test]
    fn rejects_duplicate_field() {
        let result = SchemaRegistry::builder()
            .register(
                TypeSchema::root("Song")
                    .content("title", ValueKind::Text)
                    .content("title", ValueKind::Int),
            )
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn rejects_non_entity_in_collection() {
        // "Other" exists but is a root, not a child placed in Song.tracks
        let result = SchemaRegistry::builder()
            .register(TypeSchema::root("Song").collection("tracks", "Other", Layout::Set))
            .register(TypeSchema::root("Other"))
            .build();
        assert!(matches!(
            result,
            Err(SchemaError::NonEntityCollection { .. })
        ));
    }

    #[test]
    fn rejects_unknown_reference_target() {
        let result = SchemaRegistry::builder()
            .register(TypeSchema::root("Song").reference("solo", "Missing"))
            .build();
        assert_eq!(result.unwrap_err(), SchemaError::UnknownType("Missing".into()));
    }

    #[test]
    fn rejects_child_without_collection() {
        let result = SchemaRegistry::builder()
            .register(TypeSchema::root("Song"))
            .register(TypeSchema::child("Track", "Song", "tracks"))
            .build();
        assert!(matches!(result, Err(SchemaError::UnknownCollection { .. })));
    }

    #[test]
    fn unknown_lookup_is_an_error() {
        let registry = SchemaRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("Song"),
            Err(SchemaError::UnknownType(_))
        ));
    }
}
