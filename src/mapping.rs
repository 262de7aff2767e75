//! Class mapping, type converters and name observers
//!
//! The query core never inspects entity types itself. It asks a `ClassMapping`
//! for the storage name and declared type of a property, and a `QueryObserver`
//! for the final entity and field names used in a query.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::types::{FieldType, Value};

/// Converts a raw literal into the representation a field stores
pub trait TypeConverter: Send + Sync {
    fn convert(&self, value: Value) -> Result<Value>;
}

impl<F> TypeConverter for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn convert(&self, value: Value) -> Result<Value> {
        self(value)
    }
}

/// Entity metadata needed to translate property names into storage names
pub trait ClassMapping: Send + Sync {
    /// Storage name of the entity
    fn entity_name(&self) -> &str;

    /// Storage name for a property path, e.g. `id -> _id` or `job.city -> city`
    fn field_name(&self, path: &str) -> String;

    fn is_id(&self, path: &str) -> bool;

    /// Declared type for a property path or storage field name
    fn field_type(&self, field: &str) -> Option<FieldType>;

    /// Converter registered for a property path or storage field name
    fn converter(&self, _field: &str) -> Option<Arc<dyn TypeConverter>> {
        None
    }
}

/// Mapping of a single property
#[derive(Clone)]
pub struct FieldMapping {
    /// Property path as written in code (dotted for embedded objects)
    pub property: String,
    /// Storage name, when it differs from the property path
    pub storage_name: Option<String>,
    pub field_type: FieldType,
    pub id: bool,
    pub converter: Option<Arc<dyn TypeConverter>>,
}

impl FieldMapping {
    pub fn new(property: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            property: property.into(),
            storage_name: None,
            field_type,
            id: false,
            converter: None,
        }
    }

    /// Store the property under a different name
    pub fn named(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    /// Mark the property as the entity id
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn converter(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }
}

impl fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapping")
            .field("property", &self.property)
            .field("storage_name", &self.storage_name)
            .field("field_type", &self.field_type)
            .field("id", &self.id)
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

/// Table-driven `ClassMapping`, built once per entity
#[derive(Debug, Clone)]
pub struct EntityMapping {
    entity_name: String,
    id_field: String,
    fields: Vec<FieldMapping>,
    /// property path or storage name -> index into `fields`
    index: HashMap<String, usize>,
}

impl EntityMapping {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self::with_config(entity_name, &QueryConfig::default())
    }

    pub fn with_config(entity_name: impl Into<String>, config: &QueryConfig) -> Self {
        Self {
            entity_name: entity_name.into(),
            id_field: config.id_field.clone(),
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a property mapping
    pub fn field(mut self, field: FieldMapping) -> Self {
        let position = self.fields.len();
        self.index.insert(field.property.clone(), position);
        self.fields.push(field);
        let storage = self.storage_name_of(position);
        self.index.entry(storage).or_insert(position);
        self
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    fn lookup(&self, name: &str) -> Option<&FieldMapping> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    fn storage_name_of(&self, position: usize) -> String {
        let field = &self.fields[position];
        match (&field.storage_name, field.id) {
            (Some(name), _) => name.clone(),
            (None, true) => self.id_field.clone(),
            (None, false) => field.property.clone(),
        }
    }
}

impl ClassMapping for EntityMapping {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn field_name(&self, path: &str) -> String {
        match self.index.get(path) {
            Some(&position) => self.storage_name_of(position),
            None => path.to_string(),
        }
    }

    fn is_id(&self, path: &str) -> bool {
        self.lookup(path).map(|f| f.id).unwrap_or(false)
    }

    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.lookup(field).map(|f| f.field_type)
    }

    fn converter(&self, field: &str) -> Option<Arc<dyn TypeConverter>> {
        self.lookup(field).and_then(|f| f.converter.clone())
    }
}

// ============================================================================
// Observers
// ============================================================================

/// Hook that resolves parsed entity and field tokens into storage names
pub trait QueryObserver {
    fn fire_entity(&self, entity: &str) -> String;

    fn fire_field(&self, entity: &str, field: &str) -> String;

    /// Mapping behind the names, used to type placeholders
    fn mapping(&self) -> Option<&dyn ClassMapping> {
        None
    }
}

/// Passes every name through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityObserver;

impl QueryObserver for IdentityObserver {
    fn fire_entity(&self, entity: &str) -> String {
        entity.to_string()
    }

    fn fire_field(&self, _entity: &str, field: &str) -> String {
        field.to_string()
    }
}

/// Resolves names through a class mapping
pub struct MappingObserver<'a> {
    mapping: &'a dyn ClassMapping,
}

impl<'a> MappingObserver<'a> {
    pub fn new(mapping: &'a dyn ClassMapping) -> Self {
        Self { mapping }
    }
}

impl QueryObserver for MappingObserver<'_> {
    fn fire_entity(&self, _entity: &str) -> String {
        self.mapping.entity_name().to_string()
    }

    fn fire_field(&self, _entity: &str, field: &str) -> String {
        self.mapping.field_name(field)
    }

    fn mapping(&self) -> Option<&dyn ClassMapping> {
        Some(self.mapping)
    }
}
