//! Named placeholders created while parsing a query
//!
//! `Params` records every `@name` placeholder in the order it was created. Each
//! placeholder is a shared cell: the parsed condition tree holds a clone of it,
//! and binding a value through `Params` makes it visible in that tree.
//!
//! A placeholder registered with a class mapping remembers the declared type
//! and converter of its field, so a plain [`Params::bind`] coerces too.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{QueryError, Result};
use crate::mapping::{ClassMapping, TypeConverter};
use crate::types::{FieldType, Value};

/// A lazily bound placeholder value
#[derive(Clone)]
pub struct Param {
    name: Arc<str>,
    field: Option<Arc<str>>,
    /// Declared type of the field in the mapping used at registration
    field_type: Option<FieldType>,
    converter: Option<Arc<dyn TypeConverter>>,
    /// Type every bound value is converted to, from `convert(@name, type)`
    cast: Option<FieldType>,
    cell: Arc<RwLock<Option<Value>>>,
}

impl Param {
    fn new(
        name: &str,
        field: Option<&str>,
        mapping: Option<&dyn ClassMapping>,
        cast: Option<FieldType>,
    ) -> Self {
        let (field_type, converter) = match (mapping, field) {
            (Some(mapping), Some(field)) => (mapping.field_type(field), mapping.converter(field)),
            _ => (None, None),
        };
        Self {
            name: Arc::from(name),
            field: field.map(Arc::from),
            field_type,
            converter,
            cast,
            cell: Arc::new(RwLock::new(None)),
        }
    }

    /// Placeholder name, without the leading `@`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage field this placeholder is compared against, when known
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Read the bound value
    pub fn get(&self) -> Result<Value> {
        let guard = self.cell.read().unwrap_or_else(|e| e.into_inner());
        guard
            .clone()
            .ok_or_else(|| QueryError::unbound(self.name.to_string()))
    }

    pub fn is_bound(&self) -> bool {
        self.cell
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn set(&self, value: Value) {
        *self.cell.write().unwrap_or_else(|e| e.into_inner()) = Some(value);
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.get().ok() == other.get().ok()
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("field_type", &self.field_type)
            .field("has_converter", &self.converter.is_some())
            .field("cast", &self.cast)
            .field("value", &self.get().ok())
            .finish()
    }
}

/// Placeholder registry for one parsed query
#[derive(Debug, Default)]
pub struct Params {
    params: Vec<Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a placeholder and return its lazy value cell
    pub fn add(&mut self, name: &str) -> Value {
        self.push(Param::new(name, None, None, None))
    }

    /// Register a placeholder compared against a known storage field
    ///
    /// With a mapping, later binds coerce to the field's declared type.
    pub fn add_for_field(
        &mut self,
        name: &str,
        field: &str,
        mapping: Option<&dyn ClassMapping>,
    ) -> Value {
        self.push(Param::new(name, Some(field), mapping, None))
    }

    /// Register a placeholder whose bound values are converted to `cast`
    pub fn add_cast(
        &mut self,
        name: &str,
        field: &str,
        mapping: Option<&dyn ClassMapping>,
        cast: FieldType,
    ) -> Value {
        self.push(Param::new(name, Some(field), mapping, Some(cast)))
    }

    fn push(&mut self, param: Param) -> Value {
        self.params.push(param.clone());
        Value::Param(param)
    }

    /// Bind a literal to every placeholder with this name
    pub fn bind(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut found = false;
        for param in self.params.iter().filter(|p| p.name() == name) {
            param.set(prepare(param, value.clone(), None)?);
            found = true;
        }
        if !found {
            return Err(QueryError::query(format!(
                "There is no parameter named @{} in the query",
                name
            )));
        }
        Ok(())
    }

    /// Bind a literal, coercing it to the declared type of the target field
    pub fn bind_mapped(
        &self,
        name: &str,
        value: impl Into<Value>,
        mapping: &dyn ClassMapping,
    ) -> Result<()> {
        let value = value.into();
        let mut found = false;
        for param in self.params.iter().filter(|p| p.name() == name) {
            param.set(prepare(param, value.clone(), Some(mapping))?);
            found = true;
        }
        if !found {
            return Err(QueryError::query(format!(
                "There is no parameter named @{} in the query",
                name
            )));
        }
        Ok(())
    }

    /// Bind the placeholder registered at `index`
    pub fn bind_at(
        &self,
        index: usize,
        value: Value,
        mapping: Option<&dyn ClassMapping>,
    ) -> Result<()> {
        let param = self.params.get(index).ok_or(QueryError::IndexOutOfBounds {
            index,
            len: self.params.len(),
        })?;
        param.set(prepare(param, value, mapping)?);
        Ok(())
    }

    /// Placeholder names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(Param::name).collect()
    }

    /// Names of placeholders still waiting for a value
    pub fn unbound(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| !p.is_bound())
            .map(Param::name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Apply the mapping's converter or declared type, then any explicit cast
///
/// A mapping passed here wins over the one captured at registration.
fn prepare(param: &Param, value: Value, mapping: Option<&dyn ClassMapping>) -> Result<Value> {
    let value = match (mapping, param.field()) {
        (Some(mapping), Some(field)) => {
            let converter = mapping.converter(field);
            coerce(converter.as_deref(), mapping.field_type(field), value)?
        }
        _ => coerce(param.converter.as_deref(), param.field_type, value)?,
    };
    match param.cast {
        Some(cast) => cast.coerce(value),
        None => Ok(value),
    }
}

fn coerce(
    converter: Option<&dyn TypeConverter>,
    field_type: Option<FieldType>,
    value: Value,
) -> Result<Value> {
    match (converter, field_type) {
        (Some(converter), _) => converter.convert(value),
        (None, Some(field_type)) => field_type.coerce(value),
        (None, None) => Ok(value),
    }
}
