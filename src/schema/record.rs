//! Record and field types describing an entity bound to a table

use crate::schema::naming::camel_to_snake;
use crate::schema::value::Value;
use serde::Serialize;

/// One attribute of an entity as it is declared in source
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Source attribute name, before any case transform
    pub name: String,
    /// Attribute value, `None` for an unset optional
    pub value: Option<Value>,
    /// Whether the attribute is explicitly marked as part of the primary key
    pub primary_key: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Option<Value>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            value,
            primary_key,
        }
    }
}

/// A value that can be projected onto a table row
///
/// Implementations list their attributes in declaration order. The
/// [`entity!`](crate::entity) macro generates this for plain structs.
pub trait Entity: Send + Sync {
    /// Source type name, case-transformed into the table name
    fn type_name(&self) -> &str;

    /// Attributes in declaration order
    fn attributes(&self) -> Vec<Attribute>;

    /// Maps the entity to a record, `None` when there is nothing to persist
    fn to_record(&self) -> Option<Record> {
        Some(Record::from_attributes(self.type_name(), self.attributes()))
    }
}

/// An absent entity maps to no record at all
impl<E: Entity> Entity for Option<E> {
    fn type_name(&self) -> &str {
        self.as_ref().map(|e| e.type_name()).unwrap_or_default()
    }

    fn attributes(&self) -> Vec<Attribute> {
        self.as_ref().map(|e| e.attributes()).unwrap_or_default()
    }

    fn to_record(&self) -> Option<Record> {
        self.as_ref().and_then(|e| e.to_record())
    }
}

impl<E: Entity + ?Sized> Entity for Box<E> {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn attributes(&self) -> Vec<Attribute> {
        (**self).attributes()
    }

    fn to_record(&self) -> Option<Record> {
        (**self).to_record()
    }
}

/// A field in a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Column name, already case-transformed
    pub name: String,
    pub value: Option<Value>,
    pub is_key: bool,
}

impl Field {
    /// Creates a field, transforming the source name into a column name
    pub fn new(name: &str, value: Option<Value>, is_key: bool) -> Self {
        Self {
            name: camel_to_snake(name),
            value,
            is_key,
        }
    }
}

/// Selects a subset of fields
pub type FieldSelector = fn(&Field) -> bool;

/// Selects primary key fields
pub fn key(field: &Field) -> bool {
    field.is_key
}

/// Selects non-key fields
pub fn non_key(field: &Field) -> bool {
    !field.is_key
}

/// Selects fields whose value type is accepted by the database driver
pub fn db_type(field: &Field) -> bool {
    field.value.as_ref().map(Value::is_db_type).unwrap_or(false)
}

/// Selects fields with a value
pub fn non_null(field: &Field) -> bool {
    field.value.is_some()
}

/// Filters fields keeping those accepted by every selector, in order
pub fn filter<'a>(fields: &'a [Field], selectors: &[FieldSelector]) -> Vec<&'a Field> {
    fields
        .iter()
        .filter(|field| selectors.iter().all(|select| select(field)))
        .collect()
}

/// Collects the values of a list of fields
pub fn values(fields: &[&Field]) -> Vec<Option<Value>> {
    fields.iter().map(|f| f.value.clone()).collect()
}

/// A table record: the table name plus its fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Table name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<Field>,
}

impl Record {
    /// Maps an entity into a record
    pub fn from_entity<E: Entity + ?Sized>(entity: &E) -> Option<Self> {
        entity.to_record()
    }

    /// Builds a record from a type name and its attributes
    ///
    /// When no attribute is marked as a key and the first column is named
    /// `id`, that column becomes the sole key.
    pub fn from_attributes(type_name: &str, attributes: Vec<Attribute>) -> Self {
        let mut fields: Vec<Field> = attributes
            .into_iter()
            .map(|a| Field::new(&a.name, a.value, a.primary_key))
            .collect();

        if !fields.iter().any(|f| f.is_key) {
            if let Some(first) = fields.first_mut() {
                if first.name == "id" {
                    first.is_key = true;
                }
            }
        }

        Self {
            name: camel_to_snake(type_name),
            fields,
        }
    }

    /// Marks the named fields as keys, names are given in source form
    pub fn set_key(mut self, names: &[&str]) -> Self {
        for name in names {
            let name = camel_to_snake(name);
            for field in self.fields.iter_mut().filter(|f| f.name == name) {
                field.is_key = true;
            }
        }
        self
    }

    /// Fields accepted by every selector
    pub fn select(&self, selectors: &[FieldSelector]) -> Vec<&Field> {
        filter(&self.fields, selectors)
    }
}

/// A record is its own entity, stored without re-mapping
impl Entity for Record {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> Vec<Attribute> {
        self.fields
            .iter()
            .map(|f| Attribute::new(f.name.clone(), f.value.clone(), f.is_key))
            .collect()
    }

    fn to_record(&self) -> Option<Record> {
        Some(self.clone())
    }
}
