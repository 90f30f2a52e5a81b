//! Table schema and association metadata supplied by the mapping layer.

use std::collections::BTreeSet;

use crate::Error;
use crate::store::Storage;

/// A many-to-one (or one-to-one) association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsTo {
    pub name: String,
    pub related_type: String,
    pub foreign_key: String,
}

/// A one-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasMany {
    pub name: String,
    pub related_type: String,
}

/// Everything the registry needs to know about a record type's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub record_type: String,
    pub table: String,
    pub primary_key: String,
    pub fields: BTreeSet<String>,
    pub belongs_to: Vec<BelongsTo>,
    pub has_many: Vec<HasMany>,
    /// Fields stored in serialized form.
    pub serialized: BTreeSet<String>,
}

impl TableSchema {
    pub fn new(record_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            fields: BTreeSet::new(),
            belongs_to: Vec::new(),
            has_many: Vec::new(),
            serialized: BTreeSet::new(),
        }
    }

    /// Build a schema whose field list comes from the storage backend.
    pub async fn introspect<S>(store: &S, record_type: &str, table: &str) -> Result<Self, Error>
    where
        S: Storage + ?Sized,
    {
        let fields = store.field_names(table).await?;
        Ok(Self { fields, ..Self::new(record_type, table) })
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declare a many-to-one association whose foreign key is `<name>_id`.
    pub fn belongs_to(self, name: &str, related_type: &str) -> Self {
        let foreign_key = format!("{name}_id");
        self.belongs_to_with_key(name, related_type, &foreign_key)
    }

    pub fn belongs_to_with_key(mut self, name: &str, related_type: &str, foreign_key: &str) -> Self {
        self.belongs_to.push(BelongsTo {
            name: name.to_string(),
            related_type: related_type.to_string(),
            foreign_key: foreign_key.to_string(),
        });
        self
    }

    pub fn has_many(mut self, name: &str, related_type: &str) -> Self {
        self.has_many
            .push(HasMany { name: name.to_string(), related_type: related_type.to_string() });
        self
    }

    pub fn serialized(mut self, field: &str) -> Self {
        self.serialized.insert(field.to_string());
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn find_belongs_to(&self, name: &str) -> Option<&BelongsTo> {
        self.belongs_to.iter().find(|a| a.name == name)
    }

    pub fn find_has_many(&self, name: &str) -> Option<&HasMany> {
        self.has_many.iter().find(|a| a.name == name)
    }

    pub fn is_serialized(&self, field: &str) -> bool {
        self.serialized.contains(field)
    }
}
