use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use lazy_collection::{AttributeKey, AttributeSchema, SourceCollection, Value};

use crate::AppendError;

/// One materialized item: a value per attribute key.
///
/// Attributes without a value read as `None`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Row {
    values: BTreeMap<AttributeKey, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: AttributeKey, value: impl Into<Value>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn set(&mut self, key: AttributeKey, value: impl Into<Value>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: AttributeKey) -> Option<&Value> {
        self.values.get(&key)
    }
}

#[derive(Debug)]
struct SchemaSlot {
    revision: u64,
    schema: AttributeSchema,
}

/// An in-memory, append-only [`SourceCollection`].
///
/// Unlike the core collection, this source enforces the contiguity contract:
/// [`VecSource::append_at`] rejects rows that would leave a gap.
#[derive(Debug)]
pub struct VecSource {
    schema: RwLock<SchemaSlot>,
    rows: RwLock<Vec<Row>>,
}

impl VecSource {
    pub fn new(schema: AttributeSchema) -> Self {
        Self::with_rows(schema, Vec::new())
    }

    pub fn with_rows(schema: AttributeSchema, rows: Vec<Row>) -> Self {
        Self {
            schema: RwLock::new(SchemaSlot {
                revision: 0,
                schema,
            }),
            rows: RwLock::new(rows),
        }
    }

    /// Appends rows at the end, whatever the current length is.
    pub fn push_rows(&self, rows: impl IntoIterator<Item = Row>) -> usize {
        let mut guard = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(rows);
        guard.len()
    }

    /// Appends rows that must start exactly at `start_index`.
    ///
    /// Returns the new length.
    pub fn append_at(
        &self,
        start_index: usize,
        rows: impl IntoIterator<Item = Row>,
    ) -> Result<usize, AppendError> {
        let mut guard = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if start_index != guard.len() {
            return Err(AppendError::NonContiguous {
                start_index,
                len: guard.len(),
            });
        }
        guard.extend(rows);
        Ok(guard.len())
    }

    /// Drops every row at or past `len`.
    pub fn truncate(&self, len: usize) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(len);
    }

    pub fn row(&self, index: usize) -> Option<Row> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Replaces the schema and bumps the schema revision.
    pub fn set_schema(&self, schema: AttributeSchema) {
        let mut slot = self.schema.write().unwrap_or_else(PoisonError::into_inner);
        slot.schema = schema;
        slot.revision = slot.revision.wrapping_add(1);
    }
}

impl SourceCollection for VecSource {
    fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn attribute_schema(&self) -> AttributeSchema {
        self.schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .schema
            .clone()
    }

    fn read(&self, index: usize, key: AttributeKey) -> Option<Value> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)?
            .get(key)
            .cloned()
    }

    fn schema_revision(&self) -> Option<u64> {
        Some(
            self.schema
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .revision,
        )
    }
}
