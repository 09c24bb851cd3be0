// crates/layerconf-db/src/marshaller.rs
// ============================================================================
// Module: Entity Marshaller
// Description: Record to field-map conversion with per-field converters.
// Purpose: Remove per-entity mapping boilerplate from persistence code.
// Dependencies: crate::schema, crate::field, crate::error
// ============================================================================

//! ## Overview
//! Record types implement [`Entity`] by exposing their static schema and a
//! plain field-map view of themselves. The [`EntityMarshaller`] sits between
//! that view and storage: it checks the map against the schema and runs the
//! converters declared for each field (bucket name validation, data type
//! normalization and similar).

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::DbError;
use crate::field::FieldMap;
use crate::schema::EntitySchema;
use crate::schema::FieldConverter;

// ============================================================================
// SECTION: Entity
// ============================================================================

/// Record type persisted through an [`EntitySchema`].
pub trait Entity: Sized {
    /// Returns the static schema shared by all records of this type.
    fn schema() -> &'static EntitySchema;

    /// Returns the record as a field map keyed by logical field name.
    fn to_fields(&self) -> FieldMap;

    /// Builds a record from a field map produced by the marshaller.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when fields are missing or have the wrong type.
    fn from_fields(fields: FieldMap) -> Result<Self, DbError>;
}

// ============================================================================
// SECTION: Marshaller
// ============================================================================

/// Converts records to and from field maps for one entity type.
#[derive(Debug, Clone)]
pub struct EntityMarshaller<E> {
    /// Entity schema.
    schema: &'static EntitySchema,
    /// Converters applied on marshal, keyed by logical field.
    marshallers: BTreeMap<&'static str, FieldConverter>,
    /// Converters applied on unmarshal, keyed by logical field.
    unmarshallers: BTreeMap<&'static str, FieldConverter>,
    /// Entity type marker.
    entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for EntityMarshaller<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityMarshaller<E> {
    /// Creates a marshaller seeded with the schema's declared converters.
    #[must_use]
    pub fn new() -> Self {
        let schema = E::schema();
        let mut marshallers = BTreeMap::new();
        let mut unmarshallers = BTreeMap::new();
        for column in schema.columns() {
            if let Some(converter) = column.marshaller() {
                marshallers.insert(column.field(), converter);
            }
            if let Some(converter) = column.unmarshaller() {
                unmarshallers.insert(column.field(), converter);
            }
        }
        Self {
            schema,
            marshallers,
            unmarshallers,
            entity: PhantomData,
        }
    }

    /// Returns the entity schema.
    #[must_use]
    pub const fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Registers or replaces the marshal converter for a field.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownField`] when the field is not declared.
    pub fn add_marshaller(
        &mut self,
        field: &str,
        converter: FieldConverter,
    ) -> Result<(), DbError> {
        let field = self.schema.column(field)?.field();
        self.marshallers.insert(field, converter);
        Ok(())
    }

    /// Registers or replaces the unmarshal converter for a field.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownField`] when the field is not declared.
    pub fn add_unmarshaller(
        &mut self,
        field: &str,
        converter: FieldConverter,
    ) -> Result<(), DbError> {
        let field = self.schema.column(field)?.field();
        self.unmarshallers.insert(field, converter);
        Ok(())
    }

    /// Converts a record to a field map, applying marshal converters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the record's field map does not match the
    /// schema or a converter rejects a value.
    pub fn marshal(&self, entity: &E) -> Result<FieldMap, DbError> {
        let fields = entity.to_fields();
        for (field, _) in &fields {
            self.schema.column(field)?;
        }
        self.convert(fields, &self.marshallers)
    }

    /// Builds a record from a field map, applying unmarshal converters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when a converter rejects a value or the record
    /// cannot be built.
    pub fn unmarshal(&self, fields: FieldMap) -> Result<E, DbError> {
        let fields = self.convert(fields, &self.unmarshallers)?;
        E::from_fields(fields)
    }

    /// Checks that every declared field is present and runs converters.
    fn convert(
        &self,
        mut fields: FieldMap,
        converters: &BTreeMap<&'static str, FieldConverter>,
    ) -> Result<FieldMap, DbError> {
        for column in self.schema.columns() {
            let field = column.field();
            let value = fields.take(self.schema.table(), field)?;
            let value = match converters.get(field) {
                Some(converter) => converter(value).map_err(|message| DbError::Conversion {
                    field: field.to_string(),
                    message,
                })?,
                None => value,
            };
            fields.insert(field, value);
        }
        Ok(fields)
    }
}
