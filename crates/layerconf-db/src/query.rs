// crates/layerconf-db/src/query.rs
// ============================================================================
// Module: Statement Builders
// Description: Immutable SELECT/INSERT/UPDATE/DELETE builders over schemas.
// Purpose: Render parameterized SQL from logical field names.
// Dependencies: rusqlite, crate::schema, crate::marshaller, crate::column
// ============================================================================

//! ## Overview
//! Builders are plain values: each method consumes the builder and returns a
//! new one, and rendering never mutates it, so a partially configured query
//! can be cloned and reused. Rendering resolves logical field names through
//! the schema, quotes every identifier, and numbers placeholders `?1..?n` in
//! the order arguments appear. Equality filters are rendered sorted by field
//! name so the same filter always produces the same SQL text.
//!
//! Inserts into a schema with a version sequence compute the next version
//! inside the inserting statement (`COALESCE(MAX(version), 0) + 1` over the
//! partition). Together with the write lock taken by immediate transactions,
//! two writers can never observe the same maximum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;

use crate::column::ColumnHandler;
use crate::database::Session;
use crate::encryption::Encryptor;
use crate::error::DbError;
use crate::field::FieldValue;
use crate::marshaller::Entity;
use crate::marshaller::EntityMarshaller;
use crate::schema::ColumnDef;
use crate::schema::EntitySchema;

// ============================================================================
// SECTION: Statement
// ============================================================================

/// Rendered SQL text with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text using `?N` placeholders.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<SqlValue>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    /// Returns the SQL keyword.
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// SQL text accumulator with placeholder numbering.
#[derive(Debug, Default)]
struct SqlWriter {
    /// SQL text.
    sql: String,
    /// Arguments bound so far.
    args: Vec<SqlValue>,
}

impl SqlWriter {
    /// Binds an argument and returns its placeholder.
    fn bind(&mut self, value: SqlValue) -> String {
        self.args.push(value);
        format!("?{}", self.args.len())
    }

    /// Finishes the statement.
    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }
}

/// Quotes an identifier.
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Returns the quoted column list of a schema in select order.
fn all_columns(schema: &EntitySchema) -> String {
    schema.columns().iter().map(|column| quote(column.column())).collect::<Vec<_>>().join(", ")
}

/// Resolves a field usable in a filter.
fn filter_column<'s>(schema: &'s EntitySchema, field: &str) -> Result<&'s ColumnDef, DbError> {
    let column = schema.column(field)?;
    if column.is_encrypted() {
        return Err(DbError::Invalid(format!(
            "cannot filter {} on encrypted field {field}",
            schema.table()
        )));
    }
    Ok(column)
}

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Conjunctive WHERE clause shared by select, update, delete and sub-queries.
#[derive(Debug, Clone, Default)]
struct Filter {
    /// Equality conditions keyed by logical field.
    equals: BTreeMap<&'static str, FieldValue>,
    /// Row-value membership in a sub-query.
    row_in: Vec<(Vec<&'static str>, SubQuery)>,
    /// Single-field membership in a value list.
    values_in: Vec<(&'static str, Vec<FieldValue>)>,
}

impl Filter {
    /// Appends ` WHERE ...` when any condition is set.
    fn render(&self, schema: &EntitySchema, writer: &mut SqlWriter) -> Result<(), DbError> {
        let mut clauses = Vec::new();
        for (field, value) in &self.equals {
            let column = filter_column(schema, field)?;
            let placeholder = writer.bind(value.to_sql(field)?);
            clauses.push(format!("{} = {placeholder}", quote(column.column())));
        }
        for (fields, sub_query) in &self.row_in {
            let mut columns = Vec::with_capacity(fields.len());
            for field in fields {
                columns.push(quote(filter_column(schema, field)?.column()));
            }
            if columns.len() != sub_query.width() {
                return Err(DbError::Invalid(format!(
                    "row filter on {} names {} fields but sub-query yields {} columns",
                    schema.table(),
                    columns.len(),
                    sub_query.width()
                )));
            }
            let mut nested = SqlWriter {
                sql: String::new(),
                args: std::mem::take(&mut writer.args),
            };
            sub_query.render_into(&mut nested)?;
            writer.args = nested.args;
            clauses.push(format!("({}) IN ({})", columns.join(", "), nested.sql));
        }
        for (field, values) in &self.values_in {
            let column = filter_column(schema, field)?;
            if values.is_empty() {
                clauses.push("1 = 0".to_string());
                continue;
            }
            let mut placeholders = Vec::with_capacity(values.len());
            for value in values {
                placeholders.push(writer.bind(value.to_sql(field)?));
            }
            clauses.push(format!("{} IN ({})", quote(column.column()), placeholders.join(", ")));
        }
        if !clauses.is_empty() {
            writer.sql.push_str(" WHERE ");
            writer.sql.push_str(&clauses.join(" AND "));
        }
        Ok(())
    }

    /// Describes the filter for not-found diagnostics.
    fn describe(&self) -> String {
        let mut parts: Vec<String> =
            self.equals.iter().map(|(field, value)| format!("{field}={value}")).collect();
        for (field, values) in &self.values_in {
            let list = values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            parts.push(format!("{field} in [{list}]"));
        }
        for (fields, _) in &self.row_in {
            parts.push(format!("({}) in sub-query", fields.join(",")));
        }
        if parts.is_empty() { "any filter".to_string() } else { parts.join(" and ") }
    }
}

// ============================================================================
// SECTION: Sub-Query
// ============================================================================

/// Nested SELECT used by row-value membership filters.
///
/// Either projects plain columns (`SELECT DISTINCT a, b ...`) or selects the
/// latest row per group (`SELECT a, b, MAX(v) ... GROUP BY a, b`).
#[derive(Debug, Clone)]
pub struct SubQuery {
    /// Queried schema.
    schema: &'static EntitySchema,
    /// Logical fields projected (and grouped by when `max` is set).
    columns: Vec<&'static str>,
    /// Logical field aggregated with `MAX`.
    max: Option<&'static str>,
    /// Optional filter.
    filter: Filter,
}

impl SubQuery {
    /// Selects `group_by..., MAX(max_field)` from the entity's table grouped
    /// by `group_by`.
    #[must_use]
    pub fn latest<E: Entity>(max_field: &'static str, group_by: &[&'static str]) -> Self {
        Self {
            schema: E::schema(),
            columns: group_by.to_vec(),
            max: Some(max_field),
            filter: Filter::default(),
        }
    }

    /// Selects the distinct values of `fields` from the entity's table.
    #[must_use]
    pub fn columns<E: Entity>(fields: &[&'static str]) -> Self {
        Self {
            schema: E::schema(),
            columns: fields.to_vec(),
            max: None,
            filter: Filter::default(),
        }
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn where_eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter.equals.insert(field, value.into());
        self
    }

    /// Renders the sub-query as a standalone statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when a field is unknown or not filterable.
    pub fn render(&self) -> Result<Statement, DbError> {
        let mut writer = SqlWriter::default();
        self.render_into(&mut writer)?;
        Ok(writer.finish())
    }

    /// Number of columns the sub-query yields.
    fn width(&self) -> usize {
        self.columns.len() + usize::from(self.max.is_some())
    }

    /// Writes the sub-query into a writer sharing placeholder numbering.
    fn render_into(&self, writer: &mut SqlWriter) -> Result<(), DbError> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for field in &self.columns {
            columns.push(quote(filter_column(self.schema, field)?.column()));
        }
        let table = quote(self.schema.table());
        let Some(max_field) = self.max else {
            writer.sql.push_str(&format!("SELECT DISTINCT {} FROM {table}", columns.join(", ")));
            return self.filter.render(self.schema, writer);
        };
        let max = quote(filter_column(self.schema, max_field)?.column());
        let mut selected = columns.clone();
        selected.push(format!("MAX({max})"));
        writer.sql.push_str(&format!("SELECT {} FROM {table}", selected.join(", ")));
        self.filter.render(self.schema, writer)?;
        if !columns.is_empty() {
            writer.sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Select
// ============================================================================

/// SELECT builder returning typed records.
#[derive(Debug, Clone)]
pub struct Select<E> {
    /// Marshaller used to build records from rows.
    marshaller: EntityMarshaller<E>,
    /// WHERE clause.
    filter: Filter,
    /// ORDER BY terms.
    order: Vec<(&'static str, Order)>,
    /// Optional row limit.
    limit: Option<u32>,
    /// Whether duplicate rows are collapsed.
    distinct: bool,
}

impl<E: Entity> Default for Select<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Select<E> {
    /// Starts a select over the entity's table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_marshaller(EntityMarshaller::new())
    }

    /// Starts a select using a customized marshaller.
    #[must_use]
    pub fn with_marshaller(marshaller: EntityMarshaller<E>) -> Self {
        Self {
            marshaller,
            filter: Filter::default(),
            order: Vec::new(),
            limit: None,
            distinct: false,
        }
    }

    /// Adds an equality condition; later calls for the same field replace
    /// earlier ones.
    #[must_use]
    pub fn where_eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter.equals.insert(field, value.into());
        self
    }

    /// Adds a row-value membership condition `(fields...) IN (sub_query)`.
    #[must_use]
    pub fn where_in(mut self, fields: &[&'static str], sub_query: SubQuery) -> Self {
        self.filter.row_in.push((fields.to_vec(), sub_query));
        self
    }

    /// Adds a membership condition against a literal value list.
    #[must_use]
    pub fn where_in_values<V: Into<FieldValue>>(
        mut self,
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter.values_in.push((field, values.into_iter().map(Into::into).collect()));
        self
    }

    /// Appends an ORDER BY term.
    #[must_use]
    pub fn order_by(mut self, field: &'static str, order: Order) -> Self {
        self.order.push((field, order));
        self
    }

    /// Collapses duplicate rows.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Limits the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when a field is unknown or not filterable.
    pub fn render(&self) -> Result<Statement, DbError> {
        let schema = self.marshaller.schema();
        let mut writer = SqlWriter::default();
        writer.sql.push_str(&format!(
            "SELECT {}{} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            all_columns(schema),
            quote(schema.table())
        ));
        self.filter.render(schema, &mut writer)?;
        if !self.order.is_empty() {
            let mut terms = Vec::with_capacity(self.order.len());
            for (field, order) in &self.order {
                terms.push(format!("{} {}", quote(schema.resolve(field)?), order.keyword()));
            }
            writer.sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }
        if let Some(limit) = self.limit {
            writer.sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(writer.finish())
    }

    /// Returns the first matching record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when no row matches, or any rendering,
    /// storage or conversion error.
    pub fn get_one(&self, session: &Session<'_>) -> Result<E, DbError> {
        let statement = self.render()?;
        let schema = self.marshaller.schema();
        let Some(fields) = session.query(schema, &statement)?.into_iter().next() else {
            return Err(DbError::NotFound {
                table: schema.table(),
                selector: self.filter.describe(),
            });
        };
        self.marshaller.unmarshal(fields)
    }

    /// Returns all matching records.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for rendering, storage or conversion failures.
    pub fn get_many(&self, session: &Session<'_>) -> Result<Vec<E>, DbError> {
        let statement = self.render()?;
        session
            .query(self.marshaller.schema(), &statement)?
            .into_iter()
            .map(|fields| self.marshaller.unmarshal(fields))
            .collect()
    }
}

// ============================================================================
// SECTION: Insert
// ============================================================================

/// INSERT builder returning the stored record.
#[derive(Debug, Clone)]
pub struct Insert<'e, E> {
    /// Record to insert.
    entity: &'e E,
    /// Marshaller used in both directions.
    marshaller: EntityMarshaller<E>,
}

impl<'e, E: Entity> Insert<'e, E> {
    /// Starts an insert of `entity`.
    #[must_use]
    pub fn new(entity: &'e E) -> Self {
        Self::with_marshaller(entity, EntityMarshaller::new())
    }

    /// Starts an insert using a customized marshaller.
    #[must_use]
    pub const fn with_marshaller(entity: &'e E, marshaller: EntityMarshaller<E>) -> Self {
        Self {
            entity,
            marshaller,
        }
    }

    /// Renders the statement, sealing encrypted fields.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the record is incomplete, a converter fails,
    /// encryption fails, or the schema's sequence is misconfigured.
    pub fn render(&self, encryptor: &Encryptor) -> Result<Statement, DbError> {
        let schema = self.marshaller.schema();
        let handler = ColumnHandler::new(schema, self.marshaller.marshal(self.entity)?);
        handler.validate()?;
        let mut columns: Vec<String> =
            handler.column_names(true).into_iter().map(quote).collect();
        let mut writer = SqlWriter::default();
        let mut placeholders = Vec::with_capacity(columns.len());
        for value in handler.column_values(true, encryptor)? {
            placeholders.push(writer.bind(value));
        }
        let table = quote(schema.table());
        let returning = all_columns(schema);
        let Some((sequence_field, partition)) = schema.sequence() else {
            writer.sql = format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING {returning}",
                columns.join(", "),
                placeholders.join(", ")
            );
            return Ok(writer.finish());
        };
        let sequence = schema.column(sequence_field)?;
        if !sequence.is_read_only() {
            return Err(DbError::Invalid(format!(
                "sequence field {sequence_field} of {} must be storage-assigned",
                schema.table()
            )));
        }
        let sequence_column = quote(sequence.column());
        let mut conditions = Vec::with_capacity(partition.len());
        for field in partition {
            let column = quote(filter_column(schema, field)?.column());
            let index = columns.iter().position(|name| *name == column).ok_or_else(|| {
                DbError::Invalid(format!(
                    "sequence partition field {field} of {} must be writable",
                    schema.table()
                ))
            })?;
            conditions.push(format!("{column} = {}", placeholders[index]));
        }
        columns.push(sequence_column.clone());
        placeholders.push(format!("COALESCE(MAX({sequence_column}), 0) + 1"));
        let mut sql = format!(
            "INSERT INTO {table} ({}) SELECT {} FROM {table}",
            columns.join(", "),
            placeholders.join(", ")
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" RETURNING {returning}"));
        writer.sql = sql;
        Ok(writer.finish())
    }

    /// Inserts the record and returns it with storage-assigned fields set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for rendering, storage or conversion failures.
    pub fn execute(&self, session: &Session<'_>) -> Result<E, DbError> {
        let statement = self.render(session.encryptor())?;
        let schema = self.marshaller.schema();
        let Some(fields) = session.query(schema, &statement)?.into_iter().next() else {
            return Err(DbError::Db(format!("insert into {} returned no row", schema.table())));
        };
        self.marshaller.unmarshal(fields)
    }
}

// ============================================================================
// SECTION: Update
// ============================================================================

/// UPDATE builder writing every writable field of a record.
#[derive(Debug, Clone)]
pub struct Update<'e, E> {
    /// Record providing the new values.
    entity: &'e E,
    /// Marshaller used to read the record.
    marshaller: EntityMarshaller<E>,
    /// WHERE clause.
    filter: Filter,
}

impl<'e, E: Entity> Update<'e, E> {
    /// Starts an update writing `entity`'s writable fields.
    #[must_use]
    pub fn new(entity: &'e E) -> Self {
        Self {
            entity,
            marshaller: EntityMarshaller::new(),
            filter: Filter::default(),
        }
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn where_eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter.equals.insert(field, value.into());
        self
    }

    /// Renders the statement, sealing encrypted fields.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the record is incomplete, a field is unknown,
    /// or encryption fails.
    pub fn render(&self, encryptor: &Encryptor) -> Result<Statement, DbError> {
        let schema = self.marshaller.schema();
        let handler = ColumnHandler::new(schema, self.marshaller.marshal(self.entity)?);
        handler.validate()?;
        let mut writer = SqlWriter::default();
        let names = handler.column_names(true);
        let values = handler.column_values(true, encryptor)?;
        let mut assignments = Vec::with_capacity(names.len());
        for (name, value) in names.into_iter().zip(values) {
            assignments.push(format!("{} = {}", quote(name), writer.bind(value)));
        }
        writer.sql =
            format!("UPDATE {} SET {}", quote(schema.table()), assignments.join(", "));
        self.filter.render(schema, &mut writer)?;
        Ok(writer.finish())
    }

    /// Executes the update and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for rendering or storage failures.
    pub fn execute(&self, session: &Session<'_>) -> Result<usize, DbError> {
        let statement = self.render(session.encryptor())?;
        session.execute(&statement)
    }
}

// ============================================================================
// SECTION: Delete
// ============================================================================

/// DELETE builder.
#[derive(Debug, Clone)]
pub struct Delete<E> {
    /// Marshaller carrying the schema.
    marshaller: EntityMarshaller<E>,
    /// WHERE clause.
    filter: Filter,
}

impl<E: Entity> Default for Delete<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Delete<E> {
    /// Starts a delete over the entity's table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            marshaller: EntityMarshaller::new(),
            filter: Filter::default(),
        }
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn where_eq(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter.equals.insert(field, value.into());
        self
    }

    /// Adds a row-value membership condition `(fields...) IN (sub_query)`.
    #[must_use]
    pub fn where_in(mut self, fields: &[&'static str], sub_query: SubQuery) -> Self {
        self.filter.row_in.push((fields.to_vec(), sub_query));
        self
    }

    /// Adds a membership condition against a literal value list.
    #[must_use]
    pub fn where_in_values<V: Into<FieldValue>>(
        mut self,
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter.values_in.push((field, values.into_iter().map(Into::into).collect()));
        self
    }

    /// Renders the statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when a field is unknown or not filterable.
    pub fn render(&self) -> Result<Statement, DbError> {
        let schema = self.marshaller.schema();
        let mut writer = SqlWriter {
            sql: format!("DELETE FROM {}", quote(schema.table())),
            args: Vec::new(),
        };
        self.filter.render(schema, &mut writer)?;
        Ok(writer.finish())
    }

    /// Executes the delete and returns the number of removed rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for rendering or storage failures.
    pub fn execute(&self, session: &Session<'_>) -> Result<usize, DbError> {
        let statement = self.render()?;
        session.execute(&statement)
    }
}
