use std::error::Error;
use std::fmt;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::Serialize;

/// Declared storage class of a column, reduced from the raw type text that
/// SQLite reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Any,
}

impl ColumnKind {
    pub fn from_decl(decl: &str) -> ColumnKind {
        let upper = decl.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnKind::Integer
        } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
            ColumnKind::Text
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUMERIC")
        {
            ColumnKind::Real
        } else {
            ColumnKind::Any
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Any => "ANY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub primary_key: bool,
    pub not_null: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.as_str())
            .collect()
    }
}

/// Column layout of every table in the backing store, introspected once at
/// open time from SQLite's own metadata. No hand-maintained schema file.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<TableSchema>,
}

impl Schema {
    pub fn introspect(conn: &Connection) -> Result<Schema, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let mut columns = Vec::new();
            conn.pragma(None, "table_info", &name, |row| {
                let decl: String = row.get(2)?;
                let not_null: i64 = row.get(3)?;
                let pk: i64 = row.get(5)?;
                columns.push(ColumnDef {
                    name: row.get(1)?,
                    kind: ColumnKind::from_decl(&decl),
                    primary_key: pk > 0,
                    not_null: not_null > 0,
                });
                Ok(())
            })?;
            tables.push(TableSchema { name, columns });
        }
        Ok(Schema { tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// One cell of a row: a tagged scalar instead of an untyped map entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn text(raw: impl Into<String>) -> Value {
        Value::Text(raw.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn from_sql_ref(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(value) => Value::Integer(value),
            ValueRef::Real(value) => Value::Real(value),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Casts toward a column's declared kind. An empty string stores as
    /// NULL. A mismatch is an error for this value only; callers report it
    /// and continue the batch.
    pub fn cast_to(&self, kind: ColumnKind) -> Result<Value, CastError> {
        match (self, kind) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Text(text), _) if text.is_empty() => Ok(Value::Null),
            (value, ColumnKind::Any) => Ok(value.clone()),
            (Value::Integer(value), ColumnKind::Integer) => Ok(Value::Integer(*value)),
            (Value::Real(value), ColumnKind::Integer) => Ok(Value::Integer(*value as i64)),
            (Value::Text(text), ColumnKind::Integer) => text
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| CastError::new(self, kind)),
            (Value::Integer(value), ColumnKind::Real) => Ok(Value::Real(*value as f64)),
            (Value::Real(value), ColumnKind::Real) => Ok(Value::Real(*value)),
            (Value::Text(text), ColumnKind::Real) => text
                .trim()
                .parse()
                .map(Value::Real)
                .map_err(|_| CastError::new(self, kind)),
            (value, ColumnKind::Text) => Ok(Value::Text(value.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Real(value) => write!(f, "{value}"),
            Value::Text(text) => f.write_str(text),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            Value::Real(value) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*value)),
            Value::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastError {
    value: String,
    kind: &'static str,
}

impl CastError {
    fn new(value: &Value, kind: ColumnKind) -> CastError {
        CastError {
            value: value.to_string(),
            kind: kind.as_str(),
        }
    }
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot cast '{}' to {}", self.value, self.kind)
    }
}

impl Error for CastError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Gt,
    Like,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Like => "LIKE",
        }
    }
}

/// One WHERE term. The comparison operator may ride along in the key
/// (`"updated>"`) or at the front of the value (`">20/01/01"`); a `%`
/// anywhere in the value selects LIKE.
#[derive(Debug, Clone)]
pub struct Clause {
    pub column: String,
    pub comparison: Comparison,
    pub value: Value,
}

impl Clause {
    pub fn new(column: &str, comparison: Comparison, value: Value) -> Clause {
        Clause {
            column: column.to_string(),
            comparison,
            value,
        }
    }

    pub fn parse(key: &str, raw: &str) -> Clause {
        let mut column = key.trim().to_string();
        let mut text = raw.trim().to_string();
        let mut comparison = Comparison::Eq;

        if let Some(op) = column.chars().last().and_then(embedded_operator) {
            comparison = op;
            column.pop();
            column.truncate(column.trim_end().len());
        } else if let Some(op) = text.chars().next().and_then(embedded_operator) {
            comparison = op;
            text.remove(0);
            text = text.trim_start().to_string();
        }

        if text.contains('%') {
            comparison = Comparison::Like;
        }

        Clause {
            column,
            comparison,
            value: Value::Text(text),
        }
    }
}

fn embedded_operator(symbol: char) -> Option<Comparison> {
    match symbol {
        '<' => Some(Comparison::Lt),
        '>' => Some(Comparison::Gt),
        '=' => Some(Comparison::Eq),
        _ => None,
    }
}

/// Result of a read: one same-length column of values per schema column.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub table: String,
    columns: Vec<(String, Vec<Value>)>,
}

impl TableData {
    pub fn len(&self) -> usize {
        self.columns.first().map(|(_, values)| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Materializes one row into a field-named view.
    pub fn entry(&self, index: usize) -> Option<RowView> {
        if index >= self.len() {
            return None;
        }
        let fields = self
            .columns
            .iter()
            .map(|(column, values)| (column.clone(), values[index].clone()))
            .collect();
        Some(RowView { fields })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView> + '_ {
        (0..self.len()).filter_map(|index| self.entry(index))
    }
}

#[derive(Debug, Clone)]
pub struct RowView {
    fields: Vec<(String, Value)>,
}

impl RowView {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Field rendered as display text; NULL and missing become "".
    pub fn display(&self, name: &str) -> String {
        self.get(name).map(Value::to_string).unwrap_or_default()
    }
}

/// Column values staged for insert or update. A column may hold a list; on
/// insert, one row is written per entry of the longest list.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<(String, Vec<Value>)>,
}

impl ColumnSet {
    pub fn new() -> ColumnSet {
        ColumnSet::default()
    }

    pub fn set(&mut self, column: &str, value: Value) -> &mut Self {
        self.set_list(column, vec![value])
    }

    pub fn set_text(&mut self, column: &str, raw: &str) -> &mut Self {
        self.set(column, Value::text(raw))
    }

    pub fn set_list(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        if let Some(slot) = self.columns.iter_mut().find(|(name, _)| name == column) {
            slot.1 = values;
        } else {
            self.columns.push((column.to_string(), values));
        }
        self
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.columns
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    /// Concatenate onto an existing comma-joined value instead of
    /// overwriting; used for owner-like multi-valued fields.
    Append,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub added: usize,
    pub skipped: usize,
}

/// Schema-driven read/insert/update over one connection. All SQL text is
/// assembled from introspected column names; values always bind through
/// placeholders.
pub struct Mapper<'a> {
    conn: &'a Connection,
    schema: &'a Schema,
}

impl<'a> Mapper<'a> {
    pub fn new(conn: &'a Connection, schema: &'a Schema) -> Mapper<'a> {
        Mapper { conn, schema }
    }

    pub fn read(
        &self,
        table: &str,
        order_by: Option<&str>,
        clauses: &[Clause],
    ) -> Result<TableData, SchemaError> {
        let table_schema = self
            .schema
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        let mut where_sql = String::new();
        let mut bound = Vec::new();
        for clause in clauses {
            let Some(column) = table_schema.column(&clause.column) else {
                eprintln!(
                    "warning: {}.{} is not a column, dropping filter",
                    table, clause.column
                );
                continue;
            };
            let value = match clause.value.cast_to(column.kind) {
                Ok(value) => value,
                Err(err) => {
                    eprintln!("warning: filter on {}.{}: {err}", table, clause.column);
                    clause.value.clone()
                }
            };
            let joiner = if bound.is_empty() { " WHERE " } else { " AND " };
            where_sql.push_str(joiner);
            bound.push(value);
            where_sql.push_str(&format!(
                "{} {} ?{}",
                column.name,
                clause.comparison.sql(),
                bound.len()
            ));
        }

        let mut order_sql = String::new();
        if let Some(order_column) = order_by {
            if table_schema.column(order_column).is_some() {
                order_sql = format!(" ORDER BY {order_column}");
            } else {
                eprintln!("warning: {table}.{order_column} is not a column, ignoring order");
            }
        }

        let names = table_schema.column_names();
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            names.join(", "),
            table,
            where_sql,
            order_sql
        );

        let mut columns: Vec<(String, Vec<Value>)> = names
            .iter()
            .map(|name| ((*name).to_string(), Vec::new()))
            .collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bound.iter()))?;
        while let Some(row) = rows.next()? {
            for (index, (_, values)) in columns.iter_mut().enumerate() {
                values.push(Value::from_sql_ref(row.get_ref(index)?));
            }
        }

        Ok(TableData {
            table: table.to_string(),
            columns,
        })
    }

    /// Inserts one row per entry in the longest provided column list.
    /// `rows` restricts to an allow-list of list indices. Duplicate-key
    /// rows are reported and skipped, never fatal for the batch.
    pub fn insert(
        &self,
        table: &str,
        values: &ColumnSet,
        rows: Option<&[usize]>,
    ) -> Result<InsertReport, SchemaError> {
        let table_schema = self
            .schema
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        let mut valid: Vec<(&ColumnDef, &[Value])> = Vec::new();
        for (name, column_values) in values.iter() {
            match table_schema.column(name) {
                Some(column) => valid.push((column, column_values)),
                None => eprintln!("warning: {table}.{name} is not a column, dropping value"),
            }
        }
        if valid.is_empty() {
            eprintln!("warning: no valid columns to add to {table}");
            return Ok(InsertReport::default());
        }

        let longest = valid.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let names: Vec<&str> = valid.iter().map(|(c, _)| c.name.as_str()).collect();
        let placeholders: Vec<String> =
            (1..=names.len()).map(|index| format!("?{index}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut report = InsertReport::default();
        for index in 0..longest {
            if let Some(allowed) = rows {
                if !allowed.contains(&index) {
                    continue;
                }
            }
            let mut row = Vec::with_capacity(valid.len());
            for (column, column_values) in &valid {
                let raw = column_values.get(index).cloned().unwrap_or(Value::Null);
                let cast = match raw.cast_to(column.kind) {
                    Ok(value) => value,
                    Err(err) => {
                        eprintln!("warning: {}.{}: {err}", table, column.name);
                        Value::Null
                    }
                };
                row.push(cast);
            }
            match stmt.execute(params_from_iter(row.iter())) {
                Ok(_) => report.added += 1,
                Err(rusqlite::Error::SqliteFailure(failure, message))
                    if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    eprintln!(
                        "warning: row not allowed in {table}: {}",
                        message.unwrap_or_default()
                    );
                    report.skipped += 1;
                }
                Err(err) => return Err(SchemaError::Db(err)),
            }
        }

        Ok(report)
    }

    /// Applies `changes` to the row identified by `entry`'s primary-key
    /// columns. `WriteMode::Append` merges onto the comma-joined current
    /// value, skipping entries already present.
    pub fn update(
        &self,
        table: &str,
        entry: &RowView,
        changes: &ColumnSet,
        mode: WriteMode,
    ) -> Result<(), SchemaError> {
        let table_schema = self
            .schema
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        let key_columns = table_schema.primary_key_columns();
        if key_columns.is_empty() {
            return Err(SchemaError::MissingKey {
                table: table.to_string(),
                column: "(no primary key)".to_string(),
            });
        }
        let mut key_values = Vec::with_capacity(key_columns.len());
        for key in &key_columns {
            let value = entry.get(key).cloned().ok_or_else(|| SchemaError::MissingKey {
                table: table.to_string(),
                column: (*key).to_string(),
            })?;
            key_values.push(value);
        }
        let where_sql: Vec<String> = key_columns
            .iter()
            .enumerate()
            .map(|(index, key)| format!("{} = ?{}", key, index + 2))
            .collect();
        let where_sql = where_sql.join(" AND ");

        for (name, column_values) in changes.iter() {
            let Some(column) = table_schema.column(name) else {
                eprintln!("warning: {table}.{name} is not a column, dropping change");
                continue;
            };
            let raw = column_values.first().cloned().unwrap_or(Value::Null);
            let mut next = match raw.cast_to(column.kind) {
                Ok(value) => value,
                Err(err) => {
                    eprintln!("warning: {}.{}: {err}", table, column.name);
                    continue;
                }
            };

            if mode == WriteMode::Append {
                match self.merge_append(table, column, &where_sql, &key_values, &next)? {
                    Some(merged) => next = merged,
                    None => continue,
                }
            }

            let sql = format!("UPDATE {} SET {} = ?1 WHERE {}", table, column.name, where_sql);
            let mut bound = vec![next];
            bound.extend(key_values.iter().cloned());
            self.conn.execute(&sql, params_from_iter(bound.iter()))?;
        }

        Ok(())
    }

    fn merge_append(
        &self,
        table: &str,
        column: &ColumnDef,
        where_sql: &str,
        key_values: &[Value],
        addition: &Value,
    ) -> Result<Option<Value>, SchemaError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            column.name,
            table,
            shift_placeholders_left(where_sql)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let current: Option<Value> = stmt
            .query_row(params_from_iter(key_values.iter()), |row| {
                Ok(Value::from_sql_ref(row.get_ref(0)?))
            })
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let addition_text = addition.to_string();
        match current {
            None | Some(Value::Null) => Ok(Some(addition.clone())),
            Some(existing) => {
                let joined = existing.to_string();
                if joined.split(',').any(|part| part.trim() == addition_text.trim()) {
                    return Ok(None);
                }
                Ok(Some(Value::Text(format!("{joined},{addition_text}"))))
            }
        }
    }
}

// The update WHERE clause binds keys from ?2; the append pre-read binds the
// same keys from ?1. Ascending order so each placeholder moves exactly once.
fn shift_placeholders_left(where_sql: &str) -> String {
    let mut shifted = where_sql.to_string();
    for index in 2..=9 {
        shifted = shifted.replace(&format!("?{index}"), &format!("?{}", index - 1));
    }
    shifted
}

#[derive(Debug)]
pub enum SchemaError {
    UnknownTable(String),
    MissingKey { table: String, column: String },
    Db(rusqlite::Error),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownTable(table) => write!(f, "table '{table}' not found"),
            SchemaError::MissingKey { table, column } => {
                write!(f, "entry for {table} is missing key column {column}")
            }
            SchemaError::Db(err) => write!(f, "database error: {err}"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SchemaError::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        SchemaError::Db(value)
    }
}
