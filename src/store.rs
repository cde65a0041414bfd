use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::dates;
use crate::schema::{Clause, ColumnSet, Comparison, Mapper, Schema, SchemaError, Value, WriteMode};

/// Slug window sizing for generated refnames. The window starts short for
/// readable names and widens until the prefix is unique.
const SLUG_WINDOW_START: usize = 30;
const SLUG_WINDOW_STEP: usize = 2;
const SLUG_MAX: usize = 200;

/// One audit-trail entry. Level 0 is creation; every later write appends the
/// next level, so the trail orders without timestamps agreeing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEvent {
    pub refname: String,
    pub updated: String,
    pub by: String,
    pub note: String,
    pub level: i64,
}

/// Row of the `types` table: one record category and its nominal span.
#[derive(Debug, Clone, Serialize)]
pub struct TypeDefinition {
    pub name: String,
    pub description: String,
    pub start: String,
    pub duration_months: i64,
}

impl TypeDefinition {
    /// Quarter sub-periods of the planning window. Empty when the start text
    /// does not parse or the duration is under one quarter.
    pub fn quarters(&self) -> Vec<(Date, Date)> {
        match dates::parse_date(&self.start) {
            Some(start) => dates::quarter_windows(start, self.duration_months),
            None => Vec::new(),
        }
    }
}

/// A fully assembled record: the base row joined with its trace links and
/// complete update history.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub refname: String,
    pub value: String,
    pub description: String,
    pub dtype: String,
    pub status: Option<String>,
    pub owner: Vec<String>,
    pub other: String,
    pub notes: String,
    pub commentary: String,
    pub id: i64,
    pub traces: BTreeMap<String, Vec<String>>,
    pub updates: Vec<UpdateEvent>,
    pub updated: Option<String>,
    pub initialized: Option<String>,
}

impl Record {
    pub fn owner_display(&self) -> String {
        self.owner.join(",")
    }
}

/// Outcome of resolving a user-supplied name against loaded refnames.
#[derive(Debug, Clone, PartialEq)]
pub enum RefMatch {
    Exact(String),
    Candidates(Vec<String>),
    None,
}

/// In-memory view of one entity database, rebuilt from SQLite on every load.
/// The database is the source of truth; this caches nothing across writes.
pub struct Store {
    conn: Connection,
    schema: Schema,
    traceable: Vec<String>,
    records: Vec<Record>,
    index: BTreeMap<String, usize>,
    types: Vec<TypeDefinition>,
}

impl Store {
    pub fn open(conn: Connection, traceable: Vec<String>) -> Result<Store, StoreError> {
        let schema = Schema::introspect(&conn).map_err(SchemaError::Db)?;
        let mut store = Store {
            conn,
            schema,
            traceable,
            records: Vec::new(),
            index: BTreeMap::new(),
            types: Vec::new(),
        };
        store.load()?;
        Ok(store)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn types(&self) -> &[TypeDefinition] {
        &self.types
    }

    pub fn get(&self, refname: &str) -> Option<&Record> {
        self.index
            .get(&refname.to_lowercase())
            .map(|&index| &self.records[index])
    }

    /// Rebuilds every record from the base table plus its trace and update
    /// joins. Rows that cannot join cleanly are reported and dropped, never
    /// fatal.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let mapper = Mapper::new(&self.conn, &self.schema);

        let data = mapper.read("records", Some("id"), &[])?;
        let mut records = Vec::with_capacity(data.len());
        let mut index = BTreeMap::new();
        for row in data.rows() {
            let refname = row.display("refname");
            if refname.is_empty() {
                eprintln!("warning: dropping record with empty refname");
                continue;
            }
            let key = refname.to_lowercase();
            if index.contains_key(&key) {
                eprintln!("warning: refname '{refname}' collides case-insensitively, dropping");
                continue;
            }
            let owner: Vec<String> = row
                .display("owner")
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect();
            index.insert(key, records.len());
            records.push(Record {
                refname,
                value: row.display("value"),
                description: row.display("description"),
                dtype: row.display("dtype"),
                status: row.text("status").map(str::to_string),
                owner,
                other: row.display("other"),
                notes: row.display("notes"),
                commentary: row.display("commentary"),
                id: row.integer("id").unwrap_or(0),
                traces: BTreeMap::new(),
                updates: Vec::new(),
                updated: None,
                initialized: None,
            });
        }

        let mut orphan_warned = BTreeSet::new();
        let traces = mapper.read("trace", Some("refname"), &[])?;
        for row in traces.rows() {
            let refname = row.display("refname");
            let Some(&slot) = index.get(&refname.to_lowercase()) else {
                if orphan_warned.insert(refname.clone()) {
                    eprintln!("warning: trace rows reference unknown record '{refname}'");
                }
                continue;
            };
            records[slot]
                .traces
                .entry(row.display("tracetype"))
                .or_default()
                .push(row.display("tracename"));
        }

        let events = mapper.read("updated", Some("level"), &[])?;
        for row in events.rows() {
            let refname = row.display("refname");
            let Some(&slot) = index.get(&refname.to_lowercase()) else {
                if orphan_warned.insert(refname.clone()) {
                    eprintln!("warning: update rows reference unknown record '{refname}'");
                }
                continue;
            };
            records[slot].updates.push(UpdateEvent {
                refname,
                updated: row.display("updated"),
                by: row.display("by"),
                note: row.display("note"),
                level: row.integer("level").unwrap_or(0),
            });
        }

        let types_data = mapper.read("types", Some("name"), &[])?;
        let types: Vec<TypeDefinition> = types_data
            .rows()
            .map(|row| TypeDefinition {
                name: row.display("name"),
                description: row.display("description"),
                start: row.display("start"),
                duration_months: row.integer("duration_months").unwrap_or(0),
            })
            .collect();

        let known_types: BTreeSet<&str> = types.iter().map(|t| t.name.as_str()).collect();
        let mut dtype_warned = BTreeSet::new();
        for record in &mut records {
            if !record.dtype.is_empty()
                && !known_types.is_empty()
                && !known_types.contains(record.dtype.as_str())
                && dtype_warned.insert(record.dtype.clone())
            {
                eprintln!("warning: dtype '{}' is not in the types table", record.dtype);
            }
            record.initialized = record
                .updates
                .iter()
                .find(|event| event.level == 0)
                .map(|event| event.updated.clone());
            record.updated = record.updates.last().map(|event| event.updated.clone());
        }

        self.records = records;
        self.index = index;
        self.types = types;
        Ok(())
    }

    /// Case-insensitive name resolution: an exact refname wins; otherwise a
    /// unique substring match resolves, anything else comes back for the
    /// caller to report.
    pub fn find_matching_refname(&self, query: &str) -> RefMatch {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return RefMatch::None;
        }
        if let Some(&slot) = self.index.get(&needle) {
            return RefMatch::Exact(self.records[slot].refname.clone());
        }
        let candidates: Vec<String> = self
            .records
            .iter()
            .filter(|record| record.refname.to_lowercase().contains(&needle))
            .map(|record| record.refname.clone())
            .collect();
        match candidates.len() {
            0 => RefMatch::None,
            1 => RefMatch::Exact(candidates.into_iter().next().unwrap_or_default()),
            _ => RefMatch::Candidates(candidates),
        }
    }

    /// Creates a record from field pairs. `description` and `value` are
    /// required; the refname is generated from the description and the new
    /// row gets the next id and a level-0 audit entry.
    pub fn add(&mut self, fields: &[(String, String)], by: &str) -> Result<String, StoreError> {
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty())
        };
        let description = field("description").ok_or(StoreError::MissingField("description"))?;
        field("value").ok_or(StoreError::MissingField("value"))?;

        let refname = self.unique_refname(description)?;
        let next_id = self.records.iter().map(|record| record.id).max().unwrap_or(0) + 1;

        let mut columns = ColumnSet::new();
        for (key, value) in fields {
            if key == "refname" || key == "id" {
                eprintln!("warning: '{key}' is assigned automatically, ignoring");
                continue;
            }
            columns.set_text(key, value);
        }
        columns.set_text("refname", &refname);
        columns.set("id", Value::Integer(next_id));

        let mapper = Mapper::new(&self.conn, &self.schema);
        let report = mapper.insert("records", &columns, None)?;
        if report.added == 0 {
            return Err(StoreError::NoUniqueName(refname));
        }
        self.append_event(&refname, by, "Initial", 0)?;
        self.load()?;
        Ok(refname)
    }

    /// Applies field changes to the record resolved from `name`. A field
    /// named `<type>Trace` links a trace instead of writing a column. Any
    /// applied change appends exactly one audit entry carrying the
    /// overwritten values; a call where every change was rejected leaves the
    /// audit trail untouched.
    pub fn update(
        &mut self,
        name: &str,
        changes: &[(String, String)],
        note: &str,
        by: &str,
    ) -> Result<String, StoreError> {
        // Pick up concurrent writers' rows before resolving the name.
        self.load()?;
        let refname = match self.find_matching_refname(name) {
            RefMatch::Exact(refname) => refname,
            RefMatch::Candidates(candidates) => {
                return Err(StoreError::Ambiguous {
                    query: name.to_string(),
                    candidates,
                })
            }
            RefMatch::None => return Err(StoreError::NotFound(name.to_string())),
        };

        let record = self
            .get(&refname)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(refname.clone()))?;

        let mut prior = Vec::new();
        let mut column_changes = Vec::new();
        for (key, value) in changes {
            if let Some(tracetype) = key.strip_suffix("Trace") {
                self.link_trace(&refname, tracetype, value)?;
                prior.push(format!("[{tracetype}Trace: +{value}]"));
                continue;
            }
            if key == "refname" || key == "id" {
                eprintln!("warning: '{key}' cannot be changed, ignoring");
                continue;
            }
            column_changes.push((key.as_str(), value.as_str()));
        }

        let mapper = Mapper::new(&self.conn, &self.schema);
        let data = mapper.read(
            "records",
            None,
            &[Clause::new("refname", Comparison::Eq, Value::text(refname.as_str()))],
        )?;
        let entry = data
            .entry(0)
            .ok_or_else(|| StoreError::NotFound(refname.clone()))?;

        for (key, value) in column_changes {
            let mode = if key == "owner" {
                WriteMode::Append
            } else {
                WriteMode::Overwrite
            };
            let old = entry.display(key);
            let mut change = ColumnSet::new();
            change.set_text(key, value);
            mapper.update("records", &entry, &change, mode)?;
            prior.push(format!("[{key}: {old}]"));
        }

        if prior.is_empty() {
            eprintln!("warning: nothing changed on '{refname}'");
            return Ok(refname);
        }

        let next_level = record.updates.last().map(|event| event.level).unwrap_or(-1) + 1;
        let mut full_note = note.trim().to_string();
        if !full_note.is_empty() {
            full_note.push(' ');
        }
        full_note.push_str(&prior.join(" "));
        self.append_event(&refname, by, &full_note, next_level)?;
        self.load()?;
        Ok(refname)
    }

    pub fn link_trace(
        &self,
        refname: &str,
        tracetype: &str,
        tracename: &str,
    ) -> Result<(), StoreError> {
        if !self.traceable.iter().any(|known| known == tracetype) {
            eprintln!("warning: '{tracetype}' is not a traceable entity type");
        }
        let mut columns = ColumnSet::new();
        columns
            .set_text("refname", refname)
            .set_text("tracename", tracename)
            .set_text("tracetype", tracetype);
        let mapper = Mapper::new(&self.conn, &self.schema);
        mapper.insert("trace", &columns, None)?;
        Ok(())
    }

    pub fn define_type(&mut self, definition: &TypeDefinition) -> Result<(), StoreError> {
        let mut columns = ColumnSet::new();
        columns
            .set_text("name", &definition.name)
            .set_text("description", &definition.description)
            .set_text("start", &definition.start)
            .set("duration_months", Value::Integer(definition.duration_months));
        let mapper = Mapper::new(&self.conn, &self.schema);
        mapper.insert("types", &columns, None)?;
        self.load()
    }

    /// Records whose audit trail has an entry on or after `since`.
    pub fn changed_since(&self, since: Date) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|record| {
                record.updates.iter().any(|event| {
                    dates::parse_date(&event.updated)
                        .map(|stamp| stamp >= since)
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    fn append_event(
        &self,
        refname: &str,
        by: &str,
        note: &str,
        level: i64,
    ) -> Result<(), StoreError> {
        let mut columns = ColumnSet::new();
        columns
            .set_text("refname", refname)
            .set_text("updated", &dates::today_stamp())
            .set_text("by", by)
            .set_text("note", note)
            .set("level", Value::Integer(level));
        let mapper = Mapper::new(&self.conn, &self.schema);
        mapper.insert("updated", &columns, None)?;
        Ok(())
    }

    fn unique_refname(&self, description: &str) -> Result<String, StoreError> {
        let slug = make_refname(description);
        if slug.is_empty() {
            return Err(StoreError::MissingField("description"));
        }
        let mut window = SLUG_WINDOW_START.min(slug.chars().count());
        loop {
            let candidate: String = slug.chars().take(window).collect();
            if !self.index.contains_key(&candidate) {
                return Ok(candidate);
            }
            if window >= slug.chars().count() {
                return Err(StoreError::NoUniqueName(slug));
            }
            window = (window + SLUG_WINDOW_STEP).min(slug.chars().count());
        }
    }
}

/// Lowercased description with whitespace and quotes removed, capped so a
/// pathological description cannot produce an unbounded key.
pub fn make_refname(description: &str) -> String {
    description
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'')
        .flat_map(char::to_lowercase)
        .take(SLUG_MAX)
        .collect()
}

#[derive(Debug)]
pub enum StoreError {
    Schema(SchemaError),
    MissingField(&'static str),
    NotFound(String),
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },
    NoUniqueName(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Schema(err) => err.fmt(f),
            StoreError::MissingField(field) => write!(f, "a non-empty '{field}' is required"),
            StoreError::NotFound(query) => write!(f, "no record matches '{query}'"),
            StoreError::Ambiguous { query, candidates } => write!(
                f,
                "'{query}' matches {} records: {}",
                candidates.len(),
                candidates.join(", ")
            ),
            StoreError::NoUniqueName(slug) => {
                write!(f, "cannot derive a unique refname from '{slug}'")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        StoreError::Schema(value)
    }
}

#[cfg(test)]
mod tests;
