use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::Date;

use crate::config::{Registry, RegistryError};
use crate::dates;
use crate::db;
use crate::filter::{matches_text, MatchStrength, RecordFilter, TimeFilter};
use crate::status::{check_status, StatusCode, StatusReport};
use crate::store::{RefMatch, Record, Store, StoreError, TypeDefinition};
use crate::timeline::{self, LayoutOptions, TimelineChart, TimelineEntry};

/// Widest label a timeline row gets before truncation.
const LABEL_WIDTH: usize = 40;

/// One record paired with its computed classification. Every read path
/// returns these so callers never re-derive status from the raw text.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: Record,
    pub report: StatusReport,
}

/// Text-search parameters for `find`.
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub text: Option<String>,
    pub field: Option<String>,
    pub strength: MatchStrength,
}

pub struct App {
    store: Store,
    registry: Registry,
    entity: String,
}

impl App {
    pub fn open(root: PathBuf, registry: Registry, entity: &str) -> Result<Self, AppError> {
        let db_path = registry.db_path(&root, entity)?;
        ensure_parent_dir(&db_path)?;
        let conn = db::open_connection(&db_path.display().to_string())?;
        let traceable = registry
            .traceable_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let store = Store::open(conn, traceable)?;
        Ok(Self {
            store,
            registry,
            entity: entity.to_string(),
        })
    }

    /// Creates the subdirectory and database of every registered entity so
    /// a fresh project is usable immediately.
    pub fn init_project(root: &Path, registry: &Registry) -> Result<Vec<PathBuf>, AppError> {
        let mut created = Vec::new();
        for name in registry.entity_names() {
            let db_path = registry.db_path(root, name)?;
            ensure_parent_dir(&db_path)?;
            db::open_connection(&db_path.display().to_string())?;
            created.push(db_path);
        }
        Ok(created)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn caption(&self) -> String {
        self.registry
            .entity(&self.entity)
            .map(|entity| entity.caption.clone())
            .unwrap_or_else(|_| self.entity.clone())
    }

    pub fn create_record(
        &mut self,
        fields: &[(String, String)],
        by: Option<&str>,
    ) -> Result<RecordView, AppError> {
        let by = by.map(str::to_string).unwrap_or_else(whoami);
        let refname = self.store.add(fields, &by)?;
        self.view_of(&refname)
    }

    pub fn update_record(
        &mut self,
        name: &str,
        changes: &[(String, String)],
        note: &str,
        by: Option<&str>,
    ) -> Result<RecordView, AppError> {
        let by = by.map(str::to_string).unwrap_or_else(whoami);
        let refname = self.store.update(name, changes, note, &by)?;
        self.view_of(&refname)
    }

    pub fn add_trace(
        &mut self,
        name: &str,
        tracetype: &str,
        tracename: &str,
        note: &str,
    ) -> Result<RecordView, AppError> {
        let changes = [(format!("{tracetype}Trace"), tracename.to_string())];
        self.update_record(name, &changes, note, None)
    }

    pub fn show(&self, name: &str) -> Result<RecordView, AppError> {
        let refname = self.resolve(name)?;
        self.view_of(&refname)
    }

    pub fn list(
        &self,
        filter: &RecordFilter,
        time: Option<&TimeFilter>,
        sortby: Option<&str>,
    ) -> Vec<RecordView> {
        let mut views = self.select(filter, time, None);
        sort_views(&mut views, sortby);
        views
    }

    pub fn find(
        &self,
        query: &FindQuery,
        filter: &RecordFilter,
        time: Option<&TimeFilter>,
        sortby: Option<&str>,
    ) -> Vec<RecordView> {
        let mut views = self.select(filter, time, Some(query));
        sort_views(&mut views, sortby);
        views
    }

    pub fn changed_since(&self, since: Date) -> Vec<RecordView> {
        let now = dates::today();
        self.store
            .changed_since(since)
            .into_iter()
            .map(|record| view_for(record, now))
            .collect()
    }

    pub fn types(&self) -> &[TypeDefinition] {
        self.store.types()
    }

    pub fn define_type(&mut self, definition: &TypeDefinition) -> Result<(), AppError> {
        self.store.define_type(definition)?;
        Ok(())
    }

    pub fn export_csv(&self, filter: &RecordFilter) -> String {
        let views = self.select(filter, None, None);
        let records: Vec<&Record> = views.iter().map(|view| &view.record).collect();
        crate::export::csv(&records)
    }

    pub fn export_macros(&self, filter: &RecordFilter) -> String {
        let views = self.select(filter, None, None);
        let records: Vec<&Record> = views.iter().map(|view| &view.record).collect();
        crate::export::macro_block(&records)
    }

    /// Lays out the filtered records as a timeline. Only ganttable entities
    /// chart; removed records and records without a parseable date stay off
    /// the chart.
    pub fn timeline(
        &self,
        filter: &RecordFilter,
        show_completion_curve: bool,
    ) -> Result<TimelineChart, AppError> {
        let entity = self.registry.entity(&self.entity)?;
        if !entity.ganttable {
            return Err(AppError::InvalidArgument(format!(
                "entity type '{}' does not chart on a timeline",
                self.entity
            )));
        }

        let now = dates::today();
        let views = self.select(filter, None, None);

        let mut labels: Vec<String> = Vec::new();
        let mut label_by_refname: Vec<(String, String)> = Vec::new();
        let mut spans = Vec::new();
        for view in &views {
            if view.report.code == StatusCode::Removed {
                continue;
            }
            let Some((start, end)) = dates::parse_span(&view.record.value) else {
                eprintln!(
                    "warning: '{}' has no parseable date ('{}'), leaving it off the chart",
                    view.record.refname, view.record.value
                );
                continue;
            };
            let truncated: String = view.record.description.chars().take(LABEL_WIDTH).collect();
            let label = timeline::dedup_label(&truncated, &labels);
            labels.push(label.clone());
            label_by_refname.push((view.record.refname.to_lowercase(), label));
            spans.push((view, start, end));
        }

        let entries: Vec<TimelineEntry> = spans
            .iter()
            .zip(labels.iter())
            .map(|((view, start, end), label)| {
                let predecessors = view
                    .record
                    .traces
                    .get(&self.entity)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|name| {
                                let needle = name.to_lowercase();
                                label_by_refname
                                    .iter()
                                    .find(|(refname, _)| refname == &needle)
                                    .map(|(_, label)| label.clone())
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                TimelineEntry {
                    label: label.clone(),
                    start: *start,
                    end: *end,
                    code: view.report.code,
                    color: view.report.color.clone(),
                    predecessors,
                    annotation: view.record.owner_display(),
                }
            })
            .collect();

        let options = LayoutOptions {
            show_completion_curve,
        };
        Ok(timeline::layout(&entries, now, &options))
    }

    fn select(
        &self,
        filter: &RecordFilter,
        time: Option<&TimeFilter>,
        query: Option<&FindQuery>,
    ) -> Vec<RecordView> {
        let now = dates::today();
        self.store
            .records()
            .iter()
            .filter_map(|record| {
                let view = view_for(record, now);
                if !filter.matches(record, &view.report) {
                    return None;
                }
                if let Some(time) = time {
                    if !time.matches(record) {
                        return None;
                    }
                }
                if let Some(query) = query {
                    if let Some(text) = query.text.as_deref() {
                        if !matches_text(record, query.field.as_deref(), text, query.strength) {
                            return None;
                        }
                    }
                }
                Some(view)
            })
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<String, AppError> {
        match self.store.find_matching_refname(name) {
            RefMatch::Exact(refname) => Ok(refname),
            RefMatch::Candidates(candidates) => Err(AppError::Store(StoreError::Ambiguous {
                query: name.to_string(),
                candidates,
            })),
            RefMatch::None => Err(AppError::Store(StoreError::NotFound(name.to_string()))),
        }
    }

    fn view_of(&self, refname: &str) -> Result<RecordView, AppError> {
        let record = self
            .store
            .get(refname)
            .ok_or_else(|| AppError::Store(StoreError::NotFound(refname.to_string())))?;
        Ok(view_for(record, dates::today()))
    }
}

fn view_for(record: &Record, now: Date) -> RecordView {
    // A record without a parseable schedule is judged against now, which
    // never reclassifies it late.
    let scheduled = dates::scheduled_date(&record.value).unwrap_or(now);
    let report = check_status(record.status.as_deref(), scheduled, now);
    RecordView {
        record: record.clone(),
        report,
    }
}

fn sort_views(views: &mut [RecordView], sortby: Option<&str>) {
    let Some(field) = sortby else {
        return;
    };
    match field {
        "id" => views.sort_by_key(|view| view.record.id),
        "value" | "scheduled" => views.sort_by(|a, b| {
            let date_a = dates::scheduled_date(&a.record.value);
            let date_b = dates::scheduled_date(&b.record.value);
            date_a.cmp(&date_b)
        }),
        "refname" => views.sort_by(|a, b| a.record.refname.cmp(&b.record.refname)),
        "description" => views.sort_by(|a, b| a.record.description.cmp(&b.record.description)),
        "owner" => views.sort_by(|a, b| a.record.owner.cmp(&b.record.owner)),
        "status" => views.sort_by(|a, b| {
            a.report
                .code
                .as_str()
                .cmp(b.report.code.as_str())
                .then(a.report.lag_days.total_cmp(&b.report.lag_days))
        }),
        other => eprintln!("warning: cannot sort by '{other}', leaving id order"),
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Db(rusqlite::Error),
    Store(StoreError),
    Registry(RegistryError),
    InvalidArgument(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Db(err) => write!(f, "database error: {}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Registry(err) => write!(f, "{}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Db(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Registry(err) => Some(err),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        AppError::Registry(value)
    }
}
