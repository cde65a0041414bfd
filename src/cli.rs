use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "mile")]
#[command(bin_name = "mile")]
#[command(version)]
#[command(about = "A SQLite-backed project record tracker with timeline charts")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'C',
        long,
        env = "MILEPOST_ROOT",
        default_value = ".",
        help = "Project root that contains the entity subdirectories."
    )]
    pub root: PathBuf,

    #[arg(
        short = 'c',
        long,
        env = "MILEPOST_REGISTRY",
        help = "JSON registry of entity types (defaults to the built-in set)."
    )]
    pub registry: Option<PathBuf>,

    #[arg(
        short = 'e',
        long,
        env = "MILEPOST_ENTITY",
        default_value = "milestone",
        help = "Entity type to operate on."
    )]
    pub entity: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create the databases for every registered entity type.")]
    Init,
    #[command(about = "Create a new record.")]
    New(NewArgs),
    #[command(about = "Update record fields, appending to the audit trail.")]
    Update(UpdateArgs),
    #[command(about = "Link a record to another record it depends on.")]
    Trace(TraceArgs),
    #[command(about = "List records with filtering and sorting.")]
    Ls(ListArgs),
    #[command(about = "Show one record with its traces and history.")]
    Show(ShowArgs),
    #[command(about = "Search record text fields.")]
    Find(FindArgs),
    #[command(about = "List records changed on or after a date.")]
    Since(SinceArgs),
    #[command(about = "Lay the filtered records out on a timeline.")]
    Timeline(TimelineArgs),
    #[command(about = "List or define record categories.")]
    Types(TypesArgs),
    #[command(about = "Export records as CSV or TeX macros.")]
    Export(ExportArgs),
    #[command(about = "Generate shell completions.")]
    Completions(CompletionsArgs),
}

/// Field filters shared by every read command. Repeat a flag to accept more
/// values; "all" passes everything.
#[derive(Debug, Args)]
pub struct FilterArgs {
    #[arg(short = 't', long = "dtype", help = "Filter by record category (repeatable).")]
    pub dtype: Vec<String>,

    #[arg(
        short = 's',
        long = "status",
        help = "Filter by computed status code (repeatable)."
    )]
    pub status: Vec<String>,

    #[arg(short = 'o', long = "owner", help = "Filter by owner (repeatable).")]
    pub owner: Vec<String>,

    #[arg(long = "other", help = "Filter by the free-form other field (repeatable).")]
    pub other: Vec<String>,

    #[arg(short = 'i', long = "id", help = "Filter by numeric id (repeatable).")]
    pub id: Vec<String>,
}

/// Date-window filter over one record date.
#[derive(Debug, Args)]
pub struct TimeArgs {
    #[arg(
        long = "date-field",
        help = "Which date to window on: scheduled, updated, or initialized."
    )]
    pub date_field: Option<String>,

    #[arg(long = "after", help = "Only records dated on or after (YY/MM/DD).")]
    pub after: Option<String>,

    #[arg(long = "before", help = "Only records dated on or before (YY/MM/DD).")]
    pub before: Option<String>,
}

#[derive(Debug, Args)]
pub struct NewArgs {
    #[arg(help = "Record description (the refname derives from it).")]
    pub description: String,

    #[arg(help = "Scheduled date or range (YY/MM/DD or start-end).")]
    pub value: String,

    #[arg(short = 's', long, help = "Initial status text.")]
    pub status: Option<String>,

    #[arg(short = 'o', long, help = "Owner name.")]
    pub owner: Option<String>,

    #[arg(short = 't', long, help = "Record category.")]
    pub dtype: Option<String>,

    #[arg(long, help = "Free-form other field.")]
    pub other: Option<String>,

    #[arg(short = 'n', long, help = "Notes text.")]
    pub notes: Option<String>,

    #[arg(long, help = "Commentary text.")]
    pub commentary: Option<String>,

    #[arg(long, help = "Author recorded in the audit trail (defaults to $USER).")]
    pub by: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(help = "Refname, or any unique substring of one.")]
    pub name: String,

    #[arg(
        short = 'f',
        long = "field",
        help = "Field change as key=value (repeatable; <type>Trace links a trace)."
    )]
    pub fields: Vec<String>,

    #[arg(short = 'm', long = "note", default_value = "", help = "Audit note.")]
    pub note: String,

    #[arg(long, help = "Author recorded in the audit trail (defaults to $USER).")]
    pub by: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TraceArgs {
    #[arg(help = "Refname, or any unique substring of one.")]
    pub name: String,

    #[arg(help = "Refname of the record it traces to.")]
    pub target: String,

    #[arg(
        short = 't',
        long = "tracetype",
        help = "Entity type of the target (defaults to the current entity)."
    )]
    pub tracetype: Option<String>,

    #[arg(short = 'm', long = "note", default_value = "", help = "Audit note.")]
    pub note: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub time: TimeArgs,

    #[arg(long = "sort", help = "Sort by field (id, value, refname, status, owner).")]
    pub sort: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Refname, or any unique substring of one.")]
    pub name: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FindArgs {
    #[arg(help = "Text to search for.")]
    pub query: String,

    #[arg(short = 'f', long, help = "Restrict the search to one field.")]
    pub field: Option<String>,

    #[arg(
        long,
        default_value = "weak",
        help = "Match strength: weak, moderate, strong, or exact."
    )]
    pub strength: String,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub time: TimeArgs,

    #[arg(long = "sort", help = "Sort by field (id, value, refname, status, owner).")]
    pub sort: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SinceArgs {
    #[arg(help = "Date (YY/MM/DD); records changed on or after it are listed.")]
    pub since: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TimelineArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long = "curve", help = "Overlay the cumulative completion curve.")]
    pub curve: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TypesArgs {
    #[arg(long = "define", help = "Define a new category with this name.")]
    pub define: Option<String>,

    #[arg(long = "describe", default_value = "", help = "Category description.")]
    pub describe: String,

    #[arg(long = "start", default_value = "", help = "Nominal start date (YY/MM/DD).")]
    pub start: String,

    #[arg(long = "months", default_value_t = 0, help = "Nominal duration in months.")]
    pub months: i64,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(help = "Output format: csv or tex.")]
    pub format: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(value_enum, help = "Shell to generate completions for.")]
    pub shell: Shell,
}

impl FilterArgs {
    pub fn to_filter(&self) -> crate::filter::RecordFilter {
        let mut filter = crate::filter::RecordFilter::default();
        if !self.dtype.is_empty() {
            filter.dtype = self.dtype.clone();
        }
        if !self.status.is_empty() {
            filter.status = self.status.clone();
        }
        if !self.owner.is_empty() {
            filter.owner = self.owner.clone();
        }
        if !self.other.is_empty() {
            filter.other = self.other.clone();
        }
        if !self.id.is_empty() {
            filter.id = self.id.clone();
        }
        filter
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
