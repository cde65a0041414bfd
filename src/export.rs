use std::fmt::Write as _;

use crate::status::StatusReport;
use crate::store::Record;

/// One fixed-width listing line: scheduled value, computed status, owner,
/// then the description with the refname for follow-up commands.
pub fn listing_line(record: &Record, report: &StatusReport) -> String {
    format!(
        "{:10.10} {:10.10} {:14.14} {} ({})",
        record.value,
        report.code.as_str(),
        record.owner_display(),
        record.description,
        record.refname
    )
}

pub const CSV_HEADER: &str = "value,description,owner,status,other,notes,commentary";

pub fn csv(records: &[&Record]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for record in records {
        let fields = [
            record.value.as_str(),
            record.description.as_str(),
            &record.owner_display(),
            record.status.as_deref().unwrap_or(""),
            record.other.as_str(),
            record.notes.as_str(),
            record.commentary.as_str(),
        ];
        let quoted: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
        out.push_str(&quoted.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// TeX `\def` macros for every record, keyed by an alpha-only handle so the
/// names are valid control sequences.
pub fn macro_block(records: &[&Record]) -> String {
    let mut out = String::new();
    for record in records {
        let handle = make_handle(&record.refname);
        let _ = writeln!(out, "\\def\\{handle}{{{}}}", record.description);
        let _ = writeln!(out, "\\def\\{handle}Date{{{}}}", record.value);
        if !record.owner.is_empty() {
            let _ = writeln!(out, "\\def\\{handle}Owner{{{}}}", record.owner_display());
        }
    }
    out
}

/// TeX control sequences allow letters only, so digits transliterate to
/// words and common separators to their names.
pub fn make_handle(refname: &str) -> String {
    let mut handle = String::with_capacity(refname.len());
    for symbol in refname.chars() {
        match symbol {
            'a'..='z' | 'A'..='Z' => handle.push(symbol),
            '0' => handle.push_str("zero"),
            '1' => handle.push_str("one"),
            '2' => handle.push_str("two"),
            '3' => handle.push_str("three"),
            '4' => handle.push_str("four"),
            '5' => handle.push_str("five"),
            '6' => handle.push_str("six"),
            '7' => handle.push_str("seven"),
            '8' => handle.push_str("eight"),
            '9' => handle.push_str("nine"),
            '-' => handle.push_str("dash"),
            '.' => handle.push_str("dot"),
            ',' => handle.push_str("comma"),
            '_' => handle.push_str("underscore"),
            _ => handle.push('X'),
        }
    }
    handle
}
