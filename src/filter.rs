use time::Date;

use crate::dates;
use crate::status::StatusReport;
use crate::store::Record;

/// Filter values that match everything for their field.
const PASS_THRU: [&str; 4] = ["any", "all", "n/a", "-1"];

fn is_pass_thru(values: &[String]) -> bool {
    values.is_empty()
        || values
            .iter()
            .all(|value| PASS_THRU.contains(&value.to_lowercase().as_str()))
}

/// Conjunctive field filter: a record passes only if every populated field
/// accepts it. Each field holds the accepted values; "any"/"all"/"n/a"/"-1"
/// pass everything.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub dtype: Vec<String>,
    pub status: Vec<String>,
    pub owner: Vec<String>,
    pub other: Vec<String>,
    pub id: Vec<String>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        RecordFilter {
            dtype: vec!["all".to_string()],
            status: vec!["all".to_string()],
            owner: vec!["all".to_string()],
            other: vec!["all".to_string()],
            id: vec!["-1".to_string()],
        }
    }
}

impl RecordFilter {
    /// Tests the record's fields. The status field compares the computed
    /// classification, not the raw status text, so "late" matches records
    /// that were reclassified past due.
    pub fn matches(&self, record: &Record, report: &StatusReport) -> bool {
        if !accepts(&self.dtype, &record.dtype) {
            return false;
        }
        if !is_pass_thru(&self.status)
            && !self
                .status
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(report.code.as_str()))
        {
            return false;
        }
        if !self.owner_matches(record) {
            return false;
        }
        if !accepts(&self.other, &record.other) {
            return false;
        }
        if !is_pass_thru(&self.id)
            && !self.id.iter().any(|wanted| {
                wanted
                    .trim()
                    .parse::<i64>()
                    .map(|id| id == record.id)
                    .unwrap_or(false)
            })
        {
            return false;
        }
        true
    }

    // An unowned record is treated as owned by "None" so it can still be
    // selected for.
    fn owner_matches(&self, record: &Record) -> bool {
        if is_pass_thru(&self.owner) {
            return true;
        }
        let none_owner = ["None".to_string()];
        let owners: &[String] = if record.owner.is_empty() {
            &none_owner
        } else {
            &record.owner
        };
        self.owner.iter().any(|wanted| {
            owners
                .iter()
                .any(|owner| owner.eq_ignore_ascii_case(wanted.trim()))
        })
    }
}

fn accepts(filter: &[String], actual: &str) -> bool {
    if is_pass_thru(filter) {
        return true;
    }
    filter
        .iter()
        .any(|wanted| wanted.trim().eq_ignore_ascii_case(actual.trim()))
}

/// Which per-record date a time filter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    /// The scheduled date parsed from the value field; a range is judged by
    /// its end.
    Scheduled,
    /// Date of the latest audit entry.
    Updated,
    /// Date of the level-0 audit entry.
    Initialized,
}

impl TimeField {
    pub fn parse(raw: &str) -> Option<TimeField> {
        match raw.trim().to_lowercase().as_str() {
            "value" | "scheduled" | "range" => Some(TimeField::Scheduled),
            "updated" => Some(TimeField::Updated),
            "initialized" | "created" => Some(TimeField::Initialized),
            _ => None,
        }
    }
}

/// Inclusive date window over one record date. `low` only selects on-or-
/// after, `high` only selects on-or-before, both select the interval.
/// Records whose date is absent or unparseable never match.
#[derive(Debug, Clone, Copy)]
pub struct TimeFilter {
    pub field: TimeField,
    pub low: Option<Date>,
    pub high: Option<Date>,
}

impl TimeFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let Some(date) = self.record_date(record) else {
            return false;
        };
        if let Some(low) = self.low {
            if date < low {
                return false;
            }
        }
        if let Some(high) = self.high {
            if date > high {
                return false;
            }
        }
        true
    }

    fn record_date(&self, record: &Record) -> Option<Date> {
        match self.field {
            TimeField::Scheduled => dates::scheduled_date(&record.value),
            TimeField::Updated => record.updated.as_deref().and_then(dates::parse_date),
            TimeField::Initialized => record.initialized.as_deref().and_then(dates::parse_date),
        }
    }
}

/// How strictly a text search compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    /// Case-insensitive substring.
    Weak,
    /// Case-sensitive substring.
    Moderate,
    /// Case-insensitive whole-field equality.
    Strong,
    /// Exact equality.
    VeryStrong,
}

/// Tests `query` against one named field, or against every text field when
/// `field` is `None`.
pub fn matches_text(
    record: &Record,
    field: Option<&str>,
    query: &str,
    strength: MatchStrength,
) -> bool {
    let haystacks: Vec<String> = match field {
        Some(name) => match field_text(record, name) {
            Some(text) => vec![text],
            None => return false,
        },
        None => ALL_TEXT_FIELDS
            .iter()
            .filter_map(|name| field_text(record, name))
            .collect(),
    };
    haystacks.iter().any(|text| match strength {
        MatchStrength::Weak => text.to_lowercase().contains(&query.to_lowercase()),
        MatchStrength::Moderate => text.contains(query),
        MatchStrength::Strong => text.eq_ignore_ascii_case(query),
        MatchStrength::VeryStrong => text == query,
    })
}

const ALL_TEXT_FIELDS: [&str; 9] = [
    "refname",
    "value",
    "description",
    "dtype",
    "status",
    "owner",
    "other",
    "notes",
    "commentary",
];

fn field_text(record: &Record, field: &str) -> Option<String> {
    match field {
        "refname" => Some(record.refname.clone()),
        "value" => Some(record.value.clone()),
        "description" => Some(record.description.clone()),
        "dtype" => Some(record.dtype.clone()),
        "status" => record.status.clone(),
        "owner" => Some(record.owner_display()),
        "other" => Some(record.other.clone()),
        "notes" => Some(record.notes.clone()),
        "commentary" => Some(record.commentary.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{matches_text, MatchStrength, RecordFilter, TimeField, TimeFilter};
    use crate::status::check_status;
    use crate::store::Record;
    use std::collections::BTreeMap;
    use time::macros::date;

    fn sample(status: Option<&str>, owner: &[&str]) -> Record {
        Record {
            refname: "receiverinstalled".to_string(),
            value: "20/06/01".to_string(),
            description: "Receiver installed".to_string(),
            dtype: "integration".to_string(),
            status: status.map(str::to_string),
            owner: owner.iter().map(|o| o.to_string()).collect(),
            other: "north".to_string(),
            notes: String::new(),
            commentary: String::new(),
            id: 7,
            traces: BTreeMap::new(),
            updates: Vec::new(),
            updated: Some("20/05/20".to_string()),
            initialized: Some("20/01/10".to_string()),
        }
    }

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_filter_passes_everything() {
        let record = sample(None, &[]);
        let report = check_status(None, date!(2020 - 06 - 01), date!(2020 - 05 - 01));
        assert!(RecordFilter::default().matches(&record, &report));
    }

    #[test]
    fn fields_combine_conjunctively() {
        let record = sample(Some("complete"), &["ito"]);
        let report = check_status(
            record.status.as_deref(),
            date!(2020 - 06 - 01),
            date!(2020 - 05 - 01),
        );

        let mut filter = RecordFilter::default();
        filter.dtype = strings(&["integration"]);
        filter.owner = strings(&["ito"]);
        assert!(filter.matches(&record, &report));

        filter.other = strings(&["south"]);
        assert!(!filter.matches(&record, &report));
    }

    #[test]
    fn status_filter_sees_the_computed_code() {
        // Raw status says "moved" but the record is past due, so it
        // classifies late.
        let record = sample(Some("moved"), &[]);
        let report = check_status(
            record.status.as_deref(),
            date!(2020 - 06 - 01),
            date!(2020 - 07 - 01),
        );

        let mut late = RecordFilter::default();
        late.status = strings(&["late"]);
        assert!(late.matches(&record, &report));

        let mut moved = RecordFilter::default();
        moved.status = strings(&["moved"]);
        assert!(!moved.matches(&record, &report));
    }

    #[test]
    fn unowned_records_match_owner_none() {
        let record = sample(None, &[]);
        let report = check_status(None, date!(2020 - 06 - 01), date!(2020 - 05 - 01));
        let mut filter = RecordFilter::default();
        filter.owner = strings(&["None"]);
        assert!(filter.matches(&record, &report));

        filter.owner = strings(&["ito"]);
        assert!(!filter.matches(&record, &report));
    }

    #[test]
    fn id_filter_matches_numerically() {
        let record = sample(None, &[]);
        let report = check_status(None, date!(2020 - 06 - 01), date!(2020 - 05 - 01));
        let mut filter = RecordFilter::default();
        filter.id = strings(&["3", "7"]);
        assert!(filter.matches(&record, &report));

        filter.id = strings(&["3"]);
        assert!(!filter.matches(&record, &report));

        filter.id = strings(&["-1"]);
        assert!(filter.matches(&record, &report));
    }

    #[test]
    fn time_filter_bounds_are_inclusive() {
        let record = sample(None, &[]);
        let scheduled = TimeFilter {
            field: TimeField::Scheduled,
            low: Some(date!(2020 - 06 - 01)),
            high: Some(date!(2020 - 06 - 01)),
        };
        assert!(scheduled.matches(&record));

        let updated_after = TimeFilter {
            field: TimeField::Updated,
            low: Some(date!(2020 - 06 - 01)),
            high: None,
        };
        assert!(!updated_after.matches(&record));

        let initialized_before = TimeFilter {
            field: TimeField::Initialized,
            low: None,
            high: Some(date!(2020 - 02 - 01)),
        };
        assert!(initialized_before.matches(&record));
    }

    #[test]
    fn unparseable_dates_never_match_time_filters() {
        let mut record = sample(None, &[]);
        record.value = "when funded".to_string();
        let filter = TimeFilter {
            field: TimeField::Scheduled,
            low: None,
            high: Some(date!(2030 - 01 - 01)),
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn time_field_parses_aliases() {
        assert_eq!(TimeField::parse("Value"), Some(TimeField::Scheduled));
        assert_eq!(TimeField::parse("updated"), Some(TimeField::Updated));
        assert_eq!(TimeField::parse("created"), Some(TimeField::Initialized));
        assert_eq!(TimeField::parse("someday"), None);
    }

    #[test]
    fn text_match_strengths_tighten() {
        let record = sample(None, &[]);
        assert!(matches_text(
            &record,
            Some("description"),
            "receiver",
            MatchStrength::Weak
        ));
        assert!(!matches_text(
            &record,
            Some("description"),
            "receiver",
            MatchStrength::Moderate
        ));
        assert!(matches_text(
            &record,
            Some("description"),
            "receiver installed",
            MatchStrength::Strong
        ));
        assert!(!matches_text(
            &record,
            Some("description"),
            "receiver installed",
            MatchStrength::VeryStrong
        ));
        assert!(matches_text(&record, None, "north", MatchStrength::Weak));
        assert!(!matches_text(
            &record,
            Some("nosuch"),
            "north",
            MatchStrength::Weak
        ));
    }
}
