use serde::Serialize;
use time::Date;

use crate::color::TimelineColor;
use crate::dates;
use crate::status::StatusCode;

/// Month span above which the right edge pads out to the 28th instead of
/// stopping at the month boundary.
const PAD_SPAN_MONTHS: i64 = 5;

/// One record prepared for layout: a resolved label, a date span, and the
/// classification that decides its shape and color.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub label: String,
    pub start: Date,
    pub end: Date,
    pub code: StatusCode,
    pub color: TimelineColor,
    pub predecessors: Vec<String>,
    pub annotation: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutOptions {
    pub show_completion_curve: bool,
}

/// Geometry of one row: a point event renders as a marker, a span as a bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum RowShape {
    Marker { date: Date },
    Bar { start: Date, end: Date },
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineRow {
    pub label: String,
    pub y: f64,
    #[serde(flatten)]
    pub shape: RowShape,
    pub color: TimelineColor,
    pub annotation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub date: Date,
    pub y: f64,
}

/// Elbow polyline from a dependent row back to its predecessor: horizontal
/// from the dependent's start to the predecessor's end, then vertical onto
/// the predecessor's row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Connector {
    pub from: Point,
    pub elbow: Point,
    pub to: Point,
}

/// Cumulative completion fraction sampled on a daily grid from the chart's
/// left edge to now.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionCurve {
    pub days: Vec<Date>,
    pub fraction: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineChart {
    pub extent: (Date, Date),
    pub now: Date,
    pub rows: Vec<TimelineRow>,
    pub connectors: Vec<Connector>,
    pub curve: Option<CompletionCurve>,
    pub warnings: Vec<String>,
}

/// Lays the entries out top to bottom in the order given. The extent snaps
/// to month boundaries around the occupied span.
pub fn layout(entries: &[TimelineEntry], now: Date, options: &LayoutOptions) -> TimelineChart {
    let mut warnings = Vec::new();
    let extent = chart_extent(entries, now);

    let mut rows = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let shape = if entry.start == entry.end {
            RowShape::Marker { date: entry.end }
        } else {
            RowShape::Bar {
                start: entry.start,
                end: entry.end,
            }
        };
        rows.push(TimelineRow {
            label: entry.label.clone(),
            y: 0.5 + index as f64 * 0.5,
            shape,
            color: entry.color.clone(),
            annotation: entry.annotation.clone(),
        });
    }

    let mut connectors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        for predecessor in &entry.predecessors {
            // Predecessors that are not on the chart draw nothing.
            let Some(target) = find_row(entries, predecessor) else {
                continue;
            };
            if target == index {
                continue;
            }
            let dependent_y = rows[index].y;
            let predecessor_y = rows[target].y;
            let predecessor_end = entries[target].end;
            connectors.push(Connector {
                from: Point {
                    date: entry.start,
                    y: dependent_y,
                },
                elbow: Point {
                    date: predecessor_end,
                    y: dependent_y,
                },
                to: Point {
                    date: predecessor_end,
                    y: predecessor_y,
                },
            });
        }
    }

    let curve = if options.show_completion_curve {
        completion_curve(entries, extent.0, now, &mut warnings)
    } else {
        None
    };

    TimelineChart {
        extent,
        now,
        rows,
        connectors,
        curve,
        warnings,
    }
}

fn chart_extent(entries: &[TimelineEntry], now: Date) -> (Date, Date) {
    let earliest = entries.iter().map(|entry| entry.start).min().unwrap_or(now);
    let latest = entries.iter().map(|entry| entry.end).max().unwrap_or(now);
    let low = dates::month_floor(earliest);
    let mut high = dates::next_month(latest);
    let span_months = (high.year() as i64 * 12 + i64::from(u8::from(high.month())))
        - (low.year() as i64 * 12 + i64::from(u8::from(low.month())));
    if span_months > PAD_SPAN_MONTHS {
        if let Ok(padded) = Date::from_calendar_date(high.year(), high.month(), 28) {
            high = padded;
        }
    }
    (low, high)
}

fn find_row(entries: &[TimelineEntry], predecessor: &str) -> Option<usize> {
    let needle = predecessor.to_lowercase();
    entries
        .iter()
        .position(|entry| entry.label.to_lowercase().contains(&needle))
}

/// The curve only makes sense for point events; any bar on the chart
/// disables it with a warning.
fn completion_curve(
    entries: &[TimelineEntry],
    left: Date,
    now: Date,
    warnings: &mut Vec<String>,
) -> Option<CompletionCurve> {
    if entries.iter().any(|entry| entry.start != entry.end) {
        warnings.push("completion curve skipped: chart contains date ranges".to_string());
        return None;
    }
    let total = entries
        .iter()
        .filter(|entry| entry.code != StatusCode::Removed)
        .count();
    if total == 0 || now < left {
        return None;
    }

    let mut days = Vec::new();
    let mut fraction = Vec::new();
    let mut day = left;
    while day <= now {
        let done = entries
            .iter()
            .filter(|entry| entry.code == StatusCode::Complete && entry.end <= day)
            .count();
        days.push(day);
        fraction.push(done as f64 / total as f64);
        let Some(next) = day.next_day() else {
            break;
        };
        day = next;
    }
    Some(CompletionCurve { days, fraction })
}

/// Disambiguates a duplicate label by appending `&` until it is unique.
/// Bounded so two identical labels cannot loop forever.
pub fn dedup_label(label: &str, existing: &[String]) -> String {
    let mut candidate = label.to_string();
    let mut attempts = 0;
    while existing.iter().any(|used| used == &candidate) && attempts < 32 {
        candidate.push('&');
        attempts += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::{dedup_label, layout, LayoutOptions, RowShape, TimelineEntry};
    use crate::color::TimelineColor;
    use crate::status::StatusCode;
    use time::macros::date;
    use time::Date;

    fn entry(label: &str, start: Date, end: Date, code: StatusCode) -> TimelineEntry {
        TimelineEntry {
            label: label.to_string(),
            start,
            end,
            code,
            color: TimelineColor::named("black"),
            predecessors: Vec::new(),
            annotation: String::new(),
        }
    }

    fn marker(label: &str, date: Date, code: StatusCode) -> TimelineEntry {
        entry(label, date, date, code)
    }

    const NOW: Date = date!(2020 - 06 - 15);

    #[test]
    fn extent_snaps_to_month_boundaries() {
        let entries = [
            marker("first", date!(2020 - 03 - 17), StatusCode::None),
            marker("second", date!(2020 - 06 - 02), StatusCode::None),
        ];
        let chart = layout(&entries, NOW, &LayoutOptions::default());
        assert_eq!(chart.extent, (date!(2020 - 03 - 01), date!(2020 - 07 - 01)));
    }

    #[test]
    fn long_spans_pad_the_right_edge() {
        let entries = [
            marker("first", date!(2020 - 01 - 10), StatusCode::None),
            marker("last", date!(2020 - 11 - 20), StatusCode::None),
        ];
        let chart = layout(&entries, NOW, &LayoutOptions::default());
        assert_eq!(chart.extent.1, date!(2020 - 12 - 28));
    }

    #[test]
    fn rows_step_by_half_and_pick_shapes() {
        let entries = [
            marker("point", date!(2020 - 05 - 01), StatusCode::None),
            entry(
                "span",
                date!(2020 - 05 - 01),
                date!(2020 - 06 - 01),
                StatusCode::None,
            ),
        ];
        let chart = layout(&entries, NOW, &LayoutOptions::default());
        assert_eq!(chart.rows[0].y, 0.5);
        assert_eq!(chart.rows[1].y, 1.0);
        assert_eq!(
            chart.rows[0].shape,
            RowShape::Marker {
                date: date!(2020 - 05 - 01)
            }
        );
        assert_eq!(
            chart.rows[1].shape,
            RowShape::Bar {
                start: date!(2020 - 05 - 01),
                end: date!(2020 - 06 - 01)
            }
        );
    }

    #[test]
    fn connectors_elbow_through_the_predecessor_end() {
        let mut dependent = marker("install receiver", date!(2020 - 06 - 01), StatusCode::None);
        dependent.predecessors = vec!["align dish".to_string()];
        let entries = [
            marker("align dish", date!(2020 - 04 - 01), StatusCode::Complete),
            dependent,
        ];
        let chart = layout(&entries, NOW, &LayoutOptions::default());
        assert_eq!(chart.connectors.len(), 1);
        let connector = chart.connectors[0];
        assert_eq!(connector.from.date, date!(2020 - 06 - 01));
        assert_eq!(connector.from.y, 1.0);
        assert_eq!(connector.elbow.date, date!(2020 - 04 - 01));
        assert_eq!(connector.elbow.y, 1.0);
        assert_eq!(connector.to.date, date!(2020 - 04 - 01));
        assert_eq!(connector.to.y, 0.5);
    }

    #[test]
    fn missing_predecessors_draw_nothing() {
        let mut dependent = marker("dependent", date!(2020 - 06 - 01), StatusCode::None);
        dependent.predecessors = vec!["never scheduled".to_string()];
        let chart = layout(&[dependent], NOW, &LayoutOptions::default());
        assert!(chart.connectors.is_empty());
    }

    #[test]
    fn completion_curve_counts_complete_markers() {
        let entries = [
            marker("done early", date!(2020 - 05 - 05), StatusCode::Complete),
            marker("pending", date!(2020 - 07 - 01), StatusCode::None),
            marker("dropped", date!(2020 - 05 - 10), StatusCode::Removed),
        ];
        let options = LayoutOptions {
            show_completion_curve: true,
        };
        let chart = layout(&entries, NOW, &options);
        let curve = chart.curve.expect("curve should exist");
        assert_eq!(curve.days.first(), Some(&chart.extent.0));
        assert_eq!(curve.days.last(), Some(&NOW));
        // Removed entries leave the denominator; one of two live entries is
        // complete by now.
        assert_eq!(curve.fraction.first(), Some(&0.0));
        assert_eq!(curve.fraction.last(), Some(&0.5));
    }

    #[test]
    fn ranges_disable_the_curve_with_a_warning() {
        let entries = [entry(
            "span",
            date!(2020 - 05 - 01),
            date!(2020 - 06 - 01),
            StatusCode::None,
        )];
        let options = LayoutOptions {
            show_completion_curve: true,
        };
        let chart = layout(&entries, NOW, &options);
        assert!(chart.curve.is_none());
        assert_eq!(chart.warnings.len(), 1);
    }

    #[test]
    fn duplicate_labels_grow_ampersands() {
        let existing = vec!["review".to_string(), "review&".to_string()];
        assert_eq!(dedup_label("review", &existing), "review&&");
        assert_eq!(dedup_label("unique", &existing), "unique");
    }
}
