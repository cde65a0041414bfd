use std::io::{self, IsTerminal};

use serde::Serialize;

use crate::app::RecordView;
use crate::color::TimelineColor;
use crate::export;
use crate::timeline::{RowShape, TimelineChart};

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("warning: cannot render JSON: {err}"),
    }
}

pub fn print_listing(caption: &str, views: &[RecordView]) {
    let palette = Palette::auto();
    println!("{}", palette.heading(caption));

    if views.is_empty() {
        println!("{}", palette.dim("no records matched"));
        return;
    }

    for view in views {
        let line = export::listing_line(&view.record, &view.report);
        println!("{}", palette.by_color(&view.report.color, &line));
    }
    println!("{}", palette.dim(&format!("{} record(s)", views.len())));
}

pub fn print_record(view: &RecordView) {
    let record = &view.record;
    let report = &view.report;
    let palette = Palette::auto();
    println!("{}", palette.heading(&record.description));
    println!("  refname:  {}", record.refname);
    println!("  id:       {}", record.id);
    println!("  value:    {}", record.value);
    println!("  dtype:    {}", record.dtype);
    println!(
        "  status:   {} ({})",
        record.status.as_deref().unwrap_or(""),
        palette.by_color(&report.color, report.code.as_str())
    );
    println!("  owner:    {}", record.owner_display());
    if !record.other.is_empty() {
        println!("  other:    {}", record.other);
    }
    if !record.notes.is_empty() {
        println!("  notes:    {}", record.notes);
    }
    if !record.commentary.is_empty() {
        println!("  comment:  {}", record.commentary);
    }

    for (tracetype, names) in &record.traces {
        println!("  {tracetype} traces: {}", names.join(", "));
    }

    if !record.updates.is_empty() {
        println!("{}", palette.dim("history:"));
        for event in &record.updates {
            let note = if event.note.is_empty() {
                String::new()
            } else {
                format!("  {}", event.note)
            };
            println!(
                "  {:>3}  {}  {:10.10}{}",
                event.level, event.updated, event.by, note
            );
        }
    }
}

pub fn print_timeline(caption: &str, chart: &TimelineChart) {
    let palette = Palette::auto();
    println!("{}", palette.heading(caption));
    println!(
        "{}",
        palette.dim(&format!(
            "{} .. {}  (now: {})",
            chart.extent.0, chart.extent.1, chart.now
        ))
    );

    for row in &chart.rows {
        let span = match row.shape {
            RowShape::Marker { date } => format!("{date}            ◆"),
            RowShape::Bar { start, end } => format!("{start}..{end}"),
        };
        let mut line = format!("{span}  {}", row.label);
        if !row.annotation.is_empty() {
            line.push_str(&format!("  [{}]", row.annotation));
        }
        println!("{}", palette.by_color(&row.color, &line));
    }

    if !chart.connectors.is_empty() {
        println!(
            "{}",
            palette.dim(&format!("{} dependency link(s)", chart.connectors.len()))
        );
    }
    if let Some(curve) = &chart.curve {
        if let Some(fraction) = curve.fraction.last() {
            println!(
                "{}",
                palette.dim(&format!("completed to date: {:.0}%", fraction * 100.0))
            );
        }
    }
    for warning in &chart.warnings {
        eprintln!("warning: {warning}");
    }
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    pub fn by_color(&self, color: &TimelineColor, text: &str) -> String {
        self.paint(ansi_color_code(color), text)
    }
}

fn ansi_color_code(color: &TimelineColor) -> &'static str {
    match color {
        TimelineColor::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
            "red" => "31",
            "green" => "32",
            "yellow" | "orange" => "33",
            "blue" => "34",
            "magenta" => "35",
            "cyan" => "36",
            "white" => "37",
            _ => "39",
        },
        // Terminal output cannot show the continuous blend; pick the
        // dominant channel.
        TimelineColor::Rgb([red, green, blue]) => {
            if green >= blue && green >= red {
                "32"
            } else if blue >= red {
                "34"
            } else {
                "31"
            }
        }
    }
}
