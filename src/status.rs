use serde::Serialize;
use time::Date;

use crate::color::{lag_to_rgb, TimelineColor};
use crate::dates;

/// Discrete lifecycle classification derived from a record's status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Removed,
    Late,
    Moved,
    None,
    Complete,
    Unknown,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Removed => "removed",
            StatusCode::Late => "late",
            StatusCode::Moved => "moved",
            StatusCode::None => "none",
            StatusCode::Complete => "complete",
            StatusCode::Unknown => "unknown",
        }
    }

    fn from_token(token: &str) -> StatusCode {
        match token {
            "removed" => StatusCode::Removed,
            "late" => StatusCode::Late,
            "moved" => StatusCode::Moved,
            "none" | "notyet" => StatusCode::None,
            "complete" => StatusCode::Complete,
            _ => StatusCode::Unknown,
        }
    }

    /// Fixed palette entry for codes that do not blend on lag.
    pub fn palette_color(self) -> &'static str {
        match self {
            StatusCode::Removed => "white",
            StatusCode::Late => "red",
            StatusCode::Moved => "yellow",
            StatusCode::None => "black",
            StatusCode::Complete => "blue",
            StatusCode::Unknown => "magenta",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed form of one status string. The raw text is parsed exactly once
/// into this; nothing downstream re-reads the free text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub code: StatusCode,
    pub lag_days: f64,
    pub color: TimelineColor,
}

/// Classifies a record's status text against its scheduled date.
///
/// Pure in `(status_text, scheduled, now)`: the late reclassification
/// depends on the wall clock, so results must never be cached across calls
/// with a different `now`.
pub fn check_status(status_text: Option<&str>, scheduled: Date, now: Date) -> StatusReport {
    let trimmed = status_text.map(str::trim).unwrap_or("");
    let lowered = trimmed.to_lowercase();

    let mut tokens = lowered.split_whitespace();
    let code_token = tokens.next().unwrap_or("");
    let mut code = if code_token.is_empty() || code_token.starts_with("no") {
        StatusCode::None
    } else {
        StatusCode::from_token(code_token)
    };
    let mut color = TimelineColor::named(code.palette_color());

    // A removed record is never late; no time comparison applies.
    if code == StatusCode::Removed {
        return StatusReport {
            code,
            lag_days: 0.0,
            color,
        };
    }

    let mut lag_days = 0.0;
    // A missing or "no ..." status has no meaningful extra token.
    if let Some(extra) = tokens.next().filter(|_| code != StatusCode::None) {
        if let Ok(days) = extra.parse::<f64>() {
            lag_days = days;
        } else if let Some(actual) = dates::parse_date(extra) {
            lag_days = dates::days_between(scheduled, actual) as f64;
        } else {
            // Not a lag and not a date: the token is taken verbatim as the
            // render color.
            color = TimelineColor::named(extra);
        }
    }

    if now > scheduled && code != StatusCode::Complete {
        code = StatusCode::Late;
        color = TimelineColor::named(code.palette_color());
    } else if code == StatusCode::Complete {
        color = TimelineColor::Rgb(lag_to_rgb(lag_days));
    }

    StatusReport {
        code,
        lag_days,
        color,
    }
}
