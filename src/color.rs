use serde::Serialize;

/// Lag beyond which the completion color saturates.
pub const SATURATION_DAYS: f64 = 90.0;

pub type Rgb = [f64; 3];

/// A render color for one timeline row: either a named palette entry or a
/// continuous blend computed from completion lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimelineColor {
    Named(String),
    Rgb(Rgb),
}

impl TimelineColor {
    pub fn named(name: &str) -> Self {
        TimelineColor::Named(name.to_string())
    }
}

impl std::fmt::Display for TimelineColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelineColor::Named(name) => f.write_str(name),
            TimelineColor::Rgb([r, g, b]) => write!(f, "rgb({r:.2},{g:.2},{b:.2})"),
        }
    }
}

/// Maps a signed completion lag in days onto a continuous 3-channel color.
///
/// Clipped at +/-90 days: far-early saturates to pure green, far-late to
/// pure blue. Inside the interval two Gaussian falloffs blend the channels
/// so neighboring lags never band.
pub fn lag_to_rgb(lag_days: f64) -> Rgb {
    if lag_days <= -SATURATION_DAYS {
        return [0.0, 1.0, 0.0];
    }
    if lag_days >= SATURATION_DAYS {
        return [0.0, 0.0, 1.0];
    }

    let falloff = 2.0 * SATURATION_DAYS * SATURATION_DAYS;
    let taper_width = 10.0;
    // Linear tapers pin the minor channels to zero at the clip boundaries so
    // the blend meets the saturated endpoints without a jump.
    let late_taper = ((SATURATION_DAYS - lag_days) / taper_width).clamp(0.0, 1.0);
    let early_taper = ((lag_days + SATURATION_DAYS) / taper_width).clamp(0.0, 1.0);

    let blue = (-(lag_days - SATURATION_DAYS).powi(2) / falloff).exp() * early_taper;
    let green = (-(lag_days + SATURATION_DAYS).powi(2) / falloff).exp() * late_taper;
    let red = 0.5 * blue * late_taper;
    [red, green, blue]
}
