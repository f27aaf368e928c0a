/*
Analysis options

Options come from an optional JSON file and are then overridden from the
command line. Numeric fields are user input: they may be given as numbers or as
text, and anything that does not parse to a finite number falls back to the
documented default (detected box bound, first/last lag time) with a warning
instead of failing the whole run.

    {
        "periodic": true,
        "box": { "x_min": 0, "x_max": "25.0" },
        "t_start": 10,
        "t_end": "400"
    }
 */

use crate::diffusion::TimeRange;
use crate::error::{MsdError, Result};
use crate::pbc::periodic_boundary_conditions::AxisOverride;

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A numeric field as typed by the user.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UserValue {
    Number(f64),
    Text(String),
}

impl UserValue {
    /// `None` (with a warning) when the value is not a finite number.
    pub fn parse(&self, field: &str) -> Option<f64> {
        let parsed = match self {
            UserValue::Number(value) => Some(*value).filter(|v| v.is_finite()),
            UserValue::Text(text) => parse_user_number(text),
        };
        if parsed.is_none() {
            log::warn!("Ignoring malformed value {self:?} for `{field}`; using the default");
        }
        parsed
    }
}

impl From<&str> for UserValue {
    fn from(text: &str) -> Self {
        UserValue::Text(text.to_string())
    }
}

pub fn parse_user_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_field(value: &Option<UserValue>, field: &str) -> Option<f64> {
    value.as_ref().and_then(|v| v.parse(field))
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BoxConfig {
    pub x_min: Option<UserValue>,
    pub x_max: Option<UserValue>,
    pub y_min: Option<UserValue>,
    pub y_max: Option<UserValue>,
    pub z_min: Option<UserValue>,
    pub z_max: Option<UserValue>,
}

impl BoxConfig {
    pub fn overrides(&self) -> [AxisOverride; 3] {
        [
            AxisOverride {
                min: parse_field(&self.x_min, "box.x_min"),
                max: parse_field(&self.x_max, "box.x_max"),
            },
            AxisOverride {
                min: parse_field(&self.y_min, "box.y_min"),
                max: parse_field(&self.y_max, "box.y_max"),
            },
            AxisOverride {
                min: parse_field(&self.z_min, "box.z_min"),
                max: parse_field(&self.z_max, "box.z_max"),
            },
        ]
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Unwrap periodic boundaries before the MSD.
    pub periodic: bool,
    #[serde(rename = "box")]
    pub box_bounds: BoxConfig,
    /// Fit window.
    pub t_start: Option<UserValue>,
    pub t_end: Option<UserValue>,
    /// Plot window.
    pub x_start: Option<UserValue>,
    pub x_end: Option<UserValue>,
    pub show_progress: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            periodic: false,
            box_bounds: BoxConfig::default(),
            t_start: None,
            t_end: None,
            x_start: None,
            x_end: None,
            show_progress: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| MsdError::io(path, e))?;
        let config: AnalysisConfig = serde_json::from_str(&text)?;
        log::debug!("Loaded analysis config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn fit_range(&self) -> TimeRange {
        TimeRange::new(
            parse_field(&self.t_start, "t_start"),
            parse_field(&self.t_end, "t_end"),
        )
    }

    pub fn plot_range(&self) -> (Option<f64>, Option<f64>) {
        (
            parse_field(&self.x_start, "x_start"),
            parse_field(&self.x_end, "x_end"),
        )
    }

    pub fn wants_plot_window(&self) -> bool {
        self.x_start.is_some() || self.x_end.is_some()
    }
}
