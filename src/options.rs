use crate::error::ConversionError;
use crate::scaler::{TargetSize, UNITS_PER_MM};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_STITCH_DENSITY_MM: f64 = 2.5;
pub const DEFAULT_WIDTH_MM: f64 = 100.0;
pub const DEFAULT_HEIGHT_MM: f64 = 100.0;
pub const DEFAULT_DESIGN_NAME: &str = "Untitled";

/// Finest spacing the output can express: one PEC unit.
pub const MIN_STITCH_DENSITY_MM: f64 = 0.1;

/// What to do when a document has nothing to stitch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyDesignPolicy {
    /// Report `ConversionError::EmptyDesign` to the caller.
    #[default]
    Reject,
    /// Stitch a cross over the target area instead.
    Placeholder,
}

/// Conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversionOptions {
    pub stitch_density: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub empty_design: EmptyDesignPolicy,
    pub design_name: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            stitch_density: DEFAULT_STITCH_DENSITY_MM,
            width_mm: DEFAULT_WIDTH_MM,
            height_mm: DEFAULT_HEIGHT_MM,
            empty_design: EmptyDesignPolicy::Reject,
            design_name: DEFAULT_DESIGN_NAME.to_string(),
        }
    }
}

impl ConversionOptions {
    /// Parse an options object the way the web frontend sends it. Numeric
    /// options may arrive as JSON numbers or as numeric strings; absent keys
    /// keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConversionError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            ConversionError::InvalidOption {
                key: "options",
                reason: format!("not valid JSON: {}", e),
            }
        })?;
        let map = value.as_object().ok_or_else(|| ConversionError::InvalidOption {
            key: "options",
            reason: "expected a JSON object".to_string(),
        })?;
        Self::from_map(map)
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ConversionError> {
        let defaults = Self::default();
        let options = Self {
            stitch_density: number_option(map, "stitch_density", defaults.stitch_density)?,
            width_mm: number_option(map, "width_mm", defaults.width_mm)?,
            height_mm: number_option(map, "height_mm", defaults.height_mm)?,
            empty_design: match map.get("empty_design") {
                None | Some(Value::Null) => defaults.empty_design,
                Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                    ConversionError::InvalidOption {
                        key: "empty_design",
                        reason: format!("expected \"reject\" or \"placeholder\", got {}", value),
                    }
                })?,
            },
            design_name: match map.get("design_name") {
                Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
                _ => defaults.design_name,
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        ensure_positive("stitch_density", self.stitch_density)?;
        if self.stitch_density < MIN_STITCH_DENSITY_MM {
            return Err(ConversionError::InvalidOption {
                key: "stitch_density",
                reason: format!(
                    "must be at least {}mm, got {}",
                    MIN_STITCH_DENSITY_MM, self.stitch_density
                ),
            });
        }
        ensure_positive("width_mm", self.width_mm)?;
        ensure_positive("height_mm", self.height_mm)
    }

    pub fn target_size(&self) -> TargetSize {
        TargetSize {
            width_mm: self.width_mm,
            height_mm: self.height_mm,
        }
    }

    /// Stitch spacing in output units (tenths of a millimeter).
    pub fn density_units(&self) -> f64 {
        self.stitch_density * UNITS_PER_MM
    }
}

fn ensure_positive(key: &'static str, value: f64) -> Result<(), ConversionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConversionError::InvalidOption {
            key,
            reason: format!("must be a positive number, got {}", value),
        })
    }
}

fn number_option(
    map: &Map<String, Value>,
    key: &'static str,
    default: f64,
) -> Result<f64, ConversionError> {
    let invalid = |value: &Value| ConversionError::InvalidOption {
        key,
        reason: format!("expected a number, got {}", value),
    };
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(&Value::Number(n.clone()))),
        Some(value @ Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(value)),
        Some(other) => Err(invalid(other)),
    }
}

/// UI description of one conversion option
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptionDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub default: Value,
    pub description: &'static str,
}

/// Options a frontend can offer for a conversion, with their defaults.
pub fn option_descriptors() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor {
            key: "stitch_density",
            label: "Stitch Density (mm)",
            kind: "number",
            default: json!(DEFAULT_STITCH_DENSITY_MM),
            description: "Distance between stitches along a path. Lower values stitch denser.",
        },
        OptionDescriptor {
            key: "width_mm",
            label: "Design Width (mm)",
            kind: "number",
            default: json!(DEFAULT_WIDTH_MM),
            description: "Final embroidery width in millimeters.",
        },
        OptionDescriptor {
            key: "height_mm",
            label: "Design Height (mm)",
            kind: "number",
            default: json!(DEFAULT_HEIGHT_MM),
            description: "Final embroidery height in millimeters.",
        },
        OptionDescriptor {
            key: "empty_design",
            label: "When Nothing Can Be Stitched",
            kind: "choice",
            default: json!("reject"),
            description: "\"reject\" reports an error; \"placeholder\" stitches a cross instead.",
        },
    ]
}
