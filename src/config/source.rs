//! Source descriptors: one embedded content region per entry in `sources`
//!
//! Descriptors are lenient by policy. Bad sizes fall back to 300px and bad
//! positions fall back to the top-left corner; neither is a load error.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::constants::layout::DEFAULT_SOURCE_SIZE;

/// Window corner a keyword position anchors to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Corner {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    #[cfg(test)]
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "top-left" => Some(Corner::TopLeft),
            "top-right" => Some(Corner::TopRight),
            "bottom-left" => Some(Corner::BottomLeft),
            "bottom-right" => Some(Corner::BottomRight),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn keyword(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }
}

/// Where a source sits inside the overlay window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSpec {
    /// Anchored to a window corner with zero inset
    Keyword(Corner),
    /// Pixel offset from the window's top-left origin
    Absolute { x: i32, y: i32 },
}

impl Default for PositionSpec {
    fn default() -> Self {
        PositionSpec::Keyword(Corner::default())
    }
}

impl PositionSpec {
    /// Interpret a raw `position` value.
    ///
    /// Returns `None` when the value had to fall back to `top-left`
    /// (unknown keyword, object missing `x` or `y`, any other shape).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(keyword) => Corner::from_keyword(keyword).map(PositionSpec::Keyword),
            Value::Object(map) => {
                let x = map.get("x").and_then(coordinate)?;
                let y = map.get("y").and_then(coordinate)?;
                Some(PositionSpec::Absolute { x, y })
            }
            _ => None,
        }
    }
}

/// One configured content region
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawSource")]
pub struct SourceDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub position: PositionSpec,
}

#[cfg(test)]
impl SourceDescriptor {
    pub fn new(url: impl Into<String>, width: u32, height: u32, position: PositionSpec) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            position,
        }
    }
}

/// Wire shape of a source; every field except `url` is taken as raw JSON so
/// malformed values can be defaulted instead of failing the whole document.
#[derive(Deserialize)]
struct RawSource {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: Option<Value>,
    #[serde(default)]
    height: Option<Value>,
    #[serde(default)]
    position: Option<Value>,
}

impl From<RawSource> for SourceDescriptor {
    fn from(raw: RawSource) -> Self {
        if raw.url.is_empty() {
            warn!("source has no url, region will be empty");
        }

        let width = dimension(raw.width.as_ref(), "width", &raw.url);
        let height = dimension(raw.height.as_ref(), "height", &raw.url);

        let position = match raw.position.as_ref() {
            None | Some(Value::Null) => PositionSpec::default(),
            Some(value) => PositionSpec::from_value(value).unwrap_or_else(|| {
                warn!(url = %raw.url, position = %value, "invalid position, falling back to top-left");
                PositionSpec::default()
            }),
        };

        Self {
            url: raw.url,
            width,
            height,
            position,
        }
    }
}

/// Accepts numbers and numeric strings
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coordinate(value: &Value) -> Option<i32> {
    number(value).map(|n| n.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}

/// Width/height: anything that is not a positive number becomes the default;
/// sizes are capped to the X coordinate range the layout works in
fn dimension(value: Option<&Value>, field: &str, url: &str) -> u32 {
    let Some(value) = value else {
        return DEFAULT_SOURCE_SIZE;
    };
    match number(value).map(f64::round) {
        Some(n) if n >= 1.0 => n.min(i32::MAX as f64) as u32,
        _ => {
            if !value.is_null() {
                warn!(url = %url, field = field, value = %value, default = DEFAULT_SOURCE_SIZE, "invalid source dimension, using default");
            }
            DEFAULT_SOURCE_SIZE
        }
    }
}
