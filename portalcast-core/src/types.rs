//! Core types for Portalcast
//!
//! Geometry, cursor and source enumerations shared by the registry, the
//! capture negotiation and the input gate.

use serde::{Deserialize, Serialize};

/// Integer position in compositor-global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Floating point position, as supplied by portal callers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Shift by an integer offset
    pub fn offset_by(self, offset: Point) -> Self {
        Self {
            x: self.x + f64::from(offset.x),
            y: self.y + f64::from(offset.y),
        }
    }
}

/// Pixel size of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Cursor representation requested for a capture stream
///
/// The discriminants are the values of the screencast protocol's
/// `pointer` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Cursor not drawn
    #[default]
    Hidden = 1,
    /// Cursor composited into the frames
    Embedded = 2,
    /// Cursor delivered as stream metadata
    Metadata = 4,
}

impl CursorMode {
    /// Protocol wire value
    pub fn wire_value(self) -> u32 {
        self as u32
    }
}

impl std::str::FromStr for CursorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hidden" | "none" => Ok(Self::Hidden),
            "embedded" => Ok(Self::Embedded),
            "metadata" => Ok(Self::Metadata),
            _ => Err(format!("Unknown cursor mode: {}", s)),
        }
    }
}

/// Kind of source behind a capture session
///
/// Values follow the portal `source_type` bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Full output capture
    Monitor = 1,
    /// Single window capture
    Window = 2,
}

impl SourceType {
    /// Portal wire value
    pub fn wire_value(self) -> u32 {
        self as u32
    }

    /// Parse a portal wire value
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Monitor),
            2 => Some(Self::Window),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Monitor => write!(f, "Monitor"),
            SourceType::Window => write!(f, "Window"),
        }
    }
}

/// Scroll axis orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// `wl_pointer.axis` value
    pub fn axis_value(self) -> u32 {
        match self {
            Orientation::Vertical => 0,
            Orientation::Horizontal => 1,
        }
    }
}

/// Protocol capabilities the integration binds during registry setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `zkde_screencast_unstable_v1`
    Screencast,
    /// `org_kde_kwin_fake_input`
    FakeInput,
    /// `org_kde_plasma_window_management`
    WindowManagement,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Screencast => write!(f, "screencast"),
            Capability::FakeInput => write!(f, "fake input"),
            Capability::WindowManagement => write!(f, "window management"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_mode_wire_values() {
        assert_eq!(CursorMode::Hidden.wire_value(), 1);
        assert_eq!(CursorMode::Embedded.wire_value(), 2);
        assert_eq!(CursorMode::Metadata.wire_value(), 4);
        assert_eq!("Embedded".parse::<CursorMode>(), Ok(CursorMode::Embedded));
        assert!("sparkly".parse::<CursorMode>().is_err());
    }

    #[test]
    fn test_source_type_round_trip() {
        for kind in [SourceType::Monitor, SourceType::Window] {
            assert_eq!(SourceType::from_wire(kind.wire_value()), Some(kind));
        }
        assert_eq!(SourceType::from_wire(4), None);
    }

    #[test]
    fn test_point_offset() {
        let moved = PointF::new(10.5, 20.0).offset_by(Point::new(1920, -5));
        assert_eq!(moved, PointF::new(1930.5, 15.0));
    }
}
