//! Output registry
//!
//! Tracks the compositor's outputs. An announced output is bound right away
//! but only becomes visible once its first metadata burst has arrived, so
//! callers never see a half-described output.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::OutputInfo;
use crate::types::{Point, Size};

/// Physical kind of an output, derived from its connector name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Built-in panel
    Laptop,
    /// External monitor (also the fallback)
    Monitor,
    Television,
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputType::Laptop => write!(f, "Laptop"),
            OutputType::Monitor => write!(f, "Monitor"),
            OutputType::Television => write!(f, "Television"),
        }
    }
}

/// Connector prefixes of built-in panels, matched case-insensitively
const EMBEDDED_PREFIXES: [&str; 4] = ["LVDS", "IDP", "EDP", "LCD"];

/// Classify a connector name.
///
/// Panel prefixes are checked before the generic monitor patterns; the
/// order matters ("eDP" must not fall through to the "DP" rule).
pub fn classify_connector(connector: &str) -> OutputType {
    let upper = connector.to_ascii_uppercase();
    if EMBEDDED_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return OutputType::Laptop;
    }

    if connector.contains("VGA")
        || connector.contains("DVI")
        || connector.contains("HDMI")
        || connector.contains("Panel")
        || connector.contains("DisplayPort")
        || connector.starts_with("DP")
        || connector.contains("unknown")
    {
        OutputType::Monitor
    } else if connector.contains("TV") {
        OutputType::Television
    } else {
        OutputType::Monitor
    }
}

/// A fully described output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Registry name of the `wl_output` global
    pub name: u32,
    /// Version the global was bound at
    pub version: u32,
    pub connector: String,
    pub output_type: OutputType,
    pub manufacturer: String,
    pub model: String,
    pub pixel_size: Size,
    pub global_position: Point,
}

impl Output {
    fn from_info(info: OutputInfo, version: u32) -> Self {
        Self {
            name: info.name,
            version,
            output_type: classify_connector(&info.connector),
            connector: info.connector,
            manufacturer: info.manufacturer,
            model: info.model,
            pixel_size: info.pixel_size,
            global_position: info.global_position,
        }
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} ({} @ {})",
            self.connector, self.manufacturer, self.model, self.pixel_size, self.global_position
        )
    }
}

/// Live set of outputs
#[derive(Debug, Default)]
pub struct OutputRegistry {
    /// Every bound output, name -> bound version
    bound: HashMap<u32, u32>,
    /// Outputs that have described themselves at least once
    outputs: BTreeMap<u32, Output>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly bound output; it stays hidden until described
    pub fn announce(&mut self, name: u32, version: u32) {
        self.bound.insert(name, version);
    }

    /// Build or refresh an output from its metadata.
    ///
    /// Metadata for an output that is not bound (never announced, or
    /// already removed) is dropped.
    pub fn on_changed(&mut self, info: OutputInfo) -> Option<&Output> {
        let Some(&version) = self.bound.get(&info.name) else {
            debug!(name = info.name, "Ignoring metadata for unbound output");
            return None;
        };

        let output = Output::from_info(info, version);
        debug!("Adding output:");
        debug!("    manufacturer: {}", output.manufacturer);
        debug!("    model: {}", output.model);
        debug!("    resolution: {}", output.pixel_size);

        let name = output.name;
        self.outputs.insert(name, output);
        self.outputs.get(&name)
    }

    /// Forget an output; returns whether it was bound
    pub fn remove(&mut self, name: u32) -> bool {
        let was_bound = self.bound.remove(&name).is_some();
        if let Some(output) = self.outputs.remove(&name) {
            debug!("Removing output:");
            debug!("    manufacturer: {}", output.manufacturer);
            debug!("    model: {}", output.model);
        }
        was_bound
    }

    pub fn get(&self, name: u32) -> Option<&Output> {
        self.outputs.get(&name)
    }

    pub fn is_bound(&self, name: u32) -> bool {
        self.bound.contains_key(&name)
    }

    /// True once every bound output has described itself
    pub fn is_settled(&self) -> bool {
        self.bound.keys().all(|name| self.outputs.contains_key(name))
    }

    /// Snapshot of the visible outputs, ordered by registry name
    pub fn screens(&self) -> BTreeMap<u32, Output> {
        self.outputs.clone()
    }

    pub fn clear(&mut self) {
        self.bound.clear();
        self.outputs.clear();
    }
}
