//! Stream descriptor encoding for the portal's D-Bus surface.
//!
//! The active sessions are exposed as `a(ua{sv})`: an ordered array of
//! (PipeWire node id, attribute vardict) structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zbus::zvariant::{OwnedValue, Value};

use crate::error::{PortalcastError, Result};
use crate::types::{Point, SourceType, Size};

/// D-Bus signature of the encoded stream list
pub const STREAMS_SIGNATURE: &str = "a(ua{sv})";

pub const KEY_SOURCE_TYPE: &str = "source_type";
pub const KEY_SIZE: &str = "size";
pub const KEY_POSITION_X: &str = "screenpositionX";
pub const KEY_POSITION_Y: &str = "screenpositionY";

/// Attributes published for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub source_type: SourceType,
    /// Pixel size; only known for output streams
    pub size: Option<Size>,
    /// Offset of the captured area in the compositor-global space
    pub screen_position: Point,
}

impl StreamMetadata {
    /// Attributes of an output stream
    pub fn monitor(size: Size, position: Point) -> Self {
        Self {
            source_type: SourceType::Monitor,
            size: Some(size),
            screen_position: position,
        }
    }

    /// Attributes of a window stream; absolute positioning does not apply
    pub fn window() -> Self {
        Self {
            source_type: SourceType::Window,
            size: None,
            screen_position: Point::default(),
        }
    }
}

/// One entry of the stream list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// PipeWire node id
    pub node_id: u32,
    pub metadata: StreamMetadata,
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stream({}, {}", self.node_id, self.metadata.source_type)?;
        if let Some(size) = self.metadata.size {
            write!(f, " {}", size)?;
        }
        write!(f, " @ {})", self.metadata.screen_position)
    }
}

/// Encode descriptors as an `a(ua{sv})` value, preserving order
pub fn encode_streams(descriptors: &[StreamDescriptor]) -> Result<OwnedValue> {
    let mut entries: Vec<(u32, HashMap<String, OwnedValue>)> =
        Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let metadata = &descriptor.metadata;
        let mut dict: HashMap<String, OwnedValue> = HashMap::new();
        dict.insert(
            KEY_SOURCE_TYPE.to_string(),
            OwnedValue::from(metadata.source_type.wire_value()),
        );

        if let Some(size) = metadata.size {
            let value = OwnedValue::try_from(Value::new((size.width, size.height)))?;
            dict.insert(KEY_SIZE.to_string(), value);
        }

        dict.insert(
            KEY_POSITION_X.to_string(),
            OwnedValue::from(metadata.screen_position.x),
        );
        dict.insert(
            KEY_POSITION_Y.to_string(),
            OwnedValue::from(metadata.screen_position.y),
        );

        entries.push((descriptor.node_id, dict));
    }

    Ok(OwnedValue::try_from(Value::new(entries))?)
}

/// Decode an `a(ua{sv})` value back into descriptors
pub fn decode_streams(value: &Value<'_>) -> Result<Vec<StreamDescriptor>> {
    let entries: Vec<(u32, HashMap<String, OwnedValue>)> = value.try_clone()?.try_into()?;

    entries
        .into_iter()
        .map(|(node_id, dict)| {
            Ok(StreamDescriptor {
                node_id,
                metadata: decode_metadata(node_id, &dict)?,
            })
        })
        .collect()
}

fn decode_metadata(node_id: u32, dict: &HashMap<String, OwnedValue>) -> Result<StreamMetadata> {
    let source_type = match dict.get(KEY_SOURCE_TYPE).map(|v| &**v) {
        Some(Value::U32(raw)) => SourceType::from_wire(*raw).ok_or_else(|| {
            PortalcastError::dbus(format!("stream {}: unknown source_type {}", node_id, raw))
        })?,
        _ => {
            return Err(PortalcastError::dbus(format!(
                "stream {}: missing source_type",
                node_id
            )));
        }
    };

    let size = match dict.get(KEY_SIZE).map(|v| &**v) {
        None => None,
        Some(Value::Structure(fields)) => match fields.fields() {
            [Value::I32(width), Value::I32(height)] => Some(Size::new(*width, *height)),
            _ => {
                return Err(PortalcastError::dbus(format!(
                    "stream {}: size is not (ii)",
                    node_id
                )));
            }
        },
        Some(other) => {
            return Err(PortalcastError::dbus(format!(
                "stream {}: unexpected size value {:?}",
                node_id, other
            )));
        }
    };

    let coordinate = |key: &str| -> Result<i32> {
        match dict.get(key).map(|v| &**v) {
            Some(Value::I32(v)) => Ok(*v),
            None => Ok(0),
            Some(other) => Err(PortalcastError::dbus(format!(
                "stream {}: unexpected {} value {:?}",
                node_id, key, other
            ))),
        }
    };

    Ok(StreamMetadata {
        source_type,
        size,
        screen_position: Point::new(coordinate(KEY_POSITION_X)?, coordinate(KEY_POSITION_Y)?),
    })
}
