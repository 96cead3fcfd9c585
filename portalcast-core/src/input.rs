//! Input injection gate
//!
//! Synthetic pointer and keyboard events are forwarded to the fake input
//! capability only while input streaming is enabled. Every method takes the
//! fake input client as an `Option`; `None` means the capability is not
//! bound and the call does nothing.

use tracing::{debug, info, trace};

use crate::error::{PortalcastError, Result};
use crate::protocol::ProtocolClient;
use crate::types::{Capability, Orientation, Point, PointF};

/// Gate between portal input requests and the fake input capability
#[derive(Debug, Default)]
pub struct InputInjectionGate {
    streaming_enabled: bool,
    authorization_requested: bool,
    /// Global position of the last streamed output
    streamed_position: Point,
}

impl InputInjectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        if !self.streaming_enabled {
            debug!("Input streaming enabled");
        }
        self.streaming_enabled = true;
    }

    pub fn disable(&mut self) {
        if self.streaming_enabled {
            debug!("Input streaming disabled");
        }
        self.streaming_enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.streaming_enabled
    }

    pub fn is_authorization_requested(&self) -> bool {
        self.authorization_requested
    }

    /// Remember where the streamed output sits for absolute motion
    pub fn set_streamed_position(&mut self, position: Point) {
        self.streamed_position = position;
    }

    pub fn streamed_position(&self) -> Point {
        self.streamed_position
    }

    /// Ask the compositor to trust us with fake input, once per process.
    ///
    /// Returns `Ok(false)` when the request was already sent.
    pub fn authorize(
        &mut self,
        fake_input: Option<&dyn ProtocolClient>,
        application: &str,
        reason: &str,
    ) -> Result<bool> {
        if self.authorization_requested {
            return Ok(false);
        }
        let client =
            fake_input.ok_or(PortalcastError::CapabilityUnbound(Capability::FakeInput))?;

        info!(application, "Requesting fake input authorization");
        client.authenticate(application, reason);
        self.authorization_requested = true;
        Ok(true)
    }

    fn target<'a>(&self, fake_input: Option<&'a dyn ProtocolClient>) -> Option<&'a dyn ProtocolClient> {
        if self.streaming_enabled { fake_input } else { None }
    }

    /// Returns whether the event was forwarded
    pub fn pointer_button(&self, fake_input: Option<&dyn ProtocolClient>, button: u32, pressed: bool) -> bool {
        let Some(client) = self.target(fake_input) else {
            return false;
        };
        trace!(button, pressed, "pointer button");
        client.pointer_button(button, pressed);
        true
    }

    pub fn pointer_motion(&self, fake_input: Option<&dyn ProtocolClient>, dx: f64, dy: f64) -> bool {
        let Some(client) = self.target(fake_input) else {
            return false;
        };
        client.pointer_motion(dx, dy);
        true
    }

    /// Move to output-local `position`, translated into global space
    pub fn pointer_motion_absolute(&self, fake_input: Option<&dyn ProtocolClient>, position: PointF) -> bool {
        let Some(client) = self.target(fake_input) else {
            return false;
        };
        let global = position.offset_by(self.streamed_position);
        client.pointer_motion_absolute(global.x, global.y);
        true
    }

    pub fn pointer_axis(
        &self,
        fake_input: Option<&dyn ProtocolClient>,
        orientation: Orientation,
        delta: f64,
    ) -> bool {
        let Some(client) = self.target(fake_input) else {
            return false;
        };
        client.pointer_axis(orientation, delta);
        true
    }

    pub fn keyboard_key(&self, fake_input: Option<&dyn ProtocolClient>, keycode: u32, pressed: bool) -> bool {
        let Some(client) = self.target(fake_input) else {
            return false;
        };
        trace!(keycode, pressed, "keyboard key");
        client.keyboard_key(keycode, pressed);
        true
    }
}
