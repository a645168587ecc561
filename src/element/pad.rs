//! Pad abstraction for element inputs and outputs.
//!
//! An encoder element has exactly two always-present pads: `sink` takes raw
//! media, `src` produces encoded media. Each pad is created from a template
//! that bounds the caps it can ever carry; the pad itself remembers the caps
//! currently negotiated on it.

use std::sync::Arc;

use crate::format::{Caps, MediaFormat};

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An input pad (receives buffers from upstream).
    Input,
    /// An output pad (sends buffers downstream).
    Output,
}

/// Whether a pad is always present or created dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Pad is always present on the element.
    Always,
    /// Pad is created on demand.
    Sometimes,
}

/// Template for creating pads.
///
/// The template caps are the widest set of formats a pad of this template can
/// carry.
#[derive(Debug, Clone)]
pub struct PadTemplate {
    /// Name of pads created from this template ("sink", "src").
    pub name: String,
    /// Direction of this pad.
    pub direction: PadDirection,
    /// Whether this pad is always present or created on demand.
    pub presence: PadPresence,
    /// Caps any pad of this template accepts.
    pub caps: Caps,
}

impl PadTemplate {
    /// Create a new pad template.
    pub fn new(
        name: impl Into<String>,
        direction: PadDirection,
        presence: PadPresence,
        caps: Caps,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            presence,
            caps,
        }
    }

    /// Create a template for an always-present input pad.
    pub fn sink(caps: Caps) -> Self {
        Self::new("sink", PadDirection::Input, PadPresence::Always, caps)
    }

    /// Create a template for an always-present output pad.
    pub fn src(caps: Caps) -> Self {
        Self::new("src", PadDirection::Output, PadPresence::Always, caps)
    }
}

/// A pad instance on an element.
#[derive(Debug, Clone)]
pub struct Pad {
    name: String,
    direction: PadDirection,
    template: Arc<PadTemplate>,
    /// Format currently flowing through this pad.
    current: Option<MediaFormat>,
}

impl Pad {
    /// Create a pad from a template, named after it.
    pub fn from_template(template: Arc<PadTemplate>) -> Self {
        Self {
            name: template.name.clone(),
            direction: template.direction,
            template,
            current: None,
        }
    }

    /// Get the pad's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the pad's direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Check if this is an input pad.
    pub fn is_input(&self) -> bool {
        self.direction == PadDirection::Input
    }

    /// Check if this is an output pad.
    pub fn is_output(&self) -> bool {
        self.direction == PadDirection::Output
    }

    /// Get the template this pad was created from.
    pub fn template(&self) -> &Arc<PadTemplate> {
        &self.template
    }

    /// Caps of the template.
    pub fn template_caps(&self) -> &Caps {
        &self.template.caps
    }

    /// The negotiated format, if any.
    pub fn current_format(&self) -> Option<&MediaFormat> {
        self.current.as_ref()
    }

    /// Record the negotiated format.
    pub fn set_current_format(&mut self, format: MediaFormat) {
        self.current = Some(format);
    }

    /// Forget the negotiated format.
    pub fn clear_current_format(&mut self) {
        self.current = None;
    }
}
