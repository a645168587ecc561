//! Flow results for pushing buffers downstream.
//!
//! Every push into a downstream consumer reports a [`FlowReturn`]. Anything
//! other than [`FlowReturn::Ok`] stops the current data call and travels back
//! to the caller unchanged:
//!
//! ```text
//! upstream ──chain()──> encoder ──push()──> downstream
//!     ^                    │                    │
//!     └──── FlowReturn ────┴──── FlowReturn ────┘
//! ```

/// Result of handing a buffer to a downstream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FlowReturn {
    /// Buffer accepted; keep going.
    #[default]
    Ok = 0,
    /// No consumer is connected.
    NotLinked = 1,
    /// Consumer is flushing and discards data.
    Flushing = 2,
    /// Consumer has reached end of stream.
    Eos = 3,
    /// Consumer failed.
    Error = 4,
}

impl FlowReturn {
    /// Check if data should keep flowing.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, FlowReturn::Ok)
    }

    /// Check if the result reports a failure rather than a normal stop.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, FlowReturn::Error | FlowReturn::NotLinked)
    }

    /// Name used in log output.
    pub const fn name(&self) -> &'static str {
        match self {
            FlowReturn::Ok => "ok",
            FlowReturn::NotLinked => "not-linked",
            FlowReturn::Flushing => "flushing",
            FlowReturn::Eos => "eos",
            FlowReturn::Error => "error",
        }
    }
}

impl From<u8> for FlowReturn {
    fn from(value: u8) -> Self {
        match value {
            0 => FlowReturn::Ok,
            1 => FlowReturn::NotLinked,
            2 => FlowReturn::Flushing,
            3 => FlowReturn::Eos,
            _ => FlowReturn::Error,
        }
    }
}

impl From<FlowReturn> for u8 {
    fn from(flow: FlowReturn) -> Self {
        flow as u8
    }
}

impl std::fmt::Display for FlowReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters describing what an element has moved through its pads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowStats {
    /// Buffers received on the sink pad.
    pub buffers_in: u64,
    /// Buffers pushed on the src pad.
    pub buffers_out: u64,
    /// Bytes received on the sink pad.
    pub bytes_in: u64,
    /// Bytes pushed on the src pad.
    pub bytes_out: u64,
    /// Pushes that did not return `Ok`.
    pub push_failures: u64,
}

impl FlowStats {
    /// Record a received buffer.
    pub fn record_in(&mut self, bytes: usize) {
        self.buffers_in += 1;
        self.bytes_in += bytes as u64;
    }

    /// Record a push and its result.
    pub fn record_push(&mut self, bytes: usize, flow: FlowReturn) {
        if flow.is_ok() {
            self.buffers_out += 1;
            self.bytes_out += bytes as u64;
        } else {
            self.push_failures += 1;
        }
    }

    /// Output size relative to input size, in percent.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            0.0
        } else {
            (self.bytes_out as f64 / self.bytes_in as f64) * 100.0
        }
    }
}
