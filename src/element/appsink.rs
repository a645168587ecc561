//! AppSink: a downstream consumer that hands buffers to application code.
//!
//! Buffers pushed by the encoder queue up inside the sink and are read back
//! through an [`AppSinkHandle`], which can be cloned and moved to another
//! thread. The sink can also advertise caps and refuse formats, which makes
//! it the usual downstream in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Downstream;
use crate::buffer::Buffer;
use crate::flow::FlowReturn;
use crate::format::{Caps, MediaFormat};

/// A downstream that collects pushed buffers.
///
/// # Example
///
/// ```rust
/// use avenc::buffer::Buffer;
/// use avenc::element::{AppSink, Downstream};
/// use avenc::flow::FlowReturn;
/// use avenc::metadata::Metadata;
///
/// let mut sink = AppSink::new();
/// let handle = sink.handle();
///
/// assert_eq!(sink.push(Buffer::from_vec(vec![1, 2], Metadata::new())), FlowReturn::Ok);
/// assert_eq!(handle.pull().unwrap().len(), 2);
/// ```
pub struct AppSink {
    name: String,
    allowed_caps: Option<Caps>,
    accept: bool,
    inner: Arc<Mutex<AppSinkState>>,
}

#[derive(Debug)]
struct AppSinkState {
    queue: VecDeque<Buffer>,
    accepted: Vec<MediaFormat>,
    flow: FlowReturn,
    eos: bool,
    total_received: u64,
    total_pulled: u64,
}

/// Handle for reading what an [`AppSink`] received.
#[derive(Clone)]
pub struct AppSinkHandle {
    inner: Arc<Mutex<AppSinkState>>,
}

fn lock(inner: &Mutex<AppSinkState>) -> MutexGuard<'_, AppSinkState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppSink {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self {
            name: "appsink".to_string(),
            allowed_caps: None,
            accept: true,
            inner: Arc::new(Mutex::new(AppSinkState {
                queue: VecDeque::new(),
                accepted: Vec::new(),
                flow: FlowReturn::Ok,
                eos: false,
                total_received: 0,
                total_pulled: 0,
            })),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Advertise these caps to the encoder.
    pub fn with_allowed_caps(mut self, caps: Caps) -> Self {
        self.allowed_caps = Some(caps);
        self
    }

    /// Refuse every proposed output format.
    pub fn rejecting_caps(mut self) -> Self {
        self.accept = false;
        self
    }

    /// Get a handle for reading received data.
    pub fn handle(&self) -> AppSinkHandle {
        AppSinkHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Sink name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for AppSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSink")
            .field("name", &self.name)
            .field("allowed_caps", &self.allowed_caps)
            .field("accept", &self.accept)
            .finish_non_exhaustive()
    }
}

impl Downstream for AppSink {
    fn push(&mut self, buffer: Buffer) -> FlowReturn {
        let mut state = lock(&self.inner);
        if !state.flow.is_ok() {
            return state.flow;
        }
        state.queue.push_back(buffer);
        state.total_received += 1;
        FlowReturn::Ok
    }

    fn allowed_caps(&self) -> Option<Caps> {
        self.allowed_caps.clone()
    }

    fn accept_caps(&mut self, format: &MediaFormat) -> bool {
        if self.accept {
            lock(&self.inner).accepted.push(*format);
        }
        self.accept
    }

    fn end_of_stream(&mut self) {
        lock(&self.inner).eos = true;
    }
}

impl AppSinkHandle {
    /// Take the oldest queued buffer.
    pub fn pull(&self) -> Option<Buffer> {
        let mut state = lock(&self.inner);
        let buffer = state.queue.pop_front()?;
        state.total_pulled += 1;
        Some(buffer)
    }

    /// Take every queued buffer.
    pub fn drain(&self) -> Vec<Buffer> {
        let mut state = lock(&self.inner);
        let buffers: Vec<Buffer> = state.queue.drain(..).collect();
        state.total_pulled += buffers.len() as u64;
        buffers
    }

    /// Number of queued buffers.
    pub fn queue_len(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    /// Total buffers ever received.
    pub fn total_received(&self) -> u64 {
        lock(&self.inner).total_received
    }

    /// Total buffers taken through this handle.
    pub fn total_pulled(&self) -> u64 {
        lock(&self.inner).total_pulled
    }

    /// Formats the sink accepted, in order.
    pub fn accepted_formats(&self) -> Vec<MediaFormat> {
        lock(&self.inner).accepted.clone()
    }

    /// Whether end of stream was signalled.
    pub fn is_eos(&self) -> bool {
        lock(&self.inner).eos
    }

    /// Make every later push return `flow`; `FlowReturn::Ok` resumes.
    pub fn set_flow(&self, flow: FlowReturn) {
        lock(&self.inner).flow = flow;
    }
}
