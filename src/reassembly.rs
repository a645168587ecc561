//! Audio frame reassembly.
//!
//! Audio engines consume fixed-size frames while upstream delivers buffers of
//! any size. [`FrameReassembler`] slices and merges incoming buffers into
//! frame-sized units, carrying an undersized remainder (the residual) from one
//! call to the next.
//!
//! # Timing
//!
//! A unit cut from inside an incoming buffer gets a timestamp and duration
//! proportional to its byte position:
//!
//! ```text
//! incoming: pts=0 dur=100, 10 bytes, frame = 4 bytes
//!
//!   [0 1 2 3][4 5 6 7][8 9]
//!    pts=0    pts=40   pts=80   <- residual
//!    dur=40   dur=40   dur=20
//! ```
//!
//! A unit that starts with the residual keeps the residual's timestamp; its
//! duration is the residual's duration plus the share of the incoming buffer
//! it consumed. Unknown timestamps stay unknown.
//!
//! # Accounting
//!
//! After every call `bytes_emitted + residual_len + bytes_discarded ==
//! bytes_received`.

use bytes::BytesMut;

use crate::buffer::Buffer;
use crate::clock::{ClockTime, SECOND};
use crate::error::{Error, Result};
use crate::flow::FlowReturn;
use crate::metadata::Metadata;

/// Accumulates arbitrary-size buffers into fixed-size frames.
#[derive(Debug)]
pub struct FrameReassembler {
    frame_size: usize,
    residual: Option<Buffer>,
    /// Bytes per second, used when a buffer carries no duration.
    byte_rate: Option<u64>,
    bytes_received: u64,
    bytes_emitted: u64,
    bytes_discarded: u64,
}

impl FrameReassembler {
    /// Create a reassembler producing units of `frame_size` bytes.
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(Error::Config("frame size must be non-zero".into()));
        }
        Ok(Self {
            frame_size,
            residual: None,
            byte_rate: None,
            bytes_received: 0,
            bytes_emitted: 0,
            bytes_discarded: 0,
        })
    }

    /// Derive missing durations from this byte rate.
    pub fn with_byte_rate(mut self, byte_rate: u64) -> Self {
        self.byte_rate = (byte_rate > 0).then_some(byte_rate);
        self
    }

    /// Size of every emitted unit.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// The pending residual, if any.
    pub fn residual(&self) -> Option<&Buffer> {
        self.residual.as_ref()
    }

    /// Bytes held in the residual.
    pub fn residual_len(&self) -> usize {
        self.residual.as_ref().map_or(0, Buffer::len)
    }

    /// Total bytes passed to [`push`](Self::push).
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Total bytes handed out as units.
    pub fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }

    /// Bytes thrown away because downstream stopped the flow.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    /// Drop the residual.
    pub fn clear(&mut self) {
        if let Some(residual) = self.residual.take() {
            self.bytes_discarded += residual.len() as u64;
            tracing::trace!(bytes = residual.len(), "residual cleared");
        }
    }

    /// Feed one incoming buffer, handing every complete unit to `emit`.
    ///
    /// Units are emitted in byte order. If `emit` returns a non-`Ok` flow or
    /// an error, the rest of the incoming buffer and the residual are
    /// discarded and that result is returned.
    pub fn push<F>(&mut self, incoming: Buffer, mut emit: F) -> Result<FlowReturn>
    where
        F: FnMut(Buffer) -> Result<FlowReturn>,
    {
        let total = incoming.len();
        self.bytes_received += total as u64;
        if total == 0 {
            return Ok(FlowReturn::Ok);
        }

        let meta = *incoming.metadata();
        let mut available = total + self.residual_len();
        let mut offset = 0;

        while available >= self.frame_size {
            let unit = match self.residual.take() {
                Some(residual) => {
                    let take = self.frame_size - residual.len();
                    let head = self.sub_buffer(&incoming, &meta, offset, take);
                    offset += take;
                    residual.join(head)
                }
                None => {
                    let unit = self.sub_buffer(&incoming, &meta, offset, self.frame_size);
                    offset += self.frame_size;
                    unit
                }
            };
            available -= self.frame_size;
            self.bytes_emitted += self.frame_size as u64;

            match emit(unit) {
                Ok(FlowReturn::Ok) => {}
                Ok(flow) => {
                    self.discard_rest(total - offset);
                    tracing::debug!(flow = %flow, "downstream stopped reassembly");
                    return Ok(flow);
                }
                Err(err) => {
                    self.discard_rest(total - offset);
                    return Err(err);
                }
            }
        }

        self.residual = if available == 0 {
            None
        } else {
            let rest = if offset == 0 {
                let mut incoming = incoming;
                incoming.metadata_mut().duration = self.known_duration(meta.duration, total);
                incoming
            } else {
                self.sub_buffer(&incoming, &meta, offset, total - offset)
            };
            // A residual survives the loop only when nothing was consumed.
            match self.residual.take() {
                Some(residual) => Some(residual.join(rest)),
                None => Some(rest),
            }
        };

        tracing::trace!(
            received = total,
            residual = self.residual_len(),
            "reassembled incoming buffer"
        );
        Ok(FlowReturn::Ok)
    }

    /// Take the residual zero-padded to a full frame.
    ///
    /// The unit keeps the residual's timing, so its duration covers only the
    /// real samples.
    pub fn drain_padded(&mut self) -> Option<Buffer> {
        let residual = self.residual.take()?;
        let real = residual.len();
        self.bytes_emitted += real as u64;

        let mut data = BytesMut::with_capacity(self.frame_size);
        data.extend_from_slice(residual.as_bytes());
        data.resize(self.frame_size, 0);

        tracing::debug!(real, padded = self.frame_size - real, "padding final audio frame");
        Some(Buffer::new(data.freeze(), *residual.metadata()))
    }

    fn discard_rest(&mut self, rest: usize) {
        self.bytes_discarded += rest as u64;
        self.clear();
    }

    fn known_duration(&self, duration: ClockTime, len: usize) -> ClockTime {
        match (duration.to_option(), self.byte_rate) {
            (Some(duration), _) => duration,
            (None, Some(rate)) => ClockTime::from_nanos(SECOND).mul_div(len as u64, rate),
            (None, None) => ClockTime::NONE,
        }
    }

    fn sub_buffer(&self, incoming: &Buffer, meta: &Metadata, offset: usize, len: usize) -> Buffer {
        let total = incoming.len();
        let duration = self.known_duration(meta.duration, total);

        let mut unit = incoming.slice(offset, len);
        let unit_meta = unit.metadata_mut();
        unit_meta.pts = if offset == 0 {
            meta.pts
        } else {
            meta.pts
                .saturating_add(duration.mul_div(offset as u64, total as u64))
        };
        unit_meta.duration = duration.mul_div(len as u64, total as u64);
        unit_meta.offset = meta.offset.map(|o| o + offset as u64);
        unit_meta.flags.discont = offset == 0 && meta.flags.discont;
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(len: usize, pts_ms: u64, dur_ms: u64) -> Buffer {
        let data = (0..len).map(|i| i as u8).collect();
        Buffer::from_vec(
            data,
            Metadata::from_pts(ClockTime::from_millis(pts_ms))
                .with_duration(ClockTime::from_millis(dur_ms)),
        )
    }

    fn collect(reassembler: &mut FrameReassembler, input: Buffer) -> Vec<Buffer> {
        let mut units = Vec::new();
        let flow = reassembler
            .push(input, |unit| {
                units.push(unit);
                Ok(FlowReturn::Ok)
            })
            .unwrap();
        assert_eq!(flow, FlowReturn::Ok);
        units
    }

    fn assert_accounting(r: &FrameReassembler) {
        assert_eq!(
            r.bytes_emitted() + r.residual_len() as u64 + r.bytes_discarded(),
            r.bytes_received()
        );
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        assert!(matches!(FrameReassembler::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn test_split_with_residual() {
        let mut r = FrameReassembler::new(4).unwrap();
        let units = collect(&mut r, timed(10, 0, 100));

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].metadata().pts, ClockTime::ZERO);
        assert_eq!(units[0].metadata().duration, ClockTime::from_millis(40));
        assert_eq!(units[1].metadata().pts, ClockTime::from_millis(40));
        assert_eq!(units[1].metadata().duration, ClockTime::from_millis(40));
        assert_eq!(units[1].as_bytes(), &[4, 5, 6, 7]);

        let residual = r.residual().unwrap();
        assert_eq!(residual.as_bytes(), &[8, 9]);
        assert_eq!(residual.metadata().pts, ClockTime::from_millis(80));
        assert_eq!(residual.metadata().duration, ClockTime::from_millis(20));
        assert_accounting(&r);
    }

    #[test]
    fn test_merge_residual_with_next_buffer() {
        let mut r = FrameReassembler::new(4).unwrap();
        collect(&mut r, timed(10, 0, 100));
        let units = collect(&mut r, timed(6, 100, 60));

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_bytes(), &[8, 9, 0, 1]);
        assert_eq!(units[0].metadata().pts, ClockTime::from_millis(80));
        assert_eq!(units[0].metadata().duration, ClockTime::from_millis(40));
        assert_eq!(units[1].metadata().pts, ClockTime::from_millis(120));
        assert_eq!(units[1].metadata().duration, ClockTime::from_millis(40));
        assert!(r.residual().is_none());
        assert_accounting(&r);
    }

    #[test]
    fn test_small_buffers_accumulate() {
        let mut r = FrameReassembler::new(8).unwrap();
        assert!(collect(&mut r, timed(3, 0, 30)).is_empty());
        assert!(collect(&mut r, timed(3, 30, 30)).is_empty());
        assert_eq!(r.residual_len(), 6);
        assert_eq!(r.residual().unwrap().metadata().duration, ClockTime::from_millis(60));

        let units = collect(&mut r, timed(2, 60, 20));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata().pts, ClockTime::ZERO);
        assert_eq!(units[0].metadata().duration, ClockTime::from_millis(80));
        assert_accounting(&r);
    }

    #[test]
    fn test_exact_multiples_leave_no_residual() {
        let mut r = FrameReassembler::new(4).unwrap();
        let mut count = 0;
        for (i, len) in [3usize, 5, 7, 1, 8].into_iter().enumerate() {
            count += collect(&mut r, timed(len, i as u64 * 10, 10)).len();
            assert_accounting(&r);
        }
        assert_eq!(count, 24 / 4);
        assert_eq!(r.residual_len(), 0);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let mut r = FrameReassembler::new(6).unwrap();
        let mut last = ClockTime::ZERO;
        let mut pts = 0;
        for len in [5usize, 13, 2, 9, 17, 4, 1, 11] {
            for unit in collect(&mut r, timed(len, pts, len as u64 * 10)) {
                assert!(unit.metadata().pts >= last);
                last = unit.metadata().pts;
            }
            pts += len as u64 * 10;
        }
    }

    #[test]
    fn test_unknown_pts_stays_unknown() {
        let mut r = FrameReassembler::new(4).unwrap();
        let input = Buffer::from_vec(vec![0; 8], Metadata::new());
        let units = collect(&mut r, input);
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.metadata().pts.is_none()));
        assert!(units.iter().all(|u| u.metadata().duration.is_none()));
    }

    #[test]
    fn test_duration_from_byte_rate() {
        // 1000 bytes per second -> 4 bytes last 4 ms.
        let mut r = FrameReassembler::new(4).unwrap().with_byte_rate(1000);
        let input = Buffer::from_vec(vec![0; 10], Metadata::from_pts(ClockTime::ZERO));
        let units = collect(&mut r, input);

        assert_eq!(units[1].metadata().pts, ClockTime::from_millis(4));
        assert_eq!(units[1].metadata().duration, ClockTime::from_millis(4));
        assert_eq!(
            r.residual().unwrap().metadata().duration,
            ClockTime::from_millis(2)
        );
    }

    #[test]
    fn test_byte_rate_duration_survives_accumulation() {
        let mut r = FrameReassembler::new(8).unwrap().with_byte_rate(1000);
        let untimed = |len: usize, pts_ms: u64| {
            Buffer::from_vec(vec![0; len], Metadata::from_pts(ClockTime::from_millis(pts_ms)))
        };

        assert!(collect(&mut r, untimed(3, 0)).is_empty());
        assert!(collect(&mut r, untimed(3, 3)).is_empty());
        assert_eq!(r.residual().unwrap().metadata().duration, ClockTime::from_millis(6));

        let units = collect(&mut r, untimed(2, 6));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata().pts, ClockTime::ZERO);
        assert_eq!(units[0].metadata().duration, ClockTime::from_millis(8));
        assert_accounting(&r);
    }

    #[test]
    fn test_merged_unit_keeps_unknown_residual_pts() {
        let mut r = FrameReassembler::new(8).unwrap();
        collect(&mut r, Buffer::from_vec(vec![0; 3], Metadata::new()));

        let units = collect(&mut r, timed(5, 100, 50));
        assert_eq!(units.len(), 1);
        assert!(units[0].metadata().pts.is_none());
        assert_accounting(&r);
    }

    #[test]
    fn test_flow_stop_discards_rest() {
        let mut r = FrameReassembler::new(4).unwrap();
        let mut pushed = 0;
        let flow = r
            .push(timed(10, 0, 100), |_| {
                pushed += 1;
                Ok(FlowReturn::Flushing)
            })
            .unwrap();

        assert_eq!(flow, FlowReturn::Flushing);
        assert_eq!(pushed, 1);
        assert_eq!(r.residual_len(), 0);
        assert_eq!(r.bytes_discarded(), 6);
        assert_accounting(&r);
    }

    #[test]
    fn test_drain_padded() {
        let mut r = FrameReassembler::new(4).unwrap();
        collect(&mut r, timed(6, 0, 60));

        let last = r.drain_padded().unwrap();
        assert_eq!(last.as_bytes(), &[4, 5, 0, 0]);
        assert_eq!(last.metadata().pts, ClockTime::from_millis(40));
        assert_eq!(last.metadata().duration, ClockTime::from_millis(20));
        assert!(r.drain_padded().is_none());
        assert_accounting(&r);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut r = FrameReassembler::new(4).unwrap();
        collect(&mut r, timed(2, 0, 20));
        r.clear();
        r.clear();
        assert_eq!(r.residual_len(), 0);
        assert_accounting(&r);
    }
}
