//! Time types for buffer timing.
//!
//! This module provides:
//! - [`ClockTime`]: A nanosecond timestamp type (8 bytes, Copy)
//! - [`TimeBase`]: A rational tick unit used by codec engines

use std::time::Duration;

/// Nanoseconds per second.
pub const SECOND: u64 = 1_000_000_000;

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds (8 bytes, Copy).
///
/// Buffer timestamps and durations are expressed in `ClockTime`. A buffer
/// whose timing is unknown carries [`ClockTime::NONE`], and every arithmetic
/// helper propagates `NONE` instead of inventing a value.
///
/// # Examples
///
/// ```rust
/// use avenc::clock::ClockTime;
///
/// let t1 = ClockTime::from_secs(1);
/// let t2 = ClockTime::from_millis(500);
/// let t3 = t1 + t2;
///
/// assert_eq!(t3.millis(), 1500);
/// assert_eq!(format!("{}", t3), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time (one less than NONE sentinel).
    pub const MAX: Self = Self(u64::MAX - 1);

    /// Invalid/unset time (sentinel value).
    pub const NONE: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(SECOND))
    }

    /// Get as nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Get as milliseconds (truncated).
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Get as seconds (truncated).
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / SECOND
    }

    /// Check if this is the NONE sentinel value.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Check if this is a valid time (not NONE).
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u64::MAX
    }

    /// Convert to Option, returning None for the NONE sentinel.
    #[inline]
    pub const fn to_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }

    /// Saturating addition. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        let result = self.0.saturating_add(rhs.0);
        // Don't overflow into NONE
        if result == u64::MAX {
            Self::MAX
        } else {
            Self(result)
        }
    }

    /// Saturating subtraction. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Scale by `num / den` with a 128-bit intermediate, rounding down.
    ///
    /// Returns NONE if `self` is NONE or `den` is zero.
    #[inline]
    pub const fn mul_div(self, num: u64, den: u64) -> Self {
        if self.is_none() || den == 0 {
            return Self::NONE;
        }
        let scaled = (self.0 as u128 * num as u128) / den as u128;
        if scaled >= u64::MAX as u128 {
            Self::MAX
        } else {
            Self(scaled as u64)
        }
    }
}

impl Default for ClockTime {
    fn default() -> Self {
        Self::NONE
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::AddAssign for ClockTime {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(d.as_nanos().min(u64::MAX as u128 - 1) as u64)
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            let secs = self.secs();
            let ms = (self.0 / 1_000_000) % 1000;
            write!(f, "{}.{:03}s", secs, ms)
        }
    }
}

// ============================================================================
// TimeBase
// ============================================================================

/// Rational tick unit (`num / den` seconds per tick).
///
/// Video engines usually tick once per frame (`1/25` for 25 fps), audio
/// engines once per sample (`1/48000`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeBase {
    /// Numerator (seconds).
    pub num: u32,
    /// Denominator (ticks).
    pub den: u32,
}

impl TimeBase {
    /// Create a new time base.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Check that neither term is zero.
    pub const fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// Convert a clock time into ticks of this time base.
    ///
    /// Returns `None` for NONE or for an invalid time base.
    pub fn to_ticks(&self, time: ClockTime) -> Option<i64> {
        if time.is_none() || !self.is_valid() {
            return None;
        }
        let ticks = time.nanos() as u128 * self.den as u128 / (self.num as u128 * SECOND as u128);
        i64::try_from(ticks).ok()
    }

    /// Convert ticks of this time base into a clock time.
    pub fn to_clock_time(&self, ticks: i64) -> ClockTime {
        if ticks < 0 || !self.is_valid() {
            return ClockTime::NONE;
        }
        let nanos = ticks as u128 * self.num as u128 * SECOND as u128 / self.den as u128;
        u64::try_from(nanos)
            .map(ClockTime::from_nanos)
            .unwrap_or(ClockTime::MAX)
    }
}

impl std::fmt::Display for TimeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_constants() {
        assert!(ClockTime::NONE.is_none());
        assert!(ClockTime::ZERO.is_some());
        assert_eq!(ClockTime::default(), ClockTime::NONE);
    }

    #[test]
    fn test_clock_time_arithmetic() {
        let a = ClockTime::from_millis(100);
        let b = ClockTime::from_millis(40);
        assert_eq!((a + b).millis(), 140);
        assert_eq!((a - b).millis(), 60);
        assert!((a + ClockTime::NONE).is_none());
        assert_eq!(b - a, ClockTime::ZERO);
    }

    #[test]
    fn test_mul_div() {
        let d = ClockTime::from_nanos(100);
        assert_eq!(d.mul_div(4, 10), ClockTime::from_nanos(40));
        assert_eq!(d.mul_div(3, 10), ClockTime::from_nanos(30));
        assert!(d.mul_div(1, 0).is_none());
        assert!(ClockTime::NONE.mul_div(1, 2).is_none());

        // No overflow with large values
        let big = ClockTime::from_secs(3600 * 24 * 365);
        assert_eq!(big.mul_div(1_000_000, 1_000_000), big);
    }

    #[test]
    fn test_display() {
        assert_eq!(ClockTime::from_millis(1500).to_string(), "1.500s");
        assert_eq!(ClockTime::NONE.to_string(), "NONE");
    }

    #[test]
    fn test_time_base_ticks() {
        let tb = TimeBase::new(1, 25);
        assert_eq!(tb.to_ticks(ClockTime::from_millis(80)), Some(2));
        assert_eq!(tb.to_ticks(ClockTime::NONE), None);
        assert_eq!(tb.to_clock_time(2), ClockTime::from_millis(80));
        assert!(tb.to_clock_time(-1).is_none());

        let invalid = TimeBase::new(0, 25);
        assert!(!invalid.is_valid());
        assert_eq!(invalid.to_ticks(ClockTime::ZERO), None);
    }
}
