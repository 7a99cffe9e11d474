use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::error::Result;

// Slice — `start:stop:step` selector along one axis
//
// Normalization follows Python's `slice.indices(len)`:
//
//   - negative start/stop count from the end of the axis
//   - omitted bounds default to the first/last element in walking order
//   - bounds are clamped, so a slice never selects past either end
//   - with a negative step the walk goes backwards; start may normalize
//     to -1 when nothing is selected
//
// Examples on an axis of length 5:
//
//   1:4      → start 1, length 3   (1, 2, 3)
//   ::2      → start 0, length 3   (0, 2, 4)
//   ::-1     → start 4, length 5   (4, 3, 2, 1, 0)
//   -2:      → start 3, length 2   (3, 4)
//   3:1      → start 3, length 0

/// A `start:stop:step` slice with optional bounds and a non-zero step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slice {
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
}

impl Slice {
    /// Create a slice. Fails if `step == 0`.
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Result<Self> {
        if step == 0 {
            crate::bail!("slice step cannot be zero");
        }
        Ok(Slice { start, stop, step })
    }

    /// `start:stop` with unit step.
    pub fn range(start: i64, stop: i64) -> Self {
        Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// `:` — the whole axis.
    pub fn all() -> Self {
        Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Walking-order bounds `(lower, upper)` for an axis of length `dim`.
    fn bounds(&self, dim: i64) -> (i64, i64) {
        if self.step > 0 {
            (0, dim)
        } else {
            (-1, dim - 1)
        }
    }

    fn clamp(&self, value: i64, dim: i64) -> i64 {
        let (lower, upper) = self.bounds(dim);
        if value < 0 {
            (value + dim).max(lower)
        } else {
            value.min(upper)
        }
    }

    /// Normalized first index for an axis of length `dim`.
    pub fn start(&self, dim: usize) -> i64 {
        let dim = dim as i64;
        match self.start {
            Some(s) => self.clamp(s, dim),
            None => {
                let (lower, upper) = self.bounds(dim);
                if self.step > 0 {
                    lower
                } else {
                    upper
                }
            }
        }
    }

    /// Normalized (exclusive) stop for an axis of length `dim`.
    pub fn stop(&self, dim: usize) -> i64 {
        let dim = dim as i64;
        match self.stop {
            Some(s) => self.clamp(s, dim),
            None => {
                let (lower, upper) = self.bounds(dim);
                if self.step > 0 {
                    upper
                } else {
                    lower
                }
            }
        }
    }

    /// Number of elements selected on an axis of length `dim`.
    pub fn length(&self, dim: usize) -> usize {
        let start = self.start(dim);
        let stop = self.stop(dim);
        // Both bounds lie in [-1, dim], so the span fits; the step may be i64::MIN.
        let span = if self.step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            return 0;
        }
        ((span as u64 - 1) / self.step.unsigned_abs() + 1) as usize
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.start {
            write!(f, "{}", s)?;
        }
        write!(f, ":")?;
        if let Some(s) = self.stop {
            write!(f, "{}", s)?;
        }
        if self.step != 1 {
            write!(f, ":{}", self.step)?;
        }
        Ok(())
    }
}

impl From<Range<i64>> for Slice {
    fn from(r: Range<i64>) -> Self {
        Slice::range(r.start, r.end)
    }
}

impl From<RangeFrom<i64>> for Slice {
    fn from(r: RangeFrom<i64>) -> Self {
        Slice {
            start: Some(r.start),
            stop: None,
            step: 1,
        }
    }
}

impl From<RangeTo<i64>> for Slice {
    fn from(r: RangeTo<i64>) -> Self {
        Slice {
            start: None,
            stop: Some(r.end),
            step: 1,
        }
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(start: Option<i64>, stop: Option<i64>, step: i64) -> Slice {
        Slice::new(start, stop, step).unwrap()
    }

    #[test]
    fn test_plain_range() {
        let sl = Slice::range(1, 4);
        assert_eq!(sl.start(5), 1);
        assert_eq!(sl.length(5), 3);
    }

    #[test]
    fn test_step() {
        let sl = s(None, None, 2);
        assert_eq!(sl.start(5), 0);
        assert_eq!(sl.length(5), 3);
        assert_eq!(sl.length(6), 3);
    }

    #[test]
    fn test_reverse() {
        let sl = s(None, None, -1);
        assert_eq!(sl.start(5), 4);
        assert_eq!(sl.length(5), 5);

        let sl = s(Some(3), Some(0), -2);
        assert_eq!(sl.start(5), 3);
        assert_eq!(sl.length(5), 2); // 3, 1
    }

    #[test]
    fn test_negative_bounds() {
        let sl = Slice::from(-2..);
        assert_eq!(sl.start(5), 3);
        assert_eq!(sl.length(5), 2);

        let sl = Slice::from(..-1);
        assert_eq!(sl.start(5), 0);
        assert_eq!(sl.length(5), 4);
    }

    #[test]
    fn test_clamping() {
        let sl = Slice::range(-10, 10);
        assert_eq!(sl.start(3), 0);
        assert_eq!(sl.length(3), 3);

        let sl = s(Some(10), None, -1);
        assert_eq!(sl.start(3), 2);
        assert_eq!(sl.length(3), 3);
    }

    #[test]
    fn test_empty() {
        assert_eq!(Slice::range(3, 1).length(5), 0);
        assert_eq!(Slice::all().length(0), 0);

        let sl = s(Some(-10), None, -1);
        assert_eq!(sl.start(3), -1);
        assert_eq!(sl.length(3), 0);
    }

    #[test]
    fn test_extreme_steps() {
        let sl = s(None, None, i64::MAX);
        assert_eq!(sl.start(5), 0);
        assert_eq!(sl.length(5), 1);

        let sl = s(None, None, i64::MIN);
        assert_eq!(sl.start(5), 4);
        assert_eq!(sl.length(5), 1);

        assert_eq!(s(Some(-10), Some(10), i64::MIN).length(5), 0);
        assert_eq!(s(None, None, i64::MIN).length(0), 0);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(Slice::new(None, None, 0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Slice::range(0, 2).to_string(), "0:2");
        assert_eq!(s(None, None, -1).to_string(), "::-1");
        assert_eq!(Slice::all().to_string(), ":");
    }
}
