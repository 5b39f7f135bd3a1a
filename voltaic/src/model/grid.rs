use crate::model::Timestamp;

///
/// The uniform time grid every series is re-sampled onto.
///
/// Held as (start, step, len) rather than a materialised vector - a day of 5s
/// samples is 17k instants and most consumers only need indexed access.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeGrid {
    start: Timestamp,
    step: i64,
    len: usize,
}

impl TimeGrid {
    ///
    /// Grid covering [t_min, t_max] inclusive at the given step: the last point is
    /// the largest start + k*step that does not exceed t_max.
    ///
    pub fn build(t_min: Timestamp, t_max: Timestamp, step: i64) -> Self {
        assert!(step > 0, "grid step must be positive");
        assert!(t_max >= t_min, "grid span is inverted");

        Self {
            start: t_min,
            step,
            len: ((t_max - t_min) / step) as usize + 1,
        }
    }

    pub fn empty(step: i64) -> Self {
        Self { start: 0, step, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        match self.len {
            0 => None,
            n => Some(self.start + (n as i64 - 1) * self.step),
        }
    }

    pub fn at(&self, index: usize) -> Timestamp {
        debug_assert!(index < self.len);
        self.start + index as i64 * self.step
    }

    pub fn iter(&self) -> impl Iterator<Item = Timestamp> + '_ {
        (0..self.len).map(move |index| self.at(index))
    }

    ///
    /// The grid index whose instant is closest to the timestamp (ties round down).
    /// None when the grid is empty or the timestamp falls outside the span.
    ///
    pub fn nearest_index(&self, time: Timestamp) -> Option<usize> {
        let end = match self.end() {
            Some(end) => end,
            None => return None,
        };

        if time < self.start || time > end {
            return None
        }

        let offset = time - self.start;
        let index = ((offset + self.step / 2) / self.step) as usize;
        Some(std::cmp::min(index, self.len - 1))
    }
}
