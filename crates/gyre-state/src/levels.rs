//! The rotating time-level index triple.

/// Indices of the `past`, `current` and `next` slots.
///
/// Always a permutation of `{0, 1, 2}`; the fields are private so the
/// permutation cannot be broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeLevels {
    past: usize,
    current: usize,
    next: usize,
}

impl Default for TimeLevels {
    fn default() -> Self {
        Self {
            past: 0,
            current: 1,
            next: 2,
        }
    }
}

impl TimeLevels {
    /// Slot holding the step before `current`.
    pub fn past(&self) -> usize {
        self.past
    }

    /// Slot holding the last completed step.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Slot being written during the step in progress.
    pub fn next(&self) -> usize {
        self.next
    }

    /// Advance time: `past <- current`, `current <- next`, and the old
    /// `past` slot is recycled as the new `next`.
    pub fn rotate(&mut self) {
        let recycled = self.past;
        self.past = self.current;
        self.current = self.next;
        self.next = recycled;
    }
}
