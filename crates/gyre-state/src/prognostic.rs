//! Three-slot storage for time-stepped fields.

use crate::levels::TimeLevels;

/// A field with `past`, `current` and `next` slots.
///
/// Used both for prognostic variables and for the Adams-Bashforth
/// tendencies, which are written at `current` and read at `past`.
#[derive(Clone, Debug, PartialEq)]
pub struct Prognostic {
    slots: [Vec<f64>; 3],
}

/// Simultaneous view of all three slots with `next` writable.
pub struct Slots<'a> {
    /// Previous step.
    pub past: &'a [f64],
    /// Last completed step.
    pub current: &'a [f64],
    /// Step in progress.
    pub next: &'a mut [f64],
}

impl Prognostic {
    /// A zero field of `len` values per slot.
    pub fn zeros(len: usize) -> Self {
        Self {
            slots: [vec![0.0; len], vec![0.0; len], vec![0.0; len]],
        }
    }

    /// Values per slot.
    pub fn len(&self) -> usize {
        self.slots[0].len()
    }

    /// Whether the field has no values.
    pub fn is_empty(&self) -> bool {
        self.slots[0].is_empty()
    }

    /// Raw slot by index.
    pub fn slot(&self, index: usize) -> &[f64] {
        &self.slots[index]
    }

    /// Raw mutable slot by index.
    pub fn slot_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.slots[index]
    }

    /// The `past` slot.
    pub fn past(&self, lv: TimeLevels) -> &[f64] {
        &self.slots[lv.past()]
    }

    /// The `current` slot.
    pub fn current(&self, lv: TimeLevels) -> &[f64] {
        &self.slots[lv.current()]
    }

    /// The `next` slot.
    pub fn next(&self, lv: TimeLevels) -> &[f64] {
        &self.slots[lv.next()]
    }

    /// The `next` slot, writable.
    pub fn next_mut(&mut self, lv: TimeLevels) -> &mut [f64] {
        &mut self.slots[lv.next()]
    }

    /// All three slots with `next` writable.
    pub fn slots(&mut self, lv: TimeLevels) -> Slots<'_> {
        let (past, current, next) = self.three_mut(lv);
        Slots {
            past,
            current,
            next,
        }
    }

    /// Tendency access: `current` writable, `past` readable.
    pub fn tendency(&mut self, lv: TimeLevels) -> (&mut [f64], &[f64]) {
        let (past, current, _) = self.three_mut(lv);
        (current, past)
    }

    /// Copy `data` into every slot (initial conditions).
    pub fn fill_all(&mut self, data: &[f64]) {
        for slot in &mut self.slots {
            slot.copy_from_slice(data);
        }
    }

    fn three_mut(&mut self, lv: TimeLevels) -> (&mut [f64], &mut [f64], &mut [f64]) {
        let [a, b, c] = &mut self.slots;
        let (a, b, c) = (a.as_mut_slice(), b.as_mut_slice(), c.as_mut_slice());
        // `next` is implied by the other two.
        match (lv.past(), lv.current()) {
            (0, 1) => (a, b, c),
            (0, 2) => (a, c, b),
            (1, 0) => (b, a, c),
            (1, 2) => (b, c, a),
            (2, 0) => (c, a, b),
            _ => (c, b, a),
        }
    }
}
