use crate::hypothesis::Hypothesis;

/// Recycles hypothesis slots across decode steps.
///
/// One step's slots all come back before the next step allocates, so a
/// decode touches at most two beams' worth of live slots; `max_free` bounds
/// how many spares are retained beyond that.
pub struct HypothesisPool {
    free: Vec<Box<Hypothesis>>,
    capacity: usize,
    max_free: usize,
}

impl HypothesisPool {
    /// `capacity` sizes each slot's sequence buffer (one entry per time
    /// step); `max_free` is the soft cap on retained spare slots.
    pub fn new(capacity: usize, max_free: usize) -> Self {
        Self {
            free: Vec::with_capacity(max_free),
            capacity,
            max_free,
        }
    }

    /// A recycled slot when one is spare, otherwise a fresh allocation.
    pub fn acquire(&mut self) -> Box<Hypothesis> {
        match self.free.pop() {
            Some(mut slot) => {
                slot.reset();
                slot
            }
            None => Box::new(Hypothesis::with_capacity(self.capacity)),
        }
    }

    pub fn release(&mut self, slot: Box<Hypothesis>) {
        if self.free.len() < self.max_free {
            self.free.push(slot);
        }
    }

    pub fn spare(&self) -> usize {
        self.free.len()
    }
}
