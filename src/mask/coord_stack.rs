use crate::error::{GravityError, Result};

/// Bounded LIFO of cell coordinates for the scanline flood fill.
///
/// Pushing past `capacity` is an error rather than a reallocation, so a
/// pathological barrier layout cannot grow the fill without limit.
#[derive(Debug)]
pub struct CoordStack {
    items: Vec<(usize, usize)>,
    capacity: usize,
}

impl CoordStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            // Only reserve up front for modest bounds; large bounds grow on demand.
            items: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, x: usize, y: usize) -> Result<()> {
        if self.items.len() >= self.capacity {
            return Err(GravityError::StackOverflow { capacity: self.capacity });
        }
        self.items.push((x, y));
        Ok(())
    }

    pub fn pop(&mut self) -> Option<(usize, usize)> {
        self.items.pop()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
