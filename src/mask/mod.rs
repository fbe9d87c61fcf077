//! Gravity suppression mask.
//!
//! Barrier ("gravity wall") cells split the coarse grid into 4-connected
//! regions. A region that reaches the outer edge of the grid keeps gravity; a
//! region fully enclosed by barriers has it suppressed. The mask stores one
//! word per cell and is applied by bitwise AND against `f32` bit patterns, so
//! suppressed cells read exactly `0.0`.

pub mod coord_stack;

use ndarray::{Array2, Zip};

use crate::config::GravityConfig;
use crate::error::{GravityError, Result};
use crate::grid::FieldSet;
use coord_stack::CoordStack;

/// Word for a cell where gravity passes through.
pub const MASK_ACTIVE: u32 = u32::MAX;
/// Word for a cell where gravity is zeroed.
pub const MASK_SUPPRESSED: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    words: Array2<u32>,
}

impl Mask {
    /// Gravity active everywhere; the state after construction or a full reset.
    pub fn all_active(width: usize, height: usize) -> Self {
        Self { words: Array2::from_elem((height, width), MASK_ACTIVE) }
    }

    pub fn from_words(words: Array2<u32>) -> Self {
        Self { words }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.words.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.words.nrows()
    }

    #[inline]
    pub fn word(&self, x: usize, y: usize) -> u32 {
        self.words[[y, x]]
    }

    #[inline]
    pub fn is_suppressed(&self, x: usize, y: usize) -> bool {
        self.words[[y, x]] == MASK_SUPPRESSED
    }

    pub fn suppressed_count(&self) -> usize {
        self.words.iter().filter(|&&w| w == MASK_SUPPRESSED).count()
    }

    pub fn as_words(&self) -> &Array2<u32> {
        &self.words
    }

    /// AND every value's bit pattern with its cell word. Idempotent.
    pub fn apply(&self, grid: &mut Array2<f32>) {
        debug_assert_eq!(grid.dim(), self.words.dim());
        Zip::from(grid)
            .and(&self.words)
            .for_each(|v, &m| *v = f32::from_bits(v.to_bits() & m));
    }

    /// Mask the acceleration components of a solved field.
    pub fn apply_velocity(&self, field: &mut FieldSet) {
        self.apply(&mut field.x);
        self.apply(&mut field.y);
    }
}

/// One connected non-barrier area found by the flood fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Some run of this region touches the outer edge of the grid.
    pub leaks_to_edge: bool,
    pub cell_count: usize,
}

/// Region arena plus the per-cell region index (`None` for barrier cells).
#[derive(Debug, Clone)]
pub struct RegionMap {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<Option<u32>>,
    pub regions: Vec<Region>,
}

impl RegionMap {
    pub fn region_at(&self, x: usize, y: usize) -> Option<&Region> {
        self.labels[y * self.width + x].map(|id| &self.regions[id as usize])
    }

    /// Assemble a fresh mask: outside regions active, everything else suppressed.
    pub fn to_mask(&self) -> Mask {
        let mut words = Array2::from_elem((self.height, self.width), MASK_SUPPRESSED);
        for (i, label) in self.labels.iter().enumerate() {
            if let Some(id) = label {
                if self.regions[*id as usize].leaks_to_edge {
                    words[[i / self.width, i % self.width]] = MASK_ACTIVE;
                }
            }
        }
        Mask { words }
    }
}

/// Scanline flood-fill partitioner over a barrier predicate.
#[derive(Debug, Clone)]
pub struct MaskBuilder {
    pub width: usize,
    pub height: usize,
    pub stack_capacity: usize,
}

impl MaskBuilder {
    pub fn new(config: &GravityConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            stack_capacity: config.stack_capacity(),
        }
    }

    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Build a mask from `is_barrier(x, y)`. Fails with `StackOverflow` if any
    /// fill exceeds the stack bound; no partial mask is produced.
    pub fn build<F>(&self, is_barrier: F) -> Result<Mask>
    where
        F: Fn(usize, usize) -> bool,
    {
        Ok(self.partition(is_barrier)?.to_mask())
    }

    /// Build from a `(height, width)` barrier grid.
    pub fn build_from_grid(&self, barriers: &Array2<bool>) -> Result<Mask> {
        let (h, w) = barriers.dim();
        if w != self.width || h != self.height {
            return Err(GravityError::DimensionMismatch {
                expected_w: self.width,
                expected_h: self.height,
                found_w: w,
                found_h: h,
            });
        }
        self.build(|x, y| barriers[[y, x]])
    }

    /// Label every non-barrier cell with its region.
    pub fn partition<F>(&self, is_barrier: F) -> Result<RegionMap>
    where
        F: Fn(usize, usize) -> bool,
    {
        let (w, h) = (self.width, self.height);
        let mut map = RegionMap {
            width: w,
            height: h,
            labels: vec![None; w * h],
            regions: Vec::new(),
        };
        let mut stack = CoordStack::new(self.stack_capacity);

        // Column-major seed order; the result does not depend on it.
        for x in 0..w {
            for y in 0..h {
                if map.labels[y * w + x].is_some() || is_barrier(x, y) {
                    continue;
                }
                let id = map.regions.len() as u32;
                let region = self.fill(x, y, id, &is_barrier, &mut map.labels, &mut stack)?;
                map.regions.push(region);
            }
        }
        Ok(map)
    }

    fn fill<F>(
        &self,
        seed_x: usize,
        seed_y: usize,
        id: u32,
        is_barrier: &F,
        labels: &mut [Option<u32>],
        stack: &mut CoordStack,
    ) -> Result<Region>
    where
        F: Fn(usize, usize) -> bool,
    {
        let (w, h) = (self.width, self.height);
        let open = |labels: &[Option<u32>], x: usize, y: usize| {
            labels[y * w + x].is_none() && !is_barrier(x, y)
        };

        let mut region = Region { leaks_to_edge: false, cell_count: 0 };
        stack.clear();
        stack.push(seed_x, seed_y)?;

        while let Some((x, y)) = stack.pop() {
            // A span can be seeded twice before it is filled.
            if !open(labels, x, y) {
                continue;
            }

            let mut x1 = x;
            while x1 > 0 && open(labels, x1 - 1, y) {
                x1 -= 1;
            }
            let mut x2 = x;
            while x2 + 1 < w && open(labels, x2 + 1, y) {
                x2 += 1;
            }

            if x1 == 0 || x2 == w - 1 || y == 0 || y == h - 1 {
                region.leaks_to_edge = true;
            }
            for cx in x1..=x2 {
                labels[y * w + cx] = Some(id);
            }
            region.cell_count += x2 - x1 + 1;

            if y > 0 {
                push_spans(labels, &open, x1, x2, y - 1, stack)?;
            }
            if y + 1 < h {
                push_spans(labels, &open, x1, x2, y + 1, stack)?;
            }
        }
        Ok(region)
    }
}

/// Seed one coordinate per open span of row `y` within `[x1, x2]`.
fn push_spans<O>(
    labels: &[Option<u32>],
    open: &O,
    x1: usize,
    x2: usize,
    y: usize,
    stack: &mut CoordStack,
) -> Result<()>
where
    O: Fn(&[Option<u32>], usize, usize) -> bool,
{
    let mut in_span = false;
    for x in x1..=x2 {
        if open(labels, x, y) {
            if !in_span {
                stack.push(x, y)?;
                in_span = true;
            }
        } else {
            in_span = false;
        }
    }
    Ok(())
}

/// Defers a mask rebuild until `frames` frames after the most recent edit.
#[derive(Debug, Clone)]
pub struct MaskDebounce {
    frames: u32,
    remaining: u32,
}

impl MaskDebounce {
    pub fn new(frames: u32) -> Self {
        Self { frames: frames.max(1), remaining: 0 }
    }

    /// (Re)arm the countdown. Repeated edits keep pushing the rebuild back.
    pub fn arm(&mut self) {
        self.remaining = self.frames;
    }

    pub fn is_pending(&self) -> bool {
        self.remaining > 0
    }

    /// Drop a pending rebuild without firing it.
    pub fn disarm(&mut self) {
        self.remaining = 0;
    }

    /// Advance one frame; true on the frame the rebuild is due.
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }
}
