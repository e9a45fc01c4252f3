use std::collections::HashMap;
use std::fmt::Debug;

use log::trace;

use crate::common::intervals::IntervalManager;
use crate::errors::{ForestError, Result};
use crate::types::Location;
use crate::util::check_argument;

/// Read/write surface of the shared point arena. Trees hold `usize`
/// references into the store and never look at the backing layout; the
/// store reference-counts each entry (one count per tree retaining it) and
/// recycles slots on the way down to zero.
pub trait PointStore: Sync {
    /// Builds the full-dimension query point for an externally supplied
    /// input, completing it from the most recent shingle when internal
    /// shingling is enabled.
    fn shingled_point(&self, point: &[f32]) -> Result<Vec<f32>>;

    /// Maps base-dimension positions to positions in the stored
    /// (shingled, possibly rotated) points, `look_ahead` steps from now.
    fn missing_indices(&self, look_ahead: usize, values: &[usize]) -> Result<Vec<usize>>;

    /// The positions that the next input `look_ahead` steps from now will
    /// occupy; the extrapolation loop imputes exactly these.
    fn next_indices(&self, look_ahead: usize) -> Result<Vec<usize>>;

    /// Owned, rotation-corrected copy of a stored point.
    fn copy(&self, index: usize) -> Result<Vec<f32>>;

    fn is_equal(&self, point: &[f32], index: usize) -> Result<bool>;

    /// Borrowed view of the stored point plus its rotation offset; valid
    /// until the store is mutated.
    fn reference_and_offset(&self, index: usize) -> Result<(&[f32], usize)>;

    /// Copies a (sanitized) input into the arena with a reference count of
    /// one. Returns `None` while an internal shingle is still warming up.
    fn add(&mut self, point: &[f32]) -> Result<Option<usize>>;

    fn inc(&mut self, index: usize) -> Result<()>;

    /// Decrements; on the transition to zero the slot is freed and may be
    /// recycled by a later `add`.
    fn dec(&mut self, index: usize) -> Result<()>;

    fn compact(&mut self) -> Result<()>;

    fn size_in_bytes(&self) -> usize;
}

/// Arena-backed store. Points are f32 rows inside one `Vec<f32>`; with
/// shingled input, consecutive points overlap in all but the newest base
/// block and the overlap is stored once. Reference counts are u8 with a
/// spill map for the rare entry shared by hundreds of trees.
pub struct CompactPointStore<L>
where
    L: Location,
{
    internal_shingling: bool,
    internal_rotation: bool,
    last_known_shingle: Vec<f32>,
    dimensions: usize,
    shingle_size: usize,
    capacity: usize,
    store: Vec<f32>,
    location: Vec<L>,
    reference_count: Vec<u8>,
    overflow_counts: HashMap<usize, usize>,
    next_sequence_index: usize,
    start_free_region: usize,
    index_manager: IntervalManager<L>,
}

impl<L> CompactPointStore<L>
where
    L: Location,
    usize: From<L>,
    <L as TryFrom<usize>>::Error: Debug,
{
    pub fn new(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        initial_capacity: usize,
        internal_shingling: bool,
        internal_rotation: bool,
    ) -> Result<Self> {
        check_argument(dimensions > 0, "dimensions must be positive")?;
        check_argument(
            shingle_size > 0 && dimensions % shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        check_argument(
            !internal_rotation || internal_shingling,
            "rotation requires internal shingling",
        )?;
        check_argument(
            initial_capacity > 0 && capacity >= initial_capacity,
            "initial capacity must be positive and at most the maximum",
        )?;
        Ok(CompactPointStore {
            internal_shingling,
            internal_rotation,
            dimensions,
            shingle_size,
            capacity,
            store: vec![0.0; initial_capacity * dimensions],
            location: vec![L::MAX; initial_capacity],
            reference_count: vec![0; initial_capacity],
            overflow_counts: HashMap::new(),
            last_known_shingle: vec![0.0; dimensions],
            next_sequence_index: 0,
            start_free_region: 0,
            index_manager: IntervalManager::new(initial_capacity),
        })
    }

    fn base_dimension(&self) -> usize {
        self.dimensions / self.shingle_size
    }

    /// Overlap check: with shingled input the previous point's trailing
    /// `dimensions - base` values coincide with the new point's leading
    /// values, in which case only the fresh base block needs to be stored.
    fn ready_to_copy(&self, point: &[f32]) -> bool {
        let mut answer: bool = self.shingle_size > 1;
        let base = self.base_dimension();
        let mut index: usize = self.start_free_region;
        let extra = self.dimensions - base;
        if answer && index > extra {
            index -= extra;
            for i in 0..extra {
                answer = answer && (self.store[index + i] == point[i]);
            }
        } else {
            answer = false;
        }
        answer
    }

    fn inc_helper(
        index: usize,
        counts: &mut [u8],
        overflow: &mut HashMap<usize, usize>,
    ) -> Result<()> {
        check_argument(index < counts.len(), "reference out of range")?;
        if counts[index] == u8::MAX {
            if let Some(a) = overflow.remove(&index) {
                overflow.insert(index, a + 1);
            } else {
                overflow.insert(index, 1);
            }
        } else {
            counts[index] += 1;
        }
        Ok(())
    }

    fn dec_helper(
        index: usize,
        counts: &mut [u8],
        overflow: &mut HashMap<usize, usize>,
    ) -> Result<()> {
        check_argument(index < counts.len(), "reference out of range")?;
        if counts[index] == 0 {
            return Err(ForestError::InvalidReference {
                msg: "reference is not in use",
            });
        }
        if let Some(a) = overflow.remove(&index) {
            if a > 1 {
                overflow.insert(index, a - 1);
            }
        } else {
            counts[index] -= 1;
        }
        Ok(())
    }

    fn grow_for_next_point(&mut self) -> Result<()> {
        if self.dimensions + self.start_free_region > self.store.len() {
            self.compact()?;
            if self.dimensions + self.start_free_region > self.store.len() {
                let grown = self.store.len() + usize::max(self.store.len() / 5, self.dimensions);
                let new_size = usize::min(grown, self.capacity * self.dimensions);
                trace!(
                    "point store arena grows from {} to {} floats",
                    self.store.len(),
                    new_size
                );
                self.store.resize(new_size, 0.0);
            }
        }
        if self.index_manager.is_empty() {
            let grown = self.location.len() + usize::max(self.location.len() / 5, 1);
            let new_size = usize::min(grown, self.capacity);
            if new_size > self.location.len() {
                self.location.resize(new_size, L::MAX);
                self.reference_count.resize(new_size, 0);
                self.index_manager.change_capacity(new_size);
            }
        }
        Ok(())
    }

    pub fn active_points(&self) -> usize {
        self.index_manager.used()
    }
}

impl<L> PointStore for CompactPointStore<L>
where
    L: Location,
    usize: From<L>,
    <L as TryFrom<usize>>::Error: Debug,
{
    fn shingled_point(&self, point: &[f32]) -> Result<Vec<f32>> {
        let mut new_point = vec![0.0; self.dimensions];
        let base = self.base_dimension();
        if point.len() == base && self.shingle_size > 1 {
            check_argument(
                self.internal_shingling,
                "expected input matching internal shingling",
            )?;
            if !self.internal_rotation {
                new_point[..(self.dimensions - base)]
                    .copy_from_slice(&self.last_known_shingle[base..]);
                new_point[(self.dimensions - base)..].copy_from_slice(point);
            } else {
                new_point.copy_from_slice(&self.last_known_shingle);
                let offset = (self.next_sequence_index * base) % self.dimensions;
                new_point[offset..offset + base].copy_from_slice(point);
            }
            return Ok(new_point);
        }
        check_argument(
            point.len() == self.dimensions,
            "expected externally shingled input",
        )?;
        new_point.copy_from_slice(point);
        Ok(new_point)
    }

    fn missing_indices(&self, look_ahead: usize, values: &[usize]) -> Result<Vec<usize>> {
        if !self.internal_shingling {
            for x in values {
                check_argument(*x < self.dimensions, "position out of range")?;
            }
            return Ok(Vec::from(values));
        }
        let base = self.base_dimension();
        let mut answer = Vec::new();
        for &value in values {
            check_argument(value < base, "position out of range")?;
            if self.internal_rotation {
                answer
                    .push(((self.next_sequence_index + look_ahead) * base + value) % self.dimensions);
            } else {
                answer.push(self.dimensions - base + value);
            }
        }
        Ok(answer)
    }

    fn next_indices(&self, look_ahead: usize) -> Result<Vec<usize>> {
        let base = self.base_dimension();
        let values: Vec<usize> = (0..base).collect();
        self.missing_indices(look_ahead, &values)
    }

    fn copy(&self, index: usize) -> Result<Vec<f32>> {
        let mut new_point = vec![0.0; self.dimensions];
        let (reference, offset) = self.reference_and_offset(index)?;
        if self.internal_rotation {
            for i in 0..self.dimensions {
                new_point[(i + offset) % self.dimensions] = reference[i];
            }
        } else {
            new_point.copy_from_slice(reference);
        }
        Ok(new_point)
    }

    fn is_equal(&self, point: &[f32], index: usize) -> Result<bool> {
        let (reference, offset) = self.reference_and_offset(index)?;
        if self.internal_rotation {
            for i in 0..self.dimensions {
                if point[(i + offset) % self.dimensions] != reference[i] {
                    return Ok(false);
                }
            }
            Ok(true)
        } else {
            Ok(point.eq(reference))
        }
    }

    fn reference_and_offset(&self, index: usize) -> Result<(&[f32], usize)> {
        if index >= self.reference_count.len() || self.reference_count[index] == 0 {
            return Err(ForestError::InvalidReference {
                msg: "reference is not in use",
            });
        }
        let base = self.base_dimension();
        let locn: usize = self.location[index].try_into().expect("corrupt location");
        let adjusted = locn * base;
        let offset = if !self.internal_rotation {
            0
        } else {
            adjusted % self.dimensions
        };
        Ok((&self.store[adjusted..(adjusted + self.dimensions)], offset))
    }

    fn add(&mut self, point: &[f32]) -> Result<Option<usize>> {
        let base = self.base_dimension();
        self.next_sequence_index += 1;

        if self.internal_shingling {
            check_argument(point.len() == base, "expected base-dimension input")?;
            self.last_known_shingle.copy_within(base.., 0);
            let start = self.dimensions - base;
            self.last_known_shingle[start..].copy_from_slice(point);
            if self.next_sequence_index < self.shingle_size {
                return Ok(None);
            }
        } else {
            check_argument(point.len() == self.dimensions, "mismatched input length")?;
        }

        self.grow_for_next_point()?;
        let position: usize = self.index_manager.get().map_err(|_| {
            ForestError::CapacityExceeded {
                msg: "point store is at maximum capacity",
            }
        })?;
        check_argument(self.reference_count[position] == 0, "corrupt free list")?;
        self.reference_count[position] = 1;

        let new_point: &[f32] = if self.internal_shingling {
            &self.last_known_shingle
        } else {
            point
        };

        if self.ready_to_copy(new_point) {
            let mut index: usize = self.start_free_region;
            let extra = self.dimensions - base;
            let location_value: usize = (index - extra) / base;
            self.location[position] = location_value.try_into().expect("location out of range");
            for i in 0..base {
                self.store[index] = new_point[extra + i];
                index += 1;
            }
            self.start_free_region += base;
        } else {
            let mut index: usize = self.start_free_region;
            let location_value: usize = index / base;
            self.location[position] = location_value.try_into().expect("location out of range");
            for i in 0..self.dimensions {
                self.store[index] = new_point[i];
                index += 1;
            }
            self.start_free_region += self.dimensions;
        }
        Ok(Some(position))
    }

    fn inc(&mut self, index: usize) -> Result<()> {
        Self::inc_helper(index, &mut self.reference_count, &mut self.overflow_counts)
    }

    fn dec(&mut self, index: usize) -> Result<()> {
        Self::dec_helper(index, &mut self.reference_count, &mut self.overflow_counts)?;
        if self.reference_count[index] == 0 {
            self.index_manager.release(index);
            self.location[index] = L::MAX;
        }
        Ok(())
    }

    /// Slides live blocks to the front of the arena, merging overlapping
    /// shingle runs; locations are renumbered in place so references held
    /// by trees stay valid.
    fn compact(&mut self) -> Result<()> {
        let base = self.base_dimension();
        let mut reverse_reference: Vec<(usize, usize)> = Vec::new();
        for i in 0..self.location.len() {
            if self.location[i] != L::MAX {
                reverse_reference.push((
                    self.location[i].try_into().expect("corrupt location"),
                    i,
                ));
            }
        }
        reverse_reference.sort();
        trace!("compacting point store, {} live points", reverse_reference.len());
        let mut fresh_start: usize = 0;
        let mut j_static: usize = 0;
        let mut j_dynamic: usize;
        let end: usize = reverse_reference.len();
        while j_static < end {
            let block_start: usize = reverse_reference[j_static].0 * base;
            let mut block_end: usize = block_start + self.dimensions;
            let initial = if self.internal_rotation {
                (self.dimensions - fresh_start + block_start) % self.dimensions
            } else {
                0
            };

            let mut k = j_static + 1;
            j_dynamic = j_static + 1;
            while k < end {
                let new_element: usize = base * reverse_reference[k].0;
                if block_end >= new_element {
                    k += 1;
                    j_dynamic += 1;
                    if block_end < new_element + self.dimensions {
                        block_end = new_element + self.dimensions;
                    }
                } else {
                    k = end;
                }
            }

            // rotated blocks must stay congruent to their offset
            for _i in 0..initial {
                self.store[fresh_start] = 0.0;
                fresh_start += 1;
            }

            for i in block_start..block_end {
                self.store[fresh_start] = self.store[i];
                check_argument(
                    !self.internal_rotation
                        || fresh_start % self.dimensions == i % self.dimensions,
                    "corrupt state in compaction",
                )?;
                if j_static < end {
                    let locn: usize = reverse_reference[j_static].0;
                    if i == base * locn {
                        let moved: usize = reverse_reference[j_static].1;
                        self.location[moved] =
                            (fresh_start / base).try_into().expect("location out of range");
                        j_static += 1;
                    }
                }
                fresh_start += 1;
            }

            check_argument(j_static == j_dynamic, "discrepancy in compaction indices")?;
        }
        self.start_free_region = fresh_start;
        Ok(())
    }

    fn size_in_bytes(&self) -> usize {
        self.store.len() * std::mem::size_of::<f32>()
            + self.location.len() * std::mem::size_of::<L>()
            + self.reference_count.len() * std::mem::size_of::<u8>()
            + self.index_manager.size_in_bytes()
            + std::mem::size_of::<CompactPointStore<L>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_store(capacity: usize) -> CompactPointStore<usize> {
        CompactPointStore::new(2, 1, capacity, 2, false, false).unwrap()
    }

    #[test]
    fn add_and_read_back() {
        let mut store = plain_store(8);
        let a = store.add(&[1.0, 2.0]).unwrap().unwrap();
        let b = store.add(&[3.0, 4.0]).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(store.copy(a).unwrap(), vec![1.0, 2.0]);
        assert!(store.is_equal(&[3.0, 4.0], b).unwrap());
        assert!(!store.is_equal(&[1.0, 2.0], b).unwrap());
    }

    #[test]
    fn reference_counting_frees_slots() {
        let mut store = plain_store(8);
        let a = store.add(&[1.0, 2.0]).unwrap().unwrap();
        store.inc(a).unwrap();
        store.dec(a).unwrap();
        assert!(store.copy(a).is_ok());
        store.dec(a).unwrap();
        assert!(matches!(
            store.copy(a),
            Err(ForestError::InvalidReference { .. })
        ));
        assert!(matches!(
            store.dec(a),
            Err(ForestError::InvalidReference { .. })
        ));
        assert_eq!(store.active_points(), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut store = plain_store(2);
        store.add(&[0.0, 0.0]).unwrap();
        store.add(&[1.0, 1.0]).unwrap();
        assert!(matches!(
            store.add(&[2.0, 2.0]),
            Err(ForestError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn compaction_preserves_points() {
        let mut store = plain_store(16);
        let mut live = Vec::new();
        for i in 0..8 {
            let index = store.add(&[i as f32, -(i as f32)]).unwrap().unwrap();
            live.push(index);
        }
        for &index in live.iter().step_by(2) {
            store.dec(index).unwrap();
        }
        store.compact().unwrap();
        for &index in live.iter().skip(1).step_by(2) {
            let point = store.copy(index).unwrap();
            assert_eq!(point[0], -point[1]);
        }
    }

    #[test]
    fn internal_shingling_warms_up_and_overlaps() {
        let mut store: CompactPointStore<usize> =
            CompactPointStore::new(6, 3, 16, 4, true, false).unwrap();
        assert!(store.add(&[1.0, 10.0]).unwrap().is_none());
        assert!(store.add(&[2.0, 20.0]).unwrap().is_none());
        let a = store.add(&[3.0, 30.0]).unwrap().unwrap();
        assert_eq!(store.copy(a).unwrap(), vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        // the next shingle shares 4 of 6 values with the previous one
        let before = store.start_free_region;
        let b = store.add(&[4.0, 40.0]).unwrap().unwrap();
        assert_eq!(store.start_free_region - before, 2);
        assert_eq!(store.copy(b).unwrap(), vec![2.0, 20.0, 3.0, 30.0, 4.0, 40.0]);
    }

    #[test]
    fn shingled_query_point_completion() {
        let mut store: CompactPointStore<usize> =
            CompactPointStore::new(4, 2, 16, 4, true, false).unwrap();
        store.add(&[1.0, 10.0]).unwrap();
        store.add(&[2.0, 20.0]).unwrap();
        let query = store.shingled_point(&[9.0, 90.0]).unwrap();
        assert_eq!(query, vec![2.0, 20.0, 9.0, 90.0]);
    }
}
