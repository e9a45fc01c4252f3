use std::fmt::Debug;

use crate::types::Location;

/// A sample leaving the reservoir; the tree deletion that mirrors it needs
/// both the reference and the sequence index under which it was admitted.
#[derive(Clone, Copy)]
pub struct EvictedSample {
    pub reference: usize,
    pub weight: f32,
    pub sequence_index: u64,
}

/// Outcome of offering one point to the sampler.
pub struct Acceptance {
    pub accepted: bool,
    pub evicted: Option<EvictedSample>,
}

/// Time-decayed reservoir of up to `capacity` point references.
///
/// Each offered point carries the weight `ln(-ln(u)) - lambda * sequence`,
/// computed by the owning component from exactly one uniform draw. The
/// reservoir keeps the `capacity` smallest weights in a max-root heap:
/// admission means beating the heap root, and the root (the stalest
/// effective weight) is evicted exactly once. This is the mirror image of
/// the min-heap formulation with negated weights; recent points are
/// favored either way.
///
/// The decay rate can change mid-stream: the accumulated decay up to the
/// switch point is folded into an offset so weights computed before and
/// after the switch stay comparable.
pub struct WeightedSampler<P>
where
    P: Location,
{
    capacity: usize,
    weights: Vec<f32>,
    points: Vec<P>,
    sequence_indexes: Vec<u64>,
    current_size: usize,
    time_decay: f64,
    accumulated_decay: f64,
    last_decay_update: u64,
    accepted_state: Option<(f32, u64)>,
}

impl<P> WeightedSampler<P>
where
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    <P as TryFrom<usize>>::Error: Debug,
{
    pub fn new(capacity: usize, time_decay: f64) -> Self {
        WeightedSampler {
            capacity,
            weights: vec![0.0; capacity],
            points: vec![P::MAX; capacity],
            sequence_indexes: vec![0; capacity],
            current_size: 0,
            time_decay,
            accumulated_decay: 0.0,
            last_decay_update: 0,
            accepted_state: None,
        }
    }

    /// Effective weight of a point offered at `sequence_index`, given the
    /// component's single uniform draw for this update.
    pub fn compute_weight(&self, random_number: f64, sequence_index: u64) -> f32 {
        let decay = self.accumulated_decay
            + (sequence_index - self.last_decay_update) as f64 * self.time_decay;
        (f64::ln(-f64::ln(random_number)) - decay) as f32
    }

    pub fn set_time_decay(&mut self, time_decay: f64, sequence_index: u64) {
        self.accumulated_decay +=
            (sequence_index - self.last_decay_update) as f64 * self.time_decay;
        self.last_decay_update = sequence_index;
        self.time_decay = time_decay;
    }

    pub fn time_decay(&self) -> f64 {
        self.time_decay
    }

    fn swap_down(&mut self, start_index: usize) {
        let mut current = start_index;
        while 2 * current + 1 < self.current_size {
            let mut max_index = 2 * current + 1;
            if 2 * current + 2 < self.current_size
                && self.weights[2 * current + 2] > self.weights[max_index]
            {
                max_index = 2 * current + 2;
            }
            if self.weights[max_index] > self.weights[current] {
                self.swap_entries(current, max_index);
                current = max_index;
            } else {
                break;
            }
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.points.swap(a, b);
        self.weights.swap(a, b);
        self.sequence_indexes.swap(a, b);
    }

    /// Decides admission. `initial` is the initial-accept lottery outcome,
    /// meaningful only while the reservoir is filling. Evicts at most one
    /// sample, and only as part of an admission.
    pub fn accept_point(
        &mut self,
        initial: bool,
        weight: f32,
        sequence_index: u64,
    ) -> Acceptance {
        if initial || (self.current_size > 0 && weight < self.weights[0]) {
            self.accepted_state = Some((weight, sequence_index));
            let evicted = if !initial { Some(self.evict_max()) } else { None };
            return Acceptance {
                accepted: true,
                evicted,
            };
        }
        Acceptance {
            accepted: false,
            evicted: None,
        }
    }

    /// Finalizes an admission with the reference actually retained by the
    /// tree (which may be an existing reference when the point duplicates
    /// a stored one). Must follow a successful `accept_point`.
    pub fn add_point(&mut self, point_index: usize) {
        let (weight, sequence_index) = self
            .accepted_state
            .take()
            .expect("add_point without a preceding acceptance");
        assert!(self.current_size < self.capacity, "sampler overflow");

        self.weights[self.current_size] = weight;
        self.points[self.current_size] = point_index.try_into().expect("reference out of range");
        self.sequence_indexes[self.current_size] = sequence_index;

        let mut current = self.current_size;
        self.current_size += 1;
        while current > 0 {
            let parent = (current - 1) / 2;
            if self.weights[parent] < self.weights[current] {
                self.swap_entries(current, parent);
                current = parent;
            } else {
                break;
            }
        }
    }

    /// Pops the heaviest (stalest) sample; usable repeatedly to shrink the
    /// reservoir together with its tree.
    pub fn evict_max(&mut self) -> EvictedSample {
        assert!(self.current_size > 0, "evicting from an empty sampler");
        let evicted = EvictedSample {
            reference: self.points[0].try_into().expect("point reference exceeds usize width"),
            weight: self.weights[0],
            sequence_index: self.sequence_indexes[0],
        };
        self.current_size -= 1;
        let last = self.current_size;
        self.weights[0] = self.weights[last];
        self.points[0] = self.points[last];
        self.sequence_indexes[0] = self.sequence_indexes[last];
        self.swap_down(0);
        evicted
    }

    pub fn references(&self) -> &[P] {
        &self.points[0..self.current_size]
    }

    pub fn is_full(&self) -> bool {
        self.current_size == self.capacity
    }

    pub fn fill_fraction(&self) -> f64 {
        if self.current_size == self.capacity {
            return 1.0;
        }
        self.current_size as f64 / self.capacity as f64
    }

    pub fn size(&self) -> usize {
        self.current_size
    }

    pub fn size_in_bytes(&self) -> usize {
        self.weights.len() * std::mem::size_of::<f32>()
            + self.points.len() * std::mem::size_of::<P>()
            + self.sequence_indexes.len() * std::mem::size_of::<u64>()
            + std::mem::size_of::<WeightedSampler<P>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_sampler(capacity: usize) -> WeightedSampler<usize> {
        let mut sampler = WeightedSampler::new(capacity, 0.0);
        for i in 0..capacity {
            let acceptance = sampler.accept_point(true, -(i as f32), i as u64);
            assert!(acceptance.accepted && acceptance.evicted.is_none());
            sampler.add_point(i);
        }
        sampler
    }

    #[test]
    fn fills_then_evicts_the_heaviest() {
        let mut sampler = filled_sampler(4);
        assert!(sampler.is_full());
        // weight 0.0 is the current maximum; anything below wins
        let acceptance = sampler.accept_point(false, -10.0, 4);
        assert!(acceptance.accepted);
        let evicted = acceptance.evicted.expect("full sampler must evict");
        assert_eq!(evicted.weight, 0.0);
        assert_eq!(evicted.reference, 0);
        assert_eq!(evicted.sequence_index, 0);
        sampler.add_point(9);
        assert_eq!(sampler.size(), 4);
    }

    #[test]
    fn rejections_leave_the_heap_alone() {
        let mut sampler = filled_sampler(4);
        let acceptance = sampler.accept_point(false, 5.0, 4);
        assert!(!acceptance.accepted);
        assert!(acceptance.evicted.is_none());
        assert_eq!(sampler.size(), 4);
        let mut references: Vec<usize> = sampler.references().to_vec();
        references.sort();
        assert_eq!(references, vec![0, 1, 2, 3]);
    }

    #[test]
    fn heap_order_is_maintained() {
        let mut sampler: WeightedSampler<usize> = WeightedSampler::new(8, 0.0);
        let weights = [3.0f32, -1.0, 7.0, 0.5, -2.5, 4.0, 1.0, -0.5];
        for (i, &w) in weights.iter().enumerate() {
            sampler.accept_point(true, w, i as u64);
            sampler.add_point(i);
        }
        let mut drained = Vec::new();
        for _ in 0..8 {
            drained.push(sampler.evict_max().weight);
        }
        let mut expected = weights.to_vec();
        expected.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(drained, expected);
    }

    #[test]
    fn decay_change_keeps_weights_comparable() {
        let sampler_before: WeightedSampler<usize> = WeightedSampler::new(4, 0.25);
        let fixed_draw = 0.5f64;
        let w0 = sampler_before.compute_weight(fixed_draw, 100);

        let mut sampler_after: WeightedSampler<usize> = WeightedSampler::new(4, 0.25);
        sampler_after.set_time_decay(0.25, 100);
        let w1 = sampler_after.compute_weight(fixed_draw, 100);
        // switching to the same rate at the current sequence changes nothing
        assert!((w0 - w1).abs() < 1e-6);

        // switching rates accumulates past decay instead of rewriting it
        let mut sampler_switched: WeightedSampler<usize> = WeightedSampler::new(4, 0.25);
        sampler_switched.set_time_decay(1.0, 100);
        let w2 = sampler_switched.compute_weight(fixed_draw, 101);
        let expected = (f64::ln(-f64::ln(fixed_draw)) - (0.25 * 100.0 + 1.0)) as f32;
        assert!((w2 - expected).abs() < 1e-6);
    }
}
