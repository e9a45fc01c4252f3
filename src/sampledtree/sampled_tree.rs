use std::fmt::Debug;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::errors::Result;
use crate::pointstore::PointStore;
use crate::sampledtree::nodestore::CompactNodeStore;
use crate::sampledtree::nodeview::UpdatableNodeView;
use crate::sampledtree::sampler::WeightedSampler;
use crate::sampledtree::tree::RandomCutTree;
use crate::types::Location;
use crate::visitor::visitor::{Visitor, VisitorInfo};

/// What one component did with an update; the coordinator settles the
/// point store's reference counts from these.
#[derive(Clone, Copy)]
pub struct UpdateResult {
    /// Reference retained by the tree (possibly an existing duplicate).
    pub added: Option<usize>,
    /// Reference evicted from the sampler and deleted from the tree.
    pub deleted: Option<usize>,
}

impl UpdateResult {
    pub fn noop() -> Self {
        UpdateResult {
            added: None,
            deleted: None,
        }
    }
}

/// One sampler paired with one tree: an admission inserts into the tree,
/// an admission-with-eviction also deletes the evicted reference. The
/// component owns its seed, so its evolution is independent of every other
/// component and of the execution schedule.
pub struct SampledTree<C, P, N>
where
    C: Location,
    usize: From<C>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
{
    tree: RandomCutTree<C, P, N>,
    sampler: WeightedSampler<P>,
    initial_accept_fraction: f64,
    random_seed: u64,
}

impl<C, P, N> SampledTree<C, P, N>
where
    C: Location,
    usize: From<C>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
    <C as TryFrom<usize>>::Error: Debug,
    <P as TryFrom<usize>>::Error: Debug,
    <N as TryFrom<usize>>::Error: Debug,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dimensions: usize,
        capacity: usize,
        using_transforms: bool,
        random_seed: u64,
        store_sequence_indexes: bool,
        center_of_mass: bool,
        time_decay: f64,
        initial_accept_fraction: f64,
        bounding_box_cache_fraction: f64,
    ) -> Result<Self> {
        let mut rng = ChaCha20Rng::seed_from_u64(random_seed);
        let self_seed = rng.next_u64();
        Ok(SampledTree {
            initial_accept_fraction,
            tree: RandomCutTree::<C, P, N>::new(
                dimensions,
                capacity,
                using_transforms,
                store_sequence_indexes,
                center_of_mass,
                bounding_box_cache_fraction,
                rng.next_u64(),
            )?,
            sampler: WeightedSampler::new(capacity, time_decay),
            random_seed: self_seed,
        })
    }

    /// Offers `(reference, sequence)` to the sampler and mirrors its
    /// decision in the tree. Consumes exactly one weight draw regardless
    /// of the outcome, so replays and schedules cannot diverge.
    pub fn update<PS: PointStore>(
        &mut self,
        point_index: usize,
        sequence_index: u64,
        point_store: &PS,
    ) -> Result<UpdateResult> {
        let mut rng = ChaCha20Rng::seed_from_u64(self.random_seed);
        self.random_seed = rng.next_u64();
        let random_number: f64 = rng.gen();
        let weight = self.sampler.compute_weight(random_number, sequence_index);

        let mut initial = false;
        if !self.sampler.is_full() {
            let other_random: f64 = rng.gen();
            initial = other_random < self.initial_accept_probability(self.sampler.fill_fraction());
        }

        let acceptance = self.sampler.accept_point(initial, weight, sequence_index);
        if !acceptance.accepted {
            return Ok(UpdateResult::noop());
        }

        let deleted = match acceptance.evicted {
            Some(evicted) => Some(self.tree.delete(
                evicted.reference,
                evicted.sequence_index,
                point_store,
            )?),
            None => None,
        };

        // the tree may retain an existing reference for a duplicate point;
        // the sampler must hold whatever the tree holds
        let added = self.tree.add(point_index, sequence_index, point_store)?;
        self.sampler.add_point(added);

        Ok(UpdateResult {
            added: Some(added),
            deleted,
        })
    }

    /// Ramp controlling how eagerly a filling sampler admits points; below
    /// the configured fraction everything is admitted, above it admission
    /// tapers linearly.
    fn initial_accept_probability(&self, fill_fraction: f64) -> f64 {
        if fill_fraction < self.initial_accept_fraction {
            1.0
        } else if self.initial_accept_fraction >= 1.0 {
            0.0
        } else {
            1.0 - (fill_fraction - self.initial_accept_fraction)
                / (1.0 - self.initial_accept_fraction)
        }
    }

    pub fn traverse<R, PS, NV, V>(
        &self,
        point: &[f32],
        parameters: &[usize],
        visitor_factory: fn(usize, &[usize], &VisitorInfo) -> V,
        visitor_info: &VisitorInfo,
        point_store: &PS,
        default: &R,
    ) -> Result<R>
    where
        PS: PointStore,
        V: Visitor<NV, R>,
        R: Clone,
        NV: UpdatableNodeView<CompactNodeStore<C, P, N>, PS>,
    {
        self.tree.traverse(
            point,
            parameters,
            visitor_factory,
            visitor_info,
            point_store,
            default,
        )
    }

    pub fn conditional_field<PS: PointStore>(
        &self,
        missing: &[usize],
        centrality: f64,
        point: &[f32],
        point_store: &PS,
        visitor_info: &VisitorInfo,
    ) -> Result<(f64, usize, f64)> {
        self.tree.conditional_field(
            missing,
            point,
            point_store,
            centrality,
            self.random_seed,
            visitor_info,
        )
    }

    pub fn is_output_ready(&self) -> bool {
        self.sampler.is_full()
    }

    pub fn tree(&self) -> &RandomCutTree<C, P, N> {
        &self.tree
    }

    pub fn set_time_decay(&mut self, time_decay: f64, sequence_index: u64) {
        self.sampler.set_time_decay(time_decay, sequence_index);
    }

    pub fn time_decay(&self) -> f64 {
        self.sampler.time_decay()
    }

    pub fn set_bounding_box_cache_fraction(&mut self, fraction: f64) -> Result<()> {
        self.tree.set_bounding_box_cache_fraction(fraction)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.tree.size_in_bytes()
            + self.sampler.size_in_bytes()
            + std::mem::size_of::<SampledTree<C, P, N>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointstore::{CompactPointStore, PointStore};

    fn small_component() -> (SampledTree<usize, usize, usize>, CompactPointStore<usize>) {
        let component = SampledTree::new(1, 3, false, 42, false, false, 0.1 / 3.0, 0.125, 1.0)
            .unwrap();
        let store = CompactPointStore::new(1, 1, 64, 8, false, false).unwrap();
        (component, store)
    }

    #[test]
    fn duplicate_heavy_stream_keeps_mass_bounded() {
        let (mut component, mut store) = small_component();
        // two values that collapse to the same f32
        let values = [48.08f32, 48.080_000_000_000_01f32];
        let mut live: Vec<usize> = Vec::new();
        for i in 0..20000u64 {
            let point = [values[(i % 2) as usize]];
            let index = store.add(&point).unwrap().unwrap();
            let result = component.update(index, i, &store).unwrap();
            match result.added {
                Some(added) => {
                    store.inc(added).unwrap();
                    live.push(added);
                    if let Some(deleted) = result.deleted {
                        store.dec(deleted).unwrap();
                        let position = live.iter().position(|&r| r == deleted).unwrap();
                        live.swap_remove(position);
                    }
                }
                None => {}
            }
            store.dec(index).unwrap();
            assert!(component.tree().mass() <= 3);
        }
        component.tree().check_consistency(&store).unwrap();
    }

    #[test]
    fn add_then_delete_leaves_the_tree_empty() {
        let (mut component, mut store) = small_component();
        let index = store.add(&[1.0]).unwrap().unwrap();
        let result = component.update(index, 0, &store).unwrap();
        assert_eq!(result.added, Some(index));
        assert!(result.deleted.is_none());
        assert_eq!(component.tree().mass(), 1);
        component.tree().check_consistency(&store).unwrap();
    }

    #[test]
    fn update_and_eviction_settle_mass() {
        let (mut component, mut store) = small_component();
        let mut rng_value = 1.0f32;
        for i in 0..200u64 {
            rng_value = (rng_value * 31.0) % 17.0;
            let index = store.add(&[rng_value]).unwrap().unwrap();
            let result = component.update(index, i, &store).unwrap();
            if let Some(added) = result.added {
                store.inc(added).unwrap();
            }
            if let Some(deleted) = result.deleted {
                store.dec(deleted).unwrap();
            }
            store.dec(index).unwrap();
            assert_eq!(component.tree().mass(), component_size(&component));
            component.tree().check_consistency(&store).unwrap();
        }
    }

    fn component_size(component: &SampledTree<usize, usize, usize>) -> usize {
        // sampler size and tree mass agree at all times
        if component.is_output_ready() {
            3
        } else {
            component.tree().mass()
        }
    }
}
