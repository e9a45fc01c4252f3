use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::common::density::DirectionalDensity;
use crate::common::divector::DiVector;
use crate::common::fieldsummarizer::FieldSummarizer;
use crate::common::rangevector::RangeVector;
use crate::common::samplesummary::SampleSummary;
use crate::conf::ForestOptions;
use crate::coordinator::UpdateCoordinator;
use crate::errors::{ForestError, Result};
use crate::executor::{ConvergingAccumulator, OneSidedAccumulator, TraversalExecutor};
use crate::pointstore::{CompactPointStore, PointStore};
use crate::sampledtree::nodeview::{BoxNodeView, ScoreNodeView};
use crate::sampledtree::sampled_tree::SampledTree;
use crate::types::Location;
use crate::util::{add_nbr, add_to, check_argument, divide, nbr_finish};
use crate::visitor::attribution::AttributionVisitor;
use crate::visitor::density::DensityVisitor;
use crate::visitor::nearneighbor::NearNeighborVisitor;
use crate::visitor::score::ScoreVisitor;
use crate::visitor::visitor::VisitorInfo;

/// Dynamic configuration key for the sampler decay rate.
pub const CONFIG_TIME_DECAY: &str = "time_decay";
/// Dynamic configuration key for the bounding-box cache fraction.
pub const CONFIG_BOUNDING_BOX_CACHE_FRACTION: &str = "bounding_box_cache_fraction";

/// A sampled point returned by a neighbor query, with every sequence index
/// under which the forest currently remembers admitting it.
#[derive(Clone)]
pub struct Neighbor {
    pub point: Vec<f32>,
    pub distance: f64,
    pub sequence_indexes: Vec<u64>,
}

/// The forest facade. Queries are safe to run concurrently from multiple
/// threads; updates require exclusive access, which the `&mut self`
/// receiver enforces.
pub trait Forest: Send {
    /// Ingests one point; with internal shingling the input is a base
    /// vector, otherwise a full `dimensions`-length vector.
    fn update(&mut self, point: &[f32]) -> Result<()>;

    fn score(&self, point: &[f32]) -> Result<f64> {
        self.score_traversal(point, &VisitorInfo::default())
    }

    /// Score under the displacement ("how many points would this push
    /// aside") functions rather than the default inverse-height blend.
    fn displacement_score(&self, point: &[f32]) -> Result<f64> {
        self.score_traversal(point, &VisitorInfo::displacement())
    }

    fn generic_score(
        &self,
        point: &[f32],
        ignore_mass: usize,
        score_seen: fn(usize, usize) -> f64,
        score_unseen: fn(usize, usize) -> f64,
        damp: fn(usize, usize) -> f64,
        normalizer: fn(f64, usize) -> f64,
    ) -> Result<f64> {
        self.score_traversal(
            point,
            &VisitorInfo::use_score(ignore_mass, score_seen, score_unseen, damp, normalizer),
        )
    }

    fn score_traversal(&self, point: &[f32], visitor_info: &VisitorInfo) -> Result<f64>;

    /// Early-stopping score: stops consulting trees once the running mean
    /// has stabilized. In parallel mode, results already in flight are
    /// applied before submission stops.
    fn approximate_score(&self, point: &[f32]) -> Result<f64>;

    fn attribution(&self, point: &[f32]) -> Result<DiVector> {
        self.attribution_traversal(point, &VisitorInfo::default())
    }

    fn generic_attribution(
        &self,
        point: &[f32],
        ignore_mass: usize,
        score_seen: fn(usize, usize) -> f64,
        score_unseen: fn(usize, usize) -> f64,
        damp: fn(usize, usize) -> f64,
        normalizer: fn(f64, usize) -> f64,
    ) -> Result<DiVector> {
        self.attribution_traversal(
            point,
            &VisitorInfo::use_score(ignore_mass, score_seen, score_unseen, damp, normalizer),
        )
    }

    fn attribution_traversal(&self, point: &[f32], visitor_info: &VisitorInfo)
        -> Result<DiVector>;

    fn simple_density(&self, point: &[f32]) -> Result<DirectionalDensity>;

    fn density(&self, point: &[f32]) -> Result<f64> {
        self.simple_density(point).map(|d| d.density())
    }

    fn directional_density(&self, point: &[f32]) -> Result<DiVector> {
        self.simple_density(point).map(|d| d.directional_density())
    }

    /// Replaces the values at `positions` with the forest's best guess
    /// given the remaining coordinates.
    fn impute_missing(&self, point: &[f32], positions: &[usize]) -> Result<Vec<f32>>;

    /// Weighted summary of the plausible completions at `positions`.
    fn conditional_field(
        &self,
        positions: &[usize],
        point: &[f32],
        centrality: f64,
        project: bool,
    ) -> Result<SampleSummary>;

    /// Forecasts `horizon` future base vectors with per-value bounds;
    /// requires internal shingling.
    fn extrapolate(&self, horizon: usize) -> Result<RangeVector>;

    /// Sampled points within `distance` of the query, ascending by
    /// distance; requires `store_sequence_indexes`.
    fn near_neighbors(&self, point: &[f32], distance: f64) -> Result<Vec<Neighbor>>;

    fn config_get(&self, key: &str) -> Result<f64>;
    fn config_set(&mut self, key: &str, value: f64) -> Result<()>;

    fn dimensions(&self) -> usize;
    fn shingle_size(&self) -> usize;
    fn sample_size(&self) -> usize;
    fn number_of_trees(&self) -> usize;
    fn total_updates(&self) -> u64;
    fn is_output_ready(&self) -> bool;
    fn samplers_full(&self) -> bool;
    fn is_internal_shingling_enabled(&self) -> bool;
    fn shingled_point(&self, point: &[f32]) -> Result<Vec<f32>>;
    fn size_in_bytes(&self) -> usize;
    fn point_store_size_in_bytes(&self) -> usize;
}

/// The concrete forest, generic over index widths: `C` cut dimensions,
/// `L` point-store locations, `P` node pointers and point references,
/// `N` masses. Narrow widths keep long-running deployments compact.
pub struct CoreForest<C, L, P, N>
where
    C: Location,
    usize: From<C>,
    L: Location,
    usize: From<L>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
{
    dimensions: usize,
    sample_size: usize,
    number_of_trees: usize,
    shingle_size: usize,
    components: Vec<SampledTree<C, P, N>>,
    coordinator: UpdateCoordinator<L>,
    executor: TraversalExecutor,
    time_decay: f64,
    bounding_box_cache_fraction: f64,
    internal_shingling: bool,
    internal_rotation: bool,
    store_sequence_indexes: bool,
    output_after: u64,
}

/// sample size and `shingle * sample * (trees + 1)` fit in 16 bits
pub type ForestTiny = CoreForest<u8, u16, u16, u8>;
/// sample size fits in 8 bits, point references need wider indices
pub type ForestSmall = CoreForest<u8, usize, u32, u8>;
/// sample size and dimensions fit in 16 bits
pub type ForestMedium = CoreForest<u16, usize, usize, u16>;
/// whatever the machine allows
pub type ForestLarge = CoreForest<usize, usize, usize, usize>;

fn collect_neighbor(a: &Option<(usize, f64)>, b: &mut Vec<(usize, f64)>) {
    if let Some(hit) = a {
        b.push(*hit);
    }
}

fn neighbor_finish(_a: &mut Vec<(usize, f64)>, _b: usize) {}

impl<C, L, P, N> CoreForest<C, L, P, N>
where
    C: Location,
    usize: From<C>,
    L: Location,
    usize: From<L>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
    <C as TryFrom<usize>>::Error: Debug,
    <L as TryFrom<usize>>::Error: Debug,
    <P as TryFrom<usize>>::Error: Debug,
    <N as TryFrom<usize>>::Error: Debug,
{
    pub fn from_options(options: &ForestOptions) -> Result<Self> {
        options.validate()?;
        let sample_size = options.sample_size;
        let number_of_trees = options.number_of_trees;
        let point_store_capacity =
            usize::max(sample_size * number_of_trees + 1, 2 * sample_size);
        let initial_capacity = 2 * sample_size;
        let time_decay = options.effective_time_decay();

        let mut rng = ChaCha20Rng::seed_from_u64(options.random_seed);
        // reserve the first draw; component seeds start at the second
        let _ = rng.next_u64();
        let mut components = Vec::with_capacity(number_of_trees);
        for _ in 0..number_of_trees {
            components.push(SampledTree::<C, P, N>::new(
                options.dimensions,
                sample_size,
                options.internal_rotation,
                rng.next_u64(),
                options.store_sequence_indexes,
                options.center_of_mass,
                time_decay,
                options.initial_accept_fraction,
                options.bounding_box_cache_fraction,
            )?);
        }
        let point_store = CompactPointStore::<L>::new(
            options.dimensions,
            options.shingle_size,
            point_store_capacity,
            initial_capacity,
            options.internal_shingling,
            options.internal_rotation,
        )?;
        debug!(
            "forest created: {} trees, sample size {}, {} dimensions",
            number_of_trees, sample_size, options.dimensions
        );
        Ok(CoreForest {
            dimensions: options.dimensions,
            sample_size,
            number_of_trees,
            shingle_size: options.shingle_size,
            components,
            coordinator: UpdateCoordinator::new(point_store, number_of_trees),
            executor: TraversalExecutor::new(options.parallel_enabled, options.thread_pool_size)?,
            time_decay,
            bounding_box_cache_fraction: options.bounding_box_cache_fraction,
            internal_shingling: options.internal_shingling,
            internal_rotation: options.internal_rotation,
            store_sequence_indexes: options.store_sequence_indexes,
            output_after: options.effective_output_after() as u64,
        })
    }

    fn raw_conditional_field(
        &self,
        mapped_positions: &[usize],
        query: &[f32],
        centrality: f64,
        project: bool,
    ) -> Result<SampleSummary> {
        let point_store = self.coordinator.point_store();
        let visitor_info = VisitorInfo::default();
        let collected: Vec<(f64, usize, f64)> = self.executor.execute_query(
            &self.components,
            |component| {
                component.conditional_field(
                    mapped_positions,
                    centrality,
                    query,
                    point_store,
                    &visitor_info,
                )
            },
            &Vec::new(),
            add_nbr,
            nbr_finish,
        )?;
        let mut list: Vec<(f64, usize, f64)> = collected
            .into_iter()
            .filter(|entry| entry.1 != usize::MAX)
            .collect();
        check_argument(!list.is_empty(), "no conditional samples available")?;
        list.sort_by(|a, b| a.2.partial_cmp(&b.2).expect("distances are finite"));
        FieldSummarizer::new(centrality, project).summarize_list(
            point_store,
            &list,
            mapped_positions,
        )
    }
}

impl<C, L, P, N> Forest for CoreForest<C, L, P, N>
where
    C: Location,
    usize: From<C>,
    L: Location,
    usize: From<L>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
    <C as TryFrom<usize>>::Error: Debug,
    <L as TryFrom<usize>>::Error: Debug,
    <P as TryFrom<usize>>::Error: Debug,
    <N as TryFrom<usize>>::Error: Debug,
{
    fn update(&mut self, point: &[f32]) -> Result<()> {
        match self.coordinator.init_update(point)? {
            None => {
                self.coordinator.complete_warmup_update();
                Ok(())
            }
            Some((reference, sequence_index)) => {
                let results = {
                    let point_store = self.coordinator.point_store();
                    self.executor.execute_update(&mut self.components, |component| {
                        component.update(reference, sequence_index, point_store)
                    })
                };
                self.coordinator.complete_update(&results, reference)
            }
        }
    }

    fn score_traversal(&self, point: &[f32], visitor_info: &VisitorInfo) -> Result<f64> {
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        let point_store = self.coordinator.point_store();
        let query = point_store.shingled_point(point)?;
        self.executor.execute_query(
            &self.components,
            |component| {
                component.traverse::<f64, _, ScoreNodeView, ScoreVisitor>(
                    &query,
                    &[],
                    ScoreVisitor::create_visitor,
                    visitor_info,
                    point_store,
                    &0.0,
                )
            },
            &0.0,
            add_to,
            divide,
        )
    }

    fn approximate_score(&self, point: &[f32]) -> Result<f64> {
        if !self.is_output_ready() {
            return Ok(0.0);
        }
        let point_store = self.coordinator.point_store();
        let query = point_store.shingled_point(point)?;
        let visitor_info = VisitorInfo::default();
        let min_values = usize::max(5, self.number_of_trees / 3);
        let mut accumulator = OneSidedAccumulator::new(0.1, min_values);
        self.executor.execute_accumulating(
            &self.components,
            |component| {
                component.traverse::<f64, _, ScoreNodeView, ScoreVisitor>(
                    &query,
                    &[],
                    ScoreVisitor::create_visitor,
                    &visitor_info,
                    point_store,
                    &0.0,
                )
            },
            &mut accumulator,
        )?;
        if accumulator.values_accepted() == 0 {
            return Ok(0.0);
        }
        Ok(accumulator.accumulated_value() / accumulator.values_accepted() as f64)
    }

    fn attribution_traversal(
        &self,
        point: &[f32],
        visitor_info: &VisitorInfo,
    ) -> Result<DiVector> {
        if !self.is_output_ready() {
            return Ok(DiVector::empty(self.dimensions));
        }
        let point_store = self.coordinator.point_store();
        let query = point_store.shingled_point(point)?;
        let parameters = vec![self.dimensions];
        self.executor.execute_query(
            &self.components,
            |component| {
                component.traverse::<DiVector, _, BoxNodeView, AttributionVisitor>(
                    &query,
                    &parameters,
                    AttributionVisitor::create_visitor,
                    visitor_info,
                    point_store,
                    &DiVector::empty(self.dimensions),
                )
            },
            &DiVector::empty(self.dimensions),
            DiVector::add_to,
            DiVector::divide,
        )
    }

    fn simple_density(&self, point: &[f32]) -> Result<DirectionalDensity> {
        if !self.is_output_ready() {
            return Ok(DirectionalDensity::empty(self.dimensions, 0.0));
        }
        let point_store = self.coordinator.point_store();
        let query = point_store.shingled_point(point)?;
        let visitor_info = VisitorInfo::density();
        let parameters = vec![self.dimensions];
        self.executor.execute_query(
            &self.components,
            |component| {
                component.traverse::<DirectionalDensity, _, BoxNodeView, DensityVisitor>(
                    &query,
                    &parameters,
                    DensityVisitor::create_visitor,
                    &visitor_info,
                    point_store,
                    &DirectionalDensity::empty(self.dimensions, 0.0),
                )
            },
            &DirectionalDensity::empty(self.dimensions, 0.0),
            DirectionalDensity::add_to,
            DirectionalDensity::divide,
        )
    }

    fn impute_missing(&self, point: &[f32], positions: &[usize]) -> Result<Vec<f32>> {
        check_argument(!positions.is_empty(), "nothing to impute")?;
        for &position in positions {
            check_argument(position < point.len(), "position out of range")?;
        }
        if !self.is_output_ready() {
            return Ok(Vec::from(point));
        }
        let summary = self.conditional_field(positions, point, 1.0, true)?;
        let mut completed = Vec::from(point);
        for (j, &position) in positions.iter().enumerate() {
            completed[position] = summary.median[j];
        }
        Ok(completed)
    }

    fn conditional_field(
        &self,
        positions: &[usize],
        point: &[f32],
        centrality: f64,
        project: bool,
    ) -> Result<SampleSummary> {
        check_argument(
            (0.0..=1.0).contains(&centrality),
            "centrality must lie in [0,1]",
        )?;
        check_argument(
            point.len() == self.dimensions
                || point.len() * self.shingle_size == self.dimensions,
            "mismatched input length",
        )?;
        if !self.is_output_ready() {
            let width = if project && !positions.is_empty() {
                positions.len()
            } else {
                self.dimensions
            };
            return Ok(SampleSummary::empty(width));
        }
        let point_store = self.coordinator.point_store();
        let mapped = if point.len() == self.dimensions {
            Vec::from(positions)
        } else {
            point_store.missing_indices(0, positions)?
        };
        let query = point_store.shingled_point(point)?;
        self.raw_conditional_field(&mapped, &query, centrality, project)
    }

    fn extrapolate(&self, horizon: usize) -> Result<RangeVector> {
        check_argument(horizon > 0, "horizon must be positive")?;
        check_argument(
            self.internal_shingling,
            "extrapolation requires internal shingling",
        )?;
        check_argument(
            self.shingle_size > 1,
            "extrapolation requires a shingle size above one",
        )?;
        let base = self.dimensions / self.shingle_size;
        if !self.is_output_ready() {
            return Ok(RangeVector::new(horizon * base));
        }
        let point_store = self.coordinator.point_store();
        let mut fictitious = point_store.shingled_point(&vec![0.0f32; base])?;
        let mut values = Vec::with_capacity(horizon * base);
        let mut upper = Vec::with_capacity(horizon * base);
        let mut lower = Vec::with_capacity(horizon * base);
        for step in 0..horizon {
            let missing = point_store.next_indices(if self.internal_rotation {
                step
            } else {
                0
            })?;
            check_argument(missing.len() == base, "unexpected imputation width")?;
            let summary = self.raw_conditional_field(&missing, &fictitious, 1.0, true)?;
            for j in 0..base {
                values.push(summary.median[j]);
                upper.push(summary.upper[j]);
                lower.push(summary.lower[j]);
            }
            if self.internal_rotation {
                for j in 0..base {
                    fictitious[missing[j]] = summary.median[j];
                }
            } else {
                fictitious.copy_within(base.., 0);
                for j in 0..base {
                    fictitious[self.dimensions - base + j] = summary.median[j];
                }
            }
        }
        Ok(RangeVector::create(&values, &upper, &lower))
    }

    fn near_neighbors(&self, point: &[f32], distance: f64) -> Result<Vec<Neighbor>> {
        check_argument(distance > 0.0, "distance must be positive")?;
        check_argument(
            self.store_sequence_indexes,
            "near neighbors require stored sequence indexes",
        )?;
        if !self.is_output_ready() {
            return Ok(Vec::new());
        }
        let point_store = self.coordinator.point_store();
        let query = point_store.shingled_point(point)?;
        let visitor_info = VisitorInfo::default();
        let hits: Vec<(usize, f64)> = self.executor.execute_query(
            &self.components,
            |component| {
                component.traverse::<Option<(usize, f64)>, _, BoxNodeView, NearNeighborVisitor>(
                    &query,
                    &[],
                    NearNeighborVisitor::create_visitor,
                    &visitor_info,
                    point_store,
                    &None,
                )
            },
            &Vec::new(),
            collect_neighbor,
            neighbor_finish,
        )?;

        let mut by_reference: BTreeMap<usize, f64> = BTreeMap::new();
        for (reference, d) in hits {
            if d <= distance {
                by_reference.entry(reference).or_insert(d);
            }
        }

        // trees dedup equal coordinates independently, so the same point
        // may surface under several references; merge by value
        let mut merged: Vec<(Vec<f32>, f64, BTreeSet<u64>)> = Vec::new();
        for (reference, d) in by_reference {
            let value = point_store.copy(reference)?;
            let mut sequences: BTreeSet<u64> = BTreeSet::new();
            for component in &self.components {
                if let Some(list) = component.tree().sequence_indexes_of(reference) {
                    sequences.extend(list.iter().copied());
                }
            }
            match merged.iter().position(|entry| entry.0 == value) {
                Some(i) => {
                    if d < merged[i].1 {
                        merged[i].1 = d;
                    }
                    merged[i].2.extend(sequences);
                }
                None => merged.push((value, d, sequences)),
            }
        }

        let mut answer: Vec<Neighbor> = merged
            .into_iter()
            .map(|(value, d, sequences)| Neighbor {
                point: value,
                distance: d,
                sequence_indexes: sequences.into_iter().collect(),
            })
            .collect();
        answer.sort_by(|a, b| a.distance.partial_cmp(&b.distance).expect("finite distances"));
        Ok(answer)
    }

    fn config_get(&self, key: &str) -> Result<f64> {
        match key {
            CONFIG_TIME_DECAY => Ok(self.time_decay),
            CONFIG_BOUNDING_BOX_CACHE_FRACTION => Ok(self.bounding_box_cache_fraction),
            _ => Err(ForestError::InvalidConfig {
                msg: "unknown configuration key",
            }),
        }
    }

    fn config_set(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            CONFIG_TIME_DECAY => {
                check_argument(value >= 0.0, "time decay cannot be negative")?;
                let sequence_index = self.coordinator.total_updates();
                for component in self.components.iter_mut() {
                    component.set_time_decay(value, sequence_index);
                }
                self.time_decay = value;
                debug!("time decay set to {}", value);
                Ok(())
            }
            CONFIG_BOUNDING_BOX_CACHE_FRACTION => {
                for component in self.components.iter_mut() {
                    component.set_bounding_box_cache_fraction(value)?;
                }
                self.bounding_box_cache_fraction = value;
                debug!("bounding box cache fraction set to {}", value);
                Ok(())
            }
            _ => Err(ForestError::InvalidConfig {
                msg: "unknown configuration key",
            }),
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn number_of_trees(&self) -> usize {
        self.number_of_trees
    }

    fn total_updates(&self) -> u64 {
        self.coordinator.total_updates()
    }

    fn is_output_ready(&self) -> bool {
        self.coordinator.total_updates() >= self.output_after
    }

    fn samplers_full(&self) -> bool {
        self.components.iter().all(|c| c.is_output_ready())
    }

    fn is_internal_shingling_enabled(&self) -> bool {
        self.internal_shingling
    }

    fn shingled_point(&self, point: &[f32]) -> Result<Vec<f32>> {
        check_argument(
            self.internal_shingling,
            "shingled points require internal shingling",
        )?;
        self.coordinator.point_store().shingled_point(point)
    }

    fn size_in_bytes(&self) -> usize {
        let mut total: usize = std::mem::size_of::<CoreForest<C, L, P, N>>();
        for component in &self.components {
            total += component.size_in_bytes();
        }
        total + self.coordinator.point_store().size_in_bytes()
    }

    fn point_store_size_in_bytes(&self) -> usize {
        self.coordinator.point_store().size_in_bytes()
    }
}
