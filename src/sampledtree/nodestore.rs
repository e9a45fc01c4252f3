use std::collections::HashMap;
use std::fmt::Debug;
use std::mem;

use crate::common::divector::DiVector;
use crate::common::intervals::IntervalManager;
use crate::errors::{ForestError, Result};
use crate::pointstore::PointStore;
use crate::sampledtree::boundingbox::BoundingBox;
use crate::sampledtree::cut::Cut;
use crate::types::Location;
use crate::util::check_argument;

/// Below this cache fraction, traversals grow bounding boxes along the
/// path bottom-up instead of consulting the (mostly empty) cache.
const SWITCH_THRESHOLD: f64 = 0.5;

/// Columnar arena of tree nodes.
///
/// `capacity` is the number of leaves (the per-tree sample size). Indices
/// `0..capacity-2` address internal-node columns, `capacity - 1` stands for
/// null, and a leaf holding point `p` is encoded as `capacity + p`; a
/// proper binary tree over `capacity` leaves never needs more than
/// `capacity - 1` internal nodes. Node mass is stored minus one so the full
/// value range of the narrow index type `N` is usable.
///
/// Bounding boxes are materialized only for internal indices below
/// `cache_fraction * capacity`. The interval manager vends low indices
/// first, so the cached share tracks the configured fraction; when the
/// fraction is raised at runtime the fresh slots start out stale and are
/// rebuilt the first time an update walks through them.
pub struct CompactNodeStore<C, P, N>
where
    C: Location,
    usize: From<C>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
{
    capacity: usize,
    dimensions: usize,
    using_transforms: bool,
    cache_fraction: f64,
    mass: Vec<N>,
    left_index: Vec<P>,
    right_index: Vec<P>,
    cut_dimension: Vec<C>,
    cut_value: Vec<f32>,
    bounding_box_data: Vec<f32>,
    range_sum_data: Vec<f64>,
    box_valid: Vec<bool>,
    leaf_mass: HashMap<usize, usize>,
    leaf_sequences: Option<HashMap<usize, Vec<u64>>>,
    point_sum_data: Option<Vec<f32>>,
    node_manager: IntervalManager<usize>,
}

enum CacheSlot {
    Cached(usize),
    Stale(usize),
    Uncached,
}

/// The read surface node views use during traversals.
pub trait NodeStore {
    fn mass_of(&self, index: usize) -> usize;
    fn bounding_box(&self, index: usize, point_store: &dyn PointStore) -> Result<BoundingBox>;
    fn probability_of_cut(
        &self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
    ) -> Result<f64>;
    fn probability_of_cut_with_missing(
        &self,
        index: usize,
        point: &[f32],
        missing: &[bool],
        point_store: &dyn PointStore,
    ) -> Result<f64>;
    fn assign_probability_of_cut(
        &self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
        di_vector: &mut DiVector,
    ) -> Result<()>;
    fn grow_node_box(
        &self,
        bounding_box: &mut BoundingBox,
        point_store: &dyn PointStore,
        node: usize,
        sibling: usize,
    ) -> Result<()>;
    fn sibling_of(&self, node: usize, parent: usize) -> usize;
    fn leaf_point_index(&self, index: usize) -> Result<usize>;
    fn cut_dimension_of(&self, index: usize) -> usize;
    fn left_of(&self, index: usize) -> usize;
    fn right_of(&self, index: usize) -> usize;
    fn cut_value_of(&self, index: usize) -> f32;
    fn is_leaf(&self, index: usize) -> bool;
    fn is_left_of(&self, index: usize, point: &[f32]) -> bool;
    fn use_path_for_box(&self) -> bool;
    fn cut_and_children(&self, index: usize) -> (usize, f32, usize, usize);
    fn set_path(&self, answer: &mut Vec<(usize, usize)>, root: usize, point: &[f32]);
    fn null_node(&self) -> usize;
}

impl<C, P, N> CompactNodeStore<C, P, N>
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
    pub fn new(
        capacity: usize,
        dimensions: usize,
        using_transforms: bool,
        store_sequence_indexes: bool,
        center_of_mass: bool,
        cache_fraction: f64,
    ) -> Result<Self> {
        check_argument(capacity >= 2, "capacity must be at least two")?;
        check_argument(
            capacity - 1 <= N::MAX.into(),
            "index type too narrow for this capacity",
        )?;
        check_argument(
            (0.0..=1.0).contains(&cache_fraction),
            "cache fraction must lie in [0,1]",
        )?;
        let cache_limit: usize = (cache_fraction * capacity as f64) as usize;
        let null_node = Self::null_value(capacity);
        Ok(CompactNodeStore {
            capacity,
            dimensions,
            using_transforms,
            cache_fraction,
            left_index: vec![null_node.try_into().expect("capacity out of range"); capacity - 1],
            right_index: vec![null_node.try_into().expect("capacity out of range"); capacity - 1],
            mass: vec![0.try_into().expect("unreachable"); capacity - 1],
            cut_value: vec![0.0; capacity - 1],
            cut_dimension: vec![C::MAX; capacity - 1],
            bounding_box_data: vec![0.0; dimensions * 2 * cache_limit],
            range_sum_data: vec![0.0; cache_limit],
            box_valid: vec![false; cache_limit],
            leaf_mass: HashMap::new(),
            leaf_sequences: if store_sequence_indexes {
                Some(HashMap::new())
            } else {
                None
            },
            point_sum_data: if center_of_mass {
                Some(vec![0.0; dimensions * (capacity - 1)])
            } else {
                None
            },
            node_manager: IntervalManager::new(capacity - 1),
        })
    }

    fn null_value(capacity: usize) -> usize {
        capacity - 1
    }

    fn slot(&self, index: usize) -> CacheSlot {
        if index != self.null_node() && index < self.range_sum_data.len() {
            if self.box_valid[index] {
                CacheSlot::Cached(index)
            } else {
                CacheSlot::Stale(index)
            }
        } else {
            CacheSlot::Uncached
        }
    }

    fn box_from_data(&self, idx: usize) -> BoundingBox {
        let base = 2 * idx * self.dimensions;
        BoundingBox::new(
            &self.bounding_box_data[base..base + self.dimensions],
            &self.bounding_box_data[base + self.dimensions..base + 2 * self.dimensions],
        )
        .expect("cached corners have equal lengths")
    }

    fn copy_box_to_data(&mut self, index: usize, bounding_box: &BoundingBox) {
        if index != self.null_node() && index < self.range_sum_data.len() {
            let base = 2 * index * self.dimensions;
            let mid = base + self.dimensions;
            self.bounding_box_data[base..mid].copy_from_slice(bounding_box.min_values());
            self.bounding_box_data[mid..mid + self.dimensions]
                .copy_from_slice(bounding_box.max_values());
            self.range_sum_data[index] = bounding_box.range_sum();
            self.box_valid[index] = true;
        }
    }

    fn rebuild_cached_box(
        &mut self,
        index: usize,
        point_store: &dyn PointStore,
    ) -> Result<()> {
        let rebuilt = self.reconstruct_box(index, point_store)?;
        self.copy_box_to_data(index, &rebuilt);
        Ok(())
    }

    /// Tight box of the subtree, computed from the children (using their
    /// cached boxes where valid).
    pub fn reconstruct_box(
        &self,
        index: usize,
        point_store: &dyn PointStore,
    ) -> Result<BoundingBox> {
        let mut bounding_box =
            self.bounding_box(self.left_index[index].try_into().expect("node index exceeds usize width"), point_store)?;
        self.grow_node_box(
            &mut bounding_box,
            point_store,
            index,
            self.right_index[index].try_into().expect("node index exceeds usize width"),
        )?;
        Ok(bounding_box)
    }

    /// Extends the cached box (if any) by `point`; returns true when the
    /// box demonstrably already contained the point, meaning no ancestor
    /// box can change either.
    fn check_contains_and_add_point(
        &mut self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
    ) -> Result<bool> {
        match self.slot(index) {
            CacheSlot::Cached(idx) => {
                let base = 2 * idx * self.dimensions;
                let mid = base + self.dimensions;
                let min_array = &mut self.bounding_box_data[base..mid];
                for (x, y) in min_array.iter_mut().zip(point) {
                    *x = if *x > *y { *y } else { *x };
                }
                let max_array = &mut self.bounding_box_data[mid..mid + self.dimensions];
                for (x, y) in max_array.iter_mut().zip(point) {
                    *x = if *x < *y { *y } else { *x };
                }
                let new_min = &self.bounding_box_data[base..mid];
                let new_max = &self.bounding_box_data[mid..mid + self.dimensions];
                let new_sum: f64 = new_min
                    .iter()
                    .zip(new_max)
                    .map(|(x, y)| (y - x) as f64)
                    .sum();
                let unchanged = self.range_sum_data[idx] == new_sum;
                self.range_sum_data[idx] = new_sum;
                Ok(unchanged)
            }
            CacheSlot::Stale(_) => {
                // the subtree below was already updated, so a rebuild
                // re-materializes the slot with the point included
                self.rebuild_cached_box(index, point_store)?;
                Ok(false)
            }
            CacheSlot::Uncached => Ok(false),
        }
    }

    fn check_strictly_contains(&self, index: usize, point: &[f32]) -> bool {
        if let CacheSlot::Cached(idx) = self.slot(index) {
            let base = 2 * idx * self.dimensions;
            let mid = base + self.dimensions;
            let min_array = &self.bounding_box_data[base..mid];
            let max_array = &self.bounding_box_data[mid..mid + self.dimensions];
            let not_inside = min_array
                .iter()
                .zip(point)
                .zip(max_array)
                .any(|((x, y), z)| x >= y || y >= z);
            !not_inside
        } else {
            false
        }
    }

    /// Shrinks the cached box after a deletion when needed; returns true
    /// when the deleted point was strictly inside, meaning no ancestor box
    /// can change either.
    fn check_contains_and_rebuild_box(
        &mut self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
    ) -> Result<bool> {
        match self.slot(index) {
            CacheSlot::Cached(_) => {
                if !self.check_strictly_contains(index, point) {
                    self.rebuild_cached_box(index, point_store)?;
                    return Ok(false);
                }
                Ok(true)
            }
            CacheSlot::Stale(_) => {
                self.rebuild_cached_box(index, point_store)?;
                Ok(false)
            }
            CacheSlot::Uncached => Ok(false),
        }
    }

    /// Creates an internal node above `child` with `point` as the new
    /// sibling leaf, wiring it into `parent` (when present).
    pub fn add_node(
        &mut self,
        parent_index: usize,
        point: &[f32],
        child: usize,
        point_index: usize,
        cut: Cut,
        saved_box: &BoundingBox,
        point_store: &dyn PointStore,
    ) -> Result<usize> {
        let index: usize = self.node_manager.get().map_err(|_| ForestError::IllegalState {
            msg: "internal node arena exhausted",
        })?;
        self.cut_value[index] = cut.value;
        self.cut_dimension[index] = cut.dimension.try_into().expect("dimension out of range");
        if point[cut.dimension] <= cut.value {
            self.left_index[index] = self
                .leaf_index(point_index)
                .try_into()
                .expect("leaf index out of range");
            self.right_index[index] = child.try_into().expect("node index out of range");
        } else {
            self.left_index[index] = child.try_into().expect("node index out of range");
            self.right_index[index] = self
                .leaf_index(point_index)
                .try_into()
                .expect("leaf index out of range");
        }

        // stored mass is one less than actual: the child subtree plus the
        // fresh leaf is exactly `mass_of(child) + 1`
        self.mass[index] = self
            .mass_of(child)
            .try_into()
            .expect("mass out of range");

        let mut saved = saved_box.clone();
        saved.check_contains_and_add_point(point);
        self.copy_box_to_data(index, &saved);

        if self.point_sum_data.is_some() {
            self.recompute_point_sum(index, point_store)?;
        }

        if parent_index != self.null_node() {
            self.replace_node(parent_index, child, index);
        }
        Ok(index)
    }

    pub fn leaf_index(&self, point_index: usize) -> usize {
        point_index + self.capacity
    }

    pub fn point_index_of(&self, leaf: usize) -> usize {
        leaf - self.capacity
    }

    pub fn increase_leaf_mass(&mut self, leaf: usize) -> Result<()> {
        check_argument(self.is_leaf(leaf), "not a leaf index")?;
        let point_index = self.point_index_of(leaf);
        if let Some(a) = self.leaf_mass.remove(&point_index) {
            self.leaf_mass.insert(point_index, a + 1);
        } else {
            self.leaf_mass.insert(point_index, 1);
        }
        Ok(())
    }

    /// Returns the extra mass recorded before the decrement; zero means the
    /// leaf was at mass one and must be structurally removed.
    pub fn decrease_leaf_mass(&mut self, leaf: usize) -> usize {
        let point_index = self.point_index_of(leaf);
        if let Some(a) = self.leaf_mass.remove(&point_index) {
            if a > 1 {
                self.leaf_mass.insert(point_index, a - 1);
                a
            } else {
                1
            }
        } else {
            0
        }
    }

    pub fn add_sequence_index(&mut self, point_index: usize, sequence_index: u64) {
        if let Some(map) = self.leaf_sequences.as_mut() {
            map.entry(point_index).or_default().push(sequence_index);
        }
    }

    pub fn remove_sequence_index(
        &mut self,
        point_index: usize,
        sequence_index: u64,
    ) -> Result<()> {
        if let Some(map) = self.leaf_sequences.as_mut() {
            let entries = map.get_mut(&point_index).ok_or(ForestError::NotPresent {
                msg: "no sequence indexes recorded for this point",
            })?;
            let position = entries
                .iter()
                .position(|&s| s == sequence_index)
                .ok_or(ForestError::NotPresent {
                    msg: "sequence index not recorded at this leaf",
                })?;
            entries.swap_remove(position);
            if entries.is_empty() {
                map.remove(&point_index);
            }
        }
        Ok(())
    }

    pub fn sequence_indexes_of(&self, point_index: usize) -> Option<&[u64]> {
        self.leaf_sequences
            .as_ref()
            .and_then(|map| map.get(&point_index))
            .map(|v| v.as_slice())
    }

    pub fn stores_sequence_indexes(&self) -> bool {
        self.leaf_sequences.is_some()
    }

    fn subtree_sum_into(
        &self,
        node: usize,
        point_store: &dyn PointStore,
        sum: &mut [f32],
    ) -> Result<()> {
        if self.is_leaf(node) {
            let point_index = self.point_index_of(node);
            let point = point_store.copy(point_index)?;
            let mass = self.mass_of(node) as f32;
            for (x, y) in sum.iter_mut().zip(&point) {
                *x += mass * *y;
            }
        } else {
            let data = self
                .point_sum_data
                .as_ref()
                .expect("point sums not enabled");
            let base = node * self.dimensions;
            let slice = &data[base..base + self.dimensions];
            for (x, y) in sum.iter_mut().zip(slice) {
                *x += *y;
            }
        }
        Ok(())
    }

    pub fn recompute_point_sum(
        &mut self,
        index: usize,
        point_store: &dyn PointStore,
    ) -> Result<()> {
        let mut sum = vec![0.0f32; self.dimensions];
        self.subtree_sum_into(self.left_index[index].try_into().expect("node index exceeds usize width"), point_store, &mut sum)?;
        self.subtree_sum_into(self.right_index[index].try_into().expect("node index exceeds usize width"), point_store, &mut sum)?;
        let data = self
            .point_sum_data
            .as_mut()
            .expect("point sums not enabled");
        let base = index * self.dimensions;
        data[base..base + self.dimensions].copy_from_slice(&sum);
        Ok(())
    }

    fn adjust_point_sum(&mut self, index: usize, point: &[f32], add: bool) {
        if let Some(data) = self.point_sum_data.as_mut() {
            let base = index * self.dimensions;
            let slice = &mut data[base..base + self.dimensions];
            if add {
                for (x, y) in slice.iter_mut().zip(point) {
                    *x += *y;
                }
            } else {
                for (x, y) in slice.iter_mut().zip(point) {
                    *x -= *y;
                }
            }
        }
    }

    pub fn point_sum_of(&self, index: usize) -> Option<&[f32]> {
        self.point_sum_data.as_ref().map(|data| {
            let base = index * self.dimensions;
            &data[base..base + self.dimensions]
        })
    }

    /// Walks the remaining path to the root, bumping masses, folding the
    /// new point into cached boxes and center-of-mass sums.
    pub fn manage_ancestors_add(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[f32],
        point_store: &dyn PointStore,
        box_resolved: bool,
    ) -> Result<()> {
        let mut resolved = box_resolved;
        while let Some((index, _)) = path.pop() {
            let value: usize = self.mass[index].into();
            self.mass[index] = (value + 1).try_into().expect("mass out of range");
            self.adjust_point_sum(index, point, true);
            if !resolved {
                resolved = self.check_contains_and_add_point(index, point, point_store)?;
            }
        }
        Ok(())
    }

    pub fn manage_ancestors_delete(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[f32],
        point_store: &dyn PointStore,
        box_resolved: bool,
    ) -> Result<()> {
        let mut resolved = box_resolved;
        while let Some((index, _)) = path.pop() {
            let value: usize = self.mass[index].into();
            self.mass[index] = (value - 1).try_into().expect("mass out of range");
            self.adjust_point_sum(index, point, false);
            if !resolved {
                resolved = self.check_contains_and_rebuild_box(index, point, point_store)?;
            }
        }
        Ok(())
    }

    pub fn delete_internal_node(&mut self, index: usize) {
        let null_node = self.null_node();
        self.left_index[index] = null_node.try_into().expect("capacity out of range");
        self.right_index[index] = null_node.try_into().expect("capacity out of range");
        self.mass[index] = 0.try_into().expect("unreachable");
        self.cut_dimension[index] = C::MAX;
        self.cut_value[index] = 0.0;
        if index < self.box_valid.len() {
            self.box_valid[index] = false;
        }
        if let Some(data) = self.point_sum_data.as_mut() {
            let base = index * self.dimensions;
            data[base..base + self.dimensions].fill(0.0);
        }
        self.node_manager.release(index);
    }

    pub fn replace_node(&mut self, grand_parent: usize, parent: usize, node: usize) {
        if parent == self.left_index[grand_parent].try_into().expect("node index exceeds usize width") {
            self.left_index[grand_parent] = node.try_into().expect("node index out of range");
        } else {
            self.right_index[grand_parent] = node.try_into().expect("node index out of range");
        }
    }

    /// Retargets the bounding-box cache to a new fraction. Slots that fall
    /// out of coverage are dropped; slots that come into coverage start
    /// stale and are rebuilt lazily by the next update that touches them.
    pub fn set_cache_fraction(&mut self, cache_fraction: f64) -> Result<()> {
        check_argument(
            (0.0..=1.0).contains(&cache_fraction),
            "cache fraction must lie in [0,1]",
        )?;
        let cache_limit: usize = (cache_fraction * self.capacity as f64) as usize;
        self.cache_fraction = cache_fraction;
        self.bounding_box_data
            .resize(2 * self.dimensions * cache_limit, 0.0);
        self.range_sum_data.resize(cache_limit, 0.0);
        self.box_valid.resize(cache_limit, false);
        Ok(())
    }

    pub fn cache_fraction(&self) -> f64 {
        self.cache_fraction
    }

    /// The materialized box of an internal node, when present and valid.
    pub fn cached_box(&self, index: usize) -> Option<BoundingBox> {
        match self.slot(index) {
            CacheSlot::Cached(idx) => Some(self.box_from_data(idx)),
            _ => None,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        (self.left_index.len() + self.right_index.len()) * mem::size_of::<P>()
            + self.mass.len() * mem::size_of::<N>()
            + self.cut_dimension.len() * mem::size_of::<C>()
            + self.cut_value.len() * mem::size_of::<f32>()
            + self.bounding_box_data.len() * mem::size_of::<f32>()
            + self.range_sum_data.len() * mem::size_of::<f64>()
            + self.box_valid.len()
            + self.node_manager.size_in_bytes()
            + mem::size_of::<CompactNodeStore<C, P, N>>()
    }

    fn is_internal(&self, index: usize) -> bool {
        index != self.null_node() && index < self.capacity
    }

    fn leaf_box(&self, index: usize, point_store: &dyn PointStore) -> Result<BoundingBox> {
        if self.using_transforms {
            let point = point_store.copy(self.point_index_of(index))?;
            BoundingBox::new(&point, &point)
        } else {
            let point = point_store
                .reference_and_offset(self.point_index_of(index))?
                .0;
            BoundingBox::new(point, point)
        }
    }

    fn grow_by_leaf(
        &self,
        bounding_box: &mut BoundingBox,
        point_store: &dyn PointStore,
        leaf: usize,
    ) -> Result<()> {
        if self.using_transforms {
            let point = point_store.copy(self.point_index_of(leaf))?;
            bounding_box.check_contains_and_add_point(&point);
        } else {
            let point = point_store
                .reference_and_offset(self.point_index_of(leaf))?
                .0;
            bounding_box.check_contains_and_add_point(point);
        }
        Ok(())
    }
}

impl<C, P, N> NodeStore for CompactNodeStore<C, P, N>
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
    fn mass_of(&self, index: usize) -> usize {
        if self.is_leaf(index) {
            let point_index = self.point_index_of(index);
            return if let Some(a) = self.leaf_mass.get(&point_index) {
                *a + 1
            } else {
                1
            };
        }
        let base: usize = self.mass[index].into();
        base + 1
    }

    fn bounding_box(&self, index: usize, point_store: &dyn PointStore) -> Result<BoundingBox> {
        if self.is_leaf(index) {
            return self.leaf_box(index, point_store);
        }
        if let CacheSlot::Cached(idx) = self.slot(index) {
            return Ok(self.box_from_data(idx));
        }
        self.reconstruct_box(index, point_store)
    }

    fn probability_of_cut(
        &self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
    ) -> Result<f64> {
        if let CacheSlot::Cached(idx) = self.slot(index) {
            let base = 2 * idx * self.dimensions;
            let mid = base + self.dimensions;
            let min_array = &self.bounding_box_data[base..mid];
            let max_array = &self.bounding_box_data[mid..mid + self.dimensions];
            let min_sum: f32 = min_array
                .iter()
                .zip(point)
                .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
                .sum();
            let max_sum: f32 = point
                .iter()
                .zip(max_array)
                .map(|(&x, &y)| if x - y > 0.0 { x - y } else { 0.0 })
                .sum();
            let sum = max_sum + min_sum;
            if sum == 0.0 {
                return Ok(0.0);
            }
            Ok(sum as f64 / (self.range_sum_data[idx] + sum as f64))
        } else {
            let bounding_box = self.bounding_box(index, point_store)?;
            Ok(bounding_box.probability_of_cut(point))
        }
    }

    fn probability_of_cut_with_missing(
        &self,
        index: usize,
        point: &[f32],
        missing: &[bool],
        point_store: &dyn PointStore,
    ) -> Result<f64> {
        let bounding_box = self.bounding_box(index, point_store)?;
        Ok(bounding_box.probability_of_cut_with_missing(point, missing))
    }

    fn assign_probability_of_cut(
        &self,
        index: usize,
        point: &[f32],
        point_store: &dyn PointStore,
        di_vector: &mut DiVector,
    ) -> Result<()> {
        let bounding_box = self.bounding_box(index, point_store)?;
        di_vector.assign_as_probability_of_cut(&bounding_box, point);
        Ok(())
    }

    fn grow_node_box(
        &self,
        bounding_box: &mut BoundingBox,
        point_store: &dyn PointStore,
        _node: usize,
        sibling: usize,
    ) -> Result<()> {
        if self.is_leaf(sibling) {
            return self.grow_by_leaf(bounding_box, point_store, sibling);
        }
        if let CacheSlot::Cached(idx) = self.slot(sibling) {
            let base = 2 * idx * self.dimensions;
            bounding_box
                .check_contains_and_add_point(&self.bounding_box_data[base..base + self.dimensions]);
            bounding_box.check_contains_and_add_point(
                &self.bounding_box_data[base + self.dimensions..base + 2 * self.dimensions],
            );
            return Ok(());
        }
        self.grow_node_box(bounding_box, point_store, sibling, self.left_of(sibling))?;
        self.grow_node_box(bounding_box, point_store, sibling, self.right_of(sibling))
    }

    fn sibling_of(&self, node: usize, parent: usize) -> usize {
        let mut sibling: usize = self.left_index[parent].try_into().expect("node index exceeds usize width");
        if node == sibling {
            sibling = self.right_index[parent].try_into().expect("node index exceeds usize width");
        }
        sibling
    }

    fn leaf_point_index(&self, index: usize) -> Result<usize> {
        check_argument(self.is_leaf(index), "not a leaf index")?;
        Ok(self.point_index_of(index))
    }

    fn cut_dimension_of(&self, index: usize) -> usize {
        self.cut_dimension[index].into()
    }

    fn left_of(&self, index: usize) -> usize {
        self.left_index[index].try_into().expect("node index exceeds usize width")
    }

    fn right_of(&self, index: usize) -> usize {
        self.right_index[index].try_into().expect("node index exceeds usize width")
    }

    fn cut_value_of(&self, index: usize) -> f32 {
        self.cut_value[index]
    }

    fn is_leaf(&self, index: usize) -> bool {
        index != self.null_node() && index >= self.capacity
    }

    fn is_left_of(&self, index: usize, point: &[f32]) -> bool {
        let dimension: usize = self.cut_dimension[index].into();
        point[dimension] <= self.cut_value[index]
    }

    fn use_path_for_box(&self) -> bool {
        self.cache_fraction < SWITCH_THRESHOLD
    }

    fn cut_and_children(&self, index: usize) -> (usize, f32, usize, usize) {
        if self.is_internal(index) {
            (
                self.cut_dimension[index].into(),
                self.cut_value[index],
                self.left_index[index].try_into().expect("node index exceeds usize width"),
                self.right_index[index].try_into().expect("node index exceeds usize width"),
            )
        } else {
            (usize::MAX, f32::MAX, usize::MAX, usize::MAX)
        }
    }

    /// Records the root-to-leaf path of `point` as `(node, sibling)` pairs,
    /// the leaf last. The stored cuts make the descent deterministic.
    fn set_path(&self, answer: &mut Vec<(usize, usize)>, root: usize, point: &[f32]) {
        let mut node = root;
        answer.push((root, self.null_node()));
        while !self.is_leaf(node) {
            if self.is_left_of(node, point) {
                answer.push((self.left_index[node].try_into().expect("node index exceeds usize width"), self.right_index[node].try_into().expect("node index exceeds usize width")));
                node = self.left_index[node].try_into().expect("node index exceeds usize width");
            } else {
                answer.push((self.right_index[node].try_into().expect("node index exceeds usize width"), self.left_index[node].try_into().expect("node index exceeds usize width")));
                node = self.right_index[node].try_into().expect("node index exceeds usize width");
            }
        }
    }

    fn null_node(&self) -> usize {
        Self::null_value(self.capacity)
    }
}
