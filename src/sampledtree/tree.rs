use std::fmt::Debug;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::errors::{ForestError, Result};
use crate::pointstore::PointStore;
use crate::sampledtree::boundingbox::BoundingBox;
use crate::sampledtree::cut::Cut;
use crate::sampledtree::nodestore::{CompactNodeStore, NodeStore};
use crate::sampledtree::nodeview::{UpdatableMultiNodeView, UpdatableNodeView};
use crate::types::Location;
use crate::util::check_argument;
use crate::visitor::impute::ImputeVisitor;
use crate::visitor::visitor::{SimpleMultiVisitor, Visitor, VisitorInfo};

/// A random cut tree over at most `capacity` leaves, addressed through a
/// shared point store. Mutations are a pure function of the stored seed and
/// the sequence of operations, so trees evolve identically no matter how
/// the forest schedules them.
pub struct RandomCutTree<C, P, N>
where
    C: Location,
    usize: From<C>,
    P: Location,
    usize: TryFrom<P>,
    <usize as TryFrom<P>>::Error: Debug,
    N: Location,
    usize: From<N>,
{
    dimensions: usize,
    capacity: usize,
    node_store: CompactNodeStore<C, P, N>,
    random_seed: u64,
    root: usize,
    tree_mass: usize,
}

impl<C, P, N> RandomCutTree<C, P, N>
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
        store_sequence_indexes: bool,
        center_of_mass: bool,
        bounding_box_cache_fraction: f64,
        random_seed: u64,
    ) -> Result<Self> {
        let node_store = CompactNodeStore::<C, P, N>::new(
            capacity,
            dimensions,
            using_transforms,
            store_sequence_indexes,
            center_of_mass,
            bounding_box_cache_fraction,
        )?;
        let root = node_store.null_node();
        Ok(RandomCutTree {
            dimensions,
            capacity,
            node_store,
            random_seed,
            root,
            tree_mass: 0,
        })
    }

    pub fn mass(&self) -> usize {
        self.tree_mass
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.root == self.node_store.null_node()
    }

    pub fn stores_sequence_indexes(&self) -> bool {
        self.node_store.stores_sequence_indexes()
    }

    pub fn sequence_indexes_of(&self, point_index: usize) -> Option<&[u64]> {
        self.node_store.sequence_indexes_of(point_index)
    }

    pub fn set_bounding_box_cache_fraction(&mut self, fraction: f64) -> Result<()> {
        self.node_store.set_cache_fraction(fraction)
    }

    /// Center of mass of the sampled points, when point sums are enabled.
    pub fn center_of_mass(&self) -> Option<Vec<f32>> {
        if self.is_empty() || self.node_store.is_leaf(self.root) {
            return None;
        }
        self.node_store.point_sum_of(self.root).map(|sum| {
            sum.iter()
                .map(|x| x / self.tree_mass as f32)
                .collect()
        })
    }

    /// Inserts one occurrence of the point behind `point_index`. Returns
    /// the reference actually retained, which is an existing reference when
    /// the tree already holds a leaf with identical coordinates.
    pub fn add<PS: PointStore>(
        &mut self,
        point_index: usize,
        sequence_index: u64,
        point_store: &PS,
    ) -> Result<usize> {
        if self.root == self.node_store.null_node() {
            self.root = self.node_store.leaf_index(point_index);
            self.tree_mass = 1;
            self.node_store.add_sequence_index(point_index, sequence_index);
            return Ok(point_index);
        }

        let point = &point_store.copy(point_index)?;
        let mut path_to_root = Vec::new();
        self.node_store.set_path(&mut path_to_root, self.root, point);
        let (mut node, mut sibling) = path_to_root.pop().expect("path contains the leaf");

        let leaf_point_index = self.node_store.leaf_point_index(node)?;
        let old_point = &point_store.copy(leaf_point_index)?;

        self.tree_mass += 1;
        if point.eq(old_point) {
            self.node_store.increase_leaf_mass(node)?;
            self.node_store.add_sequence_index(leaf_point_index, sequence_index);
            self.node_store
                .manage_ancestors_add(&mut path_to_root, point, point_store, true)?;
            return Ok(leaf_point_index);
        }

        let mut saved_parent = if !path_to_root.is_empty() {
            path_to_root.last().expect("non-empty").0
        } else {
            self.node_store.null_node()
        };
        let mut saved_node = node;
        let mut current_box = BoundingBox::new(old_point, old_point)?;
        let mut saved_box = current_box.clone();
        let mut parent_path: Vec<(usize, usize)> = Vec::new();
        let mut rng = ChaCha20Rng::seed_from_u64(self.random_seed);
        self.random_seed = rng.next_u64();

        let mut parent = saved_parent;
        let mut saved_cut = Cut::new(usize::MAX, 0.0);
        // one cut candidate per level, leaf upward; the last separating
        // candidate (closest to the root) wins
        loop {
            let factor: f64 = rng.gen();
            let (new_cut, separation) =
                Cut::random_cut_and_separation(&current_box, factor, point);
            if separation {
                saved_cut = new_cut;
                saved_parent = parent;
                saved_node = node;
                saved_box = current_box.clone();
                parent_path.clear();
            } else {
                parent_path.push((node, sibling));
            }
            check_argument(
                saved_cut.dimension != usize::MAX,
                "unable to separate distinct points",
            )?;

            if parent == self.node_store.null_node() {
                break;
            }
            self.node_store
                .grow_node_box(&mut current_box, point_store, parent, sibling)?;
            let (a, b) = path_to_root.pop().expect("parent still on the path");
            node = a;
            sibling = b;
            parent = if !path_to_root.is_empty() {
                path_to_root.last().expect("non-empty").0
            } else {
                self.node_store.null_node()
            };
        }

        if saved_parent != self.node_store.null_node() {
            while let Some(entry) = parent_path.pop() {
                path_to_root.push(entry);
            }
            check_argument(
                path_to_root.last().expect("non-empty").0 == saved_parent,
                "inconsistent insertion path",
            )?;
        } else {
            check_argument(path_to_root.is_empty(), "inconsistent insertion path")?;
        }

        let merged_node = self.node_store.add_node(
            saved_parent,
            point,
            saved_node,
            point_index,
            saved_cut,
            &saved_box,
            point_store,
        )?;
        self.node_store.add_sequence_index(point_index, sequence_index);

        if saved_parent != self.node_store.null_node() {
            self.node_store
                .manage_ancestors_add(&mut path_to_root, point, point_store, false)?;
        } else {
            self.root = merged_node;
        }
        Ok(point_index)
    }

    /// Removes one occurrence; mirrors a sampler eviction.
    pub fn delete<PS: PointStore>(
        &mut self,
        point_index: usize,
        sequence_index: u64,
        point_store: &PS,
    ) -> Result<usize> {
        if self.root == self.node_store.null_node() {
            return Err(ForestError::IllegalState {
                msg: "deleting from an empty tree",
            });
        }

        let point = &point_store.copy(point_index)?;
        let mut leaf_path = Vec::new();
        self.node_store.set_path(&mut leaf_path, self.root, point);
        let (leaf_node, leaf_saved_sibling) = leaf_path.pop().expect("path contains the leaf");

        let leaf_point_index = self.node_store.leaf_point_index(leaf_node)?;
        if leaf_point_index != point_index && !point_store.is_equal(point, leaf_point_index)? {
            return Err(ForestError::NotPresent {
                msg: "point not found at the expected leaf",
            });
        }

        self.node_store
            .remove_sequence_index(leaf_point_index, sequence_index)?;
        self.tree_mass -= 1;

        if self.node_store.decrease_leaf_mass(leaf_node) == 0 {
            if leaf_path.is_empty() {
                self.root = self.node_store.null_node();
            } else {
                let (parent, _sibling) = leaf_path.pop().expect("non-empty");
                let grand_parent = if leaf_path.is_empty() {
                    self.node_store.null_node()
                } else {
                    leaf_path.last().expect("non-empty").0
                };

                if grand_parent == self.node_store.null_node() {
                    self.root = leaf_saved_sibling;
                } else {
                    self.node_store
                        .replace_node(grand_parent, parent, leaf_saved_sibling);
                    self.node_store.manage_ancestors_delete(
                        &mut leaf_path,
                        point,
                        point_store,
                        false,
                    )?;
                }
                self.node_store.delete_internal_node(parent);
            }
        } else {
            self.node_store
                .manage_ancestors_delete(&mut leaf_path, point, point_store, true)?;
        }
        Ok(leaf_point_index)
    }

    fn traverse_recursive<R, PS, NV, V>(
        &self,
        point: &[f32],
        node_view: &mut NV,
        visitor: &mut V,
        visitor_info: &VisitorInfo,
        point_store: &PS,
    ) -> Result<()>
    where
        PS: PointStore,
        V: Visitor<NV, R>,
        R: Clone,
        NV: UpdatableNodeView<CompactNodeStore<C, P, N>, PS>,
    {
        let current_node = node_view.current_node();
        if self.node_store.is_leaf(current_node) {
            node_view.update_at_leaf(point, current_node, &self.node_store, point_store, visitor_info)?;
            visitor.accept_leaf(point, visitor_info, node_view)?;
            if visitor.use_shadow_box() {
                node_view.enable_shadow_box(&self.node_store, point_store)?;
            }
        } else {
            node_view.descend(point, &self.node_store)?;
            self.traverse_recursive(point, node_view, visitor, visitor_info, point_store)?;
            if !visitor.is_converged() {
                node_view.ascend(point, current_node, &self.node_store, point_store)?;
                visitor.accept(point, visitor_info, node_view)?;
            }
        }
        Ok(())
    }

    /// Runs a visitor down to the query's leaf and back; an empty tree
    /// yields the caller's neutral value.
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
        if self.root == self.node_store.null_node() {
            return Ok(default.clone());
        }
        let mut visitor = visitor_factory(self.tree_mass, parameters, visitor_info);
        let mut node_view = NV::create(self.root, &self.node_store);
        self.traverse_recursive(point, &mut node_view, &mut visitor, visitor_info, point_store)?;
        visitor.result(visitor_info)
    }

    fn traverse_multi_recursive<R, PS, NV, V>(
        &self,
        point: &[f32],
        missing: &[bool],
        node_view: &mut NV,
        visitor: &mut V,
        visitor_info: &VisitorInfo,
        point_store: &PS,
    ) -> Result<()>
    where
        PS: PointStore,
        V: SimpleMultiVisitor<NV, R>,
        NV: UpdatableMultiNodeView<CompactNodeStore<C, P, N>, PS>,
    {
        let node = node_view.current_node();
        if self.node_store.is_leaf(node) {
            node_view.update_at_leaf(point, node, &self.node_store, point_store, visitor_info)?;
            visitor.accept_leaf(point, visitor_info, node_view)?;
            return Ok(());
        }
        let parent = node;
        if missing[self.node_store.cut_dimension_of(parent)] {
            let left = self.node_store.left_of(parent);
            let right = self.node_store.right_of(parent);
            node_view.set_current_node(left);
            self.traverse_multi_recursive(point, missing, node_view, visitor, visitor_info, point_store)?;
            let saved_box = node_view.current_box();
            node_view.set_current_node(right);
            self.traverse_multi_recursive(point, missing, node_view, visitor, visitor_info, point_store)?;
            visitor.combine_branches(point, node_view, visitor_info)?;
            if !visitor.is_converged() {
                node_view.merge_paths(parent, saved_box, point, missing, &self.node_store, point_store)?;
            }
        } else {
            node_view.descend(point, &self.node_store)?;
            self.traverse_multi_recursive(point, missing, node_view, visitor, visitor_info, point_store)?;
            if !visitor.is_converged() {
                node_view.ascend_with_missing(parent, point, missing, &self.node_store, point_store)?;
            }
        }
        if !visitor.is_converged() {
            visitor.accept(point, visitor_info, node_view)?;
        }
        Ok(())
    }

    /// Imputation workhorse: descends every branch consistent with the
    /// known coordinates and returns the surviving proposal as
    /// `(score, point reference, distance)`.
    pub fn conditional_field<PS: PointStore>(
        &self,
        missing: &[usize],
        point: &[f32],
        point_store: &PS,
        centrality: f64,
        seed: u64,
        visitor_info: &VisitorInfo,
    ) -> Result<(f64, usize, f64)> {
        if self.root == self.node_store.null_node() {
            return Ok((0.0, usize::MAX, 0.0));
        }
        let mut visitor = ImputeVisitor::new(missing, centrality, self.tree_mass, seed);
        let mut missing_flags = vec![false; self.dimensions];
        for &i in missing.iter() {
            check_argument(i < self.dimensions, "missing position out of range")?;
            missing_flags[i] = true;
        }
        let mut node_view =
            <crate::sampledtree::nodeview::BoxNodeView as UpdatableNodeView<
                CompactNodeStore<C, P, N>,
                PS,
            >>::create(self.root, &self.node_store);
        self.traverse_multi_recursive(
            point,
            &missing_flags,
            &mut node_view,
            &mut visitor,
            visitor_info,
            point_store,
        )?;
        visitor.result(visitor_info)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.node_store.size_in_bytes() + std::mem::size_of::<RandomCutTree<C, P, N>>()
    }

    /// Test support: verifies mass bookkeeping, cut separation and cached
    /// bounding boxes over the whole tree.
    pub fn check_consistency<PS: PointStore>(&self, point_store: &PS) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let (mass, _bounding_box) = self.check_subtree(self.root, point_store)?;
        check_argument(mass == self.tree_mass, "root mass does not match tree mass")?;
        Ok(())
    }

    fn check_subtree<PS: PointStore>(
        &self,
        node: usize,
        point_store: &PS,
    ) -> Result<(usize, BoundingBox)> {
        if self.node_store.is_leaf(node) {
            let point_index = self.node_store.leaf_point_index(node)?;
            let point = point_store.copy(point_index)?;
            return Ok((self.node_store.mass_of(node), BoundingBox::from_point(&point)));
        }
        let (left_mass, left_box) = self.check_subtree(self.node_store.left_of(node), point_store)?;
        let (right_mass, right_box) =
            self.check_subtree(self.node_store.right_of(node), point_store)?;
        check_argument(
            left_mass + right_mass == self.node_store.mass_of(node),
            "internal mass is not the sum of its children",
        )?;
        let dimension = self.node_store.cut_dimension_of(node);
        let value = self.node_store.cut_value_of(node);
        check_argument(
            left_box.max_values()[dimension] <= value,
            "left subtree crosses the cut",
        )?;
        check_argument(
            right_box.min_values()[dimension] > value,
            "right subtree touches the cut",
        )?;
        let mut merged = left_box;
        merged.add_box(&right_box);
        if let Some(cached) = self.node_store.cached_box(node) {
            check_argument(
                cached.min_values() == merged.min_values()
                    && cached.max_values() == merged.max_values(),
                "cached bounding box is not tight",
            )?;
        }
        Ok((left_mass + right_mass, merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointstore::CompactPointStore;

    fn tree_and_store(
        store_sequence_indexes: bool,
        center_of_mass: bool,
    ) -> (RandomCutTree<usize, usize, usize>, CompactPointStore<usize>) {
        let tree = RandomCutTree::new(2, 8, false, store_sequence_indexes, center_of_mass, 1.0, 42)
            .unwrap();
        let store = CompactPointStore::new(2, 1, 64, 16, false, false).unwrap();
        (tree, store)
    }

    fn install(store: &mut CompactPointStore<usize>, point: &[f32]) -> usize {
        store.add(point).unwrap().unwrap()
    }

    #[test]
    fn add_then_delete_restores_the_empty_tree() {
        let (mut tree, mut store) = tree_and_store(false, false);
        let a = install(&mut store, &[1.0, 2.0]);
        tree.add(a, 0, &store).unwrap();
        assert_eq!(tree.mass(), 1);
        tree.check_consistency(&store).unwrap();
        tree.delete(a, 0, &store).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.mass(), 0);
    }

    #[test]
    fn duplicates_collapse_into_one_leaf() {
        let (mut tree, mut store) = tree_and_store(false, false);
        let a = install(&mut store, &[1.0, 1.0]);
        let b = install(&mut store, &[1.0, 1.0]);
        let c = install(&mut store, &[-1.0, 0.0]);
        assert_eq!(tree.add(a, 0, &store).unwrap(), a);
        // the second occurrence resolves to the retained reference
        assert_eq!(tree.add(b, 1, &store).unwrap(), a);
        tree.add(c, 2, &store).unwrap();
        assert_eq!(tree.mass(), 3);
        tree.check_consistency(&store).unwrap();

        tree.delete(a, 0, &store).unwrap();
        assert_eq!(tree.mass(), 2);
        tree.delete(a, 1, &store).unwrap();
        assert_eq!(tree.mass(), 1);
        tree.check_consistency(&store).unwrap();
    }

    #[test]
    fn deleting_from_an_empty_tree_is_an_error() {
        let (mut tree, mut store) = tree_and_store(false, false);
        let a = install(&mut store, &[0.5, 0.5]);
        assert!(matches!(
            tree.delete(a, 0, &store),
            Err(ForestError::IllegalState { .. })
        ));
    }

    #[test]
    fn deleting_an_absent_point_is_not_present() {
        let (mut tree, mut store) = tree_and_store(false, false);
        let a = install(&mut store, &[0.0, 0.0]);
        let b = install(&mut store, &[4.0, 4.0]);
        let c = install(&mut store, &[9.0, -9.0]);
        tree.add(a, 0, &store).unwrap();
        tree.add(b, 1, &store).unwrap();
        assert!(matches!(
            tree.delete(c, 2, &store),
            Err(ForestError::NotPresent { .. })
        ));
    }

    #[test]
    fn sequence_maps_guard_deletions() {
        let (mut tree, mut store) = tree_and_store(true, false);
        let a = install(&mut store, &[1.0, 0.0]);
        let b = install(&mut store, &[0.0, 1.0]);
        tree.add(a, 10, &store).unwrap();
        tree.add(b, 11, &store).unwrap();
        assert_eq!(tree.sequence_indexes_of(a), Some(&[10u64][..]));
        // wrong sequence index for the right point
        assert!(matches!(
            tree.delete(a, 99, &store),
            Err(ForestError::NotPresent { .. })
        ));
        tree.delete(a, 10, &store).unwrap();
        assert!(tree.sequence_indexes_of(a).is_none());
        assert_eq!(tree.mass(), 1);
    }

    #[test]
    fn center_of_mass_tracks_additions_and_deletions() {
        let (mut tree, mut store) = tree_and_store(false, true);
        let a = install(&mut store, &[0.0, 0.0]);
        let b = install(&mut store, &[2.0, 2.0]);
        let c = install(&mut store, &[4.0, -2.0]);
        tree.add(a, 0, &store).unwrap();
        tree.add(b, 1, &store).unwrap();
        tree.add(c, 2, &store).unwrap();
        let center = tree.center_of_mass().expect("internal root has a sum");
        assert!((center[0] - 2.0).abs() < 1e-5);
        assert!((center[1] - 0.0).abs() < 1e-5);

        tree.delete(c, 2, &store).unwrap();
        let center = tree.center_of_mass().expect("still an internal root");
        assert!((center[0] - 1.0).abs() < 1e-5);
        assert!((center[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn growing_trees_stay_consistent_across_cache_changes() {
        let (mut tree, mut store) = tree_and_store(false, false);
        let mut live = Vec::new();
        let mut value = 1.0f32;
        for i in 0..8u64 {
            value = (value * 13.0) % 11.0;
            let reference = install(&mut store, &[value, -value]);
            live.push((tree.add(reference, i, &store).unwrap(), i));
            tree.check_consistency(&store).unwrap();
        }
        tree.set_bounding_box_cache_fraction(0.25).unwrap();
        let (reference, sequence) = live.pop().unwrap();
        tree.delete(reference, sequence, &store).unwrap();
        tree.check_consistency(&store).unwrap();
        tree.set_bounding_box_cache_fraction(1.0).unwrap();
        let next = install(&mut store, &[100.0, 100.0]);
        tree.add(next, 100, &store).unwrap();
        tree.check_consistency(&store).unwrap();
    }
}
