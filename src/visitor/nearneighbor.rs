use crate::errors::Result;
use crate::sampledtree::nodeview::BoxNodeView;
use crate::visitor::visitor::{Visitor, VisitorInfo};

/// Walks to the leaf the query would land on and reports it together with
/// its distance; the forest layer filters by radius, merges duplicates
/// across trees and attaches the admission sequence indexes.
pub struct NearNeighborVisitor {
    leaf_index: usize,
    distance: f64,
    done: bool,
}

impl NearNeighborVisitor {
    pub fn new() -> Self {
        NearNeighborVisitor {
            leaf_index: usize::MAX,
            distance: f64::MAX,
            done: false,
        }
    }

    pub fn create_visitor(
        _tree_mass: usize,
        _parameters: &[usize],
        _visitor_info: &VisitorInfo,
    ) -> Self {
        NearNeighborVisitor::new()
    }
}

impl Default for NearNeighborVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor<BoxNodeView, Option<(usize, f64)>> for NearNeighborVisitor {
    fn accept_leaf(
        &mut self,
        point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &BoxNodeView,
    ) -> Result<()> {
        self.leaf_index = node_view.leaf_index();
        self.distance = (visitor_info.distance)(point, node_view.leaf_point());
        self.done = true;
        Ok(())
    }

    fn accept(
        &mut self,
        _point: &[f32],
        _visitor_info: &VisitorInfo,
        _node_view: &BoxNodeView,
    ) -> Result<()> {
        Ok(())
    }

    fn result(&self, _visitor_info: &VisitorInfo) -> Result<Option<(usize, f64)>> {
        if self.done {
            Ok(Some((self.leaf_index, self.distance)))
        } else {
            Ok(None)
        }
    }

    fn is_converged(&self) -> bool {
        self.done
    }

    fn use_shadow_box(&self) -> bool {
        false
    }
}
