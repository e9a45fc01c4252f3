use crate::common::density::DirectionalDensity;
use crate::errors::{ForestError, Result};
use crate::sampledtree::nodeview::BoxNodeView;
use crate::visitor::visitor::{Visitor, VisitorInfo};

/// Accumulates the per-direction probability-mass and distance statistics
/// behind the density estimate; the recursion is the same geometric fold
/// as the score, but what is folded is a vector of accumulators.
pub struct DensityVisitor {
    converged: bool,
    leaf_index: usize,
    score: f64,
    tree_mass: usize,
    hit_duplicate: bool,
    use_shadow_box: bool,
    accumulator: DirectionalDensity,
}

impl DensityVisitor {
    pub fn new(tree_mass: usize, dimension: usize, _visitor_info: &VisitorInfo) -> Self {
        DensityVisitor {
            tree_mass,
            leaf_index: usize::MAX,
            converged: false,
            score: 0.0,
            hit_duplicate: false,
            use_shadow_box: false,
            accumulator: DirectionalDensity::empty(dimension, tree_mass as f32),
        }
    }

    pub fn create_visitor(
        tree_mass: usize,
        parameters: &[usize],
        visitor_info: &VisitorInfo,
    ) -> Self {
        let dimension = parameters[0];
        DensityVisitor::new(tree_mass, dimension, visitor_info)
    }
}

impl Visitor<BoxNodeView, DirectionalDensity> for DensityVisitor {
    fn accept_leaf(
        &mut self,
        point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &BoxNodeView,
    ) -> Result<()> {
        let mass = node_view.mass();
        self.leaf_index = node_view.leaf_index();
        if mass > visitor_info.ignore_mass {
            if node_view.is_duplicate() {
                self.score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(node_view.depth(), mass);
                self.hit_duplicate = true;
                self.use_shadow_box = true;
            } else {
                let value = (visitor_info.score_unseen)(node_view.depth(), mass);
                self.score = value;
                match node_view.bounding_box() {
                    Some(bounding_box) => {
                        self.accumulator.update(point, bounding_box, value);
                    }
                    None => {
                        return Err(ForestError::IllegalState {
                            msg: "leaf box missing in density traversal",
                        })
                    }
                }
            }
        } else {
            self.score = (visitor_info.score_unseen)(node_view.depth(), mass);
            self.use_shadow_box = true;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &BoxNodeView,
    ) -> Result<()> {
        if !self.converged {
            let bounding_box = if !self.use_shadow_box {
                node_view.bounding_box()
            } else {
                node_view.shadow_box()
            };
            let new_value = (visitor_info.score_unseen)(node_view.depth(), node_view.mass());
            let prob = match bounding_box {
                Some(bounding_box) => self.accumulator.update(point, bounding_box, new_value),
                None => {
                    return Err(ForestError::IllegalState {
                        msg: "box missing in density traversal",
                    })
                }
            };
            if prob == 0.0 {
                self.converged = true;
            } else if !self.hit_duplicate {
                self.score = (1.0 - prob) * self.score + prob * new_value;
            }
        }
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo) -> Result<DirectionalDensity> {
        let total = (visitor_info.normalizer)(self.score, self.tree_mass);
        let mut answer = self.accumulator.clone();
        answer.measure.normalize(total);
        Ok(answer)
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }
}
