use crate::errors::Result;
use crate::sampledtree::nodeview::ScoreNodeView;
use crate::visitor::visitor::{Visitor, VisitorInfo};

/// Computes the scalar anomaly score of one tree: the leaf sets the base
/// value from depth and duplicity, and every ancestor folds in the
/// probability that a random cut would have separated the query earlier.
pub struct ScoreVisitor {
    converged: bool,
    leaf_index: usize,
    score: f64,
    tree_mass: usize,
    use_shadow_box: bool,
}

impl ScoreVisitor {
    pub fn new(tree_mass: usize, _visitor_info: &VisitorInfo) -> Self {
        ScoreVisitor {
            tree_mass,
            leaf_index: usize::MAX,
            converged: false,
            score: 0.0,
            use_shadow_box: false,
        }
    }

    pub fn create_visitor(
        tree_mass: usize,
        _parameters: &[usize],
        visitor_info: &VisitorInfo,
    ) -> Self {
        ScoreVisitor::new(tree_mass, visitor_info)
    }
}

impl Visitor<ScoreNodeView, f64> for ScoreVisitor {
    fn accept_leaf(
        &mut self,
        _point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &ScoreNodeView,
    ) -> Result<()> {
        let mass = node_view.mass();
        self.leaf_index = node_view.leaf_index();
        if mass > visitor_info.ignore_mass {
            if node_view.is_duplicate() {
                self.score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(node_view.depth(), mass);
                self.converged = true;
            } else {
                self.score = (visitor_info.score_unseen)(node_view.depth(), mass);
            }
        } else {
            // the leaf is being discounted; score against the rest of the
            // tree via a shadow box that excludes it
            self.score = (visitor_info.score_unseen)(node_view.depth(), mass);
            self.use_shadow_box = true;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        _point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &ScoreNodeView,
    ) -> Result<()> {
        if !self.converged {
            let prob = if !self.use_shadow_box {
                node_view.probability_of_cut()
            } else {
                node_view.shadow_probability_of_cut()
            };
            if prob == 0.0 {
                self.converged = true;
            } else {
                self.score = (1.0 - prob) * self.score
                    + prob * (visitor_info.score_unseen)(node_view.depth(), node_view.mass());
            }
        }
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo) -> Result<f64> {
        Ok((visitor_info.normalizer)(self.score, self.tree_mass))
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }
}
