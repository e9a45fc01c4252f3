use num::abs;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::errors::Result;
use crate::sampledtree::nodeview::BoxNodeView;
use crate::util::check_argument;
use crate::visitor::visitor::{SimpleMultiVisitor, Visitor, VisitorInfo};

/// Multi-visitor behind imputation and the conditional field: the walk
/// forks wherever a cut lands in a missing dimension, every reached leaf
/// proposes itself as a completion, and forks keep the proposal whose
/// adjusted score is smaller (i.e. the more typical completion).
///
/// `centrality` interpolates between anomaly-score-driven selection (1.0)
/// and a uniformly random draw among the proposals (0.0).
pub struct ImputeVisitor {
    centrality: f64,
    tree_mass: usize,
    rng: ChaCha20Rng,
    missing: Vec<usize>,
    stack: Vec<ImputeStackElement>,
    use_shadow_box: bool,
}

struct ImputeStackElement {
    converged: bool,
    score: f64,
    random: f32,
    index: usize,
    distance: f64,
}

impl ImputeVisitor {
    pub fn new(missing: &[usize], centrality: f64, tree_mass: usize, seed: u64) -> Self {
        ImputeVisitor {
            tree_mass,
            centrality,
            rng: ChaCha20Rng::seed_from_u64(seed),
            missing: Vec::from(missing),
            stack: Vec::new(),
            use_shadow_box: false,
        }
    }

    /// Near-neighbor flavor: no missing dimensions, percentile-controlled
    /// centrality; each tree proposes the sampled point closest (in the
    /// adjusted sense) to the query.
    pub fn create_nbr_visitor(
        tree_mass: usize,
        parameters: &[usize],
        _visitor_info: &VisitorInfo,
    ) -> Self {
        let percentile = if !parameters.is_empty() {
            parameters[0]
        } else {
            50
        };
        let seed = if parameters.len() > 1 { parameters[1] } else { 0 };
        let centrality = if !(5..=95).contains(&percentile) {
            0.0
        } else {
            1.0 - abs(1.0 - percentile as f64 / 50.0)
        };
        ImputeVisitor::new(&Vec::new(), centrality, tree_mass, seed as u64)
    }

    /// Blends the normalized anomaly score with a uniform draw according
    /// to `centrality`; forks pick the proposal minimizing this value.
    fn adjusted_score(&self, element: &ImputeStackElement, visitor_info: &VisitorInfo) -> f64 {
        self.centrality * (visitor_info.normalizer)(element.score, self.tree_mass)
            + (1.0 - self.centrality) * element.random as f64
    }
}

impl Visitor<BoxNodeView, (f64, usize, f64)> for ImputeVisitor {
    fn accept_leaf(
        &mut self,
        point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &BoxNodeView,
    ) -> Result<()> {
        let mass = node_view.mass();
        let leaf_point = node_view.leaf_point();
        let mut completed = Vec::from(point);
        for &i in self.missing.iter() {
            completed[i] = leaf_point[i];
        }

        let mut converged = false;
        let score: f64;
        if mass > visitor_info.ignore_mass || !self.missing.is_empty() {
            if node_view.is_duplicate() {
                score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(node_view.depth(), mass);
                converged = true;
            } else {
                score = (visitor_info.score_unseen)(node_view.depth(), mass);
            }
        } else {
            // a shadow box is not meaningful with missing values; for the
            // neighbor flavor this matches the score visitor's discounting
            score = (visitor_info.score_unseen)(node_view.depth(), mass);
            self.use_shadow_box = true;
        }
        let distance = (visitor_info.distance)(&completed, leaf_point);
        self.stack.push(ImputeStackElement {
            converged,
            score,
            index: node_view.leaf_index(),
            random: self.rng.gen::<f32>(),
            distance,
        });
        Ok(())
    }

    fn accept(
        &mut self,
        _point: &[f32],
        visitor_info: &VisitorInfo,
        node_view: &BoxNodeView,
    ) -> Result<()> {
        let mut top = self.stack.pop().expect("traversal stack cannot be empty");
        if !top.converged {
            let prob = if !self.use_shadow_box {
                // this probability ignores missing coordinates, which is
                // accurate because the completion lies inside the box
                node_view.probability_of_cut()
            } else {
                node_view.shadow_probability_of_cut()
            };
            if prob == 0.0 {
                top.converged = true;
            } else {
                top.score = (1.0 - prob) * top.score
                    + prob * (visitor_info.score_unseen)(node_view.depth(), node_view.mass());
            }
        }
        self.stack.push(top);
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo) -> Result<(f64, usize, f64)> {
        check_argument(self.stack.len() == 1, "unbalanced traversal stack")?;
        let top = self.stack.last().expect("stack has one element");
        let score = (visitor_info.normalizer)(top.score, self.tree_mass);
        Ok((score, top.index, top.distance))
    }

    fn is_converged(&self) -> bool {
        !self.stack.is_empty() && self.stack.last().expect("non-empty").converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }
}

impl SimpleMultiVisitor<BoxNodeView, (f64, usize, f64)> for ImputeVisitor {
    fn combine_branches(
        &mut self,
        _point: &[f32],
        _node_view: &BoxNodeView,
        visitor_info: &VisitorInfo,
    ) -> Result<()> {
        let mut top = self.stack.pop().expect("fork requires two proposals");
        let mut next = self.stack.pop().expect("fork requires two proposals");

        if self.adjusted_score(&top, visitor_info) < self.adjusted_score(&next, visitor_info) {
            top.converged = top.converged || next.converged;
            self.stack.push(top);
        } else {
            next.converged = top.converged || next.converged;
            self.stack.push(next);
        }
        Ok(())
    }
}
