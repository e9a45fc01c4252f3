use crate::common::divector::DiVector;
use crate::errors::Result;
use crate::pointstore::PointStore;
use crate::sampledtree::boundingbox::BoundingBox;
use crate::sampledtree::nodestore::NodeStore;
use crate::visitor::visitor::VisitorInfo;

/// The view of the current node handed to a visitor while a traversal
/// descends to the query's leaf and climbs back up. Views own whatever
/// bounding-box state the visitor needs so visitors stay free of tree
/// internals.
pub trait UpdatableNodeView<NS, PS>
where
    NS: NodeStore,
    PS: PointStore,
{
    fn create(root: usize, node_store: &NS) -> Self;
    fn update_at_leaf(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
        visitor_info: &VisitorInfo,
    ) -> Result<()>;
    fn descend(&mut self, point: &[f32], node_store: &NS) -> Result<()>;
    fn ascend(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()>;
    fn current_node(&self) -> usize;
    fn enable_shadow_box(&mut self, node_store: &NS, point_store: &PS) -> Result<()>;
}

/// Additional surface for traversals that may fork into both children when
/// the query has no opinion about a cut dimension.
pub trait UpdatableMultiNodeView<NS, PS>: UpdatableNodeView<NS, PS>
where
    NS: NodeStore,
    PS: PointStore,
{
    fn set_current_node(&mut self, index: usize);
    fn current_box(&self) -> Option<BoundingBox>;
    fn ascend_with_missing(
        &mut self,
        parent: usize,
        point: &[f32],
        missing: &[bool],
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()>;
    fn merge_paths(
        &mut self,
        parent: usize,
        saved_box: Option<BoundingBox>,
        point: &[f32],
        missing: &[bool],
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()>;
}

/// Lean view for scalar scoring: keeps a box along the path only when the
/// store's cache is too sparse to answer probability queries directly, or
/// when a shadow box was requested.
pub struct ScoreNodeView {
    current_node: usize,
    probability_of_cut: f64,
    shadow_probability_of_cut: f64,
    mass: usize,
    depth: usize,
    leaf_index: usize,
    leaf_duplicate: bool,
    use_shadow_box: bool,
    current_box: Option<BoundingBox>,
    shadow_box: Option<BoundingBox>,
}

impl ScoreNodeView {
    pub fn probability_of_cut(&self) -> f64 {
        self.probability_of_cut
    }
    pub fn shadow_probability_of_cut(&self) -> f64 {
        self.shadow_probability_of_cut
    }
    pub fn mass(&self) -> usize {
        self.mass
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }
    pub fn is_duplicate(&self) -> bool {
        self.leaf_duplicate
    }
}

impl<NS, PS> UpdatableNodeView<NS, PS> for ScoreNodeView
where
    NS: NodeStore,
    PS: PointStore,
{
    fn create(root: usize, _node_store: &NS) -> Self {
        ScoreNodeView {
            current_node: root,
            probability_of_cut: f64::MAX, // infeasible until computed
            shadow_probability_of_cut: f64::MAX,
            mass: 0,
            depth: 0,
            leaf_index: usize::MAX,
            leaf_duplicate: false,
            use_shadow_box: false,
            current_box: None,
            shadow_box: None,
        }
    }

    fn update_at_leaf(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
        _visitor_info: &VisitorInfo,
    ) -> Result<()> {
        self.leaf_index = node_store.leaf_point_index(index)?;
        self.mass = node_store.mass_of(index);
        self.probability_of_cut = if point_store.is_equal(point, self.leaf_index)? {
            self.leaf_duplicate = true;
            0.0
        } else {
            self.leaf_duplicate = false;
            1.0
        };
        if node_store.use_path_for_box() {
            self.current_box = Some(node_store.bounding_box(self.current_node, point_store)?);
        }
        Ok(())
    }

    fn descend(&mut self, point: &[f32], node_store: &NS) -> Result<()> {
        if node_store.is_left_of(self.current_node, point) {
            self.current_node = node_store.left_of(self.current_node);
        } else {
            self.current_node = node_store.right_of(self.current_node);
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()> {
        self.probability_of_cut = match &mut self.current_box {
            Some(bounding_box) => {
                let sibling = node_store.sibling_of(self.current_node, index);
                if self.use_shadow_box {
                    let sibling_box = node_store.bounding_box(sibling, point_store)?;
                    bounding_box.add_box(&sibling_box);
                    match &mut self.shadow_box {
                        Some(shadow) => shadow.add_box(&sibling_box),
                        None => self.shadow_box = Some(sibling_box),
                    }
                    self.shadow_probability_of_cut = self
                        .shadow_box
                        .as_ref()
                        .expect("shadow box just set")
                        .probability_of_cut(point);
                } else {
                    node_store.grow_node_box(bounding_box, point_store, index, sibling)?;
                }
                bounding_box.probability_of_cut(point)
            }
            None => node_store.probability_of_cut(index, point, point_store)?,
        };
        self.current_node = index;
        self.mass = node_store.mass_of(index);
        self.depth -= 1;
        Ok(())
    }

    fn current_node(&self) -> usize {
        self.current_node
    }

    fn enable_shadow_box(&mut self, node_store: &NS, point_store: &PS) -> Result<()> {
        self.use_shadow_box = true;
        // the shadow box itself is first grown one level up; keeping the
        // current box from here on is the invariant that makes that work
        self.current_box = Some(node_store.bounding_box(self.current_node, point_store)?);
        Ok(())
    }
}

/// Full view: always carries the path bounding box, the current cut, and a
/// copy of the leaf point. Attribution, density, imputation and neighbor
/// traversals all run on this one.
pub struct BoxNodeView {
    current_node: usize,
    probability_of_cut: f64,
    shadow_probability_of_cut: f64,
    mass: usize,
    depth: usize,
    leaf_index: usize,
    leaf_duplicate: bool,
    use_shadow_box: bool,
    current_box: Option<BoundingBox>,
    shadow_box: Option<BoundingBox>,
    cut_dimension: usize,
    cut_value: f32,
    point_at_leaf: Vec<f32>,
}

impl BoxNodeView {
    pub fn probability_of_cut(&self) -> f64 {
        self.probability_of_cut
    }
    pub fn shadow_probability_of_cut(&self) -> f64 {
        self.shadow_probability_of_cut
    }
    pub fn mass(&self) -> usize {
        self.mass
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }
    pub fn is_duplicate(&self) -> bool {
        self.leaf_duplicate
    }
    pub fn cut_dimension(&self) -> usize {
        self.cut_dimension
    }
    pub fn cut_value(&self) -> f32 {
        self.cut_value
    }
    pub fn leaf_point(&self) -> &[f32] {
        &self.point_at_leaf
    }
    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.current_box.as_ref()
    }
    pub fn shadow_box(&self) -> Option<&BoundingBox> {
        self.shadow_box.as_ref()
    }

    pub fn assign_probability_of_cut(&self, di_vector: &mut DiVector, point: &[f32]) {
        di_vector.assign_as_probability_of_cut(
            self.current_box.as_ref().expect("box present past the leaf"),
            point,
        );
    }

    pub fn assign_probability_of_cut_shadow_box(&self, di_vector: &mut DiVector, point: &[f32]) {
        assert!(self.use_shadow_box, "shadow box not in use");
        di_vector.assign_as_probability_of_cut(
            self.shadow_box.as_ref().expect("shadow box grown above the leaf"),
            point,
        );
    }
}

impl<NS, PS> UpdatableNodeView<NS, PS> for BoxNodeView
where
    NS: NodeStore,
    PS: PointStore,
{
    fn create(root: usize, node_store: &NS) -> Self {
        let (cut_dimension, cut_value, _left, _right) = node_store.cut_and_children(root);
        let mass = node_store.mass_of(root);
        BoxNodeView {
            current_node: root,
            probability_of_cut: f64::MAX,
            shadow_probability_of_cut: f64::MAX,
            mass,
            depth: 0,
            leaf_index: usize::MAX,
            leaf_duplicate: false,
            use_shadow_box: false,
            current_box: None,
            shadow_box: None,
            cut_dimension,
            cut_value,
            point_at_leaf: Vec::new(),
        }
    }

    fn update_at_leaf(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
        _visitor_info: &VisitorInfo,
    ) -> Result<()> {
        self.leaf_index = node_store.leaf_point_index(index)?;
        self.point_at_leaf = point_store.copy(self.leaf_index)?;
        self.mass = node_store.mass_of(index);
        self.probability_of_cut = if self.point_at_leaf.eq(point) {
            self.leaf_duplicate = true;
            0.0
        } else {
            self.leaf_duplicate = false;
            1.0
        };
        self.current_box = Some(BoundingBox::from_point(&self.point_at_leaf));
        Ok(())
    }

    fn descend(&mut self, point: &[f32], node_store: &NS) -> Result<()> {
        if node_store.is_left_of(self.current_node, point) {
            self.current_node = node_store.left_of(self.current_node);
        } else {
            self.current_node = node_store.right_of(self.current_node);
        }
        let (cut_dimension, cut_value, _left, _right) =
            node_store.cut_and_children(self.current_node);
        self.cut_dimension = cut_dimension;
        self.cut_value = cut_value;
        self.depth += 1;
        Ok(())
    }

    fn ascend(
        &mut self,
        point: &[f32],
        index: usize,
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()> {
        let sibling = node_store.sibling_of(self.current_node, index);
        let bounding_box = self
            .current_box
            .as_mut()
            .expect("box present past the leaf");
        if self.use_shadow_box {
            let sibling_box = node_store.bounding_box(sibling, point_store)?;
            bounding_box.add_box(&sibling_box);
            match &mut self.shadow_box {
                Some(shadow) => shadow.add_box(&sibling_box),
                None => self.shadow_box = Some(sibling_box),
            }
            self.shadow_probability_of_cut = self
                .shadow_box
                .as_ref()
                .expect("shadow box just set")
                .probability_of_cut(point);
        } else {
            node_store.grow_node_box(bounding_box, point_store, index, sibling)?;
        }
        self.probability_of_cut = self
            .current_box
            .as_ref()
            .expect("box present past the leaf")
            .probability_of_cut(point);
        self.current_node = index;
        let (cut_dimension, cut_value, _left, _right) = node_store.cut_and_children(index);
        self.cut_dimension = cut_dimension;
        self.cut_value = cut_value;
        self.mass = node_store.mass_of(index);
        self.depth -= 1;
        Ok(())
    }

    fn current_node(&self) -> usize {
        self.current_node
    }

    fn enable_shadow_box(&mut self, _node_store: &NS, _point_store: &PS) -> Result<()> {
        // the current box is always maintained here
        self.use_shadow_box = true;
        Ok(())
    }
}

impl<NS, PS> UpdatableMultiNodeView<NS, PS> for BoxNodeView
where
    NS: NodeStore,
    PS: PointStore,
{
    fn set_current_node(&mut self, index: usize) {
        self.current_node = index;
    }

    fn current_box(&self) -> Option<BoundingBox> {
        self.current_box.clone()
    }

    fn ascend_with_missing(
        &mut self,
        parent: usize,
        point: &[f32],
        missing: &[bool],
        node_store: &NS,
        point_store: &PS,
    ) -> Result<()> {
        let sibling = node_store.sibling_of(self.current_node, parent);
        let bounding_box = self
            .current_box
            .as_mut()
            .expect("box present past the leaf");
        node_store.grow_node_box(bounding_box, point_store, parent, sibling)?;
        self.probability_of_cut = bounding_box.probability_of_cut_with_missing(point, missing);
        self.current_node = parent;
        self.mass = node_store.mass_of(parent);
        self.depth -= 1;
        Ok(())
    }

    fn merge_paths(
        &mut self,
        parent: usize,
        saved_box: Option<BoundingBox>,
        point: &[f32],
        missing: &[bool],
        _node_store: &NS,
        _point_store: &PS,
    ) -> Result<()> {
        let bounding_box = self
            .current_box
            .as_mut()
            .expect("box present past the leaf");
        bounding_box.add_box(saved_box.as_ref().expect("branch box saved before merge"));
        self.probability_of_cut = bounding_box.probability_of_cut_with_missing(point, missing);
        self.current_node = parent;
        Ok(())
    }
}
