pub mod boundingbox;
pub mod cut;
pub mod nodestore;
pub mod nodeview;
pub mod sampled_tree;
pub mod sampler;
pub mod tree;
