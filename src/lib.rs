//! A streaming anomaly-detection engine built on a forest of random cut
//! trees: randomly split binary trees over a time-decayed reservoir sample
//! of recent points. For every incoming vector the forest produces an
//! anomaly score, a per-dimension attribution, and (with shingling) an
//! imputation or extrapolation of the stream.
//!
//! The forest is built for long-running, low-memory deployments: all trees
//! index into one arena-backed point store, bounding boxes are cached only
//! up to a tunable fraction, and queries run sequentially or on a worker
//! pool with bit-identical results.
//!
//! ```
//! use cutforest::ForestOptions;
//!
//! let mut forest = ForestOptions::new(2)
//!     .sample_size(256)
//!     .number_of_trees(30)
//!     .random_seed(42)
//!     .build()
//!     .unwrap();
//!
//! for i in 0..1000 {
//!     let angle = i as f32 / 100.0;
//!     forest.update(&[angle.sin(), angle.cos()]).unwrap();
//! }
//!
//! // points far from the ring score high
//! let usual = forest.score(&[0.7, 0.7]).unwrap();
//! let unusual = forest.score(&[8.0, 8.0]).unwrap();
//! assert!(usual < unusual);
//! ```
//!
//! ### References
//!
//! Sudipto Guha, Nina Mishra, Gourav Roy, and Okke Schrijvers. *"Robust
//! random cut forest based anomaly detection on streams."* International
//! Conference on Machine Learning, pp. 2712-2721. PMLR, 2016.

pub mod common;
pub mod conf;
pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod forest;
pub mod pointstore;
pub mod sampledtree;
pub mod types;
pub mod util;
pub mod visitor;

pub use conf::ForestOptions;
pub use errors::{ForestError, Result};
pub use forest::{
    CoreForest, Forest, ForestLarge, ForestMedium, ForestSmall, ForestTiny, Neighbor,
    CONFIG_BOUNDING_BOX_CACHE_FRACTION, CONFIG_TIME_DECAY,
};
pub use util::{sanitize, sanitize_f64};

/// Sum of coordinate-wise absolute differences.
pub fn l1distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::abs(x as f64 - y as f64))
        .sum()
}

/// Euclidean distance.
pub fn l2distance(a: &[f32], b: &[f32]) -> f64 {
    f64::sqrt(
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let t = x as f64 - y as f64;
                t * t
            })
            .sum(),
    )
}

/// Largest coordinate-wise absolute difference.
pub fn linfinitydistance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::abs(x as f64 - y as f64))
        .fold(0.0, f64::max)
}
