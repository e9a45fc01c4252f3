use log::debug;

use crate::errors::Result;
use crate::forest::{Forest, ForestLarge, ForestMedium, ForestSmall, ForestTiny};
use crate::util::check_argument;

/// Forest configuration. Construct with [`ForestOptions::new`], adjust
/// through the chained setters, then [`build`](ForestOptions::build); the
/// index widths of the underlying stores are chosen from the final values
/// so small configurations stay small in memory.
///
/// ```
/// use cutforest::ForestOptions;
///
/// let mut forest = ForestOptions::new(2)
///     .sample_size(256)
///     .number_of_trees(30)
///     .random_seed(42)
///     .build()
///     .unwrap();
/// forest.update(&[0.1, -0.2]).unwrap();
/// ```
#[derive(Clone)]
pub struct ForestOptions {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub sample_size: usize,
    pub number_of_trees: usize,
    /// Decay rate lambda; `None` selects `0.1 / sample_size`.
    pub time_decay: Option<f64>,
    /// Updates before queries return non-neutral results; `None` selects
    /// `sample_size / 4`.
    pub output_after: Option<usize>,
    pub initial_accept_fraction: f64,
    pub bounding_box_cache_fraction: f64,
    pub random_seed: u64,
    pub parallel_enabled: bool,
    /// Worker count for the parallel executor; zero lets the pool pick.
    pub thread_pool_size: usize,
    pub internal_shingling: bool,
    pub internal_rotation: bool,
    pub store_sequence_indexes: bool,
    pub center_of_mass: bool,
}

impl ForestOptions {
    pub fn new(dimensions: usize) -> Self {
        ForestOptions {
            dimensions,
            shingle_size: 1,
            sample_size: 256,
            number_of_trees: 50,
            time_decay: None,
            output_after: None,
            initial_accept_fraction: 0.125,
            bounding_box_cache_fraction: 1.0,
            random_seed: 0,
            parallel_enabled: false,
            thread_pool_size: 0,
            internal_shingling: false,
            internal_rotation: false,
            store_sequence_indexes: false,
            center_of_mass: false,
        }
    }

    pub fn shingle_size(mut self, shingle_size: usize) -> Self {
        self.shingle_size = shingle_size;
        self
    }

    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn number_of_trees(mut self, number_of_trees: usize) -> Self {
        self.number_of_trees = number_of_trees;
        self
    }

    pub fn time_decay(mut self, time_decay: f64) -> Self {
        self.time_decay = Some(time_decay);
        self
    }

    pub fn output_after(mut self, output_after: usize) -> Self {
        self.output_after = Some(output_after);
        self
    }

    pub fn initial_accept_fraction(mut self, fraction: f64) -> Self {
        self.initial_accept_fraction = fraction;
        self
    }

    pub fn bounding_box_cache_fraction(mut self, fraction: f64) -> Self {
        self.bounding_box_cache_fraction = fraction;
        self
    }

    pub fn random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn parallel_enabled(mut self, parallel_enabled: bool) -> Self {
        self.parallel_enabled = parallel_enabled;
        self
    }

    pub fn thread_pool_size(mut self, thread_pool_size: usize) -> Self {
        self.thread_pool_size = thread_pool_size;
        self
    }

    pub fn internal_shingling(mut self, internal_shingling: bool) -> Self {
        self.internal_shingling = internal_shingling;
        self
    }

    pub fn internal_rotation(mut self, internal_rotation: bool) -> Self {
        self.internal_rotation = internal_rotation;
        self
    }

    pub fn store_sequence_indexes(mut self, store_sequence_indexes: bool) -> Self {
        self.store_sequence_indexes = store_sequence_indexes;
        self
    }

    pub fn center_of_mass(mut self, center_of_mass: bool) -> Self {
        self.center_of_mass = center_of_mass;
        self
    }

    pub fn effective_time_decay(&self) -> f64 {
        self.time_decay.unwrap_or(0.1 / self.sample_size as f64)
    }

    pub fn effective_output_after(&self) -> usize {
        self.output_after
            .unwrap_or(usize::max(1, self.sample_size / 4))
    }

    pub fn validate(&self) -> Result<()> {
        check_argument(self.dimensions >= 1, "dimensions must be at least one")?;
        check_argument(self.sample_size >= 2, "sample size must be at least two")?;
        check_argument(
            self.number_of_trees >= 1,
            "number of trees must be at least one",
        )?;
        check_argument(
            self.shingle_size >= 1 && self.dimensions % self.shingle_size == 0,
            "shingle size must divide dimensions",
        )?;
        check_argument(
            !self.internal_rotation || self.internal_shingling,
            "internal rotation requires internal shingling",
        )?;
        check_argument(
            self.effective_time_decay() >= 0.0,
            "time decay cannot be negative",
        )?;
        check_argument(
            self.initial_accept_fraction > 0.0 && self.initial_accept_fraction <= 1.0,
            "initial accept fraction must lie in (0,1]",
        )?;
        check_argument(
            (0.0..=1.0).contains(&self.bounding_box_cache_fraction),
            "bounding box cache fraction must lie in [0,1]",
        )?;
        check_argument(
            self.effective_output_after() >= 1,
            "output_after must be at least one",
        )?;
        Ok(())
    }

    /// Builds the forest behind the facade trait, choosing the narrowest
    /// index widths the configuration permits.
    pub fn build(&self) -> Result<Box<dyn Forest>> {
        self.validate()?;
        if self.dimensions < u8::MAX as usize && self.sample_size - 1 <= u8::MAX as usize {
            if self.sample_size * (1 + self.number_of_trees) * self.shingle_size
                <= u16::MAX as usize
            {
                debug!("choosing the tiny forest representation");
                Ok(Box::new(ForestTiny::from_options(self)?))
            } else {
                debug!("choosing the small forest representation");
                Ok(Box::new(ForestSmall::from_options(self)?))
            }
        } else if self.dimensions < u16::MAX as usize && self.sample_size - 1 <= u16::MAX as usize
        {
            debug!("choosing the medium forest representation");
            Ok(Box::new(ForestMedium::from_options(self)?))
        } else {
            debug!("choosing the large forest representation");
            Ok(Box::new(ForestLarge::from_options(self)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForestError;

    #[test]
    fn defaults_build() {
        let options = ForestOptions::new(3);
        assert!(options.validate().is_ok());
        assert!((options.effective_time_decay() - 0.1 / 256.0).abs() < 1e-12);
        assert_eq!(options.effective_output_after(), 64);
        assert!(options.build().is_ok());
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(matches!(
            ForestOptions::new(0).build(),
            Err(ForestError::InvalidArgument { .. })
        ));
        assert!(ForestOptions::new(3).sample_size(1).build().is_err());
        assert!(ForestOptions::new(3).shingle_size(2).build().is_err());
        assert!(ForestOptions::new(4)
            .shingle_size(2)
            .internal_rotation(true)
            .build()
            .is_err());
        assert!(ForestOptions::new(2)
            .initial_accept_fraction(0.0)
            .build()
            .is_err());
        assert!(ForestOptions::new(2)
            .bounding_box_cache_fraction(1.5)
            .build()
            .is_err());
    }

    #[test]
    fn unknown_config_keys_fail() {
        let mut forest = ForestOptions::new(2).sample_size(8).build().unwrap();
        assert!(matches!(
            forest.config_get("no_such_key"),
            Err(ForestError::InvalidConfig { .. })
        ));
        assert!(matches!(
            forest.config_set("no_such_key", 1.0),
            Err(ForestError::InvalidConfig { .. })
        ));
        assert!(forest.config_set("time_decay", 0.01).is_ok());
        assert_eq!(forest.config_get("time_decay").unwrap(), 0.01);
        assert!(forest
            .config_set("bounding_box_cache_fraction", 0.25)
            .is_ok());
        assert_eq!(
            forest.config_get("bounding_box_cache_fraction").unwrap(),
            0.25
        );
    }
}
