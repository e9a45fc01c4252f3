use log::debug;
use rayon::prelude::*;

use crate::errors::{ForestError, Result};
use crate::sampledtree::sampled_tree::UpdateResult;

/// An early-stop reducer: the executor merges per-tree values into it and
/// polls convergence after each merge. Once converged, no further work is
/// submitted; anything already in flight is still applied, so the
/// accumulated value is deterministic for a fixed execution mode.
pub trait ConvergingAccumulator<R> {
    fn accept(&mut self, value: R);
    fn is_converged(&self) -> bool;
    fn values_accepted(&self) -> usize;
    fn accumulated_value(&self) -> R;
}

/// Mean estimator that stops once the spread of the observed values says
/// the running mean is within `precision` of where it will end up.
pub struct OneSidedAccumulator {
    precision: f64,
    min_values: usize,
    sum: f64,
    sum_of_squares: f64,
    count: usize,
}

impl OneSidedAccumulator {
    pub fn new(precision: f64, min_values: usize) -> Self {
        OneSidedAccumulator {
            precision,
            min_values,
            sum: 0.0,
            sum_of_squares: 0.0,
            count: 0,
        }
    }
}

impl ConvergingAccumulator<f64> for OneSidedAccumulator {
    fn accept(&mut self, value: f64) {
        self.sum += value;
        self.sum_of_squares += value * value;
        self.count += 1;
    }

    fn is_converged(&self) -> bool {
        if self.count < self.min_values {
            return false;
        }
        let mean = self.sum / self.count as f64;
        let variance = self.sum_of_squares / self.count as f64 - mean * mean;
        let deviation = f64::sqrt(if variance > 0.0 { variance } else { 0.0 });
        deviation / f64::sqrt(self.count as f64) <= self.precision * f64::abs(mean)
    }

    fn values_accepted(&self) -> usize {
        self.count
    }

    fn accumulated_value(&self) -> f64 {
        self.sum
    }
}

/// Runs per-component work sequentially or on a dedicated rayon pool.
///
/// Both backends produce identical observable results for deterministic
/// visitors: parallel runs collect per-component values in declared order
/// and reduce them left to right, exactly as the sequential loop does.
/// The pool is created once and shared across queries.
pub struct TraversalExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl TraversalExecutor {
    pub fn new(parallel_enabled: bool, thread_pool_size: usize) -> Result<Self> {
        let pool = if parallel_enabled {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if thread_pool_size > 0 {
                builder = builder.num_threads(thread_pool_size);
            }
            let pool = builder.build().map_err(|_| ForestError::InvalidArgument {
                msg: "unable to create the worker pool",
            })?;
            debug!("executor pool created with {} threads", pool.current_num_threads());
            Some(pool)
        } else {
            None
        };
        Ok(TraversalExecutor { pool })
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Maps every component through `job` and folds the results in
    /// declared order with `collect_to`, then applies `finish` once.
    pub fn execute_query<T, R, S, F>(
        &self,
        components: &[T],
        job: F,
        initial: &S,
        collect_to: fn(&R, &mut S),
        finish: fn(&mut S, usize),
    ) -> Result<S>
    where
        T: Sync,
        R: Send,
        S: Clone,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let mut answer = initial.clone();
        if let Some(pool) = &self.pool {
            let list: Vec<Result<R>> =
                pool.install(|| components.par_iter().map(|c| job(c)).collect());
            for result in list {
                collect_to(&result?, &mut answer);
            }
        } else {
            for component in components {
                let result = job(component)?;
                collect_to(&result, &mut answer);
            }
        }
        finish(&mut answer, components.len());
        Ok(answer)
    }

    /// Converging variant: sequential execution stops at the first merge
    /// that reports convergence; parallel execution submits pool-sized
    /// batches and applies every in-flight result before it stops
    /// submitting.
    pub fn execute_accumulating<T, R, A, F>(
        &self,
        components: &[T],
        job: F,
        accumulator: &mut A,
    ) -> Result<()>
    where
        T: Sync,
        R: Send,
        A: ConvergingAccumulator<R>,
        F: Fn(&T) -> Result<R> + Sync,
    {
        if let Some(pool) = &self.pool {
            let batch = usize::max(pool.current_num_threads(), 1);
            for chunk in components.chunks(batch) {
                let list: Vec<Result<R>> =
                    pool.install(|| chunk.par_iter().map(|c| job(c)).collect());
                for result in list {
                    accumulator.accept(result?);
                }
                if accumulator.is_converged() {
                    break;
                }
            }
        } else {
            for component in components {
                accumulator.accept(job(component)?);
                if accumulator.is_converged() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Mutates every component; each component owns its tree and sampler,
    /// so updates are embarrassingly parallel. The caller settles the
    /// shared reference counts afterwards, single-threaded.
    pub fn execute_update<T, F>(
        &self,
        components: &mut [T],
        job: F,
    ) -> Vec<Result<UpdateResult>>
    where
        T: Send,
        F: Fn(&mut T) -> Result<UpdateResult> + Sync,
    {
        if let Some(pool) = &self.pool {
            pool.install(|| components.par_iter_mut().map(|c| job(c)).collect())
        } else {
            components.iter_mut().map(|c| job(c)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_requires_minimum_values() {
        let mut accumulator = OneSidedAccumulator::new(0.5, 3);
        accumulator.accept(1.0);
        assert!(!accumulator.is_converged());
        accumulator.accept(1.0);
        accumulator.accept(1.0);
        // identical values have zero deviation
        assert!(accumulator.is_converged());
        assert_eq!(accumulator.values_accepted(), 3);
        assert!((accumulator.accumulated_value() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sequential_and_parallel_reduce_identically() {
        let components: Vec<f64> = (0..17).map(|i| i as f64).collect();
        let job = |x: &f64| -> Result<f64> { Ok(*x * 2.0) };
        let sequential = TraversalExecutor::new(false, 0).unwrap();
        let parallel = TraversalExecutor::new(true, 4).unwrap();
        let add = |a: &f64, b: &mut f64| *b += *a;
        let noop = |_: &mut f64, _: usize| {};
        let a = sequential
            .execute_query(&components, job, &0.0, add, noop)
            .unwrap();
        let b = parallel
            .execute_query(&components, job, &0.0, add, noop)
            .unwrap();
        assert_eq!(a, b);
    }
}
