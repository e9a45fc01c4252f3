use std::fmt::Debug;

use crate::errors::Result;
use crate::pointstore::{CompactPointStore, PointStore};
use crate::sampledtree::sampled_tree::UpdateResult;
use crate::types::Location;
use crate::util::sanitize;

/// Owns the shared point store and the forest's sequence counter. Every
/// update is installed once, handed to all components under the same
/// `(reference, sequence)` pair, and the reference counts are settled in a
/// single-threaded pass after the components report back.
pub struct UpdateCoordinator<L>
where
    L: Location,
{
    point_store: CompactPointStore<L>,
    total_updates: u64,
    number_of_components: usize,
}

impl<L> UpdateCoordinator<L>
where
    L: Location,
    usize: From<L>,
    <L as TryFrom<usize>>::Error: Debug,
{
    pub fn new(point_store: CompactPointStore<L>, number_of_components: usize) -> Self {
        UpdateCoordinator {
            point_store,
            total_updates: 0,
            number_of_components,
        }
    }

    /// Normalizes and installs an input point. Returns the reference and
    /// the sequence index all components must observe, or `None` while an
    /// internal shingle is warming up.
    pub fn init_update(&mut self, point: &[f32]) -> Result<Option<(usize, u64)>> {
        let clean = sanitize(point);
        match self.point_store.add(&clean)? {
            Some(reference) => {
                let sequence_index = self.total_updates;
                Ok(Some((reference, sequence_index)))
            }
            None => Ok(None),
        }
    }

    /// Settles reference counts from the per-component results: one
    /// increment per retained reference, one decrement per eviction, and
    /// finally the installation count itself is released. Runs on one
    /// thread regardless of how the components executed.
    pub fn complete_update(
        &mut self,
        results: &[Result<UpdateResult>],
        reference: usize,
    ) -> Result<()> {
        for result in results {
            let result = result.as_ref().map_err(|e| e.clone())?;
            if let Some(added) = result.added {
                self.point_store.inc(added)?;
                if let Some(deleted) = result.deleted {
                    self.point_store.dec(deleted)?;
                }
            }
        }
        self.point_store.dec(reference)?;
        self.total_updates += 1;
        Ok(())
    }

    /// Counts a warmup input that never produced a reference.
    pub fn complete_warmup_update(&mut self) {
        self.total_updates += 1;
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    pub fn number_of_components(&self) -> usize {
        self.number_of_components
    }

    pub fn point_store(&self) -> &CompactPointStore<L> {
        &self.point_store
    }

    pub fn point_store_mut(&mut self) -> &mut CompactPointStore<L> {
        &mut self.point_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_zero_is_normalized_before_storage() {
        let store: CompactPointStore<usize> =
            CompactPointStore::new(2, 1, 16, 4, false, false).unwrap();
        let mut coordinator = UpdateCoordinator::new(store, 1);
        let (reference, sequence) = coordinator
            .init_update(&[-0.0, 1.0])
            .unwrap()
            .expect("no warmup without shingling");
        assert_eq!(sequence, 0);
        let stored = coordinator.point_store().copy(reference).unwrap();
        assert_eq!(stored[0].to_bits(), 0.0f32.to_bits());
    }

    #[test]
    fn rejected_updates_release_the_installation_count() {
        let store: CompactPointStore<usize> =
            CompactPointStore::new(1, 1, 16, 4, false, false).unwrap();
        let mut coordinator = UpdateCoordinator::new(store, 2);
        let (reference, _) = coordinator.init_update(&[5.0]).unwrap().unwrap();
        // neither component admitted the point
        let results = vec![Ok(UpdateResult::noop()), Ok(UpdateResult::noop())];
        coordinator.complete_update(&results, reference).unwrap();
        assert!(coordinator.point_store().copy(reference).is_err());
        assert_eq!(coordinator.total_updates(), 1);
    }

    #[test]
    fn admissions_keep_the_reference_alive() {
        let store: CompactPointStore<usize> =
            CompactPointStore::new(1, 1, 16, 4, false, false).unwrap();
        let mut coordinator = UpdateCoordinator::new(store, 2);
        let (reference, _) = coordinator.init_update(&[5.0]).unwrap().unwrap();
        let results = vec![
            Ok(UpdateResult {
                added: Some(reference),
                deleted: None,
            }),
            Ok(UpdateResult::noop()),
        ];
        coordinator.complete_update(&results, reference).unwrap();
        assert!(coordinator.point_store().copy(reference).is_ok());
    }
}
