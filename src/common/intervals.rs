use std::fmt::Debug;

use crate::errors::{ForestError, Result};

/// A free-list of indices kept as a stack of disjoint `[start, end]`
/// intervals. Freshly constructed stores have one interval covering the
/// whole capacity, so the structure stays tiny until churn fragments it;
/// releases re-coalesce against the top interval.
pub struct IntervalManager<T> {
    capacity: usize,
    last_in_use: usize,
    free_start: Vec<T>,
    free_end: Vec<T>,
}

impl<T: Copy + TryFrom<usize> + PartialEq> IntervalManager<T>
where
    usize: From<T>,
    <T as TryFrom<usize>>::Error: Debug,
{
    pub fn new(size: usize) -> Self {
        IntervalManager {
            capacity: size,
            last_in_use: 1,
            free_start: vec![0.try_into().expect("index width too small")],
            free_end: vec![(size - 1).try_into().expect("index width too small")],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn change_capacity(&mut self, new_capacity: usize) {
        if new_capacity > self.capacity {
            let start: T = self.capacity.try_into().expect("index width too small");
            let end: T = (new_capacity - 1).try_into().expect("index width too small");
            if self.free_start.len() == self.last_in_use {
                self.free_start.resize(self.last_in_use + 1, start);
                self.free_end.resize(self.last_in_use + 1, end);
            } else {
                self.free_start[self.last_in_use] = start;
                self.free_end[self.last_in_use] = end;
            }
            self.last_in_use += 1;
            self.capacity = new_capacity;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_in_use == 0
    }

    pub fn get(&mut self) -> Result<usize> {
        if self.is_empty() {
            return Err(ForestError::CapacityExceeded {
                msg: "no free indices left",
            });
        }
        let answer = self.free_start[self.last_in_use - 1];
        let value: usize = answer.into();
        if answer == self.free_end[self.last_in_use - 1] {
            self.last_in_use -= 1;
        } else {
            self.free_start[self.last_in_use - 1] =
                (value + 1).try_into().expect("index width too small");
        }
        Ok(value)
    }

    pub fn release(&mut self, index: usize) {
        let val: T = index.try_into().expect("index width too small");
        if self.last_in_use != 0 {
            let start: usize = self.free_start[self.last_in_use - 1].into();
            let end: usize = self.free_end[self.last_in_use - 1].into();
            if start == index + 1 {
                self.free_start[self.last_in_use - 1] = val;
                return;
            } else if end + 1 == index {
                self.free_end[self.last_in_use - 1] = val;
                return;
            }
        }
        if self.last_in_use < self.free_start.len() {
            self.free_start[self.last_in_use] = val;
            self.free_end[self.last_in_use] = val;
        } else {
            self.free_start.resize(self.last_in_use + 1, val);
            self.free_end.resize(self.last_in_use + 1, val);
        }
        self.last_in_use += 1;
    }

    /// Number of indices currently vended.
    pub fn used(&self) -> usize {
        let mut free = 0;
        for i in 0..self.last_in_use {
            let start: usize = self.free_start[i].into();
            let end: usize = self.free_end[i].into();
            free += end - start + 1;
        }
        self.capacity - free
    }

    pub fn size_in_bytes(&self) -> usize {
        self.free_start.len() * 2 * std::mem::size_of::<T>()
            + std::mem::size_of::<IntervalManager<T>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vends_and_reclaims() {
        let mut manager: IntervalManager<u16> = IntervalManager::new(4);
        let a = manager.get().unwrap();
        let b = manager.get().unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.used(), 2);
        manager.release(a);
        assert_eq!(manager.used(), 1);
        // the released index is available again before the untouched tail
        let c = manager.get().unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut manager: IntervalManager<u8> = IntervalManager::new(2);
        manager.get().unwrap();
        manager.get().unwrap();
        assert!(matches!(
            manager.get(),
            Err(ForestError::CapacityExceeded { .. })
        ));
        manager.change_capacity(3);
        assert!(manager.get().is_ok());
    }

    #[test]
    fn coalesces_adjacent_releases() {
        let mut manager: IntervalManager<usize> = IntervalManager::new(8);
        let indices: Vec<usize> = (0..8).map(|_| manager.get().unwrap()).collect();
        for &i in indices.iter() {
            manager.release(i);
        }
        assert_eq!(manager.used(), 0);
        for _ in 0..8 {
            manager.get().unwrap();
        }
        assert!(manager.get().is_err());
    }
}
