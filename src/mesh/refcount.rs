//! Reference-counted id arena.
//!
//! [`RefCountVector`] hands out dense integer ids, tracks a reference count
//! per id, and recycles ids whose count drops to zero through a free stack.
//! A count of zero means "free"; any positive count means "live".

/// Recyclable-id table with per-slot reference counts.
#[derive(Debug, Clone, Default)]
pub struct RefCountVector {
    counts: Vec<u32>,
    free: Vec<usize>,
    used: usize,
}

impl RefCountVector {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// True if no id is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// One past the largest id ever allocated.
    #[inline]
    pub fn max_index(&self) -> usize {
        self.counts.len()
    }

    /// True if `index` is currently live.
    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        index < self.counts.len() && self.counts[index] > 0
    }

    /// Reference count of `index` (zero if free or out of range).
    #[inline]
    pub fn ref_count(&self, index: usize) -> u32 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Allocate a fresh id with a count of one, reusing a free slot if possible.
    ///
    /// Stale free-list entries (slots revived by a deferred [`allocate_at`])
    /// are skipped.
    ///
    /// [`allocate_at`]: Self::allocate_at
    pub fn allocate(&mut self) -> usize {
        while let Some(index) = self.free.pop() {
            if self.counts[index] == 0 {
                self.counts[index] = 1;
                self.used += 1;
                return index;
            }
        }
        self.counts.push(1);
        self.used += 1;
        self.counts.len() - 1
    }

    /// Allocate the specific id `index` with a count of one.
    ///
    /// Returns `false` if the slot is already live. With `deferred` set, the
    /// free stack is left untouched; call [`rebuild_free_list`] once the batch
    /// of explicit insertions is done.
    ///
    /// [`rebuild_free_list`]: Self::rebuild_free_list
    pub fn allocate_at(&mut self, index: usize, deferred: bool) -> bool {
        if index < self.counts.len() {
            if self.counts[index] != 0 {
                return false;
            }
            if !deferred {
                if let Some(pos) = self.free.iter().position(|&i| i == index) {
                    self.free.swap_remove(pos);
                }
            }
        } else {
            for gap in self.counts.len()..index {
                self.counts.push(0);
                if !deferred {
                    self.free.push(gap);
                }
            }
            self.counts.push(0);
        }
        self.counts[index] = 1;
        self.used += 1;
        true
    }

    /// Add `n` references to a live id.
    #[inline]
    pub fn increment(&mut self, index: usize, n: u32) {
        debug_assert!(self.is_valid(index), "increment of free slot {}", index);
        self.counts[index] += n;
    }

    /// Drop `n` references from a live id, freeing it when the count hits zero.
    ///
    /// Returns the remaining count.
    pub fn decrement(&mut self, index: usize, n: u32) -> u32 {
        debug_assert!(self.counts[index] >= n, "decrement below zero at {}", index);
        self.counts[index] -= n;
        if self.counts[index] == 0 {
            self.free.push(index);
            self.used -= 1;
        }
        self.counts[index]
    }

    /// Rebuild the free stack and live count from the count table.
    ///
    /// Lower ids end up on top of the stack so they are reused first.
    pub fn rebuild_free_list(&mut self) {
        self.free = (0..self.counts.len())
            .rev()
            .filter(|&i| self.counts[i] == 0)
            .collect();
        self.used = self.counts.iter().filter(|&&c| c > 0).count();
    }

    /// Iterate over live ids in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, _)| i)
    }

    /// Number of entries currently on the free stack, including stale ones.
    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }
}
