// SPDX-License-Identifier: MIT
/*
 * Copyright (c) [2023 - Present] Emily Matheys <emilymatt96@gmail.com>
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! A fixed-block-size memory pool with scoped checkout handles.
//!
//! The original toolbox's `memory_pool.hpp` hands out raw blocks from a
//! mutex-guarded queue with manual `allocate`/`deallocate` calls. This port
//! keeps the contract (fixed block size, growth batch, max cached blocks)
//! but replaces the raw-pointer interface with a typed slab: [`Pool::checkout`]
//! returns a [`Block`] handle that returns its buffer to the pool on `Drop`,
//! so a forgotten `deallocate` can't leak a slot.
//!
//! Used by the parallel SPFH accumulation path in
//! [`crate::descriptors::Fpfh`], which checks out one [`Pool::checkout`]
//! block per point instead of allocating a fresh histogram buffer on every
//! rayon work item.

use std::sync::Mutex;

/// A fixed-block-size pool of `Vec<T>` scratch buffers.
///
/// `allocate` (internally, on a miss) grows the cache by `growth_batch`
/// blocks, up to `max_cached`; beyond that cap, checked-out blocks are
/// simply dropped instead of being returned to the cache. The pool is
/// thread-safe via an internal mutex, matching the source's "mutex-guarded
/// queue of raw blocks".
pub struct Pool<T: Default + Clone> {
    block_size: usize,
    growth_batch: usize,
    max_cached: usize,
    cache: Mutex<Vec<Vec<T>>>,
}

impl<T: Default + Clone> Pool<T> {
    /// Builds a pool whose blocks each hold `block_size` elements,
    /// pre-populated with `initial_count` blocks, growing by
    /// `growth_batch` on exhaustion up to `max_cached` cached blocks.
    pub fn new(block_size: usize, initial_count: usize, growth_batch: usize, max_cached: usize) -> Self {
        let cache = (0..initial_count).map(|_| vec![T::default(); block_size]).collect();
        Self {
            block_size,
            growth_batch: growth_batch.max(1),
            max_cached,
            cache: Mutex::new(cache),
        }
    }

    /// Checks out a block, growing the cache by `growth_batch` fresh blocks
    /// first if it was empty.
    pub fn checkout(&self) -> Block<'_, T> {
        let mut cache = self.cache.lock().expect("pool mutex poisoned");
        if cache.is_empty() {
            for _ in 0..self.growth_batch {
                cache.push(vec![T::default(); self.block_size]);
            }
        }
        let buffer = cache.pop().unwrap_or_else(|| vec![T::default(); self.block_size]);
        drop(cache);
        Block { pool: self, buffer: Some(buffer) }
    }

    /// Returns a block to the cache, unless the cache is already at
    /// `max_cached`, in which case it is dropped instead.
    fn release(&self, mut buffer: Vec<T>) {
        let mut cache = self.cache.lock().expect("pool mutex poisoned");
        if cache.len() < self.max_cached {
            buffer.iter_mut().for_each(|v| *v = T::default());
            cache.push(buffer);
        }
    }

    /// Number of blocks currently cached (not checked out).
    pub fn cached_count(&self) -> usize {
        self.cache.lock().expect("pool mutex poisoned").len()
    }
}

/// A scoped checkout handle; its backing buffer is returned to the owning
/// [`Pool`] when this handle is dropped.
pub struct Block<'a, T: Default + Clone> {
    pool: &'a Pool<T>,
    buffer: Option<Vec<T>>,
}

impl<T: Default + Clone> std::ops::Deref for Block<'_, T> {
    type Target = Vec<T>;
    fn deref(&self) -> &Vec<T> {
        self.buffer.as_ref().expect("buffer taken before drop")
    }
}

impl<T: Default + Clone> std::ops::DerefMut for Block<'_, T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        self.buffer.as_mut().expect("buffer taken before drop")
    }
}

impl<T: Default + Clone> Drop for Block<'_, T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_and_drop_returns_the_block_to_the_cache() {
        let pool: Pool<f64> = Pool::new(16, 2, 2, 8);
        assert_eq!(pool.cached_count(), 2);
        {
            let _block = pool.checkout();
            assert_eq!(pool.cached_count(), 1);
        }
        assert_eq!(pool.cached_count(), 2);
    }

    #[test]
    fn exhaustion_grows_by_growth_batch() {
        let pool: Pool<f64> = Pool::new(4, 0, 3, 16);
        let a = pool.checkout();
        let b = pool.checkout();
        assert_eq!(pool.cached_count(), 1);
        drop(a);
        drop(b);
        assert_eq!(pool.cached_count(), 3);
    }

    #[test]
    fn blocks_beyond_max_cached_are_dropped_not_retained() {
        let pool: Pool<f64> = Pool::new(4, 0, 4, 1);
        let blocks: Vec<_> = (0..4).map(|_| pool.checkout()).collect();
        drop(blocks);
        assert_eq!(pool.cached_count(), 1);
    }

    #[test]
    fn checked_out_buffer_has_the_configured_block_size() {
        let pool: Pool<f64> = Pool::new(32, 1, 1, 4);
        let block = pool.checkout();
        assert_eq!(block.len(), 32);
    }
}
