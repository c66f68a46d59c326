// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monotonic identifier sequences.
//!
//! Every counter in the runtime (channel ids, token ids, session ids,
//! subscription ids, monitored item ids, notification sequence numbers) is an
//! [`IdSequence`] owned by whoever hands the ids out, or shared through a
//! [`SharedSequence`] when several owners must draw from one counter.
//!
//! ```text
//!   1 → 2 → 3 → … → u32::MAX → 1 → 2 …   (0 is never produced)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// A sequence shared between several owners.
pub type SharedSequence = Arc<IdSequence>;

/// Strictly increasing `u32` sequence that skips zero on wrap-around.
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicU32,
}

impl IdSequence {
    /// Creates a sequence whose first value is 1.
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a sequence whose first value is `first` (zero is bumped to 1).
    pub const fn starting_at(first: u32) -> Self {
        let first = if first == 0 { 1 } else { first };
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Creates a shareable sequence starting at 1.
    pub fn shared() -> SharedSequence {
        Arc::new(Self::new())
    }

    /// Returns the next value and advances the sequence.
    pub fn next(&self) -> u32 {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let following = Self::successor(current);
            match self.next.compare_exchange_weak(
                current,
                following,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the value the next call to [`next`](Self::next) will produce.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    /// Returns the value that follows `value`, wrapping `u32::MAX` to 1.
    #[inline]
    pub const fn successor(value: u32) -> u32 {
        if value == u32::MAX { 1 } else { value + 1 }
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let seq = IdSequence::new();
        assert_eq!(seq.peek(), 1);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.peek(), 3);
    }

    #[test]
    fn test_wraps_to_one() {
        let seq = IdSequence::starting_at(u32::MAX - 1);
        assert_eq!(seq.next(), u32::MAX - 1);
        assert_eq!(seq.next(), u32::MAX);
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn test_zero_start_is_bumped() {
        assert_eq!(IdSequence::starting_at(0).next(), 1);
    }

    #[test]
    fn test_shared_sequence_is_strictly_increasing_across_threads() {
        let seq = IdSequence::shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..1000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(all[0], 1);
        assert_eq!(all[3999], 4000);
    }
}
