//! Bounded top-K selection
//!
//! A min-heap of at most `k` hits whose root is always the weakest retained
//! hit, so each candidate costs one comparison and at most one O(log k)
//! sift. "Weakest" means lowest score, and among equal scores the highest
//! record id, which makes the retained set independent of stream order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::RankedHit;

#[derive(Debug)]
struct Ranked(RankedHit);

impl Ranked {
    /// Greater means ranks higher: better score, then lower id
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.corpus_record_id.cmp(&self.0.corpus_record_id))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

#[derive(Debug)]
pub struct TopK {
    capacity: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl TopK {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(4096).saturating_add(1)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the weakest retained hit once the structure is full
    #[inline]
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.capacity {
            None
        } else {
            self.heap.peek().map(|Reverse(weakest)| weakest.0.score)
        }
    }

    /// Offer a hit; returns whether it was retained
    #[inline]
    pub fn offer(&mut self, hit: RankedHit) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let candidate = Ranked(hit);

        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(candidate));
            return true;
        }

        match self.heap.peek_mut() {
            Some(mut weakest) if candidate > weakest.0 => {
                *weakest = Reverse(candidate);
                true
            }
            _ => false,
        }
    }

    /// Drain into a list sorted by descending score, then ascending id
    #[inline]
    pub fn into_sorted_vec(self) -> Vec<RankedHit> {
        // Ascending order of Reverse<_> is descending rank.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| ranked.0)
            .collect()
    }
}
