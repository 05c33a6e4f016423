//! Bounded soft-delete journal for catalog entries.
//!
//! Expiry is checked lazily on [`RecentlyDeleted::take`]; `purge_expired`
//! only bounds memory and is never needed for correctness.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Why a `take` found nothing to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMiss {
    Absent,
    Expired,
}

#[derive(Debug)]
struct Stashed<V> {
    value: V,
    deleted_at: DateTime<Utc>,
    seq: u64,
}

/// Recently deleted values keyed by id, each restorable for `ttl`.
#[derive(Debug)]
pub struct RecentlyDeleted<K, V> {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<K, Stashed<V>>,
    // Insertion order for eviction. May hold stale (key, seq) pairs.
    order: VecDeque<(K, u64)>,
    next_seq: u64,
}

impl<K, V> RecentlyDeleted<K, V>
where
    K: Eq + Hash + Copy,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Remember `value` as deleted at `now`, evicting the oldest entry when full.
    pub fn stash(&mut self, key: K, value: V, now: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Stashed {
                value,
                deleted_at: now,
                seq,
            },
        );
        self.order.push_back((key, seq));

        while self.entries.len() > self.capacity {
            let Some((oldest, oldest_seq)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&oldest).is_some_and(|e| e.seq == oldest_seq) {
                self.entries.remove(&oldest);
            }
        }
        if self.order.len() > self.capacity * 2 {
            let entries = &self.entries;
            self.order
                .retain(|(k, s)| entries.get(k).is_some_and(|e| e.seq == *s));
        }
    }

    /// Remove and return the value for `key` if it is still within the window.
    pub fn take(&mut self, key: &K, now: DateTime<Utc>) -> Result<V, JournalMiss> {
        self.take_stamped(key, now).map(|(value, _)| value)
    }

    /// Like [`take`](Self::take), also returning when the value was deleted,
    /// so a failed restore can stash it back without extending its window.
    pub fn take_stamped(
        &mut self,
        key: &K,
        now: DateTime<Utc>,
    ) -> Result<(V, DateTime<Utc>), JournalMiss> {
        let stashed = self.entries.remove(key).ok_or(JournalMiss::Absent)?;
        if now - stashed.deleted_at > self.ttl {
            return Err(JournalMiss::Expired);
        }
        Ok((stashed.value, stashed.deleted_at))
    }

    /// Drop every entry older than the window; returns how many were dropped.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| now - e.deleted_at <= ttl);
        let entries = &self.entries;
        self.order
            .retain(|(k, s)| entries.get(k).is_some_and(|e| e.seq == *s));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
