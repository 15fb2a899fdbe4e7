//! Waiting queue and the compatibility matcher that scans it.

use std::{collections::VecDeque, time::Duration};

use rand::{Rng, seq::IndexedRandom};
use tokio::time::Instant;

use crate::{profile::Profile, protocol::ConnId};

#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub handle: ConnId,
    pub profile: Profile,
    pub enqueued_at: Instant,
}

/// Connections looking for a partner, oldest first.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    entries: VecDeque<WaitingEntry>,
}

impl WaitingQueue {
    pub fn push(&mut self, entry: WaitingEntry) {
        debug_assert!(!self.contains(entry.handle));
        self.entries.push_back(entry);
    }

    pub fn contains(&self, handle: ConnId) -> bool {
        self.entries.iter().any(|entry| entry.handle == handle)
    }

    pub fn remove(&mut self, handle: ConnId) -> Option<WaitingEntry> {
        let index = self.entries.iter().position(|entry| entry.handle == handle)?;
        self.entries.remove(index)
    }

    /// Picks the partner for `profile`: every bidirectionally compatible
    /// entry is scored by interest overlap, and one of the best is drawn at
    /// random.
    pub fn best_candidate<R: Rng + ?Sized>(
        &self,
        handle: ConnId,
        profile: &Profile,
        min_shared: usize,
        rng: &mut R,
    ) -> Option<ConnId> {
        let mut best = 0;
        let mut tied = Vec::new();

        for entry in &self.entries {
            if entry.handle == handle || !profile.compatible_with(&entry.profile) {
                continue;
            }
            let score = profile.score(&entry.profile);
            if score < min_shared {
                continue;
            }
            if tied.is_empty() || score > best {
                best = score;
                tied.clear();
            }
            if score == best {
                tied.push(entry.handle);
            }
        }

        tied.choose(rng).copied()
    }

    /// Removes entries that waited longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<WaitingEntry> {
        let (expired, kept): (VecDeque<_>, VecDeque<_>) = self
            .entries
            .drain(..)
            .partition(|entry| now.saturating_duration_since(entry.enqueued_at) > timeout);
        self.entries = kept;
        expired.into()
    }

    /// Drops the oldest entries until at most `cap` remain.
    pub fn trim_to(&mut self, cap: usize) -> Vec<WaitingEntry> {
        let excess = self.entries.len().saturating_sub(cap);
        self.entries.drain(..excess).collect()
    }

    pub fn handles(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.entries.iter().map(|entry| entry.handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
