//! Subscription Registry
//!
//! Worker-owned record of active subscriptions and their per-index journal
//! state. Indices are assigned in registration order and never reused, so
//! the index the server echoes in `JOURNAL_DELTA` always names the same
//! subscription for the life of the client.

use std::collections::HashSet;

use tracing::warn;

use super::channel::Subscription;
use crate::journal::{with_writer, DeltaApplier, WriterHandle};

/// Journal bound to a subscription index
pub struct IndexedJournal {
    pub writer: WriterHandle,
    pub applier: DeltaApplier,
    /// A `DELTA_REQUEST` is outstanding for this index
    pub status_sent: bool,
    /// Rejected as incompatible on the current connection; no deltas are
    /// requested until a later resubscription accepts it
    pub suspended: bool,
    /// Created by the client's writer factory (closed on shutdown)
    pub owned: bool,
}

impl IndexedJournal {
    pub fn new(writer: WriterHandle, applier: DeltaApplier, owned: bool) -> Self {
        Self {
            writer,
            applier,
            status_sent: false,
            suspended: false,
            owned,
        }
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
    locations: HashSet<String>,
    journals: Vec<Option<IndexedJournal>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a local location. False if another subscription holds it.
    pub fn reserve_location(&mut self, location: &str) -> bool {
        self.locations.insert(location.to_string())
    }

    /// Append a subscription and return its index.
    pub fn register(&mut self, subscription: Subscription) -> usize {
        let index = self.subscriptions.len();
        self.subscriptions.push(subscription);
        self.journals.push(None);
        index
    }

    /// Index the next registration will get.
    pub fn next_index(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn subscription(&self, index: usize) -> Option<&Subscription> {
        self.subscriptions.get(index)
    }

    pub fn has_journal(&self, index: usize) -> bool {
        matches!(self.journals.get(index), Some(Some(_)))
    }

    pub fn install(&mut self, index: usize, journal: IndexedJournal) {
        if index >= self.journals.len() {
            self.journals.resize_with(index + 1, || None);
        }
        self.journals[index] = Some(journal);
    }

    pub fn journal(&self, index: usize) -> Option<&IndexedJournal> {
        self.journals.get(index).and_then(Option::as_ref)
    }

    pub fn journal_mut(&mut self, index: usize) -> Option<&mut IndexedJournal> {
        self.journals.get_mut(index).and_then(Option::as_mut)
    }

    /// Installed journals with their indices, in index order.
    pub fn journals_mut(&mut self) -> impl Iterator<Item = (usize, &mut IndexedJournal)> {
        self.journals
            .iter_mut()
            .enumerate()
            .filter_map(|(index, journal)| journal.as_mut().map(|j| (index, j)))
    }

    /// Drop every journal record, closing the writers the client created.
    /// Caller-supplied writers stay open.
    pub fn release(&mut self) {
        for (index, slot) in self.journals.iter_mut().enumerate() {
            let Some(journal) = slot.take() else {
                continue;
            };
            if journal.owned {
                if let Err(err) = with_writer(&journal.writer, |w| w.close()) {
                    warn!(index, error = %err, "Failed to close journal writer");
                }
            }
        }
    }
}
