//! # Customer Queue
//!
//! Ordered recipient list plus the cursor marking dispatch progress.
//! Owned exclusively by the dispatcher loop, so no locking.

use crate::domain::error::{DispatchError, DispatchResult};
use crate::domain::types::Customer;

/// One step handed out by [`CustomerQueue::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// `position` is 1-based, for display.
    Next {
        customer: Customer,
        position: usize,
        total: usize,
    },
    Exhausted,
}

#[derive(Debug, Default)]
pub struct CustomerQueue {
    items: Vec<Customer>,
    cursor: usize,
}

impl CustomerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the queue and rewinds the cursor.
    /// An empty list is loaded anyway; the `EmptyList` error is only a warning.
    pub fn load(&mut self, items: Vec<Customer>) -> DispatchResult<()> {
        self.items = items;
        self.cursor = 0;
        if self.items.is_empty() {
            return Err(DispatchError::EmptyList);
        }
        Ok(())
    }

    pub fn next(&mut self) -> QueueItem {
        match self.items.get(self.cursor) {
            Some(customer) => {
                let customer = customer.clone();
                self.cursor += 1;
                QueueItem::Next {
                    customer,
                    position: self.cursor,
                    total: self.items.len(),
                }
            }
            None => QueueItem::Exhausted,
        }
    }

    /// The recipient `next` would hand out, without advancing.
    pub fn peek(&self) -> Option<&Customer> {
        self.items.get(self.cursor)
    }

    /// Appends a recipient for a later attempt. Keeps `done == (cursor == len)`.
    pub fn push_back(&mut self, customer: Customer) {
        self.items.push(customer);
    }

    /// Moves the cursor to a previously checkpointed position, clamped to the list length.
    pub fn resume_at(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.items.len());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_done(&self) -> bool {
        self.cursor == self.items.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|c| c.id.clone()).collect()
    }
}
