//! Dual-priority mailbox used by every actor.
//!
//! A mailbox holds two FIFO queues. Receivers always drain the high-priority
//! queue before taking anything from the low-priority one. Senders never
//! block; a closed mailbox hands the message back inside [`MailboxClosed`] so
//! the sender can route it elsewhere.
//!
//! Closing is one-way. The closed flag is checked under the same lock as the
//! queues, so a send either lands before the close or is rejected.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Message priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Control traffic (shutdown, estimates, inspection)
    High,
    /// Client work
    Low,
}

/// A send was rejected because the mailbox is closed.
///
/// Carries the rejected message back to the caller.
pub struct MailboxClosed<M>(pub M);

impl<M> MailboxClosed<M> {
    /// Take the rejected message back
    pub fn into_inner(self) -> M {
        self.0
    }
}

impl<M> fmt::Debug for MailboxClosed<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxClosed").finish_non_exhaustive()
    }
}

impl<M> fmt::Display for MailboxClosed<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mailbox is closed")
    }
}

impl<M> std::error::Error for MailboxClosed<M> {}

struct Queues<M> {
    high: VecDeque<M>,
    low: VecDeque<M>,
    closed: bool,
}

impl<M> Queues<M> {
    fn pop(&mut self) -> Option<M> {
        self.high.pop_front().or_else(|| self.low.pop_front())
    }

    fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }
}

/// Thread-safe two-queue mailbox with a single async receiver.
pub struct Mailbox<M> {
    queues: Mutex<Queues<M>>,
    notify: Notify,
}

impl<M> Mailbox<M> {
    /// Create an open, empty mailbox
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues {
                high: VecDeque::new(),
                low: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn queues(&self) -> MutexGuard<'_, Queues<M>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue with the given priority.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`MailboxClosed`] if the mailbox is closed.
    pub fn send(&self, priority: Priority, message: M) -> Result<(), MailboxClosed<M>> {
        self.send_with(priority, message, |message| message)
    }

    /// Enqueue `payload` wrapped into a message by `wrap`.
    ///
    /// `wrap` only runs once the send is accepted; a rejected send hands back
    /// the bare payload.
    ///
    /// # Errors
    ///
    /// Returns the payload inside [`MailboxClosed`] if the mailbox is closed.
    pub fn send_with<T>(&self, priority: Priority, payload: T, wrap: impl FnOnce(T) -> M) -> Result<(), MailboxClosed<T>> {
        {
            let mut queues = self.queues();
            if queues.closed {
                return Err(MailboxClosed(payload));
            }
            let message = wrap(payload);
            match priority {
                Priority::High => queues.high.push_back(message),
                Priority::Low => queues.low.push_back(message),
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueue a control message.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`MailboxClosed`] if the mailbox is closed.
    pub fn send_high(&self, message: M) -> Result<(), MailboxClosed<M>> {
        self.send(Priority::High, message)
    }

    /// Enqueue client work.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`MailboxClosed`] if the mailbox is closed.
    pub fn send_low(&self, message: M) -> Result<(), MailboxClosed<M>> {
        self.send(Priority::Low, message)
    }

    /// Dequeue without waiting.
    pub fn try_recv(&self) -> Option<M> {
        self.queues().pop()
    }

    /// Wait until a message is available and dequeue it.
    ///
    /// Intended for the mailbox's single owning actor. Messages already
    /// queued when the mailbox is closed are still delivered.
    pub async fn recv(&self) -> M {
        loop {
            if let Some(message) = self.try_recv() {
                return message;
            }
            // `notify_one` stores a permit when nobody waits, so a send that
            // races with this point is not lost.
            self.notify.notified().await;
        }
    }

    /// Stop accepting messages. Idempotent.
    pub fn close(&self) {
        self.queues().closed = true;
    }

    /// Close the mailbox only if both queues are empty.
    ///
    /// Returns whether the mailbox is now closed and empty. The check and the
    /// close happen under one lock, so no message can slip in between.
    pub fn close_if_empty(&self) -> bool {
        let mut queues = self.queues();
        if queues.is_empty() {
            queues.closed = true;
            true
        } else {
            false
        }
    }

    /// Whether the mailbox has been closed
    pub fn is_closed(&self) -> bool {
        self.queues().closed
    }

    /// Whether both queues are empty
    pub fn is_empty(&self) -> bool {
        self.queues().is_empty()
    }

    /// Total number of queued messages
    pub fn len(&self) -> usize {
        let queues = self.queues();
        queues.high.len() + queues.low.len()
    }
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.queues();
        f.debug_struct("Mailbox")
            .field("high", &queues.high.len())
            .field("low", &queues.low.len())
            .field("closed", &queues.closed)
            .finish()
    }
}
