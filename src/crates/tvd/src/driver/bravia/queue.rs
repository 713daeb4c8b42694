//! Per-command response queues.
//!
//! Answers in this protocol carry no sequence number; the only correlation
//! signal is the order in which requests for the same four-letter command
//! identifier were issued.  The dispatcher pushes a reply slot *before*
//! writing each request, the reader pops the oldest slot when the matching
//! answer arrives.
//!
//! A slot whose request deadline expired is replaced by a poison marker so
//! the answer that eventually arrives is discarded instead of being matched
//! to a later request.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use super::super::DriverError;

/// The two halves a pending request is waiting on: the caller's reply and
/// the dispatcher's permission to move to the next request.
pub(crate) struct ReplySlot {
    pub reply: oneshot::Sender<Result<(), DriverError>>,
    pub done: oneshot::Sender<()>,
}

impl ReplySlot {
    /// Delivers the outcome to the caller and releases the dispatcher.
    /// Either receiver may already be gone; that is fine.
    pub fn complete(self, result: Result<(), DriverError>) {
        let _ = self.reply.send(result);
        let _ = self.done.send(());
    }
}

pub(crate) enum QueueEntry {
    Live(ReplySlot),
    /// Placeholder for a request whose deadline expired.  Consumes exactly
    /// one arriving answer.
    Poisoned,
}

/// All pending reply slots for one connection, keyed by command identifier.
#[derive(Default)]
pub(crate) struct ResponseQueues {
    queues: HashMap<String, VecDeque<QueueEntry>>,
}

impl ResponseQueues {
    pub fn push(&mut self, id: &str, slot: ReplySlot) {
        self.queues
            .entry(id.to_string())
            .or_default()
            .push_back(QueueEntry::Live(slot));
    }

    /// Pops the oldest entry for `id`, if any.
    pub fn pop(&mut self, id: &str) -> Option<QueueEntry> {
        let queue = self.queues.get_mut(id)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(id);
        }
        entry
    }

    /// Poisons the newest live entry for `id` and hands back its slot so
    /// the caller can be failed with a timeout.
    pub fn poison_newest(&mut self, id: &str) -> Option<ReplySlot> {
        let queue = self.queues.get_mut(id)?;
        let entry = queue
            .iter_mut()
            .rev()
            .find(|e| matches!(e, QueueEntry::Live(_)))?;
        match std::mem::replace(entry, QueueEntry::Poisoned) {
            QueueEntry::Live(slot) => Some(slot),
            QueueEntry::Poisoned => None,
        }
    }

    /// Removes every entry, returning the live slots.  Used when the
    /// connection dies: pending replies do not carry across connections.
    pub fn drain(&mut self) -> Vec<ReplySlot> {
        let mut slots = Vec::new();
        for (_, queue) in self.queues.drain() {
            for entry in queue {
                if let QueueEntry::Live(slot) = entry {
                    slots.push(slot);
                }
            }
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> (ReplySlot, oneshot::Receiver<Result<(), DriverError>>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (done_tx, _done_rx) = oneshot::channel();
        (
            ReplySlot {
                reply: reply_tx,
                done: done_tx,
            },
            reply_rx,
        )
    }

    #[test]
    fn test_pop_returns_entries_in_push_order() {
        let mut queues = ResponseQueues::default();
        let (s1, mut r1) = slot();
        let (s2, mut r2) = slot();
        queues.push("VOLU", s1);
        queues.push("VOLU", s2);

        match queues.pop("VOLU") {
            Some(QueueEntry::Live(slot)) => slot.complete(Ok(())),
            _ => panic!("expected the first live slot"),
        }
        assert!(matches!(r1.try_recv(), Ok(Ok(()))));
        assert!(r2.try_recv().is_err(), "second slot must still be pending");
    }

    #[test]
    fn test_queues_are_independent_per_command() {
        let mut queues = ResponseQueues::default();
        let (s1, _r1) = slot();
        queues.push("VOLU", s1);
        assert!(queues.pop("POWR").is_none());
        assert!(queues.pop("VOLU").is_some());
        assert!(queues.pop("VOLU").is_none());
    }

    #[test]
    fn test_poison_newest_consumes_the_next_pop() {
        let mut queues = ResponseQueues::default();
        let (s1, mut r1) = slot();
        queues.push("VOLU", s1);

        let slot = queues.poison_newest("VOLU").expect("slot must be returned");
        slot.complete(Err(DriverError::Timeout));
        assert!(matches!(r1.try_recv(), Ok(Err(DriverError::Timeout))));

        // The placeholder is still queued and soaks up exactly one answer.
        assert!(matches!(queues.pop("VOLU"), Some(QueueEntry::Poisoned)));
        assert!(queues.pop("VOLU").is_none());
    }

    #[test]
    fn test_poison_newest_skips_existing_poison_markers() {
        let mut queues = ResponseQueues::default();
        let (s1, _r1) = slot();
        queues.push("VOLU", s1);
        assert!(queues.poison_newest("VOLU").is_some());
        // Only a poisoned placeholder remains.
        assert!(queues.poison_newest("VOLU").is_none());
    }

    #[test]
    fn test_drain_returns_only_live_slots() {
        let mut queues = ResponseQueues::default();
        let (s1, mut r1) = slot();
        let (s2, _r2) = slot();
        queues.push("VOLU", s1);
        queues.push("POWR", s2);
        queues.poison_newest("POWR");

        let drained = queues.drain();
        assert_eq!(drained.len(), 1);
        for slot in drained {
            slot.complete(Err(DriverError::ConnectionLost));
        }
        assert!(matches!(r1.try_recv(), Ok(Err(DriverError::ConnectionLost))));
        assert!(queues.pop("VOLU").is_none());
    }
}
