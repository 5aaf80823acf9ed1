//! Typed observer events
//!
//! Consumers subscribe to a board or to the board manager and receive
//! events over unbounded channels. Dropping a receiver unsubscribes it;
//! closed channels are pruned on the next emit.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::models::{Forum, Post, Thread, Vars};
use crate::parser::ParserError;

/// Events emitted by a [`Board`](crate::Board) to its observers
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A login attempt completed. The bag carries the protocol's raw
    /// response: a `success` flag plus protocol-specific fields.
    Login {
        /// Raw response parameters from the adapter
        params: Vars,
    },
    /// A forum list arrived outside of a crawl
    ForumList {
        /// The forums delivered by the adapter
        forums: Vec<Forum>,
    },
    /// A thread list arrived
    ThreadList {
        /// The forum, with threads and paging populated
        forum: Forum,
        /// Whether the result matches the board's current-forum cursor.
        /// Stale results are still delivered; consumers decide whether to
        /// ignore them.
        matches_current: bool,
    },
    /// A post list arrived
    PostList {
        /// The thread, with posts and paging populated
        thread: Thread,
        /// Whether the result matches the board's current-thread cursor
        matches_current: bool,
    },
    /// The flat list of forums with unread content was refreshed
    UnreadForums {
        /// Forums currently holding unread content
        forums: Vec<Forum>,
    },
    /// The server acknowledged marking a forum read
    ForumMarkedRead {
        /// The forum that was marked read
        forum: Forum,
    },
    /// A submitted thread was accepted
    NewThread {
        /// The thread, with its server-assigned id
        thread: Thread,
    },
    /// A submitted post was accepted
    NewPost {
        /// The post, with its server-assigned id
        post: Post,
    },
    /// A request failed. Forwarded verbatim; the board treats the
    /// operation as failed-and-dropped.
    RequestError {
        /// The adapter's error payload
        error: ParserError,
    },
    /// The server's forum layout no longer matches the stored tree. The
    /// consumer's remedy is a full remove and re-add of the board.
    StructureChanged,
}

/// Events emitted by the [`BoardManager`](crate::BoardManager).
///
/// Add/remove events come in begin/end pairs so list-model consumers can
/// bracket their own mutations.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A board is about to be inserted at `index`
    BeginAddBoard {
        /// Insertion position in the ordered collection
        index: usize,
    },
    /// The pending insertion completed
    EndAddBoard,
    /// The board at `index` is about to be removed
    BeginRemoveBoard {
        /// Position of the board being removed
        index: usize,
    },
    /// The pending removal completed
    EndRemoveBoard,
}

/// A list of event subscribers sharing one event type
#[derive(Debug)]
pub struct Subscribers<E> {
    senders: Vec<UnboundedSender<E>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<E: Clone> Subscribers<E> {
    /// An empty subscriber list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer and return its receiving end
    pub fn subscribe(&mut self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver an event to every live observer, pruning closed ones
    pub fn emit(&mut self, event: &E) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live observers at the last emit
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether anyone is subscribed
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let mut subs: Subscribers<ManagerEvent> = Subscribers::new();
        let mut rx1 = subs.subscribe();
        let mut rx2 = subs.subscribe();

        subs.emit(&ManagerEvent::EndAddBoard);

        assert!(matches!(rx1.try_recv(), Ok(ManagerEvent::EndAddBoard)));
        assert!(matches!(rx2.try_recv(), Ok(ManagerEvent::EndAddBoard)));
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let mut subs: Subscribers<ManagerEvent> = Subscribers::new();
        let rx = subs.subscribe();
        let _live = subs.subscribe();
        drop(rx);

        subs.emit(&ManagerEvent::EndRemoveBoard);
        assert_eq!(subs.len(), 1);
    }
}
