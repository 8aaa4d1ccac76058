//! Process groups that run the same renormalization pipeline in lockstep.
//!
//! Every rank of a group performs the same steps in the same order. Work that
//! has to be done once (the truncation, writing blocks to disk) is done on the
//! root rank and its outcome published to the others with
//! [`Communicator::broadcast`].
//!
//! [`SelfComm`] is the trivial group of one. [`ThreadComm`] forms a group out
//! of threads in the same process, connected by channels:
//!
//! ```text
//!            ┌──► rank 1
//!   rank 0 ──┼──► rank 2
//!   (root)   └──► ...
//!   barrier: shared by all ranks
//! ```

use std::{ any::Any, sync::{ Arc, Barrier } };
use crossbeam::channel;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum CommError {
    /// Returned on every rank when the root did not supply a value to
    /// broadcast.
    #[error("error in broadcast: root rank supplied no value")]
    MissingRootValue,

    /// Returned when the channel to or from a rank is closed.
    #[error("error in broadcast: closed channel")]
    ClosedChannel,

    /// Returned when a received message has an unexpected type.
    #[error("error in broadcast: received message of unexpected type")]
    TypeMismatch,

    /// Returned when a group of zero ranks is requested.
    #[error("error in group creation: groups must have at least one rank")]
    EmptyGroup,
}
use CommError::*;
pub type CommResult<T> = Result<T, CommError>;

/// Rank of the process that computes and publishes shared results.
pub const ROOT: usize = 0;

/// A group of ranks executing the same program.
pub trait Communicator {
    /// Index of this rank in the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Return `true` on the root rank.
    fn is_root(&self) -> bool { self.rank() == ROOT }

    /// Publish the root's value to all ranks.
    ///
    /// The root passes `Some(value)`; other ranks pass `None` (anything they
    /// pass is ignored). All ranks return the root's value. If the root passes
    /// `None`, every rank returns [`CommError::MissingRootValue`].
    fn broadcast<T>(&self, value: Option<T>) -> CommResult<T>
    where T: Clone + Send + 'static;

    /// Block until every rank of the group has reached this call.
    fn barrier(&self);
}

/// The group consisting only of the current process.
#[derive(Copy, Clone, Debug, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize { ROOT }

    fn size(&self) -> usize { 1 }

    fn broadcast<T>(&self, value: Option<T>) -> CommResult<T>
    where T: Clone + Send + 'static
    {
        value.ok_or(MissingRootValue)
    }

    fn barrier(&self) { }
}

type Message = Box<dyn Any + Send>;

/// One rank of a group of threads.
///
/// Create a whole group with [`ThreadComm::group`] and move each member into
/// its own thread.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    // root only: one sender per non-root rank
    peers: Vec<channel::Sender<Message>>,
    // non-root only
    inbox: Option<channel::Receiver<Message>>,
    barrier: Arc<Barrier>,
}

impl ThreadComm {
    /// Create the `size` members of a new group, ordered by rank.
    pub fn group(size: usize) -> CommResult<Vec<Self>> {
        if size == 0 { return Err(EmptyGroup); }
        let barrier = Arc::new(Barrier::new(size));
        let (peers, inboxes): (Vec<_>, Vec<_>)
            = (1..size).map(|_| channel::unbounded::<Message>()).unzip();
        let root = Self {
            rank: ROOT,
            size,
            peers,
            inbox: None,
            barrier: Arc::clone(&barrier),
        };
        let others
            = inboxes.into_iter().enumerate()
            .map(|(k, rx)| Self {
                rank: k + 1,
                size,
                peers: Vec::new(),
                inbox: Some(rx),
                barrier: Arc::clone(&barrier),
            });
        Ok(std::iter::once(root).chain(others).collect())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize { self.rank }

    fn size(&self) -> usize { self.size }

    fn broadcast<T>(&self, value: Option<T>) -> CommResult<T>
    where T: Clone + Send + 'static
    {
        match &self.inbox {
            None => {
                for tx in self.peers.iter() {
                    let msg: Message = Box::new(value.clone());
                    tx.send(msg).map_err(|_| ClosedChannel)?;
                }
                value.ok_or(MissingRootValue)
            },
            Some(rx) => {
                let msg = rx.recv().map_err(|_| ClosedChannel)?;
                let value = msg.downcast::<Option<T>>().map_err(|_| TypeMismatch)?;
                value.ok_or(MissingRootValue)
            },
        }
    }

    fn barrier(&self) { self.barrier.wait(); }
}
