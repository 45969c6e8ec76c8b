//! Thin façade over intra-process or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Sends
//! return a waitable handle; receives return a pollable handle so the sweep
//! scheduler can test for arrival without blocking. Messages travelling
//! between one (source, destination, tag) triple are delivered in the order
//! they were sent.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Poll;

    /// Rank of this process (or simulated process).
    fn rank(&self) -> usize;
    /// Number of ranks taking part.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive for the next message from `peer` with `tag`; its length
    /// is discovered on arrival.
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// A receive that can be tested for completion without blocking.
pub trait Poll: Wait {
    /// Returns the payload once, as soon as it has arrived.
    fn test(&mut self) -> Option<Vec<u8>>;
}

/// Typed communication tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag shifted by `n`, wrapping at `u16::MAX`.
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags reserved for the collectives in [`crate::algs::exchange`].
#[derive(Copy, Clone, Debug)]
pub struct CollectiveTags {
    pub reduce: CommTag,
    pub gather: CommTag,
    pub gather_edges: CommTag,
}

impl CollectiveTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            reduce: base,
            gather: base.offset(1),
            gather_edges: base.offset(2),
        }
    }

    /// Number of consecutive tags reserved from the base.
    pub const SPAN: u16 = 3;
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Receive handle that never completes.
#[derive(Debug, Default)]
pub struct NeverRecv;

impl Wait for NeverRecv {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Poll for NeverRecv {
    fn test(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = NeverRecv;

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16) -> NeverRecv {
        NeverRecv
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

/// In-process rank. All ranks created by one [`RayonComm::world`] call share
/// a mailbox, so each can be driven from its own thread.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// Create `size` connected ranks.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::new());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Messages posted but not yet received, across the whole world.
    pub fn pending_messages(&self) -> usize {
        self.mailbox.iter().map(|e| e.value().len()).sum()
    }
}

/// Receive handle for [`RayonComm`].
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    done: bool,
}

impl Poll for LocalHandle {
    fn test(&mut self) -> Option<Vec<u8>> {
        if self.done {
            return None;
        }
        let bytes = self
            .mailbox
            .get_mut(&self.key)
            .and_then(|mut queue| queue.pop_front())?;
        self.done = true;
        Some(bytes.to_vec())
    }
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(data) = self.test() {
                return Some(data);
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            done: false,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    struct Shared {
        world: SimpleCommunicator,
        _universe: mpi::environment::Universe,
    }

    // SAFETY: MPI handles are only touched from the thread that drives the
    // sweep; callers using several threads must initialise MPI with
    // `MPI_THREAD_MULTIPLE`.
    unsafe impl Send for Shared {}
    unsafe impl Sync for Shared {}

    #[derive(Clone)]
    pub struct MpiComm {
        shared: Arc<Shared>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialise MPI; returns `None` when it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                shared: Arc::new(Shared {
                    world,
                    _universe: universe,
                }),
                rank,
                size,
            })
        }
    }

    /// Owns the leaked send buffer until the request completes. Dropping an
    /// unfinished send waits for it.
    pub struct MpiSend {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: Option<*mut [u8]>,
    }

    // SAFETY: see `Shared`.
    unsafe impl Send for MpiSend {}

    impl MpiSend {
        fn complete(&mut self) {
            if let Some(req) = self.req.take() {
                req.wait();
            }
            if let Some(buf) = self.buf.take() {
                // SAFETY: the buffer came from `Box::leak` in `isend` and the
                // request that borrowed it has completed.
                unsafe { drop(Box::from_raw(buf)) };
            }
        }
    }

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            self.complete();
            None
        }
    }

    impl Drop for MpiSend {
        fn drop(&mut self) {
            self.complete();
        }
    }

    pub struct MpiRecv {
        shared: Arc<Shared>,
        peer: i32,
        tag: i32,
        done: bool,
    }

    impl Poll for MpiRecv {
        fn test(&mut self) -> Option<Vec<u8>> {
            if self.done {
                return None;
            }
            let (msg, _status) = self
                .shared
                .world
                .process_at_rank(self.peer)
                .immediate_matched_probe_with_tag(self.tag)?;
            let (data, _status) = msg.matched_receive_vec::<u8>();
            self.done = true;
            Some(data)
        }
    }

    impl Wait for MpiRecv {
        fn wait(mut self) -> Option<Vec<u8>> {
            loop {
                if self.done {
                    return None;
                }
                if let Some(data) = self.test() {
                    return Some(data);
                }
                std::thread::yield_now();
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSend {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            let req = self
                .shared
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, &*leaked, tag as i32);
            MpiSend {
                req: Some(req),
                buf: Some(ptr),
            }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecv {
            MpiRecv {
                shared: Arc::clone(&self.shared),
                peer: peer as i32,
                tag: tag as i32,
                done: false,
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        let mut recv = comm1.irecv(0, 7);
        assert!(recv.test().is_none());

        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv.wait().expect("expected data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(comm0.pending_messages(), 0);
    }

    #[test]
    fn messages_on_one_channel_stay_ordered() {
        let world = RayonComm::world(2);
        world[0].isend(1, 3, &[1]);
        world[0].isend(1, 3, &[2]);
        world[0].isend(1, 4, &[9]);
        assert_eq!(world[1].irecv(0, 3).wait(), Some(vec![1]));
        assert_eq!(world[1].irecv(0, 4).wait(), Some(vec![9]));
        assert_eq!(world[1].irecv(0, 3).wait(), Some(vec![2]));
    }

    #[test]
    fn handle_completes_once() {
        let world = RayonComm::world(2);
        world[1].isend(0, 1, &[5]);
        world[1].isend(0, 1, &[6]);
        let mut h = world[0].irecv(1, 1);
        assert_eq!(h.test(), Some(vec![5]));
        assert_eq!(h.test(), None);
        assert_eq!(world[0].pending_messages(), 1);
    }

    #[test]
    fn commtag_offset_wraps() {
        let t = CommTag::new(u16::MAX).offset(1);
        assert_eq!(t.as_u16(), 0);
        let c = CollectiveTags::from_base(CommTag::new(10));
        assert_eq!(c.gather.as_u16(), 11);
    }

    #[test]
    fn nocomm_is_single_rank() {
        let c = NoComm;
        assert_eq!((c.rank(), c.size()), (0, 1));
        assert!(c.irecv(0, 0).test().is_none());
    }
}
