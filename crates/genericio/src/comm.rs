//! Collective Messaging Capability
//!
//! The coordination protocols (two-phase header assembly, collective I/O
//! rounds, error-count reductions) are written against the [`Comm`] trait
//! rather than any particular message-passing runtime. Two implementations
//! ship with the library:
//!
//! - [`SelfComm`]: the singleton communicator. Used for stand-alone
//!   sessions, the leader's process-local header round-trip, and the
//!   redistribute read path (which deliberately runs every member on its own
//!   singleton sub-communicator).
//! - [`LocalComm`]: an in-process rendezvous group, one handle per writer
//!   thread, used as the test fabric.
//!
//! ## Collectiveness Invariant
//!
//! Within one write or read call, every member of a group issues the same
//! collectives in the same order. All `LocalComm` collectives reduce to a
//! single rendezvous primitive (`exchange`) in which every member deposits a
//! byte vector and receives the full table, so a group that honors the
//! ordering invariant can never deadlock.
//!
//! ## Cartesian Topology
//!
//! A group may carry 3-D Cartesian dims. Rank-to-coordinate mapping is
//! row-major (`rank = (x*dims[1] + y)*dims[2] + z`) and is exposed as a free
//! function so coordinates of arbitrary ranks can be derived without
//! communication.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use bytes::{Buf, BufMut, BytesMut};

/// Shared handle type for injected communicators.
pub type CommRef = Arc<dyn Comm>;

/// A rendezvous-style collective messaging capability.
pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Cartesian dims of the group, when it has a 3-D topology.
    fn cart_dims(&self) -> Option<[u64; 3]>;

    fn barrier(&self);

    /// Root's bytes are delivered to every member in place.
    fn broadcast(&self, root: usize, data: &mut Vec<u8>);

    /// Everyone sends; the root receives all contributions in rank order.
    fn gather(&self, root: usize, send: &[u8]) -> Option<Vec<Vec<u8>>>;

    /// The root distributes one part per member; everyone receives theirs.
    fn scatter(&self, root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8>;

    /// Everyone sends; everyone receives all contributions in rank order.
    /// Contributions may have different lengths.
    fn all_gather(&self, send: &[u8]) -> Vec<Vec<u8>>;

    fn all_reduce_sum(&self, value: u64) -> u64;

    /// Partition the group by color; members sharing a color form a new
    /// group ordered by their rank in this one.
    fn split(&self, color: u64) -> CommRef;
}

/// Row-major coordinates of `rank` in a 3-D Cartesian grid.
pub fn cart_coords(dims: [u64; 3], rank: usize) -> [u64; 3] {
    let r = rank as u64;
    let z = r % dims[2];
    let y = (r / dims[2]) % dims[1];
    let x = r / (dims[1] * dims[2]);
    [x, y, z]
}

/// The singleton communicator.
#[derive(Debug, Default)]
pub struct SelfComm;

impl SelfComm {
    pub fn new() -> CommRef {
        Arc::new(SelfComm)
    }
}

impl Comm for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn cart_dims(&self) -> Option<[u64; 3]> {
        None
    }

    fn barrier(&self) {}

    fn broadcast(&self, _root: usize, _data: &mut Vec<u8>) {}

    fn gather(&self, _root: usize, send: &[u8]) -> Option<Vec<Vec<u8>>> {
        Some(vec![send.to_vec()])
    }

    fn scatter(&self, _root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8> {
        parts
            .and_then(|mut p| if p.is_empty() { None } else { Some(p.swap_remove(0)) })
            .unwrap_or_default()
    }

    fn all_gather(&self, send: &[u8]) -> Vec<Vec<u8>> {
        vec![send.to_vec()]
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        value
    }

    fn split(&self, _color: u64) -> CommRef {
        SelfComm::new()
    }
}

/// One rendezvous round: members deposit into slots, the last arrival
/// publishes the table, and the round resets once every member has read it.
struct Round {
    slots: Vec<Option<Vec<u8>>>,
    table: Option<Arc<Vec<Vec<u8>>>>,
    arrived: usize,
    read: usize,
    open: bool,
    epoch: u64,
}

struct Group {
    size: usize,
    cart: Option<[u64; 3]>,
    state: Mutex<Round>,
    cv: Condvar,
    // Sub-groups under construction, keyed by (epoch, color). The counter
    // tracks how many members have fetched the entry so it can be dropped
    // once the last one is through.
    splits: Mutex<HashMap<(u64, u64), (Arc<Group>, usize)>>,
}

impl Group {
    fn new(size: usize, cart: Option<[u64; 3]>) -> Arc<Group> {
        Arc::new(Group {
            size,
            cart,
            state: Mutex::new(Round {
                slots: vec![None; size],
                table: None,
                arrived: 0,
                read: 0,
                open: false,
                epoch: 0,
            }),
            cv: Condvar::new(),
            splits: Mutex::new(HashMap::new()),
        })
    }
}

/// An in-process communicator: every member is a thread holding one handle.
pub struct LocalComm {
    group: Arc<Group>,
    rank: usize,
}

impl LocalComm {
    /// Create a flat group of `size` handles, one per member, in rank order.
    pub fn group(size: usize) -> Vec<CommRef> {
        Self::build(size, None)
    }

    /// Create a group with 3-D Cartesian topology; the group size is the
    /// product of the dims.
    pub fn cart_group(dims: [u64; 3]) -> Vec<CommRef> {
        let size = (dims[0] * dims[1] * dims[2]) as usize;
        Self::build(size, Some(dims))
    }

    fn build(size: usize, cart: Option<[u64; 3]>) -> Vec<CommRef> {
        let group = Group::new(size, cart);
        (0..size)
            .map(|rank| {
                Arc::new(LocalComm {
                    group: group.clone(),
                    rank,
                }) as CommRef
            })
            .collect()
    }

    /// Deposit `send` and receive the full table for this round, together
    /// with the round's epoch.
    fn exchange(&self, send: Vec<u8>) -> (u64, Arc<Vec<Vec<u8>>>) {
        let g = &self.group;
        let mut st = g.state.lock().unwrap();

        // A previous round may still be draining; wait for it to close.
        while st.open {
            st = g.cv.wait(st).unwrap();
        }

        let epoch = st.epoch;
        st.slots[self.rank] = Some(send);
        st.arrived += 1;

        if st.arrived == g.size {
            let table: Vec<Vec<u8>> = st.slots.iter_mut().map(|s| s.take().unwrap()).collect();
            st.table = Some(Arc::new(table));
            st.open = true;
            g.cv.notify_all();
        }

        while !(st.open && st.epoch == epoch) {
            st = g.cv.wait(st).unwrap();
        }

        let table = st.table.clone().unwrap();
        st.read += 1;
        if st.read == g.size {
            st.read = 0;
            st.arrived = 0;
            st.open = false;
            st.table = None;
            st.epoch += 1;
            g.cv.notify_all();
        }

        (epoch, table)
    }
}

fn encode_parts(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32_le(parts.len() as u32);
    for p in parts {
        buf.put_u32_le(p.len() as u32);
        buf.put_slice(p);
    }
    buf.to_vec()
}

fn decode_part(framed: &[u8], index: usize) -> Vec<u8> {
    let mut cur = framed;
    let count = cur.get_u32_le() as usize;
    assert!(index < count, "scatter part {} of {}", index, count);
    for _ in 0..index {
        let len = cur.get_u32_le() as usize;
        cur.advance(len);
    }
    let len = cur.get_u32_le() as usize;
    cur[..len].to_vec()
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn cart_dims(&self) -> Option<[u64; 3]> {
        self.group.cart
    }

    fn barrier(&self) {
        self.exchange(Vec::new());
    }

    fn broadcast(&self, root: usize, data: &mut Vec<u8>) {
        let send = if self.rank == root {
            data.clone()
        } else {
            Vec::new()
        };
        let (_, table) = self.exchange(send);
        if self.rank != root {
            *data = table[root].clone();
        }
    }

    fn gather(&self, root: usize, send: &[u8]) -> Option<Vec<Vec<u8>>> {
        let (_, table) = self.exchange(send.to_vec());
        if self.rank == root {
            Some(table.iter().cloned().collect())
        } else {
            None
        }
    }

    fn scatter(&self, root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8> {
        let send = if self.rank == root {
            let parts = parts.expect("scatter root must supply parts");
            assert_eq!(parts.len(), self.group.size, "scatter part count");
            encode_parts(&parts)
        } else {
            Vec::new()
        };
        let (_, table) = self.exchange(send);
        decode_part(&table[root], self.rank)
    }

    fn all_gather(&self, send: &[u8]) -> Vec<Vec<u8>> {
        let (_, table) = self.exchange(send.to_vec());
        table.iter().cloned().collect()
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        let (_, table) = self.exchange(value.to_le_bytes().to_vec());
        table
            .iter()
            .map(|b| u64::from_le_bytes(b[..8].try_into().unwrap()))
            .sum()
    }

    fn split(&self, color: u64) -> CommRef {
        let (epoch, table) = self.exchange(color.to_le_bytes().to_vec());
        let colors: Vec<u64> = table
            .iter()
            .map(|b| u64::from_le_bytes(b[..8].try_into().unwrap()))
            .collect();

        let members: Vec<usize> = (0..self.group.size)
            .filter(|&r| colors[r] == color)
            .collect();
        let sub_rank = members
            .iter()
            .position(|&r| r == self.rank)
            .expect("member not in its own split group");

        let sub = {
            let mut splits = self.group.splits.lock().unwrap();
            let (group, fetched) = {
                let entry = splits
                    .entry((epoch, color))
                    .or_insert_with(|| (Group::new(members.len(), None), 0));
                entry.1 += 1;
                (entry.0.clone(), entry.1)
            };
            if fetched == members.len() {
                splits.remove(&(epoch, color));
            }
            group
        };

        Arc::new(LocalComm {
            group: sub,
            rank: sub_rank,
        })
    }
}
