//! In-process implementation of the messaging substrate: every rank is a
//! thread of one process, communicators are shared-memory rendezvous groups.
//!
//! Collectives follow the substrate contract: every member enters them in
//! the same order. Point-to-point sends are buffered and never block;
//! receives block until a matching message arrives. Distinct communicators
//! may be driven concurrently from different threads of one rank, which is
//! what the per-file writer threads rely on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use smio_core::comm::{CommError, Communicator, ReduceOp};

/// Collective rendezvous state of one group: a generation-counted
/// all-exchange in which every member deposits a byte blob and receives all
/// members' blobs.
struct CollState {
    round: u64,
    arrived: usize,
    slots: Vec<Option<Vec<u8>>>,
    /// Completed rounds awaiting pickup: generation -> (blobs, pickups left)
    results: HashMap<u64, (Arc<Vec<Vec<u8>>>, usize)>,
}

/// One communicator's shared state.
struct Group {
    size: usize,
    coll: Mutex<CollState>,
    coll_cv: Condvar,
    mail: Mutex<HashMap<(usize, usize, i32), VecDeque<Vec<u8>>>>,
    mail_cv: Condvar,
    /// Child groups under construction during a split:
    /// (split generation, color) -> (group, members joined so far)
    children: Mutex<HashMap<(u64, i32), (Arc<Group>, usize)>>,
}

impl Group {
    fn new(size: usize) -> Group {
        Group {
            size,
            coll: Mutex::new(CollState {
                round: 0,
                arrived: 0,
                slots: vec![None; size],
                results: HashMap::new(),
            }),
            coll_cv: Condvar::new(),
            mail: Mutex::new(HashMap::new()),
            mail_cv: Condvar::new(),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// All-exchange: deposit `data`, get every member's deposit for this
    /// round. Returns the round's generation number, which is identical on
    /// every member and usable as an agreed-upon round id.
    fn exchange(&self, rank: usize, data: Vec<u8>) -> (u64, Arc<Vec<Vec<u8>>>) {
        let mut st = self.coll.lock().unwrap();
        let my_round = st.round;
        st.slots[rank] = Some(data);
        st.arrived += 1;

        if st.arrived == self.size {
            let blobs: Vec<Vec<u8>> = st.slots.iter_mut().map(|s| s.take().unwrap()).collect();
            st.results.insert(my_round, (Arc::new(blobs), self.size));
            st.round += 1;
            st.arrived = 0;
            self.coll_cv.notify_all();
        } else {
            while !st.results.contains_key(&my_round) {
                st = self.coll_cv.wait(st).unwrap();
            }
        }

        let entry = st.results.get_mut(&my_round).unwrap();
        let blobs = Arc::clone(&entry.0);
        entry.1 -= 1;
        if entry.1 == 0 {
            st.results.remove(&my_round);
        }
        (my_round, blobs)
    }
}

/// One rank's handle on a shared-memory communicator.
pub struct ShmemComm {
    group: Arc<Group>,
    rank: usize,
    size: usize,
}

/// Create a world of `size` ranks; element `r` of the result is rank `r`'s
/// communicator. Hand each element to its own thread.
pub fn world(size: usize) -> Vec<Arc<ShmemComm>> {
    assert!(size > 0, "a world needs at least one rank");
    let group = Arc::new(Group::new(size));
    (0..size)
        .map(|rank| {
            Arc::new(ShmemComm {
                group: Arc::clone(&group),
                rank,
                size,
            })
        })
        .collect()
}

/// Run `f` on `size` fresh ranks, one thread each, and collect the results
/// in rank order. Panics in any rank propagate.
pub fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, Arc<dyn Communicator>) -> T + Send + Sync + 'static,
{
    let comms = world(size);
    let f = Arc::new(f);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            let f = Arc::clone(&f);
            thread::spawn(move || {
                let comm: Arc<dyn Communicator> = comm;
                f(rank, comm)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

impl Communicator for ShmemComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn dup(&self) -> Result<Arc<dyn Communicator>, CommError> {
        // A split in which everyone shares one color and keeps its rank
        self.split(0, self.rank as i32)
    }

    fn split(&self, color: i32, key: i32) -> Result<Arc<dyn Communicator>, CommError> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&color.to_ne_bytes());
        payload.extend_from_slice(&key.to_ne_bytes());
        let (round, blobs) = self.group.exchange(self.rank, payload);

        // Members of my color, ordered by (key, old rank)
        let mut members: Vec<(i32, usize)> = Vec::new();
        for (old_rank, blob) in blobs.iter().enumerate() {
            if blob.len() != 8 {
                return Err(CommError::new("split"));
            }
            let c = i32::from_ne_bytes(blob[0..4].try_into().unwrap());
            let k = i32::from_ne_bytes(blob[4..8].try_into().unwrap());
            if c == color {
                members.push((k, old_rank));
            }
        }
        members.sort_unstable();
        let new_rank = members
            .iter()
            .position(|&(_, r)| r == self.rank)
            .ok_or(CommError::new("split"))?;

        // First member in creates the child group; the last one takes the
        // bookkeeping entry down
        let child = {
            let mut children = self.group.children.lock().unwrap();
            let entry = children
                .entry((round, color))
                .or_insert_with(|| (Arc::new(Group::new(members.len())), 0));
            entry.1 += 1;
            let group = Arc::clone(&entry.0);
            if entry.1 == members.len() {
                children.remove(&(round, color));
            }
            group
        };

        Ok(Arc::new(ShmemComm {
            group: child,
            rank: new_rank,
            size: members.len(),
        }))
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.group.exchange(self.rank, Vec::new());
        Ok(())
    }

    fn allreduce_i64(&self, value: i64, op: ReduceOp) -> Result<i64, CommError> {
        let (_, blobs) = self.group.exchange(self.rank, value.to_ne_bytes().to_vec());
        let mut acc: Option<i64> = None;
        for blob in blobs.iter() {
            let v = i64::from_ne_bytes(
                blob.as_slice()
                    .try_into()
                    .map_err(|_| CommError::new("allreduce"))?,
            );
            acc = Some(match (acc, op) {
                (None, _) => v,
                (Some(a), ReduceOp::Sum) => a + v,
                (Some(a), ReduceOp::Max) => a.max(v),
            });
        }
        acc.ok_or(CommError::new("allreduce"))
    }

    fn bcast(&self, buf: &mut Vec<u8>, root: usize) -> Result<(), CommError> {
        if root >= self.size {
            return Err(CommError::new("bcast"));
        }
        let payload = if self.rank == root {
            std::mem::take(buf)
        } else {
            Vec::new()
        };
        let (_, blobs) = self.group.exchange(self.rank, payload);
        *buf = blobs[root].clone();
        Ok(())
    }

    fn gather_i64(&self, value: i64, root: usize) -> Result<Option<Vec<i64>>, CommError> {
        if root >= self.size {
            return Err(CommError::new("gather"));
        }
        let (_, blobs) = self.group.exchange(self.rank, value.to_ne_bytes().to_vec());
        if self.rank != root {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.size);
        for blob in blobs.iter() {
            out.push(i64::from_ne_bytes(
                blob.as_slice()
                    .try_into()
                    .map_err(|_| CommError::new("gather"))?,
            ));
        }
        Ok(Some(out))
    }

    fn gatherv(
        &self,
        send: &[u8],
        recv: Option<&mut [u8]>,
        counts: &[usize],
        displs: &[usize],
        root: usize,
    ) -> Result<(), CommError> {
        if root >= self.size {
            return Err(CommError::new("gatherv"));
        }
        let (_, blobs) = self.group.exchange(self.rank, send.to_vec());
        if self.rank != root {
            return Ok(());
        }
        let recv = recv.ok_or(CommError::new("gatherv"))?;
        if counts.len() != self.size || displs.len() != self.size {
            return Err(CommError::new("gatherv"));
        }
        for (r, blob) in blobs.iter().enumerate() {
            if blob.len() != counts[r] || displs[r] + counts[r] > recv.len() {
                return Err(CommError::new("gatherv"));
            }
            recv[displs[r]..displs[r] + counts[r]].copy_from_slice(blob);
        }
        Ok(())
    }

    fn scatterv(
        &self,
        send: Option<&[u8]>,
        counts: &[usize],
        displs: &[usize],
        recv: &mut [u8],
        root: usize,
    ) -> Result<(), CommError> {
        if root >= self.size {
            return Err(CommError::new("scatterv"));
        }
        // The root repacks its buffer into rank-ordered spans prefixed by a
        // count table, so non-roots need no knowledge of the layout
        let payload = if self.rank == root {
            let send = send.ok_or(CommError::new("scatterv"))?;
            if counts.len() != self.size || displs.len() != self.size {
                return Err(CommError::new("scatterv"));
            }
            let mut packed = Vec::with_capacity(8 * self.size + send.len());
            for r in 0..self.size {
                packed.extend_from_slice(&(counts[r] as u64).to_ne_bytes());
            }
            for r in 0..self.size {
                if displs[r] + counts[r] > send.len() {
                    return Err(CommError::new("scatterv"));
                }
                packed.extend_from_slice(&send[displs[r]..displs[r] + counts[r]]);
            }
            packed
        } else {
            Vec::new()
        };

        let (_, blobs) = self.group.exchange(self.rank, payload);
        let packed = &blobs[root];
        if packed.len() < 8 * self.size {
            return Err(CommError::new("scatterv"));
        }
        let mut offset = 8 * self.size;
        let mut my_len = 0usize;
        for r in 0..self.size {
            let len = u64::from_ne_bytes(packed[8 * r..8 * r + 8].try_into().unwrap()) as usize;
            if r < self.rank {
                offset += len;
            }
            if r == self.rank {
                my_len = len;
            }
        }
        if my_len != recv.len() || offset + my_len > packed.len() {
            return Err(CommError::new("scatterv"));
        }
        recv.copy_from_slice(&packed[offset..offset + my_len]);
        Ok(())
    }

    fn alltoall_i64(&self, send: &[i64]) -> Result<Vec<i64>, CommError> {
        if send.len() != self.size {
            return Err(CommError::new("alltoall"));
        }
        let mut payload = Vec::with_capacity(8 * self.size);
        for v in send {
            payload.extend_from_slice(&v.to_ne_bytes());
        }
        let (_, blobs) = self.group.exchange(self.rank, payload);
        let mut out = Vec::with_capacity(self.size);
        for blob in blobs.iter() {
            if blob.len() != 8 * self.size {
                return Err(CommError::new("alltoall"));
            }
            let o = 8 * self.rank;
            out.push(i64::from_ne_bytes(blob[o..o + 8].try_into().unwrap()));
        }
        Ok(out)
    }

    fn send(&self, buf: &[u8], dest: usize, tag: i32) -> Result<(), CommError> {
        if dest >= self.size {
            return Err(CommError::new("send"));
        }
        let mut mail = self.group.mail.lock().unwrap();
        mail.entry((self.rank, dest, tag))
            .or_default()
            .push_back(buf.to_vec());
        self.group.mail_cv.notify_all();
        Ok(())
    }

    fn recv(&self, src: usize, tag: i32) -> Result<Vec<u8>, CommError> {
        if src >= self.size {
            return Err(CommError::new("recv"));
        }
        let mut mail = self.group.mail.lock().unwrap();
        loop {
            if let Some(queue) = mail.get_mut(&(src, self.rank, tag)) {
                if let Some(msg) = queue.pop_front() {
                    return Ok(msg);
                }
            }
            mail = self.group.mail_cv.wait(mail).unwrap();
        }
    }
}
