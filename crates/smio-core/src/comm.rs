use std::fmt;
use std::sync::Arc;

/// Failure in the messaging substrate. Carries the name of the primitive
/// that failed; there is no automatic retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommError {
    op: &'static str,
}

impl CommError {
    pub fn new(op: &'static str) -> Self {
        Self { op }
    }

    pub fn op(&self) -> &'static str {
        self.op
    }
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}

impl std::error::Error for CommError {}

/// Reduction operator for [`Communicator::allreduce_i64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
}

/// Collective messaging substrate, as consumed by the library core.
///
/// Every collective call must be entered by every rank of the communicator in
/// the same order. Point-to-point sends may buffer; a send never waits for the
/// matching receive. Implementations must tolerate concurrent use of
/// *distinct* communicators from different threads of one rank.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;

    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    /// Duplicate this communicator into an independent one with identical
    /// membership and ranking.
    fn dup(&self) -> Result<Arc<dyn Communicator>, CommError>;

    /// Split into disjoint sub-communicators: ranks sharing a color end up in
    /// the same new communicator, ranked by `key` (ties broken by old rank).
    fn split(&self, color: i32, key: i32) -> Result<Arc<dyn Communicator>, CommError>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// All-reduce a single integer with the given operator.
    fn allreduce_i64(&self, value: i64, op: ReduceOp) -> Result<i64, CommError>;

    /// Broadcast `root`'s buffer to every rank. On non-root ranks the buffer
    /// is replaced by the root's contents (it may change length).
    fn bcast(&self, buf: &mut Vec<u8>, root: usize) -> Result<(), CommError>;

    /// Gather one integer from every rank onto `root`. Returns `Some` with
    /// one value per rank (in rank order) on the root, `None` elsewhere.
    fn gather_i64(&self, value: i64, root: usize) -> Result<Option<Vec<i64>>, CommError>;

    /// Gather variable-length byte spans onto `root`. On the root, `recv`
    /// must cover `displs[r] + counts[r]` bytes for every rank `r`; each
    /// rank's `send` lands at its displacement. Non-root ranks pass `None`.
    fn gatherv(
        &self,
        send: &[u8],
        recv: Option<&mut [u8]>,
        counts: &[usize],
        displs: &[usize],
        root: usize,
    ) -> Result<(), CommError>;

    /// Inverse of [`Communicator::gatherv`]: the root scatters
    /// per-rank spans of `send` back to every rank's `recv` buffer.
    fn scatterv(
        &self,
        send: Option<&[u8]>,
        counts: &[usize],
        displs: &[usize],
        recv: &mut [u8],
        root: usize,
    ) -> Result<(), CommError>;

    /// Each rank contributes one integer per destination rank; returns the
    /// integers contributed *for* this rank by every source, in rank order.
    fn alltoall_i64(&self, send: &[i64]) -> Result<Vec<i64>, CommError>;

    /// Send a tagged byte message to `dest`. Buffered; returns once the
    /// message is handed to the substrate.
    fn send(&self, buf: &[u8], dest: usize, tag: i32) -> Result<(), CommError>;

    /// Receive the next tagged byte message from `src`. Blocks until one is
    /// available.
    fn recv(&self, src: usize, tag: i32) -> Result<Vec<u8>, CommError>;
}

/// Fixed-width broadcast helpers layered over the byte primitive.
pub trait CommunicatorExt: Communicator {
    fn bcast_i32(&self, value: i32, root: usize) -> Result<i32, CommError> {
        let mut buf = value.to_ne_bytes().to_vec();
        self.bcast(&mut buf, root)?;
        let arr: [u8; 4] = buf.try_into().map_err(|_| CommError::new("bcast"))?;
        Ok(i32::from_ne_bytes(arr))
    }

    fn bcast_i64(&self, value: i64, root: usize) -> Result<i64, CommError> {
        let mut buf = value.to_ne_bytes().to_vec();
        self.bcast(&mut buf, root)?;
        let arr: [u8; 8] = buf.try_into().map_err(|_| CommError::new("bcast"))?;
        Ok(i64::from_ne_bytes(arr))
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}
