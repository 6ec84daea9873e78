use std::sync::Arc;

use crate::comm::{Communicator, ReduceOp};
use crate::config::DEFAULT_AGG_FACTOR;
use crate::context::{Context, io_task_for_rank};
use crate::error::SmioError;
use crate::types::{Offset, as_bytes};

/// Message tag used for the element-id exchange while building a plan.
const TAG_EXCHANGE: i32 = 1;

/// One per-peer group of an exchange plan: the peer's rank in the context
/// communicator and the local element positions exchanged with it, in wire
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeGroup {
    pub peer: usize,
    pub idx: Vec<usize>,
}

/// Gather/scatter layout for the optional aggregation stage.
pub(crate) struct AggLayout {
    /// Sub-group communicator; the leader is rank 0 of it.
    pub(crate) comm: Arc<dyn Communicator>,
    /// Post-aggregation element count; nonzero only on sub-group leaders.
    pub(crate) n_compute_agg: usize,
    /// Per-member element counts on the leader (empty elsewhere).
    pub(crate) counts: Vec<usize>,
    /// Per-member displacements on the leader (empty elsewhere).
    pub(crate) displs: Vec<usize>,
}

/// Exchange plan between a compute decomposition and the contiguous I/O
/// decomposition derived from it.
///
/// `comp_list` describes this rank's role as a compute rank: positions inside
/// the (possibly aggregated) compute buffer, grouped by peer I/O rank.
/// `io_list` describes its role as an I/O rank: positions inside the
/// contiguous I/O-range buffer, grouped by peer compute rank. Within every
/// group, positions are ordered by ascending global element id, which is the
/// wire order for field transfers in both directions.
///
/// Immutable once built; resources (including the aggregation sub-group
/// communicator) are released on drop.
pub struct Decomp {
    ctx: Arc<Context>,
    pub comp_list: Vec<ExchangeGroup>,
    pub io_list: Vec<ExchangeGroup>,
    /// First global element id of this rank's I/O range.
    pub io_start: usize,
    /// Number of elements in this rank's I/O range (0 on non-I/O ranks).
    pub io_count: usize,
    /// Unaggregated compute element count on this rank.
    pub(crate) n_compute: usize,
    pub(crate) agg: Option<AggLayout>,
}

impl std::fmt::Debug for Decomp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomp")
            .field("io_start", &self.io_start)
            .field("io_count", &self.io_count)
            .field("n_compute", &self.n_compute)
            .finish()
    }
}

impl Decomp {
    /// Build an exchange plan from this rank's list of global element ids.
    ///
    /// Collective over the context communicator. `agg_factor` sub-groups
    /// consecutive ranks and funnels their elements through the lowest rank
    /// of each group before the exchange; a factor of 0 or 1 disables
    /// aggregation.
    pub fn create(
        ctx: &Arc<Context>,
        compute_ids: &[Offset],
        agg_factor: usize,
    ) -> Result<Decomp, SmioError> {
        let comm = ctx.comm();
        let comm_rank = comm.rank();

        // Global element count, assuming the compute partitions tile the
        // index space
        let n_global = comm.allreduce_i64(compute_ids.len() as i64, ReduceOp::Sum)? as usize;

        let (io_start, io_count) =
            io_range(n_global, comm_rank, ctx.num_io_tasks(), ctx.io_stride());

        // Optional aggregation: funnel each sub-group's ids onto its leader
        let (agg, effective_ids) = if agg_factor > 1 {
            let (layout, ids) = aggregate_ids(ctx, compute_ids, agg_factor)?;
            (Some(layout), ids)
        } else {
            (None, compute_ids.to_vec())
        };

        let (comp_list, io_list) = build_exchange(
            ctx,
            &effective_ids,
            n_global,
            io_start,
            io_count,
        )?;

        Ok(Decomp {
            ctx: Arc::clone(ctx),
            comp_list,
            io_list,
            io_start,
            io_count,
            n_compute: compute_ids.len(),
            agg,
        })
    }

    /// Build an exchange plan with aggregation at the default factor
    /// ([`DEFAULT_AGG_FACTOR`]).
    pub fn create_aggregated(
        ctx: &Arc<Context>,
        compute_ids: &[Offset],
    ) -> Result<Decomp, SmioError> {
        Self::create(ctx, compute_ids, DEFAULT_AGG_FACTOR)
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub(crate) fn comm(&self) -> &Arc<dyn Communicator> {
        self.ctx.comm()
    }
}

/// Contiguous I/O range of `rank` for a global element count: the count is
/// split as equally as possible over the I/O tasks in rank order, the first
/// `n_global % num_io_tasks` tasks taking one extra element. Non-I/O ranks
/// get an empty range.
pub fn io_range(
    n_global: usize,
    rank: usize,
    num_io_tasks: usize,
    io_stride: usize,
) -> (usize, usize) {
    if !io_task_for_rank(rank, num_io_tasks, io_stride) {
        return (0, 0);
    }
    let task = rank / io_stride;
    let base = n_global / num_io_tasks;
    let rem = n_global % num_io_tasks;
    let count = base + usize::from(task < rem);
    let start = task * base + task.min(rem);
    (start, count)
}

/// I/O task index owning global element `gid`, under the [`io_range`]
/// allocation rule.
fn owning_io_task(gid: usize, n_global: usize, num_io_tasks: usize) -> usize {
    let base = n_global / num_io_tasks;
    let rem = n_global % num_io_tasks;
    let threshold = rem * (base + 1);
    if gid < threshold {
        gid / (base + 1)
    } else {
        rem + (gid - threshold) / base
    }
}

/// Gatherv each sub-group's ids onto its leader. Returns the layout and the
/// effective id list (the aggregate on leaders, empty elsewhere).
fn aggregate_ids(
    ctx: &Arc<Context>,
    compute_ids: &[Offset],
    agg_factor: usize,
) -> Result<(AggLayout, Vec<Offset>), SmioError> {
    let comm = ctx.comm();
    let comm_rank = comm.rank();

    let agg_comm = comm.split((comm_rank / agg_factor) as i32, comm_rank as i32)?;
    let leader = agg_comm.rank() == 0;

    let member_counts = agg_comm.gather_i64(compute_ids.len() as i64, 0)?;

    let (counts, displs, n_agg) = match member_counts {
        Some(cs) => {
            let counts: Vec<usize> = cs.iter().map(|&c| c as usize).collect();
            let mut displs = Vec::with_capacity(counts.len());
            let mut acc = 0usize;
            for &c in &counts {
                displs.push(acc);
                acc += c;
            }
            (counts, displs, acc)
        }
        None => (Vec::new(), Vec::new(), 0),
    };

    let mut agg_ids = vec![0 as Offset; n_agg];
    {
        // Byte-granular gather of the id lists
        let byte_counts: Vec<usize> = counts.iter().map(|&c| c * 8).collect();
        let byte_displs: Vec<usize> = displs.iter().map(|&d| d * 8).collect();
        let recv = if leader {
            Some(crate::types::as_bytes_mut(&mut agg_ids[..]))
        } else {
            None
        };
        agg_comm.gatherv(as_bytes(compute_ids), recv, &byte_counts, &byte_displs, 0)?;
    }

    let layout = AggLayout {
        comm: agg_comm,
        n_compute_agg: n_agg,
        counts,
        displs,
    };
    Ok((layout, agg_ids))
}

/// All-to-all exchange of element ids between compute owners and I/O owners,
/// producing the matched per-peer lists of an exchange plan.
fn build_exchange(
    ctx: &Arc<Context>,
    compute_ids: &[Offset],
    n_global: usize,
    io_start: usize,
    io_count: usize,
) -> Result<(Vec<ExchangeGroup>, Vec<ExchangeGroup>), SmioError> {
    let comm = ctx.comm();
    let comm_size = comm.size();
    let num_io_tasks = ctx.num_io_tasks();
    let io_stride = ctx.io_stride();

    // Order this rank's elements by global id; the sorted order is the wire
    // order on both sides of the exchange
    let mut by_gid: Vec<(usize, usize)> = Vec::with_capacity(compute_ids.len()); // (gid, local idx)
    for (i, &gid) in compute_ids.iter().enumerate() {
        if gid < 0 || gid as usize >= n_global {
            return Err(SmioError::InvalidArgument);
        }
        by_gid.push((gid as usize, i));
    }
    by_gid.sort_unstable();
    if by_gid.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(SmioError::InvalidArgument);
    }

    // Bucket by destination I/O rank; buckets are contiguous runs of the
    // sorted list because I/O ranges are contiguous in the id space
    let mut send_counts = vec![0i64; comm_size];
    for &(gid, _) in &by_gid {
        let dest = owning_io_task(gid, n_global, num_io_tasks) * io_stride;
        send_counts[dest] += 1;
    }

    let recv_counts = comm.alltoall_i64(&send_counts)?;
    debug_assert_eq!(
        recv_counts.iter().sum::<i64>() as usize,
        io_count,
        "mirror counts must cover exactly this rank's I/O range"
    );

    // Compute side: one send per destination with elements ordered by id
    let mut comp_list = Vec::new();
    let mut cursor = 0usize;
    while cursor < by_gid.len() {
        let dest = owning_io_task(by_gid[cursor].0, n_global, num_io_tasks) * io_stride;
        let run_len = send_counts[dest] as usize;
        let run = &by_gid[cursor..cursor + run_len];

        let gids: Vec<Offset> = run.iter().map(|&(g, _)| g as Offset).collect();
        comm.send(as_bytes(&gids), dest, TAG_EXCHANGE)?;

        comp_list.push(ExchangeGroup {
            peer: dest,
            idx: run.iter().map(|&(_, i)| i).collect(),
        });
        cursor += run_len;
    }

    // I/O side: one receive per source, offsets relative to the range start
    let mut io_list = Vec::new();
    if io_count > 0 {
        for (src, &n) in recv_counts.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let bytes = comm.recv(src, TAG_EXCHANGE)?;
            if bytes.len() != n as usize * 8 {
                return Err(SmioError::Messaging(crate::comm::CommError::new("recv")));
            }
            let mut idx = Vec::with_capacity(n as usize);
            for chunk in bytes.chunks_exact(8) {
                let gid = i64::from_ne_bytes(chunk.try_into().unwrap()) as usize;
                if gid < io_start || gid >= io_start + io_count {
                    return Err(SmioError::InvalidArgument);
                }
                idx.push(gid - io_start);
            }
            io_list.push(ExchangeGroup { peer: src, idx });
        }
    }

    Ok((comp_list, io_list))
}
