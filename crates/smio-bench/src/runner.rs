use std::sync::Arc;
use std::time::Instant;

use smio_backend_mem::MemBackend;
use smio_comm_shmem::run_ranks;
use smio_core::{
    AttValue, Config, Context, Decomp, File, FileMode, Offset, VarType, as_bytes, as_bytes_mut,
};

use crate::report::RunReport;

/// Parameters of one driver run.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Ranks to spawn in-process
    pub ranks: usize,
    pub num_io_tasks: usize,
    pub io_stride: usize,
    /// Global element count, block-partitioned over the ranks
    pub elements: usize,
    /// Record frames to write and read back
    pub frames: usize,
    /// Aggregation factor for the decomposition (<= 1 disables aggregation)
    pub agg_factor: usize,
    pub bufsize: usize,
    pub n_reqs: usize,
    pub verbose: bool,
}

/// Expected value of element `gid` at frame `frame`.
fn expected(gid: usize, frame: usize) -> f64 {
    frame as f64 * 1_000_000.0 + gid as f64
}

/// Contiguous block partition of `[0, n)` over `ranks` ranks.
fn block_partition(n: usize, ranks: usize, rank: usize) -> Vec<Offset> {
    let base = n / ranks;
    let rem = n % ranks;
    let count = base + usize::from(rank < rem);
    let start = rank * base + rank.min(rem);
    (start..start + count).map(|g| g as Offset).collect()
}

/// Run the full write/sync/read cycle on `params.ranks` in-process ranks and
/// aggregate per-phase timings.
pub fn run(params: &RunParams, backend: Arc<MemBackend>, path: &str) -> RunReport {
    let p = params.clone();
    let path = path.to_string();

    let per_rank = run_ranks(params.ranks, move |rank, comm| {
        let ctx = Context::init_with_config(
            comm,
            backend.clone(),
            p.num_io_tasks,
            p.io_stride,
            Config {
                bufsize: p.bufsize,
                n_reqs: p.n_reqs,
                writer_affinity: Vec::new(),
            },
        )
        .expect("context init failed");

        let ids = block_partition(p.elements, p.ranks, rank);
        let decomp = Decomp::create(&ctx, &ids, p.agg_factor).expect("decomp failed");

        let mut file = File::open(&ctx, &path, FileMode::CREATE).expect("create failed");
        file.define_dim("time", -1).expect("define time");
        file.define_dim("cells", p.elements as Offset)
            .expect("define cells");
        file.define_var("field", VarType::Real64, &["time", "cells"])
            .expect("define var");
        file.define_att(None, "title", &AttValue::Char("smio-bench run".into()))
            .expect("define att");

        let mut buf: Vec<f64> = vec![0.0; ids.len()];

        // Write phase: one frame per iteration, drained by sync at the end
        let write_start = Instant::now();
        for frame in 0..p.frames {
            for (i, &g) in ids.iter().enumerate() {
                buf[i] = expected(g as usize, frame);
            }
            file.set_frame(frame as Offset).expect("set frame");
            file.put_var("field", Some(&decomp), as_bytes(&buf))
                .expect("put failed");
        }
        file.sync().expect("sync failed");
        let write_seconds = write_start.elapsed().as_secs_f64();

        // Read phase with verification
        let mut verify_errors = 0usize;
        let read_start = Instant::now();
        for frame in 0..p.frames {
            file.set_frame(frame as Offset).expect("set frame");
            file.get_var("field", Some(&decomp), as_bytes_mut(&mut buf))
                .expect("get failed");
            for (i, &g) in ids.iter().enumerate() {
                if buf[i] != expected(g as usize, frame) {
                    verify_errors += 1;
                }
            }
        }
        let read_seconds = read_start.elapsed().as_secs_f64();

        if p.verbose {
            eprintln!(
                "rank {rank}: wrote {} frames in {write_seconds:.4}s, read in {read_seconds:.4}s",
                p.frames
            );
        }

        file.close().expect("close failed");
        drop(decomp);
        Context::finalize(ctx).expect("finalize failed");

        (write_seconds, read_seconds, verify_errors)
    });

    let write_seconds = per_rank.iter().map(|r| r.0).fold(0.0f64, f64::max);
    let read_seconds = per_rank.iter().map(|r| r.1).fold(0.0f64, f64::max);
    let verify_errors = per_rank.iter().map(|r| r.2).sum();
    let bytes = params.elements * params.frames * std::mem::size_of::<f64>();

    RunReport::from_phases(
        params.ranks,
        params.num_io_tasks,
        params.io_stride,
        params.elements,
        params.frames,
        params.agg_factor,
        bytes,
        write_seconds,
        read_seconds,
        verify_errors,
    )
}
