//! End-to-end scenarios driving the full pipeline: decomposition,
//! redistribution, the async writer, and the metadata state machine, with
//! ranks running as threads over the shared-memory substrate and the
//! in-memory backend standing in for the file library.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smio_backend_mem::{EventKind, MemBackend};
use smio_comm_shmem::run_ranks;
use smio_core::{
    AttValue, Config, Context, Decomp, File, FileMode, Offset, VarType, as_bytes, as_bytes_mut,
};

fn small_config() -> Config {
    Config {
        bufsize: 4 << 20,
        n_reqs: 64,
        writer_affinity: Vec::new(),
    }
}

/// Four ranks, two I/O tasks at stride 2, rank `r` computing ids
/// `{2r, 2r+1}` of an 8-element space: every rank reads back exactly what it
/// wrote.
#[test]
fn identity_roundtrip_strided_io() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(4, move |rank, comm| {
        let ctx =
            Context::init_with_config(comm, backend.clone(), 2, 2, small_config()).unwrap();
        let ids: Vec<Offset> = vec![2 * rank as Offset, 2 * rank as Offset + 1];
        let decomp = Decomp::create(&ctx, &ids, 1).unwrap();

        // I/O ranges: rank 0 holds [0,4), rank 2 holds [4,8)
        match rank {
            0 => assert_eq!((decomp.io_start, decomp.io_count), (0, 4)),
            2 => assert_eq!((decomp.io_start, decomp.io_count), (4, 4)),
            _ => assert_eq!(decomp.io_count, 0),
        }

        let mut file = File::open(&ctx, "s1", FileMode::CREATE).unwrap();
        file.define_dim("cells", 8).unwrap();
        file.define_var("v", VarType::Int32, &["cells"]).unwrap();

        let values: Vec<i32> = ids.iter().map(|&g| 1000 + g as i32).collect();
        file.put_var("v", Some(&decomp), as_bytes(&values)).unwrap();
        file.sync().unwrap();

        let mut out = vec![0i32; 2];
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out, vec![1000 + 2 * rank as i32, 1001 + 2 * rank as i32]);

        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
    });
}

/// Three ranks, a scalar REAL64 written without a decomposition: the backend
/// write collapses to a single writer and every rank reads the value back.
#[test]
fn scalar_single_writer() {
    let backend = Arc::new(MemBackend::new());
    let pi = std::f64::consts::PI;
    run_ranks(3, move |_rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 3, small_config()).unwrap();
        let mut file = File::open(&ctx, "s2", FileMode::CREATE).unwrap();
        file.define_var("pi", VarType::Real64, &[]).unwrap();

        file.put_var("pi", None, &pi.to_ne_bytes()).unwrap();
        file.sync().unwrap();

        let mut out = [0u8; 8];
        file.get_var("pi", None, &mut out).unwrap();
        assert_eq!(f64::from_ne_bytes(out), pi);

        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

/// Two ranks, one I/O task, a decomposed record variable: distinct frames
/// hold distinct data and read back frame by frame.
#[test]
fn record_frames() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(2, move |rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 2, small_config()).unwrap();
        let ids: Vec<Offset> = vec![2 * rank as Offset, 2 * rank as Offset + 1];
        let decomp = Decomp::create(&ctx, &ids, 1).unwrap();

        let mut file = File::open(&ctx, "s3", FileMode::CREATE).unwrap();
        file.define_dim("time", -1).unwrap();
        file.define_dim("n", 4).unwrap();
        file.define_var("v", VarType::Int32, &["time", "n"]).unwrap();

        let frame0: Vec<i32> = if rank == 0 { vec![10, 20] } else { vec![30, 40] };
        let frame1: Vec<i32> = if rank == 0 { vec![11, 22] } else { vec![33, 44] };

        file.set_frame(0).unwrap();
        file.put_var("v", Some(&decomp), as_bytes(&frame0)).unwrap();
        file.set_frame(1).unwrap();
        file.put_var("v", Some(&decomp), as_bytes(&frame1)).unwrap();
        file.sync().unwrap();

        let (size, unlimited) = file.inquire_dim("time").unwrap();
        assert_eq!((size, unlimited), (2, true));

        let mut out = vec![0i32; 2];
        file.set_frame(0).unwrap();
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out, frame0);

        file.set_frame(1).unwrap();
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out, frame1);

        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
    });
}

/// Drive 16 record writes of 300 KiB through a writer capped at 4 request
/// slots: no flush ever completes more than 4 puts, every put lands, and the
/// data is durable after close.
#[test]
fn slot_cap_flush() {
    let backend = Arc::new(MemBackend::new());
    let be = backend.clone();
    flush_scenario(backend, "s4a", 8 << 20, 4);

    let flushes = flush_applied_counts(&be, "s4a");
    assert!(flushes.iter().all(|&a| a <= 4), "flushes: {flushes:?}");
    assert_eq!(flushes.iter().sum::<usize>(), 16);
    assert!(flushes.len() >= 4, "flushes: {flushes:?}");
}

/// Same workload against a 1 MiB pinned buffer: the writer must flush before
/// any participant can overrun the buffer, so no flush ever completes more
/// than 3 of the 300 KiB puts and no put fails for lack of buffer space.
#[test]
fn buffer_pressure_flush() {
    let backend = Arc::new(MemBackend::new());
    let be = backend.clone();
    flush_scenario(backend, "s4b", 1 << 20, 512);

    let flushes = flush_applied_counts(&be, "s4b");
    assert!(flushes.iter().all(|&a| a <= 3), "flushes: {flushes:?}");
    assert_eq!(flushes.iter().sum::<usize>(), 16);
    assert!(flushes.len() >= 6, "flushes: {flushes:?}");
}

/// 16 frames of a 76800-element INT32 variable (300 KiB per frame on the
/// single I/O task), written by 2 ranks and verified after a close/re-open.
fn flush_scenario(backend: Arc<MemBackend>, path: &'static str, bufsize: usize, n_reqs: usize) {
    const CELLS: usize = 76_800;
    run_ranks(2, move |rank, comm| {
        let cfg = Config {
            bufsize,
            n_reqs,
            writer_affinity: Vec::new(),
        };
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 2, cfg).unwrap();
        let half = CELLS / 2;
        let ids: Vec<Offset> = (0..half).map(|i| (rank * half + i) as Offset).collect();
        let decomp = Decomp::create(&ctx, &ids, 1).unwrap();

        let mut file = File::open(&ctx, path, FileMode::CREATE).unwrap();
        file.define_dim("time", -1).unwrap();
        file.define_dim("cells", CELLS as Offset).unwrap();
        file.define_var("v", VarType::Int32, &["time", "cells"])
            .unwrap();

        let mut buf = vec![0i32; half];
        for frame in 0..16 {
            for (i, &g) in ids.iter().enumerate() {
                buf[i] = (frame * 1_000_000) as i32 + g as i32;
            }
            file.set_frame(frame).unwrap();
            file.put_var("v", Some(&decomp), as_bytes(&buf)).unwrap();
        }
        file.close().unwrap();

        // Durability check through a fresh read-only handle
        let mut file = File::open(&ctx, path, FileMode::READ).unwrap();
        for frame in [0, 7, 15] {
            file.set_frame(frame).unwrap();
            let mut out = vec![0i32; half];
            file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
                .unwrap();
            for (i, &g) in ids.iter().enumerate() {
                assert_eq!(out[i], (frame * 1_000_000) as i32 + g as i32);
            }
        }
        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
    });
}

fn flush_applied_counts(backend: &MemBackend, path: &str) -> Vec<usize> {
    backend
        .events(path)
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::Flush { applied } if applied > 0 => Some(applied),
            _ => None,
        })
        .collect()
}

/// Two I/O tasks with skewed submission: task 0 queues its writes
/// immediately, task 1 only after a delay. No backend put may be issued
/// until both queues are non-empty, so every put in the trace comes after
/// task 1's first submission.
#[test]
fn writer_rendezvous_holds_back_puts() {
    let backend = Arc::new(MemBackend::new());
    let be = backend.clone();

    let stamps = run_ranks(2, move |rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 2, 1, small_config()).unwrap();
        // Identity layout: each rank computes exactly its own I/O range, so
        // redistribution never blocks on the peer
        let ids: Vec<Offset> = vec![2 * rank as Offset, 2 * rank as Offset + 1];
        let decomp = Decomp::create(&ctx, &ids, 1).unwrap();
        assert_eq!((decomp.io_start, decomp.io_count), (2 * rank, 2));

        let mut file = File::open(&ctx, "s5", FileMode::CREATE).unwrap();
        file.define_dim("n", 4).unwrap();
        file.define_var("v", VarType::Int32, &["n"]).unwrap();

        let hold_back = if rank == 1 {
            std::thread::sleep(Duration::from_millis(300));
            Some(Instant::now())
        } else {
            None
        };

        let values: Vec<i32> = ids.iter().map(|&g| g as i32).collect();
        for _ in 0..3 {
            file.put_var("v", Some(&decomp), as_bytes(&values)).unwrap();
        }
        file.sync().unwrap();

        let mut out = vec![0i32; 2];
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out, values);

        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
        hold_back
    });

    let release = stamps[1].expect("rank 1 records its submission time");
    let puts: Vec<Instant> = be
        .events("s5")
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Put { .. }))
        .map(|e| e.at)
        .collect();
    assert_eq!(puts.len(), 6);
    for at in puts {
        assert!(
            at >= release,
            "a put was issued before both queues were non-empty"
        );
    }
}

/// Writing the same data with aggregation off and with every rank funneled
/// through one leader (the default factor covers all four ranks) must
/// produce byte-identical file contents.
#[test]
fn aggregation_equivalence() {
    let backend = Arc::new(MemBackend::new());
    for (path, aggregated) in [("direct", false), ("aggregated", true)] {
        let be = backend.clone();
        run_ranks(4, move |rank, comm| {
            let ctx = Context::init_with_config(comm, be.clone(), 2, 2, small_config()).unwrap();
            let ids: Vec<Offset> = vec![2 * rank as Offset, 2 * rank as Offset + 1];
            let decomp = if aggregated {
                Decomp::create_aggregated(&ctx, &ids).unwrap()
            } else {
                Decomp::create(&ctx, &ids, 1).unwrap()
            };

            let mut file = File::open(&ctx, path, FileMode::CREATE).unwrap();
            file.define_dim("time", -1).unwrap();
            file.define_dim("cells", 8).unwrap();
            file.define_var("v", VarType::Real64, &["time", "cells"])
                .unwrap();

            for frame in 0..2 {
                let values: Vec<f64> = ids
                    .iter()
                    .map(|&g| 1000.0 + frame as f64 * 100.0 + g as f64)
                    .collect();
                file.set_frame(frame).unwrap();
                file.put_var("v", Some(&decomp), as_bytes(&values)).unwrap();
            }
            file.sync().unwrap();

            file.close().unwrap();
            drop(decomp);
            Context::finalize(ctx).unwrap();
        });
    }

    let a = backend.snapshot("direct").expect("snapshot direct");
    let b = backend.snapshot("aggregated").expect("snapshot aggregated");
    assert_eq!(a, b, "aggregated and direct writes diverged");
}

/// Aggregation with two sub-groups: leaders gather their group's partitions,
/// the read path scatters them back, and every rank still round-trips.
#[test]
fn aggregated_roundtrip_two_leaders() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(4, move |rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 2, 2, small_config()).unwrap();
        // Interleaved ownership so the exchange actually crosses ranks
        let ids: Vec<Offset> = vec![rank as Offset, rank as Offset + 4];
        let decomp = Decomp::create(&ctx, &ids, 2).unwrap();

        let mut file = File::open(&ctx, "agg2", FileMode::CREATE).unwrap();
        file.define_dim("cells", 8).unwrap();
        file.define_var("v", VarType::Int32, &["cells"]).unwrap();

        let values: Vec<i32> = ids.iter().map(|&g| 7 * g as i32 + 1).collect();
        file.put_var("v", Some(&decomp), as_bytes(&values)).unwrap();
        file.sync().unwrap();

        let mut out = vec![0i32; 2];
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out, values);

        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
    });
}

/// Re-writing a frame replaces it, and earlier frames keep their data.
#[test]
fn frame_overwrite_last_wins() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(2, move |rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 2, small_config()).unwrap();
        let ids: Vec<Offset> = vec![rank as Offset];
        let decomp = Decomp::create(&ctx, &ids, 1).unwrap();

        let mut file = File::open(&ctx, "overwrite", FileMode::CREATE).unwrap();
        file.define_dim("time", -1).unwrap();
        file.define_dim("n", 2).unwrap();
        file.define_var("v", VarType::Int32, &["time", "n"]).unwrap();

        let put = |file: &mut File, d: &Decomp, frame: Offset, v: i32| {
            file.set_frame(frame).unwrap();
            file.put_var("v", Some(d), as_bytes(&[v])).unwrap();
        };
        put(&mut file, &decomp, 0, 100 + rank as i32);
        put(&mut file, &decomp, 1, 200 + rank as i32);
        put(&mut file, &decomp, 1, 300 + rank as i32);
        file.sync().unwrap();

        let mut out = [0i32; 1];
        file.set_frame(0).unwrap();
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out[0], 100 + rank as i32);
        file.set_frame(1).unwrap();
        file.get_var("v", Some(&decomp), as_bytes_mut(&mut out))
            .unwrap();
        assert_eq!(out[0], 300 + rank as i32);

        file.close().unwrap();
        drop(decomp);
        Context::finalize(ctx).unwrap();
    });
}

/// A non-decomposed variable with several elements: the full record is
/// copied into the descriptor, written once, and read back identically on
/// both I/O tasks.
#[test]
fn non_decomposed_full_record() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(2, move |_rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 2, 1, small_config()).unwrap();
        let mut file = File::open(&ctx, "replicated", FileMode::CREATE).unwrap();
        file.define_dim("n", 5).unwrap();
        file.define_var("levels", VarType::Real64, &["n"]).unwrap();

        let values = [0.5f64, 1.5, 2.5, 3.5, 4.5];
        file.put_var("levels", None, as_bytes(&values)).unwrap();
        file.sync().unwrap();

        let mut out = [0f64; 5];
        file.get_var("levels", None, as_bytes_mut(&mut out)).unwrap();
        assert_eq!(out, values);

        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

/// Attribute definition after data has been written (forcing the
/// data -> define -> data transitions) and collective inquiry of type,
/// length and value on every rank.
#[test]
fn attributes_roundtrip() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(2, move |_rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 2, small_config()).unwrap();
        let mut file = File::open(&ctx, "atts", FileMode::CREATE).unwrap();
        file.define_var("t", VarType::Real64, &[]).unwrap();

        file.put_var("t", None, &1.0f64.to_ne_bytes()).unwrap();
        file.sync().unwrap();

        file.define_att(None, "title", &AttValue::Char("ocean state".into()))
            .unwrap();
        file.define_att(Some("t"), "scale", &AttValue::Real64(0.25))
            .unwrap();
        file.define_att(Some("t"), "levels", &AttValue::Int32(42))
            .unwrap();

        let (vtype, len, value) = file.inquire_att(None, "title").unwrap();
        assert_eq!(vtype, VarType::Char);
        assert_eq!(len, 11);
        assert_eq!(value, AttValue::Char("ocean state".into()));

        let (vtype, len, value) = file.inquire_att(Some("t"), "scale").unwrap();
        assert_eq!((vtype, len), (VarType::Real64, 1));
        assert_eq!(value, AttValue::Real64(0.25));

        let (_, _, value) = file.inquire_att(Some("t"), "levels").unwrap();
        assert_eq!(value, AttValue::Int32(42));

        // sync moves back to data mode and flushes
        file.sync().unwrap();
        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}

/// Variable inquiry is collective and rank-uniform.
#[test]
fn inquire_var_uniform() {
    let backend = Arc::new(MemBackend::new());
    run_ranks(2, move |_rank, comm| {
        let ctx = Context::init_with_config(comm, backend.clone(), 1, 2, small_config()).unwrap();
        let mut file = File::open(&ctx, "inq", FileMode::CREATE).unwrap();
        file.define_dim("time", -1).unwrap();
        file.define_dim("cells", 6).unwrap();
        file.define_var("w", VarType::Real32, &["time", "cells"])
            .unwrap();

        let info = file.inquire_var("w").unwrap();
        assert_eq!(info.vtype, VarType::Real32);
        assert_eq!(info.dims, vec!["time".to_string(), "cells".to_string()]);

        let (cells, unlimited) = file.inquire_dim("cells").unwrap();
        assert_eq!((cells, unlimited), (6, false));

        file.close().unwrap();
        Context::finalize(ctx).unwrap();
    });
}
