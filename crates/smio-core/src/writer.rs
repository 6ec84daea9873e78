use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::backend::{Backend, FileId, ReqId, VarId};
use crate::comm::{Communicator, ReduceOp};
use crate::context::Context;
use crate::error::SmioError;

/// A self-contained pending write: the descriptor owns its start/count
/// vectors and data buffer. Ownership moves into the queue on submit, into
/// the writer on pop, and is released once the backend has copied the data
/// into its attached buffer.
pub(crate) struct WriteJob {
    pub(crate) var: VarId,
    pub(crate) start: Vec<usize>,
    pub(crate) count: Vec<usize>,
    pub(crate) data: Vec<u8>,
}

/// FIFO of pending writes. All access happens under the owning file's mutex.
#[derive(Default)]
pub(crate) struct WriteQueue {
    jobs: VecDeque<WriteJob>,
}

impl WriteQueue {
    pub(crate) fn add(&mut self, job: WriteJob) {
        self.jobs.push_back(job);
    }

    pub(crate) fn remove(&mut self) -> Option<WriteJob> {
        self.jobs.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Mutex-guarded writer state of one file.
pub(crate) struct WriterInner {
    pub(crate) queue: WriteQueue,
    /// Bytes held by queued-but-unpopped jobs; drives submission back-pressure.
    queued_bytes: usize,
    /// Whether a writer thread is (or is about to be) running.
    active: bool,
    handle: Option<JoinHandle<()>>,
    /// First failure observed by the writer; surfaced at the next join.
    first_err: Option<SmioError>,
}

/// Per-file state shared between the caller thread and the background
/// writer.
pub(crate) struct WriterShared {
    ctx: Arc<Context>,
    backend: Arc<dyn Backend>,
    fid: FileId,
    /// File-local duplicate of the I/O-task communicator; the writer's
    /// rendezvous reductions run here so concurrently open files never share
    /// a channel.
    io_comm: Arc<dyn Communicator>,
    num_io_tasks: usize,
    bufsize: usize,
    n_reqs: usize,
    affinity: Vec<usize>,
    inner: Mutex<WriterInner>,
    cond: Condvar,
}

impl WriterShared {
    pub(crate) fn new(
        ctx: Arc<Context>,
        fid: FileId,
        io_comm: Arc<dyn Communicator>,
    ) -> Arc<WriterShared> {
        let cfg = ctx.config().clone();
        let backend = Arc::clone(ctx.backend());
        let num_io_tasks = ctx.num_io_tasks();
        Arc::new(WriterShared {
            ctx,
            backend,
            fid,
            io_comm,
            num_io_tasks,
            bufsize: cfg.bufsize,
            n_reqs: cfg.n_reqs,
            affinity: cfg.writer_affinity,
            inner: Mutex::new(WriterInner {
                queue: WriteQueue::default(),
                queued_bytes: 0,
                active: false,
                handle: None,
                first_err: None,
            }),
            cond: Condvar::new(),
        })
    }

    /// Enqueue a write and make sure a writer is running.
    ///
    /// Blocks on the per-file condition variable while the queued byte total
    /// is at or above the pinned-buffer capacity and a writer is active;
    /// never blocks on I/O.
    pub(crate) fn submit(self: Arc<Self>, job: WriteJob) {
        let mut inner = self.inner.lock().unwrap();
        while inner.queued_bytes >= self.bufsize && inner.active {
            inner = self.cond.wait(inner).unwrap();
        }

        inner.queued_bytes += job.data.len();
        inner.queue.add(job);

        if !inner.active {
            let stale = inner.handle.take();
            inner.active = true;
            drop(inner);

            if let Some(h) = stale {
                let _ = h.join();
            }

            let shared = Arc::clone(&self);
            let handle = thread::spawn(move || writer_loop(&shared));
            self.inner.lock().unwrap().handle = Some(handle);
        }
    }

    /// Wait for the writer to drain and exit, then surface the first failure
    /// it recorded, if any.
    pub(crate) fn join(&self) -> Result<(), SmioError> {
        let handle = self.inner.lock().unwrap().handle.take();
        if let Some(h) = handle {
            if h.join().is_err() {
                return Err(SmioError::Async);
            }
        }
        match self.inner.lock().unwrap().first_err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Background writer: drains the FIFO while every I/O task agrees on queue
/// emptiness, flushing outstanding requests on buffer pressure or request
/// slot exhaustion.
fn writer_loop(shared: &Arc<WriterShared>) {
    pin_to_cores(&shared.affinity);

    let mut reqs: Vec<ReqId> = Vec::with_capacity(shared.n_reqs);

    loop {
        // The mutex is held across the emptiness vote and the pop, so a
        // submission cannot slip between the two and desynchronize the
        // I/O tasks
        let mut inner = shared.inner.lock().unwrap();
        let empty = inner.queue.is_empty();

        let sum_empty = match shared.io_comm.allreduce_i64(empty as i64, ReduceOp::Sum) {
            Ok(s) => s,
            Err(e) => {
                record_err(&mut inner, SmioError::Messaging(e));
                inner.active = false;
                drop(inner);
                shared.cond.notify_all();
                return;
            }
        };

        // All I/O tasks must agree before any queue is popped; otherwise keep
        // every writer alive and vote again
        if sum_empty != 0 && sum_empty != shared.num_io_tasks as i64 {
            drop(inner);
            thread::yield_now();
            continue;
        }

        let job = inner.queue.remove();
        if let Some(j) = &job {
            inner.queued_bytes -= j.data.len();
        } else if reqs.is_empty() {
            inner.active = false;
        }
        let exiting = job.is_none() && reqs.is_empty();
        drop(inner);
        shared.cond.notify_all();

        match job {
            Some(job) => {
                if let Err(e) = issue_put(shared, &mut reqs, &job) {
                    // Messaging failure: the collective sequence is broken,
                    // so stop this writer rather than hang the others
                    let mut inner = shared.inner.lock().unwrap();
                    record_err(&mut inner, e);
                    inner.active = false;
                    drop(inner);
                    shared.cond.notify_all();
                    return;
                }
            }
            None if !reqs.is_empty() => {
                if let Err(code) = shared.backend.wait_all(shared.fid, &reqs) {
                    shared.ctx.set_lib_error(code);
                    record_err(
                        &mut shared.inner.lock().unwrap(),
                        SmioError::Library { code },
                    );
                }
                reqs.clear();
            }
            None => {
                debug_assert!(exiting);
                return;
            }
        }
    }
}

/// Flush-then-put step for one popped descriptor.
///
/// Backend failures are recorded for the next join but do not abort the
/// step: the flush decision is a collective vote, and an early bail-out on
/// one I/O task would strand the others in the reduction. Only a messaging
/// failure returns `Err`.
fn issue_put(
    shared: &Arc<WriterShared>,
    reqs: &mut Vec<ReqId>,
    job: &WriteJob,
) -> Result<(), SmioError> {
    // Projected buffer usage if this put were issued now, maximized over all
    // I/O tasks; flush first rather than let any participant overrun
    let usage = match shared.backend.buffer_usage(shared.fid) {
        Ok(u) => u,
        Err(code) => {
            record_err(&mut shared.inner.lock().unwrap(), lib_err(shared, code));
            0
        }
    } + job.data.len();
    let max_usage = shared.io_comm.allreduce_i64(usage as i64, ReduceOp::Max)?;

    if max_usage as usize > shared.bufsize || reqs.len() == shared.n_reqs {
        if let Err(code) = shared.backend.wait_all(shared.fid, reqs) {
            record_err(&mut shared.inner.lock().unwrap(), lib_err(shared, code));
        }
        reqs.clear();
    }

    match shared
        .backend
        .bput_vara(shared.fid, job.var, &job.start, &job.count, &job.data)
    {
        Ok(req) => reqs.push(req),
        Err(code) => {
            record_err(&mut shared.inner.lock().unwrap(), lib_err(shared, code));
        }
    }
    Ok(())
}

fn lib_err(shared: &WriterShared, code: i32) -> SmioError {
    shared.ctx.set_lib_error(code);
    SmioError::Library { code }
}

fn record_err(inner: &mut WriterInner, err: SmioError) {
    if inner.first_err.is_none() {
        inner.first_err = Some(err);
    }
}

#[cfg(target_os = "linux")]
fn pin_to_cores(cores: &[usize]) {
    if cores.is_empty() {
        return;
    }
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &c in cores {
            libc::CPU_SET(c, &mut set);
        }
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_cores(_cores: &[usize]) {}
