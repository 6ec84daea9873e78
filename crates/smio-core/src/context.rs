use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::comm::Communicator;
use crate::config::Config;
use crate::error::SmioError;

/// Library context: a duplicated group communicator, the I/O-task layout
/// derived from it, and the backend used for all files opened within it.
///
/// Immutable after initialization except for the backend-error slot.
/// Destroyed by [`Context::finalize`], which fails while any file or
/// decomposition still references the context.
pub struct Context {
    // Field order is drop order: communicators are released in reverse
    // order of acquisition
    group_comm: Arc<dyn Communicator>,
    io_comm: Arc<dyn Communicator>,
    comm: Arc<dyn Communicator>,
    backend: Arc<dyn Backend>,
    comm_size: usize,
    comm_rank: usize,
    num_io_tasks: usize,
    io_stride: usize,
    config: Config,
    lib_err: Mutex<Option<i32>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("comm_size", &self.comm_size)
            .field("comm_rank", &self.comm_rank)
            .field("num_io_tasks", &self.num_io_tasks)
            .field("io_stride", &self.io_stride)
            .finish()
    }
}

impl Context {
    /// Initialize a context over `comm` with the default configuration.
    ///
    /// The communicator is duplicated, so the caller remains free to release
    /// its own handle. `num_io_tasks` ranks at multiples of `io_stride`
    /// become I/O tasks.
    pub fn init(
        comm: Arc<dyn Communicator>,
        backend: Arc<dyn Backend>,
        num_io_tasks: usize,
        io_stride: usize,
    ) -> Result<Arc<Context>, SmioError> {
        Self::init_with_config(comm, backend, num_io_tasks, io_stride, Config::default())
    }

    /// Initialize a context with explicit tuning knobs.
    pub fn init_with_config(
        comm: Arc<dyn Communicator>,
        backend: Arc<dyn Backend>,
        num_io_tasks: usize,
        io_stride: usize,
        config: Config,
    ) -> Result<Arc<Context>, SmioError> {
        if num_io_tasks == 0 || io_stride == 0 || config.n_reqs == 0 {
            return Err(SmioError::InvalidArgument);
        }

        let comm = comm.dup()?;
        let comm_size = comm.size();
        let comm_rank = comm.rank();

        // The last I/O task must exist within the communicator, and every
        // stride-group must contain an I/O task to root its broadcasts
        if (num_io_tasks - 1) * io_stride >= comm_size || comm_size > num_io_tasks * io_stride {
            return Err(SmioError::InvalidArgument);
        }

        let io_task = io_task_for_rank(comm_rank, num_io_tasks, io_stride);

        // One communicator grouping all I/O tasks (and, separately, all
        // non-I/O ranks), and one grouping each I/O task with its followers.
        let io_comm = comm.split(io_task as i32, comm_rank as i32)?;
        let group_comm = comm.split((comm_rank / io_stride) as i32, comm_rank as i32)?;

        Ok(Arc::new(Context {
            group_comm,
            io_comm,
            comm,
            backend,
            comm_size,
            comm_rank,
            num_io_tasks,
            io_stride,
            config,
            lib_err: Mutex::new(None),
        }))
    }

    /// Finalize the context. Fails with `InvalidArgument` while any file or
    /// decomposition still holds a reference; all files must be closed and
    /// all decompositions freed first. Communicators are released in reverse
    /// order of acquisition as the context drops.
    pub fn finalize(ctx: Arc<Context>) -> Result<(), SmioError> {
        match Arc::try_unwrap(ctx) {
            Ok(_) => Ok(()),
            Err(_) => Err(SmioError::InvalidArgument),
        }
    }

    /// Whether this rank issues backend calls.
    pub fn is_io_task(&self) -> bool {
        io_task_for_rank(self.comm_rank, self.num_io_tasks, self.io_stride)
    }

    pub fn rank(&self) -> usize {
        self.comm_rank
    }

    pub fn size(&self) -> usize {
        self.comm_size
    }

    pub fn num_io_tasks(&self) -> usize {
        self.num_io_tasks
    }

    pub fn io_stride(&self) -> usize {
        self.io_stride
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The context-wide duplicated communicator.
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Communicator grouping all I/O tasks (on non-I/O ranks: all non-I/O
    /// ranks).
    pub fn io_comm(&self) -> &Arc<dyn Communicator> {
        &self.io_comm
    }

    /// Communicator grouping each I/O task with its non-I/O followers. The
    /// I/O task is always rank 0 of its group.
    pub fn group_comm(&self) -> &Arc<dyn Communicator> {
        &self.group_comm
    }

    /// Record the most recent backend error code.
    pub(crate) fn set_lib_error(&self, code: i32) {
        *self.lib_err.lock().unwrap() = Some(code);
    }

    /// Human-readable text for the most recent backend error observed in
    /// this context.
    pub fn lib_error_string(&self) -> String {
        match *self.lib_err.lock().unwrap() {
            Some(code) => self.backend.error_string(code),
            None => "no backend error has been recorded".to_string(),
        }
    }
}

/// I/O-task predicate: rank is a multiple of the stride and falls within the
/// first `num_io_tasks` such multiples.
pub fn io_task_for_rank(rank: usize, num_io_tasks: usize, io_stride: usize) -> bool {
    rank % io_stride == 0 && rank < num_io_tasks * io_stride
}
