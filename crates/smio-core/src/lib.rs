pub mod backend;
pub mod comm;
pub mod config;
pub mod context;
pub mod decomp;
pub mod error;
pub mod file;
pub mod pinned_buf;
pub mod putget;
pub mod transfer;
pub mod types;
mod writer;

// Re-export primary types for convenience
pub use backend::{Backend, BackendCode, DimId, FileId, ReqId, VarId};
pub use comm::{CommError, Communicator, CommunicatorExt, ReduceOp};
pub use config::{Config, DEFAULT_AGG_FACTOR, DEFAULT_BUFSIZE, DEFAULT_N_REQS};
pub use context::Context;
pub use decomp::{Decomp, ExchangeGroup, io_range};
pub use error::{SmioError, error_string};
pub use file::{File, MetaState, VarInfo};
pub use pinned_buf::PinnedBuffer;
pub use transfer::{Direction, transfer_field};
pub use types::{AttValue, FileMode, Offset, VarType, as_bytes, as_bytes_mut};
