use crate::types::{AttValue, Offset, VarType};

/// Opaque identifier for an open backend file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

/// Backend dimension identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimId(pub i32);

/// Backend variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarId(pub i32);

/// Handle for an outstanding non-blocking put request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReqId(pub i32);

/// Native backend error code; `0` never appears here (success is `Ok`).
pub type BackendCode = i32;

/// Self-describing-array file library, as consumed by the library core.
///
/// All methods are process-local from the trait's point of view; collective
/// semantics (which ranks call what, and when) are the caller's contract.
/// `get_vara_all` and `wait_all` must be entered by every rank holding a
/// handle to the same file. Fallible methods return the backend's native
/// error code, which the core broadcasts across the I/O group before
/// wrapping it in a library error.
pub trait Backend: Send + Sync {
    /// Backend name (e.g., "mem")
    fn name(&self) -> &str;

    /// Create a new file, clobbering any existing one. The new file starts
    /// in define mode.
    fn create(&self, path: &str) -> Result<FileId, BackendCode>;

    /// Open an existing file in data mode.
    fn open(&self, path: &str, writable: bool) -> Result<FileId, BackendCode>;

    /// Close a handle. Outstanding requests are an error.
    fn close(&self, fid: FileId) -> Result<(), BackendCode>;

    /// Leave define mode, committing structural changes.
    fn enddef(&self, fid: FileId) -> Result<(), BackendCode>;

    /// Re-enter define mode.
    fn redef(&self, fid: FileId) -> Result<(), BackendCode>;

    /// Define a dimension. `None` denotes the unlimited dimension.
    fn def_dim(&self, fid: FileId, name: &str, len: Option<Offset>) -> Result<DimId, BackendCode>;

    fn inq_dimid(&self, fid: FileId, name: &str) -> Result<DimId, BackendCode>;

    /// Current length of a dimension; for the unlimited dimension this is
    /// the number of records written so far.
    fn inq_dimlen(&self, fid: FileId, dim: DimId) -> Result<Offset, BackendCode>;

    fn inq_dimname(&self, fid: FileId, dim: DimId) -> Result<String, BackendCode>;

    /// Id of the unlimited dimension, if one has been defined.
    fn inq_unlimdim(&self, fid: FileId) -> Result<Option<DimId>, BackendCode>;

    fn def_var(
        &self,
        fid: FileId,
        name: &str,
        vtype: VarType,
        dims: &[DimId],
    ) -> Result<VarId, BackendCode>;

    fn inq_varid(&self, fid: FileId, name: &str) -> Result<VarId, BackendCode>;

    fn inq_vartype(&self, fid: FileId, var: VarId) -> Result<VarType, BackendCode>;

    fn inq_varndims(&self, fid: FileId, var: VarId) -> Result<usize, BackendCode>;

    fn inq_vardimids(&self, fid: FileId, var: VarId) -> Result<Vec<DimId>, BackendCode>;

    /// Attach an attribute to a variable, or to the file when `var` is `None`.
    fn put_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
        value: &AttValue,
    ) -> Result<(), BackendCode>;

    /// Type and length of an attribute.
    fn inq_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
    ) -> Result<(VarType, Offset), BackendCode>;

    fn get_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
    ) -> Result<AttValue, BackendCode>;

    /// Buffered non-blocking put of a hyperslab. The data is copied into the
    /// attached buffer and a request handle is returned; completion is
    /// observed only by a later [`Backend::wait_all`].
    fn bput_vara(
        &self,
        fid: FileId,
        var: VarId,
        start: &[usize],
        count: &[usize],
        data: &[u8],
    ) -> Result<ReqId, BackendCode>;

    /// Complete the given outstanding requests. Requests not named stay
    /// pending; attached-buffer space is reclaimed once none remain.
    fn wait_all(&self, fid: FileId, reqs: &[ReqId]) -> Result<(), BackendCode>;

    /// Blocking collective read of a hyperslab into `data`.
    fn get_vara_all(
        &self,
        fid: FileId,
        var: VarId,
        start: &[usize],
        count: &[usize],
        data: &mut [u8],
    ) -> Result<(), BackendCode>;

    /// Flush completed writes to storage.
    fn sync(&self, fid: FileId) -> Result<(), BackendCode>;

    /// Attach a pinned buffer of `size` bytes backing future `bput_vara`
    /// calls on this handle.
    fn attach_buffer(&self, fid: FileId, size: usize) -> Result<(), BackendCode>;

    fn detach_buffer(&self, fid: FileId) -> Result<(), BackendCode>;

    /// Bytes of the attached buffer currently held by incomplete requests.
    fn buffer_usage(&self, fid: FileId) -> Result<usize, BackendCode>;

    /// Human-readable text for a native error code. Always non-empty.
    fn error_string(&self, code: BackendCode) -> String;
}
