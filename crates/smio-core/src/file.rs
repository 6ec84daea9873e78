use std::sync::Arc;

use crate::backend::{DimId, FileId, VarId};
use crate::comm::{Communicator, CommunicatorExt};
use crate::context::Context;
use crate::error::SmioError;
use crate::types::{AttValue, FileMode, Offset, VarType};
use crate::writer::WriterShared;

/// Backend metadata state of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaState {
    /// Structure is mutable, data writes are illegal
    Define,
    /// Data is mutable, structure changes require re-entering define mode
    Data,
}

/// Variable description returned by [`File::inquire_var`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub vtype: VarType,
    pub dims: Vec<String>,
}

/// An open file.
///
/// All metadata operations and [`File::put_var`] / [`File::get_var`] are
/// collective over the context's group; backend calls are issued only on I/O
/// tasks and their return codes broadcast so every rank observes the same
/// outcome. Closing consumes the file; dropping without closing joins the
/// writer but leaves the backend handle to the backend's own cleanup.
pub struct File {
    // Field order is drop order: the writer goes first, then the file-local
    // communicators in reverse order of acquisition
    pub(crate) writer: Option<Arc<WriterShared>>,
    /// File-local duplicate of the gather/scatter group communicator.
    pub(crate) io_group_comm: Arc<dyn Communicator>,
    /// File-local duplicate of the I/O-task communicator.
    pub(crate) io_file_comm: Arc<dyn Communicator>,
    pub(crate) fid: Option<FileId>,
    pub(crate) mode: FileMode,
    pub(crate) frame: Offset,
    pub(crate) state: MetaState,
    pub(crate) io_task: bool,
    pub(crate) ctx: Arc<Context>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("fid", &self.fid)
            .field("mode", &self.mode)
            .field("frame", &self.frame)
            .field("state", &self.state)
            .field("io_task", &self.io_task)
            .finish()
    }
}

impl File {
    /// Open or create `path` within a context. Collective over the context
    /// communicator.
    ///
    /// The context's two derived communicators are duplicated into file-local
    /// copies so concurrently open files never share a channel. For
    /// write-like modes a pinned buffer of the configured capacity is
    /// attached to the backend handle. The backend's return code is
    /// broadcast across the I/O group before any rank inspects it; on
    /// failure, partially acquired resources are released in reverse order.
    pub fn open(ctx: &Arc<Context>, path: &str, mode: FileMode) -> Result<File, SmioError> {
        if !mode.is_valid() {
            return Err(SmioError::InvalidArgument);
        }

        let io_file_comm = ctx.io_comm().dup()?;
        let io_group_comm = ctx.group_comm().dup()?;
        let io_task = ctx.is_io_task();
        let backend = Arc::clone(ctx.backend());

        let mut code = 0i32;
        let mut fid = None;
        let state = if mode.contains(FileMode::CREATE) {
            if io_task {
                match backend.create(path) {
                    Ok(f) => fid = Some(f),
                    Err(c) => code = c,
                }
            }
            MetaState::Define
        } else {
            if io_task {
                match backend.open(path, mode.writable()) {
                    Ok(f) => fid = Some(f),
                    Err(c) => code = c,
                }
            }
            MetaState::Data
        };

        if let (0, Some(f), true) = (code, fid, mode.writable()) {
            if let Err(c) = backend.attach_buffer(f, ctx.config().bufsize) {
                code = c;
            }
        }

        let code = io_group_comm.bcast_i32(code, 0)?;
        if code != 0 {
            // Release in reverse order of acquisition
            if let Some(f) = fid {
                let _ = backend.close(f);
            }
            drop(io_group_comm);
            drop(io_file_comm);
            ctx.set_lib_error(code);
            return Err(SmioError::Library { code });
        }

        let writer = match (fid, mode.writable()) {
            (Some(f), true) => Some(WriterShared::new(
                Arc::clone(ctx),
                f,
                Arc::clone(&io_file_comm),
            )),
            _ => None,
        };

        Ok(File {
            ctx: Arc::clone(ctx),
            fid,
            mode,
            frame: 0,
            state,
            io_task,
            io_file_comm,
            io_group_comm,
            writer,
        })
    }

    /// Close the file: join the writer, detach the pinned buffer, close the
    /// backend handle on I/O tasks, release file-local communicators.
    ///
    /// The first failure encountered is returned, but the close sequence
    /// always runs to completion so every rank leaves the collective in the
    /// same place.
    pub fn close(mut self) -> Result<(), SmioError> {
        let writer_result = self.join_writer();

        let mut code = 0i32;
        if let Some(fid) = self.fid.take() {
            if self.mode.writable() {
                if let Err(c) = self.ctx.backend().detach_buffer(fid) {
                    code = c;
                }
            }
            if let Err(c) = self.ctx.backend().close(fid) {
                if code == 0 {
                    code = c;
                }
            }
        }
        let code = self.io_group_comm.bcast_i32(code, 0)?;

        writer_result?;
        if code != 0 {
            self.ctx.set_lib_error(code);
            return Err(SmioError::Library { code });
        }
        Ok(())
    }

    /// Define a dimension. A negative size denotes the unlimited dimension;
    /// zero-sized dimensions are rejected.
    pub fn define_dim(&mut self, name: &str, size: Offset) -> Result<(), SmioError> {
        if name.is_empty() || size == 0 {
            return Err(SmioError::InvalidArgument);
        }
        self.ensure_define()?;

        let mut code = 0i32;
        if let Some(fid) = self.fid {
            let len = if size < 0 { None } else { Some(size) };
            if let Err(c) = self.ctx.backend().def_dim(fid, name, len) {
                code = c;
            }
        }
        self.bcast_code(code)
    }

    /// Size of a dimension and whether it is the unlimited one. For the
    /// unlimited dimension the current record count is returned.
    pub fn inquire_dim(&self, name: &str) -> Result<(Offset, bool), SmioError> {
        if name.is_empty() {
            return Err(SmioError::InvalidArgument);
        }

        let mut code = 0i32;
        let mut dim = DimId::default();
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_dimid(fid, name) {
                Ok(d) => dim = d,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;

        let mut code = 0i32;
        let mut len = 0 as Offset;
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_dimlen(fid, dim) {
                Ok(l) => len = l,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        let len = self.io_group_comm.bcast_i64(len, 0)?;

        // The unlimited dimension is identified by id comparison
        let mut code = 0i32;
        let mut is_unlimited = false;
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_unlimdim(fid) {
                Ok(unlim) => is_unlimited = unlim == Some(dim),
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        let is_unlimited = self.io_group_comm.bcast_i32(is_unlimited as i32, 0)? != 0;

        Ok((len, is_unlimited))
    }

    /// Define a variable over previously defined dimensions.
    pub fn define_var(
        &mut self,
        name: &str,
        vtype: VarType,
        dimnames: &[&str],
    ) -> Result<(), SmioError> {
        if name.is_empty() || vtype == VarType::Unknown {
            return Err(SmioError::InvalidArgument);
        }

        // Resolve each dimension name to a backend id
        let mut dimids = Vec::with_capacity(dimnames.len());
        for dimname in dimnames {
            let mut code = 0i32;
            let mut dim = DimId::default();
            if let Some(fid) = self.fid {
                match self.ctx.backend().inq_dimid(fid, dimname) {
                    Ok(d) => dim = d,
                    Err(c) => code = c,
                }
            }
            self.bcast_code(code)?;
            dimids.push(dim);
        }

        self.ensure_define()?;

        let mut code = 0i32;
        if let Some(fid) = self.fid {
            if let Err(c) = self.ctx.backend().def_var(fid, name, vtype, &dimids) {
                code = c;
            }
        }
        self.bcast_code(code)
    }

    /// Type and dimension names of a variable.
    pub fn inquire_var(&self, name: &str) -> Result<VarInfo, SmioError> {
        let var = self.resolve_var(name)?;

        let mut code = 0i32;
        let mut vtype = VarType::Unknown;
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_vartype(fid, var) {
                Ok(t) => vtype = t,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        let vtype = VarType::from_code(self.io_group_comm.bcast_i32(vtype.code(), 0)?);

        let mut code = 0i32;
        let mut ndims = 0usize;
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_varndims(fid, var) {
                Ok(n) => ndims = n,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        let ndims = self.io_group_comm.bcast_i64(ndims as i64, 0)? as usize;

        let mut code = 0i32;
        let mut dimids = Vec::new();
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_vardimids(fid, var) {
                Ok(ids) => dimids = ids,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;

        let mut dims = Vec::with_capacity(ndims);
        for i in 0..ndims {
            let mut code = 0i32;
            let mut name_bytes = Vec::new();
            if let Some(fid) = self.fid {
                match self.ctx.backend().inq_dimname(fid, dimids[i]) {
                    Ok(n) => name_bytes = n.into_bytes(),
                    Err(c) => code = c,
                }
            }
            self.bcast_code(code)?;
            self.io_group_comm.bcast(&mut name_bytes, 0)?;
            dims.push(String::from_utf8(name_bytes).map_err(|_| SmioError::WrongArgType)?);
        }

        Ok(VarInfo { vtype, dims })
    }

    /// Attach an attribute to a variable, or to the file itself when
    /// `varname` is `None`.
    pub fn define_att(
        &mut self,
        varname: Option<&str>,
        name: &str,
        value: &AttValue,
    ) -> Result<(), SmioError> {
        if name.is_empty() {
            return Err(SmioError::InvalidArgument);
        }

        let var = match varname {
            Some(v) => Some(self.resolve_var(v)?),
            None => None,
        };

        self.ensure_define()?;

        let mut code = 0i32;
        if let Some(fid) = self.fid {
            if let Err(c) = self.ctx.backend().put_att(fid, var, name, value) {
                code = c;
            }
        }
        self.bcast_code(code)
    }

    /// Type, length and value of an attribute.
    pub fn inquire_att(
        &self,
        varname: Option<&str>,
        name: &str,
    ) -> Result<(VarType, Offset, AttValue), SmioError> {
        if name.is_empty() {
            return Err(SmioError::InvalidArgument);
        }

        let var = match varname {
            Some(v) => Some(self.resolve_var(v)?),
            None => None,
        };

        let mut code = 0i32;
        let mut vtype = VarType::Unknown;
        let mut len = -1 as Offset;
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_att(fid, var, name) {
                Ok((t, l)) => {
                    vtype = t;
                    len = l;
                }
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        let vtype = VarType::from_code(self.io_group_comm.bcast_i32(vtype.code(), 0)?);
        let len = self.io_group_comm.bcast_i64(len, 0)?;

        let mut code = 0i32;
        let mut value_bytes = Vec::new();
        if let Some(fid) = self.fid {
            match self.ctx.backend().get_att(fid, var, name) {
                Ok(v) => value_bytes = v.to_bytes(),
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        self.io_group_comm.bcast(&mut value_bytes, 0)?;

        let value =
            AttValue::from_bytes(vtype, &value_bytes).ok_or(SmioError::WrongArgType)?;
        Ok((vtype, len, value))
    }

    /// Flush all writes visible at the moment of the call to storage. Joins
    /// the writer first; a failure recorded by the writer is surfaced after
    /// the collective flush completes.
    pub fn sync(&mut self) -> Result<(), SmioError> {
        let writer_result = self.join_writer();

        self.ensure_data()?;

        let mut code = 0i32;
        if let Some(fid) = self.fid {
            if let Err(c) = self.ctx.backend().sync(fid) {
                code = c;
            }
        }
        let sync_result = self.bcast_code(code);

        writer_result?;
        sync_result
    }

    /// Set the record-frame cursor. Pure local state; no backend traffic.
    pub fn set_frame(&mut self, frame: Offset) -> Result<(), SmioError> {
        if frame < 0 {
            return Err(SmioError::InvalidArgument);
        }
        self.frame = frame;
        Ok(())
    }

    /// Current record-frame cursor.
    pub fn get_frame(&self) -> Offset {
        self.frame
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Whether this rank issues backend calls for this file.
    pub fn is_io_task(&self) -> bool {
        self.io_task
    }

    /// File-local duplicate of the I/O-task communicator; the background
    /// writer's rendezvous reductions run on it.
    pub fn io_comm(&self) -> &Arc<dyn Communicator> {
        &self.io_file_comm
    }

    pub fn state(&self) -> MetaState {
        self.state
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Broadcast a backend return code from the I/O task across its group;
    /// non-zero codes are recorded and surfaced uniformly on every rank.
    pub(crate) fn bcast_code(&self, code: i32) -> Result<(), SmioError> {
        let code = self.io_group_comm.bcast_i32(code, 0)?;
        if code != 0 {
            self.ctx.set_lib_error(code);
            return Err(SmioError::Library { code });
        }
        Ok(())
    }

    /// Resolve a variable name to a backend id, collectively.
    pub(crate) fn resolve_var(&self, name: &str) -> Result<VarId, SmioError> {
        if name.is_empty() {
            return Err(SmioError::InvalidArgument);
        }
        let mut code = 0i32;
        let mut var = VarId::default();
        if let Some(fid) = self.fid {
            match self.ctx.backend().inq_varid(fid, name) {
                Ok(v) => var = v,
                Err(c) => code = c,
            }
        }
        self.bcast_code(code)?;
        Ok(var)
    }

    /// Move to define mode if currently in data mode.
    pub(crate) fn ensure_define(&mut self) -> Result<(), SmioError> {
        if self.state == MetaState::Data {
            let mut code = 0i32;
            if let Some(fid) = self.fid {
                if let Err(c) = self.ctx.backend().redef(fid) {
                    code = c;
                }
            }
            self.bcast_code(code)?;
            self.state = MetaState::Define;
        }
        Ok(())
    }

    /// Move to data mode if currently in define mode.
    pub(crate) fn ensure_data(&mut self) -> Result<(), SmioError> {
        if self.state == MetaState::Define {
            let mut code = 0i32;
            if let Some(fid) = self.fid {
                if let Err(c) = self.ctx.backend().enddef(fid) {
                    code = c;
                }
            }
            self.bcast_code(code)?;
            self.state = MetaState::Data;
        }
        Ok(())
    }

    /// Wait for the background writer to drain and exit; surfaces the first
    /// failure it recorded.
    pub(crate) fn join_writer(&self) -> Result<(), SmioError> {
        match &self.writer {
            Some(w) => w.join(),
            None => Ok(()),
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        // Dropping without close still joins the writer so no thread outlives
        // the file; backend-handle cleanup needs the collective close path.
        let _ = self.join_writer();
    }
}
