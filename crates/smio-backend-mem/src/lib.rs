//! In-memory implementation of the self-describing-array backend: named
//! stores of dimensions, variables, attributes and record frames, with
//! buffered non-blocking puts staged in an attached pinned buffer.
//!
//! Several ranks of one process may hold handles to the same store, the way
//! ranks of a collective file library share one file. Definition calls are
//! therefore idempotent: re-defining an existing dimension, variable or
//! attribute with identical parameters returns the existing id, which is how
//! the per-rank handles of a collective definition converge. Mismatched
//! re-definitions fail.
//!
//! Every store keeps an event trace (puts and flushes) for diagnostics.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use smio_core::backend::{Backend, BackendCode, DimId, FileId, ReqId, VarId};
use smio_core::pinned_buf::PinnedBuffer;
use smio_core::types::{AttValue, Offset, VarType};

/// Native error codes of the mem backend.
pub mod codes {
    pub const BAD_ID: i32 = -1;
    pub const NO_SUCH_FILE: i32 = -2;
    pub const NAME_IN_USE: i32 = -3;
    pub const BAD_DIM: i32 = -4;
    pub const BAD_VAR: i32 = -5;
    pub const BAD_ATT: i32 = -6;
    pub const IN_DEFINE_MODE: i32 = -7;
    pub const NOT_IN_DEFINE_MODE: i32 = -8;
    pub const BAD_COORDS: i32 = -9;
    pub const NOT_WRITABLE: i32 = -10;
    pub const NO_BUFFER: i32 = -11;
    pub const BUFFER_FULL: i32 = -12;
    pub const PENDING_REQUESTS: i32 = -13;
    pub const SECOND_UNLIMITED: i32 = -14;
    pub const RECORD_NOT_FIRST: i32 = -15;
    pub const BAD_SLAB: i32 = -16;
}

/// One entry of a store's diagnostic trace.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A buffered put was staged (`bytes` of payload)
    Put { bytes: usize },
    /// A wait drained `applied` staged puts
    Flush { applied: usize },
}

struct Dim {
    name: String,
    len: usize,
    unlimited: bool,
}

struct Var {
    name: String,
    vtype: VarType,
    dims: Vec<usize>,
    data: Vec<u8>,
}

struct Store {
    dims: Vec<Dim>,
    vars: Vec<Var>,
    /// Keyed by (variable index or -1 for global, attribute name)
    atts: BTreeMap<(i64, String), AttValue>,
    define_mode: bool,
    nrecords: usize,
    open_handles: usize,
    events: Vec<Event>,
}

impl Store {
    fn fresh() -> Store {
        Store {
            dims: Vec::new(),
            vars: Vec::new(),
            atts: BTreeMap::new(),
            define_mode: true,
            nrecords: 0,
            open_handles: 0,
            events: Vec::new(),
        }
    }
}

struct PendingPut {
    req: i32,
    var: usize,
    start: Vec<usize>,
    count: Vec<usize>,
    offset: usize,
    len: usize,
}

struct Handle {
    store: usize,
    writable: bool,
    buffer: Option<PinnedBuffer>,
    used: usize,
    pending: Vec<PendingPut>,
    next_req: i32,
}

#[derive(Default)]
struct Inner {
    stores: Vec<Store>,
    by_name: BTreeMap<String, usize>,
    handles: Vec<Option<Handle>>,
}

/// The backend itself; one instance plays the role of the shared filesystem
/// and is handed to every rank.
#[derive(Default)]
pub struct MemBackend {
    inner: Mutex<Inner>,
}

impl MemBackend {
    pub fn new() -> MemBackend {
        MemBackend::default()
    }

    /// Diagnostic trace of a store, in event order.
    pub fn events(&self, path: &str) -> Vec<Event> {
        let inner = self.inner.lock().unwrap();
        match inner.by_name.get(path) {
            Some(&s) => inner.stores[s].events.clone(),
            None => Vec::new(),
        }
    }

    /// Number of flush events recorded for a store.
    pub fn flush_count(&self, path: &str) -> usize {
        self.events(path)
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Flush { .. }))
            .count()
    }

    /// Deterministic serialization of a store's full content (structure,
    /// attributes and data, excluding the event trace). Two stores with
    /// identical contents serialize identically.
    pub fn snapshot(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let store = &inner.stores[*inner.by_name.get(path)?];

        let mut out = Vec::new();
        out.extend_from_slice(&(store.nrecords as u64).to_ne_bytes());
        out.extend_from_slice(&(store.dims.len() as u64).to_ne_bytes());
        for d in &store.dims {
            push_str(&mut out, &d.name);
            out.extend_from_slice(&(d.len as u64).to_ne_bytes());
            out.push(d.unlimited as u8);
        }
        out.extend_from_slice(&(store.vars.len() as u64).to_ne_bytes());
        for v in &store.vars {
            push_str(&mut out, &v.name);
            out.extend_from_slice(&v.vtype.code().to_ne_bytes());
            out.extend_from_slice(&(v.dims.len() as u64).to_ne_bytes());
            for &d in &v.dims {
                out.extend_from_slice(&(d as u64).to_ne_bytes());
            }
            out.extend_from_slice(&(v.data.len() as u64).to_ne_bytes());
            out.extend_from_slice(&v.data);
        }
        out.extend_from_slice(&(store.atts.len() as u64).to_ne_bytes());
        for ((target, name), value) in &store.atts {
            out.extend_from_slice(&target.to_ne_bytes());
            push_str(&mut out, name);
            out.extend_from_slice(&value.var_type().code().to_ne_bytes());
            let bytes = value.to_bytes();
            out.extend_from_slice(&(bytes.len() as u64).to_ne_bytes());
            out.extend_from_slice(&bytes);
        }
        Some(out)
    }
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_ne_bytes());
    out.extend_from_slice(s.as_bytes());
}

impl Inner {
    fn handle(&self, fid: FileId) -> Result<&Handle, BackendCode> {
        self.handles
            .get(fid.0)
            .and_then(|h| h.as_ref())
            .ok_or(codes::BAD_ID)
    }

    fn handle_mut(&mut self, fid: FileId) -> Result<&mut Handle, BackendCode> {
        self.handles
            .get_mut(fid.0)
            .and_then(|h| h.as_mut())
            .ok_or(codes::BAD_ID)
    }

    fn store_of(&self, fid: FileId) -> Result<(&Handle, &Store), BackendCode> {
        let h = self.handle(fid)?;
        Ok((h, &self.stores[h.store]))
    }

    fn new_handle(&mut self, handle: Handle) -> FileId {
        for (i, slot) in self.handles.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(handle);
                return FileId(i);
            }
        }
        self.handles.push(Some(handle));
        FileId(self.handles.len() - 1)
    }
}

/// Apply or extract a hyperslab of `count` elements at `start` within a
/// variable's row-major array. `shape` is the variable's full shape with the
/// record dimension already grown to cover the access.
fn copy_slab(
    var_data: &mut Vec<u8>,
    shape: &[usize],
    start: &[usize],
    count: &[usize],
    typesize: usize,
    payload: &mut [u8],
    writing: bool,
) -> Result<(), BackendCode> {
    let total: usize = count.iter().product::<usize>() * typesize;
    if total == 0 {
        return Ok(());
    }
    if payload.len() < total {
        return Err(codes::BAD_SLAB);
    }

    // Make sure the flattened array covers the slab; unwritten space is zero
    let full: usize = shape.iter().product::<usize>() * typesize;
    if var_data.len() < full {
        var_data.resize(full, 0);
    }

    // Row-major strides in elements
    let ndims = shape.len();
    let mut strides = vec![1usize; ndims];
    for i in (0..ndims.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }

    if ndims == 0 {
        if writing {
            var_data[..typesize].copy_from_slice(&payload[..typesize]);
        } else {
            payload[..typesize].copy_from_slice(&var_data[..typesize]);
        }
        return Ok(());
    }

    // Odometer over all but the innermost dimension; the innermost run is
    // contiguous
    let inner_run = count[ndims - 1] * typesize;
    let mut index = vec![0usize; ndims - 1];
    let mut src_off = 0usize;
    loop {
        let mut base = start[ndims - 1];
        for i in 0..ndims - 1 {
            base += (start[i] + index[i]) * strides[i];
        }
        let dst = base * typesize;
        if writing {
            var_data[dst..dst + inner_run].copy_from_slice(&payload[src_off..src_off + inner_run]);
        } else {
            payload[src_off..src_off + inner_run].copy_from_slice(&var_data[dst..dst + inner_run]);
        }
        src_off += inner_run;

        // Advance the odometer
        let mut i = ndims.saturating_sub(1);
        loop {
            if i == 0 {
                return Ok(());
            }
            i -= 1;
            index[i] += 1;
            if index[i] < count[i] {
                break;
            }
            index[i] = 0;
        }
    }
}

/// Validate an access and return the grown shape of the variable.
fn slab_shape(
    store: &Store,
    var: usize,
    start: &[usize],
    count: &[usize],
    writing: bool,
) -> Result<Vec<usize>, BackendCode> {
    let v = store.vars.get(var).ok_or(codes::BAD_VAR)?;
    if start.len() != v.dims.len() || count.len() != v.dims.len() {
        return Err(codes::BAD_SLAB);
    }
    let mut shape = Vec::with_capacity(v.dims.len());
    for (i, &d) in v.dims.iter().enumerate() {
        let dim = &store.dims[d];
        if dim.unlimited {
            let extent = if writing {
                (start[i] + count[i]).max(store.nrecords)
            } else {
                store.nrecords
            };
            if !writing && count[i] > 0 && start[i] + count[i] > extent {
                return Err(codes::BAD_COORDS);
            }
            shape.push(extent);
        } else {
            if count[i] > 0 && start[i] + count[i] > dim.len {
                return Err(codes::BAD_COORDS);
            }
            shape.push(dim.len);
        }
    }
    Ok(shape)
}

impl Backend for MemBackend {
    fn name(&self) -> &str {
        "mem"
    }

    fn create(&self, path: &str) -> Result<FileId, BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = match inner.by_name.get(path).copied() {
            Some(s) => {
                // Other ranks of a collective create join the live store;
                // a create against a closed store clobbers it
                if inner.stores[s].open_handles == 0 {
                    inner.stores[s] = Store::fresh();
                }
                s
            }
            None => {
                inner.stores.push(Store::fresh());
                let s = inner.stores.len() - 1;
                inner.by_name.insert(path.to_string(), s);
                s
            }
        };
        inner.stores[store].open_handles += 1;
        Ok(inner.new_handle(Handle {
            store,
            writable: true,
            buffer: None,
            used: 0,
            pending: Vec::new(),
            next_req: 0,
        }))
    }

    fn open(&self, path: &str, writable: bool) -> Result<FileId, BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = inner
            .by_name
            .get(path)
            .copied()
            .ok_or(codes::NO_SUCH_FILE)?;
        inner.stores[store].open_handles += 1;
        inner.stores[store].define_mode = false;
        Ok(inner.new_handle(Handle {
            store,
            writable,
            buffer: None,
            used: 0,
            pending: Vec::new(),
            next_req: 0,
        }))
    }

    fn close(&self, fid: FileId) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let h = inner.handle(fid)?;
        if !h.pending.is_empty() {
            return Err(codes::PENDING_REQUESTS);
        }
        let store = h.store;
        inner.handles[fid.0] = None;
        inner.stores[store].open_handles -= 1;
        Ok(())
    }

    fn enddef(&self, fid: FileId) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = inner.handle(fid)?.store;
        inner.stores[store].define_mode = false;
        Ok(())
    }

    fn redef(&self, fid: FileId) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let h = inner.handle(fid)?;
        if !h.writable {
            return Err(codes::NOT_WRITABLE);
        }
        let store = h.store;
        inner.stores[store].define_mode = true;
        Ok(())
    }

    fn def_dim(&self, fid: FileId, name: &str, len: Option<Offset>) -> Result<DimId, BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = inner.handle(fid)?.store;
        let store = &mut inner.stores[store];
        if !store.define_mode {
            return Err(codes::NOT_IN_DEFINE_MODE);
        }
        let (len, unlimited) = match len {
            None => (0usize, true),
            Some(l) if l > 0 => (l as usize, false),
            Some(_) => return Err(codes::BAD_DIM),
        };

        if let Some((i, d)) = store.dims.iter().enumerate().find(|(_, d)| d.name == name) {
            // Collective re-definition with identical parameters converges
            return if d.len == len && d.unlimited == unlimited {
                Ok(DimId(i as i32))
            } else {
                Err(codes::NAME_IN_USE)
            };
        }
        if unlimited && store.dims.iter().any(|d| d.unlimited) {
            return Err(codes::SECOND_UNLIMITED);
        }

        store.dims.push(Dim {
            name: name.to_string(),
            len,
            unlimited,
        });
        Ok(DimId(store.dims.len() as i32 - 1))
    }

    fn inq_dimid(&self, fid: FileId, name: &str) -> Result<DimId, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .dims
            .iter()
            .position(|d| d.name == name)
            .map(|i| DimId(i as i32))
            .ok_or(codes::BAD_DIM)
    }

    fn inq_dimlen(&self, fid: FileId, dim: DimId) -> Result<Offset, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        let d = store.dims.get(dim.0 as usize).ok_or(codes::BAD_DIM)?;
        Ok(if d.unlimited {
            store.nrecords as Offset
        } else {
            d.len as Offset
        })
    }

    fn inq_dimname(&self, fid: FileId, dim: DimId) -> Result<String, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .dims
            .get(dim.0 as usize)
            .map(|d| d.name.clone())
            .ok_or(codes::BAD_DIM)
    }

    fn inq_unlimdim(&self, fid: FileId) -> Result<Option<DimId>, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        Ok(store
            .dims
            .iter()
            .position(|d| d.unlimited)
            .map(|i| DimId(i as i32)))
    }

    fn def_var(
        &self,
        fid: FileId,
        name: &str,
        vtype: VarType,
        dims: &[DimId],
    ) -> Result<VarId, BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = inner.handle(fid)?.store;
        let store = &mut inner.stores[store];
        if !store.define_mode {
            return Err(codes::NOT_IN_DEFINE_MODE);
        }

        let mut dim_idx = Vec::with_capacity(dims.len());
        for (i, d) in dims.iter().enumerate() {
            let idx = d.0 as usize;
            let dim = store.dims.get(idx).ok_or(codes::BAD_DIM)?;
            if dim.unlimited && i != 0 {
                return Err(codes::RECORD_NOT_FIRST);
            }
            dim_idx.push(idx);
        }

        if let Some((i, v)) = store.vars.iter().enumerate().find(|(_, v)| v.name == name) {
            return if v.vtype == vtype && v.dims == dim_idx {
                Ok(VarId(i as i32))
            } else {
                Err(codes::NAME_IN_USE)
            };
        }

        store.vars.push(Var {
            name: name.to_string(),
            vtype,
            dims: dim_idx,
            data: Vec::new(),
        });
        Ok(VarId(store.vars.len() as i32 - 1))
    }

    fn inq_varid(&self, fid: FileId, name: &str) -> Result<VarId, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .vars
            .iter()
            .position(|v| v.name == name)
            .map(|i| VarId(i as i32))
            .ok_or(codes::BAD_VAR)
    }

    fn inq_vartype(&self, fid: FileId, var: VarId) -> Result<VarType, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .vars
            .get(var.0 as usize)
            .map(|v| v.vtype)
            .ok_or(codes::BAD_VAR)
    }

    fn inq_varndims(&self, fid: FileId, var: VarId) -> Result<usize, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .vars
            .get(var.0 as usize)
            .map(|v| v.dims.len())
            .ok_or(codes::BAD_VAR)
    }

    fn inq_vardimids(&self, fid: FileId, var: VarId) -> Result<Vec<DimId>, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        store
            .vars
            .get(var.0 as usize)
            .map(|v| v.dims.iter().map(|&d| DimId(d as i32)).collect())
            .ok_or(codes::BAD_VAR)
    }

    fn put_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
        value: &AttValue,
    ) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store = inner.handle(fid)?.store;
        let store = &mut inner.stores[store];
        if !store.define_mode {
            return Err(codes::NOT_IN_DEFINE_MODE);
        }
        let target = match var {
            Some(v) => {
                if store.vars.get(v.0 as usize).is_none() {
                    return Err(codes::BAD_VAR);
                }
                v.0 as i64
            }
            None => -1,
        };
        store.atts.insert((target, name.to_string()), value.clone());
        Ok(())
    }

    fn inq_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
    ) -> Result<(VarType, Offset), BackendCode> {
        let value = self.get_att(fid, var, name)?;
        Ok((value.var_type(), value.len()))
    }

    fn get_att(
        &self,
        fid: FileId,
        var: Option<VarId>,
        name: &str,
    ) -> Result<AttValue, BackendCode> {
        let inner = self.inner.lock().unwrap();
        let (_, store) = inner.store_of(fid)?;
        let target = match var {
            Some(v) => v.0 as i64,
            None => -1,
        };
        store
            .atts
            .get(&(target, name.to_string()))
            .cloned()
            .ok_or(codes::BAD_ATT)
    }

    fn bput_vara(
        &self,
        fid: FileId,
        var: VarId,
        start: &[usize],
        count: &[usize],
        data: &[u8],
    ) -> Result<ReqId, BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let (h, store) = inner.store_of(fid)?;
        if !h.writable {
            return Err(codes::NOT_WRITABLE);
        }
        if store.define_mode {
            return Err(codes::IN_DEFINE_MODE);
        }
        let v = store.vars.get(var.0 as usize).ok_or(codes::BAD_VAR)?;
        // Validate the slab now; it is applied at wait time
        slab_shape(store, var.0 as usize, start, count, true)?;
        let len = count.iter().product::<usize>() * v.vtype.size();
        if data.len() < len {
            return Err(codes::BAD_SLAB);
        }
        let store_idx = h.store;

        let h = inner.handle_mut(fid)?;
        let buffer = h.buffer.as_mut().ok_or(codes::NO_BUFFER)?;
        if h.used + len > buffer.len() {
            return Err(codes::BUFFER_FULL);
        }
        buffer[h.used..h.used + len].copy_from_slice(&data[..len]);
        let req = h.next_req;
        h.next_req += 1;
        h.pending.push(PendingPut {
            req,
            var: var.0 as usize,
            start: start.to_vec(),
            count: count.to_vec(),
            offset: h.used,
            len,
        });
        h.used += len;

        inner.stores[store_idx].events.push(Event {
            kind: EventKind::Put { bytes: len },
            at: Instant::now(),
        });
        Ok(ReqId(req))
    }

    fn wait_all(&self, fid: FileId, reqs: &[ReqId]) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let h = inner.handle_mut(fid)?;
        let store_idx = h.store;

        // Complete only the named requests, in submission order; the rest
        // stay pending at their staged offsets
        let pending = std::mem::take(&mut h.pending);
        let (ready, kept): (Vec<PendingPut>, Vec<PendingPut>) = pending
            .into_iter()
            .partition(|p| reqs.contains(&ReqId(p.req)));

        // Move the staged payloads out before touching the store
        let mut staged: Vec<(PendingPut, Vec<u8>)> = Vec::with_capacity(ready.len());
        if let Some(buffer) = h.buffer.as_ref() {
            for p in ready {
                let payload = buffer[p.offset..p.offset + p.len].to_vec();
                staged.push((p, payload));
            }
        }

        h.pending = kept;
        // Buffer space is reclaimed only once no request holds any of it
        if h.pending.is_empty() {
            h.used = 0;
        }

        let applied = staged.len();
        let store = &mut inner.stores[store_idx];
        for (p, mut payload) in staged {
            let shape = slab_shape(store, p.var, &p.start, &p.count, true)?;
            let typesize = store.vars[p.var].vtype.size();
            let writes_data = p.count.iter().all(|&c| c > 0);
            if writes_data
                && store.vars[p.var].dims.first().map(|&d| store.dims[d].unlimited) == Some(true)
            {
                store.nrecords = store.nrecords.max(p.start[0] + p.count[0]);
            }
            copy_slab(
                &mut store.vars[p.var].data,
                &shape,
                &p.start,
                &p.count,
                typesize,
                &mut payload,
                true,
            )?;
        }
        store.events.push(Event {
            kind: EventKind::Flush { applied },
            at: Instant::now(),
        });
        Ok(())
    }

    fn get_vara_all(
        &self,
        fid: FileId,
        var: VarId,
        start: &[usize],
        count: &[usize],
        data: &mut [u8],
    ) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let store_idx = inner.handle(fid)?.store;
        let store = &mut inner.stores[store_idx];
        if store.define_mode {
            return Err(codes::IN_DEFINE_MODE);
        }
        let shape = slab_shape(store, var.0 as usize, start, count, false)?;
        let typesize = store.vars[var.0 as usize].vtype.size();
        copy_slab(
            &mut store.vars[var.0 as usize].data,
            &shape,
            start,
            count,
            typesize,
            data,
            false,
        )
    }

    fn sync(&self, _fid: FileId) -> Result<(), BackendCode> {
        // Memory is its own storage; completed writes are already durable
        Ok(())
    }

    fn attach_buffer(&self, fid: FileId, size: usize) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let h = inner.handle_mut(fid)?;
        h.buffer = Some(PinnedBuffer::new(size));
        h.used = 0;
        Ok(())
    }

    fn detach_buffer(&self, fid: FileId) -> Result<(), BackendCode> {
        let mut inner = self.inner.lock().unwrap();
        let h = inner.handle_mut(fid)?;
        if !h.pending.is_empty() {
            return Err(codes::PENDING_REQUESTS);
        }
        h.buffer = None;
        h.used = 0;
        Ok(())
    }

    fn buffer_usage(&self, fid: FileId) -> Result<usize, BackendCode> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.handle(fid)?.used)
    }

    fn error_string(&self, code: BackendCode) -> String {
        match code {
            codes::BAD_ID => "bad file id",
            codes::NO_SUCH_FILE => "no such file",
            codes::NAME_IN_USE => "name already in use with different parameters",
            codes::BAD_DIM => "unknown or invalid dimension",
            codes::BAD_VAR => "unknown variable",
            codes::BAD_ATT => "unknown attribute",
            codes::IN_DEFINE_MODE => "operation illegal in define mode",
            codes::NOT_IN_DEFINE_MODE => "operation requires define mode",
            codes::BAD_COORDS => "slab exceeds dimension bounds",
            codes::NOT_WRITABLE => "file not open for writing",
            codes::NO_BUFFER => "no buffer attached",
            codes::BUFFER_FULL => "attached buffer exhausted",
            codes::PENDING_REQUESTS => "requests still pending",
            codes::SECOND_UNLIMITED => "only one unlimited dimension is allowed",
            codes::RECORD_NOT_FIRST => "unlimited dimension must come first",
            codes::BAD_SLAB => "start/count does not match the variable",
            _ => "unknown mem backend error",
        }
        .to_string()
    }
}
