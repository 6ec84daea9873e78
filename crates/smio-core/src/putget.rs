use std::sync::Arc;

use crate::comm::Communicator;
use crate::decomp::Decomp;
use crate::error::SmioError;
use crate::file::File;
use crate::transfer::{Direction, transfer_field};
use crate::types::VarType;
use crate::writer::WriteJob;

/// Parallel-access geometry of one variable for one rank: effective element
/// size in bytes (type size folded with every non-decomposed, non-record
/// dimension) and the start/count vectors for the backend call.
struct StartCount {
    element_size: usize,
    start: Vec<usize>,
    count: Vec<usize>,
}

impl File {
    /// Write a variable.
    ///
    /// With a decomposition, `buf` holds this rank's compute partition
    /// (`n_compute` elements in the order the decomposition was created
    /// from); the elements are redistributed to the I/O tasks and the write
    /// is queued on the background writer. Without a decomposition every rank
    /// passes the full record and the backend write collapses to a single
    /// writer (rank 0).
    ///
    /// Returns as soon as the descriptor is queued; it never blocks on I/O.
    /// Failures from previously queued writes surface on the next call that
    /// joins the writer (`sync`, `get_var`, `close`).
    pub fn put_var(
        &mut self,
        varname: &str,
        decomp: Option<&Decomp>,
        buf: &[u8],
    ) -> Result<(), SmioError> {
        if varname.is_empty() || !self.mode.writable() {
            return Err(SmioError::InvalidArgument);
        }
        if let Some(d) = decomp {
            if !Arc::ptr_eq(d.context(), &self.ctx) {
                return Err(SmioError::InvalidArgument);
            }
        }

        let sc = build_start_count(self, varname, decomp, true)?;
        let esize = sc.element_size;

        // Redistribute compute partitions onto the I/O ranges
        let io_buf = match decomp {
            Some(d) => {
                if buf.len() < d.n_compute * esize {
                    return Err(SmioError::InsufficientArg);
                }
                let mut out = vec![0u8; d.io_count * esize];
                match &d.agg {
                    Some(agg) => {
                        let counts: Vec<usize> = agg.counts.iter().map(|&c| c * esize).collect();
                        let displs: Vec<usize> = agg.displs.iter().map(|&d| d * esize).collect();
                        let mut agg_buf = vec![0u8; agg.n_compute_agg * esize];
                        let recv = if agg.comm.rank() == 0 {
                            Some(&mut agg_buf[..])
                        } else {
                            None
                        };
                        agg.comm
                            .gatherv(&buf[..d.n_compute * esize], recv, &counts, &displs, 0)?;
                        transfer_field(d, Direction::CompToIo, esize, &agg_buf, &mut out)?;
                    }
                    None => transfer_field(
                        d,
                        Direction::CompToIo,
                        esize,
                        &buf[..d.n_compute * esize],
                        &mut out,
                    )?,
                }
                Some(out)
            }
            None => {
                if buf.len() < esize {
                    return Err(SmioError::InsufficientArg);
                }
                None
            }
        };

        self.ensure_data()?;
        let var = self.resolve_var(varname)?;

        if let Some(writer) = &self.writer {
            // The descriptor owns its copy of the data; the writer frees it
            // once the backend has taken it
            let data = match io_buf {
                Some(v) => v,
                None => buf[..esize].to_vec(),
            };
            Arc::clone(writer).submit(WriteJob {
                var,
                start: sc.start,
                count: sc.count,
                data,
            });
        }

        Ok(())
    }

    /// Read a variable.
    ///
    /// Joins the writer first, so reads observe every prior write to this
    /// file. With a decomposition, the I/O ranges are read collectively and
    /// redistributed into `buf` (this rank's compute partition); without one,
    /// every rank receives the full record.
    pub fn get_var(
        &mut self,
        varname: &str,
        decomp: Option<&Decomp>,
        buf: &mut [u8],
    ) -> Result<(), SmioError> {
        if varname.is_empty() {
            return Err(SmioError::InvalidArgument);
        }
        if let Some(d) = decomp {
            if !Arc::ptr_eq(d.context(), &self.ctx) {
                return Err(SmioError::InvalidArgument);
            }
        }

        let sc = build_start_count(self, varname, decomp, false)?;
        let esize = sc.element_size;
        match decomp {
            Some(d) if buf.len() < d.n_compute * esize => return Err(SmioError::InsufficientArg),
            None if buf.len() < esize => return Err(SmioError::InsufficientArg),
            _ => {}
        }

        // Reads are never queued and must observe all queued writes. The
        // writer's verdict is surfaced only after the collective read, so
        // every rank walks the same sequence of collectives.
        let writer_result = self.join_writer();

        self.ensure_data()?;
        let var = self.resolve_var(varname)?;

        match decomp {
            Some(d) => {
                let mut in_buf = vec![0u8; d.io_count * esize];
                let mut code = 0i32;
                if let Some(fid) = self.fid {
                    if let Err(c) =
                        self.ctx
                            .backend()
                            .get_vara_all(fid, var, &sc.start, &sc.count, &mut in_buf)
                    {
                        code = c;
                    }
                }
                self.bcast_code(code)?;

                match &d.agg {
                    Some(agg) => {
                        let counts: Vec<usize> = agg.counts.iter().map(|&c| c * esize).collect();
                        let displs: Vec<usize> = agg.displs.iter().map(|&d| d * esize).collect();
                        let mut agg_buf = vec![0u8; agg.n_compute_agg * esize];
                        transfer_field(d, Direction::IoToComp, esize, &in_buf, &mut agg_buf)?;
                        let send = if agg.comm.rank() == 0 {
                            Some(&agg_buf[..])
                        } else {
                            None
                        };
                        agg.comm.scatterv(
                            send,
                            &counts,
                            &displs,
                            &mut buf[..d.n_compute * esize],
                            0,
                        )?;
                    }
                    None => transfer_field(
                        d,
                        Direction::IoToComp,
                        esize,
                        &in_buf,
                        &mut buf[..d.n_compute * esize],
                    )?,
                }
            }
            None => {
                let mut code = 0i32;
                if let Some(fid) = self.fid {
                    if let Err(c) = self.ctx.backend().get_vara_all(
                        fid,
                        var,
                        &sc.start,
                        &sc.count,
                        &mut buf[..esize],
                    ) {
                        code = c;
                    }
                }
                self.bcast_code(code)?;

                // Non-I/O ranks learn the record from their I/O task
                let mut bytes = buf[..esize].to_vec();
                self.io_group_comm.bcast(&mut bytes, 0)?;
                buf[..esize].copy_from_slice(&bytes);
            }
        }

        writer_result
    }
}

/// Derive element size and the start/count vectors for one access.
///
/// The slowest-varying dimension, when unlimited, is pinned to the current
/// frame. With a decomposition, the slowest non-record dimension carries the
/// rank's I/O range; every other dimension is folded into the element size.
/// On writes of non-decomposed variables only rank 0 keeps non-zero counts,
/// collapsing the backend collective to a single writer.
fn build_start_count(
    file: &File,
    varname: &str,
    decomp: Option<&Decomp>,
    for_write: bool,
) -> Result<StartCount, SmioError> {
    let info = file.inquire_var(varname)?;
    if info.vtype == VarType::Unknown {
        return Err(SmioError::WrongArgType);
    }

    let ndims = info.dims.len();
    let mut element_size = info.vtype.size();

    // Only the slowest-varying dimension can be the unlimited one
    let mut dimsizes = Vec::with_capacity(ndims);
    let mut has_unlimited = false;
    for (i, dimname) in info.dims.iter().enumerate() {
        let (size, is_unlimited) = file.inquire_dim(dimname)?;
        dimsizes.push(size.max(0) as usize);
        if i == 0 && is_unlimited {
            has_unlimited = true;
        }
    }

    // A decomposition needs a non-record dimension to decompose
    if decomp.is_some() && ndims == usize::from(has_unlimited) {
        return Err(SmioError::InvalidArgument);
    }

    let mut start = vec![0usize; ndims];
    let mut count = vec![0usize; ndims];
    for i in 0..ndims {
        start[i] = 0;
        count[i] = dimsizes[i];

        if has_unlimited && i == 0 {
            start[i] = file.get_frame() as usize;
            count[i] = 1;
        }

        if let Some(d) = decomp {
            if (!has_unlimited && i == 0) || (has_unlimited && i == 1) {
                start[i] = d.io_start;
                count[i] = d.io_count;
            } else {
                element_size *= count[i];
            }
        } else {
            element_size *= count[i];
        }

        if for_write && decomp.is_none() && file.context().rank() != 0 {
            count[i] = 0;
        }
    }

    Ok(StartCount {
        element_size,
        start,
        count,
    })
}
