use crate::comm::Communicator;
use crate::decomp::{Decomp, ExchangeGroup};
use crate::error::SmioError;

/// Message tag used for field transfers.
const TAG_TRANSFER: i32 = 2;

/// Direction of a field transfer relative to the exchange plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Compute buffers feed the I/O-range buffers (write path)
    CompToIo,
    /// I/O-range buffers feed the compute buffers (read path)
    IoToComp,
}

/// Move `element_size`-byte elements between the compute-side and I/O-side
/// buffers of an exchange plan.
///
/// The plan's group order is the wire order: for every sender-side group a
/// message of `idx.len() * element_size` bytes is posted, gathered from the
/// `idx` positions of `input`; the matching receiver-side group scatters it
/// into the `idx` positions of `output`. Element contents are opaque. On any
/// messaging failure the transfer aborts and `output` is indeterminate.
pub fn transfer_field(
    decomp: &Decomp,
    direction: Direction,
    element_size: usize,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), SmioError> {
    if element_size == 0 {
        return Err(SmioError::InvalidArgument);
    }

    let (send_list, recv_list) = match direction {
        Direction::CompToIo => (&decomp.comp_list, &decomp.io_list),
        Direction::IoToComp => (&decomp.io_list, &decomp.comp_list),
    };

    check_span(send_list, element_size, input.len())?;
    check_span(recv_list, element_size, output.len())?;

    let comm = decomp.comm();

    // Post every send before any receive; sends are buffered and may target
    // this rank itself
    for group in send_list {
        let mut packed = Vec::with_capacity(group.idx.len() * element_size);
        for &i in &group.idx {
            packed.extend_from_slice(&input[i * element_size..(i + 1) * element_size]);
        }
        comm.send(&packed, group.peer, TAG_TRANSFER)?;
    }

    for group in recv_list {
        let bytes = comm.recv(group.peer, TAG_TRANSFER)?;
        if bytes.len() != group.idx.len() * element_size {
            return Err(SmioError::Messaging(crate::comm::CommError::new("recv")));
        }
        for (j, &i) in group.idx.iter().enumerate() {
            output[i * element_size..(i + 1) * element_size]
                .copy_from_slice(&bytes[j * element_size..(j + 1) * element_size]);
        }
    }

    Ok(())
}

/// Every position touched by the groups must fall inside a buffer of
/// `len` bytes.
fn check_span(
    list: &[ExchangeGroup],
    element_size: usize,
    len: usize,
) -> Result<(), SmioError> {
    for group in list {
        for &i in &group.idx {
            if (i + 1) * element_size > len {
                return Err(SmioError::InsufficientArg);
            }
        }
    }
    Ok(())
}
