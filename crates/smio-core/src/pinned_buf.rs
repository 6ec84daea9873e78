use std::alloc::{Layout, alloc_zeroed, dealloc};

/// Page-aligned pinned buffer backing a backend's buffered non-blocking puts.
///
/// Aligned to the system page size so backends that stage data for direct or
/// registered I/O can use the memory as-is.
pub struct PinnedBuffer {
    ptr: *mut u8,
    layout: Layout,
    len: usize,
}

impl PinnedBuffer {
    /// Allocate a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let layout =
            Layout::from_size_align(size.max(1), page_size).expect("invalid pinned buffer layout");
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        Self { ptr, layout, len: size }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for PinnedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl std::ops::DerefMut for PinnedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

// Safety: the buffer owns its allocation; no aliasing beyond the borrows
// handed out above.
unsafe impl Send for PinnedBuffer {}
unsafe impl Sync for PinnedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_aligned() {
        let buf = PinnedBuffer::new(8192);
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        assert_eq!(buf.ptr as usize % page, 0);
        assert_eq!(buf.len(), 8192);
    }

    #[test]
    fn test_zeroed_and_writable() {
        let mut buf = PinnedBuffer::new(64);
        assert!(buf.iter().all(|&b| b == 0));
        buf[63] = 0xAB;
        assert_eq!(buf[63], 0xAB);
    }
}
