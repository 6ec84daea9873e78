/// Default capacity of the pinned backend buffer attached to writable files.
pub const DEFAULT_BUFSIZE: usize = 512 * 1024 * 1024;

/// Default number of outstanding non-blocking put requests per file.
pub const DEFAULT_N_REQS: usize = 512;

/// Aggregation factor used by [`crate::decomp::Decomp::create_aggregated`]:
/// the sub-group width when aggregation is requested without an explicit
/// factor.
pub const DEFAULT_AGG_FACTOR: usize = 5;

/// Tuning knobs fixed at context initialization.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity in bytes of the pinned buffer attached to the backend for
    /// write-like file modes. The writer flushes before any participant
    /// would exceed this.
    pub bufsize: usize,
    /// Number of request slots per file; the writer flushes when all slots
    /// are in use.
    pub n_reqs: usize,
    /// CPU cores the writer thread pins itself to on launch. Empty means no
    /// pinning. Only honored on Linux.
    pub writer_affinity: Vec<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bufsize: DEFAULT_BUFSIZE,
            n_reqs: DEFAULT_N_REQS,
            writer_affinity: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.bufsize, 512 * 1024 * 1024);
        assert_eq!(cfg.n_reqs, 512);
        assert!(cfg.writer_affinity.is_empty());
    }
}
