use serde::Serialize;

/// Aggregated result of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ranks: usize,
    pub num_io_tasks: usize,
    pub io_stride: usize,
    pub elements: usize,
    pub frames: usize,
    pub agg_factor: usize,
    /// Payload bytes moved in each direction
    pub bytes: usize,
    /// Slowest rank's wall time for the write phase (put + sync), seconds
    pub write_seconds: f64,
    /// Slowest rank's wall time for the read phase, seconds
    pub read_seconds: f64,
    pub write_mib_per_s: f64,
    pub read_mib_per_s: f64,
    /// Elements that read back different from what was written
    pub verify_errors: usize,
}

impl RunReport {
    pub fn from_phases(
        ranks: usize,
        num_io_tasks: usize,
        io_stride: usize,
        elements: usize,
        frames: usize,
        agg_factor: usize,
        bytes: usize,
        write_seconds: f64,
        read_seconds: f64,
        verify_errors: usize,
    ) -> RunReport {
        let mib = bytes as f64 / (1024.0 * 1024.0);
        RunReport {
            ranks,
            num_io_tasks,
            io_stride,
            elements,
            frames,
            agg_factor,
            bytes,
            write_seconds,
            read_seconds,
            write_mib_per_s: if write_seconds > 0.0 { mib / write_seconds } else { 0.0 },
            read_mib_per_s: if read_seconds > 0.0 { mib / read_seconds } else { 0.0 },
            verify_errors,
        }
    }
}

/// Text summary printed by the driver.
pub fn print_report(report: &RunReport) {
    println!(
        "write: {:>10.2} MiB/s  ({:.4} s)",
        report.write_mib_per_s, report.write_seconds
    );
    println!(
        "read:  {:>10.2} MiB/s  ({:.4} s)",
        report.read_mib_per_s, report.read_seconds
    );
    println!(
        "moved {} bytes over {} frames, {} verify errors",
        report.bytes, report.frames, report.verify_errors
    );
}
