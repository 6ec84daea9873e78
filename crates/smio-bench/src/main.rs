use std::sync::Arc;

use clap::Parser;
use smio_backend_mem::MemBackend;
use smio_bench::report::print_report;
use smio_bench::runner::{RunParams, run};

/// In-process driver for the message-passing I/O library: spawns a world of
/// ranks, writes a decomposed record variable through the async pipeline,
/// reads it back, and reports per-phase bandwidth.
#[derive(Parser, Debug)]
#[command(name = "smio-bench", about = "Message-passing I/O pipeline benchmark")]
struct CliArgs {
    /// Number of in-process ranks
    #[arg(short = 'n', long = "ranks", default_value_t = 4)]
    ranks: usize,

    /// Number of I/O tasks
    #[arg(short = 'i', long = "io-tasks", default_value_t = 2)]
    io_tasks: usize,

    /// Stride between I/O tasks
    #[arg(short = 's', long = "io-stride", default_value_t = 2)]
    io_stride: usize,

    /// Global element count (supports k/m/g suffixes)
    #[arg(short = 'e', long = "elements", default_value = "64k")]
    elements: String,

    /// Number of record frames
    #[arg(short = 'f', long = "frames", default_value_t = 8)]
    frames: usize,

    /// Aggregation factor (1 = no aggregation)
    #[arg(short = 'a', long = "agg-factor", default_value_t = 1)]
    agg_factor: usize,

    /// Pinned backend buffer capacity (supports k/m/g suffixes)
    #[arg(short = 'b', long = "bufsize", default_value = "512m")]
    bufsize: String,

    /// Outstanding request slots per file
    #[arg(short = 'q', long = "n-reqs", default_value_t = 512)]
    n_reqs: usize,

    /// Output the report as JSON instead of text
    #[arg(long = "json")]
    json: bool,

    /// Per-rank phase timings on stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Parse a size string with optional k/m/g suffix (case-insensitive).
fn parse_size(s: &str) -> usize {
    let s = s.trim();
    let (num, mult) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024usize),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    num.trim()
        .parse::<usize>()
        .unwrap_or_else(|_| panic!("invalid size: {s}"))
        * mult
}

fn main() {
    let args = CliArgs::parse();

    let params = RunParams {
        ranks: args.ranks,
        num_io_tasks: args.io_tasks,
        io_stride: args.io_stride,
        elements: parse_size(&args.elements),
        frames: args.frames,
        agg_factor: args.agg_factor,
        bufsize: parse_size(&args.bufsize),
        n_reqs: args.n_reqs,
        verbose: args.verbose,
    };

    if !args.json {
        println!("smio-bench");
        println!("  ranks      = {}", params.ranks);
        println!("  io_tasks   = {} (stride {})", params.num_io_tasks, params.io_stride);
        println!("  elements   = {}", params.elements);
        println!("  frames     = {}", params.frames);
        println!("  agg_factor = {}", params.agg_factor);
        println!("  bufsize    = {}", params.bufsize);
        println!("  n_reqs     = {}", params.n_reqs);
    }

    let backend = Arc::new(MemBackend::new());
    let report = run(&params, backend, "smio-bench.out");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).expect("failed to serialize report")
        );
    } else {
        print_report(&report);
    }

    if report.verify_errors > 0 {
        eprintln!("WARNING: {} verify errors", report.verify_errors);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024"), 1024);
        assert_eq!(parse_size("64k"), 65536);
        assert_eq!(parse_size("2M"), 2 * 1024 * 1024);
        assert_eq!(parse_size("1g"), 1024 * 1024 * 1024);
    }
}
