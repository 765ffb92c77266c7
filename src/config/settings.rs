//! Configuration settings for MultiCopy
//!
//! Defines the CLI arguments, the runtime transfer configuration the engine
//! consumes, and their defaults.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of parallel chunk streams
pub const DEFAULT_MULTI_THREAD_STREAMS: usize = 4;

/// Default size below which the parallel path is skipped (256 MiB)
pub const DEFAULT_MULTI_THREAD_CUTOFF: u64 = 256 * 1024 * 1024;

/// Default chunk size for the writer-at adapter (64 MiB)
pub const DEFAULT_MULTI_THREAD_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Default output buffer for the writer-at adapter (128 KiB)
pub const DEFAULT_MULTI_THREAD_WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Default largest chunk held in memory before spilling to disk (64 MiB)
pub const DEFAULT_CHUNK_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// MultiCopy - Parallel chunked copy of large objects
#[derive(Parser, Debug, Clone)]
#[command(name = "multicopy")]
#[command(author = "MultiCopy Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel chunked copy of large files")]
#[command(long_about = r#"
MultiCopy splits a large file into byte-range chunks, copies the chunks in
parallel and commits them as a single destination object.

Examples:
  multicopy /data/big.iso /backup                          # Default settings
  multicopy big.iso /backup --multi-thread-streams 8       # Explicit stream count
  multicopy big.iso /backup --multi-thread-cutoff 0 -p     # Always parallel, with progress
"#)]
pub struct CliArgs {
    /// Source file
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination directory or file path
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Number of parallel chunk streams (unset = let the backend decide)
    #[arg(long, value_name = "NUM")]
    pub multi_thread_streams: Option<usize>,

    /// Files smaller than this are copied sequentially (e.g., 256M)
    #[arg(long, default_value = "256M", value_name = "SIZE")]
    pub multi_thread_cutoff: String,

    /// Chunk size when the destination has no preferred chunk size (e.g., 64M)
    #[arg(long, default_value = "64M", value_name = "SIZE")]
    pub multi_thread_chunk_size: String,

    /// Output buffer per chunk for random-access destinations (0 = unbuffered)
    #[arg(long, default_value = "128K", value_name = "SIZE")]
    pub multi_thread_write_buffer_size: String,

    /// Largest chunk buffered in memory before spilling to a temp file
    #[arg(long, default_value = "64M", value_name = "SIZE")]
    pub chunk_memory_limit: String,

    /// How an explicit stream count is reconciled with the backend preference
    #[arg(long, value_enum, default_value = "prefer-larger")]
    pub concurrency_policy: ConcurrencyPolicy,

    /// Bandwidth limit (e.g., 100M for 100 MB/s)
    #[arg(long, value_name = "RATE")]
    pub bwlimit: Option<String>,

    /// Show progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Output format for the summary
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Precedence between the operator's stream count and the backend's preference
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyPolicy {
    /// Backend preference wins when the operator didn't set a count, or when it is larger
    #[default]
    PreferLarger,
    /// An explicit operator count always wins; the backend only fills in a default
    Operator,
}

/// Runtime configuration for one multi-thread transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Requested number of parallel chunk streams
    pub multi_thread_streams: usize,
    /// Whether the operator set the stream count explicitly
    pub multi_thread_set: bool,
    /// Objects smaller than this skip the parallel path
    pub multi_thread_cutoff: u64,
    /// Chunk size used by the writer-at adapter
    pub multi_thread_chunk_size: u64,
    /// Output buffer per chunk for the writer-at adapter (0 = unbuffered)
    pub multi_thread_write_buffer_size: usize,
    /// Largest chunk buffered in memory before spilling to disk
    pub chunk_memory_limit: usize,
    /// Stream count reconciliation policy
    pub concurrency_policy: ConcurrencyPolicy,
    /// Bandwidth limit in bytes/sec
    pub bandwidth_limit: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multi_thread_streams: DEFAULT_MULTI_THREAD_STREAMS,
            multi_thread_set: false,
            multi_thread_cutoff: DEFAULT_MULTI_THREAD_CUTOFF,
            multi_thread_chunk_size: DEFAULT_MULTI_THREAD_CHUNK_SIZE,
            multi_thread_write_buffer_size: DEFAULT_MULTI_THREAD_WRITE_BUFFER_SIZE,
            chunk_memory_limit: DEFAULT_CHUNK_MEMORY_LIMIT,
            concurrency_policy: ConcurrencyPolicy::PreferLarger,
            bandwidth_limit: None,
        }
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

impl TransferConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(streams) = args.multi_thread_streams {
            config.multi_thread_streams = streams;
            config.multi_thread_set = true;
        }
        config.multi_thread_cutoff = parse_size(&args.multi_thread_cutoff)
            .map_err(|e| format!("Invalid cutoff: {}", e))?;
        config.multi_thread_chunk_size = parse_size(&args.multi_thread_chunk_size)
            .map_err(|e| format!("Invalid chunk size: {}", e))?;
        config.multi_thread_write_buffer_size = parse_size(&args.multi_thread_write_buffer_size)
            .map_err(|e| format!("Invalid write buffer size: {}", e))? as usize;
        config.chunk_memory_limit = parse_size(&args.chunk_memory_limit)
            .map_err(|e| format!("Invalid chunk memory limit: {}", e))? as usize;
        config.concurrency_policy = args.concurrency_policy;
        config.bandwidth_limit = args
            .bwlimit
            .as_ref()
            .map(|s| parse_size(s))
            .transpose()
            .map_err(|e| format!("Invalid bandwidth limit: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine can't run with
    pub fn validate(&self) -> Result<(), String> {
        if self.multi_thread_chunk_size == 0 {
            return Err("Chunk size must be greater than zero".to_string());
        }
        if self.multi_thread_set && self.multi_thread_streams == 0 {
            return Err("Stream count must be greater than zero".to_string());
        }
        if self.bandwidth_limit == Some(0) {
            return Err("Bandwidth limit must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Set an explicit stream count, as if given on the command line
    pub fn with_streams(mut self, streams: usize) -> Self {
        self.multi_thread_streams = streams;
        self.multi_thread_set = true;
        self
    }
}
