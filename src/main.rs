//! MultiCopy CLI - Parallel chunked copy of a large file
//!
//! Copies one file, splitting it into chunks copied in parallel when the
//! transfer qualifies and falling back to a plain sequential copy otherwise.

use clap::Parser;
use multicopy::accounting::Account;
use multicopy::backend::{Fs, LocalFs, Object};
use multicopy::config::{CliArgs, OutputFormat, TransferConfig};
use multicopy::error::{IoResultExt, MultiCopyError, Result};
use multicopy::multipart::{multi_thread_copy, should_use_multi_thread};
use multicopy::progress::ProgressReporter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flags
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    // Build configuration
    let config = TransferConfig::from_cli(&args).map_err(MultiCopyError::ConfigError)?;

    // Print configuration if verbose
    if args.verbose > 0 && !args.quiet {
        print_config(&config);
    }

    let progress = if args.progress && !args.quiet {
        Arc::new(ProgressReporter::new())
    } else {
        Arc::new(ProgressReporter::hidden())
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(copy_file(&args, &config, Arc::clone(&progress)));

    let summary = match result {
        Ok(summary) => {
            progress.finish("Copy complete");
            summary
        }
        Err(e) => {
            progress.abandon(&e.to_string());
            return Err(e);
        }
    };

    if !args.quiet {
        match args.output_format {
            OutputFormat::Text => summary.print(),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        }
    }
    Ok(())
}

/// Outcome of one file copy
#[derive(Debug, Serialize)]
struct TransferSummary {
    source: PathBuf,
    destination: PathBuf,
    mode: &'static str,
    bytes: u64,
    chunks: u64,
    duration_secs: f64,
    throughput: f64,
}

impl TransferSummary {
    fn print(&self) {
        println!("\n=== Copy Summary ===");
        println!("Source:          {}", self.source.display());
        println!("Destination:     {}", self.destination.display());
        println!("Mode:            {}", self.mode);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes, humansize::BINARY));
        if self.chunks > 0 {
            println!("Chunks:          {}", self.chunks);
        }
        println!("Duration:        {:.2}s", self.duration_secs);
        println!(
            "Throughput:      {}/s",
            humansize::format_size(self.throughput as u64, humansize::BINARY)
        );
    }
}

/// Split a path into its directory and file name
fn split_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .ok_or_else(|| MultiCopyError::config(format!("'{}' has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}

async fn copy_file(
    args: &CliArgs,
    config: &TransferConfig,
    progress: Arc<ProgressReporter>,
) -> Result<TransferSummary> {
    let (src_dir, src_name) = split_path(&args.source)?;
    let src_fs = LocalFs::new(src_dir);
    let src = src_fs.new_object(&src_name).await?;

    // An existing directory receives the file under its own name
    let (dst_dir, remote) = if tokio::fs::metadata(&args.destination)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        (args.destination.clone(), src_name.clone())
    } else {
        split_path(&args.destination)?
    };
    let dst_local = LocalFs::new(dst_dir);
    let destination = dst_local.path(&remote);
    let dst: Arc<dyn Fs> = Arc::new(dst_local);

    let mut account = Account::new(remote.clone()).with_progress(progress.clone());
    if let Some(limit) = config.bandwidth_limit {
        account = account.with_bandwidth_limit(limit);
    }
    let account = Arc::new(account);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling transfer");
                cancel.cancel();
            }
        })
    };

    let start = Instant::now();
    let multi = should_use_multi_thread(config, src.as_ref(), dst.as_ref());
    let result = if multi {
        multi_thread_copy(&dst, &remote, &src, config, Arc::clone(&account), &cancel)
            .await
            .map(|_| ())
    } else {
        tracing::debug!("{}: copying sequentially", src_name);
        copy_sequential(&src, &destination, &account, &cancel).await
    };
    interrupt.abort();
    result?;

    let duration = start.elapsed();
    let bytes = account.bytes();
    Ok(TransferSummary {
        source: args.source.clone(),
        destination,
        mode: if multi { "multi-thread" } else { "sequential" },
        bytes,
        chunks: account.chunks_done(),
        duration_secs: duration.as_secs_f64(),
        throughput: if duration.as_secs_f64() > 0.0 {
            bytes as f64 / duration.as_secs_f64()
        } else {
            0.0
        },
    })
}

/// Whole-file copy for transfers that don't qualify for chunking
async fn copy_sequential(
    src: &Arc<dyn Object>,
    destination: &Path,
    account: &Arc<Account>,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(size) = src.size() {
        account.set_total(size, 0);
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }

    let mut reader = account.wrap(src.open(None).await?);
    let mut file = tokio::fs::File::create(destination).await.with_path(destination)?;
    let copied = tokio::select! {
        _ = cancel.cancelled() => None,
        copied = tokio::io::copy(&mut reader, &mut file) => Some(copied),
    };
    let Some(copied) = copied else {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(destination).await {
            tracing::warn!("{}: failed to remove partial copy: {}", destination.display(), e);
        }
        return Err(MultiCopyError::Cancelled);
    };
    copied.with_path(destination)?;
    file.sync_all().await.with_path(destination)?;
    drop(file);

    let mod_time = src.mod_time().await;
    let path = destination.to_path_buf();
    tokio::task::spawn_blocking(move || {
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mod_time))
    })
    .await
    .map_err(|e| MultiCopyError::TaskError(e.to_string()))?
    .with_path(destination)
}

fn print_config(config: &TransferConfig) {
    println!("=== Configuration ===");
    println!(
        "Streams:      {}{}",
        config.multi_thread_streams,
        if config.multi_thread_set { "" } else { " (default)" }
    );
    println!("Cutoff:       {}", humansize::format_size(config.multi_thread_cutoff, humansize::BINARY));
    println!("Chunk size:   {}", humansize::format_size(config.multi_thread_chunk_size, humansize::BINARY));
    println!(
        "Write buffer: {}",
        humansize::format_size(config.multi_thread_write_buffer_size as u64, humansize::BINARY)
    );
    println!(
        "Memory limit: {}",
        humansize::format_size(config.chunk_memory_limit as u64, humansize::BINARY)
    );
    println!("Policy:       {:?}", config.concurrency_policy);
    if let Some(limit) = config.bandwidth_limit {
        println!("Bandwidth:    {}/s", humansize::format_size(limit, humansize::BINARY));
    }
    println!();
}
