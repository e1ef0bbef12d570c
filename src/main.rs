//! bulkstore - Parallel bulk transfers and recursive ACL changes
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use bulkstore::config::{exit_codes, CliArgs, EngineConfig, Operation};
use bulkstore::error::{BulkError, WorkerError};
use bulkstore::progress::{print_acl_summary, print_header, print_summary};
use bulkstore::store::{FsStore, RemoteStore};
use bulkstore::walker::{apply_acl_recursive, download, upload, Direction};
use clap::error::ErrorKind;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            exit_codes::EXECUTION_FAILED
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Parse CLI arguments
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => return Ok(parse_failure(e)),
    };

    // Setup logging
    setup_logging(args.verbose)?;

    let store = match FsStore::open(&args.store) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: cannot open store: {}", e);
            return Ok(exit_codes::STORE_NOT_FOUND);
        }
    };
    let store: Arc<dyn RemoteStore> = Arc::new(store);

    let mut config = match EngineConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::ILLEGAL_CONFIG);
        }
    };

    let operation = match args.command.resolve() {
        Ok(operation) => operation,
        Err(usage) => {
            eprintln!("Error: {}", usage.message);
            return Ok(usage.exit_code);
        }
    };

    match operation {
        Operation::Acl { mode, path, spec } => {
            if config.show_progress {
                print_header(mode.as_str(), &path, None, config.worker_count);
            }
            match apply_acl_recursive(store, &path, &spec, mode, &config) {
                Ok(report) => {
                    print_acl_summary(&report);
                    Ok(exit_codes::SUCCESS)
                }
                Err(e) => {
                    let code = acl_exit_code(&e);
                    error!(path = %path, error = %e, code, "ACL walk failed");
                    eprintln!("Error: {}", e);
                    Ok(code)
                }
            }
        }
        Operation::Transfer {
            direction,
            source,
            destination,
            overwrite,
        } => {
            config.overwrite = overwrite;
            if config.show_progress {
                let name = match direction {
                    Direction::Upload => "upload",
                    Direction::Download => "download",
                };
                print_header(name, &source, Some(&destination), config.worker_count);
            }

            let report = match direction {
                Direction::Upload => upload(store, Path::new(&source), &destination, &config)
                    .context("Upload failed")?,
                Direction::Download => download(store, &source, Path::new(&destination), &config)
                    .context("Download failed")?,
            };

            print_summary(&report);
            if report.is_success() {
                Ok(exit_codes::SUCCESS)
            } else {
                info!(failed = report.failed.len(), "Transfer completed with failures");
                Ok(exit_codes::EXECUTION_FAILED)
            }
        }
    }
}

/// Store failures inside the walk are fatal; anything else is a plain execution failure
fn acl_exit_code(e: &BulkError) -> i32 {
    match e {
        BulkError::Worker(WorkerError::Store { .. }) => exit_codes::ACL_FATAL,
        _ => exit_codes::EXECUTION_FAILED,
    }
}

/// Print a clap error and map it to an exit code
fn parse_failure(e: clap::Error) -> i32 {
    let code = match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
        ErrorKind::InvalidSubcommand => exit_codes::UNKNOWN_OPERATION,
        _ => exit_codes::ARGUMENT_PARSE,
    };
    let _ = e.print();
    code
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("bulkstore=debug,warn")
    } else {
        EnvFilter::new("bulkstore=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
