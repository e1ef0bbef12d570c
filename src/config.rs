//! Configuration types for bulkstore
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The validated [`EngineConfig`] passed into every engine entry point
//! - Process exit codes

use crate::error::ConfigError;
use crate::store::acl::{parse_acl_spec, AclEntry, AclMode};
use crate::walker::job::Direction;
use crate::walker::plan::ChunkSizing;
use crate::walker::queue::DEFAULT_QUEUE_CAPACITY;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 4096;

/// Maximum enumerator threads
const MAX_ENUMERATORS: usize = 64;

/// Default chunk size and fold threshold (64 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Default copy buffer (4 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Default page size for download listings
pub const DEFAULT_DOWNLOAD_PAGE_SIZE: usize = 2_000;

/// Default page size for ACL walk listings
pub const DEFAULT_ACL_PAGE_SIZE: usize = 16_000;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Command line could not be parsed
    pub const ARGUMENT_PARSE: i32 = 1000;
    /// Unknown operation
    pub const UNKNOWN_OPERATION: i32 = 1001;
    /// ACL spec could not be parsed
    pub const ILLEGAL_ACL_SPEC: i32 = 1003;
    /// Thread count or other tuning value out of range
    pub const ILLEGAL_CONFIG: i32 = 1008;
    /// `setacl` is not offered from the command line
    pub const SETACL_REFUSED: i32 = 1011;
    /// Source path empty
    pub const EMPTY_SOURCE: i32 = 1200;
    /// Destination path empty or trailing keyword not `overwrite`
    pub const BAD_DESTINATION: i32 = 1201;
    /// Store root missing or unreadable
    pub const STORE_NOT_FOUND: i32 = 2011;
    /// ACL walk aborted by a fatal store error
    pub const ACL_FATAL: i32 = 4100;
    /// Transfer finished with failures, or could not start
    pub const EXECUTION_FAILED: i32 = 5001;
}

/// Parallel bulk transfer and recursive ACL tool for hierarchical stores
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bulkstore",
    version,
    about = "Parallel bulk upload/download and recursive ACL changes for a hierarchical store",
    long_about = "Moves directory trees between the local filesystem and a store in parallel,\n\
                  splitting large files into chunks, and applies ACL changes to every entry\n\
                  below a store directory.",
    after_help = "EXAMPLES:\n    \
        bulkstore --store /srv/store upload ./dataset /ingest\n    \
        bulkstore --store /srv/store download /ingest/dataset ./restore overwrite\n    \
        bulkstore --store /srv/store -t 64 modifyacl /ingest \"user:alice:r-x,default:user:alice:r-x\"\n    \
        bulkstore --store /srv/store removeacl /ingest \"user:alice,default:user:alice\""
)]
pub struct CliArgs {
    /// Root directory of the filesystem-backed store
    #[arg(long, value_name = "DIR")]
    pub store: PathBuf,

    /// Number of worker threads
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub threads: usize,

    /// Chunk size in bytes for splitting large files
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Add or update ACL entries on a directory tree
    #[command(name = "modifyacl")]
    ModifyAcl {
        /// Store path of the tree root
        path: String,
        /// Comma-separated ACL spec
        aclspec: String,
    },

    /// Remove ACL entries from a directory tree
    #[command(name = "removeacl")]
    RemoveAcl {
        path: String,
        aclspec: String,
    },

    /// Replace ACLs on a directory tree (not supported from the command line)
    #[command(name = "setacl")]
    SetAcl {
        path: String,
        aclspec: String,
    },

    /// Upload a local file or directory into a store directory
    Upload {
        /// Local source path
        source: String,
        /// Store destination directory
        destination: String,
        /// Pass `overwrite` to replace existing files
        #[arg(value_name = "overwrite")]
        overwrite: Option<String>,
    },

    /// Download a store file or directory into a local directory
    Download {
        /// Store source path
        source: String,
        /// Local destination directory
        destination: String,
        /// Pass `overwrite` to replace existing files
        #[arg(value_name = "overwrite")]
        overwrite: Option<String>,
    },
}

/// A validated operation ready to run
#[derive(Debug, Clone)]
pub enum Operation {
    Acl {
        mode: AclMode,
        path: String,
        spec: Vec<AclEntry>,
    },
    Transfer {
        direction: Direction,
        source: String,
        destination: String,
        overwrite: IfExists,
    },
}

/// A command line that parsed but cannot be run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    pub exit_code: i32,
    pub message: String,
}

impl UsageError {
    fn new(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }
}

impl Command {
    /// Validate positional arguments into an [`Operation`]
    pub fn resolve(&self) -> Result<Operation, UsageError> {
        match self {
            Command::ModifyAcl { path, aclspec } => acl_operation(AclMode::Modify, path, aclspec),
            Command::RemoveAcl { path, aclspec } => acl_operation(AclMode::Remove, path, aclspec),
            Command::SetAcl { .. } => Err(UsageError::new(
                exit_codes::SETACL_REFUSED,
                "setacl is not supported; use modifyacl or removeacl",
            )),
            Command::Upload {
                source,
                destination,
                overwrite,
            } => transfer_operation(Direction::Upload, source, destination, overwrite.as_deref()),
            Command::Download {
                source,
                destination,
                overwrite,
            } => transfer_operation(Direction::Download, source, destination, overwrite.as_deref()),
        }
    }
}

fn acl_operation(mode: AclMode, path: &str, aclspec: &str) -> Result<Operation, UsageError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(UsageError::new(exit_codes::EMPTY_SOURCE, "path must not be empty"));
    }
    let spec = parse_acl_spec(aclspec)
        .map_err(|e| UsageError::new(exit_codes::ILLEGAL_ACL_SPEC, e.to_string()))?;
    Ok(Operation::Acl {
        mode,
        path: path.to_string(),
        spec,
    })
}

fn transfer_operation(
    direction: Direction,
    source: &str,
    destination: &str,
    keyword: Option<&str>,
) -> Result<Operation, UsageError> {
    let source = source.trim();
    let destination = destination.trim();
    if source.is_empty() {
        return Err(UsageError::new(exit_codes::EMPTY_SOURCE, "source must not be empty"));
    }
    if destination.is_empty() {
        return Err(UsageError::new(
            exit_codes::BAD_DESTINATION,
            "destination must not be empty",
        ));
    }
    let overwrite = match keyword {
        None => IfExists::Fail,
        Some(k) if k.trim().eq_ignore_ascii_case("overwrite") => IfExists::Overwrite,
        Some(k) => {
            return Err(UsageError::new(
                exit_codes::BAD_DESTINATION,
                format!("unexpected argument '{}', expected 'overwrite'", k),
            ))
        }
    };
    Ok(Operation::Transfer {
        direction,
        source: source.to_string(),
        destination: destination.to_string(),
        overwrite,
    })
}

fn default_workers() -> usize {
    // Transfers are network bound, so oversubscribe the cores
    num_cpus::get() * 10
}

/// What to do when a destination file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    /// Skip the file
    #[default]
    Fail,
    /// Replace it
    Overwrite,
}

/// Validated engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of transfer / ACL worker threads
    pub worker_count: usize,

    /// Number of tree enumerator threads
    pub enumerator_count: usize,

    /// Size of every full chunk
    pub chunk_size: u64,

    /// Single-chunk / fold threshold (>= chunk_size)
    pub threshold: u64,

    /// Copy buffer size, independent of chunk size
    pub buffer_size: usize,

    /// Capacity of the job handoff queue
    pub queue_capacity: usize,

    /// Listing page size while enumerating a download
    pub download_page_size: usize,

    /// Listing page size while walking for ACL changes
    pub acl_page_size: usize,

    /// Existing destination policy
    pub overwrite: IfExists,

    /// Hand out the largest chunks first
    pub largest_first: bool,

    /// Progress sampling interval
    pub progress_interval: Duration,

    /// Show progress indicator
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_workers(),
            enumerator_count: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            threshold: DEFAULT_CHUNK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            download_page_size: DEFAULT_DOWNLOAD_PAGE_SIZE,
            acl_page_size: DEFAULT_ACL_PAGE_SIZE,
            overwrite: IfExists::Fail,
            largest_first: true,
            progress_interval: Duration::from_millis(500),
            show_progress: false,
        }
    }
}

impl EngineConfig {
    /// Create configuration from CLI arguments
    ///
    /// The overwrite policy comes from the resolved [`Operation`], not from here.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self {
            worker_count: args.threads,
            show_progress: !args.quiet,
            ..Self::default()
        };
        if let Some(chunk_size) = args.chunk_size {
            config.chunk_size = chunk_size;
            config.threshold = chunk_size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check every value before any thread starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }
        if self.enumerator_count == 0 || self.enumerator_count > MAX_ENUMERATORS {
            return Err(ConfigError::InvalidEnumeratorCount {
                count: self.enumerator_count,
                max: MAX_ENUMERATORS,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                size: self.chunk_size,
            });
        }
        if self.threshold < self.chunk_size {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.threshold,
                chunk_size: self.chunk_size,
            });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                capacity: self.queue_capacity,
            });
        }
        if self.download_page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                which: "download",
                size: self.download_page_size,
            });
        }
        if self.acl_page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                which: "ACL",
                size: self.acl_page_size,
            });
        }
        Ok(())
    }

    /// Chunk sizing derived from this configuration
    pub fn sizing(&self) -> ChunkSizing {
        ChunkSizing::new(self.chunk_size, self.threshold)
    }

    /// Whether existing destinations are replaced
    pub fn overwrites(&self) -> bool {
        self.overwrite == IfExists::Overwrite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 64 * 1024 * 1024);
        assert_eq!(config.worker_count, num_cpus::get() * 10);
        assert!(config.largest_first);
    }

    #[test]
    fn test_validation_errors() {
        let bad_workers = EngineConfig {
            worker_count: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            bad_workers.validate(),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));

        let bad_threshold = EngineConfig {
            chunk_size: 100,
            threshold: 99,
            ..EngineConfig::default()
        };
        assert!(matches!(
            bad_threshold.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let bad_page = EngineConfig {
            acl_page_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            bad_page.validate(),
            Err(ConfigError::InvalidPageSize { which: "ACL", .. })
        ));
    }

    #[test]
    fn test_from_args() {
        let args = parse(&[
            "bulkstore", "--store", "/srv", "-t", "8", "--chunk-size", "1000", "-q",
            "upload", "./a", "/b",
        ]);
        let config = EngineConfig::from_args(&args).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.threshold, 1000);
        assert!(!config.show_progress);

        let args = parse(&["bulkstore", "--store", "/srv", "-t", "0", "upload", "a", "/b"]);
        assert!(EngineConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_resolve_transfer() {
        let args = parse(&["bulkstore", "--store", "/s", "download", "/r/x", "./out", "OVERWRITE"]);
        match args.command.resolve().unwrap() {
            Operation::Transfer {
                direction,
                source,
                destination,
                overwrite,
            } => {
                assert_eq!(direction, Direction::Download);
                assert_eq!(source, "/r/x");
                assert_eq!(destination, "./out");
                assert_eq!(overwrite, IfExists::Overwrite);
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = parse(&["bulkstore", "--store", "/s", "upload", "a", "/b", "clobber"]);
        assert_eq!(
            args.command.resolve().unwrap_err().exit_code,
            exit_codes::BAD_DESTINATION
        );

        let args = parse(&["bulkstore", "--store", "/s", "upload", "  ", "/b"]);
        assert_eq!(
            args.command.resolve().unwrap_err().exit_code,
            exit_codes::EMPTY_SOURCE
        );
    }

    #[test]
    fn test_resolve_acl() {
        let args = parse(&["bulkstore", "--store", "/s", "modifyacl", "/d", "user:bob:r-x"]);
        match args.command.resolve().unwrap() {
            Operation::Acl { mode, path, spec } => {
                assert_eq!(mode, AclMode::Modify);
                assert_eq!(path, "/d");
                assert_eq!(spec.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = parse(&["bulkstore", "--store", "/s", "removeacl", "/d", "bogus"]);
        assert_eq!(
            args.command.resolve().unwrap_err().exit_code,
            exit_codes::ILLEGAL_ACL_SPEC
        );

        let args = parse(&["bulkstore", "--store", "/s", "setacl", "/d", "user:bob:r-x"]);
        assert_eq!(
            args.command.resolve().unwrap_err().exit_code,
            exit_codes::SETACL_REFUSED
        );
    }

    #[test]
    fn test_unknown_operation_fails_to_parse() {
        assert!(CliArgs::try_parse_from(["bulkstore", "--store", "/s", "frobnicate"]).is_err());
    }
}
