//! Progress reporting and run summaries
//!
//! A [`ProgressMonitor`] thread samples live counters on a fixed interval
//! and renders them with an indicatif spinner. It only affects the display:
//! the driver cancels it once the run completes without waiting for it.

use crate::error::WorkerError;
use crate::walker::stats::{AclReport, TransferReport};
use console::style;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters a monitor samples
pub enum ProgressSource {
    /// Transfer runs: bytes moved by each worker against bytes enumerated so far
    Bytes {
        planned: Arc<AtomicU64>,
        counters: Vec<Arc<AtomicU64>>,
    },
    /// ACL runs: entries processed
    Count { done: Arc<AtomicU64> },
}

impl ProgressSource {
    fn message(&self, elapsed: Duration) -> String {
        let secs = elapsed.as_secs_f64();
        match self {
            ProgressSource::Bytes { planned, counters } => {
                let done: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
                let planned = planned.load(Ordering::Relaxed);
                let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
                format!(
                    "{:>5.1}% | {} of {} | {}/s",
                    percent_complete(done, planned),
                    format_size(done, BINARY),
                    format_size(planned, BINARY),
                    format_size(rate as u64, BINARY),
                )
            }
            ProgressSource::Count { done } => {
                let done = done.load(Ordering::Relaxed);
                let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
                format!("Entries: {} | Rate: {:.0}/s", format_number(done), rate)
            }
        }
    }
}

/// `100 * done / planned`, clamped to 100 and 0 when nothing is planned yet
///
/// `planned` grows while enumeration is still running, so `done` may briefly
/// run ahead of it.
pub fn percent_complete(done: u64, planned: u64) -> f64 {
    if planned == 0 {
        return 0.0;
    }
    (100.0 * done as f64 / planned as f64).min(100.0)
}

/// Background thread that samples progress counters
pub struct ProgressMonitor {
    /// Dropping the sender stops the thread
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    bar: ProgressBar,
}

impl ProgressMonitor {
    /// Start sampling `source` every `interval`; `visible` false draws nothing
    pub fn start(
        source: ProgressSource,
        interval: Duration,
        visible: bool,
    ) -> Result<Self, WorkerError> {
        let bar = if visible {
            let bar = ProgressBar::new_spinner();
            let template = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
            bar.set_style(template);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };

        let (stop, stopped) = bounded::<()>(1);
        let thread_bar = bar.clone();
        let started = Instant::now();

        let handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        thread_bar.set_message(source.message(started.elapsed()));
                    }
                    _ => break,
                }
            })
            .map_err(|e| WorkerError::InitFailed {
                id: 0,
                reason: format!("progress monitor: {}", e),
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            bar,
        })
    }

    /// Stop sampling and clear the display without waiting for the thread
    pub fn cancel(mut self) {
        self.stop.take();
        self.bar.finish_and_clear();
        // Detached: the thread exits on its next wakeup
        self.handle.take();
    }
}

/// Render a count with `,` between groups of three digits
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a header at the start of a run
pub fn print_header(operation: &str, source: &str, destination: Option<&str>, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("bulkstore").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Operation:").bold(), operation);
    println!("  {} {}", style("Source:").bold(), source);
    if let Some(destination) = destination {
        println!("  {} {}", style("Destination:").bold(), destination);
    }
    println!("  {} {}", style("Workers:").bold(), workers);
    println!();
}

/// Print the tally of a transfer run, then the failed and skipped paths
pub fn print_summary(report: &TransferReport) {
    let duration_secs = report.elapsed.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        report.bytes_transferred as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if report.is_success() {
        println!("{}", style("Transfer Complete").green().bold());
    } else {
        println!("{}", style("Transfer Finished With Failures").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Succeeded:").bold(),
        format_number(report.successful.len() as u64)
    );
    println!(
        "  {} {}",
        style("Skipped:").bold(),
        format_number(report.skipped.len() as u64)
    );
    if !report.failed.is_empty() {
        println!(
            "  {} {}",
            style("Failed:").red().bold(),
            format_number(report.failed.len() as u64)
        );
    }
    println!(
        "  {} {} in {} chunks",
        style("Transferred:").bold(),
        format_size(report.bytes_transferred, BINARY),
        format_number(report.chunks_succeeded)
    );
    println!(
        "  {} {:.1}s ({}/s)",
        style("Duration:").bold(),
        duration_secs,
        format_size(rate as u64, BINARY)
    );

    print_paths("Failed", &report.failed);
    print_paths("Skipped", &report.skipped);
    println!();
}

fn print_paths(title: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    println!();
    println!("{}", style(format!("{} ({}):", title, paths.len())).bold());
    for path in paths {
        println!("  {}", path);
    }
}

/// Print the tally of an ACL run
pub fn print_acl_summary(report: &AclReport) {
    println!();
    println!("{}", style("ACL Update Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(report.directories)
    );
    println!("  {} {}", style("Files:").bold(), format_number(report.files));
    println!(
        "  {} {}",
        style("ACL calls:").bold(),
        format_number(report.mutations)
    );
    if report.not_found > 0 {
        println!(
            "  {} {}",
            style("Vanished:").yellow().bold(),
            format_number(report.not_found)
        );
    }
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        report.elapsed.as_secs_f64()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(123_456), "123,456");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(0, 0), 0.0);
        assert_eq!(percent_complete(50, 0), 0.0);
        assert_eq!(percent_complete(25, 100), 25.0);
        assert_eq!(percent_complete(150, 100), 100.0);
    }

    #[test]
    fn test_message_sums_worker_counters() {
        let source = ProgressSource::Bytes {
            planned: Arc::new(AtomicU64::new(1000)),
            counters: vec![Arc::new(AtomicU64::new(200)), Arc::new(AtomicU64::new(300))],
        };
        let msg = source.message(Duration::from_secs(1));
        assert!(msg.trim_start().starts_with("50.0%"), "{}", msg);

        let source = ProgressSource::Count {
            done: Arc::new(AtomicU64::new(12345)),
        };
        assert!(source.message(Duration::ZERO).contains("12,345"));
    }

    #[test]
    fn test_monitor_cancel_returns() {
        let done = Arc::new(AtomicU64::new(0));
        let monitor = ProgressMonitor::start(
            ProgressSource::Count { done },
            Duration::from_millis(5),
            false,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        monitor.cancel();
    }
}
