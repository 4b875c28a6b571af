//! Copy progress accounting.
//!
//! Tracks files and bytes handled by the executor and renders the periodic
//! progress line (rate and ETA included).

use std::time::{Duration, Instant};

/// Files and bytes handled so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Total bytes scheduled for this run
    pub total_bytes: u64,

    /// Bytes handled so far (copied or confirmed identical)
    pub done_bytes: u64,

    /// Total files scheduled for this run
    pub total_files: usize,

    /// Files handled so far
    pub done_files: usize,
}

impl TransferProgress {
    pub fn new(total_bytes: u64, total_files: usize) -> Self {
        Self {
            total_bytes,
            total_files,
            ..Default::default()
        }
    }

    /// Percentage of bytes done (0-100)
    pub fn percent(&self) -> f64 {
        if self.total_bytes > 0 {
            ((self.done_bytes as f64 / self.total_bytes as f64) * 100.0).min(100.0)
        } else if self.total_files == 0 {
            100.0
        } else {
            (self.done_files as f64 / self.total_files as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done_files >= self.total_files
    }
}

/// Progress with time-based rate calculation
pub struct ProgressTracker {
    start_time: Instant,
    every: usize,
    progress: TransferProgress,
}

impl ProgressTracker {
    /// `every` is the number of files between progress lines (0 disables them)
    pub fn new(total_bytes: u64, total_files: usize, every: usize) -> Self {
        Self {
            start_time: Instant::now(),
            every,
            progress: TransferProgress::new(total_bytes, total_files),
        }
    }

    /// Account for one finished file. Returns true when a progress line is due.
    pub fn file_done(&mut self, bytes: u64) -> bool {
        self.progress.done_files += 1;
        self.progress.done_bytes += bytes;
        self.every > 0
            && (self.progress.done_files % self.every == 0 || self.progress.is_complete())
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average bytes per second since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.progress.done_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    /// Seconds left at the average speed
    pub fn eta_seconds(&self) -> u64 {
        let speed = self.average_speed();
        if speed > 0 {
            self.progress.total_bytes.saturating_sub(self.progress.done_bytes) / speed
        } else {
            0
        }
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// One-line summary: `12/40 files, 1.00 MB/3.00 MB (33.3%), 2.00 MB/s, ETA 1s`
    pub fn line(&self) -> String {
        let p = &self.progress;
        format!(
            "{}/{} files, {}/{} ({:.1}%), {}, ETA {}",
            p.done_files,
            p.total_files,
            format_bytes(p.done_bytes),
            format_bytes(p.total_bytes),
            p.percent(),
            format_speed(self.average_speed()),
            format_duration(self.eta_seconds())
        )
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
