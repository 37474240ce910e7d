// io_status.rs - I/O statistics probe wrapped around engine runs
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Input/output counters of the current process, as reported by `/proc/self/io`.
///
/// Out-of-core runs are dominated by page faults on the mapped adjacency and attribute
/// files, so the byte counters are the main figure of merit next to wall time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_syscalls: u64,
    pub write_syscalls: u64,
}

impl IoStats {
    /// Counter delta `self - earlier`, saturating at zero.
    pub fn diff(&self, earlier: &IoStats) -> IoStats {
        IoStats {
            read_bytes: self.read_bytes.saturating_sub(earlier.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(earlier.write_bytes),
            read_syscalls: self.read_syscalls.saturating_sub(earlier.read_syscalls),
            write_syscalls: self.write_syscalls.saturating_sub(earlier.write_syscalls),
        }
    }

    /// Sums two deltas, used when a pipeline aggregates the reports of many tasks.
    pub fn merge(&self, other: &IoStats) -> IoStats {
        IoStats {
            read_bytes: self.read_bytes + other.read_bytes,
            write_bytes: self.write_bytes + other.write_bytes,
            read_syscalls: self.read_syscalls + other.read_syscalls,
            write_syscalls: self.write_syscalls + other.write_syscalls,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.read_bytes + self.write_bytes
    }

    pub fn has_io(&self) -> bool {
        self.total_bytes() > 0 || self.read_syscalls + self.write_syscalls > 0
    }

    /// Parses the content of a `/proc/<pid>/io` file; unknown keys are ignored.
    fn parse_proc_io(content: &str) -> IoStats {
        let mut stats = IoStats::default();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Ok(value) = value.parse::<u64>() else {
                continue;
            };
            match key {
                "read_bytes:" => stats.read_bytes = value,
                "write_bytes:" => stats.write_bytes = value,
                "syscr:" => stats.read_syscalls = value,
                "syscw:" => stats.write_syscalls = value,
                _ => {}
            }
        }
        stats
    }
}

impl fmt::Display for IoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read {} bytes ({} syscalls), write {} bytes ({} syscalls)",
            self.read_bytes, self.read_syscalls, self.write_bytes, self.write_syscalls
        )
    }
}

/// The value, wall time and I/O delta of one measured closure.
#[derive(Debug)]
pub struct Measured<T> {
    pub result: T,
    pub duration: Duration,
    pub io_stats: IoStats,
}

impl<T> Measured<T> {
    /// Emits one `info` event summarizing the measurement.
    pub fn log_summary(&self, operation: &str) {
        let throughput = if self.io_stats.has_io() && self.duration.as_secs_f64() > 0.0 {
            self.io_stats.total_bytes() as f64 / self.duration.as_secs_f64() / 1024.0 / 1024.0
        } else {
            0.0
        };
        info!(
            operation,
            elapsed_us = self.duration.as_micros() as u64,
            throughput_mib_s = throughput,
            "{}",
            self.io_stats
        );
    }
}

/// Reads process I/O counters around a closure.
pub struct IoStatsCollector;

impl IoStatsCollector {
    #[cfg(target_os = "linux")]
    fn current() -> IoStats {
        match std::fs::read_to_string("/proc/self/io") {
            Ok(content) => IoStats::parse_proc_io(&content),
            Err(e) => {
                debug!("/proc/self/io unavailable: {}", e);
                IoStats::default()
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn current() -> IoStats {
        IoStats::default()
    }

    /// Runs `f` and records its wall time and the I/O the process performed meanwhile.
    ///
    /// # Arguments
    /// * `f` - The closure to measure.
    ///
    /// # Returns
    /// The closure's value together with duration and I/O delta.
    pub fn measure<F, R>(f: F) -> Measured<R>
    where
        F: FnOnce() -> R,
    {
        let start_io = Self::current();
        let start_time = Instant::now();
        let result = f();
        let duration = start_time.elapsed();
        let io_stats = Self::current().diff(&start_io);
        Measured { result, duration, io_stats }
    }
}

#[cfg(test)]
mod test_io_status {
    use super::*;

    #[test]
    fn test_parse_proc_io() {
        let content = "rchar: 10\nwchar: 20\nsyscr: 3\nsyscw: 4\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n";
        let stats = IoStats::parse_proc_io(content);
        assert_eq!(
            stats,
            IoStats { read_bytes: 4096, write_bytes: 8192, read_syscalls: 3, write_syscalls: 4 }
        );
    }

    #[test]
    fn test_diff_saturates_and_merge_adds() {
        let early = IoStats { read_bytes: 100, write_bytes: 200, read_syscalls: 10, write_syscalls: 20 };
        let late = IoStats { read_bytes: 150, write_bytes: 150, read_syscalls: 15, write_syscalls: 25 };
        let delta = late.diff(&early);
        assert_eq!(delta.read_bytes, 50);
        assert_eq!(delta.write_bytes, 0);
        assert_eq!(delta.merge(&delta).read_syscalls, 10);
    }

    #[test]
    fn test_measure_returns_value() {
        let measured = IoStatsCollector::measure(|| {
            std::thread::sleep(Duration::from_millis(1));
            42
        });
        assert_eq!(measured.result, 42);
        assert!(measured.duration.as_millis() >= 1);
    }
}
