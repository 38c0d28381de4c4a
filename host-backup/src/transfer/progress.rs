//! Throughput metering for the artifact upload, plus the human-readable
//! size/speed/duration formatting shared by log lines.

use std::time::{Duration, Instant};

/// Point-in-time view of one transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub sent: u64,
    pub total: u64,
    /// Bytes/second since the previous snapshot
    pub speed: u64,
    /// 0-100, 0 when the total is unknown
    pub percent: f64,
    pub eta: Option<Duration>,
}

/// Turns cumulative byte counts into snapshots.
#[derive(Debug)]
pub struct TransferMeter {
    total: u64,
    last: (Instant, u64),
}

impl TransferMeter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            last: (Instant::now(), 0),
        }
    }

    /// Record that `sent` bytes have gone out so far.
    pub fn record(&mut self, sent: u64) -> Snapshot {
        let now = Instant::now();
        let window = now.duration_since(self.last.0).as_secs_f64();
        let speed = if window > 0.0 {
            (sent.saturating_sub(self.last.1) as f64 / window) as u64
        } else {
            0
        };
        self.last = (now, sent);

        let percent = if self.total == 0 {
            0.0
        } else {
            (sent as f64 * 100.0 / self.total as f64).min(100.0)
        };
        let eta = (speed > 0).then(|| Duration::from_secs(self.total.saturating_sub(sent) / speed));

        Snapshot {
            sent,
            total: self.total,
            speed,
            percent,
            eta,
        }
    }
}

/// `1536` → `"1.50 KiB"`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = *next;
    }

    format!("{:.2} {}", value, unit)
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Coarse duration: seconds, minutes+seconds or hours+minutes.
pub fn format_duration(seconds: u64) -> String {
    match seconds {
        0..=59 => format!("{}s", seconds),
        60..=3599 => format!("{}m {}s", seconds / 60, seconds % 60),
        _ => format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_meter_percent_and_speed() {
        let mut meter = TransferMeter::new(1000);

        let first = meter.record(100);
        assert_eq!(first.sent, 100);
        assert!((first.percent - 10.0).abs() < 0.01);

        thread::sleep(Duration::from_millis(100));
        let second = meter.record(600);
        assert!((second.percent - 60.0).abs() < 0.01);
        assert!(second.speed > 0);
        assert!(second.eta.is_some());
    }

    #[test]
    fn test_meter_unknown_total() {
        let mut meter = TransferMeter::new(0);
        assert_eq!(meter.record(42).percent, 0.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10.00 GiB");
        assert_eq!(format_speed(1024 * 1024), "1.00 MiB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
