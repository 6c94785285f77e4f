//! Pure progress arithmetic over a snapshot of job counters.

use std::fmt;

use importd_common::{time::elapsed_seconds, types::Job};
use serde::{Deserialize, Serialize};

pub fn percentage(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = processed.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

/// Items per minute, `None` until any time has elapsed.
pub fn rate_per_minute(processed: u64, elapsed_seconds: f64) -> Option<f64> {
    if elapsed_seconds > 0.0 {
        Some(processed as f64 / (elapsed_seconds / 60.0))
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Eta {
    Unknown,
    Minutes { minutes: u64 },
    Hours { hours: u64, minutes: u64 },
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Minutes { minutes } => write!(f, "{minutes} min"),
            Self::Hours { hours, minutes } => write!(f, "{hours}h {minutes}m"),
        }
    }
}

pub fn eta(remaining: u64, rate_per_minute: Option<f64>) -> Eta {
    let Some(rate) = rate_per_minute.filter(|rate| *rate > 0.0 && rate.is_finite()) else {
        return Eta::Unknown;
    };
    let minutes = (remaining as f64 / rate).ceil() as u64;
    if minutes < 60 {
        Eta::Minutes { minutes }
    } else {
        Eta::Hours {
            hours: minutes / 60,
            minutes: minutes % 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessRate {
    pub percent: f64,
    /// More errors were logged than items counted as processed.
    pub anomaly: bool,
}

pub fn success_rate(processed: u64, error_count: u64) -> SuccessRate {
    if processed == 0 {
        return SuccessRate {
            percent: 100.0,
            anomaly: error_count > 0,
        };
    }
    let raw = (processed as f64 - error_count as f64) / processed as f64 * 100.0;
    SuccessRate {
        percent: ((raw * 10.0).round() / 10.0).clamp(0.0, 100.0),
        anomaly: error_count > processed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub percentage: u8,
    pub rate_per_minute: Option<f64>,
    pub eta: Eta,
    pub success_rate: SuccessRate,
}

impl ProgressStats {
    /// Elapsed time runs from creation to the last recorded activity, so an
    /// idle job keeps the rate it had while it was working.
    pub fn for_job(job: &Job, error_count: u64) -> Self {
        let elapsed = elapsed_seconds(job.created_at, job.last_activity_at);
        let rate = rate_per_minute(job.processed_items, elapsed);
        Self {
            percentage: percentage(job.processed_items, job.total_items),
            rate_per_minute: rate,
            eta: eta(job.remaining_items(), rate),
            success_rate: success_rate(job.processed_items, error_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn percentage_bounds() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(150, 100), 100);
    }

    #[test]
    fn percentage_non_decreasing_as_processed_grows() {
        let total = 137;
        let mut last = 0;
        for processed in 0..=total {
            let current = percentage(processed, total);
            assert!(current >= last);
            last = current;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn rate_undefined_without_elapsed_time() {
        assert_eq!(rate_per_minute(10, 0.0), None);
        assert_eq!(rate_per_minute(30, 90.0), Some(20.0));
    }

    #[test]
    fn eta_formats_minutes_and_hours() {
        assert_eq!(eta(100, None), Eta::Unknown);
        assert_eq!(eta(100, Some(0.0)), Eta::Unknown);
        assert_eq!(eta(100, Some(10.0)).to_string(), "10 min");
        assert_eq!(
            eta(1500, Some(10.0)),
            Eta::Hours {
                hours: 2,
                minutes: 30
            }
        );
        assert_eq!(eta(1500, Some(10.0)).to_string(), "2h 30m");
    }

    #[test]
    fn five_errors_in_hundred_items() {
        let rate = success_rate(100, 5);
        assert_eq!(rate.percent, 95.0);
        assert!(!rate.anomaly);
    }

    #[test]
    fn success_rate_clamped_and_flagged() {
        assert_eq!(success_rate(0, 0).percent, 100.0);
        let rate = success_rate(3, 7);
        assert_eq!(rate.percent, 0.0);
        assert!(rate.anomaly);
        assert_eq!(success_rate(3, 1).percent, 66.7);
    }

    #[test]
    fn stats_use_last_activity_not_now() {
        let mut job = Job::new(50);
        job.total_items = 200;
        job.processed_items = 100;
        job.last_activity_at = job.created_at + Duration::minutes(10);

        let stats = ProgressStats::for_job(&job, 0);
        assert_eq!(stats.percentage, 50);
        assert_eq!(stats.rate_per_minute, Some(10.0));
        assert_eq!(stats.eta, Eta::Minutes { minutes: 10 });
    }
}
