use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds between two instants, zero when `end` precedes `start`.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn elapsed_never_negative() {
        let start = now();
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(5)), 0.0);
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(1500)), 1.5);
    }
}
