use chrono::{DateTime, Duration, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn millis_to_seconds(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

pub fn minutes_ago(from: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    from - Duration::minutes(minutes)
}
