use chrono::Utc;

pub fn unix_time() -> i64 {
    Utc::now().timestamp()
}
