use chrono::Utc;

/// Server wall clock in epoch milliseconds. Every playback timestamp is
/// taken from here, never from the client.
pub fn now_ms() -> i64 { Utc::now().timestamp_millis() }
