use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique identifier that sorts by creation time.
///
/// Layout: zero-padded hex millisecond timestamp, a monotonic sequence
/// number, and a random suffix so ids stay unique across restarts that land
/// in the same millisecond.
pub fn generate_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xff_ffff;
    let suffix: u32 = rand::random();
    format!("{millis:012x}{seq:06x}{suffix:08x}")
}
