use std::time::SystemTime;

/// Returns the current wall clock in milliseconds elapsed since 1970-01-01.
/// Header timestamps and latency computations share this reference.
#[inline]
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock predates the unix epoch")
        .as_millis() as u64
}
