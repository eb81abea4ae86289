use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return second
pub fn get_now_as_u64() -> u64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_secs()
}
