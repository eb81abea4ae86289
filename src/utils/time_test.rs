use std::thread::sleep;
use std::time::Duration;

use super::time::*;

#[test]
fn test_get_now_as_u64() {
    let t1 = get_now_as_u64();
    // Greater than 2021-01-01
    assert!(t1 > 1609459200);
    sleep(Duration::from_millis(10));
    assert!(get_now_as_u64() >= t1);
}
