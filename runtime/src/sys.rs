//! Time, sleep and integer math helpers.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::value::{alloc, int_of, Value};

/// Milliseconds since the Unix epoch.
#[no_mangle]
pub extern "C" fn current_time() -> *mut Value {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    alloc(Value::Int(millis))
}

#[no_mangle]
pub extern "C" fn sleep(millis: *mut Value) -> *mut Value {
    let millis = int_of(millis).max(0) as u64;
    thread::sleep(Duration::from_millis(millis));
    alloc(Value::Null)
}

/// Non-negative int below 2^31.
#[no_mangle]
pub extern "C" fn random() -> *mut Value {
    let n: i64 = rand::thread_rng().gen_range(0..2_147_483_647);
    alloc(Value::Int(n))
}

// The numeric payload is already integral, so rounding is the integer
// view; these exist because `to_number` truncates decimal text.

#[no_mangle]
pub extern "C" fn floor(value: *mut Value) -> *mut Value {
    alloc(Value::Int(int_of(value)))
}

#[no_mangle]
pub extern "C" fn ceil(value: *mut Value) -> *mut Value {
    alloc(Value::Int(int_of(value)))
}

#[no_mangle]
pub extern "C" fn round(value: *mut Value) -> *mut Value {
    alloc(Value::Int(int_of(value)))
}
