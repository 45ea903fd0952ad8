//! OS threads and mutexes for generated programs.
//!
//! Each spawned thread runs its function to completion; there is no
//! scheduler. Handles are small integers into module-global registries.
//! The try/catch stack is thread-local, so exceptions never cross these
//! boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::JoinHandle;

use parking_lot::lock_api::RawMutex as RawMutexApi;
use parking_lot::{Mutex, RawMutex};

use crate::value::{alloc, get, int_of, Value};

static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);
static THREADS: Mutex<Option<HashMap<i64, JoinHandle<usize>>>> = Mutex::new(None);
static MUTEXES: Mutex<Option<HashMap<i64, &'static RawMutex>>> = Mutex::new(None);

fn next_handle() -> i64 {
    NEXT_HANDLE.fetch_add(1, Ordering::SeqCst)
}

type ThreadFn = extern "C" fn(*mut Value) -> *mut Value;

/// Spawn a thread running a compiled function. The callee arrives as the
/// raw code pointer the generator pushes for function-typed identifiers.
#[no_mangle]
pub extern "C" fn thread_spawn(function: *mut Value, argument: *mut Value) -> *mut Value {
    let code = match get(function) {
        Value::Function(code) => *code as usize,
        _ => function as usize,
    };
    if code == 0 {
        eprintln!("[RUNTIME ERROR] thread_spawn called without a function");
        return alloc(Value::Null);
    }

    let argument = argument as usize;
    let handle = next_handle();

    let join_handle = std::thread::spawn(move || {
        let function: ThreadFn = unsafe { std::mem::transmute(code) };
        function(argument as *mut Value) as usize
    });

    THREADS
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(handle, join_handle);
    alloc(Value::Int(handle))
}

#[no_mangle]
pub extern "C" fn thread_join(handle: *mut Value) -> *mut Value {
    let handle = int_of(handle);
    let join_handle = THREADS
        .lock()
        .as_mut()
        .and_then(|threads| threads.remove(&handle));

    match join_handle {
        Some(join_handle) => match join_handle.join() {
            Ok(result) => result as *mut Value,
            Err(_) => alloc(Value::Null),
        },
        None => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn mutex_create() -> *mut Value {
    let handle = next_handle();
    let raw: &'static RawMutex = Box::leak(Box::new(RawMutex::INIT));
    MUTEXES
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(handle, raw);
    alloc(Value::Int(handle))
}

#[no_mangle]
pub extern "C" fn mutex_lock(handle: *mut Value) -> *mut Value {
    let raw = MUTEXES
        .lock()
        .as_ref()
        .and_then(|mutexes| mutexes.get(&int_of(handle)).copied());
    if let Some(raw) = raw {
        raw.lock();
    }
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn mutex_unlock(handle: *mut Value) -> *mut Value {
    let raw = MUTEXES
        .lock()
        .as_ref()
        .and_then(|mutexes| mutexes.get(&int_of(handle)).copied());
    if let Some(raw) = raw {
        unsafe { raw.unlock() };
    }
    alloc(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::new_int;

    extern "C" fn add_one(argument: *mut Value) -> *mut Value {
        alloc(Value::Int(int_of(argument) + 1))
    }

    #[test]
    fn spawn_and_join_round_trip() {
        let function = alloc(Value::Function(add_one as *const std::ffi::c_void));
        let handle = thread_spawn(function, new_int(41));
        let result = thread_join(handle);
        assert_eq!(int_of(result), 42);
    }

    #[test]
    fn join_unknown_handle_is_null() {
        assert!(matches!(get(thread_join(new_int(424242))), Value::Null));
    }

    #[test]
    fn mutex_lock_unlock_cycle() {
        let m = mutex_create();
        mutex_lock(m);
        mutex_unlock(m);
        mutex_lock(m);
        mutex_unlock(m);
    }
}
