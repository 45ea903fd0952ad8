//! FFI: dynamic library loading and four-argument C calls.
//!
//! Loaded libraries and resolved symbols live in module-global registries.
//! Resolution failures log and return null from the call site; they never
//! abort.

use std::collections::HashMap;
use std::ffi::{c_char, CString};

use libloading::Library;
use parking_lot::Mutex;

use crate::value::{alloc, cstr_to_string, get, Value};

static LIBRARIES: Mutex<Vec<Library>> = Mutex::new(Vec::new());
static SYMBOLS: Mutex<Option<HashMap<String, usize>>> = Mutex::new(None);

type CFn = extern "C" fn(u64, u64, u64, u64) -> u64;

#[no_mangle]
pub extern "C" fn load_dll(name: *const c_char) -> *mut Value {
    let name = cstr_to_string(name);

    let candidates = [
        name.clone(),
        format!("lib{name}.so"),
        format!("{name}.so"),
        format!("{name}.dll"),
    ];

    for candidate in &candidates {
        if let Ok(library) = unsafe { Library::new(candidate) } {
            LIBRARIES.lock().push(library);
            return alloc(Value::Bool(true));
        }
    }

    eprintln!("[FFI] Could not load library '{name}'");
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn bind_c_function(name: *const c_char) -> *mut Value {
    let name = cstr_to_string(name);
    let symbol_name = CString::new(name.clone()).unwrap_or_default();

    let libraries = LIBRARIES.lock();
    for library in libraries.iter() {
        let symbol = unsafe { library.get::<unsafe extern "C" fn()>(symbol_name.as_bytes()) };
        if let Ok(symbol) = symbol {
            // The library is never unloaded, so the raw address stays valid.
            let address = *symbol as usize;
            SYMBOLS
                .lock()
                .get_or_insert_with(HashMap::new)
                .insert(name, address);
            return alloc(Value::Bool(true));
        }
    }

    eprintln!("[FFI] Could not resolve symbol '{name}'");
    alloc(Value::Null)
}

/// Reinterpret each value as its integer payload or its string pointer and
/// call through a fixed four-argument convention.
fn raw_argument(value: *mut Value, keep_alive: &mut Vec<CString>) -> u64 {
    match get(value) {
        Value::Int(n) => *n as u64,
        Value::Bool(b) => u64::from(*b),
        Value::Str(s) => {
            let cstring = CString::new(s.as_str()).unwrap_or_default();
            let ptr = cstring.as_ptr() as u64;
            keep_alive.push(cstring);
            ptr
        }
        Value::Function(code) => *code as u64,
        _ => 0,
    }
}

#[no_mangle]
pub extern "C" fn invoke_c_function(
    name: *const c_char,
    a1: *mut Value,
    a2: *mut Value,
    a3: *mut Value,
    a4: *mut Value,
) -> *mut Value {
    let name = cstr_to_string(name);

    let address = SYMBOLS
        .lock()
        .as_ref()
        .and_then(|symbols| symbols.get(&name).copied());

    let Some(address) = address else {
        eprintln!("[FFI] Call to unresolved symbol '{name}'");
        return alloc(Value::Null);
    };

    let mut keep_alive = vec![];
    let raw = [
        raw_argument(a1, &mut keep_alive),
        raw_argument(a2, &mut keep_alive),
        raw_argument(a3, &mut keep_alive),
        raw_argument(a4, &mut keep_alive),
    ];

    let function: CFn = unsafe { std::mem::transmute(address) };
    let result = function(raw[0], raw[1], raw[2], raw[3]);
    alloc(Value::Int(result as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_symbol_returns_null() {
        let result = invoke_c_function(
            c"definitely_not_bound".as_ptr(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        assert!(matches!(get(result), Value::Null));
    }

    #[test]
    fn missing_library_returns_null() {
        let result = load_dll(c"no_such_library_exists_here".as_ptr());
        assert!(matches!(get(result), Value::Null));
    }
}
