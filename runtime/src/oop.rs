//! The method registry.
//!
//! Populated once by the emitted main prologue (`register_method` per
//! class method), read-only afterwards. Dispatch looks up the receiver's
//! type name and tail-calls the registered code pointer with
//! `(this, a1, a2)`.

use std::ffi::c_char;
use std::process;

use parking_lot::Mutex;

use crate::value::{cstr_to_string, get, Value};

type MethodFn = extern "C" fn(*mut Value, *mut Value, *mut Value) -> *mut Value;

struct MethodEntry {
    class_name: String,
    method_name: String,
    code: usize,
}

static REGISTRY: Mutex<Vec<MethodEntry>> = Mutex::new(Vec::new());

#[no_mangle]
pub extern "C" fn register_method(
    class_name: *const c_char,
    method_name: *const c_char,
    code: *const std::ffi::c_void,
) {
    REGISTRY.lock().push(MethodEntry {
        class_name: cstr_to_string(class_name),
        method_name: cstr_to_string(method_name),
        code: code as usize,
    });
}

#[no_mangle]
pub extern "C" fn invoke_method(
    this: *mut Value,
    method_name: *const c_char,
    a1: *mut Value,
    a2: *mut Value,
) -> *mut Value {
    let method_name = cstr_to_string(method_name);

    let Value::Struct { type_name, .. } = get(this) else {
        eprintln!("[RUNTIME ERROR] Method '{method_name}' called on a non-object value");
        process::exit(1);
    };

    let code = REGISTRY
        .lock()
        .iter()
        .find(|entry| entry.class_name == *type_name && entry.method_name == method_name)
        .map(|entry| entry.code);

    match code {
        Some(code) => {
            let method: MethodFn = unsafe { std::mem::transmute(code) };
            method(this, a1, a2)
        }
        None => {
            eprintln!("[RUNTIME ERROR] Unknown method '{method_name}' on '{type_name}'");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{alloc, int_of, new_int, new_struct};

    extern "C" fn double_first(
        _this: *mut Value,
        a1: *mut Value,
        _a2: *mut Value,
    ) -> *mut Value {
        alloc(Value::Int(int_of(a1) * 2))
    }

    #[test]
    fn registered_method_dispatches_by_type_name() {
        register_method(
            c"Doubler".as_ptr(),
            c"apply".as_ptr(),
            double_first as *const std::ffi::c_void,
        );

        let receiver = new_struct(c"Doubler".as_ptr());
        let result = invoke_method(receiver, c"apply".as_ptr(), new_int(21), new_int(0));
        assert_eq!(int_of(result), 42);
    }
}
