//! The tagged value model and its constructors.

use std::ffi::{c_char, c_void, CStr};
use std::fmt::Write;

/// Insertion-ordered key/value storage shared by dicts and structs. Lookup
/// is a linear scan; keys are owned strings.
pub type Dict = Vec<(String, *mut Value)>;

#[derive(Debug)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Vec<*mut Value>),
    Dict(Dict),
    Struct { type_name: String, fields: Dict },
    Function(*const c_void),
    Null,
}

/// Move a value onto the language heap. Nothing ever frees these.
pub fn alloc(value: Value) -> *mut Value {
    Box::into_raw(Box::new(value))
}

/// Borrow a value behind an entry-point pointer; null reads as `Null`.
pub fn get<'a>(ptr: *const Value) -> &'a Value {
    const NULL: &Value = &Value::Null;
    if ptr.is_null() {
        NULL
    } else {
        unsafe { &*ptr }
    }
}

/// Mutable access for container updates. Null yields a fresh throwaway
/// null so callers never fault.
pub fn get_mut<'a>(ptr: *mut Value) -> &'a mut Value {
    if ptr.is_null() {
        unsafe { &mut *alloc(Value::Null) }
    } else {
        unsafe { &mut *ptr }
    }
}

/// Integer view used by arithmetic: bools promote to 0/1, every other tag
/// reads as 0.
pub fn int_of(ptr: *const Value) -> i64 {
    match get(ptr) {
        Value::Int(n) => *n,
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Canonical text of a value, used by printing, string concatenation and
/// `to_string`.
pub fn text_of(ptr: *const Value) -> String {
    match get(ptr) {
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => s.clone(),
        Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&text_of(*item));
            }
            out.push(']');
            out
        }
        Value::Dict(pairs) => dict_text(pairs),
        Value::Struct { type_name, fields } => {
            format!("{type_name} {}", dict_text(fields))
        }
        Value::Function(_) => "<function>".to_string(),
        Value::Null => "null".to_string(),
    }
}

fn dict_text(pairs: &Dict) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{key}: {}", text_of(*value));
    }
    out.push('}');
    out
}

pub fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

// ------ constructors ------

#[no_mangle]
pub extern "C" fn new_int(value: i64) -> *mut Value {
    alloc(Value::Int(value))
}

#[no_mangle]
pub extern "C" fn new_bool(value: i64) -> *mut Value {
    alloc(Value::Bool(value != 0))
}

#[no_mangle]
pub extern "C" fn new_string(text: *const c_char) -> *mut Value {
    alloc(Value::Str(cstr_to_string(text)))
}

#[no_mangle]
pub extern "C" fn new_null() -> *mut Value {
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn new_array() -> *mut Value {
    alloc(Value::Array(Vec::with_capacity(8)))
}

#[no_mangle]
pub extern "C" fn new_dict() -> *mut Value {
    alloc(Value::Dict(Dict::new()))
}

#[no_mangle]
pub extern "C" fn new_struct(type_name: *const c_char) -> *mut Value {
    alloc(Value::Struct {
        type_name: cstr_to_string(type_name),
        fields: Dict::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_reads_as_null() {
        assert!(matches!(get(std::ptr::null()), Value::Null));
        assert_eq!(int_of(std::ptr::null()), 0);
        assert_eq!(text_of(std::ptr::null()), "null");
    }

    #[test]
    fn int_view_promotes_bools() {
        assert_eq!(int_of(new_int(42)), 42);
        assert_eq!(int_of(new_bool(1)), 1);
        assert_eq!(int_of(new_string(c"9".as_ptr())), 0);
    }

    #[test]
    fn canonical_text() {
        assert_eq!(text_of(new_int(-3)), "-3");
        assert_eq!(text_of(new_bool(1)), "true");
        assert_eq!(text_of(new_null()), "null");
        let arr = new_array();
        if let Value::Array(items) = get_mut(arr) {
            items.push(new_int(1));
            items.push(new_string(c"two".as_ptr()));
        }
        assert_eq!(text_of(arr), "[1, two]");
    }
}
