//! Arrays, dicts and structs.
//!
//! Computed access (`array_get`/`array_set`) dispatches on the container
//! tag so the same call sites serve arrays, dicts (string key lookup,
//! integer index iteration over keys), struct fields and string indexing.

use crate::value::{alloc, get, get_mut, int_of, text_of, Value};

#[no_mangle]
pub extern "C" fn push(array: *mut Value, item: *mut Value) -> *mut Value {
    if let Value::Array(items) = get_mut(array) {
        items.push(item);
    }
    array
}

#[no_mangle]
pub extern "C" fn pop(array: *mut Value) -> *mut Value {
    if let Value::Array(items) = get_mut(array) {
        if let Some(item) = items.pop() {
            return item;
        }
    }
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn shift(array: *mut Value) -> *mut Value {
    if let Value::Array(items) = get_mut(array) {
        if !items.is_empty() {
            return items.remove(0);
        }
    }
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn unshift(array: *mut Value, item: *mut Value) -> *mut Value {
    if let Value::Array(items) = get_mut(array) {
        items.insert(0, item);
    }
    array
}

#[no_mangle]
pub extern "C" fn length(value: *mut Value) -> *mut Value {
    let len = match get(value) {
        Value::Array(items) => items.len(),
        Value::Dict(pairs) => pairs.len(),
        Value::Struct { fields, .. } => fields.len(),
        Value::Str(s) => s.len(),
        _ => 0,
    };
    alloc(Value::Int(len as i64))
}

fn dict_lookup(pairs: &[(String, *mut Value)], key: &str) -> *mut Value {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| *v)
        .unwrap_or_else(|| alloc(Value::Null))
}

fn dict_insert(pairs: &mut Vec<(String, *mut Value)>, key: String, value: *mut Value) {
    if let Some(entry) = pairs.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        pairs.push((key, value));
    }
}

#[no_mangle]
pub extern "C" fn array_get(container: *mut Value, index: *mut Value) -> *mut Value {
    match get(container) {
        Value::Array(items) => {
            let i = int_of(index);
            if i >= 0 && (i as usize) < items.len() {
                items[i as usize]
            } else {
                alloc(Value::Null)
            }
        }
        Value::Dict(pairs) => match get(index) {
            Value::Str(key) => dict_lookup(pairs, key),
            // Integer index yields the i-th key; this is the for-in
            // iteration protocol.
            _ => {
                let i = int_of(index);
                if i >= 0 && (i as usize) < pairs.len() {
                    alloc(Value::Str(pairs[i as usize].0.clone()))
                } else {
                    alloc(Value::Null)
                }
            }
        },
        Value::Struct { fields, .. } => dict_lookup(fields, &text_of(index)),
        Value::Str(s) => {
            let i = int_of(index);
            if i >= 0 && (i as usize) < s.len() {
                let byte = s.as_bytes()[i as usize];
                alloc(Value::Str(
                    String::from_utf8_lossy(&[byte]).into_owned(),
                ))
            } else {
                alloc(Value::Null)
            }
        }
        _ => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn array_set(container: *mut Value, index: *mut Value, item: *mut Value) -> *mut Value {
    match get_mut(container) {
        Value::Array(items) => {
            let i = int_of(index);
            if i >= 0 {
                let i = i as usize;
                // Writing past the end grows the array with nulls.
                while items.len() <= i {
                    items.push(alloc(Value::Null));
                }
                items[i] = item;
            }
        }
        Value::Dict(pairs) => dict_insert(pairs, text_of(index), item),
        Value::Struct { fields, .. } => dict_insert(fields, text_of(index), item),
        _ => {}
    }
    item
}

#[no_mangle]
pub extern "C" fn dict_get(dict: *mut Value, key: *mut Value) -> *mut Value {
    match get(dict) {
        Value::Dict(pairs) => dict_lookup(pairs, &text_of(key)),
        Value::Struct { fields, .. } => dict_lookup(fields, &text_of(key)),
        _ => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn dict_set(dict: *mut Value, key: *mut Value, value: *mut Value) -> *mut Value {
    match get_mut(dict) {
        Value::Dict(pairs) => dict_insert(pairs, text_of(key), value),
        Value::Struct { fields, .. } => dict_insert(fields, text_of(key), value),
        _ => {}
    }
    dict
}

/// Dot access: struct fields, falling back to dict keys so `d.name` works
/// on plain dicts too.
#[no_mangle]
pub extern "C" fn struct_get(target: *mut Value, key: *mut Value) -> *mut Value {
    match get(target) {
        Value::Struct { fields, .. } => dict_lookup(fields, &text_of(key)),
        Value::Dict(pairs) => dict_lookup(pairs, &text_of(key)),
        _ => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn struct_set(target: *mut Value, key: *mut Value, value: *mut Value) -> *mut Value {
    match get_mut(target) {
        Value::Struct { fields, .. } => dict_insert(fields, text_of(key), value),
        Value::Dict(pairs) => dict_insert(pairs, text_of(key), value),
        _ => {}
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{new_array, new_dict, new_int, new_string, new_struct};

    fn s(text: &str) -> *mut Value {
        alloc(Value::Str(text.to_string()))
    }

    #[test]
    fn push_pop_shift_unshift() {
        let arr = new_array();
        push(arr, new_int(1));
        push(arr, new_int(2));
        unshift(arr, new_int(0));
        assert_eq!(int_of(length(arr)), 3);
        assert_eq!(int_of(shift(arr)), 0);
        assert_eq!(int_of(pop(arr)), 2);
        assert_eq!(int_of(length(arr)), 1);
    }

    #[test]
    fn pop_on_empty_returns_null() {
        let arr = new_array();
        assert!(matches!(get(pop(arr)), Value::Null));
    }

    #[test]
    fn set_past_end_grows_with_nulls() {
        let arr = new_array();
        array_set(arr, new_int(3), new_int(9));
        assert_eq!(int_of(length(arr)), 4);
        assert!(matches!(get(array_get(arr, new_int(0))), Value::Null));
        assert_eq!(int_of(array_get(arr, new_int(3))), 9);
    }

    #[test]
    fn out_of_bounds_get_is_null() {
        let arr = new_array();
        push(arr, new_int(1));
        assert!(matches!(get(array_get(arr, new_int(5))), Value::Null));
        assert!(matches!(get(array_get(arr, new_int(-1))), Value::Null));
    }

    #[test]
    fn dicts_preserve_insertion_order_and_update_in_place() {
        let dict = new_dict();
        dict_set(dict, s("b"), new_int(1));
        dict_set(dict, s("a"), new_int(2));
        dict_set(dict, s("b"), new_int(3));
        assert_eq!(int_of(length(dict)), 2);
        assert_eq!(int_of(dict_get(dict, s("b"))), 3);
        // Integer indexing yields keys in insertion order.
        assert_eq!(text_of(array_get(dict, new_int(0))), "b");
        assert_eq!(text_of(array_get(dict, new_int(1))), "a");
    }

    #[test]
    fn dict_keys_coerce_to_string() {
        let dict = new_dict();
        dict_set(dict, new_int(1), new_int(10));
        assert_eq!(int_of(dict_get(dict, s("1"))), 10);
    }

    #[test]
    fn struct_fields_via_struct_get_set() {
        let point = new_struct(c"Point".as_ptr());
        struct_set(point, s("x"), new_int(4));
        assert_eq!(int_of(struct_get(point, s("x"))), 4);
        assert!(matches!(get(struct_get(point, s("y"))), Value::Null));
        assert_eq!(text_of(point), "Point {x: 4}");
    }

    #[test]
    fn dot_access_works_on_dicts() {
        let dict = new_dict();
        dict_set(dict, s("name"), new_string(c"ada".as_ptr()));
        assert_eq!(text_of(struct_get(dict, s("name"))), "ada");
    }

    #[test]
    fn string_indexing_yields_one_char_strings() {
        let text = s("hi");
        assert_eq!(text_of(array_get(text, new_int(1))), "i");
        assert!(matches!(get(array_get(text, new_int(9))), Value::Null));
    }
}
