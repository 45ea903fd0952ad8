//! Printing and file I/O.

use std::fs::{self, OpenOptions};
use std::io::Write;

use crate::value::{alloc, text_of, Value};

#[no_mangle]
pub extern "C" fn print_value(value: *mut Value) -> *mut Value {
    println!("{}", text_of(value));
    value
}

#[no_mangle]
pub extern "C" fn read_file(path: *mut Value) -> *mut Value {
    match fs::read_to_string(text_of(path)) {
        Ok(contents) => alloc(Value::Str(contents)),
        Err(_) => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn write_file(path: *mut Value, contents: *mut Value) -> *mut Value {
    let ok = fs::write(text_of(path), text_of(contents)).is_ok();
    alloc(Value::Bool(ok))
}

#[no_mangle]
pub extern "C" fn append_file(path: *mut Value, contents: *mut Value) -> *mut Value {
    let ok = OpenOptions::new()
        .create(true)
        .append(true)
        .open(text_of(path))
        .and_then(|mut file| file.write_all(text_of(contents).as_bytes()))
        .is_ok();
    alloc(Value::Bool(ok))
}

#[no_mangle]
pub extern "C" fn file_exists(path: *mut Value) -> *mut Value {
    alloc(Value::Bool(fs::metadata(text_of(path)).is_ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_truthy;

    fn s(text: &str) -> *mut Value {
        alloc(Value::Str(text.to_string()))
    }

    #[test]
    fn write_read_append_round_trip() {
        let dir = std::env::temp_dir().join("stola_io_test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("out.txt");
        let path_value = s(path.to_str().unwrap());

        assert_eq!(is_truthy(write_file(path_value, s("one"))), 1);
        assert_eq!(is_truthy(append_file(path_value, s("two"))), 1);
        assert_eq!(text_of(read_file(path_value)), "onetwo");
        assert_eq!(is_truthy(file_exists(path_value)), 1);

        let _ = fs::remove_file(&path);
        assert_eq!(is_truthy(file_exists(path_value)), 0);
        assert!(matches!(
            crate::value::get(read_file(path_value)),
            Value::Null
        ));
    }
}
