//! String built-ins. Non-string operands are coerced through their
//! canonical text, so `uppercase(3)` is `"3"` rather than a fault.

use crate::value::{alloc, get, int_of, text_of, Value};

#[no_mangle]
pub extern "C" fn to_string(value: *mut Value) -> *mut Value {
    alloc(Value::Str(text_of(value)))
}

/// Parse the longest leading decimal, truncated toward zero. Ints and
/// bools pass through their integer view.
#[no_mangle]
pub extern "C" fn to_number(value: *mut Value) -> *mut Value {
    let number = match get(value) {
        Value::Str(s) => parse_leading_number(s),
        _ => int_of(value),
    };
    alloc(Value::Int(number))
}

fn parse_leading_number(text: &str) -> i64 {
    let trimmed = text.trim();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    trimmed[..end]
        .parse::<f64>()
        .map(|f| f.trunc() as i64)
        .unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn string_split(value: *mut Value, separator: *mut Value) -> *mut Value {
    let text = text_of(value);
    let separator = text_of(separator);

    let parts: Vec<*mut Value> = if separator.is_empty() {
        text.chars()
            .map(|c| alloc(Value::Str(c.to_string())))
            .collect()
    } else {
        text.split(&separator)
            .map(|part| alloc(Value::Str(part.to_string())))
            .collect()
    };

    alloc(Value::Array(parts))
}

#[no_mangle]
pub extern "C" fn string_starts_with(value: *mut Value, prefix: *mut Value) -> *mut Value {
    alloc(Value::Bool(text_of(value).starts_with(&text_of(prefix))))
}

#[no_mangle]
pub extern "C" fn string_ends_with(value: *mut Value, suffix: *mut Value) -> *mut Value {
    alloc(Value::Bool(text_of(value).ends_with(&text_of(suffix))))
}

#[no_mangle]
pub extern "C" fn string_contains(value: *mut Value, needle: *mut Value) -> *mut Value {
    alloc(Value::Bool(text_of(value).contains(&text_of(needle))))
}

/// Byte range `[start, end)`, clamped to the string.
#[no_mangle]
pub extern "C" fn string_substring(
    value: *mut Value,
    start: *mut Value,
    end: *mut Value,
) -> *mut Value {
    let text = text_of(value);
    let len = text.len() as i64;
    let start = int_of(start).clamp(0, len) as usize;
    let end = int_of(end).clamp(start as i64, len) as usize;
    let slice = String::from_utf8_lossy(&text.as_bytes()[start..end]).into_owned();
    alloc(Value::Str(slice))
}

#[no_mangle]
pub extern "C" fn string_index_of(value: *mut Value, needle: *mut Value) -> *mut Value {
    let position = text_of(value)
        .find(&text_of(needle))
        .map(|i| i as i64)
        .unwrap_or(-1);
    alloc(Value::Int(position))
}

#[no_mangle]
pub extern "C" fn string_replace(
    value: *mut Value,
    from: *mut Value,
    to: *mut Value,
) -> *mut Value {
    let from = text_of(from);
    if from.is_empty() {
        return alloc(Value::Str(text_of(value)));
    }
    alloc(Value::Str(text_of(value).replace(&from, &text_of(to))))
}

#[no_mangle]
pub extern "C" fn string_trim(value: *mut Value) -> *mut Value {
    alloc(Value::Str(text_of(value).trim().to_string()))
}

#[no_mangle]
pub extern "C" fn uppercase(value: *mut Value) -> *mut Value {
    alloc(Value::Str(text_of(value).to_uppercase()))
}

#[no_mangle]
pub extern "C" fn lowercase(value: *mut Value) -> *mut Value {
    alloc(Value::Str(text_of(value).to_lowercase()))
}
