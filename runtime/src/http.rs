//! Blocking HTTP fetch.

use crate::value::{alloc, text_of, Value};

/// GET the URL and return the response body as a string; null on any
/// transport or read error.
#[no_mangle]
pub extern "C" fn http_fetch(url: *mut Value) -> *mut Value {
    let url = text_of(url);

    match ureq::get(&url).call() {
        Ok(response) => match response.into_string() {
            Ok(body) => alloc(Value::Str(body)),
            Err(err) => {
                eprintln!("[HTTP] Could not read response from '{url}': {err}");
                alloc(Value::Null)
            }
        },
        Err(err) => {
            eprintln!("[HTTP] Request to '{url}' failed: {err}");
            alloc(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::get;

    #[test]
    fn unreachable_host_returns_null() {
        let url = alloc(Value::Str(
            "http://127.0.0.1:1/definitely-not-listening".to_string(),
        ));
        assert!(matches!(get(http_fetch(url)), Value::Null));
    }
}
