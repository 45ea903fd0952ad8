//! TCP socket built-ins. Connections are small integer handles into a
//! module-global registry.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::value::{alloc, int_of, text_of, Value};

static NEXT_SOCKET: AtomicI64 = AtomicI64::new(1);
static SOCKETS: Mutex<Option<HashMap<i64, TcpStream>>> = Mutex::new(None);

pub(crate) const RECEIVE_BUFFER: usize = 65536;

#[no_mangle]
pub extern "C" fn socket_connect(host: *mut Value, port: *mut Value) -> *mut Value {
    let host = text_of(host);
    let port = int_of(port).clamp(0, 65535) as u16;

    match TcpStream::connect((host.as_str(), port)) {
        Ok(stream) => {
            let handle = NEXT_SOCKET.fetch_add(1, Ordering::SeqCst);
            SOCKETS
                .lock()
                .get_or_insert_with(HashMap::new)
                .insert(handle, stream);
            alloc(Value::Int(handle))
        }
        Err(err) => {
            eprintln!("[NET] Could not connect to {host}:{port}: {err}");
            alloc(Value::Null)
        }
    }
}

#[no_mangle]
pub extern "C" fn socket_send(handle: *mut Value, data: *mut Value) -> *mut Value {
    let handle = int_of(handle);
    let data = text_of(data);

    let mut sockets = SOCKETS.lock();
    let Some(stream) = sockets.as_mut().and_then(|s| s.get_mut(&handle)) else {
        return alloc(Value::Int(-1));
    };

    match stream.write_all(data.as_bytes()) {
        Ok(()) => alloc(Value::Int(data.len() as i64)),
        Err(_) => alloc(Value::Int(-1)),
    }
}

#[no_mangle]
pub extern "C" fn socket_receive(handle: *mut Value) -> *mut Value {
    let handle = int_of(handle);

    let mut sockets = SOCKETS.lock();
    let Some(stream) = sockets.as_mut().and_then(|s| s.get_mut(&handle)) else {
        return alloc(Value::Null);
    };

    let mut buffer = vec![0u8; RECEIVE_BUFFER];
    match stream.read(&mut buffer) {
        Ok(0) | Err(_) => alloc(Value::Null),
        Ok(n) => alloc(Value::Str(
            String::from_utf8_lossy(&buffer[..n]).into_owned(),
        )),
    }
}

#[no_mangle]
pub extern "C" fn socket_close(handle: *mut Value) -> *mut Value {
    let handle = int_of(handle);
    if let Some(stream) = SOCKETS.lock().as_mut().and_then(|s| s.remove(&handle)) {
        let _ = stream.shutdown(Shutdown::Both);
    }
    alloc(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{get, new_int};
    use std::net::TcpListener;

    #[test]
    fn connect_send_receive_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(b"pong").unwrap();
        });

        let host = alloc(Value::Str("127.0.0.1".to_string()));
        let handle = socket_connect(host, new_int(addr.port() as i64));
        assert!(int_of(handle) > 0);

        let sent = socket_send(handle, alloc(Value::Str("ping".to_string())));
        assert_eq!(int_of(sent), 4);

        let received = socket_receive(handle);
        assert_eq!(text_of(received), "pong");

        socket_close(handle);
        server.join().unwrap();
    }

    #[test]
    fn operations_on_unknown_handles_fail_softly() {
        assert_eq!(
            int_of(socket_send(new_int(99999), alloc(Value::Str("x".into())))),
            -1
        );
        assert!(matches!(get(socket_receive(new_int(99999))), Value::Null));
    }
}
