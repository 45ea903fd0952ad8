//! WebSocket built-ins: RFC 6455 text frames over plain TCP.
//!
//! Client connections mask outgoing frames, server-accepted connections do
//! not. Handshake digests use SHA-1 + base64 per the protocol. TLS (wss://)
//! is out of scope.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::value::{alloc, get, int_of, text_of, Value};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

struct WsConnection {
    stream: TcpStream,
    /// Clients must mask outgoing frames; servers must not.
    is_client: bool,
}

static NEXT_WS: AtomicI64 = AtomicI64::new(1);
static CONNECTIONS: Mutex<Option<HashMap<i64, WsConnection>>> = Mutex::new(None);
static LISTENERS: Mutex<Option<HashMap<i64, TcpListener>>> = Mutex::new(None);

fn next_handle() -> i64 {
    NEXT_WS.fetch_add(1, Ordering::SeqCst)
}

fn accept_key(client_key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(client_key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Split `ws://host:port/path` into its parts; port defaults to 80.
fn parse_ws_url(url: &str) -> Option<(String, u16, String)> {
    let rest = url.strip_prefix("ws://")?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, "/".to_string()),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().ok()?),
        None => (authority.to_string(), 80),
    };
    Some((host, port, path))
}

#[no_mangle]
pub extern "C" fn ws_connect(url: *mut Value) -> *mut Value {
    let url = text_of(url);
    let Some((host, port, path)) = parse_ws_url(&url) else {
        eprintln!("[WS] Invalid WebSocket URL '{url}'");
        return alloc(Value::Null);
    };

    let mut stream = match TcpStream::connect((host.as_str(), port)) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("[WS] Could not connect to {host}:{port}: {err}");
            return alloc(Value::Null);
        }
    };

    let mut key_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    let key = BASE64.encode(key_bytes);

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}:{port}\r\nUpgrade: websocket\r\n\
         Connection: Upgrade\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n"
    );
    if stream.write_all(request.as_bytes()).is_err() {
        return alloc(Value::Null);
    }

    // Read the 101 response headers.
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(clone) => clone,
        Err(_) => return alloc(Value::Null),
    });
    let mut status = String::new();
    if reader.read_line(&mut status).is_err() || !status.contains("101") {
        eprintln!("[WS] Handshake rejected by {host}:{port}");
        return alloc(Value::Null);
    }
    let expected = accept_key(&key);
    let mut accepted = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return alloc(Value::Null);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line
            .strip_prefix("Sec-WebSocket-Accept:")
            .or_else(|| line.strip_prefix("sec-websocket-accept:"))
        {
            accepted = value.trim() == expected;
        }
    }
    if !accepted {
        eprintln!("[WS] Handshake key mismatch from {host}:{port}");
        return alloc(Value::Null);
    }

    let handle = next_handle();
    CONNECTIONS
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(
            handle,
            WsConnection {
                stream,
                is_client: true,
            },
        );
    alloc(Value::Int(handle))
}

fn write_text_frame(stream: &mut TcpStream, payload: &[u8], mask: bool) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(0x81); // FIN + text opcode

    let mask_bit = if mask { 0x80 } else { 0 };
    if payload.len() < 126 {
        frame.push(mask_bit | payload.len() as u8);
    } else if payload.len() <= 65535 {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }

    if mask {
        let mut key = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut key);
        frame.extend_from_slice(&key);
        frame.extend(
            payload
                .iter()
                .enumerate()
                .map(|(i, byte)| byte ^ key[i % 4]),
        );
    } else {
        frame.extend_from_slice(payload);
    }

    stream.write_all(&frame)
}

fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header)?;

    let opcode = header[0] & 0x0f;
    let masked = header[1] & 0x80 != 0;
    let mut length = (header[1] & 0x7f) as u64;

    if length == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext)?;
        length = u16::from_be_bytes(ext) as u64;
    } else if length == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext)?;
        length = u64::from_be_bytes(ext);
    }

    let mut mask_key = [0u8; 4];
    if masked {
        stream.read_exact(&mut mask_key)?;
    }

    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload)?;

    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask_key[i % 4];
        }
    }

    // Close frame ends the conversation.
    if opcode == 0x8 {
        return Ok(None);
    }
    Ok(Some(payload))
}

#[no_mangle]
pub extern "C" fn ws_send(handle: *mut Value, message: *mut Value) -> *mut Value {
    let handle = int_of(handle);
    let message = text_of(message);

    let mut connections = CONNECTIONS.lock();
    let Some(connection) = connections.as_mut().and_then(|c| c.get_mut(&handle)) else {
        return alloc(Value::Int(-1));
    };

    match write_text_frame(
        &mut connection.stream,
        message.as_bytes(),
        connection.is_client,
    ) {
        Ok(()) => alloc(Value::Int(message.len() as i64)),
        Err(_) => alloc(Value::Int(-1)),
    }
}

#[no_mangle]
pub extern "C" fn ws_receive(handle: *mut Value) -> *mut Value {
    let handle = int_of(handle);

    let mut connections = CONNECTIONS.lock();
    let Some(connection) = connections.as_mut().and_then(|c| c.get_mut(&handle)) else {
        return alloc(Value::Null);
    };

    match read_frame(&mut connection.stream) {
        Ok(Some(payload)) => alloc(Value::Str(String::from_utf8_lossy(&payload).into_owned())),
        _ => alloc(Value::Null),
    }
}

#[no_mangle]
pub extern "C" fn ws_close(handle: *mut Value) -> *mut Value {
    let handle = int_of(handle);
    if let Some(mut connection) = CONNECTIONS.lock().as_mut().and_then(|c| c.remove(&handle)) {
        // Best-effort close frame.
        let _ = connection.stream.write_all(&[0x88, 0x00]);
    }
    alloc(Value::Null)
}

#[no_mangle]
pub extern "C" fn ws_server_create(port: *mut Value) -> *mut Value {
    let port = int_of(port).clamp(0, 65535) as u16;
    match TcpListener::bind(("0.0.0.0", port)) {
        Ok(listener) => {
            let handle = next_handle();
            LISTENERS
                .lock()
                .get_or_insert_with(HashMap::new)
                .insert(handle, listener);
            alloc(Value::Int(handle))
        }
        Err(err) => {
            eprintln!("[WS] Could not bind port {port}: {err}");
            alloc(Value::Null)
        }
    }
}

#[no_mangle]
pub extern "C" fn ws_server_accept(server: *mut Value) -> *mut Value {
    let server = int_of(server);
    let stream = {
        let listeners = LISTENERS.lock();
        let Some(listener) = listeners.as_ref().and_then(|l| l.get(&server)) else {
            return alloc(Value::Null);
        };
        listener.accept()
    };

    let Ok((mut stream, _)) = stream else {
        return alloc(Value::Null);
    };

    // Server-side handshake: find the client key, answer 101.
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(clone) => clone,
        Err(_) => return alloc(Value::Null),
    });
    let mut client_key = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() {
            return alloc(Value::Null);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let lowered = line.to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("sec-websocket-key:") {
            // Preserve the original casing of the key itself.
            let offset = line.len() - rest.len();
            client_key = Some(line[offset..].trim().to_string());
        }
    }

    let Some(client_key) = client_key else {
        return alloc(Value::Null);
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
         Connection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&client_key)
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return alloc(Value::Null);
    }

    let handle = next_handle();
    CONNECTIONS
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(
            handle,
            WsConnection {
                stream,
                is_client: false,
            },
        );
    alloc(Value::Int(handle))
}

#[no_mangle]
pub extern "C" fn ws_server_close(server: *mut Value) -> *mut Value {
    LISTENERS
        .lock()
        .as_mut()
        .and_then(|l| l.remove(&int_of(server)));
    alloc(Value::Null)
}

/// Wait until one of the given connection handles has readable data.
/// Returns the ready handle, or null on timeout. `timeout_ms < 0` blocks,
/// `0` polls once, `> 0` bounds the wait.
#[no_mangle]
pub extern "C" fn ws_select(handles: *mut Value, timeout_ms: *mut Value) -> *mut Value {
    let handle_list: Vec<i64> = match get(handles) {
        Value::Array(items) => items.iter().map(|item| int_of(*item)).collect(),
        _ => vec![int_of(handles)],
    };
    let timeout = int_of(timeout_ms);
    let deadline = if timeout >= 0 {
        Some(Instant::now() + Duration::from_millis(timeout as u64))
    } else {
        None
    };

    loop {
        {
            let mut connections = CONNECTIONS.lock();
            if let Some(connections) = connections.as_mut() {
                for handle in &handle_list {
                    let Some(connection) = connections.get_mut(handle) else {
                        continue;
                    };
                    let mut probe = [0u8; 1];
                    let _ = connection.stream.set_nonblocking(true);
                    let ready = matches!(connection.stream.peek(&mut probe), Ok(n) if n > 0);
                    let _ = connection.stream.set_nonblocking(false);
                    if ready {
                        return alloc(Value::Int(*handle));
                    }
                }
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return alloc(Value::Null);
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::new_int;

    #[test]
    fn accept_key_matches_rfc_example() {
        // The example handshake from RFC 6455 §1.3.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn url_parsing() {
        assert_eq!(
            parse_ws_url("ws://example.com:9001/chat"),
            Some(("example.com".to_string(), 9001, "/chat".to_string()))
        );
        assert_eq!(
            parse_ws_url("ws://example.com"),
            Some(("example.com".to_string(), 80, "/".to_string()))
        );
        assert_eq!(parse_ws_url("http://example.com"), None);
    }

    #[test]
    fn client_and_server_exchange_text_frames() {
        let server = ws_server_create(new_int(0));
        let server_handle = int_of(server);
        // Port 0 binding works; fetch the real port back out of the registry.
        let port = {
            let listeners = LISTENERS.lock();
            listeners
                .as_ref()
                .unwrap()
                .get(&server_handle)
                .unwrap()
                .local_addr()
                .unwrap()
                .port()
        };

        let accept_thread = std::thread::spawn(move || {
            let conn = ws_server_accept(new_int(server_handle));
            let received = ws_receive(conn);
            ws_send(conn, received);
        });

        let url = alloc(Value::Str(format!("ws://127.0.0.1:{port}/echo")));
        let client = ws_connect(url);
        assert!(int_of(client) > 0, "handshake failed");

        ws_send(client, alloc(Value::Str("hello".to_string())));
        let echoed = ws_receive(client);
        assert_eq!(text_of(echoed), "hello");

        ws_close(client);
        accept_thread.join().unwrap();
        ws_server_close(server);
    }
}
