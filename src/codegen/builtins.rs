//! Mapping from language-level built-in names to runtime entry points.
//! Arity here is the number of `value*` arguments the entry takes; call
//! sites are padded with nulls and surplus arguments are dropped so every
//! call matches the fixed runtime signature.

pub struct Builtin {
    pub entry: &'static str,
    pub arity: usize,
}

pub fn lookup(name: &str) -> Option<Builtin> {
    let (entry, arity) = match name {
        "print" => ("print_value", 1),
        "len" | "length" => ("length", 1),
        "push" => ("push", 2),
        "pop" => ("pop", 1),
        "shift" => ("shift", 1),
        "unshift" => ("unshift", 2),
        "to_string" => ("to_string", 1),
        "to_number" => ("to_number", 1),
        "string_split" => ("string_split", 2),
        "string_starts_with" => ("string_starts_with", 2),
        "string_ends_with" => ("string_ends_with", 2),
        "string_contains" => ("string_contains", 2),
        "string_substring" => ("string_substring", 3),
        "string_index_of" => ("string_index_of", 2),
        "string_replace" => ("string_replace", 3),
        "string_trim" => ("string_trim", 1),
        "uppercase" => ("uppercase", 1),
        "lowercase" => ("lowercase", 1),
        "socket_connect" => ("socket_connect", 2),
        "socket_send" => ("socket_send", 2),
        "socket_receive" => ("socket_receive", 1),
        "socket_close" => ("socket_close", 1),
        "ws_connect" => ("ws_connect", 1),
        "ws_send" => ("ws_send", 2),
        "ws_receive" => ("ws_receive", 1),
        "ws_close" => ("ws_close", 1),
        "ws_server_create" => ("ws_server_create", 1),
        "ws_server_accept" => ("ws_server_accept", 1),
        "ws_server_close" => ("ws_server_close", 1),
        "ws_select" => ("ws_select", 2),
        "http_fetch" => ("http_fetch", 1),
        "json_encode" => ("json_encode", 1),
        "json_decode" => ("json_decode", 1),
        "current_time" => ("current_time", 0),
        "sleep" => ("sleep", 1),
        "random" => ("random", 0),
        "floor" => ("floor", 1),
        "ceil" => ("ceil", 1),
        "round" => ("round", 1),
        "read_file" => ("read_file", 1),
        "write_file" => ("write_file", 2),
        "append_file" => ("append_file", 2),
        "file_exists" => ("file_exists", 1),
        "thread_spawn" => ("thread_spawn", 2),
        "thread_join" => ("thread_join", 1),
        "mutex_create" => ("mutex_create", 0),
        "mutex_lock" => ("mutex_lock", 1),
        "mutex_unlock" => ("mutex_unlock", 1),
        _ => return None,
    };
    Some(Builtin { entry, arity })
}
