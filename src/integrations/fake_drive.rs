//! In-process stand-in for the Drive v3 file endpoints used by `DriveStore`.
//! Serves one connection at a time on a loopback port.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

#[derive(Clone)]
struct FakeFile {
    id: String,
    name: String,
    content: String,
    trashed: bool,
}

#[derive(Default)]
struct FakeState {
    files: Vec<FakeFile>,
    next_id: usize,
    fail_writes: bool,
    hold_writes: bool,
    writes: usize,
}

struct Shared {
    token: String,
    state: Mutex<FakeState>,
    released: Condvar,
}

pub struct FakeDrive {
    addr: String,
    shared: Arc<Shared>,
}

struct Request {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl FakeDrive {
    pub fn spawn(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake drive");
        let addr = listener.local_addr().expect("local addr").to_string();
        let shared = Arc::new(Shared {
            token: token.to_string(),
            state: Mutex::new(FakeState::default()),
            released: Condvar::new(),
        });

        let server = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let _ = serve(&server, &mut stream);
            }
        });

        Self { addr, shared }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn insert_file(&self, id: &str, name: &str, content: &str, trashed: bool) {
        let mut state = self.shared.state.lock().unwrap();
        state.files.push(FakeFile {
            id: id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            trashed,
        });
    }

    pub fn content(&self, id: &str) -> Option<String> {
        let state = self.shared.state.lock().unwrap();
        state
            .files
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.content.clone())
    }

    pub fn file_names(&self) -> Vec<String> {
        let state = self.shared.state.lock().unwrap();
        state.files.iter().map(|f| f.name.clone()).collect()
    }

    pub fn write_count(&self) -> usize {
        self.shared.state.lock().unwrap().writes
    }

    pub fn fail_writes(&self, fail: bool) {
        self.shared.state.lock().unwrap().fail_writes = fail;
    }

    /// While held, overwrite requests block inside the server.
    pub fn hold_writes(&self, hold: bool) {
        self.shared.state.lock().unwrap().hold_writes = hold;
        self.shared.released.notify_all();
    }
}

fn serve(shared: &Shared, stream: &mut TcpStream) -> io::Result<()> {
    let request = read_request(stream)?;

    let authorized = request
        .headers
        .get("authorization")
        .is_some_and(|value| value == &format!("Bearer {}", shared.token));
    if !authorized {
        return respond(stream, 401, r#"{"error":"unauthorized"}"#);
    }

    let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["drive", "v3", "files"]) => {
            let q = request.query.get("q").cloned().unwrap_or_default();
            let state = shared.state.lock().unwrap();
            let files: Vec<serde_json::Value> = state
                .files
                .iter()
                .filter(|f| {
                    !f.trashed && q.contains(&format!("name = '{}'", quoted(&f.name)))
                })
                .map(|f| serde_json::json!({ "id": f.id, "name": f.name }))
                .collect();
            respond(stream, 200, &serde_json::json!({ "files": files }).to_string())
        }
        ("GET", ["drive", "v3", "files", id]) => {
            let state = shared.state.lock().unwrap();
            match state.files.iter().find(|f| f.id == *id) {
                Some(file) => respond(stream, 200, &file.content),
                None => respond(stream, 404, r#"{"error":"not found"}"#),
            }
        }
        ("POST", ["upload", "drive", "v3", "files"]) => {
            let content_type = request
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_default();
            let parts = parse_multipart(&content_type, &request.body);
            let metadata: serde_json::Value = parts
                .get("metadata")
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or_default();
            let name = metadata["name"].as_str().unwrap_or("untitled").to_string();

            let mut state = shared.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("file-{}", state.next_id);
            state.files.push(FakeFile {
                id: id.clone(),
                name: name.clone(),
                content: parts.get("file").cloned().unwrap_or_default(),
                trashed: false,
            });
            respond(
                stream,
                200,
                &serde_json::json!({ "id": id, "name": name }).to_string(),
            )
        }
        ("PATCH", ["upload", "drive", "v3", "files", id]) => {
            let mut state = shared.state.lock().unwrap();
            while state.hold_writes {
                state = shared.released.wait(state).unwrap();
            }
            if state.fail_writes {
                drop(state);
                return respond(stream, 500, r#"{"error":"backend error"}"#);
            }
            let body = String::from_utf8_lossy(&request.body).to_string();
            let Some(pos) = state.files.iter().position(|f| f.id == *id) else {
                drop(state);
                return respond(stream, 404, r#"{"error":"not found"}"#);
            };
            state.files[pos].content = body;
            state.writes += 1;
            drop(state);
            respond(stream, 200, &serde_json::json!({ "id": id }).to_string())
        }
        _ => respond(stream, 404, r#"{"error":"no route"}"#),
    }
}

fn quoted(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}

fn read_request(stream: &mut TcpStream) -> io::Result<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/");
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let mut body = buf[header_end..].to_vec();
    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    if chunked {
        while !body.ends_with(b"0\r\n\r\n") {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body = decode_chunked(&body);
    } else {
        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while body.len() < length {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }

    Ok(Request {
        method,
        path: path.to_string(),
        query: parse_query(query),
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: u16, body: &str) -> io::Result<()> {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn decode_chunked(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(line_end) = find(rest, b"\r\n") {
        let size_line = String::from_utf8_lossy(&rest[..line_end]).to_string();
        let size = usize::from_str_radix(size_line.split(';').next().unwrap_or("").trim(), 16)
            .unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        let end = (start + size).min(rest.len());
        out.extend_from_slice(&rest[start..end]);
        rest = &rest[(end + 2).min(rest.len())..];
    }
    out
}

fn parse_multipart(content_type: &str, body: &[u8]) -> HashMap<String, String> {
    let mut parts = HashMap::new();
    let Some(boundary) = content_type
        .split(';')
        .find_map(|p| p.trim().strip_prefix("boundary="))
    else {
        return parts;
    };
    let boundary = boundary.trim_matches('"');
    let text = String::from_utf8_lossy(body).to_string();

    for section in text.split(&format!("--{boundary}")) {
        let Some((head, content)) = section.split_once("\r\n\r\n") else {
            continue;
        };
        let Some(name) = head
            .split(';')
            .find_map(|p| p.trim().strip_prefix("name="))
            .map(|n| n.split("\r\n").next().unwrap_or(n).trim_matches('"').to_string())
        else {
            continue;
        };
        let content = content.strip_suffix("\r\n").unwrap_or(content);
        parts.insert(name, content.to_string());
    }
    parts
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}
