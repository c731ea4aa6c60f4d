//! Minimal blocking HTTP/1.1 server over any Read + Write stream.
//!
//! Intentionally limited surface:
//! - One request per connection (no keep-alive)
//! - No chunked transfer encoding (rejected)
//! - Bodies on POST/PUT/PATCH require Content-Length
//! - Header cap: 32 KiB, body cap set by the caller (Read::take, not Content-Length trust)

use std::io::{BufRead, BufReader, Read, Write};

/// Maximum header section size (32 KiB)
const MAX_HEADER_SIZE: usize = 32 * 1024;

/// Parsed HTTP request (transport-free)
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Raw query string (after `?`), empty when absent
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Get header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response to write back
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a JSON response
    pub fn json(status: u16, value: &impl serde::Serialize) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// Response without a body
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Why a request could not be read
#[derive(Debug, PartialEq, Eq)]
pub enum ReadError {
    /// Malformed or unsupported request (400)
    Malformed(String),
    /// Body exceeds the configured cap (413)
    TooLarge,
}

impl ReadError {
    pub fn status(&self) -> u16 {
        match self {
            ReadError::Malformed(_) => 400,
            ReadError::TooLarge => 413,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ReadError::Malformed(msg) => msg.clone(),
            ReadError::TooLarge => "Request body too large".to_string(),
        }
    }
}

/// Reason phrase for common status codes
fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Split `/history?limit=5` into path and query
fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    }
}

/// Read and parse one HTTP request from a stream.
///
/// Returns None if the connection closed before a complete request was received.
/// Returns Some(Err) for malformed or oversized requests (caller should write an
/// error response).
pub fn read_request(
    stream: &mut impl Read,
    max_body: usize,
) -> Option<Result<HttpRequest, ReadError>> {
    let mut reader = BufReader::new(stream);

    // Read header section line by line; each read is bounded so a line without
    // a newline cannot grow the buffer past the cap
    let mut header_buf = Vec::with_capacity(4096);
    loop {
        let before = header_buf.len();
        let remaining = (MAX_HEADER_SIZE + 1).saturating_sub(before) as u64;
        match reader.by_ref().take(remaining).read_until(b'\n', &mut header_buf) {
            Ok(0) => {
                if header_buf.is_empty() {
                    return None; // clean close
                }
                return Some(Err(ReadError::Malformed(
                    "Connection closed mid-request".to_string(),
                )));
            }
            Ok(_) => {
                if header_buf.len() > MAX_HEADER_SIZE {
                    return Some(Err(ReadError::Malformed("Headers too large".to_string())));
                }
                // A bare CRLF line ends the header section
                if header_buf.len() - before <= 2 && header_buf.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            Err(e) => {
                if header_buf.is_empty() {
                    return None; // read error on fresh connection = closed
                }
                return Some(Err(ReadError::Malformed(format!("Read error: {}", e))));
            }
        }
    }

    // Parse headers with httparse
    let mut parsed_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut parsed_headers);

    match req.parse(&header_buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Some(Err(ReadError::Malformed(
                "Incomplete HTTP request".to_string(),
            )));
        }
        Err(e) => {
            return Some(Err(ReadError::Malformed(format!("HTTP parse error: {}", e))));
        }
    }

    let method = req.method.unwrap_or("").to_string();
    let (path, query) = split_target(req.path.unwrap_or("/"));

    let mut headers = Vec::new();
    let mut content_length: Option<usize> = None;
    let mut chunked = false;

    for h in req.headers.iter() {
        let name = h.name.to_string();
        let value = String::from_utf8_lossy(h.value).to_string();

        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value.trim().parse().ok();
        }
        if name.eq_ignore_ascii_case("Transfer-Encoding")
            && value.to_lowercase().contains("chunked")
        {
            chunked = true;
        }

        headers.push((name, value));
    }

    if chunked {
        return Some(Err(ReadError::Malformed(
            "Chunked transfer encoding not supported".to_string(),
        )));
    }

    // Read body
    let body = if method == "POST" || method == "PUT" || method == "PATCH" {
        match content_length {
            Some(len) if len > max_body => return Some(Err(ReadError::TooLarge)),
            Some(len) => {
                // Read with cap - do not trust Content-Length for size enforcement
                let mut body = Vec::with_capacity(len);
                if let Err(e) = reader.by_ref().take(len as u64).read_to_end(&mut body) {
                    return Some(Err(ReadError::Malformed(format!("Read error: {}", e))));
                }
                if body.len() < len {
                    return Some(Err(ReadError::Malformed(
                        "Connection closed mid-body".to_string(),
                    )));
                }
                body
            }
            None => {
                return Some(Err(ReadError::Malformed(format!(
                    "{} requires Content-Length",
                    method
                ))));
            }
        }
    } else {
        Vec::new()
    };

    Some(Ok(HttpRequest {
        method,
        path,
        query,
        headers,
        body,
    }))
}

/// Write an HTTP response to a stream.
pub fn write_response(stream: &mut impl Write, response: &HttpResponse) {
    let mut header_block = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason(response.status)
    );
    header_block.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    header_block.push_str("Connection: close\r\n");

    for (name, value) in &response.headers {
        header_block.push_str(&format!("{}: {}\r\n", name, value));
    }
    header_block.push_str("\r\n");

    // Write header + body, ignore errors (client may have disconnected)
    let _ = stream.write_all(header_block.as_bytes());
    if !response.body.is_empty() {
        let _ = stream.write_all(&response.body);
    }
    let _ = stream.flush();
}
