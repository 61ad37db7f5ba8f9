//! Minimal HTTP/1.1 request reading and response writing over `TcpStream`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const MAX_HEAD_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn content_length(&self) -> Result<usize> {
        match self.header("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length '{}'", value)),
            None => Ok(0),
        }
    }
}

/// Why a request could not be read.
#[derive(Debug)]
pub(crate) enum RequestError {
    /// Declared body exceeds the upload limit.
    TooLarge(usize),
    Malformed(anyhow::Error),
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Malformed(err)
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        Self::Malformed(err.into())
    }
}

/// Read the request head and, when present, a `Content-Length` body of at
/// most `max_body_bytes`.
pub(crate) fn read_request(
    stream: &mut TcpStream,
    max_body_bytes: usize,
) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let head_end = loop {
        if let Some(pos) = find_subsequence(&data, b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEAD_BYTES {
            return Err(anyhow!("request head too large").into());
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request head").into());
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    let mut request = HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body: Vec::new(),
    };

    let content_length = request.content_length()?;
    if content_length > max_body_bytes {
        return Err(RequestError::TooLarge(content_length));
    }
    if content_length > 0 {
        if request
            .header("expect")
            .is_some_and(|value| value.eq_ignore_ascii_case("100-continue"))
        {
            stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
        }
        let mut body = data.split_off(head_end + 4);
        body.truncate(content_length);
        while body.len() < content_length {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Err(anyhow!(
                    "connection closed after {} of {} body bytes",
                    body.len(),
                    content_length
                )
                .into());
            }
            let take = n.min(content_length - body.len());
            body.extend_from_slice(&buf[..take]);
        }
        request.body = body;
    }
    Ok(request)
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        303 => "HTTP/1.1 303 See Other",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        415 => "HTTP/1.1 415 Unsupported Media Type",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub(crate) fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(status),
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush().context("flush response")?;
    Ok(())
}

pub(crate) fn write_text(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/plain; charset=utf-8", body.as_bytes())
}

pub(crate) fn write_html(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/html; charset=utf-8", body.as_bytes())
}

pub(crate) fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

pub(crate) fn write_redirect(stream: &mut TcpStream, location: &str) -> Result<()> {
    let header = format!(
        "{status_line}\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status_line = status_line(303),
        location = location
    );
    stream.write_all(header.as_bytes())?;
    stream.flush().context("flush redirect")?;
    Ok(())
}

/// Start an open-ended response; the caller streams the body and closes.
pub(crate) fn write_stream_head(stream: &mut TcpStream, content_type: &str) -> Result<()> {
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line(200),
        content_type = content_type
    );
    stream.write_all(header.as_bytes())?;
    stream.flush().context("flush stream head")?;
    Ok(())
}

pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_subsequence_positions() {
        assert_eq!(find_subsequence(b"abc\r\n\r\nbody", b"\r\n\r\n"), Some(3));
        assert_eq!(find_subsequence(b"abc", b"abcd"), None);
        assert_eq!(find_subsequence(b"abc", b""), None);
    }

    #[test]
    fn unknown_status_maps_to_internal_error() {
        assert_eq!(status_line(303), "HTTP/1.1 303 See Other");
        assert_eq!(status_line(599), "HTTP/1.1 500 Internal Server Error");
    }
}
