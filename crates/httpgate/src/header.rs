use std::io;

use crate::conn::FeConn;

/// One parsed header line. Name comparisons are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// The header lines of one request, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct RequestHeader {
    pub status_line: String,
    pub headers: Headers,
}

/// Reads one request header block off the connection. `Ok(None)` means the
/// peer closed before any byte of this block arrived (idle close); errors
/// cover failures after at least one byte, malformed lines, non-UTF-8
/// header bytes, and blocks larger than `max_bytes`.
pub(crate) async fn split_http_header(
    conn: &mut FeConn,
    max_bytes: usize,
) -> io::Result<Option<RequestHeader>> {
    let Some(raw) = conn.read_until(b"\r\n\r\n", max_bytes).await? else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&raw).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "request headers were not valid UTF-8",
        )
    })?;

    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default().to_string();
    if status_line.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request line is missing",
        ));
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed header line"))?;
        headers.push(Header {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        });
    }

    Ok(Some(RequestHeader {
        status_line,
        headers: Headers(headers),
    }))
}

/// Strips the query and fragment from a request URI.
pub(crate) fn uri_to_path(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}
