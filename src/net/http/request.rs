use std::collections::HashMap;

/// Byte sequence that ends an HTTP header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty request")]
    Empty,
    #[error("malformed request line '{0}'")]
    InvalidRequestLine(String),
}

/// A parsed HTTP/1.1 request head. Bodies are not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Header names are stored lower-cased.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Parses a header block (request line plus header lines, CRLF separated).
    ///
    /// Header lines without a `": "` separator are skipped rather than rejected.
    pub fn parse(head: &str) -> Result<Self, ParseError> {
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        if request_line.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        // METHOD SP PATH SP VERSION, single spaces only
        let mut parts = request_line.split(' ');
        let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        };
        if method.is_empty() || path.is_empty() || version.is_empty() {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        }

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(": "))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True only for an explicit `Connection: keep-alive`.
    ///
    /// An absent header means close, which is stricter than the HTTP/1.1 default.
    pub fn wants_keep_alive(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("keep-alive"))
    }
}

/// Position of the first CRLFCRLF in `buf`, if any.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
