use chrono::{DateTime, Utc};

/// HTTP status codes produced by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 431 Request Header Fields Too Large
    RequestHeaderFieldsTooLarge,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::RequestHeaderFieldsTooLarge => 431,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
        }
    }
}

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = concat!("mill-mux/", env!("CARGO_PKG_VERSION"));

/// Formats `time` as an RFC 1123 HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// An HTML response with the standard header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Headers in serialization order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Builds a response carrying `Content-Type`, `Content-Length` (UTF-8 byte length
    /// of `body`), `Server` and `Date`.
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let headers = vec![
            (
                "Content-Type".to_string(),
                "text/html; charset=UTF-8".to_string(),
            ),
            ("Content-Length".to_string(), body.len().to_string()),
            ("Server".to_string(), SERVER_NAME.to_string()),
            ("Date".to_string(), http_date(Utc::now())),
        ];
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Status line, headers, blank line, body. Nothing is appended after the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.reason_phrase()
        );

        for (key, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", key, value));
        }

        response.push_str("\r\n");
        response.push_str(&self.body);

        response.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_codes() {
        assert_eq!(StatusCode::Ok.as_u16(), 200);
        assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
        assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    }

    #[test]
    fn date_is_rfc1123() {
        let time = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn content_length_counts_utf8_bytes() {
        let response = HttpResponse::html(StatusCode::Ok, "héllo");
        assert_eq!(response.header("content-length"), Some("6"));
    }

    #[test]
    fn serialization_layout() {
        let response = HttpResponse::html(StatusCode::NotFound, "<p>x</p>");
        let text = String::from_utf8(response.to_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(text.contains(&format!("Server: {}\r\n", SERVER_NAME)));
        assert!(text.contains("Date: "));
        assert!(text.ends_with("\r\n\r\n<p>x</p>"));
    }
}
