/// HTTP error category for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    Client,     // 4xx errors
    Server,     // 5xx errors
    RateLimit,  // 429
}

/// Classified HTTP failure returned by the conversion service
#[derive(Debug, Clone)]
pub struct HttpErrorInfo {
    pub status_code: Option<u16>,
    pub category: HttpErrorCategory,
    pub description: String,
    pub is_retryable: bool,
}

impl HttpErrorInfo {
    /// Create from HTTP status code
    pub fn from_status(status: u16) -> Self {
        let (category, description, is_retryable) = match status {
            400 => (HttpErrorCategory::Client, "Bad Request".to_string(), false),
            404 => (HttpErrorCategory::Client, "Not Found".to_string(), false),
            413 => (HttpErrorCategory::Client, "Payload Too Large".to_string(), false),
            422 => (HttpErrorCategory::Client, "Unprocessable Entity".to_string(), false),
            429 => (HttpErrorCategory::RateLimit, "Too Many Requests".to_string(), true),
            500 => (HttpErrorCategory::Server, "Internal Server Error".to_string(), true),
            502 => (HttpErrorCategory::Server, "Bad Gateway".to_string(), true),
            503 => (HttpErrorCategory::Server, "Service Unavailable".to_string(), true),
            504 => (HttpErrorCategory::Server, "Gateway Timeout".to_string(), true),
            // Generic fallbacks
            _ if (400..500).contains(&status) => {
                (HttpErrorCategory::Client, format!("Client Error ({})", status), false)
            }
            _ if status >= 500 => {
                (HttpErrorCategory::Server, format!("Server Error ({})", status), true)
            }
            _ => (HttpErrorCategory::Client, format!("HTTP Error ({})", status), false),
        };

        Self {
            status_code: Some(status),
            category,
            description,
            is_retryable,
        }
    }

    /// Format for display
    pub fn format(&self) -> String {
        match self.status_code {
            Some(code) => format!("HTTP {} - {}", code, self.description),
            None => self.description.clone(),
        }
    }
}
