//! Server options and protocol limits.
//!
//! Loading configuration is left to the embedding server: both types derive
//! `serde::Deserialize` with defaults for every field, so a partial document
//! (toml, json, env) fills in only what it names.

use std::time::Duration;

use serde::Deserialize;

/// Options shared read-only by every connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Adds a `Server` header to every response.
    pub add_server_header: bool,
    /// Value of the `Server` header.
    pub server_name: String,
    /// Echo offending client input in rejection messages.
    pub show_error_details: bool,
    /// Initial capacity of the per-connection read buffer.
    pub read_buffer_size: usize,
    /// Number of body frames buffered between the body pump and the application.
    pub body_pipe_capacity: usize,
    pub limits: ServerLimits,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            add_server_header: true,
            server_name: String::from("micro-h1"),
            show_error_details: false,
            read_buffer_size: 8 * 1024,
            body_pipe_capacity: 8,
            limits: ServerLimits::default(),
        }
    }
}

impl ServerOptions {
    pub fn with_limits(mut self, limits: ServerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_show_error_details(mut self, show: bool) -> Self {
        self.show_error_details = show;
        self
    }

    pub fn with_server_header(mut self, add: bool) -> Self {
        self.add_server_header = add;
        self
    }

    pub fn with_server_name<S: Into<String>>(mut self, name: S) -> Self {
        self.server_name = name.into();
        self
    }
}

/// Size and time budgets enforced while processing a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerLimits {
    pub max_request_line_size: usize,
    pub max_request_headers_total_size: usize,
    pub max_request_header_count: usize,
    /// `None` disables the body size check.
    pub max_request_body_size: Option<u64>,
    pub keep_alive_timeout: Duration,
    pub request_headers_timeout: Duration,
    /// Longest a timed body read may go without receiving any bytes.
    pub request_body_read_timeout: Duration,
    pub response_write_timeout: Duration,
    /// How long the server keeps draining an unread request body before giving up on keep-alive.
    pub request_body_drain_timeout: Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_request_line_size: 8 * 1024,
            max_request_headers_total_size: 32 * 1024,
            max_request_header_count: 100,
            max_request_body_size: Some(30_000_000),
            keep_alive_timeout: Duration::from_secs(130),
            request_headers_timeout: Duration::from_secs(30),
            request_body_read_timeout: Duration::from_secs(30),
            response_write_timeout: Duration::from_secs(30),
            request_body_drain_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerLimits {
    pub fn with_max_request_line_size(mut self, size: usize) -> Self {
        self.max_request_line_size = size;
        self
    }

    pub fn with_max_request_headers_total_size(mut self, size: usize) -> Self {
        self.max_request_headers_total_size = size;
        self
    }

    pub fn with_max_request_header_count(mut self, count: usize) -> Self {
        self.max_request_header_count = count;
        self
    }

    pub fn with_max_request_body_size(mut self, size: Option<u64>) -> Self {
        self.max_request_body_size = size;
        self
    }

    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    pub fn with_request_headers_timeout(mut self, timeout: Duration) -> Self {
        self.request_headers_timeout = timeout;
        self
    }

    pub fn with_request_body_read_timeout(mut self, timeout: Duration) -> Self {
        self.request_body_read_timeout = timeout;
        self
    }

    pub fn with_response_write_timeout(mut self, timeout: Duration) -> Self {
        self.response_write_timeout = timeout;
        self
    }

    pub fn with_request_body_drain_timeout(mut self, timeout: Duration) -> Self {
        self.request_body_drain_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ServerOptions::default();
        assert!(options.add_server_header);
        assert!(!options.show_error_details);
        assert_eq!(options.limits.max_request_line_size, 8 * 1024);
        assert_eq!(options.limits.max_request_body_size, Some(30_000_000));
    }

    #[test]
    fn builders_override_fields() {
        let options = ServerOptions::default()
            .with_show_error_details(true)
            .with_limits(ServerLimits::default().with_max_request_body_size(None).with_max_request_header_count(10));

        assert!(options.show_error_details);
        assert_eq!(options.limits.max_request_body_size, None);
        assert_eq!(options.limits.max_request_header_count, 10);
    }
}
