//! Connection and request events.
//!
//! Every event the connection reports goes through one of these helpers so
//! the field names and levels stay consistent across the crate.

use http::{Method, StatusCode, Version};
use tracing::{debug, error, info, trace, warn};

use crate::protocol::{ParseError, TraceIdentifier};

pub(crate) fn connection_start(connection_id: u64) {
    debug!(connection_id, "connection start");
}

pub(crate) fn connection_stop(connection_id: u64, requests: u64) {
    debug!(connection_id, requests, "connection stop");
}

pub(crate) fn request_start(trace_id: &TraceIdentifier, method: &Method, path: &str, version: Version) {
    info!(trace_id = trace_id.as_str(), %method, path, ?version, "request start");
}

pub(crate) fn request_stop(trace_id: &TraceIdentifier, status: Option<StatusCode>, keep_alive: bool) {
    info!(trace_id = trace_id.as_str(), status = status.map(|s| s.as_u16()), keep_alive, "request stop");
}

pub(crate) fn request_body_start(trace_id: &TraceIdentifier) {
    trace!(trace_id = trace_id.as_str(), "request body start");
}

pub(crate) fn request_body_done(trace_id: &TraceIdentifier) {
    trace!(trace_id = trace_id.as_str(), "request body done");
}

pub(crate) fn connection_bad_request(connection_id: u64, error: &ParseError) {
    warn!(connection_id, status = error.status_code().map(|s| s.as_u16()), cause = %error, "bad request");
}

pub(crate) fn application_error(trace_id: Option<&TraceIdentifier>, error: &(dyn std::error::Error + 'static)) {
    error!(trace_id = trace_id.map(TraceIdentifier::as_str), cause = %error, "application error");
}

/// A transport failure while no request was in flight, a routine client disconnect.
pub(crate) fn connection_reset(connection_id: u64) {
    debug!(connection_id, "connection reset by peer");
}

pub(crate) fn request_body_drain_timed_out(trace_id: &TraceIdentifier) {
    info!(trace_id = trace_id.as_str(), "draining the request body timed out");
}

pub(crate) fn response_head_written(trace_id: &TraceIdentifier, status: StatusCode) {
    trace!(trace_id = trace_id.as_str(), status = status.as_u16(), "response head written");
}
