use std::time::Duration;

use hickory_proto::op::{MessageType, ResponseCode};
use http::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A buffer that is not a well-formed DNS message, or a query that cannot be encoded
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("invalid domain name '{name}': {reason}")]
	InvalidName { name: String, reason: String },
	#[error("failed to serialize DNS query: {0}")]
	Encode(String),
	#[error("failed to parse DNS message: {0}")]
	Decode(String),
}

/// Why a single query failed. Always recovered into a failure count.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error(transparent)]
	Codec(#[from] CodecError),
	#[error("request timeout after {} ms", .0.as_millis())]
	Timeout(Duration),
	#[error("HTTP response status code {0}")]
	BadStatus(StatusCode),
	#[error("bad DNS message: {response_code} ({message_type:?})")]
	BadMessage {
		response_code: ResponseCode,
		message_type: MessageType,
	},
	#[error("no {0} records in answer")]
	NoData(hickory_proto::rr::RecordType),
	#[error("response truncated")]
	Truncated,
	#[error("transport error: {0}")]
	Transport(BoxError),
}

impl QueryError {
	pub fn transport(err: impl Into<BoxError>) -> Self {
		QueryError::Transport(err.into())
	}
}

/// A DoH session (or the proxy in front of one) that could not be opened
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("endpoint {0} has no host")]
	MissingHost(String),
	#[error("invalid TLS server name '{0}'")]
	InvalidServerName(String),
	#[error("timed out connecting to {0}")]
	Timeout(String),
	#[error("{endpoint} did not negotiate HTTP/2")]
	NoHttp2 { endpoint: String },
	#[error("TLS configuration error: {0}")]
	Tls(#[from] rustls::Error),
	#[error("connect failed: {0}")]
	Io(#[from] std::io::Error),
	#[error("HTTP/2 handshake failed: {0}")]
	Handshake(BoxError),
}

#[derive(Debug, Error)]
pub enum ProxyError {
	#[error("failed to bind proxy listener on {addr}: {source}")]
	Bind {
		addr: std::net::SocketAddr,
		source: std::io::Error,
	},
	#[error("proxy upstream unavailable: {0}")]
	Upstream(#[from] ConnectionError),
}

/// Errors that end a measurement run
#[derive(Debug, Error)]
pub enum MeasureError {
	#[error("invalid resolver target '{service}': {reason}")]
	InvalidTarget { service: String, reason: String },
}
