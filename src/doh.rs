use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hickory_proto::rr::RecordType;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, StatusCode, Uri};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::dns::{decode_response, encode_query};
use crate::error::{ConnectionError, QueryError};
use crate::transport::{Measurement, MeasurementOptions, QuerySample};

/// Maximum time for a complete exchange (headers and body).
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Pause after a non-success status before the next query may start.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_millis(100);

pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

type BodyFuture = Pin<Box<dyn Future<Output = Result<Bytes, QueryError>> + Send>>;

/// Response headers of one exchange, with the body still pending.
///
/// Dropping it abandons the body.
pub struct DohResponse {
	pub status: StatusCode,
	body: BodyFuture,
}

impl DohResponse {
	pub fn new<F>(status: StatusCode, body: F) -> Self
	where
		F: Future<Output = Result<Bytes, QueryError>> + Send + 'static,
	{
		Self { status, body: Box::pin(body) }
	}

	/// Wait for the full response body.
	pub async fn body(self) -> Result<Bytes, QueryError> {
		self.body.await
	}
}

/// An open, multiplexed connection to a DoH endpoint.
#[async_trait]
pub trait DohConnection: Send {
	/// Send a request; resolves once the response headers arrive.
	async fn send(&mut self, request: Request<Bytes>) -> Result<DohResponse, QueryError>;

	async fn close(&mut self);
}

/// Opens connections to DoH endpoints.
#[async_trait]
pub trait DohConnector: Send + Sync {
	async fn connect(&self, endpoint: &Url) -> Result<Box<dyn DohConnection>, ConnectionError>;
}

/// Request target for an endpoint: scheme, authority, path and query string.
pub fn request_uri(endpoint: &Url) -> Result<Uri, ConnectionError> {
	let host = endpoint.host_str()
		.ok_or_else(|| ConnectionError::MissingHost(endpoint.to_string()))?;
	let authority = match endpoint.port() {
		Some(port) => format!("{}:{}", host, port),
		None => host.to_string(),
	};
	let path_and_query = match endpoint.query() {
		Some(query) => format!("{}?{}", endpoint.path(), query),
		None => endpoint.path().to_string(),
	};
	Uri::builder()
		.scheme(endpoint.scheme())
		.authority(authority)
		.path_and_query(path_and_query)
		.build()
		.map_err(|e| ConnectionError::Handshake(e.into()))
}

/// One long-lived connection to a DoH endpoint, queried one request at a time.
pub struct DohSession {
	endpoint: Url,
	uri: Uri,
	connection: Box<dyn DohConnection>,
	timeout: Duration,
	cooldown: Duration,
}

impl DohSession {
	/// Open the session's connection. Failure is fatal for this resolver.
	pub async fn open(
		connector: &dyn DohConnector,
		endpoint: &Url,
	) -> Result<Self, ConnectionError> {
		let uri = request_uri(endpoint)?;
		let connection = connector.connect(endpoint).await?;
		debug!(%endpoint, "DoH session open");
		Ok(Self {
			endpoint: endpoint.clone(),
			uri,
			connection,
			timeout: REQUEST_TIMEOUT,
			cooldown: RATE_LIMIT_COOLDOWN,
		})
	}

	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	fn build_request(&self, message: Vec<u8>) -> Result<Request<Bytes>, QueryError> {
		Request::builder()
			.method(Method::POST)
			.uri(self.uri.clone())
			.header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
			.header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
			.header(CONTENT_LENGTH, message.len())
			.body(Bytes::from(message))
			.map_err(QueryError::transport)
	}

	/// Send one request and collect a 200 response body, marking the
	/// instant the body completed.
	async fn exchange(&mut self, request: Request<Bytes>) -> Result<(Bytes, Instant), QueryError> {
		let response = self.connection.send(request).await?;
		if response.status != StatusCode::OK {
			return Err(QueryError::BadStatus(response.status));
		}
		let body = response.body().await?;
		Ok((body, Instant::now()))
	}

	/// Run one exchange under the request timeout, applying the cooldown
	/// after a non-success status.
	async fn timed_exchange(
		&mut self,
		request: Request<Bytes>,
		start: Instant,
	) -> Result<(Bytes, Instant), QueryError> {
		let timeout = self.timeout;
		let outcome = match tokio::time::timeout(timeout, self.exchange(request)).await {
			Ok(outcome) => outcome,
			Err(_) => return Err(QueryError::Timeout(timeout)),
		};
		match outcome {
			// The deadline is exclusive
			Ok((_, end)) if end.duration_since(start) >= timeout => {
				Err(QueryError::Timeout(timeout))
			}
			Err(QueryError::BadStatus(status)) => {
				tokio::time::sleep(self.cooldown).await;
				Err(QueryError::BadStatus(status))
			}
			other => other,
		}
	}

	/// Resolve one name, returning the time from request to body completion.
	pub async fn query(
		&mut self,
		name: &str,
		record_type: RecordType,
	) -> Result<Duration, QueryError> {
		let message = encode_query(name, record_type)?;
		let request = self.build_request(message)?;

		let start = Instant::now();
		let (body, end) = self.timed_exchange(request, start).await?;

		decode_response(&body)?.check()?;
		Ok(end.duration_since(start))
	}

	/// Send an already-encoded DNS message and return the raw reply.
	pub async fn forward(&mut self, message: Vec<u8>) -> Result<Bytes, QueryError> {
		let request = self.build_request(message)?;
		let (body, _) = self.timed_exchange(request, Instant::now()).await?;
		Ok(body)
	}

	pub async fn close(mut self) {
		self.connection.close().await;
		debug!(endpoint = %self.endpoint, "DoH session closed");
	}
}

/// Run the full query loop for one DoH resolver over an open session,
/// then close the session.
pub async fn measure_doh(mut session: DohSession, options: &MeasurementOptions) -> Measurement {
	let mut measurement = Measurement::default();
	for attempt in 0..options.query_count() {
		let name = options.name_for(attempt);
		match session.query(name, options.record_type).await {
			Ok(elapsed) => {
				measurement.record(QuerySample::success(elapsed.as_secs_f64() * 1000.0));
			}
			Err(e) => {
				warn!(endpoint = %session.endpoint(), query = name, "query failed: {}", e);
				measurement.record(QuerySample::failure());
			}
		}
	}
	session.close().await;
	measurement
}
