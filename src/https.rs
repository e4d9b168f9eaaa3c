use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, info_span, Instrument};
use url::{Host, Url};

use crate::doh::{DohConnection, DohConnector, DohResponse, REQUEST_TIMEOUT};
use crate::error::{ConnectionError, QueryError};

const ALPN_H2: &[u8] = b"h2";

/// How long `close` waits for the connection driver to wind down.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Dials DoH endpoints over HTTP/2 with TLS.
#[derive(Clone)]
pub struct HttpsConnector {
	tls: TlsConnector,
	connect_timeout: Duration,
}

impl HttpsConnector {
	pub fn new() -> Result<Self, ConnectionError> {
		let roots = rustls::RootCertStore {
			roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
		};
		let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(
			rustls::crypto::ring::default_provider(),
		))
		.with_safe_default_protocol_versions()?
		.with_root_certificates(roots)
		.with_no_client_auth();
		config.alpn_protocols = vec![ALPN_H2.to_vec()];

		Ok(Self {
			tls: TlsConnector::from(Arc::new(config)),
			connect_timeout: REQUEST_TIMEOUT,
		})
	}

	async fn dial(&self, endpoint: &Url) -> Result<Box<dyn DohConnection>, ConnectionError> {
		let host = match endpoint.host() {
			Some(Host::Domain(domain)) => domain.to_string(),
			Some(Host::Ipv4(ip)) => ip.to_string(),
			Some(Host::Ipv6(ip)) => ip.to_string(),
			None => return Err(ConnectionError::MissingHost(endpoint.to_string())),
		};
		let port = endpoint.port_or_known_default().unwrap_or(443);

		debug!(%host, port, "dialing DoH endpoint");
		let tcp = TcpStream::connect((host.as_str(), port)).await?;
		tcp.set_nodelay(true)?;

		let server_name = ServerName::try_from(host.clone())
			.map_err(|_| ConnectionError::InvalidServerName(host.clone()))?;
		let tls = self.tls.connect(server_name, tcp).await?;
		if tls.get_ref().1.alpn_protocol() != Some(ALPN_H2) {
			return Err(ConnectionError::NoHttp2 { endpoint: endpoint.to_string() });
		}

		let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
			.await
			.map_err(|e| ConnectionError::Handshake(e.into()))?;
		let driver = tokio::spawn(
			async move {
				if let Err(e) = connection.await {
					debug!("HTTP/2 connection ended with error: {}", e);
				}
			}
			.instrument(info_span!("h2-driver", %host)),
		);

		Ok(Box::new(H2Connection { sender: Some(sender), driver }))
	}
}

#[async_trait]
impl DohConnector for HttpsConnector {
	async fn connect(&self, endpoint: &Url) -> Result<Box<dyn DohConnection>, ConnectionError> {
		match tokio::time::timeout(self.connect_timeout, self.dial(endpoint)).await {
			Ok(result) => result,
			Err(_) => Err(ConnectionError::Timeout(endpoint.to_string())),
		}
	}
}

struct H2Connection {
	sender: Option<http2::SendRequest<Full<Bytes>>>,
	driver: JoinHandle<()>,
}

#[async_trait]
impl DohConnection for H2Connection {
	async fn send(&mut self, request: Request<Bytes>) -> Result<DohResponse, QueryError> {
		let sender = self.sender.as_mut()
			.ok_or_else(|| QueryError::transport("connection closed"))?;
		sender.ready().await.map_err(QueryError::transport)?;

		let response = sender.send_request(request.map(Full::new)).await
			.map_err(QueryError::transport)?;
		let status = response.status();
		Ok(DohResponse::new(status, async move {
			let collected = response.into_body().collect().await
				.map_err(QueryError::transport)?;
			Ok(collected.to_bytes())
		}))
	}

	async fn close(&mut self) {
		// Dropping the last sender lets the driver finish once streams drain
		self.sender.take();
		if tokio::time::timeout(CLOSE_GRACE, &mut self.driver).await.is_err() {
			self.driver.abort();
		}
	}
}

impl Drop for H2Connection {
	fn drop(&mut self) {
		self.driver.abort();
	}
}
