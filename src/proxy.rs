use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::classic::{measure_classic, DnsClient};
use crate::dns::{fit_udp, servfail_for, MAX_UDP_MESSAGE};
use crate::doh::{DohConnector, DohSession};
use crate::error::ProxyError;
use crate::transport::{Measurement, MeasurementOptions};

/// Loopback listener shared by every proxy-mode resolver, one at a time.
pub const PROXY_LISTEN_ADDR: SocketAddr =
	SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 55553));

#[derive(Debug, Clone)]
pub struct ProxyConfig {
	pub listen: SocketAddr,
	pub upstream: Url,
}

/// A running proxy instance.
///
/// `stop` shuts the proxy down and waits for it. Dropping a handle without
/// calling `stop` must still shut the proxy down, without waiting.
#[async_trait]
pub trait ProxyHandle: Send {
	async fn stop(self: Box<Self>);
}

/// Starts DNS-over-UDP to DoH proxies.
#[async_trait]
pub trait DnsProxy: Send + Sync {
	async fn start(&self, config: &ProxyConfig) -> Result<Box<dyn ProxyHandle>, ProxyError>;
}

/// Start a proxy in front of `upstream`, run the classic query loop
/// against it, then stop it.
///
/// The query loop records failures instead of returning early, so the
/// proxy is stopped on every path once it has started.
pub async fn measure_via_proxy(
	proxy: &dyn DnsProxy,
	client: &dyn DnsClient,
	upstream: &Url,
	options: &MeasurementOptions,
) -> Result<Measurement, ProxyError> {
	let config = ProxyConfig {
		listen: PROXY_LISTEN_ADDR,
		upstream: upstream.clone(),
	};
	let handle = proxy.start(&config).await?;
	debug!(listen = %config.listen, %upstream, "proxy started");

	let measurement = measure_classic(client, config.listen, options).await;

	handle.stop().await;
	debug!(listen = %config.listen, "proxy stopped");
	Ok(measurement)
}

/// In-process proxy: each UDP datagram is forwarded as one DoH request
/// over a single session to the upstream.
pub struct LocalDohProxy {
	connector: Arc<dyn DohConnector>,
}

impl LocalDohProxy {
	pub fn new(connector: Arc<dyn DohConnector>) -> Self {
		Self { connector }
	}
}

#[async_trait]
impl DnsProxy for LocalDohProxy {
	async fn start(&self, config: &ProxyConfig) -> Result<Box<dyn ProxyHandle>, ProxyError> {
		let socket = UdpSocket::bind(config.listen).await
			.map_err(|source| ProxyError::Bind { addr: config.listen, source })?;
		let session = DohSession::open(self.connector.as_ref(), &config.upstream).await?;
		info!(listen = %config.listen, upstream = %config.upstream, "DNS proxy listening");

		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let task = tokio::spawn(serve(socket, session, shutdown_rx));
		Ok(Box::new(LocalProxyHandle { shutdown: shutdown_tx, task }))
	}
}

struct LocalProxyHandle {
	shutdown: oneshot::Sender<()>,
	task: JoinHandle<()>,
}

#[async_trait]
impl ProxyHandle for LocalProxyHandle {
	async fn stop(self: Box<Self>) {
		let LocalProxyHandle { shutdown, task } = *self;
		let _ = shutdown.send(());
		if let Err(e) = task.await {
			warn!("proxy task failed: {}", e);
		}
	}
}

async fn serve(socket: UdpSocket, mut session: DohSession, mut shutdown: oneshot::Receiver<()>) {
	let mut buf = vec![0u8; MAX_UDP_MESSAGE];
	loop {
		let (len, peer) = tokio::select! {
			_ = &mut shutdown => break,
			received = socket.recv_from(&mut buf) => match received {
				Ok(received) => received,
				Err(e) => {
					warn!("proxy receive failed: {}", e);
					continue;
				}
			},
		};
		if len < 2 {
			continue;
		}
		let query = &buf[..len];

		let reply = match relay(&mut session, query).await {
			Some(reply) => reply,
			// Fail the client now rather than leaving it to time out
			None => match servfail_for(query) {
				Ok(reply) => reply,
				Err(e) => {
					debug!(%peer, "dropping unparseable query: {}", e);
					continue;
				}
			},
		};
		if let Err(e) = socket.send_to(&reply, peer).await {
			warn!(%peer, "proxy reply failed: {}", e);
		}
	}
	session.close().await;
}

/// Forward one query upstream and shape the answer for UDP.
///
/// DoH queries carry id 0; the client's id is restored on the way back.
async fn relay(session: &mut DohSession, query: &[u8]) -> Option<Vec<u8>> {
	let mut message = query.to_vec();
	message[0] = 0;
	message[1] = 0;

	let body = match session.forward(message).await {
		Ok(body) if body.len() >= 2 => body,
		Ok(_) => {
			warn!(upstream = %session.endpoint(), "upstream returned a truncated message");
			return None;
		}
		Err(e) => {
			warn!(upstream = %session.endpoint(), "upstream exchange failed: {}", e);
			return None;
		}
	};
	let mut reply = match fit_udp(&body, MAX_UDP_MESSAGE) {
		Ok(reply) => reply,
		Err(e) => {
			warn!(upstream = %session.endpoint(), "oversized upstream reply: {}", e);
			return None;
		}
	};
	reply[0] = query[0];
	reply[1] = query[1];
	Some(reply)
}
