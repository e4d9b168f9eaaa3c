use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dns::{build_query, decode_response, MAX_UDP_MESSAGE};
use crate::doh::REQUEST_TIMEOUT;
use crate::error::QueryError;
use crate::transport::{Measurement, MeasurementOptions, QuerySample};

/// Resolves one name against exactly one DNS server.
#[async_trait]
pub trait DnsClient: Send + Sync {
	async fn resolve(
		&self,
		server: SocketAddr,
		name: &str,
		record_type: RecordType,
	) -> Result<(), QueryError>;
}

/// DNS-over-UDP client with a dedicated socket per query
#[derive(Debug, Clone)]
pub struct UdpDnsClient {
	timeout: Duration,
	max_reads: usize,
}

impl Default for UdpDnsClient {
	fn default() -> Self {
		Self { timeout: REQUEST_TIMEOUT, max_reads: 3 }
	}
}

impl UdpDnsClient {
	pub fn with_timeout(timeout: Duration) -> Self {
		Self { timeout, ..Self::default() }
	}
}

#[async_trait]
impl DnsClient for UdpDnsClient {
	/// Send a single query and wait for the matching reply.
	///
	/// A fresh socket per query avoids picking up late replies to an
	/// earlier, timed-out query.
	async fn resolve(
		&self,
		server: SocketAddr,
		name: &str,
		record_type: RecordType,
	) -> Result<(), QueryError> {
		let txid: u16 = rand::random();
		let query = build_query(name, record_type, txid)?;

		let bind_addr = if server.is_ipv4() {
			"0.0.0.0:0"
		} else {
			"[::]:0"
		};
		let socket = UdpSocket::bind(bind_addr).await
			.map_err(QueryError::transport)?;

		let start = Instant::now();
		socket.send_to(&query, server).await
			.map_err(QueryError::transport)?;

		let mut buf = vec![0u8; MAX_UDP_MESSAGE];
		for _ in 0..self.max_reads {
			let elapsed = start.elapsed();
			if elapsed >= self.timeout {
				break;
			}
			let remaining = self.timeout - elapsed;

			let (len, src) = match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
				Ok(Ok(received)) => received,
				Ok(Err(e)) => return Err(QueryError::transport(e)),
				Err(_) => break,
			};
			let response = match decode_response(&buf[..len]) {
				Ok(r) if r.id == txid => r,
				Ok(r) => {
					debug!(%src, expected = txid, got = r.id, "txid mismatch, reading again");
					continue;
				}
				Err(e) => {
					debug!(%src, "ignoring unparseable datagram: {}", e);
					continue;
				}
			};
			debug!(%src, rcode = %response.response_code, answers = response.answer_types.len(), "response received");
			return response.check_answer(record_type);
		}

		Err(QueryError::Timeout(self.timeout))
	}
}

/// Run the full query loop for one classic resolver.
///
/// Every attempt is recorded; failures contribute no timing and never
/// stop the loop.
pub async fn measure_classic(
	client: &dyn DnsClient,
	server: SocketAddr,
	options: &MeasurementOptions,
) -> Measurement {
	let mut measurement = Measurement::default();
	for attempt in 0..options.query_count() {
		let name = options.name_for(attempt);
		let start = Instant::now();
		let outcome = client.resolve(server, name, options.record_type).await;
		let end = Instant::now();
		match outcome {
			Ok(()) => {
				let elapsed = end.duration_since(start);
				measurement.record(QuerySample::success(elapsed.as_secs_f64() * 1000.0));
			}
			Err(e) => {
				warn!(%server, query = name, "query failed: {}", e);
				measurement.record(QuerySample::failure());
			}
		}
	}
	measurement
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	use hickory_proto::op::{Message, ResponseCode};

	use crate::dns::tests::{bulky_response_to, nodata_response_to, response_to};

	/// Replies with scripted delays; `None` means the lookup fails.
	struct ScriptedClient {
		delays: Mutex<Vec<Option<u64>>>,
		names: Mutex<Vec<String>>,
	}

	impl ScriptedClient {
		fn new(delays: Vec<Option<u64>>) -> Self {
			Self { delays: Mutex::new(delays), names: Mutex::new(Vec::new()) }
		}
	}

	#[async_trait]
	impl DnsClient for ScriptedClient {
		async fn resolve(
			&self,
			_server: SocketAddr,
			name: &str,
			_record_type: RecordType,
		) -> Result<(), QueryError> {
			self.names.lock().unwrap().push(name.to_string());
			let next = self.delays.lock().unwrap().remove(0);
			match next {
				Some(ms) => {
					tokio::time::sleep(Duration::from_millis(ms)).await;
					Ok(())
				}
				None => Err(QueryError::transport("lookup failed")),
			}
		}
	}

	fn options(count: u32, names: &[&str]) -> MeasurementOptions {
		let names = names.iter().map(|s| s.to_string()).collect();
		MeasurementOptions::new(count, names, RecordType::A).unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn test_measure_records_durations() {
		let client = ScriptedClient::new(vec![Some(10), Some(20), Some(30)]);
		let server: SocketAddr = "1.1.1.1:53".parse().unwrap();
		let m = measure_classic(&client, server, &options(3, &["example.com"])).await;
		assert_eq!(m.pass_count(), 3);
		assert_eq!(m.fail_count(), 0);
		assert_eq!(m.durations_ms(), vec![10.0, 20.0, 30.0]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failures_do_not_abort_loop() {
		let client = ScriptedClient::new(vec![None, Some(5), None, Some(7)]);
		let server: SocketAddr = "1.1.1.1:53".parse().unwrap();
		let opts = options(4, &["a.example", "b.example", "c.example"]);
		let m = measure_classic(&client, server, &opts).await;
		assert_eq!(m.pass_count(), 2);
		assert_eq!(m.fail_count(), 2);
		assert!(!m.samples[0].succeeded);
		assert!(m.samples[1].succeeded);
		let names = client.names.lock().unwrap().clone();
		assert_eq!(names, vec!["a.example", "b.example", "c.example", "a.example"]);
	}

	/// Spawn a loopback UDP responder that answers every query with `rcode`.
	async fn spawn_responder(rcode: ResponseCode, wrong_id_first: bool) -> SocketAddr {
		spawn_responder_with(move |query| response_to(query, rcode), wrong_id_first).await
	}

	async fn spawn_responder_with<F>(answer: F, wrong_id_first: bool) -> SocketAddr
	where
		F: Fn(&[u8]) -> Vec<u8> + Send + 'static,
	{
		let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let addr = socket.local_addr().unwrap();
		tokio::spawn(async move {
			let mut buf = vec![0u8; 512];
			loop {
				let Ok((len, peer)) = socket.recv_from(&mut buf).await else { break };
				let reply = answer(&buf[..len]);
				if wrong_id_first {
					let mut stale = Message::from_vec(&reply).unwrap();
					stale.set_id(stale.id().wrapping_add(1));
					let _ = socket.send_to(&stale.to_vec().unwrap(), peer).await;
				}
				let _ = socket.send_to(&reply, peer).await;
			}
		});
		addr
	}

	#[tokio::test]
	async fn test_udp_client_noerror() {
		let server = spawn_responder(ResponseCode::NoError, false).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		assert!(client.resolve(server, "example.com", RecordType::A).await.is_ok());
	}

	#[tokio::test]
	async fn test_udp_client_skips_mismatched_txid() {
		let server = spawn_responder(ResponseCode::NoError, true).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		assert!(client.resolve(server, "example.com", RecordType::A).await.is_ok());
	}

	#[tokio::test]
	async fn test_udp_client_nxdomain_fails() {
		let server = spawn_responder(ResponseCode::NXDomain, false).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		let err = client.resolve(server, "missing.example", RecordType::A).await.unwrap_err();
		assert!(matches!(err, QueryError::BadMessage { .. }));
	}

	#[tokio::test]
	async fn test_udp_client_times_out() {
		// Bound but never answers
		let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server = silent.local_addr().unwrap();
		let client = UdpDnsClient::with_timeout(Duration::from_millis(100));
		let err = client.resolve(server, "example.com", RecordType::A).await.unwrap_err();
		assert!(matches!(err, QueryError::Timeout(_)));
	}

	#[tokio::test]
	async fn test_udp_client_noerror_without_answer_fails() {
		let server = spawn_responder_with(nodata_response_to, false).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		let err = client.resolve(server, "example.com", RecordType::AAAA).await.unwrap_err();
		assert!(matches!(err, QueryError::NoData(RecordType::AAAA)));
	}

	#[tokio::test]
	async fn test_udp_client_answer_of_other_type_fails() {
		// An A answer does not satisfy an AAAA question
		let server = spawn_responder_with(|query| {
			let name = Message::from_vec(query).unwrap().queries()[0].name().to_ascii();
			let a_query = build_query(&name, RecordType::A, 0).unwrap();
			let a_reply = Message::from_vec(&response_to(&a_query, ResponseCode::NoError)).unwrap();
			let mut reply = Message::from_vec(&nodata_response_to(query)).unwrap();
			reply.add_answers(a_reply.answers().iter().cloned());
			reply.to_vec().unwrap()
		}, false).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		let err = client.resolve(server, "example.com", RecordType::AAAA).await.unwrap_err();
		assert!(matches!(err, QueryError::NoData(RecordType::AAAA)));
	}

	#[tokio::test]
	async fn test_udp_client_truncated_fails() {
		let server = spawn_responder_with(|query| {
			let bulky = bulky_response_to(query, 300);
			crate::dns::fit_udp(&bulky, 512).unwrap()
		}, false).await;
		let client = UdpDnsClient::with_timeout(Duration::from_secs(2));
		let err = client.resolve(server, "example.com", RecordType::A).await.unwrap_err();
		assert!(matches!(err, QueryError::Truncated));
	}
}
