use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::{error, info};
use url::Url;

use crate::classic::{measure_classic, DnsClient};
use crate::doh::{measure_doh, DohConnector, DohSession};
use crate::error::MeasureError;
use crate::proxy::{measure_via_proxy, DnsProxy};
use crate::resolver::parse_socket_addr;
use crate::stats::compute_percentiles;
use crate::transport::{Measurement, MeasurementOptions, ResolverResult, ResolverTarget};

/// The collaborators a run measures through
#[derive(Clone)]
pub struct Backends {
	pub dns: Arc<dyn DnsClient>,
	pub doh: Arc<dyn DohConnector>,
	pub proxy: Arc<dyn DnsProxy>,
}

/// A target after its service string has been interpreted
enum Endpoint {
	Classic(SocketAddr),
	Doh(Url),
}

fn resolve_endpoint(target: &ResolverTarget) -> Result<Endpoint, MeasureError> {
	let invalid = |reason: String| MeasureError::InvalidTarget {
		service: target.service().to_string(),
		reason,
	};
	match target {
		ResolverTarget::Classic { server, .. } => {
			parse_socket_addr(server).map(Endpoint::Classic).map_err(|e| invalid(e.to_string()))
		}
		ResolverTarget::Doh { endpoint, .. } => {
			let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
			if url.scheme() != "https" {
				return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
			}
			if url.host_str().is_none() {
				return Err(invalid("missing host".to_string()));
			}
			Ok(Endpoint::Doh(url))
		}
	}
}

/// Display name: explicit name, else the server address, else the DoH host.
fn display_name(target: &ResolverTarget, endpoint: &Endpoint) -> String {
	if let Some(name) = target.name() {
		return name.to_string();
	}
	match endpoint {
		Endpoint::Classic(_) => target.service().to_string(),
		Endpoint::Doh(url) => url.host_str().unwrap_or(target.service()).to_string(),
	}
}

/// Measure one target. `Ok(None)` means the resolver could not be reached
/// at connection time and is skipped.
async fn measure_target(
	backends: &Backends,
	target: &ResolverTarget,
	options: &MeasurementOptions,
) -> Result<Option<ResolverResult>, MeasureError> {
	let endpoint = resolve_endpoint(target)?;

	let measurement: Measurement = match &endpoint {
		Endpoint::Classic(server) => {
			measure_classic(backends.dns.as_ref(), *server, options).await
		}
		Endpoint::Doh(url) if options.use_proxy => {
			match measure_via_proxy(backends.proxy.as_ref(), backends.dns.as_ref(), url, options).await {
				Ok(m) => m,
				Err(e) => {
					error!(endpoint = %url, "skipping resolver: {}", e);
					return Ok(None);
				}
			}
		}
		Endpoint::Doh(url) => {
			match DohSession::open(backends.doh.as_ref(), url).await {
				Ok(session) => measure_doh(session, options).await,
				Err(e) => {
					error!(endpoint = %url, "skipping resolver: {}", e);
					return Ok(None);
				}
			}
		}
	};

	let result = ResolverResult {
		name: display_name(target, &endpoint),
		service: target.service().to_string(),
		protocol: target.protocol(),
		pass_count: measurement.pass_count(),
		fail_count: measurement.fail_count(),
		percentile_latencies: compute_percentiles(&measurement.durations_ms(), &options.percentiles),
	};
	info!(
		resolver = %result.name,
		protocol = result.protocol.as_str(),
		pass = result.pass_count,
		fail = result.fail_count,
		"resolver measured"
	);
	Ok(Some(result))
}

struct RunState {
	backends: Backends,
	targets: std::vec::IntoIter<ResolverTarget>,
	options: MeasurementOptions,
	halted: bool,
}

/// Measure every target in order, one at a time.
///
/// The returned stream is lazy: a target is measured only when the caller
/// polls for the next result, so each result is available before the next
/// resolver starts. Unreachable resolvers are skipped; an invalid target
/// yields an error and ends the stream.
pub fn run_benchmark(
	backends: Backends,
	targets: Vec<ResolverTarget>,
	options: MeasurementOptions,
) -> impl Stream<Item = Result<ResolverResult, MeasureError>> {
	let state = RunState {
		backends,
		targets: targets.into_iter(),
		options,
		halted: false,
	};
	stream::unfold(state, |mut state| async move {
		if state.halted {
			return None;
		}
		while let Some(target) = state.targets.next() {
			match measure_target(&state.backends, &target, &state.options).await {
				Ok(Some(result)) => return Some((Ok(result), state)),
				Ok(None) => continue,
				Err(e) => {
					state.halted = true;
					return Some((Err(e), state));
				}
			}
		}
		None
	})
}
