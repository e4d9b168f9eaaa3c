use hickory_proto::rr::RecordType;
use thiserror::Error;

/// A resolver to measure, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverTarget {
	/// Classic DNS over UDP, e.g. "1.1.1.1" or "[2606:4700::1111]:53"
	Classic { name: Option<String>, server: String },
	/// DNS over HTTPS, e.g. "https://cloudflare-dns.com/dns-query"
	Doh { name: Option<String>, endpoint: String },
}

impl ResolverTarget {
	pub fn classic(server: impl Into<String>) -> Self {
		ResolverTarget::Classic { name: None, server: server.into() }
	}

	pub fn doh(endpoint: impl Into<String>) -> Self {
		ResolverTarget::Doh { name: None, endpoint: endpoint.into() }
	}

	/// Attach a display name to the target.
	pub fn named(self, label: impl Into<String>) -> Self {
		let label = Some(label.into());
		match self {
			ResolverTarget::Classic { server, .. } => {
				ResolverTarget::Classic { name: label, server }
			}
			ResolverTarget::Doh { endpoint, .. } => {
				ResolverTarget::Doh { name: label, endpoint }
			}
		}
	}

	pub fn name(&self) -> Option<&str> {
		match self {
			ResolverTarget::Classic { name, .. } | ResolverTarget::Doh { name, .. } => {
				name.as_deref()
			}
		}
	}

	/// The server address or endpoint URI being measured.
	pub fn service(&self) -> &str {
		match self {
			ResolverTarget::Classic { server, .. } => server,
			ResolverTarget::Doh { endpoint, .. } => endpoint,
		}
	}

	pub fn protocol(&self) -> Protocol {
		match self {
			ResolverTarget::Classic { .. } => Protocol::Dns,
			ResolverTarget::Doh { .. } => Protocol::Doh,
		}
	}
}

/// Wire protocol used to reach a resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Dns,
	Doh,
}

impl Protocol {
	pub fn as_str(&self) -> &'static str {
		match self {
			Protocol::Dns => "dns",
			Protocol::Doh => "doh",
		}
	}

	/// Human-readable protocol label for reports.
	pub fn display_name(&self) -> &'static str {
		match self {
			Protocol::Dns => "DNS",
			Protocol::Doh => "DoH",
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
	#[error("query count must be greater than zero")]
	ZeroQueries,
	#[error("at least one query name is required")]
	NoNames,
}

/// Measurement configuration shared read-only by every target in a run
#[derive(Debug, Clone)]
pub struct MeasurementOptions {
	query_count: u32,
	query_names: Vec<String>,
	pub record_type: RecordType,
	pub percentiles: Vec<f64>,
	pub use_proxy: bool,
}

impl MeasurementOptions {
	pub fn new(
		query_count: u32,
		query_names: Vec<String>,
		record_type: RecordType,
	) -> Result<Self, OptionsError> {
		if query_count == 0 {
			return Err(OptionsError::ZeroQueries);
		}
		if query_names.is_empty() {
			return Err(OptionsError::NoNames);
		}
		Ok(Self {
			query_count,
			query_names,
			record_type,
			percentiles: vec![5.0, 50.0, 95.0],
			use_proxy: false,
		})
	}

	pub fn with_percentiles(mut self, percentiles: Vec<f64>) -> Self {
		self.percentiles = percentiles;
		self
	}

	pub fn with_proxy(mut self, use_proxy: bool) -> Self {
		self.use_proxy = use_proxy;
		self
	}

	pub fn query_count(&self) -> u32 {
		self.query_count
	}

	pub fn query_names(&self) -> &[String] {
		&self.query_names
	}

	/// Name to query on the given attempt, cycling round-robin.
	pub fn name_for(&self, attempt: u32) -> &str {
		let idx = attempt as usize % self.query_names.len();
		&self.query_names[idx]
	}
}

/// One measured attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySample {
	/// Only meaningful when `succeeded` is true
	pub duration_ms: f64,
	pub succeeded: bool,
}

impl QuerySample {
	pub fn success(duration_ms: f64) -> Self {
		Self { duration_ms, succeeded: true }
	}

	pub fn failure() -> Self {
		Self { duration_ms: 0.0, succeeded: false }
	}
}

/// All attempts made against one resolver, indexed by attempt number
#[derive(Debug, Clone, Default)]
pub struct Measurement {
	pub samples: Vec<QuerySample>,
}

impl Measurement {
	pub fn record(&mut self, sample: QuerySample) {
		self.samples.push(sample);
	}

	pub fn pass_count(&self) -> usize {
		self.samples.iter().filter(|s| s.succeeded).count()
	}

	pub fn fail_count(&self) -> usize {
		self.samples.len() - self.pass_count()
	}

	/// Durations of the successful attempts, in attempt order.
	pub fn durations_ms(&self) -> Vec<f64> {
		self.samples.iter()
			.filter(|s| s.succeeded)
			.map(|s| s.duration_ms)
			.collect()
	}
}

/// Latency at one requested percentile rank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileLatency {
	pub rank: f64,
	pub latency_ms: f64,
}

/// Summary emitted once per measured resolver
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverResult {
	pub name: String,
	pub service: String,
	pub protocol: Protocol,
	pub pass_count: usize,
	pub fail_count: usize,
	/// Requested ranks that could be computed, in request order
	pub percentile_latencies: Vec<PercentileLatency>,
}

impl ResolverResult {
	pub fn percentile(&self, rank: f64) -> Option<f64> {
		self.percentile_latencies.iter()
			.find(|p| p.rank == rank)
			.map(|p| p.latency_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn options(names: &[&str]) -> MeasurementOptions {
		let names = names.iter().map(|s| s.to_string()).collect();
		MeasurementOptions::new(5, names, RecordType::A).unwrap()
	}

	#[test]
	fn test_names_cycle_round_robin() {
		let opts = options(&["a.example", "b.example"]);
		assert_eq!(opts.name_for(0), "a.example");
		assert_eq!(opts.name_for(1), "b.example");
		assert_eq!(opts.name_for(2), "a.example");
		assert_eq!(opts.name_for(5), "b.example");
	}

	#[test]
	fn test_options_reject_zero_queries() {
		let err = MeasurementOptions::new(0, vec!["example.com".into()], RecordType::A);
		assert_eq!(err.unwrap_err(), OptionsError::ZeroQueries);
	}

	#[test]
	fn test_options_reject_empty_names() {
		let err = MeasurementOptions::new(3, Vec::new(), RecordType::A);
		assert_eq!(err.unwrap_err(), OptionsError::NoNames);
	}

	#[test]
	fn test_measurement_counts() {
		let mut m = Measurement::default();
		m.record(QuerySample::success(12.0));
		m.record(QuerySample::failure());
		m.record(QuerySample::success(8.0));
		assert_eq!(m.pass_count(), 2);
		assert_eq!(m.fail_count(), 1);
		assert_eq!(m.durations_ms(), vec![12.0, 8.0]);
	}

	#[test]
	fn test_target_accessors() {
		let t = ResolverTarget::doh("https://dns.example/dns-query").named("Example");
		assert_eq!(t.name(), Some("Example"));
		assert_eq!(t.service(), "https://dns.example/dns-query");
		assert_eq!(t.protocol(), Protocol::Doh);
		assert_eq!(ResolverTarget::classic("9.9.9.9").protocol().as_str(), "dns");
	}
}
