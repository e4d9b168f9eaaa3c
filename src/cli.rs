use clap::Parser;

/// DNS and DNS-over-HTTPS resolver latency benchmark
#[derive(Parser, Debug)]
#[command(name = "doh-benchmark", version)]
#[command(about = "Compare resolver latency over DNS (UDP) and DNS-over-HTTPS")]
#[command(after_help = "Examples:\n  \
	doh-benchmark --doh cloudflare google quad9\n  \
	doh-benchmark --dns cloudflare quad9 --doh cloudflare quad9\n  \
	doh-benchmark --doh doh.example.net --ndjson --no-report")]
pub struct Cli {
	/// URLs, hosts or shortnames of DNS-over-HTTPS resolvers
	#[arg(long = "doh", num_args = 1..)]
	pub doh: Vec<String>,

	/// IPs or shortnames of DNS-over-UDP resolvers
	#[arg(long = "dns", num_args = 1..)]
	pub dns: Vec<String>,

	/// Number of domain resolutions to perform per resolver
	#[arg(short = 'q', long = "queries", default_value = "10")]
	pub queries: u32,

	/// Domain names to resolve, cycled in order
	#[arg(short = 'n', long = "names", num_args = 1.., default_value = "example.com")]
	pub names: Vec<String>,

	/// Resource record type of the query
	#[arg(long = "rrtype", visible_alias = "rr", default_value = "A")]
	pub rrtype: String,

	/// Measure DoH resolvers through a local DNS-to-DoH proxy
	#[arg(long = "proxy")]
	pub proxy: bool,

	/// Percentiles of response time to report
	#[arg(short = 'p', long = "percentiles", num_args = 1.., default_values_t = [5.0, 50.0, 95.0])]
	pub percentiles: Vec<f64>,

	/// Include all percentiles from 1 through 100 (only with --ndjson)
	#[arg(long = "histogram")]
	pub histogram: bool,

	/// Print each result as a line of JSON as soon as it is measured
	#[arg(long = "ndjson", visible_aliases = ["jsonl", "json"])]
	pub ndjson: bool,

	/// Skip the summary table
	#[arg(long = "no-report")]
	pub no_report: bool,

	/// Output CSV file path
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Log level when RUST_LOG is not set
	#[arg(long = "log-level", default_value = "warn")]
	pub log_level: String,
}
