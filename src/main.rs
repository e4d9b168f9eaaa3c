mod bench;
mod classic;
mod cli;
mod dns;
mod doh;
mod error;
mod https;
mod output;
mod proxy;
mod resolver;
mod stats;
mod transport;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use futures::{pin_mut, StreamExt};
use hickory_proto::rr::RecordType;
use tracing_subscriber::EnvFilter;

use crate::bench::Backends;
use crate::classic::UdpDnsClient;
use crate::cli::Cli;
use crate::https::HttpsConnector;
use crate::proxy::LocalDohProxy;
use crate::transport::MeasurementOptions;

fn init_tracing(default_level: &str) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	init_tracing(&cli.log_level);

	// Classic resolvers first, then DoH, each in argument order
	let mut targets = Vec::new();
	for r in &cli.dns {
		targets.push(resolver::parse_dns_target(r)?);
	}
	for r in &cli.doh {
		targets.push(resolver::parse_doh_target(r)?);
	}
	if targets.is_empty() {
		bail!(
			"no resolvers given; use --dns and/or --doh with an address, URL or one of: {}",
			resolver::alias_codes().join(", "),
		);
	}

	if let Some(p) = cli.percentiles.iter().find(|&&p| !stats::is_valid_rank(p)) {
		bail!("percentile {} is out of range (0, 100]", p);
	}
	let record_type = RecordType::from_str(&cli.rrtype.to_uppercase())
		.map_err(|e| anyhow!("invalid record type '{}': {}", cli.rrtype, e))?;

	// Reported ranks; the histogram adds every whole percentile to NDJSON
	let mut ndjson_ranks = cli.percentiles.clone();
	if cli.histogram {
		ndjson_ranks.extend((1..=100).map(f64::from));
	}
	let options = MeasurementOptions::new(cli.queries, cli.names.clone(), record_type)?
		.with_percentiles(ndjson_ranks.clone())
		.with_proxy(cli.proxy);

	if !cli.ndjson {
		output::print_config_summary(&targets, &options);
	}

	let connector = Arc::new(HttpsConnector::new().context("failed to set up TLS")?);
	let backends = Backends {
		dns: Arc::new(UdpDnsClient::default()),
		doh: connector.clone(),
		proxy: Arc::new(LocalDohProxy::new(connector)),
	};

	let stream = bench::run_benchmark(backends, targets, options);
	pin_mut!(stream);

	let mut results = Vec::new();
	while let Some(result) = stream.next().await {
		let result = result?;
		if cli.ndjson {
			println!("{}", output::ndjson_line(&result, &ndjson_ranks));
		}
		results.push(result);
	}

	if results.is_empty() {
		bail!("No test results: every resolver was unreachable");
	}

	if !cli.no_report {
		output::print_results_table(&results, &cli.percentiles);
	}
	if let Some(path) = &cli.output {
		output::write_csv(path, &results, &cli.percentiles)?;
	}

	Ok(())
}
