use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::{Map, Value};

use anyhow::Result;

use crate::transport::{MeasurementOptions, ResolverResult, ResolverTarget};

/// Column label for a percentile rank, e.g. "p50" or "p99.9".
pub fn percentile_label(rank: f64) -> String {
	format!("p{}", rank)
}

fn format_ms(latency_ms: Option<f64>) -> String {
	match latency_ms {
		Some(ms) => format!("{:.1} ms", ms),
		None => "-".to_string(),
	}
}

/// Print a summary of the run configuration before measuring.
pub fn print_config_summary(targets: &[ResolverTarget], options: &MeasurementOptions) {
	println!("Resolver Benchmark Configuration");
	println!("================================");
	println!("Resolvers:      {}", targets.len());
	for t in targets {
		let name = t.name().unwrap_or(t.service());
		println!("  - {} ({} {})", name, t.protocol().display_name(), t.service());
	}
	println!("Queries:        {}", options.query_count());
	println!("Names:          {}", options.query_names().join(", "));
	println!("Record type:    {}", options.record_type);
	let proxy_label = if options.use_proxy { "yes" } else { "no" };
	println!("DoH via proxy:  {}", proxy_label);
	println!();
}

/// One NDJSON object for a result, with only the given percentile ranks.
pub fn ndjson_line(result: &ResolverResult, ranks: &[f64]) -> String {
	let mut object = Map::new();
	object.insert("name".into(), Value::from(result.name.clone()));
	object.insert("service".into(), Value::from(result.service.clone()));
	object.insert("protocol".into(), Value::from(result.protocol.as_str()));
	object.insert("pass".into(), Value::from(result.pass_count));
	object.insert("fail".into(), Value::from(result.fail_count));
	for p in &result.percentile_latencies {
		if ranks.contains(&p.rank) {
			object.insert(percentile_label(p.rank), Value::from(p.latency_ms));
		}
	}
	Value::Object(object).to_string()
}

/// Print the results as a table, then the fastest resolver per percentile.
pub fn print_results_table(results: &[ResolverResult], ranks: &[f64]) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	let mut header = vec![
		"Resolver".to_string(), "Protocol".to_string(), "Service".to_string(),
		"Pass".to_string(), "Fail".to_string(),
	];
	header.extend(ranks.iter().map(|&r| percentile_label(r)));
	table.set_header(header);

	for r in results {
		let mut row = vec![
			Cell::new(&r.name),
			Cell::new(r.protocol.display_name()),
			Cell::new(&r.service),
			Cell::new(r.pass_count),
			Cell::new(r.fail_count),
		];
		row.extend(ranks.iter().map(|&rank| Cell::new(format_ms(r.percentile(rank)))));
		table.add_row(row);
	}

	println!("\nResolvers");
	println!("=========\n");
	println!("{table}");

	println!("\nFastest Response Times");
	println!("======================\n");
	for &rank in ranks {
		if let Some((latency, r)) = fastest_at(results, rank) {
			println!(
				"{:>6}  {:>10}  {} {}",
				percentile_label(rank), format_ms(Some(latency)),
				r.name, r.protocol.display_name(),
			);
		}
	}
}

/// The resolver with the lowest latency at `rank`, if any has data.
pub fn fastest_at(results: &[ResolverResult], rank: f64) -> Option<(f64, &ResolverResult)> {
	results.iter()
		.filter_map(|r| r.percentile(rank).map(|ms| (ms, r)))
		.min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
}

/// Write results to a CSV file.
pub fn write_csv(path: &str, results: &[ResolverResult], ranks: &[f64]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	let mut header = vec![
		"name".to_string(), "service".to_string(), "protocol".to_string(),
		"pass".to_string(), "fail".to_string(),
	];
	header.extend(ranks.iter().map(|&r| format!("{}_ms", percentile_label(r))));
	writer.write_record(&header)?;

	for r in results {
		let mut record = vec![
			r.name.clone(),
			r.service.clone(),
			r.protocol.as_str().to_string(),
			r.pass_count.to_string(),
			r.fail_count.to_string(),
		];
		record.extend(ranks.iter().map(|&rank| {
			r.percentile(rank).map(|ms| format!("{:.2}", ms)).unwrap_or_default()
		}));
		writer.write_record(&record)?;
	}

	writer.flush()?;
	println!("\nResults written to: {}", path);
	Ok(())
}
