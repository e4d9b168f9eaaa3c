use crate::transport::PercentileLatency;

/// Whether a requested rank can be computed at all.
pub fn is_valid_rank(p: f64) -> bool {
	p.is_finite() && p > 0.0 && p <= 100.0
}

/// Calculate the p-th percentile from a sorted slice using linear
/// interpolation between closest ranks.
///
/// Args:
///   sorted_values: Pre-sorted slice of f64 values.
///   p: Percentile between 0.0 and 100.0 (e.g. 50.0 for median).
///
/// Returns:
///   None if the slice is empty, otherwise the percentile value.
pub fn percentile(sorted_values: &[f64], p: f64) -> Option<f64> {
	if sorted_values.is_empty() {
		return None;
	}
	if sorted_values.len() == 1 {
		return Some(sorted_values[0]);
	}
	// Position in [0, n-1]; blend the two neighbours
	let last = (sorted_values.len() - 1) as f64;
	let pos = (p.clamp(0.0, 100.0) / 100.0) * last;
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;
	let frac = pos - lower as f64;
	Some(sorted_values[lower] + (sorted_values[upper] - sorted_values[lower]) * frac)
}

/// Compute the latency at each requested rank.
///
/// Ranks outside (0, 100], non-finite ranks and duplicates are skipped,
/// as is everything when there are no durations.
pub fn compute_percentiles(durations_ms: &[f64], ranks: &[f64]) -> Vec<PercentileLatency> {
	let mut sorted = durations_ms.to_vec();
	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	let mut out: Vec<PercentileLatency> = Vec::new();
	for &rank in ranks {
		if !is_valid_rank(rank) || out.iter().any(|p| p.rank == rank) {
			continue;
		}
		if let Some(latency_ms) = percentile(&sorted, rank) {
			out.push(PercentileLatency { rank, latency_ms });
		}
	}
	out
}
