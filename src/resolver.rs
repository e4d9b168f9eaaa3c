use std::net::SocketAddr;

use anyhow::{anyhow, Result};

use crate::transport::ResolverTarget;

/// A well-known provider reachable over both protocols
struct Alias {
	code: &'static str,
	name: &'static str,
	dns: &'static str,
	doh: &'static str,
}

const ALIASES: &[Alias] = &[
	Alias {
		code: "cloudflare",
		name: "Cloudflare",
		dns: "1.1.1.1",
		doh: "https://cloudflare-dns.com/dns-query",
	},
	Alias {
		code: "google",
		name: "Google",
		dns: "8.8.8.8",
		doh: "https://dns.google/dns-query",
	},
	Alias {
		code: "quad9",
		name: "Quad9",
		dns: "9.9.9.9",
		doh: "https://dns.quad9.net/dns-query",
	},
	Alias {
		code: "cleanbrowsing",
		name: "CleanBrowsing",
		dns: "185.228.168.9",
		doh: "https://doh.cleanbrowsing.org/doh/security-filter/",
	},
	Alias {
		code: "adguard",
		name: "AdGuard",
		dns: "94.140.14.14",
		doh: "https://dns.adguard-dns.com/dns-query",
	},
	Alias {
		code: "opendns",
		name: "OpenDNS",
		dns: "208.67.222.222",
		doh: "https://doh.opendns.com/dns-query",
	},
];

/// Lowercase and strip non-word characters, so "Quad 9" and "quad9" match.
fn alias_code(input: &str) -> String {
	input.chars()
		.filter(|c| c.is_alphanumeric() || *c == '_')
		.flat_map(char::to_lowercase)
		.collect()
}

fn find_alias(input: &str) -> Option<&'static Alias> {
	let code = alias_code(input);
	ALIASES.iter().find(|a| a.code == code)
}

/// Shortnames accepted by `--dns` and `--doh`.
pub fn alias_codes() -> Vec<&'static str> {
	let mut codes: Vec<&'static str> = ALIASES.iter().map(|a| a.code).collect();
	codes.sort();
	codes
}

/// Parse a resolver address string into a socket address.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
pub fn parse_socket_addr(input: &str) -> Result<SocketAddr> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty resolver address"));
	}

	let addr: SocketAddr = if trimmed.starts_with('[') {
		// Bracketed IPv6 with port: [::1]:53
		trimmed.parse()
			.map_err(|e| anyhow!("invalid bracketed IPv6 address '{}': {}", trimmed, e))?
	} else if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
		// Bare IPv6 address without port
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IPv6 address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		// IPv4 with port (e.g. "8.8.8.8:5353")
		addr
	} else {
		// Plain IPv4 without port
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IP address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	};
	Ok(addr)
}

/// Turn a `--dns` argument (address or alias) into a classic target.
pub fn parse_dns_target(input: &str) -> Result<ResolverTarget> {
	if let Some(alias) = find_alias(input) {
		return Ok(ResolverTarget::classic(alias.dns).named(alias.name));
	}
	let trimmed = input.trim();
	parse_socket_addr(trimmed)?;
	Ok(ResolverTarget::classic(trimmed))
}

/// Turn a `--doh` argument into a DoH target.
///
/// Aliases map to their provider URL; an argument without any '/' is
/// taken as a bare host name.
pub fn parse_doh_target(input: &str) -> Result<ResolverTarget> {
	if let Some(alias) = find_alias(input) {
		return Ok(ResolverTarget::doh(alias.doh).named(alias.name));
	}
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty DoH resolver"));
	}
	if trimmed.contains('/') {
		Ok(ResolverTarget::doh(trimmed))
	} else {
		Ok(ResolverTarget::doh(format!("https://{}", trimmed)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ipv4_no_port() {
		let addr = parse_socket_addr("1.1.1.1").unwrap();
		assert_eq!(addr.port(), 53);
		assert_eq!(addr.ip().to_string(), "1.1.1.1");
	}

	#[test]
	fn test_ipv4_with_port() {
		let addr = parse_socket_addr("8.8.8.8:5353").unwrap();
		assert_eq!(addr.port(), 5353);
		assert_eq!(addr.ip().to_string(), "8.8.8.8");
	}

	#[test]
	fn test_ipv6_bare() {
		let addr = parse_socket_addr("2606:4700::1111").unwrap();
		assert_eq!(addr.port(), 53);
	}

	#[test]
	fn test_ipv6_bracketed() {
		let addr = parse_socket_addr("[2606:4700::1111]:53").unwrap();
		assert_eq!(addr.port(), 53);
	}

	#[test]
	fn test_invalid_input() {
		assert!(parse_socket_addr("not-an-ip").is_err());
		assert!(parse_dns_target("not-an-ip").is_err());
	}

	#[test]
	fn test_dns_alias() {
		let t = parse_dns_target("Quad 9").unwrap();
		assert_eq!(t, ResolverTarget::classic("9.9.9.9").named("Quad9"));
	}

	#[test]
	fn test_doh_alias() {
		let t = parse_doh_target("cloudflare").unwrap();
		assert_eq!(t.service(), "https://cloudflare-dns.com/dns-query");
		assert_eq!(t.name(), Some("Cloudflare"));
	}

	#[test]
	fn test_doh_bare_host() {
		let t = parse_doh_target("doh.example.net").unwrap();
		assert_eq!(t, ResolverTarget::doh("https://doh.example.net"));
	}

	#[test]
	fn test_doh_full_url_kept() {
		let t = parse_doh_target("https://doh.example.net/q?ct").unwrap();
		assert_eq!(t.service(), "https://doh.example.net/q?ct");
		assert_eq!(t.name(), None);
	}

	#[test]
	fn test_alias_codes_sorted() {
		let codes = alias_codes();
		assert!(codes.contains(&"google"));
		assert!(codes.windows(2).all(|w| w[0] <= w[1]));
	}
}
