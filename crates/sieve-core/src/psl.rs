//! Registrable domain (eTLD+1) extraction
//!
//! Backed by the Public Suffix List compiled into the `psl` crate, private
//! section included, so hosting suffixes such as `github.io` count as public.
//!
//! ```
//! use sieve_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.il"), "example.co.il");
//! ```

/// Get the eTLD+1 (registrable domain) for a hostname.
///
/// Hosts with no registrable part (a bare suffix, `localhost`, an IP
/// address) come back normalized but otherwise unchanged.
pub fn get_etld1(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    match psl::domain_str(&host) {
        Some(domain) => domain.to_string(),
        None => host,
    }
}
