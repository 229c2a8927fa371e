//! Client address resolution from forwarding headers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use http::header::{HeaderMap, HeaderName};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Loopback, RFC 1918, link-local and unique-local blocks.
const PRIVATE_BLOCKS: [(IpAddr, u8); 7] = [
    (IpAddr::V4(Ipv4Addr::new(127, 0, 0, 0)), 8),
    (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)), 8),
    (IpAddr::V4(Ipv4Addr::new(172, 16, 0, 0)), 12),
    (IpAddr::V4(Ipv4Addr::new(192, 168, 0, 0)), 16),
    (IpAddr::V6(Ipv6Addr::LOCALHOST), 128),
    (IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0)), 10),
    (IpAddr::V6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0)), 7),
];

/// Whether `ip` falls in one of the private, loopback or link-local blocks.
/// IPv4-mapped IPv6 addresses are checked as IPv4.
pub fn is_private(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    };
    PRIVATE_BLOCKS.iter().any(|&(net, prefix)| contains(net, prefix, ip))
}

fn contains(net: IpAddr, prefix: u8, ip: IpAddr) -> bool {
    match (net, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &HeaderName) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The peer's IP without the port, or `""` when there is no transport peer.
pub fn remote_addr(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.ip().to_string()).unwrap_or_default()
}

/// First `x-forwarded-for` entry, else `x-real-ip`, else the peer.
pub fn real_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header(headers, &X_FORWARDED_FOR) {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        return first.to_owned();
    }
    if let Some(real) = header(headers, &X_REAL_IP) {
        return real.to_owned();
    }
    remote_addr(peer)
}

/// First public `x-forwarded-for` entry scanning left to right, else a public
/// `x-real-ip`, else the peer. Entries that do not parse as an IP are skipped.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let is_public = |value: &str| value.parse::<IpAddr>().is_ok_and(|ip| !is_private(ip));

    if let Some(forwarded) = header(headers, &X_FORWARDED_FOR) {
        if let Some(public) = forwarded.split(',').map(str::trim).find(|v| is_public(v)) {
            return public.to_owned();
        }
    }
    if let Some(real) = header(headers, &X_REAL_IP) {
        if is_public(real) {
            return real.to_owned();
        }
    }
    remote_addr(peer)
}
