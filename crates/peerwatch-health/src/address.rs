//! Probe target selection from a peer's allowed-ips list.

use std::net::IpAddr;

use ipnet::IpNet;

/// The VPN-internal address of a peer: the first allowed-ips entry that
/// names exactly one host.
///
/// Bare addresses count as host routes. Unparseable entries (including
/// `(none)`) are skipped. Routed subnets never yield an address.
pub fn vpn_address(allowed_ips: &str) -> Option<IpAddr> {
    allowed_ips
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .find_map(single_host)
}

fn single_host(entry: &str) -> Option<IpAddr> {
    let net = match entry.parse::<IpNet>() {
        Ok(net) => net,
        Err(_) => return entry.parse::<IpAddr>().ok(),
    };
    if net.prefix_len() == net.max_prefix_len() {
        return Some(net.addr());
    }
    let mut hosts = net.hosts();
    match (hosts.next(), hosts.next()) {
        (Some(host), None) => Some(host),
        _ => None,
    }
}
