//! Network infrastructure: host address discovery for `--dns host`.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use anyhow::{Context, Result};

/// Fallback resolver appended after the host address.
pub const FALLBACK_DNS: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));

/// The address this host uses for outbound traffic.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
///
/// # Errors
///
/// Returns an error if no route to the outside is configured.
pub fn primary_host_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("binding probe socket")?;
    socket
        .connect("1.1.1.1:53")
        .context("no default route to determine host address")?;
    let ip = socket.local_addr().context("reading probe socket address")?.ip();
    anyhow::ensure!(!ip.is_unspecified(), "could not determine host address");
    Ok(ip)
}

/// DNS servers for host mode: the host itself, then the fallback.
///
/// # Errors
///
/// Returns an error if the host address cannot be determined.
pub fn host_dns_servers() -> Result<Vec<IpAddr>> {
    Ok(vec![primary_host_ip()?, FALLBACK_DNS])
}
