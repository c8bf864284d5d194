//! Choix de l'adresse IP locale publiée dans les annonces.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use get_if_addrs::get_if_addrs;
use tracing::{debug, warn};

/// Adresses IPv4 non-loopback des interfaces.
pub fn list_ipv4() -> Vec<(String, Ipv4Addr)> {
    match get_if_addrs() {
        Ok(ifaces) => ifaces
            .into_iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(v4) if !v4.is_loopback() => Some((iface.name, v4)),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warn!("❌ Cannot list network interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Adresse utilisée par le système pour joindre `remote` (aucun paquet émis).
pub fn route_source(remote: &str) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(remote)?;
    Ok(socket.local_addr()?.ip())
}

/// Adresse locale du serveur.
///
/// Ordre : adresse configurée (`upnpip`), puis nom d'interface configuré
/// (`upnpiface`), puis première interface IPv4 non-loopback, puis route
/// par défaut. À défaut, `127.0.0.1`.
pub fn local_ipv4(configured_ip: Option<&str>, configured_iface: Option<&str>) -> Ipv4Addr {
    if let Some(ip) = configured_ip.filter(|s| !s.is_empty()) {
        match ip.parse::<Ipv4Addr>() {
            Ok(ip) => return ip,
            Err(_) => warn!("❌ Ignoring bad upnpip value [{}]", ip),
        }
    }

    let candidates = list_ipv4();
    if let Some(name) = configured_iface.filter(|s| !s.is_empty()) {
        if let Some((_, ip)) = candidates.iter().find(|(n, _)| n == name) {
            return *ip;
        }
        warn!("❌ Interface {} not found or has no IPv4 address", name);
    }
    if let Some((name, ip)) = candidates.first() {
        debug!("Using interface {} ({})", name, ip);
        return *ip;
    }

    match route_source("8.8.8.8:80") {
        Ok(IpAddr::V4(ip)) => ip,
        _ => Ipv4Addr::LOCALHOST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_ip_wins() {
        assert_eq!(
            local_ipv4(Some("192.168.1.20"), Some("nope0")),
            Ipv4Addr::new(192, 168, 1, 20)
        );
    }

    #[test]
    fn test_list_excludes_loopback() {
        assert!(list_ipv4().iter().all(|(_, ip)| !ip.is_loopback()));
    }
}
