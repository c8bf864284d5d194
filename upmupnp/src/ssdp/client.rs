//! Client SSDP (point de contrôle).
//!
//! Le client n'écoute jamais sur le port 1900 : il envoie ses M-SEARCH depuis
//! un port éphémère et reçoit les réponses unicast sur ce même port. Il
//! rejoint le groupe multicast pour recevoir aussi les NOTIFY.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, multicast_target};

/// Événements SSDP intéressants pour un point de contrôle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

/// Client SSDP pour envoyer des M-SEARCH et écouter les annonces
pub struct SsdpClient {
    socket: UdpSocket,
    user_agent: String,
}

impl SsdpClient {
    pub fn new(user_agent: &str) -> std::io::Result<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], 0));
        raw.bind(&bind_addr.into())?;

        let socket: UdpSocket = raw.into();
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        socket.set_multicast_loop_v4(true)?;

        for iface in get_if_addrs::get_if_addrs()? {
            if let IpAddr::V4(ipv4) = iface.ip() {
                if ipv4.is_loopback() {
                    continue;
                }
                match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &ipv4) {
                    Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                    Err(e) => warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e),
                }
            }
        }

        info!("✅ SSDP client ready on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            user_agent: user_agent.to_string(),
        })
    }

    /// Envoie un M-SEARCH pour un type donné
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.max(1);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: {}\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st, self.user_agent
        );

        match self.socket.send_to(msg.as_bytes(), multicast_target()) {
            Ok(_) => {
                debug!("📤 M-SEARCH sent (ST={}, MX={})", st, mx);
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Attend un message au plus pendant le délai de lecture du socket.
    pub fn recv_event(&self) -> Option<SsdpEvent> {
        let mut buf = [0u8; 8192];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => parse_message(&String::from_utf8_lossy(&buf[..n]), from),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                None
            }
            Err(e) => {
                warn!("❌ SSDP client read error: {}", e);
                None
            }
        }
    }

    /// Boucle de réception jusqu'à ce que `stop` passe à vrai.
    pub fn run_until<F>(&self, stop: &AtomicBool, mut on_event: F)
    where
        F: FnMut(SsdpEvent),
    {
        while !stop.load(Ordering::SeqCst) {
            if let Some(event) = self.recv_event() {
                trace!("📥 SSDP event: {:?}", event);
                on_event(event);
            }
        }
    }
}

/// Décode un message SSDP reçu (NOTIFY ou réponse de recherche).
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim().to_ascii_uppercase();
    let headers = parse_headers(lines);

    if first_line.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if first_line.starts_with("HTTP/") && first_line.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else {
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    match nts.as_str() {
        "ssdp:alive" => Some(SsdpEvent::Alive {
            usn,
            nt,
            location: headers.get("LOCATION")?.to_string(),
            server: headers.get("SERVER").cloned().unwrap_or_default(),
            max_age: parse_max_age(headers.get("CACHE-CONTROL")),
            from,
        }),
        "ssdp:byebye" => Some(SsdpEvent::ByeBye { usn, nt, from }),
        _ => {
            trace!("Unknown NTS value from {}: {}", from, nts);
            None
        }
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    Some(SsdpEvent::SearchResponse {
        usn: headers.get("USN")?.to_string(),
        st: headers.get("ST")?.to_string(),
        location: headers.get("LOCATION")?.to_string(),
        server: headers.get("SERVER").cloned().unwrap_or_default(),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        from,
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value.to_string());
            }
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    value
        .and_then(|v| {
            let lower = v.to_ascii_lowercase();
            let idx = lower.find("max-age")?;
            let after = lower[idx + 7..].trim_start().trim_start_matches('=').trim_start();
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .unwrap_or(MAX_AGE)
}
