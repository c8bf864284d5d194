//! Serveur SSDP

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::{MAX_AGE, MAX_MX, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpDevice, multicast_target, usn_for};

/// Message NOTIFY ssdp:alive
pub fn alive_message(device: &SsdpDevice, nt: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        MAX_AGE,
        device.location,
        nt,
        device.server,
        usn_for(&device.uuid, nt)
    )
}

/// Message NOTIFY ssdp:byebye
pub fn byebye_message(device: &SsdpDevice, nt: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        nt,
        usn_for(&device.uuid, nt)
    )
}

/// Réponse unicast à un M-SEARCH
pub fn search_response(device: &SsdpDevice, st: &str) -> String {
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         \r\n",
        MAX_AGE,
        date,
        device.location,
        device.server,
        st,
        usn_for(&device.uuid, st)
    )
}

type DeviceMap = Arc<RwLock<HashMap<String, SsdpDevice>>>;

/// Serveur SSDP gérant les annonces et découvertes
pub struct SsdpServer {
    devices: DeviceMap,
    socket: Option<Arc<UdpSocket>>,
    running: Arc<AtomicBool>,
    interface: Ipv4Addr,
}

impl SsdpServer {
    /// `interface` : adresse de l'interface pour le groupe multicast
    /// (`0.0.0.0` pour laisser le système choisir).
    pub fn new(interface: Ipv4Addr) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            socket: None,
            running: Arc::new(AtomicBool::new(false)),
            interface,
        }
    }

    /// Ouvre le port 1900, rejoint le groupe et lance les threads d'annonce
    /// et d'écoute.
    pub fn start(&mut self) -> std::io::Result<()> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, SSDP_PORT));
        socket.bind(&bind_addr.into())?;
        let socket: UdpSocket = socket.into();

        socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &self.interface)?;
        if !self.interface.is_unspecified() {
            let raw = Socket::from(socket.try_clone()?);
            raw.set_multicast_if_v4(&self.interface)?;
        }
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_loop_v4(true)?;

        let socket = Arc::new(socket);
        self.socket = Some(Arc::clone(&socket));
        self.running.store(true, Ordering::SeqCst);

        info!("✅ SSDP server started on {}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT);

        self.start_periodic_announcements(Arc::clone(&socket));
        self.start_msearch_listener(socket);
        Ok(())
    }

    /// Ajoute un device et envoie un alive initial
    pub fn add_device(&self, device: SsdpDevice) {
        if let Some(socket) = &self.socket {
            send_all(socket, &device, alive_message);
        }
        self.devices.write().insert(device.uuid.clone(), device);
    }

    /// Supprime un device et envoie un byebye
    pub fn remove_device(&self, uuid: &str) {
        let removed = self.devices.write().remove(uuid);
        if let (Some(device), Some(socket)) = (removed, &self.socket) {
            send_all(socket, &device, byebye_message);
        }
    }

    /// Envoie les byebye et arrête les threads.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(socket) = self.socket.take() {
            info!("👋 Shutting down SSDP server, sending byebye for all devices");
            for device in self.devices.read().values() {
                send_all(&socket, device, byebye_message);
            }
        }
    }

    /// Annonces périodiques (MAX_AGE/2)
    fn start_periodic_announcements(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let running = Arc::clone(&self.running);
        let period = u64::from(MAX_AGE / 2);

        std::thread::spawn(move || {
            let mut elapsed = 0u64;
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(1));
                elapsed += 1;
                if elapsed < period {
                    continue;
                }
                elapsed = 0;
                for device in devices.read().values() {
                    send_all(&socket, device, alive_message);
                }
            }
        });
    }

    /// Écoute des M-SEARCH
    fn start_msearch_listener(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let running = Arc::clone(&self.running);

        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            while running.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf) {
                    Ok((n, src)) => {
                        let data = String::from_utf8_lossy(&buf[..n]);
                        if data.starts_with("M-SEARCH") {
                            handle_msearch(&socket, &devices, &data, src);
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => warn!("❌ SSDP read error: {}", e),
                }
            }
            debug!("🛑 SSDP listener stopped");
        });
    }
}

impl Drop for SsdpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_all(socket: &UdpSocket, device: &SsdpDevice, build: fn(&SsdpDevice, &str) -> String) {
    for nt in device.notification_types() {
        let msg = build(device, nt);
        match socket.send_to(msg.as_bytes(), multicast_target()) {
            Ok(_) => debug!("📡 NOTIFY {} (NT={})", device.uuid, nt),
            Err(e) => warn!("❌ Failed to send NOTIFY for {}: {}", device.uuid, e),
        }
    }
}

/// Valeur d'un en-tête d'un message SSDP (nom insensible à la casse).
fn header_value<'a>(data: &'a str, name: &str) -> Option<&'a str> {
    data.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then_some(value.trim())
    })
}

fn handle_msearch(socket: &Arc<UdpSocket>, devices: &DeviceMap, data: &str, src: SocketAddr) {
    let Some(st) = header_value(data, "ST") else {
        return;
    };
    let mx = header_value(data, "MX")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_MX);

    let responses: Vec<String> = devices
        .read()
        .values()
        .flat_map(|device| {
            device
                .matching(st)
                .into_iter()
                .map(|nt| search_response(device, nt))
                .collect::<Vec<_>>()
        })
        .collect();
    if responses.is_empty() {
        return;
    }
    debug!("M-SEARCH from {} ST={} MX={}: {} response(s)", src, st, mx, responses.len());

    let delay = Duration::from_millis(rand::rng().random_range(0..u64::from(mx) * 1000));
    let socket = Arc::clone(socket);
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        for resp in responses {
            if let Err(e) = socket.send_to(resp.as_bytes(), src) {
                warn!("❌ Failed to send M-SEARCH response to {}: {}", src, e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SsdpDevice {
        SsdpDevice::new(
            "1234",
            "urn:schemas-upnp-org:device:MediaRenderer:1",
            "http://10.0.0.1:49152/1234/description.xml",
            "Linux UPnP/1.0 upmpdrenderer/0.1",
        )
    }

    #[test]
    fn test_alive_and_byebye() {
        let alive = alive_message(&device(), "upnp:rootdevice");
        assert!(alive.starts_with("NOTIFY * HTTP/1.1\r\n"));
        assert!(alive.contains("NTS: ssdp:alive\r\n"));
        assert!(alive.contains("USN: uuid:1234::upnp:rootdevice\r\n"));
        assert!(alive.contains("CACHE-CONTROL: max-age=1800\r\n"));
        assert!(alive.ends_with("\r\n\r\n"));

        let bye = byebye_message(&device(), "uuid:1234");
        assert!(bye.contains("NTS: ssdp:byebye\r\n"));
        assert!(bye.contains("USN: uuid:1234\r\n"));
    }

    #[test]
    fn test_search_response() {
        let resp = search_response(&device(), "urn:schemas-upnp-org:device:MediaRenderer:1");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("EXT:\r\n"));
        assert!(resp.contains("LOCATION: http://10.0.0.1:49152/1234/description.xml\r\n"));
        assert!(resp.contains("ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n"));
    }

    #[test]
    fn test_header_value() {
        let msg = "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nman: \"ssdp:discover\"\r\nmx: 3\r\nst: ssdp:all\r\n\r\n";
        assert_eq!(header_value(msg, "ST"), Some("ssdp:all"));
        assert_eq!(header_value(msg, "MX"), Some("3"));
        assert_eq!(header_value(msg, "USER-AGENT"), None);
    }
}
