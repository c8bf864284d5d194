//! # Abonnements aux événements UPnP
//!
//! ## Fonctionnalités
//!
//! - ✅ Serveur HTTP local minimal recevant les `NOTIFY`
//! - ✅ `SUBSCRIBE` / renouvellement / `UNSUBSCRIBE` (ureq, méthodes non standard)
//! - ✅ Décodage des `propertyset` et des documents `LastChange`
//! - ✅ Distribution par SID vers le callback de l'abonnement, sur un thread dédié
//!
//! Les requêtes reçues passent par un canal crossbeam : le thread d'écoute ne
//! fait que lire et répondre, jamais appeler de code utilisateur.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use ureq::{Agent, http};
use xmltree::Element;

use crate::errors::ControlPointError;
use crate::service::ServiceClient;

/// Durée d'abonnement demandée
pub const SUBSCRIPTION_TIMEOUT_SECS: u64 = 1800;
const RENEWAL_SAFETY_MARGIN_SECS: u64 = 60;
const HTTP_READ_TIMEOUT_SECS: u64 = 5;
const CALLBACK_PATH: &str = "/upmcontrol/events";

/// Variables d'un événement : nom → valeur
pub type PropertySet = HashMap<String, String>;

type Callback = Arc<Mutex<dyn FnMut(&PropertySet) + Send>>;

struct IncomingNotify {
    sid: Option<String>,
    body: Vec<u8>,
}

struct Subscription {
    event_url: String,
    service_type: String,
    expires_at: Instant,
    callback: Callback,
}

/// Récepteur d'événements partagé par tous les abonnements d'un processus
pub struct EventListener {
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    port: u16,
    agent: Agent,
}

impl EventListener {
    /// Ouvre le port d'écoute et démarre les threads de réception et de
    /// distribution.
    pub fn start(http_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind("0.0.0.0:0")?;
        let port = listener.local_addr()?.port();
        info!(port, "event listener bound");

        let (notify_tx, notify_rx) = unbounded::<IncomingNotify>();
        thread::Builder::new()
            .name("upnp-event-http".into())
            .spawn(move || run_http_listener(listener, notify_tx))?;

        let subscriptions: Arc<Mutex<HashMap<String, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let table = Arc::clone(&subscriptions);
        thread::Builder::new()
            .name("upnp-event-dispatch".into())
            .spawn(move || run_dispatcher(table, notify_rx))?;

        Ok(Self {
            subscriptions,
            port,
            agent: build_agent(http_timeout),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// S'abonne aux événements d'un service. Retourne le SID.
    ///
    /// Le callback reçoit chaque `propertyset` (y compris l'événement initial).
    pub fn subscribe<F>(&self, service: &ServiceClient, callback: F) -> Result<String, ControlPointError>
    where
        F: FnMut(&PropertySet) + Send + 'static,
    {
        let event_url = service.event_sub_url();
        if event_url.is_empty() {
            return Err(ControlPointError::Subscription(format!(
                "{} has no event URL",
                service.service_type()
            )));
        }

        let (remote_host, remote_port) = parse_host_port(event_url)
            .ok_or_else(|| ControlPointError::Subscription(format!("bad event URL {}", event_url)))?;
        let local_ip = determine_local_ip(&remote_host, remote_port)?;
        let callback_url = format!("<http://{}:{}{}>", format_ip(&local_ip), self.port, CALLBACK_PATH);

        // Verrou tenu pendant la requête : l'événement initial peut arriver
        // avant la réponse, le dispatcher attend alors l'enregistrement du SID.
        let mut subscriptions = self.subscriptions.lock();

        let request = http::Request::builder()
            .method("SUBSCRIBE")
            .uri(event_url)
            .header("HOST", format!("{}:{}", remote_host, remote_port))
            .header("CALLBACK", callback_url)
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", SUBSCRIPTION_TIMEOUT_SECS))
            .body(())
            .map_err(|e| ControlPointError::Subscription(e.to_string()))?;

        let response = self.agent.run(request)?;
        if !response.status().is_success() {
            return Err(ControlPointError::Subscription(format!(
                "SUBSCRIBE returned HTTP {}",
                response.status()
            )));
        }

        let sid = header(&response, "SID")
            .ok_or_else(|| ControlPointError::Subscription("SUBSCRIBE response missing SID".into()))?;
        let timeout = parse_timeout(header(&response, "TIMEOUT").as_deref())
            .unwrap_or(Duration::from_secs(SUBSCRIPTION_TIMEOUT_SECS));

        subscriptions.insert(
            sid.clone(),
            Subscription {
                event_url: event_url.to_string(),
                service_type: service.service_type().to_string(),
                expires_at: Instant::now() + timeout,
                callback: Arc::new(Mutex::new(callback)),
            },
        );

        info!(
            device = service.friendly_name(),
            service = service.service_type(),
            sid = %sid,
            "subscribed (timeout {}s)",
            timeout.as_secs()
        );
        Ok(sid)
    }

    /// Renouvelle un abonnement ; retourne la nouvelle durée.
    pub fn renew(&self, sid: &str) -> Result<Duration, ControlPointError> {
        let event_url = self
            .subscriptions
            .lock()
            .get(sid)
            .map(|s| s.event_url.clone())
            .ok_or_else(|| ControlPointError::Subscription(format!("unknown SID {}", sid)))?;

        let request = http::Request::builder()
            .method("SUBSCRIBE")
            .uri(&event_url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", SUBSCRIPTION_TIMEOUT_SECS))
            .body(())
            .map_err(|e| ControlPointError::Subscription(e.to_string()))?;

        let response = self.agent.run(request)?;
        if !response.status().is_success() {
            return Err(ControlPointError::Subscription(format!(
                "SUBSCRIBE renewal returned HTTP {}",
                response.status()
            )));
        }
        let timeout = parse_timeout(header(&response, "TIMEOUT").as_deref())
            .unwrap_or(Duration::from_secs(SUBSCRIPTION_TIMEOUT_SECS));

        if let Some(sub) = self.subscriptions.lock().get_mut(sid) {
            sub.expires_at = Instant::now() + timeout;
        }
        debug!(sid, "renewed subscription");
        Ok(timeout)
    }

    /// Renouvelle les abonnements proches de l'expiration. Un échec retire
    /// l'abonnement.
    pub fn renew_expiring(&self) {
        let limit = Instant::now() + Duration::from_secs(RENEWAL_SAFETY_MARGIN_SECS);
        let expiring: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, s)| s.expires_at <= limit)
            .map(|(sid, _)| sid.clone())
            .collect();

        for sid in expiring {
            if let Err(e) = self.renew(&sid) {
                warn!(sid = %sid, error = %e, "renewal failed, dropping subscription");
                self.subscriptions.lock().remove(&sid);
            }
        }
    }

    /// Résilie un abonnement. Le callback n'est plus appelé, même si la
    /// requête échoue.
    pub fn unsubscribe(&self, sid: &str) -> Result<(), ControlPointError> {
        let Some(sub) = self.subscriptions.lock().remove(sid) else {
            return Ok(());
        };

        let request = http::Request::builder()
            .method("UNSUBSCRIBE")
            .uri(&sub.event_url)
            .header("SID", sid)
            .body(())
            .map_err(|e| ControlPointError::Subscription(e.to_string()))?;

        let response = self.agent.run(request)?;
        if !response.status().is_success() {
            warn!(
                sid,
                service = %sub.service_type,
                status = %response.status(),
                "UNSUBSCRIBE returned non-success status"
            );
        }
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    #[cfg(test)]
    fn register<F>(&self, sid: &str, callback: F)
    where
        F: FnMut(&PropertySet) + Send + 'static,
    {
        self.subscriptions.lock().insert(
            sid.to_string(),
            Subscription {
                event_url: String::new(),
                service_type: String::new(),
                expires_at: Instant::now() + Duration::from_secs(SUBSCRIPTION_TIMEOUT_SECS),
                callback: Arc::new(Mutex::new(callback)),
            },
        );
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        let sids: Vec<String> = self.subscriptions.lock().keys().cloned().collect();
        for sid in sids {
            if let Err(e) = self.unsubscribe(&sid) {
                debug!(sid = %sid, error = %e, "unsubscribe at shutdown failed");
            }
        }
    }
}

fn header<B>(response: &http::Response<B>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
}

fn run_dispatcher(
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    notify_rx: Receiver<IncomingNotify>,
) {
    for notify in notify_rx.iter() {
        let Some(sid) = notify.sid else {
            debug!("dropping NOTIFY without SID");
            continue;
        };
        let callback = subscriptions.lock().get(&sid).map(|s| Arc::clone(&s.callback));
        let Some(callback) = callback else {
            debug!(sid = %sid, "dropping NOTIFY for unknown SID");
            continue;
        };

        match parse_propertyset(&notify.body) {
            Some(props) => {
                trace!(sid = %sid, count = props.len(), "dispatching event");
                let mut callback = callback.lock();
                (&mut *callback)(&props);
            }
            None => warn!(sid = %sid, "cannot decode event body"),
        }
    }
}

fn run_http_listener(listener: TcpListener, notify_tx: Sender<IncomingNotify>) {
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                if let Err(err) =
                    stream.set_read_timeout(Some(Duration::from_secs(HTTP_READ_TIMEOUT_SECS)))
                {
                    warn!("Failed to set read timeout on notify connection: {}", err);
                }

                match read_http_request(&mut stream) {
                    Ok(request) => {
                        if request.method != "NOTIFY" {
                            let _ = write_http_response(&mut stream, 405, "Method Not Allowed");
                            continue;
                        }
                        let notify = IncomingNotify {
                            sid: request.headers.get("sid").cloned(),
                            body: request.body,
                        };
                        let _ = write_http_response(&mut stream, 200, "OK");
                        if notify_tx.send(notify).is_err() {
                            warn!("Dropping notify event because dispatcher channel is closed");
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("Failed to parse incoming notify request: {}", err);
                        let _ = write_http_response(&mut stream, 400, "Bad Request");
                    }
                }
            }
            Err(err) => warn!("Incoming notify connection failed: {}", err),
        }
    }
}

struct HttpRequest {
    method: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_http_request(stream: &mut TcpStream) -> io::Result<HttpRequest> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing request line"));
    }
    let method = request_line
        .split_whitespace()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing method"))?
        .to_ascii_uppercase();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(&['\r', '\n'][..]);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    Ok(HttpRequest {
        method,
        headers,
        body,
    })
}

fn write_http_response(stream: &mut TcpStream, status: u16, message: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, message
    );
    stream.write_all(response.as_bytes())
}

/// Décode un `<e:propertyset>` : une variable par `<e:property>`.
pub fn parse_propertyset(body: &[u8]) -> Option<PropertySet> {
    let root = Element::parse(std::io::Cursor::new(body)).ok()?;
    if root.name != "propertyset" {
        return None;
    }
    let mut props = PropertySet::new();
    for property in xml_children(&root).filter(|e| e.name == "property") {
        for var in xml_children(property) {
            let value = var.get_text().map(|t| t.into_owned()).unwrap_or_default();
            props.insert(var.name.clone(), value);
        }
    }
    Some(props)
}

/// Décode un document `LastChange` (AVTransport, RenderingControl) :
/// chaque élément portant un attribut `val` donne une variable.
pub fn decode_lastchange(xml: &str) -> Option<PropertySet> {
    let root = Element::parse(xml.as_bytes()).ok()?;
    let mut props = PropertySet::new();
    collect_vals(&root, &mut props);
    Some(props)
}

fn collect_vals(element: &Element, props: &mut PropertySet) {
    for child in xml_children(element) {
        if child.name != "InstanceID" {
            if let Some(val) = child.attributes.get("val") {
                props.insert(child.name.clone(), val.clone());
            }
        }
        collect_vals(child, props);
    }
}

fn xml_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| node.as_element())
}

fn parse_timeout(raw: Option<&str>) -> Option<Duration> {
    let lower = raw?.trim().to_ascii_lowercase();
    if lower == "second-infinite" {
        return Some(Duration::from_secs(SUBSCRIPTION_TIMEOUT_SECS));
    }
    let number = lower.strip_prefix("second-")?;
    number.parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_host_port(url: &str) -> Option<(String, u16)> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_matches(|c| c == '[' || c == ']').to_string();
    let port = parsed.port_or_known_default()?;
    Some((host, port))
}

fn determine_local_ip(remote_host: &str, remote_port: u16) -> io::Result<IpAddr> {
    let is_ipv6 = remote_host.contains(':');
    let (target, bind_addr) = if is_ipv6 {
        (format!("[{}]:{}", remote_host, remote_port), "[::]:0")
    } else {
        (format!("{}:{}", remote_host, remote_port), "0.0.0.0:0")
    };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(&target)?;
    Ok(socket.local_addr()?.ip())
}

fn format_ip(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .allow_non_standard_methods(true)
        .build()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const PROPSET: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><TransportState>Playing</TransportState></e:property>
  <e:property><Uri>http://h/a&amp;b</Uri></e:property>
</e:propertyset>"#;

    #[test]
    fn test_parse_propertyset() {
        let props = parse_propertyset(PROPSET.as_bytes()).unwrap();
        assert_eq!(props.get("TransportState").unwrap(), "Playing");
        assert_eq!(props.get("Uri").unwrap(), "http://h/a&b");
        assert!(parse_propertyset(b"<other/>").is_none());
    }

    #[test]
    fn test_decode_lastchange() {
        let xml = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT_RCS"><InstanceID val="0"><TransportState val="PLAYING"/><CurrentTrackURI val="http://x/1.mp3"/></InstanceID></Event>"#;
        let props = decode_lastchange(xml).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("TransportState").unwrap(), "PLAYING");
        assert!(!props.contains_key("InstanceID"));
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(Some("Second-300")), Some(Duration::from_secs(300)));
        assert_eq!(
            parse_timeout(Some("Second-infinite")),
            Some(Duration::from_secs(SUBSCRIPTION_TIMEOUT_SECS))
        );
        assert_eq!(parse_timeout(Some("bogus")), None);
        assert_eq!(parse_timeout(None), None);
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("http://10.0.0.2:49152/evt"),
            Some(("10.0.0.2".to_string(), 49152))
        );
        assert_eq!(parse_host_port("http://host/evt"), Some(("host".to_string(), 80)));
    }

    #[test]
    fn test_notify_dispatched_by_sid() {
        let listener = EventListener::start(Duration::from_secs(2)).unwrap();
        let (tx, rx) = mpsc::channel();
        listener.register("uuid:sub-1", move |props: &PropertySet| {
            let _ = tx.send(props.clone());
        });

        let send = |sid: &str| {
            let mut stream = TcpStream::connect(("127.0.0.1", listener.port())).unwrap();
            let request = format!(
                "NOTIFY {} HTTP/1.1\r\nHOST: 127.0.0.1\r\nNT: upnp:event\r\nNTS: upnp:propchange\r\nSID: {}\r\nSEQ: 0\r\nContent-Length: {}\r\n\r\n{}",
                CALLBACK_PATH,
                sid,
                PROPSET.len(),
                PROPSET
            );
            stream.write_all(request.as_bytes()).unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).unwrap();
            assert!(reply.starts_with("HTTP/1.1 200"));
        };

        send("uuid:unknown");
        send("uuid:sub-1");

        let props = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(props.get("TransportState").unwrap(), "Playing");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
