//! # Annuaire de découverte UPnP
//!
//! Maintient la liste des devices racine vus sur le réseau, indexés par l'UDN
//! annoncé en SSDP.
//!
//! ## Fonctionnalités
//!
//! - ✅ Écoute SSDP sur un thread dédié, conversion des annonces en tâches
//! - ✅ Worker unique ([`WorkQueue`]) : téléchargement et analyse des descriptions
//! - ✅ Expiration : bail annoncé + 20 s de marge, nouvelle recherche si un device disparaît
//! - ✅ Recherche M-SEARCH limitée à une toutes les 10 s
//! - ✅ Lectures ([`DiscoveryDirectory::traverse`]) différées jusqu'à la fin de la
//!   fenêtre de réponse de la dernière recherche
//!
//! L'annuaire est construit explicitement par l'appelant : il n'existe pas
//! d'instance globale.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use upmupnp::WorkQueue;
use upmupnp::ssdp::{SsdpClient, SsdpEvent};
use ureq::Agent;

use crate::description::{DeviceDescription, ServiceDescription};
use crate::errors::ControlPointError;

/// Marge ajoutée au bail annoncé avant d'oublier un device
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(20);

/// Délai minimal entre deux recherches
pub const SEARCH_DEBOUNCE: Duration = Duration::from_secs(10);

pub const ROOT_DEVICE_TARGET: &str = "upnp:rootdevice";

const USER_AGENT: &str = "Linux UPnP/1.0 upmcontrol/0.1";

/// Émet une recherche multicast pour une cible
pub trait Searcher: Send + Sync {
    fn search(&self, target: &str, mx: u32) -> io::Result<()>;
}

/// Télécharge un document de description
pub trait DescriptionFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<String, ControlPointError>;
}

/// Recherche SSDP réelle
pub struct SsdpSearcher {
    client: Arc<SsdpClient>,
}

impl SsdpSearcher {
    pub fn new(client: Arc<SsdpClient>) -> Self {
        Self { client }
    }
}

impl Searcher for SsdpSearcher {
    fn search(&self, target: &str, mx: u32) -> io::Result<()> {
        self.client.send_msearch(target, mx)
    }
}

/// Téléchargement HTTP des descriptions
pub struct UreqFetcher {
    agent: Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder().timeout_global(Some(timeout)).build();
        Self {
            agent: config.into(),
        }
    }
}

impl DescriptionFetcher for UreqFetcher {
    fn fetch(&self, location: &str) -> Result<String, ControlPointError> {
        let mut response = self.agent.get(location).call()?;
        Ok(response.body_mut().read_to_string()?)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Fenêtre de réponse aléatoire des devices (MX)
    pub search_window: Duration,
    pub search_targets: Vec<String>,
    pub fetch_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            search_window: Duration::from_secs(3),
            search_targets: vec![ROOT_DEVICE_TARGET.to_string()],
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Tâche traitée par le worker de découverte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Alive {
        udn: String,
        location: String,
        max_age: u32,
    },
    ByeBye {
        udn: String,
    },
}

impl DiscoveryEvent {
    /// Seules les annonces des devices racine deviennent des tâches.
    pub fn from_ssdp(event: &SsdpEvent) -> Option<Self> {
        match event {
            SsdpEvent::Alive {
                usn,
                nt,
                location,
                max_age,
                ..
            } if nt == ROOT_DEVICE_TARGET => Some(DiscoveryEvent::Alive {
                udn: udn_of(usn),
                location: location.clone(),
                max_age: *max_age,
            }),
            SsdpEvent::SearchResponse {
                usn,
                st,
                location,
                max_age,
                ..
            } if st == ROOT_DEVICE_TARGET => Some(DiscoveryEvent::Alive {
                udn: udn_of(usn),
                location: location.clone(),
                max_age: *max_age,
            }),
            SsdpEvent::ByeBye { usn, nt, .. } if nt == ROOT_DEVICE_TARGET => {
                Some(DiscoveryEvent::ByeBye { udn: udn_of(usn) })
            }
            _ => None,
        }
    }
}

fn udn_of(usn: &str) -> String {
    usn.split("::").next().unwrap_or(usn).to_string()
}

/// Entrée de l'annuaire
#[derive(Debug, Clone)]
pub struct RemoteDevice {
    pub description: DeviceDescription,
    pub location: String,
    /// Bail annoncé + marge
    pub expires: Duration,
    pub last_seen: Instant,
}

impl RemoteDevice {
    pub fn new(description: DeviceDescription, location: &str, max_age: u32) -> Self {
        Self {
            description,
            location: location.to_string(),
            expires: Duration::from_secs(u64::from(max_age)) + EXPIRY_MARGIN,
            last_seen: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.expires
    }
}

struct Directory {
    devices: Mutex<HashMap<String, RemoteDevice>>,
    device_added: Condvar,
    last_search: Mutex<Option<Instant>>,
    searcher: Arc<dyn Searcher>,
    fetcher: Arc<dyn DescriptionFetcher>,
    options: DiscoveryOptions,
}

impl Directory {
    fn process(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Alive {
                udn,
                location,
                max_age,
            } => {
                let description = self
                    .fetcher
                    .fetch(&location)
                    .and_then(|xml| DeviceDescription::parse(&location, &xml));
                match description {
                    Ok(description) => {
                        if description.udn != udn {
                            debug!(announced = %udn, described = %description.udn, "UDN mismatch");
                        }
                        debug!(udn = %udn, name = %description.friendly_name, "device alive");
                        let device = RemoteDevice::new(description, &location, max_age);
                        self.devices.lock().insert(udn, device);
                        self.device_added.notify_all();
                    }
                    Err(e) => {
                        warn!(udn = %udn, location = %location, error = %e, "cannot get device description");
                    }
                }
            }
            DiscoveryEvent::ByeBye { udn } => {
                if self.devices.lock().remove(&udn).is_some() {
                    debug!(udn = %udn, "device byebye");
                }
            }
        }
    }

    fn search(&self) -> bool {
        {
            let mut last = self.last_search.lock();
            if let Some(at) = *last {
                if at.elapsed() < SEARCH_DEBOUNCE {
                    return false;
                }
            }
            *last = Some(Instant::now());
        }

        let mx = self.options.search_window.as_secs().max(1) as u32;
        for target in &self.options.search_targets {
            if let Err(e) = self.searcher.search(target, mx) {
                warn!(target = %target, error = %e, "search failed");
            }
        }
        true
    }

    fn remaining_delay(&self) -> Duration {
        match *self.last_search.lock() {
            Some(at) => self.options.search_window.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn expire_devices(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut devices = self.devices.lock();
            let before = devices.len();
            devices.retain(|udn, device| {
                let keep = !device.is_expired(now);
                if !keep {
                    debug!(udn = %udn, "device expired");
                }
                keep
            });
            before - devices.len()
        };
        if removed > 0 {
            self.search();
        }
        removed
    }
}

/// Annuaire des devices UPnP du réseau
pub struct DiscoveryDirectory {
    directory: Arc<Directory>,
    queue: Arc<WorkQueue<DiscoveryEvent>>,
    stop: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryDirectory {
    /// Construit l'annuaire et lance la première recherche.
    pub fn new(
        searcher: Arc<dyn Searcher>,
        fetcher: Arc<dyn DescriptionFetcher>,
        options: DiscoveryOptions,
    ) -> io::Result<Self> {
        let directory = Self::build(searcher, fetcher, options)?;
        directory.search();
        Ok(directory)
    }

    /// Annuaire branché sur le réseau : client SSDP et téléchargement HTTP.
    pub fn with_ssdp(options: DiscoveryOptions) -> io::Result<Self> {
        let client = Arc::new(SsdpClient::new(USER_AGENT)?);
        let searcher = Arc::new(SsdpSearcher::new(Arc::clone(&client)));
        let fetcher = Arc::new(UreqFetcher::new(options.fetch_timeout));
        let directory = Self::build(searcher, fetcher, options)?;

        let queue = Arc::clone(&directory.queue);
        let stop = Arc::clone(&directory.stop);
        let handle = std::thread::Builder::new()
            .name("ssdp-listener".to_string())
            .spawn(move || {
                client.run_until(&stop, |event| {
                    if let Some(task) = DiscoveryEvent::from_ssdp(&event) {
                        queue.put(task);
                    }
                });
            })?;
        *directory.listener.lock() = Some(handle);

        directory.search();
        info!("✅ UPnP discovery started");
        Ok(directory)
    }

    fn build(
        searcher: Arc<dyn Searcher>,
        fetcher: Arc<dyn DescriptionFetcher>,
        options: DiscoveryOptions,
    ) -> io::Result<Self> {
        let directory = Arc::new(Directory {
            devices: Mutex::new(HashMap::new()),
            device_added: Condvar::new(),
            last_search: Mutex::new(None),
            searcher,
            fetcher,
            options,
        });

        let queue = Arc::new(WorkQueue::new("discovery", 0));
        let worker_dir = Arc::clone(&directory);
        queue.start(move |event| worker_dir.process(event))?;

        Ok(Self {
            directory,
            queue,
            stop: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
        })
    }

    /// Dépose une annonce pour le worker. Ne bloque pas.
    pub fn notify(&self, event: DiscoveryEvent) -> bool {
        self.queue.put(event)
    }

    /// Attend que toutes les annonces déposées aient été traitées.
    pub fn wait_idle(&self) {
        self.queue.wait_idle();
    }

    /// Nouvelle recherche, sauf si la précédente date de moins de 10 s.
    pub fn search(&self) -> bool {
        self.directory.search()
    }

    /// Temps restant avant la fin de la fenêtre de la dernière recherche
    pub fn remaining_delay(&self) -> Duration {
        self.directory.remaining_delay()
    }

    /// Retire les devices dont le bail a expiré ; retourne leur nombre.
    pub fn expire_devices(&self) -> usize {
        self.directory.expire_devices()
    }

    fn wait_search_window(&self) {
        let remaining = self.remaining_delay();
        if !remaining.is_zero() {
            debug!(delay_ms = remaining.as_millis() as u64, "waiting for search window");
            std::thread::sleep(remaining);
        }
    }

    /// Visite chaque couple (device, service). Le visiteur retourne `false`
    /// pour arrêter l'itération.
    pub fn traverse<F>(&self, mut visitor: F)
    where
        F: FnMut(&DeviceDescription, &ServiceDescription) -> bool,
    {
        self.wait_search_window();
        self.expire_devices();

        let devices = self.directory.devices.lock();
        for device in devices.values() {
            for service in device.description.all_services() {
                if !visitor(&device.description, service) {
                    return;
                }
            }
        }
    }

    /// Instantané des devices connus, triés par nom
    pub fn devices(&self) -> Vec<DeviceDescription> {
        self.wait_search_window();
        self.expire_devices();

        let mut out: Vec<DeviceDescription> = self
            .directory
            .devices
            .lock()
            .values()
            .map(|d| d.description.clone())
            .collect();
        out.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        out
    }

    /// Device désigné par son nom convivial ou son UDN.
    ///
    /// Retourne dès que le device est connu ; sinon attend au plus la fin de
    /// la fenêtre de recherche courante.
    pub fn get_device_by_name(&self, name: &str) -> Option<DeviceDescription> {
        loop {
            let remaining = self.remaining_delay();
            self.expire_devices();

            let mut devices = self.directory.devices.lock();
            if let Some(device) = devices.values().find(|d| d.description.is_named(name)) {
                return Some(device.description.clone());
            }
            if remaining.is_zero() {
                return None;
            }
            self.directory
                .device_added
                .wait_for(&mut devices, remaining);
        }
    }

    pub fn len(&self) -> usize {
        self.directory.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arrête l'écoute et le worker. Les annonces déjà reçues sont traitées.
    pub fn terminate(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener.lock().take() {
            if handle.join().is_err() {
                warn!("SSDP listener thread panicked");
            }
        }
        self.queue.set_terminate_and_wait();
    }
}

impl Drop for DiscoveryDirectory {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSearcher {
        calls: AtomicUsize,
    }

    impl Searcher for CountingSearcher {
        fn search(&self, _target: &str, _mx: u32) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoFetch;

    impl DescriptionFetcher for NoFetch {
        fn fetch(&self, location: &str) -> Result<String, ControlPointError> {
            Err(ControlPointError::Description(location.to_string()))
        }
    }

    fn device(udn: &str, lease: u32, age: Duration) -> RemoteDevice {
        let mut dev = RemoteDevice::new(
            DeviceDescription {
                udn: udn.to_string(),
                friendly_name: udn.to_string(),
                ..Default::default()
            },
            "http://h:1/d.xml",
            lease,
        );
        dev.last_seen = Instant::now().checked_sub(age).unwrap();
        dev
    }

    fn directory(searcher: Arc<CountingSearcher>) -> DiscoveryDirectory {
        let options = DiscoveryOptions {
            search_window: Duration::from_millis(10),
            search_targets: vec![ROOT_DEVICE_TARGET.to_string()],
            fetch_timeout: Duration::from_secs(1),
        };
        DiscoveryDirectory::new(searcher, Arc::new(NoFetch), options).unwrap()
    }

    #[test]
    fn test_expiry_uses_lease_plus_margin() {
        let searcher = Arc::new(CountingSearcher::default());
        let dir = directory(Arc::clone(&searcher));
        {
            let mut devices = dir.directory.devices.lock();
            devices.insert("old".into(), device("old", 60, Duration::from_secs(60 + 21)));
            devices.insert("young".into(), device("young", 60, Duration::from_secs(60 + 19)));
        }

        assert_eq!(dir.expire_devices(), 1);
        let devices = dir.directory.devices.lock();
        assert!(devices.contains_key("young"));
        assert!(!devices.contains_key("old"));
    }

    #[test]
    fn test_search_is_debounced() {
        let searcher = Arc::new(CountingSearcher::default());
        let dir = directory(Arc::clone(&searcher));
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 1);

        assert!(!dir.search());
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 1);

        *dir.directory.last_search.lock() = Instant::now().checked_sub(Duration::from_secs(11));
        assert!(dir.search());
        assert_eq!(searcher.calls.load(Ordering::SeqCst), 2);
    }

    struct OneDocument {
        udn: &'static str,
    }

    impl DescriptionFetcher for OneDocument {
        fn fetch(&self, _location: &str) -> Result<String, ControlPointError> {
            Ok(format!(
                r#"<root xmlns="urn:schemas-upnp-org:device-1-0"><device><deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType><friendlyName>Box</friendlyName><UDN>{}</UDN></device></root>"#,
                self.udn
            ))
        }
    }

    #[test]
    fn test_byebye_uses_announced_udn() {
        let options = DiscoveryOptions {
            search_window: Duration::from_millis(10),
            ..Default::default()
        };
        let dir = DiscoveryDirectory::new(
            Arc::new(CountingSearcher::default()),
            Arc::new(OneDocument { udn: "uuid:b" }),
            options,
        )
        .unwrap();

        dir.notify(DiscoveryEvent::Alive {
            udn: "uuid:a".into(),
            location: "http://h:1/d.xml".into(),
            max_age: 1800,
        });
        dir.wait_idle();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get_device_by_name("Box").unwrap().udn, "uuid:b");

        dir.notify(DiscoveryEvent::ByeBye {
            udn: "uuid:a".into(),
        });
        dir.wait_idle();
        assert!(dir.is_empty());
        let mut visited = 0;
        dir.traverse(|_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_default_search_targets_root_devices() {
        assert_eq!(
            DiscoveryOptions::default().search_targets,
            vec![ROOT_DEVICE_TARGET.to_string()]
        );
    }

    #[test]
    fn test_from_ssdp_keeps_root_devices_only() {
        let from: SocketAddr = "10.0.0.2:1900".parse().unwrap();
        let alive = SsdpEvent::Alive {
            usn: "uuid:abc::upnp:rootdevice".into(),
            nt: "upnp:rootdevice".into(),
            location: "http://10.0.0.2/d.xml".into(),
            server: "x".into(),
            max_age: 1800,
            from,
        };
        assert_eq!(
            DiscoveryEvent::from_ssdp(&alive),
            Some(DiscoveryEvent::Alive {
                udn: "uuid:abc".into(),
                location: "http://10.0.0.2/d.xml".into(),
                max_age: 1800,
            })
        );

        let service = SsdpEvent::ByeBye {
            usn: "uuid:abc::urn:schemas-upnp-org:service:AVTransport:1".into(),
            nt: "urn:schemas-upnp-org:service:AVTransport:1".into(),
            from,
        };
        assert_eq!(DiscoveryEvent::from_ssdp(&service), None);
    }
}
