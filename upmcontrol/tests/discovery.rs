use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use upmcontrol::discovery::{DescriptionFetcher, Searcher};
use upmcontrol::{ControlPointError, DiscoveryDirectory, DiscoveryEvent, DiscoveryOptions};

#[derive(Default)]
struct CountingSearcher {
    searches: AtomicUsize,
}

impl Searcher for CountingSearcher {
    fn search(&self, _target: &str, _mx: u32) -> io::Result<()> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Descriptions servies par URL
#[derive(Default)]
struct FakeFetcher {
    documents: Mutex<HashMap<String, String>>,
}

impl FakeFetcher {
    fn add(&self, location: &str, udn: &str, name: &str) {
        self.documents
            .lock()
            .insert(location.to_string(), description(udn, name));
    }
}

impl DescriptionFetcher for FakeFetcher {
    fn fetch(&self, location: &str) -> Result<String, ControlPointError> {
        self.documents
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| ControlPointError::Description(format!("no document at {}", location)))
    }
}

fn description(udn: &str, name: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>{name}</friendlyName>
    <manufacturer>upm</manufacturer>
    <modelName>test</modelName>
    <UDN>{udn}</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/rc.xml</SCPDURL>
        <controlURL>/rc/control</controlURL>
        <eventSubURL>/rc/event</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/avt.xml</SCPDURL>
        <controlURL>/avt/control</controlURL>
        <eventSubURL>/avt/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#
    )
}

fn directory(window: Duration) -> (DiscoveryDirectory, Arc<CountingSearcher>, Arc<FakeFetcher>) {
    let searcher = Arc::new(CountingSearcher::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let options = DiscoveryOptions {
        search_window: window,
        ..Default::default()
    };
    let dir = DiscoveryDirectory::new(
        Arc::clone(&searcher) as Arc<dyn Searcher>,
        Arc::clone(&fetcher) as Arc<dyn DescriptionFetcher>,
        options,
    )
    .unwrap();
    (dir, searcher, fetcher)
}

fn alive(udn: &str, location: &str) -> DiscoveryEvent {
    DiscoveryEvent::Alive {
        udn: udn.to_string(),
        location: location.to_string(),
        max_age: 1800,
    }
}

#[test]
fn test_initial_search_covers_every_target() {
    let (_dir, searcher, _) = directory(Duration::from_millis(100));
    assert_eq!(
        searcher.searches.load(Ordering::SeqCst),
        DiscoveryOptions::default().search_targets.len()
    );
}

#[test]
fn test_traverse_waits_for_search_window() {
    let (dir, _, _) = directory(Duration::from_millis(300));
    let start = Instant::now();
    dir.traverse(|_, _| true);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1300), "{:?}", elapsed);
}

#[test]
fn test_alive_then_byebye() {
    let (dir, _, fetcher) = directory(Duration::from_millis(50));
    fetcher.add("http://10.0.0.2/desc.xml", "uuid:r1", "Salon");

    assert!(dir.notify(alive("uuid:r1", "http://10.0.0.2/desc.xml")));
    dir.wait_idle();
    assert_eq!(dir.len(), 1);

    let devices = dir.devices();
    assert_eq!(devices[0].friendly_name, "Salon");
    assert_eq!(devices[0].services.len(), 2);

    dir.notify(DiscoveryEvent::ByeBye {
        udn: "uuid:r1".to_string(),
    });
    dir.wait_idle();
    assert!(dir.is_empty());
}

#[test]
fn test_fetch_failure_is_dropped() {
    let (dir, _, fetcher) = directory(Duration::from_millis(50));
    fetcher.add("http://10.0.0.3/desc.xml", "uuid:r2", "Cuisine");

    dir.notify(alive("uuid:bad", "http://10.0.0.9/missing.xml"));
    dir.notify(alive("uuid:r2", "http://10.0.0.3/desc.xml"));
    dir.wait_idle();

    assert_eq!(dir.len(), 1);
    assert!(dir.get_device_by_name("uuid:bad").is_none());
    assert!(dir.get_device_by_name("Cuisine").is_some());
}

#[test]
fn test_traverse_visitor_can_stop() {
    let (dir, _, fetcher) = directory(Duration::from_millis(50));
    fetcher.add("http://10.0.0.2/desc.xml", "uuid:r1", "Salon");
    fetcher.add("http://10.0.0.3/desc.xml", "uuid:r2", "Cuisine");
    dir.notify(alive("uuid:r1", "http://10.0.0.2/desc.xml"));
    dir.notify(alive("uuid:r2", "http://10.0.0.3/desc.xml"));
    dir.wait_idle();

    let mut all = 0;
    dir.traverse(|_, _| {
        all += 1;
        true
    });
    assert_eq!(all, 4);

    let mut visited = 0;
    dir.traverse(|_, _| {
        visited += 1;
        false
    });
    assert_eq!(visited, 1);
}

#[test]
fn test_service_urls_are_absolute() {
    let (dir, _, fetcher) = directory(Duration::from_millis(50));
    fetcher.add("http://10.0.0.2:49152/desc.xml", "uuid:r1", "Salon");
    dir.notify(alive("uuid:r1", "http://10.0.0.2:49152/desc.xml"));
    dir.wait_idle();

    let mut urls = Vec::new();
    dir.traverse(|_, service| {
        urls.push(service.control_url.clone());
        true
    });
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://10.0.0.2:49152/avt/control".to_string(),
            "http://10.0.0.2:49152/rc/control".to_string(),
        ]
    );
}

#[test]
fn test_get_device_by_name_and_udn() {
    let (dir, _, fetcher) = directory(Duration::from_millis(50));
    fetcher.add("http://10.0.0.2/desc.xml", "uuid:r1", "Salon");
    dir.notify(alive("uuid:r1", "http://10.0.0.2/desc.xml"));
    dir.wait_idle();

    assert_eq!(dir.get_device_by_name("Salon").unwrap().udn, "uuid:r1");
    assert_eq!(dir.get_device_by_name("uuid:r1").unwrap().friendly_name, "Salon");
    assert_eq!(dir.get_device_by_name("r1").unwrap().friendly_name, "Salon");
    assert!(dir.get_device_by_name("Grenier").is_none());
}

#[test]
fn test_get_device_by_name_waits_for_late_device() {
    let (dir, _, fetcher) = directory(Duration::from_millis(800));
    fetcher.add("http://10.0.0.2/desc.xml", "uuid:r1", "Salon");

    let start = Instant::now();
    std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(100));
            dir.notify(alive("uuid:r1", "http://10.0.0.2/desc.xml"));
        });
        assert!(dir.get_device_by_name("Salon").is_some());
    });
    assert!(start.elapsed() < Duration::from_millis(700));
}
