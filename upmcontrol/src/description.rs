//! Analyse des documents de description de devices UPnP.
//!
//! Les URLs des services sont résolues par rapport à `URLBase`. Quand la
//! description n'en fournit pas, la base est déduite de l'URL à laquelle le
//! document a été téléchargé (`scheme://host:port/`).

use std::io::BufReader;

use serde::Serialize;
use url::Url;
use xmltree::Element;

use crate::errors::ControlPointError;

/// Service déclaré dans la `serviceList` d'un device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceDescription {
    pub service_type: String,
    pub service_id: String,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

impl ServiceDescription {
    /// Compare le type de service sans tenir compte de la version
    /// (`urn:...:service:AVTransport:` correspond à toutes les versions).
    pub fn matches(&self, service_type: &str) -> bool {
        let wanted = strip_version(service_type);
        strip_version(&self.service_type) == wanted
    }
}

/// Device décrit par un document `description.xml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub udn: String,
    /// Jamais vide : déduite de l'URL du document si absente
    pub url_base: String,
    pub services: Vec<ServiceDescription>,
    pub embedded: Vec<DeviceDescription>,
}

impl DeviceDescription {
    /// Analyse un document de description téléchargé depuis `location`.
    pub fn parse(location: &str, xml: &str) -> Result<Self, ControlPointError> {
        let root = Element::parse(BufReader::new(xml.as_bytes()))
            .map_err(|e| ControlPointError::Description(format!("{}: {}", location, e)))?;
        if root.name != "root" {
            return Err(ControlPointError::Description(format!(
                "{}: root element is <{}>",
                location, root.name
            )));
        }

        let url_base = match child_text(&root, "URLBase") {
            Some(base) if !base.is_empty() => base,
            _ => base_url(location)?,
        };

        let device = root.get_child("device").ok_or_else(|| {
            ControlPointError::Description(format!("{}: no <device> element", location))
        })?;

        let parsed = parse_device(device, &url_base)?;
        if parsed.udn.is_empty() {
            return Err(ControlPointError::Description(format!("{}: empty UDN", location)));
        }
        Ok(parsed)
    }

    /// Premier service (de ce device ou d'un device embarqué) du type demandé
    pub fn find_service(&self, service_type: &str) -> Option<&ServiceDescription> {
        self.all_services().into_iter().find(|s| s.matches(service_type))
    }

    pub fn has_service(&self, service_type: &str) -> bool {
        self.find_service(service_type).is_some()
    }

    /// Services de ce device puis de ses devices embarqués
    pub fn all_services(&self) -> Vec<&ServiceDescription> {
        let mut out: Vec<&ServiceDescription> = self.services.iter().collect();
        for device in &self.embedded {
            out.extend(device.all_services());
        }
        out
    }

    /// Le nom désigne ce device : nom convivial ou UDN (avec ou sans `uuid:`)
    pub fn is_named(&self, name: &str) -> bool {
        self.friendly_name == name
            || self.udn == name
            || self.udn.strip_prefix("uuid:") == Some(name)
    }
}

fn parse_device(device: &Element, url_base: &str) -> Result<DeviceDescription, ControlPointError> {
    let mut parsed = DeviceDescription {
        device_type: child_text(device, "deviceType").unwrap_or_default(),
        friendly_name: child_text(device, "friendlyName").unwrap_or_default(),
        manufacturer: child_text(device, "manufacturer").unwrap_or_default(),
        model_name: child_text(device, "modelName").unwrap_or_default(),
        udn: child_text(device, "UDN").unwrap_or_default(),
        url_base: url_base.to_string(),
        ..Default::default()
    };

    if let Some(list) = device.get_child("serviceList") {
        for service in elements(list).filter(|e| e.name == "service") {
            parsed.services.push(ServiceDescription {
                service_type: child_text(service, "serviceType").unwrap_or_default(),
                service_id: child_text(service, "serviceId").unwrap_or_default(),
                scpd_url: resolve_url(url_base, &child_text(service, "SCPDURL").unwrap_or_default())?,
                control_url: resolve_url(
                    url_base,
                    &child_text(service, "controlURL").unwrap_or_default(),
                )?,
                event_sub_url: resolve_url(
                    url_base,
                    &child_text(service, "eventSubURL").unwrap_or_default(),
                )?,
            });
        }
    }

    if let Some(list) = device.get_child("deviceList") {
        for embedded in elements(list).filter(|e| e.name == "device") {
            parsed.embedded.push(parse_device(embedded, url_base)?);
        }
    }

    Ok(parsed)
}

fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|n| n.as_element())
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .map(|e| e.get_text().map(|t| t.trim().to_string()).unwrap_or_default())
}

/// `scheme://host:port/` de l'URL de description
pub fn base_url(location: &str) -> Result<String, ControlPointError> {
    let url = Url::parse(location)
        .map_err(|e| ControlPointError::Description(format!("bad location {}: {}", location, e)))?;
    let base = url
        .join("/")
        .map_err(|e| ControlPointError::Description(format!("bad location {}: {}", location, e)))?;
    Ok(base.to_string())
}

/// Résout une URL de service (absolue ou relative) par rapport à la base.
pub fn resolve_url(url_base: &str, target: &str) -> Result<String, ControlPointError> {
    if target.is_empty() {
        return Ok(String::new());
    }
    if target.contains("://") {
        return Ok(target.to_string());
    }
    let base = Url::parse(url_base)
        .map_err(|e| ControlPointError::Description(format!("bad URLBase {}: {}", url_base, e)))?;
    base.join(target)
        .map(|u| u.to_string())
        .map_err(|e| ControlPointError::Description(format!("bad service URL {}: {}", target, e)))
}

fn strip_version(service_type: &str) -> &str {
    match service_type.rfind(':') {
        Some(pos) if service_type[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &service_type[..pos]
        }
        _ => service_type.trim_end_matches(':'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERER: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Salon</friendlyName>
    <manufacturer>Acme</manufacturer>
    <modelName>Box &amp; Co</modelName>
    <UDN>uuid:1234</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/avt/scpd.xml</SCPDURL>
        <controlURL>/avt/control</controlURL>
        <eventSubURL>avt/event</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Inner:1</deviceType>
        <UDN>uuid:5678</UDN>
        <serviceList>
          <service>
            <serviceType>urn:av-openhome-org:service:Product:2</serviceType>
            <serviceId>urn:av-openhome-org:serviceId:Product</serviceId>
            <SCPDURL>http://other:80/p.xml</SCPDURL>
            <controlURL>/p/control</controlURL>
            <eventSubURL>/p/event</eventSubURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_without_urlbase() {
        let dev = DeviceDescription::parse("http://10.0.0.2:49152/desc/root.xml", RENDERER).unwrap();
        assert_eq!(dev.url_base, "http://10.0.0.2:49152/");
        assert_eq!(dev.friendly_name, "Salon");
        assert_eq!(dev.model_name, "Box & Co");
        assert_eq!(dev.udn, "uuid:1234");

        let avt = &dev.services[0];
        assert_eq!(avt.control_url, "http://10.0.0.2:49152/avt/control");
        assert_eq!(avt.event_sub_url, "http://10.0.0.2:49152/avt/event");

        let product = dev.find_service("urn:av-openhome-org:service:Product:1").unwrap();
        assert_eq!(product.scpd_url, "http://other:80/p.xml");
        assert_eq!(dev.all_services().len(), 2);
    }

    #[test]
    fn test_parse_with_urlbase() {
        let xml = RENDERER.replace(
            "<specVersion>",
            "<URLBase>http://10.0.0.9:8080/base/</URLBase><specVersion>",
        );
        let dev = DeviceDescription::parse("http://10.0.0.2:49152/desc.xml", &xml).unwrap();
        assert_eq!(dev.url_base, "http://10.0.0.9:8080/base/");
        assert_eq!(dev.services[0].event_sub_url, "http://10.0.0.9:8080/base/avt/event");
    }

    #[test]
    fn test_is_named() {
        let dev = DeviceDescription::parse("http://h:1/d.xml", RENDERER).unwrap();
        assert!(dev.is_named("Salon"));
        assert!(dev.is_named("uuid:1234"));
        assert!(dev.is_named("1234"));
        assert!(!dev.is_named("Cuisine"));
    }

    #[test]
    fn test_reject_bad_documents() {
        assert!(DeviceDescription::parse("http://h:1/", "<html/>").is_err());
        assert!(DeviceDescription::parse("http://h:1/", "<root><device/></root>").is_err());
        assert!(DeviceDescription::parse("http://h:1/", "garbage").is_err());
    }
}
