//! Représentation d'un device SSDP

/// Device SSDP avec ses métadonnées pour les annonces
#[derive(Debug, Clone)]
pub struct SsdpDevice {
    /// UUID du device (sans le préfixe "uuid:")
    pub uuid: String,

    /// URL de la description du device
    pub location: String,

    /// Identifiant du serveur (en-tête SERVER)
    pub server: String,

    /// Types de notification annoncés : uuid, rootdevice, type du device,
    /// puis types des services
    notification_types: Vec<String>,
}

impl SsdpDevice {
    pub fn new(uuid: &str, device_type: &str, location: &str, server: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            location: location.to_string(),
            server: server.to_string(),
            notification_types: vec![
                format!("uuid:{}", uuid),
                "upnp:rootdevice".to_string(),
                device_type.to_string(),
            ],
        }
    }

    /// Ajoute un type de notification (ex: pour un service)
    pub fn add_notification_type(&mut self, nt: &str) {
        if !self.notification_types.iter().any(|t| t == nt) {
            self.notification_types.push(nt.to_string());
        }
    }

    pub fn notification_types(&self) -> &[String] {
        &self.notification_types
    }

    /// Types répondant à une cible de recherche `ST`.
    pub fn matching(&self, st: &str) -> Vec<&str> {
        if st == "ssdp:all" {
            self.notification_types.iter().map(String::as_str).collect()
        } else {
            self.notification_types
                .iter()
                .filter(|nt| nt.as_str() == st)
                .map(String::as_str)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching() {
        let mut dev = SsdpDevice::new(
            "abcd",
            "urn:schemas-upnp-org:device:MediaRenderer:1",
            "http://h/d.xml",
            "srv",
        );
        dev.add_notification_type("urn:schemas-upnp-org:service:AVTransport:1");
        dev.add_notification_type("urn:schemas-upnp-org:service:AVTransport:1");
        assert_eq!(dev.notification_types().len(), 4);
        assert_eq!(dev.matching("ssdp:all").len(), 4);
        assert_eq!(dev.matching("upnp:rootdevice"), vec!["upnp:rootdevice"]);
        assert!(dev.matching("urn:x:device:Other:1").is_empty());
    }
}
