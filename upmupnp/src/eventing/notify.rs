//! Envoi des requêtes NOTIFY.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::subscriptions::{NotifyTarget, SubscriptionRegistry};
use crate::soap::xml_quote;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Corps `e:propertyset` d'une notification ; les valeurs sont échappées.
pub fn propertyset(properties: &[(String, String)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">"#,
    );
    for (name, value) in properties {
        body.push_str(&format!(
            "\n<e:property>\n<{0}>{1}</{0}>\n</e:property>",
            name,
            xml_quote(value)
        ));
    }
    body.push_str("\n</e:propertyset>\n");
    body
}

/// Client NOTIFY partagé par le serveur et la boucle de publication.
#[derive(Clone)]
pub struct EventSender {
    client: reqwest::Client,
    registry: Arc<SubscriptionRegistry>,
}

impl EventSender {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Envoie un événement à un abonné.
    ///
    /// Les URLs de rappel sont essayées dans l'ordre jusqu'au premier succès.
    /// Un abonnement supprimé entre-temps ne reçoit rien. Les échecs sont
    /// seulement journalisés.
    pub async fn send(&self, target: &NotifyTarget, body: &str) {
        let method = match reqwest::Method::from_bytes(b"NOTIFY") {
            Ok(m) => m,
            Err(e) => {
                warn!("❌ NOTIFY method: {}", e);
                return;
            }
        };
        for callback in &target.callbacks {
            if !self.registry.is_active(&target.sid) {
                debug!("Subscription {} gone, skipping NOTIFY", target.sid);
                return;
            }
            let result = self
                .client
                .request(method.clone(), callback)
                .header("Content-Type", r#"text/xml; charset="utf-8""#)
                .header("NT", "upnp:event")
                .header("NTS", "upnp:propchange")
                .header("SID", &target.sid)
                .header("SEQ", target.seq.to_string())
                .body(body.to_string())
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(
                        "✅ NOTIFY {} seq {} -> {}",
                        target.sid, target.seq, callback
                    );
                    return;
                }
                Ok(resp) => warn!("❌ NOTIFY {} -> {}: {}", target.sid, callback, resp.status()),
                Err(e) => warn!("❌ NOTIFY {} -> {}: {}", target.sid, callback, e),
            }
        }
    }

    /// Publie un jeu de propriétés à tous les abonnés prêts du service.
    pub async fn publish(&self, udn: &str, service_id: &str, properties: &[(String, String)]) {
        let targets = self.registry.targets(udn, service_id);
        if targets.is_empty() {
            return;
        }
        let body = propertyset(properties);
        join_all(targets.iter().map(|t| self.send(t, &body))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propertyset_escapes_values() {
        let body = propertyset(&[
            ("Volume".to_string(), "42".to_string()),
            (
                "LastChange".to_string(),
                "<Event><Mute val=\"0\"/></Event>".to_string(),
            ),
        ]);
        assert!(body.contains("<Volume>42</Volume>"));
        assert!(body.contains("<LastChange>&lt;Event&gt;&lt;Mute val=&quot;0&quot;/&gt;&lt;/Event&gt;</LastChange>"));
        assert!(body.contains("urn:schemas-upnp-org:event-1-0"));
    }
}
