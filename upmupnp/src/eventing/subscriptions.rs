//! Registre des abonnements GENA.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

/// Durée de bail par défaut et maximale (secondes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone)]
struct Subscriber {
    udn: String,
    service_id: String,
    callbacks: Vec<String>,
    expires: Instant,
    seq: u32,
    /// Vrai une fois l'événement initial (SEQ 0) envoyé
    ready: bool,
}

/// Destinataire d'une notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyTarget {
    pub sid: String,
    pub callbacks: Vec<String>,
    pub seq: u32,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subs: Mutex<HashMap<String, Subscriber>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crée un abonnement et retourne son SID (`uuid:...`).
    pub fn subscribe(
        &self,
        udn: &str,
        service_id: &str,
        callbacks: Vec<String>,
        timeout_secs: u64,
    ) -> String {
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());
        let sub = Subscriber {
            udn: udn.to_string(),
            service_id: service_id.to_string(),
            callbacks,
            expires: Instant::now() + Duration::from_secs(timeout_secs),
            seq: 0,
            ready: false,
        };
        info!(
            "🔒 New subscription {} on {} ({:?}, {}s)",
            sid, service_id, sub.callbacks, timeout_secs
        );
        self.subs.lock().insert(sid.clone(), sub);
        sid
    }

    /// Renouvelle un bail. `false` si le SID est inconnu.
    pub fn renew(&self, sid: &str, timeout_secs: u64) -> bool {
        match self.subs.lock().get_mut(sid) {
            Some(sub) => {
                sub.expires = Instant::now() + Duration::from_secs(timeout_secs);
                debug!("♻️ Renewed {} for {}s", sid, timeout_secs);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, sid: &str) -> bool {
        let removed = self.subs.lock().remove(sid).is_some();
        if removed {
            info!("❌ Unsubscribed {}", sid);
        }
        removed
    }

    /// Supprime les abonnements expirés. Retourne leur nombre.
    pub fn expire(&self, now: Instant) -> usize {
        let mut subs = self.subs.lock();
        let before = subs.len();
        subs.retain(|sid, sub| {
            let keep = sub.expires > now;
            if !keep {
                debug!("⌛ Subscription {} expired", sid);
            }
            keep
        });
        before - subs.len()
    }

    pub fn is_active(&self, sid: &str) -> bool {
        self.subs.lock().contains_key(sid)
    }

    /// Cible de l'événement initial (SEQ 0). L'abonné reçoit ensuite les
    /// événements suivants : à appeler sous le verrou qui a produit
    /// l'instantané initial.
    pub fn take_initial_target(&self, sid: &str) -> Option<NotifyTarget> {
        self.subs.lock().get_mut(sid).map(|sub| {
            sub.ready = true;
            NotifyTarget {
                sid: sid.to_string(),
                callbacks: sub.callbacks.clone(),
                seq: 0,
            }
        })
    }

    /// Destinataires d'un événement du service, chacun avec son prochain SEQ.
    ///
    /// Le compteur est incrémenté à chaque appel ; après `u32::MAX` il
    /// repart à 1.
    pub fn targets(&self, udn: &str, service_id: &str) -> Vec<NotifyTarget> {
        let mut subs = self.subs.lock();
        subs.iter_mut()
            .filter(|(_, sub)| sub.ready && sub.udn == udn && sub.service_id == service_id)
            .map(|(sid, sub)| {
                sub.seq = if sub.seq == u32::MAX { 1 } else { sub.seq + 1 };
                NotifyTarget {
                    sid: sid.clone(),
                    callbacks: sub.callbacks.clone(),
                    seq: sub.seq,
                }
            })
            .collect()
    }

    pub fn has_subscribers(&self, udn: &str) -> bool {
        self.subs.lock().values().any(|sub| sub.udn == udn)
    }

    pub fn len(&self) -> usize {
        self.subs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extrait les URLs d'un en-tête `CALLBACK: <http://a/><http://b/>`.
pub fn parse_callbacks(header: &str) -> Vec<String> {
    header
        .split('<')
        .filter_map(|part| part.split('>').next())
        .map(str::trim)
        .filter(|url| url.starts_with("http://"))
        .map(str::to_string)
        .collect()
}

/// Interprète l'en-tête `TIMEOUT`. Absent, `infinite` ou hors borne :
/// [`DEFAULT_TIMEOUT_SECS`].
pub fn parse_timeout(header: Option<&str>) -> u64 {
    header
        .and_then(|h| {
            let h = h.trim();
            h.strip_prefix("Second-")
                .or_else(|| h.strip_prefix("second-"))
        })
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0 && *secs <= DEFAULT_TIMEOUT_SECS)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(
            parse_callbacks("<http://10.0.0.2:4000/ev><http://10.0.0.2:4001/ev>"),
            vec!["http://10.0.0.2:4000/ev", "http://10.0.0.2:4001/ev"]
        );
        assert!(parse_callbacks("").is_empty());
        assert!(parse_callbacks("<ftp://x/>").is_empty());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(Some("Second-300")), 300);
        assert_eq!(parse_timeout(Some("Second-infinite")), 1800);
        assert_eq!(parse_timeout(Some("Second-99999")), 1800);
        assert_eq!(parse_timeout(None), 1800);
    }

    #[test]
    fn test_seq_starts_after_initial_event() {
        let reg = SubscriptionRegistry::new();
        let sid = reg.subscribe("dev", "svc", vec!["http://h/cb".into()], 1800);
        // Pas encore d'événement initial : pas de cible
        assert!(reg.targets("dev", "svc").is_empty());
        assert_eq!(reg.take_initial_target(&sid).unwrap().seq, 0);
        assert_eq!(reg.targets("dev", "svc")[0].seq, 1);
        assert_eq!(reg.targets("dev", "svc")[0].seq, 2);
        assert!(reg.targets("dev", "other").is_empty());
    }

    #[test]
    fn test_renew_unsubscribe_and_expire() {
        let reg = SubscriptionRegistry::new();
        let sid = reg.subscribe("dev", "svc", vec![], 10);
        assert!(reg.renew(&sid, 20));
        assert!(!reg.renew("uuid:unknown", 20));

        assert_eq!(reg.expire(Instant::now()), 0);
        assert_eq!(reg.expire(Instant::now() + Duration::from_secs(30)), 1);
        assert!(!reg.is_active(&sid));

        let sid = reg.subscribe("dev", "svc", vec![], 10);
        assert!(reg.unsubscribe(&sid));
        assert!(!reg.unsubscribe(&sid));
        assert!(reg.is_empty());
    }
}
