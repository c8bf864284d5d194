//! Boucle de publication des événements d'un device.
//!
//! Relevé toutes les secondes, état complet tous les dix relevés. Un réveil
//! explicite (après une action) déclenche un relevé immédiat, sauf si le
//! précédent date de moins d'une seconde : le relevé est alors repoussé à la
//! fin de cette seconde.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::notify::EventSender;
use crate::device::UpnpDevice;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const FULL_STATE_EVERY: u64 = 10;

/// Exécute la boucle jusqu'à ce que `shutdown` passe à `true`.
pub async fn run_event_loop(
    device: Arc<dyn UpnpDevice>,
    sender: EventSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let udn = device.info().udn.clone();
    let waker = device.waker();
    let mut loopcount: u64 = 0;
    let mut last_poll: Option<Instant> = None;

    info!("✅ Event loop started for {}", device.info().friendly_name);
    loop {
        let woken = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = waker.woken() => true,
            _ = tokio::time::sleep(POLL_INTERVAL) => false,
        };

        if woken {
            if let Some(last) = last_poll {
                let since = last.elapsed();
                if since < POLL_INTERVAL {
                    tokio::time::sleep(POLL_INTERVAL - since).await;
                }
            }
        }
        last_poll = Some(Instant::now());

        loopcount += 1;
        let all = loopcount % FULL_STATE_EVERY == 0;
        let expired = sender.registry().expire(Instant::now());
        if expired > 0 {
            debug!("{} expired subscription(s) removed", expired);
        }

        let dev = Arc::clone(&device);
        let events = match tokio::task::spawn_blocking(move || dev.event_data(all)).await {
            Ok(events) => events,
            Err(e) => {
                error!("❌ Event data collection failed: {}", e);
                continue;
            }
        };
        for event in events {
            sender
                .publish(&udn, event.service_id, &event.properties)
                .await;
        }
    }
    info!("🛑 Event loop stopped for {}", device.info().friendly_name);
}
