//! Eventing GENA : abonnements, NOTIFY et boucle de publication.

pub mod notify;
pub mod publisher;
pub mod subscriptions;

pub use notify::{EventSender, propertyset};
pub use publisher::{FULL_STATE_EVERY, POLL_INTERVAL, run_event_loop};
pub use subscriptions::{
    DEFAULT_TIMEOUT_SECS, NotifyTarget, SubscriptionRegistry, parse_callbacks, parse_timeout,
};
