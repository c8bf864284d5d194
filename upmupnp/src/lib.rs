//! # upmupnp - moteur UPnP côté device
//!
//! Cette crate fournit tout ce dont un device UPnP/OpenHome a besoin pour
//! exposer des services sur le réseau :
//!
//! - ✅ Codage/décodage SOAP ([`soap`])
//! - ✅ Tables d'actions typées et dispatch ([`dispatch`], [`device`])
//! - ✅ Stockage des variables d'état et calcul des différences ([`state`])
//! - ✅ Documents `LastChange` ([`lastchange`])
//! - ✅ Abonnements et publication des événements ([`eventing`])
//! - ✅ Annonces et recherche SSDP ([`ssdp`])
//! - ✅ Serveur HTTP axum (description, contrôle, événements) ([`server`])
//! - ✅ File de travail mono-worker avec arrêt propre ([`workqueue`])
//!
//! Le contexte applicatif (lecteur, adaptateurs de services) est fourni par
//! l'appelant : aucun singleton global n'est utilisé dans la bibliothèque.

pub mod description;
pub mod device;
pub mod dispatch;
pub mod errors;
pub mod eventing;
pub mod lastchange;
pub mod netif;
pub mod server;
pub mod soap;
pub mod ssdp;
pub mod state;
pub mod workqueue;

pub use device::{Device, DeviceInfo, EventWaker, ServiceDef, UpnpDevice};
pub use dispatch::{ActionSpec, ArgKind, ArgSpec, ArgValue, PendingAction, SoapOutgoing};
pub use errors::ActionError;
pub use state::{StateVariableMap, diff_state};
pub use server::UpnpServer;
pub use workqueue::WorkQueue;
