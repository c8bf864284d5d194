//! # upmcontrol - point de contrôle UPnP
//!
//! Découverte et pilotage de devices UPnP/OpenHome distants.
//!
//! ## Fonctionnalités
//!
//! - ✅ Analyse des descriptions de devices ([`description`])
//! - ✅ Annuaire de découverte avec expiration et fenêtre de recherche ([`discovery`])
//! - ✅ Appels SOAP, arguments ordonnés, décodage des fautes ([`soap_client`])
//! - ✅ Lecture paginée des ContentDirectory ([`cdirectory`])
//! - ✅ Abonnements aux événements ([`events`])
//! - ✅ Clients AVTransport, RenderingControl, OHProduct, OHReceiver, OHSender ([`clients`])
//! - ✅ Commande Songcast des récepteurs ([`songcast`])
//!
//! ## Exemple
//!
//! ```no_run
//! use std::sync::Arc;
//! use upmcontrol::{ContentDirectoryClient, DiscoveryDirectory, DiscoveryOptions, UreqInvoker};
//! use upmdidl::DirContent;
//!
//! let directory = DiscoveryDirectory::with_ssdp(DiscoveryOptions::default())?;
//! if let Some(server) = directory.get_device_by_name("MiniDLNA") {
//!     let cd = ContentDirectoryClient::for_device(Arc::new(UreqInvoker::default()), &server)?;
//!     let mut dir = DirContent::new();
//!     cd.read_dir("0", &mut dir)?;
//!     println!("{} entries", dir.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cdirectory;
pub mod clients;
pub mod description;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod service;
pub mod soap_client;
pub mod songcast;

pub use cdirectory::{CONTENT_DIRECTORY_TYPE, ContentDirectoryClient, ServerKind, Slice};
pub use description::{DeviceDescription, ServiceDescription};
pub use discovery::{
    DescriptionFetcher, DiscoveryDirectory, DiscoveryEvent, DiscoveryOptions, RemoteDevice,
    Searcher,
};
pub use errors::ControlPointError;
pub use events::{EventListener, PropertySet, decode_lastchange, parse_propertyset};
pub use service::ServiceClient;
pub use soap_client::{ActionInvoker, ActionResult, UreqInvoker};
pub use songcast::{ReceiverState, ReceiverStatus, SenderState, Songcast};

