//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Annonces et recherche des devices UPnP sur le réseau local.
//!
//! ## Fonctionnalités
//!
//! - ✅ Envoi de NOTIFY alive/byebye en multicast
//! - ✅ Réponse aux M-SEARCH en unicast, après un délai aléatoire borné par MX
//! - ✅ Annonces périodiques (Max-Age/2)
//! - ✅ Client M-SEARCH sur port éphémère, réception des réponses et des NOTIFY
//!
//! ## Constantes SSDP
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age**: 1800 secondes

mod client;
mod device;
mod server;

pub use client::{SsdpClient, SsdpEvent, parse_message};
pub use device::SsdpDevice;
pub use server::{SsdpServer, alive_message, byebye_message, search_response};

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité des annonces (en secondes)
pub const MAX_AGE: u32 = 1800;

/// Délai maximal de réponse à un M-SEARCH, quel que soit le MX demandé
pub const MAX_MX: u32 = 5;

pub fn multicast_target() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT))
}

/// USN d'un type de notification : `uuid:<id>` seul ou `uuid:<id>::<nt>`.
pub fn usn_for(uuid: &str, nt: &str) -> String {
    if nt.starts_with("uuid:") {
        nt.to_string()
    } else {
        format!("uuid:{}::{}", uuid, nt)
    }
}
