//! # Module SOAP - Simple Object Access Protocol
//!
//! Support SOAP pour UPnP, côté device (décodage des appels, réponses, fautes)
//! et côté point de contrôle (construction des requêtes).
//!
//! ## Fonctionnalités
//!
//! - ✅ Parsing d'enveloppes SOAP
//! - ✅ Extraction d'actions UPnP avec arguments
//! - ✅ Construction de réponses SOAP, arguments dans l'ordre déclaré
//! - ✅ Gestion des SOAP Faults
//! - ✅ Codage des booléens et entiers UPnP
//!
//! ## Example
//!
//! ```
//! use upmupnp::soap::{parse_soap_action, build_soap_response};
//!
//! let body = r#"<?xml version="1.0"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
//!       <InstanceID>0</InstanceID>
//!       <Speed>1</Speed>
//!     </u:Play>
//!   </s:Body>
//! </s:Envelope>"#;
//!
//! let action = parse_soap_action(body.as_bytes()).unwrap();
//! assert_eq!(action.name, "Play");
//! assert_eq!(action.args.get("InstanceID"), Some(&"0".to_string()));
//!
//! let response = build_soap_response(
//!     "urn:schemas-upnp-org:service:AVTransport:1",
//!     "GetTransportSettings",
//!     vec![("PlayMode".to_string(), "NORMAL".to_string())],
//! ).unwrap();
//! assert!(response.contains("<PlayMode>NORMAL</PlayMode>"));
//! ```

mod builder;
mod fault;
mod parser;
mod values;

pub use builder::{build_soap_request, build_soap_response};
pub use fault::{UpnpFault, build_soap_fault, parse_soap_fault};
pub use parser::{SoapAction, SoapParseError, parse_soap_action, parse_soap_response};
pub use values::{bool_to_wire, parse_bool, parse_i32, parse_u32, xml_quote};

/// Codes d'erreur SOAP UPnP standards
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u16 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u16 = 402;

    /// Action échouée
    pub const ACTION_FAILED: u16 = 501;

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: u16 = 600;

    /// Argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u16 = 601;

    /// Mémoire insuffisante
    pub const OUT_OF_MEMORY: u16 = 603;

    /// AVTransport : identifiant d'instance invalide
    pub const AVT_INVALID_INSTANCE_ID: u16 = 718;

    /// OpenHome Playlist : identifiant inconnu
    pub const OH_ID_NOT_FOUND: u16 = 800;

    /// OpenHome Playlist : playlist pleine
    pub const OH_PLAYLIST_FULL: u16 = 801;
}
