//! SOAP Faults pour UPnP

use std::io::BufReader;

use xmltree::{Element, XMLNode};

use super::builder::envelope_with_body;

/// Erreur UPnP extraite du `detail` d'un SOAP Fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    /// Code d'erreur UPnP (ex: 401, 718, 800)
    pub code: u16,

    /// Description de l'erreur
    pub description: String,
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

/// Construit un SOAP Fault XML
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message d'erreur (ex: "UPnPError")
/// * `upnp_error` - Code et description UPnP optionnels
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error: Option<(u16, &str)>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");
    fault
        .children
        .push(XMLNode::Element(text_element("faultcode", fault_code)));
    fault
        .children
        .push(XMLNode::Element(text_element("faultstring", fault_string)));

    if let Some((code, desc)) = upnp_error {
        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );
        upnp_error
            .children
            .push(XMLNode::Element(text_element("errorCode", &code.to_string())));
        upnp_error
            .children
            .push(XMLNode::Element(text_element("errorDescription", desc)));

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    envelope_with_body(fault)
}

fn find_descendant<'a>(elem: &'a Element, local_name: &str) -> Option<&'a Element> {
    for child in elem.children.iter().filter_map(|n| n.as_element()) {
        if child.name == local_name {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, local_name) {
            return Some(found);
        }
    }
    None
}

/// Extrait l'erreur UPnP d'un document SOAP Fault.
///
/// Retourne `None` si le document n'est pas un fault UPnP exploitable.
pub fn parse_soap_fault(xml: &[u8]) -> Option<UpnpFault> {
    let root = Element::parse(BufReader::new(xml)).ok()?;
    let upnp_error = find_descendant(&root, "UPnPError")?;
    let code = upnp_error
        .get_child("errorCode")?
        .get_text()?
        .trim()
        .parse::<u16>()
        .ok()?;
    let description = upnp_error
        .get_child("errorDescription")
        .and_then(|e| e.get_text())
        .map(|t| t.to_string())
        .unwrap_or_default();
    Some(UpnpFault { code, description })
}
