//! Parser SOAP pour actions UPnP

use std::collections::HashMap;
use std::io::BufReader;

use xmltree::Element;

/// Action UPnP extraite d'une enveloppe SOAP
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "Play", "SetAVTransportURI")
    pub name: String,

    /// Namespace de l'action (ex: "urn:schemas-upnp-org:service:AVTransport:1")
    pub namespace: Option<String>,

    /// Arguments de l'action
    pub args: HashMap<String, String>,
}

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,
}

/// Parse une action SOAP à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let root = Element::parse(BufReader::new(xml))?;
    let action_elem = body_child(&root)?;

    Ok(SoapAction {
        name: action_elem.name.clone(),
        namespace: action_elem.namespace.clone(),
        args: children_text(action_elem),
    })
}

/// Décode une réponse SOAP : nom de l'élément de réponse et ses enfants
/// immédiats sous forme nom → texte.
pub fn parse_soap_response(
    xml: &[u8],
) -> Result<(String, HashMap<String, String>), SoapParseError> {
    let root = Element::parse(BufReader::new(xml))?;
    let response = body_child(&root)?;
    Ok((response.name.clone(), children_text(response)))
}

fn body_child(root: &Element) -> Result<&Element, SoapParseError> {
    if root.name != "Envelope" {
        return Err(SoapParseError::MissingEnvelope);
    }

    let body = root
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .find(|e| e.name == "Body")
        .ok_or(SoapParseError::MissingBody)?;

    // Format: <u:ActionName xmlns:u="service-urn">...</u:ActionName>
    body.children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or(SoapParseError::NoAction)
}

fn children_text(elem: &Element) -> HashMap<String, String> {
    elem.children
        .iter()
        .filter_map(|n| n.as_element())
        .map(|child| {
            let value = child.get_text().map(|t| t.into_owned()).unwrap_or_default();
            (child.name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_action() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <InstanceID>0</InstanceID>
      <Speed>1</Speed>
    </u:Play>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Play");
        assert_eq!(
            action.namespace,
            Some("urn:schemas-upnp-org:service:AVTransport:1".to_string())
        );
        assert_eq!(action.args.get("InstanceID"), Some(&"0".to_string()));
        assert_eq!(action.args.get("Speed"), Some(&"1".to_string()));
    }

    #[test]
    fn test_parse_action_no_args() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Stop xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Stop");
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_parse_escaped_metadata_argument() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Insert xmlns:u="urn:av-openhome-org:service:Playlist:1">
      <AfterId>0</AfterId>
      <Uri>http://x/track.mp3</Uri>
      <Metadata>&lt;DIDL-Lite&gt;&lt;/DIDL-Lite&gt;</Metadata>
    </u:Insert>
  </s:Body>
</s:Envelope>"#;
        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.args["Metadata"], "<DIDL-Lite></DIDL-Lite>");
    }

    #[test]
    fn test_parse_response() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <Result>&lt;DIDL-Lite/&gt;</Result>
      <NumberReturned>0</NumberReturned>
      <TotalMatches>0</TotalMatches>
      <UpdateID>1</UpdateID>
    </u:BrowseResponse>
  </s:Body>
</s:Envelope>"#;
        let (name, args) = parse_soap_response(xml.as_bytes()).unwrap();
        assert_eq!(name, "BrowseResponse");
        assert_eq!(args["Result"], "<DIDL-Lite/>");
        assert_eq!(args["TotalMatches"], "0");
    }

    #[test]
    fn test_missing_body() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        assert!(matches!(
            parse_soap_action(xml.as_bytes()),
            Err(SoapParseError::MissingBody)
        ));
    }
}
