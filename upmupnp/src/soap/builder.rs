//! Construction de réponses et de requêtes SOAP

use xmltree::{Element, XMLNode};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

pub(crate) fn envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENV_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false);
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn action_element<'a, I>(name: String, service_urn: &str, args: I) -> Element
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut elem = Element::new(&name);
    elem.attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());
    for (key, value) in args {
        let mut child = Element::new(key);
        if !value.is_empty() {
            child.children.push(XMLNode::Text(value.to_string()));
        }
        elem.children.push(XMLNode::Element(child));
    }
    elem
}

/// Construit une réponse SOAP UPnP
///
/// Les arguments sont émis dans l'ordre du vecteur : certains points de
/// contrôle refusent une réponse dont les arguments sont réordonnés.
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - Nom de l'action (ex: "GetPositionInfo")
/// * `values` - Valeurs de retour ordonnées
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: Vec<(String, String)>,
) -> Result<String, xmltree::Error> {
    let elem = action_element(
        format!("u:{}Response", action),
        service_urn,
        values.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );
    envelope_with_body(elem)
}

/// Construit une requête SOAP (côté point de contrôle).
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let elem = action_element(
        format!("u:{}", action),
        service_urn,
        args.iter().map(|(k, v)| (*k, *v)),
    );
    envelope_with_body(elem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response_keeps_order() {
        let values = vec![
            ("Track".to_string(), "5".to_string()),
            ("TrackDuration".to_string(), "0:03:45".to_string()),
            ("AbsCount".to_string(), "0".to_string()),
        ];

        let xml = build_soap_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetPositionInfo",
            values,
        )
        .unwrap();

        assert!(xml.contains("GetPositionInfoResponse"));
        let track = xml.find("<Track>5</Track>").unwrap();
        let duration = xml.find("<TrackDuration>0:03:45</TrackDuration>").unwrap();
        let abscount = xml.find("<AbsCount>0</AbsCount>").unwrap();
        assert!(track < duration && duration < abscount);
        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
    }

    #[test]
    fn test_build_request_escapes_values() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://h/a?b=1&c=2"),
                ("CurrentURIMetaData", ""),
            ],
        )
        .unwrap();
        assert!(xml.contains("<u:SetAVTransportURI"));
        assert!(xml.contains("http://h/a?b=1&amp;c=2"));
        assert!(xml.contains("<CurrentURIMetaData />") || xml.contains("<CurrentURIMetaData/>"));
    }
}
