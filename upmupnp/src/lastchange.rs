//! Documents `LastChange` (AVTransport, RenderingControl).

use crate::soap::xml_quote;
use crate::state::StateVariableMap;

/// Namespace des événements AVTransport.
pub const AVT_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/AVT_RCS";

/// Namespace des événements RenderingControl.
pub const RCS_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/RCS/";

/// Sérialise les variables modifiées de l'instance 0.
///
/// Les variables listées dans `channel_vars` reçoivent l'attribut
/// `channel="Master"` (Volume, Mute... de RenderingControl).
pub fn lastchange_document(
    namespace: &str,
    changed: &StateVariableMap,
    channel_vars: &[&str],
) -> String {
    let mut doc = format!("<Event xmlns=\"{}\">\n<InstanceID val=\"0\">\n", namespace);
    for (name, value) in changed {
        doc.push('<');
        doc.push_str(name);
        if channel_vars.contains(&name.as_str()) {
            doc.push_str(" channel=\"Master\"");
        }
        doc.push_str(" val=\"");
        doc.push_str(&xml_quote(value));
        doc.push_str("\"/>\n");
    }
    doc.push_str("</InstanceID>\n</Event>\n");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_map;

    #[test]
    fn test_document_layout() {
        let changed = state_map([("TransportState", "PLAYING"), ("CurrentTrackURI", "http://a/b?x&y")]);
        let doc = lastchange_document(AVT_NAMESPACE, &changed, &[]);
        assert_eq!(
            doc,
            "<Event xmlns=\"urn:schemas-upnp-org:metadata-1-0/AVT_RCS\">\n\
             <InstanceID val=\"0\">\n\
             <CurrentTrackURI val=\"http://a/b?x&amp;y\"/>\n\
             <TransportState val=\"PLAYING\"/>\n\
             </InstanceID>\n</Event>\n"
        );
    }

    #[test]
    fn test_channel_attribute() {
        let changed = state_map([("Volume", "30")]);
        let doc = lastchange_document(RCS_NAMESPACE, &changed, &["Volume"]);
        assert!(doc.contains("<Volume channel=\"Master\" val=\"30\"/>"));
    }
}
