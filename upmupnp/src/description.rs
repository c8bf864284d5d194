//! Documents de description : device (`description.xml`) et services (SCPD).

use std::collections::BTreeMap;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::device::{DeviceInfo, ServiceInfo};
use crate::dispatch::ArgKind;

const DEVICE_NS: &str = "urn:schemas-upnp-org:device-1-0";
const SERVICE_NS: &str = "urn:schemas-upnp-org:service-1-0";

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

fn push_text(parent: &mut Element, name: &str, text: &str) {
    parent.children.push(XMLNode::Element(text_element(name, text)));
}

fn spec_version() -> Element {
    let mut spec = Element::new("specVersion");
    push_text(&mut spec, "major", "1");
    push_text(&mut spec, "minor", "0");
    spec
}

fn to_xml(root: &Element) -> String {
    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(true);
    if root.write_with_config(&mut buf, config).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Chemins HTTP d'un service, relatifs à la racine du serveur.
pub fn service_paths(udn: &str, service: &ServiceInfo) -> (String, String, String) {
    let base = format!("/{}/{}", udn, service.short_name());
    (
        format!("{}/scpd.xml", base),
        format!("{}/control", base),
        format!("{}/event", base),
    )
}

pub fn description_path(udn: &str) -> String {
    format!("/{}/description.xml", udn)
}

/// Description du device racine.
pub fn device_description(info: &DeviceInfo, services: &[ServiceInfo], base_url: &str) -> String {
    let mut root = Element::new("root");
    root.attributes
        .insert("xmlns".to_string(), DEVICE_NS.to_string());
    root.children.push(XMLNode::Element(spec_version()));
    push_text(&mut root, "URLBase", base_url);

    let mut device = Element::new("device");
    push_text(&mut device, "deviceType", &info.device_type);
    push_text(&mut device, "friendlyName", &info.friendly_name);
    push_text(&mut device, "manufacturer", &info.manufacturer);
    if !info.manufacturer_url.is_empty() {
        push_text(&mut device, "manufacturerURL", &info.manufacturer_url);
    }
    if !info.model_description.is_empty() {
        push_text(&mut device, "modelDescription", &info.model_description);
    }
    push_text(&mut device, "modelName", &info.model_name);
    if !info.model_number.is_empty() {
        push_text(&mut device, "modelNumber", &info.model_number);
    }
    push_text(&mut device, "UDN", &format!("uuid:{}", info.udn));

    let mut service_list = Element::new("serviceList");
    for service in services {
        let (scpd, control, event) = service_paths(&info.udn, service);
        let mut elem = Element::new("service");
        push_text(&mut elem, "serviceType", service.service_type);
        push_text(&mut elem, "serviceId", service.service_id);
        push_text(&mut elem, "SCPDURL", &scpd);
        push_text(&mut elem, "controlURL", &control);
        push_text(&mut elem, "eventSubURL", &event);
        service_list.children.push(XMLNode::Element(elem));
    }
    device.children.push(XMLNode::Element(service_list));
    root.children.push(XMLNode::Element(device));

    to_xml(&root)
}

fn argument(name: &str, direction: &str) -> Element {
    let mut arg = Element::new("argument");
    push_text(&mut arg, "name", name);
    push_text(&mut arg, "direction", direction);
    push_text(&mut arg, "relatedStateVariable", &format!("A_ARG_TYPE_{}", name));
    arg
}

fn state_variable(name: &str, data_type: &str, evented: bool) -> Element {
    let mut var = Element::new("stateVariable");
    var.attributes.insert(
        "sendEvents".to_string(),
        if evented { "yes" } else { "no" }.to_string(),
    );
    push_text(&mut var, "name", name);
    push_text(&mut var, "dataType", data_type);
    var
}

/// Description SCPD d'un service.
///
/// Chaque argument est rattaché à une variable `A_ARG_TYPE_<nom>` ; les
/// variables évènementielles sont déclarées en chaînes.
pub fn scpd(service: &ServiceInfo, evented_vars: &[String]) -> String {
    let mut root = Element::new("scpd");
    root.attributes
        .insert("xmlns".to_string(), SERVICE_NS.to_string());
    root.children.push(XMLNode::Element(spec_version()));

    let mut arg_types: BTreeMap<String, ArgKind> = BTreeMap::new();
    let mut action_list = Element::new("actionList");
    for action in &service.actions {
        let mut elem = Element::new("action");
        push_text(&mut elem, "name", action.name);
        if !action.args.is_empty() || !action.outs.is_empty() {
            let mut args = Element::new("argumentList");
            for spec in action.args {
                args.children.push(XMLNode::Element(argument(spec.name, "in")));
                arg_types.entry(spec.name.to_string()).or_insert(spec.kind);
            }
            for out in action.outs {
                args.children.push(XMLNode::Element(argument(out, "out")));
                arg_types
                    .entry(out.to_string())
                    .or_insert(ArgKind::String);
            }
            elem.children.push(XMLNode::Element(args));
        }
        action_list.children.push(XMLNode::Element(elem));
    }
    root.children.push(XMLNode::Element(action_list));

    let mut table = Element::new("serviceStateTable");
    for var in evented_vars {
        table
            .children
            .push(XMLNode::Element(state_variable(var, "string", true)));
    }
    for (name, kind) in &arg_types {
        table.children.push(XMLNode::Element(state_variable(
            &format!("A_ARG_TYPE_{}", name),
            kind.upnp_type(),
            false,
        )));
    }
    root.children.push(XMLNode::Element(table));

    to_xml(&root)
}
