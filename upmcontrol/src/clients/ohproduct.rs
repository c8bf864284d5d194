use std::sync::Arc;

use serde::Serialize;
use upmupnp::soap::{bool_to_wire, parse_bool};
use xmltree::Element;

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, required, required_bool, required_u32};

pub const OH_PRODUCT_TYPE: &str = "urn:av-openhome-org:service:Product:1";

/// Entrée de la liste `SourceXml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductSource {
    pub name: String,
    pub source_type: String,
    pub visible: bool,
}

/// Client OpenHome Product
#[derive(Debug, Clone)]
pub struct OhProductClient {
    service: ServiceClient,
}

impl OhProductClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, OH_PRODUCT_TYPE).map(Self::new)
    }

    pub fn sources(&self) -> Result<Vec<ProductSource>, ControlPointError> {
        let values = self.service.run_action("SourceXml", &[])?;
        parse_source_xml(required(&values, "SourceXml", "Value")?)
    }

    pub fn source_index(&self) -> Result<u32, ControlPointError> {
        let values = self.service.run_action("SourceIndex", &[])?;
        required_u32(&values, "SourceIndex", "Value")
    }

    pub fn set_source_index(&self, index: u32) -> Result<(), ControlPointError> {
        let index = index.to_string();
        self.service.run_action("SetSourceIndex", &[("Value", &index)])?;
        Ok(())
    }

    pub fn set_source_index_by_name(&self, name: &str) -> Result<(), ControlPointError> {
        self.service
            .run_action("SetSourceIndexByName", &[("Value", name)])?;
        Ok(())
    }

    /// Sélectionne la première source du type donné (`Playlist`, `Receiver`, ...)
    pub fn set_source_by_type(&self, source_type: &str) -> Result<(), ControlPointError> {
        let sources = self.sources()?;
        let index = sources
            .iter()
            .position(|s| s.source_type == source_type)
            .ok_or_else(|| ControlPointError::service_not_found(self.service.friendly_name(), source_type))?;
        self.set_source_index(index as u32)
    }

    /// Source active
    pub fn current_source(&self) -> Result<Option<ProductSource>, ControlPointError> {
        let sources = self.sources()?;
        let index = self.source_index()? as usize;
        Ok(sources.into_iter().nth(index))
    }

    pub fn standby(&self) -> Result<bool, ControlPointError> {
        let values = self.service.run_action("Standby", &[])?;
        required_bool(&values, "Standby", "Value")
    }

    pub fn set_standby(&self, standby: bool) -> Result<(), ControlPointError> {
        self.service
            .run_action("SetStandby", &[("Value", bool_to_wire(standby))])?;
        Ok(())
    }

    pub fn room(&self) -> Result<String, ControlPointError> {
        let values = self.service.run_action("Product", &[])?;
        Ok(required(&values, "Product", "Room")?.to_string())
    }
}

/// Décode le document `<SourceList><Source>...</Source></SourceList>`
pub fn parse_source_xml(xml: &str) -> Result<Vec<ProductSource>, ControlPointError> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ControlPointError::bad_response(format!("SourceXml: {}", e)))?;
    let text = |e: &Element, name: &str| {
        e.get_child(name)
            .and_then(|c| c.get_text())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    };

    Ok(root
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(|e| e.name == "Source")
        .map(|e| ProductSource {
            name: text(e, "Name"),
            source_type: text(e, "Type"),
            visible: parse_bool(&text(e, "Visible")).unwrap_or(false),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_xml() {
        let xml = "<SourceList><Source><Name>Playlist</Name><Type>Playlist</Type><Visible>true</Visible></Source>\
                   <Source><Name>Songcast</Name><Type>Receiver</Type><Visible>false</Visible></Source></SourceList>";
        let sources = parse_source_xml(xml).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].source_type, "Receiver");
        assert!(sources[0].visible);
        assert!(!sources[1].visible);
        assert!(parse_source_xml("nope").is_err());
    }
}
