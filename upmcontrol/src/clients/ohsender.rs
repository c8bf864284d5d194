use std::sync::Arc;

use upmdidl::parse_didl;

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, required};

pub const OH_SENDER_TYPE: &str = "urn:av-openhome-org:service:Sender:1";

/// Client OpenHome Sender : l'URI Songcast est la ressource des métadonnées.
#[derive(Debug, Clone)]
pub struct OhSenderClient {
    service: ServiceClient,
}

impl OhSenderClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, OH_SENDER_TYPE).map(Self::new)
    }

    pub fn metadata(&self) -> Result<String, ControlPointError> {
        let values = self.service.run_action("Metadata", &[])?;
        Ok(required(&values, "Metadata", "Value")?.to_string())
    }

    pub fn status(&self) -> Result<String, ControlPointError> {
        let values = self.service.run_action("Status", &[])?;
        Ok(required(&values, "Status", "Value")?.to_string())
    }

    /// URI et métadonnées à transmettre aux récepteurs
    pub fn uri_and_metadata(&self) -> Result<(String, String), ControlPointError> {
        let metadata = self.metadata()?;
        let uri = parse_didl(&metadata)?
            .iter()
            .find_map(|e| e.uri().map(|u| u.to_string()))
            .ok_or_else(|| ControlPointError::bad_response("sender metadata has no resource"))?;
        Ok((uri, metadata))
    }
}
