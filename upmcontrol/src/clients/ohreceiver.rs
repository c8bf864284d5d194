use std::sync::Arc;

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, required};

pub const OH_RECEIVER_TYPE: &str = "urn:av-openhome-org:service:Receiver:1";

/// Client OpenHome Receiver (Songcast)
#[derive(Debug, Clone)]
pub struct OhReceiverClient {
    service: ServiceClient,
}

impl OhReceiverClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, OH_RECEIVER_TYPE).map(Self::new)
    }

    pub fn play(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Play", &[])?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Stop", &[])?;
        Ok(())
    }

    pub fn set_sender(&self, uri: &str, metadata: &str) -> Result<(), ControlPointError> {
        self.service
            .run_action("SetSender", &[("Uri", uri), ("Metadata", metadata)])?;
        Ok(())
    }

    /// URI et métadonnées de l'émetteur courant
    pub fn sender(&self) -> Result<(String, String), ControlPointError> {
        let values = self.service.run_action("Sender", &[])?;
        Ok((
            required(&values, "Sender", "Uri")?.to_string(),
            required(&values, "Sender", "Metadata")?.to_string(),
        ))
    }

    pub fn transport_state(&self) -> Result<String, ControlPointError> {
        let values = self.service.run_action("TransportState", &[])?;
        Ok(required(&values, "TransportState", "Value")?.to_string())
    }
}
