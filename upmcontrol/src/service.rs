use std::sync::Arc;

use tracing::debug;

use crate::description::{DeviceDescription, ServiceDescription};
use crate::errors::ControlPointError;
use crate::soap_client::{ActionInvoker, ActionResult};

/// Service distant lié à son device et au moteur d'appel SOAP.
///
/// Base commune des clients typés (AVTransport, ContentDirectory, ...).
#[derive(Clone)]
pub struct ServiceClient {
    invoker: Arc<dyn ActionInvoker>,
    udn: String,
    friendly_name: String,
    model_name: String,
    service: ServiceDescription,
}

impl ServiceClient {
    pub fn new(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
        service: &ServiceDescription,
    ) -> Self {
        Self {
            invoker,
            udn: device.udn.clone(),
            friendly_name: device.friendly_name.clone(),
            model_name: device.model_name.clone(),
            service: service.clone(),
        }
    }

    /// Client pour le premier service du type demandé exposé par `device`
    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
        service_type: &str,
    ) -> Result<Self, ControlPointError> {
        let service = device
            .find_service(service_type)
            .ok_or_else(|| ControlPointError::service_not_found(&device.friendly_name, service_type))?;
        Ok(Self::new(invoker, device, service))
    }

    pub fn run_action(
        &self,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<ActionResult, ControlPointError> {
        debug!(
            device = %self.friendly_name,
            service = %self.service.service_type,
            action,
            "run action"
        );
        self.invoker
            .invoke(&self.service.control_url, &self.service.service_type, action, args)
    }

    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn service_type(&self) -> &str {
        &self.service.service_type
    }

    pub fn control_url(&self) -> &str {
        &self.service.control_url
    }

    pub fn event_sub_url(&self) -> &str {
        &self.service.event_sub_url
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("device", &self.friendly_name)
            .field("service", &self.service.service_type)
            .finish()
    }
}
