use std::sync::Arc;

use upmupnp::soap::bool_to_wire;

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, required_bool, required_u32};

pub const RENDERING_CONTROL_TYPE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

const INSTANCE_ID: (&str, &str) = ("InstanceID", "0");
const MASTER: (&str, &str) = ("Channel", "Master");

/// Client RenderingControl:1, canal `Master`
#[derive(Debug, Clone)]
pub struct RenderingControlClient {
    service: ServiceClient,
}

impl RenderingControlClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, RENDERING_CONTROL_TYPE).map(Self::new)
    }

    pub fn get_volume(&self) -> Result<u32, ControlPointError> {
        let values = self.service.run_action("GetVolume", &[INSTANCE_ID, MASTER])?;
        required_u32(&values, "GetVolume", "CurrentVolume")
    }

    pub fn set_volume(&self, volume: u32) -> Result<(), ControlPointError> {
        let volume = volume.min(100).to_string();
        self.service.run_action(
            "SetVolume",
            &[INSTANCE_ID, MASTER, ("DesiredVolume", &volume)],
        )?;
        Ok(())
    }

    pub fn get_mute(&self) -> Result<bool, ControlPointError> {
        let values = self.service.run_action("GetMute", &[INSTANCE_ID, MASTER])?;
        required_bool(&values, "GetMute", "CurrentMute")
    }

    pub fn set_mute(&self, mute: bool) -> Result<(), ControlPointError> {
        self.service.run_action(
            "SetMute",
            &[INSTANCE_ID, MASTER, ("DesiredMute", bool_to_wire(mute))],
        )?;
        Ok(())
    }
}
