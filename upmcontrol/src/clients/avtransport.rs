use std::sync::Arc;

use serde::Serialize;
use upmdidl::{upnp_duration, upnp_duration_to_secs};

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, required, required_u32};

pub const AV_TRANSPORT_TYPE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

const INSTANCE_ID: (&str, &str) = ("InstanceID", "0");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration_secs: Option<u32>,
    pub track_metadata: String,
    pub track_uri: String,
    pub rel_time_secs: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportInfo {
    pub state: String,
    pub status: String,
    pub speed: String,
}

/// Client AVTransport:1 (instance 0)
#[derive(Debug, Clone)]
pub struct AvTransportClient {
    service: ServiceClient,
}

impl AvTransportClient {
    pub fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, AV_TRANSPORT_TYPE).map(Self::new)
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    pub fn set_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlPointError> {
        self.service.run_action(
            "SetAVTransportURI",
            &[INSTANCE_ID, ("CurrentURI", uri), ("CurrentURIMetaData", metadata)],
        )?;
        Ok(())
    }

    pub fn set_next_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlPointError> {
        self.service.run_action(
            "SetNextAVTransportURI",
            &[INSTANCE_ID, ("NextURI", uri), ("NextURIMetaData", metadata)],
        )?;
        Ok(())
    }

    pub fn play(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Play", &[INSTANCE_ID, ("Speed", "1")])?;
        Ok(())
    }

    pub fn pause(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Pause", &[INSTANCE_ID])?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Stop", &[INSTANCE_ID])?;
        Ok(())
    }

    pub fn next(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Next", &[INSTANCE_ID])?;
        Ok(())
    }

    pub fn previous(&self) -> Result<(), ControlPointError> {
        self.service.run_action("Previous", &[INSTANCE_ID])?;
        Ok(())
    }

    /// Positionnement absolu dans le morceau courant
    pub fn seek(&self, secs: u32) -> Result<(), ControlPointError> {
        let target = upnp_duration(u64::from(secs) * 1000);
        self.service.run_action(
            "Seek",
            &[INSTANCE_ID, ("Unit", "REL_TIME"), ("Target", &target)],
        )?;
        Ok(())
    }

    pub fn get_position_info(&self) -> Result<PositionInfo, ControlPointError> {
        let action = "GetPositionInfo";
        let values = self.service.run_action(action, &[INSTANCE_ID])?;
        Ok(PositionInfo {
            track: required_u32(&values, action, "Track")?,
            track_duration_secs: upnp_duration_to_secs(required(&values, action, "TrackDuration")?),
            track_metadata: required(&values, action, "TrackMetaData")?.to_string(),
            track_uri: required(&values, action, "TrackURI")?.to_string(),
            rel_time_secs: upnp_duration_to_secs(required(&values, action, "RelTime")?),
        })
    }

    pub fn get_transport_info(&self) -> Result<TransportInfo, ControlPointError> {
        let action = "GetTransportInfo";
        let values = self.service.run_action(action, &[INSTANCE_ID])?;
        Ok(TransportInfo {
            state: required(&values, action, "CurrentTransportState")?.to_string(),
            status: required(&values, action, "CurrentTransportStatus")?.to_string(),
            speed: required(&values, action, "CurrentSpeed")?.to_string(),
        })
    }

    pub fn get_play_mode(&self) -> Result<String, ControlPointError> {
        let action = "GetTransportSettings";
        let values = self.service.run_action(action, &[INSTANCE_ID])?;
        Ok(required(&values, action, "PlayMode")?.to_string())
    }

    pub fn set_play_mode(&self, mode: &str) -> Result<(), ControlPointError> {
        self.service
            .run_action("SetPlayMode", &[INSTANCE_ID, ("NewPlayMode", mode)])?;
        Ok(())
    }
}
