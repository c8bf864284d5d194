//! Pilotage Songcast : état des récepteurs OpenHome, association à un émetteur.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clients::{
    OH_PRODUCT_TYPE, OH_RECEIVER_TYPE, OH_SENDER_TYPE, OhProductClient, OhReceiverClient,
    OhSenderClient,
};
use crate::description::DeviceDescription;
use crate::discovery::DiscoveryDirectory;
use crate::errors::ControlPointError;
use crate::soap_client::ActionInvoker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiverStatus {
    /// Erreur lors de l'interrogation
    Error,
    /// Pas de service Product/Receiver
    NoOpenHome,
    /// La source active n'est pas le récepteur
    NotReceiver,
    Stopped,
    Playing,
}

impl ReceiverStatus {
    pub fn label(self) -> &'static str {
        match self {
            ReceiverStatus::Error => "Error",
            ReceiverStatus::NoOpenHome => "Nooh",
            ReceiverStatus::NotReceiver => "Off",
            ReceiverStatus::Stopped => "Stop",
            ReceiverStatus::Playing => "Play",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverState {
    pub status: ReceiverStatus,
    pub name: String,
    pub udn: String,
    pub uri: String,
    pub metadata: String,
    pub reason: String,
    #[serde(skip)]
    product: Option<OhProductClient>,
    #[serde(skip)]
    receiver: Option<OhReceiverClient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderState {
    pub name: String,
    pub udn: String,
    pub uri: String,
    pub metadata: String,
    pub reason: String,
}

/// Opérations Songcast sur les devices de l'annuaire
pub struct Songcast<'a> {
    directory: &'a DiscoveryDirectory,
    invoker: Arc<dyn ActionInvoker>,
}

impl<'a> Songcast<'a> {
    pub fn new(directory: &'a DiscoveryDirectory, invoker: Arc<dyn ActionInvoker>) -> Self {
        Self { directory, invoker }
    }

    /// Devices exposant un service Receiver
    pub fn list_receivers(&self) -> Vec<ReceiverState> {
        self.directory
            .devices()
            .iter()
            .filter(|d| d.has_service(OH_RECEIVER_TYPE))
            .map(|d| self.receiver_state(d))
            .collect()
    }

    /// Devices exposant un service Sender
    pub fn list_senders(&self) -> Vec<SenderState> {
        self.directory
            .devices()
            .iter()
            .filter(|d| d.has_service(OH_SENDER_TYPE))
            .map(|d| self.sender_state(d))
            .collect()
    }

    fn device(&self, name: &str) -> Result<DeviceDescription, ControlPointError> {
        self.directory
            .get_device_by_name(name)
            .ok_or_else(|| ControlPointError::DeviceNotFound(name.to_string()))
    }

    pub fn get_receiver_state(&self, name: &str) -> Result<ReceiverState, ControlPointError> {
        Ok(self.receiver_state(&self.device(name)?))
    }

    fn receiver_state(&self, device: &DeviceDescription) -> ReceiverState {
        let mut state = ReceiverState {
            status: ReceiverStatus::NoOpenHome,
            name: device.friendly_name.clone(),
            udn: device.udn.clone(),
            uri: String::new(),
            metadata: String::new(),
            reason: String::new(),
            product: None,
            receiver: None,
        };

        if !device.has_service(OH_PRODUCT_TYPE) || !device.has_service(OH_RECEIVER_TYPE) {
            return state;
        }
        let result = OhProductClient::for_device(Arc::clone(&self.invoker), device).and_then(|product| {
            let receiver = OhReceiverClient::for_device(Arc::clone(&self.invoker), device)?;
            let current = product.current_source()?;
            let is_receiver = current.is_some_and(|s| s.source_type == "Receiver");
            state.status = if !is_receiver {
                ReceiverStatus::NotReceiver
            } else if receiver.transport_state()? == "Playing" {
                ReceiverStatus::Playing
            } else {
                ReceiverStatus::Stopped
            };
            let (uri, metadata) = receiver.sender()?;
            state.uri = uri;
            state.metadata = metadata;
            state.product = Some(product);
            state.receiver = Some(receiver);
            Ok(())
        });

        if let Err(e) = result {
            warn!(device = %device.friendly_name, error = %e, "cannot get receiver state");
            state.status = ReceiverStatus::Error;
            state.reason = e.to_string();
        }
        state
    }

    fn sender_state(&self, device: &DeviceDescription) -> SenderState {
        let mut state = SenderState {
            name: device.friendly_name.clone(),
            udn: device.udn.clone(),
            uri: String::new(),
            metadata: String::new(),
            reason: String::new(),
        };
        match OhSenderClient::for_device(Arc::clone(&self.invoker), device)
            .and_then(|sender| sender.uri_and_metadata())
        {
            Ok((uri, metadata)) => {
                state.uri = uri;
                state.metadata = metadata;
            }
            Err(e) => state.reason = e.to_string(),
        }
        state
    }

    /// Passe le device en source Receiver et le fait jouer `uri`.
    pub fn set_receiver_playing(
        &self,
        state: &ReceiverState,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ControlPointError> {
        let (Some(product), Some(receiver)) = (&state.product, &state.receiver) else {
            return Err(ControlPointError::service_not_found(&state.name, OH_RECEIVER_TYPE));
        };
        debug!(device = %state.name, uri, "switching to receiver");
        product.set_source_by_type("Receiver")?;
        receiver.set_sender(uri, metadata)?;
        receiver.play()
    }

    /// Arrête le récepteur et revient à la source Playlist.
    pub fn stop_receiver(&self, state: &ReceiverState) -> Result<(), ControlPointError> {
        let (Some(product), Some(receiver)) = (&state.product, &state.receiver) else {
            return Err(ControlPointError::service_not_found(&state.name, OH_RECEIVER_TYPE));
        };
        receiver.stop()?;
        product.set_source_by_type("Playlist")
    }

    /// Les esclaves jouent le même flux que le récepteur maître.
    pub fn set_receivers_from_receiver(
        &self,
        master: &str,
        slaves: &[String],
    ) -> Result<(), ControlPointError> {
        let master = self.get_receiver_state(master)?;
        if master.status != ReceiverStatus::Playing {
            return Err(ControlPointError::InvalidState(format!(
                "{} is not a playing receiver",
                master.name
            )));
        }
        self.start_slaves(&master.uri, &master.metadata, slaves)
    }

    /// Les récepteurs jouent le flux d'un émetteur.
    pub fn set_receivers_from_sender(
        &self,
        sender: &str,
        receivers: &[String],
    ) -> Result<(), ControlPointError> {
        let device = self.device(sender)?;
        let (uri, metadata) =
            OhSenderClient::for_device(Arc::clone(&self.invoker), &device)?.uri_and_metadata()?;
        self.start_slaves(&uri, &metadata, receivers)
    }

    fn start_slaves(&self, uri: &str, metadata: &str, slaves: &[String]) -> Result<(), ControlPointError> {
        let mut last_error = None;
        for slave in slaves {
            let result = self
                .get_receiver_state(slave)
                .and_then(|state| self.set_receiver_playing(&state, uri, metadata));
            if let Err(e) = result {
                warn!(device = %slave, error = %e, "cannot set up receiver");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    pub fn stop_receivers(&self, names: &[String]) -> Result<(), ControlPointError> {
        let mut last_error = None;
        for name in names {
            let result = self
                .get_receiver_state(name)
                .and_then(|state| self.stop_receiver(&state));
            if let Err(e) = result {
                warn!(device = %name, error = %e, "cannot stop receiver");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    pub fn set_source_index(&self, name: &str, index: u32) -> Result<(), ControlPointError> {
        let device = self.device(name)?;
        OhProductClient::for_device(Arc::clone(&self.invoker), &device)?.set_source_index(index)
    }

    pub fn set_source_index_by_name(&self, name: &str, source: &str) -> Result<(), ControlPointError> {
        let device = self.device(name)?;
        OhProductClient::for_device(Arc::clone(&self.invoker), &device)?.set_source_index_by_name(source)
    }
}
