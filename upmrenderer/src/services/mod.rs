//! Services UPnP AV et OpenHome du renderer.
//!
//! Chaque module expose `service()`, la déclaration complète du service
//! (actions, calcul d'état, style d'événements) pour un [`Device`] construit
//! sur [`RendererContext`] ; `contentdirectory` sert le Media Server.
//!
//! [`Device`]: upmupnp::Device
//! [`RendererContext`]: crate::context::RendererContext

pub mod avtransport;
pub mod conmanager;
pub mod contentdirectory;
pub mod ohinfo;
pub mod ohplaylist;
pub mod ohproduct;
pub mod ohradio;
pub mod ohreceiver;
pub mod ohtime;
pub mod ohvolume;
pub mod renderingcontrol;

use upmupnp::ActionError;

use crate::context::SourceKind;
use crate::player::{PlayerState, PlayerStatus};

/// `TransportState` des services OpenHome.
pub(crate) fn oh_transport_state(status: &PlayerStatus) -> &'static str {
    match status.state {
        PlayerState::Play => "Playing",
        PlayerState::Pause => "Paused",
        _ => "Stopped",
    }
}

/// Action refusée parce que la source n'est pas active.
pub(crate) fn inactive_source(kind: SourceKind) -> ActionError {
    ActionError::internal(format!("{} source is not active", kind))
}

/// `Seconds`/`Duration` d'OpenHome : 0 sans morceau.
pub(crate) fn song_secs(status: &PlayerStatus, ms: u32) -> String {
    if status.is_song() {
        (ms / 1000).to_string()
    } else {
        "0".to_string()
    }
}
