//! Contexte partagé par les services du renderer.
//!
//! Un seul [`RendererContext`] vit derrière le verrou du device : les
//! handlers d'actions et les relevés d'état y accèdent l'un après l'autre.
//! Il porte le lecteur, l'état du lecteur mis en cache pour un relevé, et
//! l'état propre à chaque service (ombre AVTransport, cache de métadonnées
//! OpenHome, sources, radios, récepteur).

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use upmconfig::{Config, ProductInfo, RadioDef};
use upmupnp::ActionError;
use upmupnp::errors::ActionResult;

use crate::metacache::{CacheSaver, MetaCache};
use crate::player::{Player, PlayerResult, PlayerStatus};
use crate::protocolinfo::ProtocolInfo;
use crate::services::avtransport::AvtState;
use crate::services::ohplaylist::{self, PlaylistState};
use crate::services::ohradio::{self, RadioState};
use crate::services::ohreceiver::{self, ReceiverState};
use crate::volume::MuteState;

/// Au-delà, l'état du lecteur est relu avant usage.
const STATUS_MAX_AGE: Duration = Duration::from_millis(300);

/// Options du renderer issues de la configuration.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub ownqueue: bool,
    pub check_content_format: bool,
    pub upnpav: bool,
    pub openhome: bool,
    /// Source `Receiver` (Songcast)
    pub receiver: bool,
    pub sc_stream_url: String,
    pub radios: Vec<RadioDef>,
    pub room: String,
    pub manufacturer: ProductInfo,
    pub model: ProductInfo,
    pub product: ProductInfo,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            ownqueue: true,
            check_content_format: true,
            upnpav: true,
            openhome: true,
            receiver: false,
            sc_stream_url: String::new(),
            radios: Vec::new(),
            room: String::new(),
            manufacturer: ProductInfo::default(),
            model: ProductInfo::default(),
            product: ProductInfo::default(),
        }
    }
}

impl RendererOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ownqueue: config.get_ownqueue(),
            check_content_format: config.get_check_content_format(),
            upnpav: config.get_upnpav(),
            openhome: config.get_openhome(),
            receiver: config.get_sc_receiver(),
            sc_stream_url: config.get_sc_stream_url(),
            radios: config.get_radios(),
            room: config.get_oh_product_room(),
            manufacturer: config.get_oh_manufacturer(),
            model: config.get_oh_model(),
            product: config.get_oh_product(),
        }
    }
}

/// Sources OpenHome du renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Playlist,
    Radio,
    Receiver,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Playlist => "Playlist",
            SourceKind::Radio => "Radio",
            SourceKind::Receiver => "Receiver",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informations transmises d'une source à l'autre lors d'un changement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceHandoff {
    /// Position de lecture de la source sortante (0 sans morceau)
    pub seek_ms: u32,
}

/// État du service Product.
#[derive(Debug, Clone)]
pub struct ProductState {
    pub sources: Vec<SourceKind>,
    pub index: usize,
    pub standby: bool,
}

impl ProductState {
    fn new(options: &RendererOptions) -> Self {
        let mut sources = vec![SourceKind::Playlist];
        if !options.radios.is_empty() {
            sources.push(SourceKind::Radio);
        }
        if options.receiver {
            sources.push(SourceKind::Receiver);
        }
        Self {
            sources,
            index: 0,
            standby: false,
        }
    }

    pub fn current(&self) -> SourceKind {
        self.sources.get(self.index).copied().unwrap_or(SourceKind::Playlist)
    }
}

pub struct RendererContext {
    player: Box<dyn Player>,
    status: PlayerStatus,
    status_time: Option<Instant>,
    pub(crate) options: RendererOptions,
    pub(crate) protocol_info: ProtocolInfo,
    pub(crate) mute: MuteState,
    pub(crate) avt: AvtState,
    pub(crate) playlist: PlaylistState,
    pub(crate) product: ProductState,
    pub(crate) radio: RadioState,
    pub(crate) receiver: ReceiverState,
    /// Texte libre publié par Info (titre de la radio en cours)
    pub(crate) metatext: String,
}

impl RendererContext {
    pub fn new(player: Box<dyn Player>, options: RendererOptions, protocol_info: ProtocolInfo) -> Self {
        let product = ProductState::new(&options);
        let radio = RadioState::new(&options.radios);
        Self {
            player,
            status: PlayerStatus::default(),
            status_time: None,
            protocol_info,
            mute: MuteState::default(),
            avt: AvtState::default(),
            playlist: PlaylistState::default(),
            product,
            radio,
            receiver: ReceiverState::default(),
            metatext: String::new(),
            options,
        }
    }

    /// Cache de métadonnées initial et son écrivain (persistance activée).
    pub fn with_meta_cache(mut self, cache: MetaCache, saver: Option<CacheSaver>) -> Self {
        self.playlist = PlaylistState::with_cache(cache, saver);
        self
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Accès au lecteur ; l'état en cache est considéré périmé ensuite.
    pub fn player(&mut self) -> &mut dyn Player {
        self.status_time = None;
        self.player.as_mut()
    }

    /// Relit l'état du lecteur.
    pub fn refresh_status(&mut self) -> PlayerResult<&PlayerStatus> {
        self.status = self.player.status()?;
        self.status_time = Some(Instant::now());
        Ok(&self.status)
    }

    /// État du lecteur, relu s'il est trop ancien. En cas d'échec le
    /// dernier état connu est conservé.
    pub fn status(&mut self) -> &PlayerStatus {
        let fresh = self
            .status_time
            .is_some_and(|t| t.elapsed() < STATUS_MAX_AGE);
        if !fresh {
            if let Err(e) = self.refresh_status() {
                warn!("⚠️ Cannot read player status: {}", e);
            }
        }
        &self.status
    }

    /// Dernier état lu, sans interroger le lecteur.
    pub fn cached_status(&self) -> &PlayerStatus {
        &self.status
    }

    /// Volume 0..100.
    pub fn set_volume(&mut self, volume: i32) -> ActionResult<()> {
        let volume = volume.clamp(0, 100);
        self.mute.volume_set();
        self.player().set_volume(volume)?;
        Ok(())
    }

    pub fn volume(&mut self) -> ActionResult<i32> {
        Ok(self.player().volume()?)
    }

    /// Muet : volume à 0 puis restauration du volume précédent. Répéter la
    /// même commande ne change rien.
    pub fn set_mute(&mut self, on: bool) -> ActionResult<()> {
        let target = if on {
            let current = self.volume()?;
            self.mute.mute(current)
        } else {
            self.mute.unmute()
        };
        if let Some(volume) = target {
            debug!("mute {} -> volume {}", on, volume);
            self.player().set_volume(volume)?;
        }
        Ok(())
    }

    pub fn is_muted(&mut self) -> bool {
        self.mute.is_muted() || self.status().volume == 0
    }

    pub fn current_source(&self) -> SourceKind {
        self.product.current()
    }

    pub fn source_active(&self, kind: SourceKind) -> bool {
        self.current_source() == kind
    }

    /// Active la source `kind` si elle est déclarée.
    pub fn switch_to(&mut self, kind: SourceKind) -> ActionResult<()> {
        let index = self
            .product
            .sources
            .iter()
            .position(|k| *k == kind)
            .ok_or_else(|| ActionError::internal(format!("no {} source", kind)))?;
        self.set_source_index(index)
    }

    /// Change de source : la source sortante sauvegarde et libère le
    /// lecteur, puis la source entrante le reprend.
    pub fn set_source_index(&mut self, index: usize) -> ActionResult<()> {
        let Some(incoming) = self.product.sources.get(index).copied() else {
            return Err(ActionError::invalid_param(format!("bad source index {}", index)));
        };
        if index == self.product.index {
            return Ok(());
        }
        let outgoing = self.current_source();

        let status = self.refresh_status()?;
        let handoff = SourceHandoff {
            seek_ms: if status.is_song() { status.elapsed_ms } else { 0 },
        };
        info!("🔀 Source {} -> {}", outgoing, incoming);

        match outgoing {
            SourceKind::Playlist => ohplaylist::deactivate(self, handoff)?,
            SourceKind::Radio => ohradio::deactivate(self, handoff)?,
            SourceKind::Receiver => ohreceiver::deactivate(self)?,
        }
        self.product.index = index;
        match incoming {
            SourceKind::Playlist => ohplaylist::activate(self)?,
            SourceKind::Radio => ohradio::activate(self)?,
            SourceKind::Receiver => {}
        }
        Ok(())
    }
}
