//! # upmrenderer - renderer UPnP/OpenHome pour MPD
//!
//! Expose un lecteur MPD comme MediaRenderer UPnP AV et OpenHome, et relaie
//! éventuellement un Media Server distant.
//!
//! ## Fonctionnalités
//!
//! - ✅ Client MPD (statut, file, commandes) derrière le trait [`Player`]
//! - ✅ AVTransport, RenderingControl, ConnectionManager
//! - ✅ OpenHome Product, Playlist, Info, Time, Volume, Radio, Receiver
//! - ✅ Passage de relais entre sources (sauvegarde et restauration de la file)
//! - ✅ Cache persistant des métadonnées de la Playlist
//! - ✅ Media Server relais (ContentDirectory paginé)
//!
//! ## Exemple
//!
//! ```no_run
//! use upmrenderer::{MpdClient, ProtocolInfo, RendererContext, RendererOptions, build_renderer, renderer_info};
//!
//! let mpd = MpdClient::connect("localhost", 6600, "")?;
//! let ctx = RendererContext::new(Box::new(mpd), RendererOptions::default(), ProtocolInfo::embedded());
//! let device = build_renderer(renderer_info("0b5bcf4e-6a0e-4f5c-9d2e-1a6f4f6b7d10", "UpMpd"), ctx);
//! # let _ = device;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod device;
pub mod errors;
pub mod idarray;
pub mod metacache;
pub mod mpd;
pub mod player;
pub mod playmode;
pub mod protocolinfo;
pub mod services;
pub mod volume;

pub use context::{RendererContext, RendererOptions, SourceHandoff, SourceKind};
pub use device::{build_media_server, build_renderer, media_server_info, renderer_info, renderer_services};
pub use errors::PlayerError;
pub use metacache::{CacheSaver, MetaCache};
pub use mpd::MpdClient;
pub use player::{Player, PlayerResult, PlayerState, PlayerStatus, QueuedSong, SavedState, SongRef};
pub use playmode::PlayMode;
pub use protocolinfo::ProtocolInfo;
pub use services::contentdirectory::MediaServerContext;
