//! Lecteur piloté par le renderer.
//!
//! Le trait [`Player`] est la frontière entre les services UPnP/OpenHome et
//! le démon de lecture. [`crate::mpd::MpdClient`] en est l'implémentation
//! réseau ; les tests fournissent un lecteur en mémoire.
//!
//! La sauvegarde/restauration d'état et l'insertion après un identifiant sont
//! fournies par défaut à partir des commandes élémentaires.

use tracing::{debug, warn};
use upmdidl::Song;

use crate::errors::PlayerError;

pub type PlayerResult<T> = Result<T, PlayerError>;

/// État du transport du lecteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Unknown,
    Stop,
    Play,
    Pause,
}

/// Photographie de l'état du lecteur.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    /// 0..100
    pub volume: i32,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    /// Longueur de la file
    pub qlen: u32,
    /// Version de la file, change à chaque modification
    pub qvers: u32,
    pub state: PlayerState,
    pub crossfade: u32,
    /// -1 sans morceau courant
    pub songpos: i32,
    /// -1 sans morceau courant
    pub songid: i32,
    pub elapsed_ms: u32,
    pub length_ms: u32,
    pub kbrate: u32,
    pub sample_rate: u32,
    pub bit_depth: u32,
    pub channels: u32,
    pub error_message: String,
    pub current_song: Song,
    pub next_song: Song,
    /// Incrémenté à chaque changement de morceau courant
    pub track_counter: u32,
    /// Incrémenté quand les caractéristiques du flux changent
    pub details_counter: u32,
}

impl PlayerStatus {
    /// Un morceau est en cours (lecture ou pause).
    pub fn is_song(&self) -> bool {
        matches!(self.state, PlayerState::Play | PlayerState::Pause)
    }
}

/// Entrée de la file du lecteur.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuedSong {
    pub id: u32,
    pub song: Song,
}

/// Désignation d'un morceau de la file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongRef {
    Pos(u32),
    Id(u32),
}

/// État complet sauvegardé lors d'un changement de source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedState {
    pub status: PlayerStatus,
    pub queue: Vec<Song>,
}

pub trait Player: Send {
    /// Interroge le lecteur et met à jour l'état courant.
    fn status(&mut self) -> PlayerResult<PlayerStatus>;

    fn set_volume(&mut self, volume: i32) -> PlayerResult<()>;

    /// Volume courant ; le dernier volume connu quand le lecteur n'en a pas.
    fn volume(&mut self) -> PlayerResult<i32>;

    fn toggle_pause(&mut self) -> PlayerResult<()>;
    fn pause(&mut self, on: bool) -> PlayerResult<()>;

    /// Joue le morceau en position `pos`, ou reprend le morceau courant.
    fn play(&mut self, pos: Option<u32>) -> PlayerResult<()>;
    fn play_id(&mut self, id: u32) -> PlayerResult<()>;
    fn stop(&mut self) -> PlayerResult<()>;
    fn next(&mut self) -> PlayerResult<()>;
    fn previous(&mut self) -> PlayerResult<()>;

    fn repeat(&mut self, on: bool) -> PlayerResult<()>;
    fn random(&mut self, on: bool) -> PlayerResult<()>;
    fn single(&mut self, on: bool) -> PlayerResult<()>;
    fn consume(&mut self, on: bool) -> PlayerResult<()>;

    /// Position absolue dans le morceau courant.
    fn seek(&mut self, seconds: u32) -> PlayerResult<()>;

    fn clear_queue(&mut self) -> PlayerResult<()>;

    /// Ajoute `uri` en position `pos` (à la fin si `None`) ; retourne l'identifiant.
    fn insert(&mut self, uri: &str, pos: Option<u32>, meta: &Song) -> PlayerResult<u32>;

    fn delete_id(&mut self, id: u32) -> PlayerResult<()>;

    /// Supprime les positions `start..end`.
    fn delete_pos_range(&mut self, start: u32, end: u32) -> PlayerResult<()>;

    /// L'identifiant est-il dans la file ?
    fn stat_id(&mut self, id: u32) -> PlayerResult<bool>;

    fn queue_data(&mut self) -> PlayerResult<Vec<QueuedSong>>;

    fn stat_song(&mut self, which: SongRef) -> PlayerResult<Option<Song>>;

    /// Ajoute `uri` juste après le morceau `after_id` ; en tête si `after_id`
    /// vaut 0, à la fin s'il est inconnu.
    fn insert_after_id(&mut self, uri: &str, after_id: u32, meta: &Song) -> PlayerResult<u32> {
        if after_id == 0 {
            return self.insert(uri, Some(0), meta);
        }
        let queue = self.queue_data()?;
        let pos = queue
            .iter()
            .position(|entry| entry.id == after_id)
            .map_or(queue.len(), |idx| idx + 1);
        self.insert(uri, Some(pos as u32), meta)
    }

    /// État et file courants ; `seek_ms` > 0 remplace la position de lecture.
    fn save_state(&mut self, seek_ms: u32) -> PlayerResult<SavedState> {
        let mut status = self.status()?;
        if seek_ms > 0 {
            status.elapsed_ms = seek_ms;
        }
        let queue = self.queue_data()?.into_iter().map(|entry| entry.song).collect();
        Ok(SavedState { status, queue })
    }

    /// Recharge la file, les modes, le volume puis la position de lecture.
    fn restore_state(&mut self, saved: &SavedState) -> PlayerResult<()> {
        debug!("restoring player state: {} songs", saved.queue.len());
        self.clear_queue()?;
        for (pos, song) in saved.queue.iter().enumerate() {
            self.insert(&song.uri, Some(pos as u32), song)?;
        }
        let status = &saved.status;
        self.repeat(status.repeat)?;
        self.random(status.random)?;
        self.single(status.single)?;
        self.consume(status.consume)?;
        self.set_volume(status.volume)?;

        if status.is_song() {
            if status.songpos < 0 {
                warn!("saved state is playing without a current song");
                return Ok(());
            }
            self.play(Some(status.songpos as u32))?;
            self.seek(status.elapsed_ms / 1000)?;
            if status.state == PlayerState::Pause {
                self.pause(true)?;
            }
        }
        Ok(())
    }
}
