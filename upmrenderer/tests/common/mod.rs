#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use upmconfig::RadioDef;
use upmdidl::{Song, wrap_didl};
use upmrenderer::{
    Player, PlayerError, PlayerResult, PlayerState, PlayerStatus, ProtocolInfo, QueuedSong,
    RendererContext, RendererOptions, SongRef, build_renderer, renderer_info,
};
use upmupnp::errors::ActionResult;
use upmupnp::{Device, UpnpDevice};

/// État du lecteur simulé, partagé avec le test.
#[derive(Debug, Default)]
pub struct FakeState {
    pub queue: Vec<QueuedSong>,
    pub current: Option<usize>,
    pub state: PlayerState,
    pub volume: i32,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    pub elapsed_ms: u32,
    pub qvers: u32,
    pub next_id: u32,
    pub queue_reads: usize,
}

impl FakeState {
    fn changed(&mut self) {
        self.qvers += 1;
    }

    pub fn uris(&self) -> Vec<String> {
        self.queue.iter().map(|e| e.song.uri.clone()).collect()
    }
}

#[derive(Clone, Default)]
pub struct FakePlayer {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakePlayer {
    pub fn new() -> Self {
        let player = Self::default();
        {
            let mut s = player.state.lock();
            s.volume = 40;
            s.next_id = 1;
            s.state = PlayerState::Stop;
        }
        player
    }
}

fn unknown(what: &str) -> PlayerError {
    PlayerError::protocol(format!("no such song {}", what))
}

impl Player for FakePlayer {
    fn status(&mut self) -> PlayerResult<PlayerStatus> {
        let s = self.state.lock();
        let current = s.current.and_then(|i| s.queue.get(i));
        Ok(PlayerStatus {
            volume: s.volume,
            repeat: s.repeat,
            random: s.random,
            single: s.single,
            consume: s.consume,
            qlen: s.queue.len() as u32,
            qvers: s.qvers,
            state: s.state,
            songpos: s.current.map_or(-1, |i| i as i32),
            songid: current.map_or(-1, |e| e.id as i32),
            elapsed_ms: s.elapsed_ms,
            current_song: current.map(|e| e.song.clone()).unwrap_or_default(),
            ..Default::default()
        })
    }

    fn set_volume(&mut self, volume: i32) -> PlayerResult<()> {
        self.state.lock().volume = volume;
        Ok(())
    }

    fn volume(&mut self) -> PlayerResult<i32> {
        Ok(self.state.lock().volume)
    }

    fn toggle_pause(&mut self) -> PlayerResult<()> {
        let mut s = self.state.lock();
        s.state = match s.state {
            PlayerState::Play => PlayerState::Pause,
            PlayerState::Pause => PlayerState::Play,
            other => other,
        };
        Ok(())
    }

    fn pause(&mut self, on: bool) -> PlayerResult<()> {
        let mut s = self.state.lock();
        s.state = match (s.state, on) {
            (PlayerState::Play, true) => PlayerState::Pause,
            (PlayerState::Pause, false) => PlayerState::Play,
            (other, _) => other,
        };
        Ok(())
    }

    fn play(&mut self, pos: Option<u32>) -> PlayerResult<()> {
        let mut s = self.state.lock();
        let pos = match pos {
            Some(pos) => pos as usize,
            None => s.current.unwrap_or(0),
        };
        if pos >= s.queue.len() {
            return Err(unknown(&format!("at {}", pos)));
        }
        s.current = Some(pos);
        s.state = PlayerState::Play;
        Ok(())
    }

    fn play_id(&mut self, id: u32) -> PlayerResult<()> {
        let mut s = self.state.lock();
        let pos = s
            .queue
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| unknown(&id.to_string()))?;
        s.current = Some(pos);
        s.state = PlayerState::Play;
        s.elapsed_ms = 0;
        Ok(())
    }

    fn stop(&mut self) -> PlayerResult<()> {
        self.state.lock().state = PlayerState::Stop;
        Ok(())
    }

    fn next(&mut self) -> PlayerResult<()> {
        let mut s = self.state.lock();
        let next = s.current.map_or(0, |i| i + 1);
        if next < s.queue.len() {
            s.current = Some(next);
        } else {
            s.state = PlayerState::Stop;
        }
        Ok(())
    }

    fn previous(&mut self) -> PlayerResult<()> {
        let mut s = self.state.lock();
        s.current = Some(s.current.unwrap_or(0).saturating_sub(1));
        Ok(())
    }

    fn repeat(&mut self, on: bool) -> PlayerResult<()> {
        self.state.lock().repeat = on;
        Ok(())
    }

    fn random(&mut self, on: bool) -> PlayerResult<()> {
        self.state.lock().random = on;
        Ok(())
    }

    fn single(&mut self, on: bool) -> PlayerResult<()> {
        self.state.lock().single = on;
        Ok(())
    }

    fn consume(&mut self, on: bool) -> PlayerResult<()> {
        self.state.lock().consume = on;
        Ok(())
    }

    fn seek(&mut self, seconds: u32) -> PlayerResult<()> {
        self.state.lock().elapsed_ms = seconds * 1000;
        Ok(())
    }

    fn clear_queue(&mut self) -> PlayerResult<()> {
        let mut s = self.state.lock();
        s.queue.clear();
        s.current = None;
        s.state = PlayerState::Stop;
        s.changed();
        Ok(())
    }

    fn insert(&mut self, uri: &str, pos: Option<u32>, meta: &Song) -> PlayerResult<u32> {
        let mut s = self.state.lock();
        let id = s.next_id;
        s.next_id += 1;
        let pos = pos.map_or(s.queue.len(), |p| (p as usize).min(s.queue.len()));
        let song = Song {
            uri: uri.to_string(),
            ..meta.clone()
        };
        s.queue.insert(pos, QueuedSong { id, song });
        if let Some(current) = s.current {
            if current >= pos {
                s.current = Some(current + 1);
            }
        }
        s.changed();
        Ok(id)
    }

    fn delete_id(&mut self, id: u32) -> PlayerResult<()> {
        let mut s = self.state.lock();
        let pos = s
            .queue
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| unknown(&id.to_string()))?;
        s.queue.remove(pos);
        s.current = match s.current {
            Some(current) if current == pos => None,
            Some(current) if current > pos => Some(current - 1),
            other => other,
        };
        s.changed();
        Ok(())
    }

    fn delete_pos_range(&mut self, start: u32, end: u32) -> PlayerResult<()> {
        let mut s = self.state.lock();
        let end = (end as usize).min(s.queue.len());
        let start = (start as usize).min(end);
        s.queue.drain(start..end);
        if s.current.is_some_and(|c| c >= start) {
            s.current = None;
        }
        s.changed();
        Ok(())
    }

    fn stat_id(&mut self, id: u32) -> PlayerResult<bool> {
        Ok(self.state.lock().queue.iter().any(|e| e.id == id))
    }

    fn queue_data(&mut self) -> PlayerResult<Vec<QueuedSong>> {
        let mut s = self.state.lock();
        s.queue_reads += 1;
        Ok(s.queue.clone())
    }

    fn stat_song(&mut self, which: SongRef) -> PlayerResult<Option<Song>> {
        let s = self.state.lock();
        let entry = match which {
            SongRef::Pos(pos) => s.queue.get(pos as usize),
            SongRef::Id(id) => s.queue.iter().find(|e| e.id == id),
        };
        Ok(entry.map(|e| e.song.clone()))
    }
}

pub const AVT: &str = "urn:upnp-org:serviceId:AVTransport";
pub const RCS: &str = "urn:upnp-org:serviceId:RenderingControl";
pub const PLAYLIST: &str = "urn:av-openhome-org:serviceId:Playlist";
pub const PRODUCT: &str = "urn:av-openhome-org:serviceId:Product";
pub const RADIO: &str = "urn:av-openhome-org:serviceId:Radio";
pub const VOLUME: &str = "urn:av-openhome-org:serviceId:Volume";

pub fn radios() -> Vec<RadioDef> {
    vec![RadioDef {
        title: "FIP".to_string(),
        url: "http://radio.example/fip".to_string(),
        arturl: String::new(),
    }]
}

pub fn renderer(options: RendererOptions) -> (Device<RendererContext>, FakePlayer) {
    let player = FakePlayer::new();
    let ctx = RendererContext::new(Box::new(player.clone()), options, ProtocolInfo::embedded());
    let device = build_renderer(renderer_info("test-renderer", "Test"), ctx);
    (device, player)
}

pub fn call(
    device: &dyn UpnpDevice,
    service_id: &str,
    action: &str,
    args: &[(&str, &str)],
) -> ActionResult<HashMap<String, String>> {
    let args: HashMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    device
        .dispatch(service_id, action, &args)
        .map(|out| out.into_iter().collect())
}

/// DIDL d'un morceau FLAC servi par `uri`.
pub fn track_didl(uri: &str, title: &str) -> String {
    wrap_didl(&format!(
        r#"<item id="t" parentID="0" restricted="1"><dc:title>{}</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="http-get:*:audio/flac:*">{}</res></item>"#,
        title, uri
    ))
}
