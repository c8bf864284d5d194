//! # OpenHome Playlist - file de lecture pilotée par identifiants
//!
//! ## Fonctionnalités
//!
//! - ✅ Transport : Play, Pause, Stop, Next, Previous, SeekSecondAbsolute/Relative
//! - ✅ Modes : Repeat, Shuffle
//! - ✅ Édition : Insert, DeleteId, DeleteAll, SeekId, SeekIndex
//! - ✅ Lecture de la file : Read, ReadList, IdArray, IdArrayChanged
//! - ✅ Cache URI → métadonnées DIDL, persistant si configuré
//!
//! La liste d'identifiants n'est recalculée que lorsque la version de la
//! file du lecteur change ; le cache de métadonnées est reconstruit à cette
//! occasion (les URIs connues gardent leurs métadonnées, les autres reçoivent
//! des métadonnées synthétisées).

use tracing::{debug, info, warn};
use upmdidl::{Song, didlmake, upnp_duration};
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::soap::{bool_to_wire, error_codes, xml_quote};
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::{RendererContext, SourceHandoff, SourceKind};
use crate::idarray::encode_id_array;
use crate::metacache::{CacheSaver, MetaCache};
use crate::player::{PlayerStatus, SavedState, SongRef};
use crate::services::{inactive_source, oh_transport_state};

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Playlist:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Playlist";

pub const TRACKS_MAX: u32 = 16384;

/// Marque des métadonnées synthétisées à partir des tags du lecteur
const SYNTHESIZED_MARK: &str = "<orig>mpd</orig>";

#[derive(Default)]
pub struct PlaylistState {
    pub(crate) cache: MetaCache,
    cached_qvers: Option<u32>,
    id_array: String,
    /// Le cache a changé hors reconstruction (Insert)
    dirty: bool,
    saver: Option<CacheSaver>,
    saved_state: Option<SavedState>,
}

impl PlaylistState {
    pub fn with_cache(cache: MetaCache, saver: Option<CacheSaver>) -> Self {
        Self {
            cache,
            saver,
            ..Default::default()
        }
    }

    /// Force le recalcul de la liste d'identifiants au prochain relevé.
    pub(crate) fn invalidate(&mut self) {
        self.cached_qvers = None;
    }

    fn save(&mut self) {
        if let Some(saver) = &self.saver {
            saver.save(self.cache.clone());
        }
        self.dirty = false;
    }
}

/// Les métadonnées synthétisées du morceau courant suivent ses tags (flux
/// dont le titre change).
fn refresh_current(ctx: &mut RendererContext, status: &PlayerStatus) {
    let uri = &status.current_song.uri;
    if let Some(meta) = ctx.playlist.cache.get_mut(uri) {
        if meta.contains(SYNTHESIZED_MARK) {
            *meta = didlmake(&status.current_song);
        }
    }
}

/// Liste d'identifiants (base64), recalculée si la file a changé.
fn make_id_array(ctx: &mut RendererContext, status: &PlayerStatus) -> String {
    if ctx.playlist.cached_qvers == Some(status.qvers) {
        if status.is_song() {
            refresh_current(ctx, status);
        }
        return ctx.playlist.id_array.clone();
    }

    let queue = match ctx.player().queue_data() {
        Ok(queue) => queue,
        Err(e) => {
            warn!("⚠️ Cannot read the player queue: {}", e);
            return ctx.playlist.id_array.clone();
        }
    };
    let ids: Vec<u32> = queue.iter().map(|entry| entry.id).filter(|id| *id != 0).collect();

    let old = &ctx.playlist.cache;
    let mut cache = MetaCache::new();
    for entry in &queue {
        let uri = &entry.song.uri;
        if uri.is_empty() || cache.contains_key(uri) {
            continue;
        }
        let meta = old.get(uri).cloned().unwrap_or_else(|| didlmake(&entry.song));
        cache.insert(uri.clone(), meta);
    }
    let changed = cache != *old;
    debug!(
        "playlist: qvers {} -> {} tracks, cache changed: {}",
        status.qvers,
        ids.len(),
        changed
    );

    let playlist = &mut ctx.playlist;
    playlist.cache = cache;
    playlist.cached_qvers = Some(status.qvers);
    playlist.id_array = encode_id_array(&ids);
    if changed || playlist.dirty {
        playlist.save();
    }
    playlist.id_array.clone()
}

fn playlist_state(ctx: &mut RendererContext) -> StateVariableMap {
    let status = ctx.status().clone();
    let active = ctx.source_active(SourceKind::Playlist);
    let (transport, id, id_array) = if active {
        (
            oh_transport_state(&status),
            if status.is_song() { status.songid.max(0) } else { 0 },
            make_id_array(ctx, &status),
        )
    } else {
        ("Stopped", 0, String::new())
    };
    state_map([
        ("TransportState", transport.to_string()),
        ("Repeat", bool_to_wire(status.repeat).to_string()),
        ("Shuffle", bool_to_wire(status.random).to_string()),
        ("Id", id.to_string()),
        ("TracksMax", TRACKS_MAX.to_string()),
        ("ProtocolInfo", ctx.protocol_info.text().to_string()),
        ("IdArray", id_array),
    ])
}

fn require_active(ctx: &RendererContext) -> ActionResult<()> {
    if ctx.source_active(SourceKind::Playlist) {
        Ok(())
    } else {
        Err(inactive_source(SourceKind::Playlist))
    }
}

/// Sauvegarde la file avant de céder le lecteur.
pub(crate) fn deactivate(ctx: &mut RendererContext, handoff: SourceHandoff) -> ActionResult<()> {
    let saved = ctx.player().save_state(handoff.seek_ms)?;
    debug!("playlist: saved {} tracks at {} ms", saved.queue.len(), handoff.seek_ms);
    ctx.playlist.saved_state = Some(saved);
    ctx.player().stop()?;
    Ok(())
}

pub(crate) fn activate(ctx: &mut RendererContext) -> ActionResult<()> {
    if let Some(saved) = ctx.playlist.saved_state.take() {
        ctx.player().restore_state(&saved)?;
    }
    ctx.playlist.invalidate();
    Ok(())
}

fn play(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    if !ctx.source_active(SourceKind::Playlist) {
        ctx.switch_to(SourceKind::Playlist)?;
    }
    let player = ctx.player();
    player.consume(false)?;
    player.single(false)?;
    player.play(None)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn pause(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().pause(true)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn stop(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().stop()?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn next(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().next()?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn previous(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().previous()?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_repeat(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().repeat(call.bool("Value")?)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn repeat(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let status = ctx.refresh_status()?;
    Ok(SoapOutgoing::new().arg("Value", bool_to_wire(status.repeat)))
}

fn set_shuffle(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().random(call.bool("Value")?)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn shuffle(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let status = ctx.refresh_status()?;
    Ok(SoapOutgoing::new().arg("Value", bool_to_wire(status.random)))
}

fn seek_second_absolute(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    let secs = call.int("Value")? as u32;
    ctx.player().seek(secs)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn seek_second_relative(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    let delta = call.i32("Value")?;
    let status = ctx.refresh_status()?;
    if status.is_song() {
        let target = (status.elapsed_ms / 1000) as i64 + i64::from(delta);
        let target = target.max(0) as u32;
        debug!("playlist: relative seek to {}", upnp_duration(u64::from(target) * 1000));
        ctx.player().seek(target)?;
        call.wake();
    }
    Ok(SoapOutgoing::new())
}

fn transport_state(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let active = ctx.source_active(SourceKind::Playlist);
    let status = ctx.refresh_status()?;
    let state = if active {
        oh_transport_state(status)
    } else {
        "Stopped"
    };
    Ok(SoapOutgoing::new().arg("Value", state))
}

fn id(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let status = ctx.refresh_status()?;
    let id = if status.is_song() { status.songid.max(0) } else { 0 };
    Ok(SoapOutgoing::new().arg("Value", id.to_string()))
}

fn seek_id(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    if !ctx.source_active(SourceKind::Playlist) {
        ctx.switch_to(SourceKind::Playlist)?;
    }
    let id = call.int("Value")? as u32;
    ctx.player().play_id(id)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn seek_index(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    if !ctx.source_active(SourceKind::Playlist) {
        ctx.switch_to(SourceKind::Playlist)?;
    }
    let pos = call.int("Value")? as u32;
    ctx.player().play(Some(pos))?;
    call.wake();
    Ok(SoapOutgoing::new())
}

/// URI et métadonnées d'un identifiant de la file.
fn track_for_id(ctx: &mut RendererContext, id: u32) -> ActionResult<Option<(String, String)>> {
    let Some(song) = ctx.player().stat_song(SongRef::Id(id))? else {
        return Ok(None);
    };
    let metadata = ctx
        .playlist
        .cache
        .get(&song.uri)
        .cloned()
        .unwrap_or_else(|| didlmake(&song));
    Ok(Some((song.uri, metadata)))
}

fn read(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let id = call.int("Id")? as u32;
    let (uri, metadata) = track_for_id(ctx, id)?
        .ok_or_else(|| ActionError::service(error_codes::OH_ID_NOT_FOUND, format!("Id {} not found", id)))?;
    Ok(SoapOutgoing::new().arg("Uri", uri).arg("Metadata", metadata))
}

fn read_list(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let list = call.string("IdList")?.to_string();
    let mut out = String::from("<TrackList>");
    for token in list.split_whitespace() {
        let Ok(id) = token.parse::<u32>() else {
            return Err(ActionError::invalid_param(format!("bad id {}", token)));
        };
        match track_for_id(ctx, id)? {
            Some((uri, metadata)) => out.push_str(&format!(
                "<Entry><Id>{}</Id><Uri>{}</Uri><Metadata>{}</Metadata></Entry>",
                id,
                xml_quote(&uri),
                xml_quote(&metadata)
            )),
            None => debug!("playlist: ReadList skipping unknown id {}", id),
        }
    }
    out.push_str("</TrackList>");
    Ok(SoapOutgoing::new().arg("TrackList", out))
}

fn insert(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let after_id = call.int("AfterId")? as u32;
    let uri = call.string("Uri")?.to_string();
    let metadata = call.string("Metadata")?.to_string();

    if !ctx.source_active(SourceKind::Playlist) {
        if after_id != 0 {
            return Err(inactive_source(SourceKind::Playlist));
        }
        ctx.switch_to(SourceKind::Playlist)?;
    }

    let status = ctx.refresh_status()?.clone();
    if status.qlen >= TRACKS_MAX {
        return Err(ActionError::service(error_codes::OH_PLAYLIST_FULL, "Playlist full"));
    }
    if after_id != 0 && !ctx.player().stat_id(after_id)? {
        return Err(ActionError::service(
            error_codes::OH_ID_NOT_FOUND,
            format!("AfterId {} not found", after_id),
        ));
    }

    let song = ctx
        .protocol_info
        .check_content_format(&uri, &metadata, ctx.options.check_content_format)
        .map_err(ActionError::invalid_param)?;
    let new_id = ctx.player().insert_after_id(&uri, after_id, &Song { uri: uri.clone(), ..song })?;
    info!("➕ Playlist insert {} after {} -> {}", uri, after_id, new_id);

    let playlist = &mut ctx.playlist;
    playlist.cache.insert(uri, metadata);
    playlist.dirty = true;
    playlist.invalidate();
    call.wake();
    Ok(SoapOutgoing::new().arg("NewId", new_id.to_string()))
}

fn delete_id(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    let id = call.int("Value")? as u32;
    if !ctx.player().stat_id(id)? {
        return Err(ActionError::service(error_codes::OH_ID_NOT_FOUND, format!("Id {} not found", id)));
    }
    let status = ctx.refresh_status()?;
    if status.is_song() && status.songid == id as i32 {
        ctx.player().stop()?;
    }
    ctx.player().delete_id(id)?;
    ctx.playlist.invalidate();
    call.wake();
    Ok(SoapOutgoing::new())
}

fn delete_all(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().clear_queue()?;
    ctx.playlist.invalidate();
    call.wake();
    Ok(SoapOutgoing::new())
}

fn tracks_max(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", TRACKS_MAX.to_string()))
}

fn id_array(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let status = ctx.refresh_status()?.clone();
    let array = if ctx.source_active(SourceKind::Playlist) {
        make_id_array(ctx, &status)
    } else {
        String::new()
    };
    Ok(SoapOutgoing::new()
        .arg("Token", status.qvers.to_string())
        .arg("Array", array))
}

fn id_array_changed(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let token = call.int("Token")?;
    let status = ctx.refresh_status()?;
    let changed = token != i64::from(status.qvers);
    Ok(SoapOutgoing::new().arg("Value", bool_to_wire(changed)))
}

fn protocol_info(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.protocol_info.text()))
}

const VALUE_BOOL_ARGS: &[ArgSpec] = &[ArgSpec::boolean("Value")];
const VALUE_UI4_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Value")];
const VALUE_I4_ARGS: &[ArgSpec] = &[ArgSpec::i4("Value")];
const READ_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Id")];
const READ_LIST_ARGS: &[ArgSpec] = &[ArgSpec::string("IdList")];
const INSERT_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("AfterId"),
    ArgSpec::string("Uri"),
    ArgSpec::string("Metadata"),
];
const TOKEN_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Token")];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Play", &[], &[], play),
            ActionSpec::new("Pause", &[], &[], pause),
            ActionSpec::new("Stop", &[], &[], stop),
            ActionSpec::new("Next", &[], &[], next),
            ActionSpec::new("Previous", &[], &[], previous),
            ActionSpec::new("SetRepeat", VALUE_BOOL_ARGS, &[], set_repeat),
            ActionSpec::new("Repeat", &[], &["Value"], repeat),
            ActionSpec::new("SetShuffle", VALUE_BOOL_ARGS, &[], set_shuffle),
            ActionSpec::new("Shuffle", &[], &["Value"], shuffle),
            ActionSpec::new("SeekSecondAbsolute", VALUE_UI4_ARGS, &[], seek_second_absolute),
            ActionSpec::new("SeekSecondRelative", VALUE_I4_ARGS, &[], seek_second_relative),
            ActionSpec::new("SeekId", VALUE_UI4_ARGS, &[], seek_id),
            ActionSpec::new("SeekIndex", VALUE_UI4_ARGS, &[], seek_index),
            ActionSpec::new("TransportState", &[], &["Value"], transport_state),
            ActionSpec::new("Id", &[], &["Value"], id),
            ActionSpec::new("Read", READ_ARGS, &["Uri", "Metadata"], read),
            ActionSpec::new("ReadList", READ_LIST_ARGS, &["TrackList"], read_list),
            ActionSpec::new("Insert", INSERT_ARGS, &["NewId"], insert),
            ActionSpec::new("DeleteId", VALUE_UI4_ARGS, &[], delete_id),
            ActionSpec::new("DeleteAll", &[], &[], delete_all),
            ActionSpec::new("TracksMax", &[], &["Value"], tracks_max),
            ActionSpec::new("IdArray", &[], &["Token", "Array"], id_array),
            ActionSpec::new("IdArrayChanged", TOKEN_ARGS, &["Value"], id_array_changed),
            ActionSpec::new("ProtocolInfo", &[], &["Value"], protocol_info),
        ],
        makestate: playlist_state,
        event_style: EventStyle::Properties,
    }
}
