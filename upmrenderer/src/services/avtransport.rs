//! # AVTransport - contrôle du transport UPnP AV
//!
//! ## Fonctionnalités
//!
//! - ✅ SetAVTransportURI, SetNextAVTransportURI (enchaînement sans blanc)
//! - ✅ GetMediaInfo, GetTransportInfo, GetPositionInfo
//! - ✅ GetDeviceCapabilities, GetTransportSettings, GetCurrentTransportActions
//! - ✅ Play, Pause, Stop, Seek, Next, Previous, SetPlayMode
//! - ✅ Événements `LastChange` (les positions de lecture n'en déclenchent pas)
//!
//! Le service garde une ombre de l'URI courante et suivante : quand le
//! lecteur passe au morceau suivant, l'URI suivante devient courante avec
//! ses métadonnées.

use std::mem;

use tracing::{debug, info, warn};
use upmdidl::{didlmake, upnp_duration, upnp_duration_to_secs};
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::lastchange::AVT_NAMESPACE;
use upmupnp::soap::error_codes;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;
use crate::player::{PlayerState, PlayerStatus};
use crate::playmode::{PlayFlags, PlayMode};

pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:AVTransport:1";
pub const SERVICE_ID: &str = "urn:upnp-org:serviceId:AVTransport";

/// Erreur AVTransport : format de contenu refusé
const ILLEGAL_MIME_TYPE: u16 = 714;

/// Ombre de l'URI jouée et de l'URI suivante.
#[derive(Debug, Clone, Default)]
pub struct AvtState {
    pub(crate) uri: String,
    pub(crate) metadata: String,
    pub(crate) next_uri: String,
    pub(crate) next_metadata: String,
    /// Sans file propre : morceaux insérés par nous, retirés au remplacement
    pub(crate) inserted_ids: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Stop,
    Play,
    Pause,
}

pub(crate) fn transport_state(status: &PlayerStatus) -> &'static str {
    match status.state {
        PlayerState::Play => "PLAYING",
        PlayerState::Pause => "PAUSED_PLAYBACK",
        _ => "STOPPED",
    }
}

pub(crate) fn transport_actions(status: &PlayerStatus) -> String {
    let extra = match status.state {
        PlayerState::Play => ",Pause,Stop,Seek",
        PlayerState::Pause => ",Play,Stop,Seek",
        _ => ",Play",
    };
    format!("Next,Previous{}", extra)
}

/// `NONE` tant qu'aucun morceau n'est en lecture ou en pause.
pub(crate) fn storage_medium(status: &PlayerStatus, uri: &str) -> &'static str {
    if !status.is_song() || uri.is_empty() {
        "NONE"
    } else if uri.starts_with("http://") {
        "HDD"
    } else {
        "NETWORK"
    }
}

/// Les combinaisons sans mode UPnP sont publiées comme `NORMAL`.
pub(crate) fn current_play_mode(status: &PlayerStatus) -> PlayMode {
    PlayMode::from_flags(PlayFlags {
        repeat: status.repeat,
        random: status.random,
        single: status.single,
    })
    .unwrap_or(PlayMode::Normal)
}

fn check_instance(call: &PendingAction) -> ActionResult<()> {
    match call.int("InstanceID")? {
        0 => Ok(()),
        other => Err(ActionError::service(
            error_codes::AVT_INVALID_INSTANCE_ID,
            format!("Invalid InstanceID {}", other),
        )),
    }
}

/// Suit le changement de morceau du lecteur.
fn track_shadow(ctx: &mut RendererContext, status: &PlayerStatus) {
    let uri = &status.current_song.uri;
    if uri.is_empty() {
        return;
    }
    let avt = &mut ctx.avt;
    if !avt.next_uri.is_empty() && *uri == avt.next_uri {
        debug!("AVTransport: next track {} is now current", uri);
        avt.uri = mem::take(&mut avt.next_uri);
        avt.metadata = mem::take(&mut avt.next_metadata);
    } else if *uri != avt.uri {
        avt.next_uri.clear();
        avt.next_metadata.clear();
        avt.uri = uri.clone();
        avt.metadata = ctx
            .playlist
            .cache
            .get(uri)
            .cloned()
            .unwrap_or_else(|| didlmake(&status.current_song));
    }
}

fn track_metadata(ctx: &RendererContext, status: &PlayerStatus) -> String {
    if ctx.options.ownqueue {
        if status.is_song() {
            ctx.avt.metadata.clone()
        } else {
            String::new()
        }
    } else {
        didlmake(&status.current_song)
    }
}

fn avt_state(ctx: &mut RendererContext) -> StateVariableMap {
    let status = ctx.status().clone();
    track_shadow(ctx, &status);

    let (duration, position) = if status.is_song() {
        (
            upnp_duration(u64::from(status.length_ms)),
            upnp_duration(u64::from(status.elapsed_ms)),
        )
    } else {
        ("00:00:00".to_string(), "0:00:00".to_string())
    };
    let transport_status = if status.error_message.is_empty() {
        "OK"
    } else {
        "ERROR_OCCURRED"
    };

    state_map([
        ("TransportState", transport_state(&status).to_string()),
        ("TransportStatus", transport_status.to_string()),
        ("TransportPlaySpeed", "1".to_string()),
        ("CurrentTransportActions", transport_actions(&status)),
        ("CurrentPlayMode", current_play_mode(&status).to_string()),
        ("NumberOfTracks", "1".to_string()),
        ("CurrentTrack", "1".to_string()),
        ("CurrentTrackURI", ctx.avt.uri.clone()),
        ("CurrentTrackMetaData", track_metadata(ctx, &status)),
        ("CurrentTrackDuration", duration.clone()),
        ("CurrentMediaDuration", duration),
        ("AVTransportURI", ctx.avt.uri.clone()),
        ("AVTransportURIMetaData", ctx.avt.metadata.clone()),
        ("NextAVTransportURI", ctx.avt.next_uri.clone()),
        ("NextAVTransportURIMetaData", ctx.avt.next_metadata.clone()),
        ("RelativeTimePosition", position.clone()),
        ("AbsoluteTimePosition", position),
        ("RelativeCounterPosition", "0".to_string()),
        ("AbsoluteCounterPosition", "0".to_string()),
        ("PlaybackStorageMedium", storage_medium(&status, &ctx.avt.uri).to_string()),
        ("PossiblePlaybackStorageMedia", "HDD,NETWORK".to_string()),
        ("RecordStorageMedium", "NOT_IMPLEMENTED".to_string()),
        ("PossibleRecordStorageMedia", "NOT_IMPLEMENTED".to_string()),
        ("RecordMediumWriteStatus", "NOT_IMPLEMENTED".to_string()),
        ("CurrentRecordQualityMode", "NOT_IMPLEMENTED".to_string()),
        ("PossibleRecordQualityModes", "NOT_IMPLEMENTED".to_string()),
    ])
}

/// État relu pour répondre à une action `Get*`.
fn fresh_state(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<StateVariableMap> {
    check_instance(call)?;
    ctx.refresh_status()?;
    Ok(avt_state(ctx))
}

fn out(state: &StateVariableMap, pairs: &[(&str, &str)]) -> SoapOutgoing {
    let mut result = SoapOutgoing::new();
    for (arg, var) in pairs {
        result.push(arg, state.get(*var).cloned().unwrap_or_default());
    }
    result
}

fn set_uri(ctx: &mut RendererContext, call: &PendingAction, setnext: bool) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let (uri_arg, meta_arg) = if setnext {
        ("NextURI", "NextURIMetaData")
    } else {
        ("CurrentURI", "CurrentURIMetaData")
    };
    let uri = call.string(uri_arg)?.trim().to_string();
    let metadata = call.string(meta_arg)?.to_string();
    if uri.is_empty() {
        return Err(ActionError::invalid_param(format!("empty {}", uri_arg)));
    }

    let song = ctx
        .protocol_info
        .check_content_format(&uri, &metadata, ctx.options.check_content_format)
        .map_err(|e| ActionError::service(ILLEGAL_MIME_TYPE, e))?;

    let status = ctx.refresh_status()?.clone();
    let ownqueue = ctx.options.ownqueue;
    info!("▶️ {} {}", if setnext { "SetNextAVTransportURI" } else { "SetAVTransportURI" }, uri);

    let mut curpos = status.songpos;
    if ownqueue && !setnext {
        ctx.player().clear_queue()?;
        curpos = -1;
    }
    {
        let player = ctx.player();
        player.repeat(false)?;
        player.random(false)?;
        player.single(false)?;
        player.consume(false)?;
    }
    if curpos < 0 {
        curpos = 0;
    }
    let curpos = curpos as u32;

    let insert_pos = if setnext {
        if status.qlen == 0 {
            return Err(ActionError::invalid_param("no current track"));
        }
        if ownqueue && status.qlen > 1 {
            ctx.player().delete_pos_range(curpos + 1, status.qlen)?;
        }
        curpos + 1
    } else {
        curpos
    };
    let id = ctx.player().insert(&uri, Some(insert_pos), &song)?;

    if setnext {
        ctx.avt.next_uri = uri;
        ctx.avt.next_metadata = metadata;
        if !ownqueue {
            ctx.avt.inserted_ids.push(id);
        }
    } else {
        ctx.avt.uri = uri;
        ctx.avt.metadata = metadata;
        ctx.avt.next_uri.clear();
        ctx.avt.next_metadata.clear();

        match status.state {
            PlayerState::Play => ctx.player().play(Some(curpos))?,
            PlayerState::Pause => ctx.player().pause(true)?,
            _ => ctx.player().stop()?,
        }

        if !ownqueue {
            let previous = mem::replace(&mut ctx.avt.inserted_ids, vec![id]);
            for old in previous {
                if ctx.player().stat_id(old)? {
                    ctx.player().delete_id(old)?;
                }
            }
        }
    }
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_avtransport_uri(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    set_uri(ctx, call, false)
}

fn set_next_avtransport_uri(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    set_uri(ctx, call, true)
}

fn get_position_info(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let state = fresh_state(ctx, call)?;
    Ok(out(
        &state,
        &[
            ("Track", "CurrentTrack"),
            ("TrackDuration", "CurrentTrackDuration"),
            ("TrackMetaData", "CurrentTrackMetaData"),
            ("TrackURI", "CurrentTrackURI"),
            ("RelTime", "RelativeTimePosition"),
            ("AbsTime", "AbsoluteTimePosition"),
            ("RelCount", "RelativeCounterPosition"),
            ("AbsCount", "AbsoluteCounterPosition"),
        ],
    ))
}

fn get_transport_info(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let state = fresh_state(ctx, call)?;
    Ok(out(
        &state,
        &[
            ("CurrentTransportState", "TransportState"),
            ("CurrentTransportStatus", "TransportStatus"),
            ("CurrentSpeed", "TransportPlaySpeed"),
        ],
    ))
}

fn get_media_info(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let state = fresh_state(ctx, call)?;
    Ok(out(
        &state,
        &[
            ("NrTracks", "NumberOfTracks"),
            ("MediaDuration", "CurrentMediaDuration"),
            ("CurrentURI", "AVTransportURI"),
            ("CurrentURIMetaData", "AVTransportURIMetaData"),
            ("NextURI", "NextAVTransportURI"),
            ("NextURIMetaData", "NextAVTransportURIMetaData"),
            ("PlayMedium", "PlaybackStorageMedium"),
            ("RecordMedium", "RecordStorageMedium"),
            ("WriteStatus", "RecordMediumWriteStatus"),
        ],
    ))
}

fn get_device_capabilities(_ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    Ok(SoapOutgoing::new()
        .arg("PlayMedia", "NETWORK,HDD")
        .arg("RecMedia", "NOT_IMPLEMENTED")
        .arg("RecQualityModes", "NOT_IMPLEMENTED"))
}

fn get_transport_settings(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let status = ctx.refresh_status()?;
    Ok(SoapOutgoing::new()
        .arg("PlayMode", current_play_mode(status).as_str())
        .arg("RecQualityMode", "NOT_IMPLEMENTED"))
}

fn get_current_transport_actions(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let status = ctx.refresh_status()?;
    Ok(SoapOutgoing::new().arg("Actions", transport_actions(status)))
}

fn play_control(ctx: &mut RendererContext, call: &PendingAction, what: Transport) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let state = ctx.refresh_status()?.state;
    debug!("AVTransport: {:?} while {:?}", what, state);
    let player = ctx.player();
    match (state, what) {
        (PlayerState::Play, Transport::Stop) | (PlayerState::Pause, Transport::Stop) => player.stop()?,
        (PlayerState::Play, Transport::Play) => player.play(None)?,
        (PlayerState::Play, Transport::Pause) | (PlayerState::Pause, Transport::Play) => {
            player.toggle_pause()?
        }
        (PlayerState::Stop | PlayerState::Unknown, Transport::Play) => player.play(None)?,
        _ => {}
    }
    call.wake();
    Ok(SoapOutgoing::new())
}

fn play(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    play_control(ctx, call, Transport::Play)
}

fn pause(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    play_control(ctx, call, Transport::Pause)
}

fn stop(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    play_control(ctx, call, Transport::Stop)
}

fn next(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    ctx.player().next()?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn previous(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    ctx.player().previous()?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn seek(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let unit = call.string("Unit")?;
    let target = call.string("Target")?;
    if unit != "REL_TIME" && unit != "ABS_TIME" {
        return Err(ActionError::invalid_param(format!("unsupported seek unit {}", unit)));
    }
    let secs = upnp_duration_to_secs(target)
        .ok_or_else(|| ActionError::invalid_param(format!("bad seek target {}", target)))?;
    ctx.player().seek(secs)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_play_mode(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let mode: PlayMode = call
        .string("NewPlayMode")?
        .parse()
        .map_err(ActionError::invalid_param)?;
    if ctx.options.ownqueue {
        warn!("⚠️ SetPlayMode {} ignored: the queue is managed by the renderer", mode);
        return Ok(SoapOutgoing::new());
    }
    let flags = mode.flags();
    let player = ctx.player();
    player.repeat(flags.repeat)?;
    player.random(flags.random)?;
    player.single(flags.single)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

const INSTANCE_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID")];
const SET_URI_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("CurrentURI"),
    ArgSpec::string("CurrentURIMetaData"),
];
const SET_NEXT_URI_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("NextURI"),
    ArgSpec::string("NextURIMetaData"),
];
const PLAY_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID"), ArgSpec::string("Speed")];
const SEEK_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("Unit"),
    ArgSpec::string("Target"),
];
const SET_PLAY_MODE_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID"), ArgSpec::string("NewPlayMode")];

const POSITION_OUTS: &[&str] = &[
    "Track",
    "TrackDuration",
    "TrackMetaData",
    "TrackURI",
    "RelTime",
    "AbsTime",
    "RelCount",
    "AbsCount",
];
const TRANSPORT_INFO_OUTS: &[&str] = &["CurrentTransportState", "CurrentTransportStatus", "CurrentSpeed"];
const MEDIA_INFO_OUTS: &[&str] = &[
    "NrTracks",
    "MediaDuration",
    "CurrentURI",
    "CurrentURIMetaData",
    "NextURI",
    "NextURIMetaData",
    "PlayMedium",
    "RecordMedium",
    "WriteStatus",
];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("SetAVTransportURI", SET_URI_ARGS, &[], set_avtransport_uri),
            ActionSpec::new("SetNextAVTransportURI", SET_NEXT_URI_ARGS, &[], set_next_avtransport_uri),
            ActionSpec::new("GetPositionInfo", INSTANCE_ARGS, POSITION_OUTS, get_position_info),
            ActionSpec::new("GetTransportInfo", INSTANCE_ARGS, TRANSPORT_INFO_OUTS, get_transport_info),
            ActionSpec::new("GetMediaInfo", INSTANCE_ARGS, MEDIA_INFO_OUTS, get_media_info),
            ActionSpec::new(
                "GetDeviceCapabilities",
                INSTANCE_ARGS,
                &["PlayMedia", "RecMedia", "RecQualityModes"],
                get_device_capabilities,
            ),
            ActionSpec::new(
                "GetTransportSettings",
                INSTANCE_ARGS,
                &["PlayMode", "RecQualityMode"],
                get_transport_settings,
            ),
            ActionSpec::new(
                "GetCurrentTransportActions",
                INSTANCE_ARGS,
                &["Actions"],
                get_current_transport_actions,
            ),
            ActionSpec::new("Play", PLAY_ARGS, &[], play),
            ActionSpec::new("Pause", INSTANCE_ARGS, &[], pause),
            ActionSpec::new("Stop", INSTANCE_ARGS, &[], stop),
            ActionSpec::new("Next", INSTANCE_ARGS, &[], next),
            ActionSpec::new("Previous", INSTANCE_ARGS, &[], previous),
            ActionSpec::new("Seek", SEEK_ARGS, &[], seek),
            ActionSpec::new("SetPlayMode", SET_PLAY_MODE_ARGS, &[], set_play_mode),
        ],
        makestate: avt_state,
        event_style: EventStyle::LastChange {
            namespace: AVT_NAMESPACE,
            quiet: &["RelativeTimePosition", "AbsoluteTimePosition"],
            channel_vars: &[],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: PlayerState) -> PlayerStatus {
        PlayerStatus {
            state,
            ..Default::default()
        }
    }

    #[test]
    fn test_transport_actions() {
        assert_eq!(transport_actions(&status(PlayerState::Play)), "Next,Previous,Pause,Stop,Seek");
        assert_eq!(transport_actions(&status(PlayerState::Pause)), "Next,Previous,Play,Stop,Seek");
        assert_eq!(transport_actions(&status(PlayerState::Stop)), "Next,Previous,Play");
        assert_eq!(transport_state(&status(PlayerState::Pause)), "PAUSED_PLAYBACK");
        assert_eq!(transport_state(&status(PlayerState::Unknown)), "STOPPED");
    }

    #[test]
    fn test_storage_medium() {
        let playing = status(PlayerState::Play);
        assert_eq!(storage_medium(&playing, ""), "NONE");
        assert_eq!(storage_medium(&playing, "http://srv/a.flac"), "HDD");
        assert_eq!(storage_medium(&playing, "https://srv/a.flac"), "NETWORK");
        let stopped = status(PlayerState::Stop);
        assert_eq!(storage_medium(&stopped, "http://srv/a.flac"), "NONE");
    }

    #[test]
    fn test_undefined_flags_report_normal() {
        let mut st = status(PlayerState::Play);
        st.repeat = true;
        st.random = true;
        assert_eq!(current_play_mode(&st), PlayMode::Random);
        st.single = true;
        assert_eq!(current_play_mode(&st), PlayMode::Normal);
    }

    #[test]
    fn test_service_declares_all_actions() {
        let def = service();
        assert_eq!(def.actions.len(), 15);
        assert!(def.actions.iter().any(|a| a.name == "SetNextAVTransportURI"));
    }
}
