//! # OpenHome Radio - canaux déclarés dans la configuration
//!
//! Le canal 0 est réservé au flux fixé par `SetChannel` ; les canaux 1..n
//! sont les radios configurées. La lecture remplace la file du lecteur par
//! l'unique URL du canal.

use tracing::{debug, info};
use upmconfig::RadioDef;
use upmdidl::{Song, didlmake, wrap_didl, xml_escape};
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::soap::{error_codes, xml_quote};
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::{RendererContext, SourceHandoff, SourceKind};
use crate::idarray::encode_id_array;
use crate::player::SavedState;
use crate::services::{inactive_source, oh_transport_state};

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Radio:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Radio";

const UNKNOWN_RADIO: &str = "Unknown radio";
const RADIO_CLASS: &str = "object.item.audioItem.audioBroadcast";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioChannel {
    pub title: String,
    pub uri: String,
    pub art_uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct RadioState {
    pub(crate) channels: Vec<RadioChannel>,
    pub(crate) id: u32,
    saved_state: Option<SavedState>,
}

impl RadioState {
    pub fn new(radios: &[RadioDef]) -> Self {
        let mut channels = vec![RadioChannel {
            title: UNKNOWN_RADIO.to_string(),
            ..Default::default()
        }];
        channels.extend(radios.iter().map(|r| RadioChannel {
            title: r.title.clone(),
            uri: r.url.clone(),
            art_uri: r.arturl.clone(),
        }));
        Self {
            channels,
            id: 0,
            saved_state: None,
        }
    }

    fn channel_ids(&self) -> Vec<u32> {
        (1..self.channels.len() as u32).collect()
    }
}

/// Métadonnées DIDL d'un canal.
fn channel_didl(channel: &RadioChannel) -> String {
    let mut item = format!(
        "<item id=\"\" parentID=\"\" restricted=\"True\"><dc:title>{}</dc:title><res protocolInfo=\"*:*:*:*\">{}</res>",
        xml_escape(&channel.title),
        xml_escape(&channel.uri)
    );
    if !channel.art_uri.is_empty() {
        item.push_str(&format!(
            "<upnp:albumArtURI>{}</upnp:albumArtURI>",
            xml_escape(&channel.art_uri)
        ));
    }
    item.push_str(&format!("<upnp:class>{}</upnp:class></item>", RADIO_CLASS));
    wrap_didl(&item)
}

fn radio_state(ctx: &mut RendererContext) -> StateVariableMap {
    let status = ctx.status().clone();
    let active = ctx.source_active(SourceKind::Radio);
    let radio = &ctx.radio;

    let metadata = match radio.channels.get(radio.id as usize) {
        Some(channel) if active && status.is_song() => {
            let mut song = status.current_song.clone();
            if song.album.is_empty() {
                song.album = channel.title.clone();
            }
            song.art_uri = channel.art_uri.clone();
            didlmake(&song)
        }
        _ => String::new(),
    };
    let (transport, uri) = if active {
        (oh_transport_state(&status), status.current_song.uri.clone())
    } else {
        ("Stopped", String::new())
    };
    if active {
        ctx.metatext = metadata.clone();
    }

    let radio = &ctx.radio;
    state_map([
        ("ChannelsMax", radio.channels.len().to_string()),
        ("Id", radio.id.to_string()),
        ("IdArray", encode_id_array(&radio.channel_ids())),
        ("Metadata", metadata),
        ("ProtocolInfo", ctx.protocol_info.text().to_string()),
        ("TransportState", transport.to_string()),
        ("Uri", uri),
    ])
}

fn require_active(ctx: &RendererContext) -> ActionResult<()> {
    if ctx.source_active(SourceKind::Radio) {
        Ok(())
    } else {
        Err(inactive_source(SourceKind::Radio))
    }
}

/// Remplace la file par le canal courant et le lance.
fn play_channel(ctx: &mut RendererContext) -> ActionResult<()> {
    let channel = ctx
        .radio
        .channels
        .get(ctx.radio.id as usize)
        .cloned()
        .unwrap_or_default();
    if channel.uri.is_empty() {
        return Err(ActionError::invalid_param("no channel uri"));
    }
    info!("📻 Radio {} {}", channel.title, channel.uri);
    let song = Song {
        uri: channel.uri.clone(),
        album: channel.title.clone(),
        ..Default::default()
    };
    let player = ctx.player();
    player.clear_queue()?;
    player.insert(&channel.uri, Some(0), &song)?;
    player.single(true)?;
    player.play(Some(0))?;
    Ok(())
}

pub(crate) fn deactivate(ctx: &mut RendererContext, handoff: SourceHandoff) -> ActionResult<()> {
    let saved = ctx.player().save_state(handoff.seek_ms)?;
    ctx.radio.saved_state = Some(saved);
    let player = ctx.player();
    player.clear_queue()?;
    player.stop()?;
    ctx.metatext.clear();
    Ok(())
}

pub(crate) fn activate(ctx: &mut RendererContext) -> ActionResult<()> {
    if ctx.radio.id == 0 {
        return Ok(());
    }
    if let Some(saved) = ctx.radio.saved_state.take() {
        debug!("radio: restoring channel {}", ctx.radio.id);
        ctx.player().restore_state(&saved)?;
    }
    Ok(())
}

fn channel(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let radio = &ctx.radio;
    let channel = radio.channels.get(radio.id as usize).cloned().unwrap_or_default();
    Ok(SoapOutgoing::new()
        .arg("Uri", channel.uri.clone())
        .arg("Metadata", channel_didl(&channel)))
}

fn channels_max(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.radio.channels.len().to_string()))
}

fn id(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.radio.id.to_string()))
}

fn id_array(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new()
        .arg("Token", "1")
        .arg("Array", encode_id_array(&ctx.radio.channel_ids())))
}

fn id_array_changed(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", "0"))
}

fn play(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    if !ctx.source_active(SourceKind::Radio) {
        ctx.switch_to(SourceKind::Radio)?;
    }
    play_channel(ctx)?;
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

fn seek_second_absolute(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    ctx.player().seek(call.int("Value")? as u32)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn seek_second_relative(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    require_active(ctx)?;
    let delta = i64::from(call.i32("Value")?);
    let status = ctx.refresh_status()?;
    if status.is_song() {
        let target = (i64::from(status.elapsed_ms / 1000) + delta).max(0) as u32;
        ctx.player().seek(target)?;
        call.wake();
    }
    Ok(SoapOutgoing::new())
}

fn protocol_info(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.protocol_info.text()))
}

fn read(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let id = call.int("Id")? as usize;
    let channel = ctx
        .radio
        .channels
        .get(id)
        .ok_or_else(|| ActionError::service(error_codes::OH_ID_NOT_FOUND, format!("Id {} not found", id)))?;
    Ok(SoapOutgoing::new().arg("Metadata", channel_didl(channel)))
}

fn read_list(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let mut out = String::from("<ChannelList>");
    for token in call.string("IdList")?.split_whitespace() {
        let Ok(id) = token.parse::<usize>() else {
            return Err(ActionError::invalid_param(format!("bad id {}", token)));
        };
        if let Some(channel) = ctx.radio.channels.get(id) {
            out.push_str(&format!(
                "<Entry><Id>{}</Id><Uri>{}</Uri><Metadata>{}</Metadata></Entry>",
                id,
                xml_quote(&channel.uri),
                xml_quote(&channel_didl(channel))
            ));
        }
    }
    out.push_str("</ChannelList>");
    Ok(SoapOutgoing::new().arg("ChannelList", out))
}

fn set_channel(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let uri = call.string("Uri")?.trim().to_string();
    let metadata = call.string("Metadata")?;
    let title = Song::from_metadata(metadata)
        .map(|song| format!("{} {}", song.album, song.title).trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_RADIO.to_string());

    if ctx.source_active(SourceKind::Radio) {
        ctx.player().stop()?;
    }
    let radio = &mut ctx.radio;
    radio.id = 0;
    radio.channels[0] = RadioChannel {
        title,
        uri,
        art_uri: String::new(),
    };
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_id(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let id = call.int("Value")? as u32;
    if id == 0 || id as usize >= ctx.radio.channels.len() {
        return Err(ActionError::invalid_param(format!("bad channel id {}", id)));
    }
    if ctx.source_active(SourceKind::Radio) {
        ctx.player().stop()?;
    }
    ctx.radio.id = id;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn transport_state(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let active = ctx.source_active(SourceKind::Radio);
    let status = ctx.refresh_status()?;
    let state = if active { oh_transport_state(status) } else { "Stopped" };
    Ok(SoapOutgoing::new().arg("Value", state))
}

const VALUE_UI4_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Value")];
const VALUE_I4_ARGS: &[ArgSpec] = &[ArgSpec::i4("Value")];
const READ_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Id")];
const READ_LIST_ARGS: &[ArgSpec] = &[ArgSpec::string("IdList")];
const SET_CHANNEL_ARGS: &[ArgSpec] = &[ArgSpec::string("Uri"), ArgSpec::string("Metadata")];
const TOKEN_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Token")];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Channel", &[], &["Uri", "Metadata"], channel),
            ActionSpec::new("ChannelsMax", &[], &["Value"], channels_max),
            ActionSpec::new("Id", &[], &["Value"], id),
            ActionSpec::new("IdArray", &[], &["Token", "Array"], id_array),
            ActionSpec::new("IdArrayChanged", TOKEN_ARGS, &["Value"], id_array_changed),
            ActionSpec::new("Pause", &[], &[], pause),
            ActionSpec::new("Play", &[], &[], play),
            ActionSpec::new("ProtocolInfo", &[], &["Value"], protocol_info),
            ActionSpec::new("Read", READ_ARGS, &["Metadata"], read),
            ActionSpec::new("ReadList", READ_LIST_ARGS, &["ChannelList"], read_list),
            ActionSpec::new("SeekSecondAbsolute", VALUE_UI4_ARGS, &[], seek_second_absolute),
            ActionSpec::new("SeekSecondRelative", VALUE_I4_ARGS, &[], seek_second_relative),
            ActionSpec::new("SetChannel", SET_CHANNEL_ARGS, &[], set_channel),
            ActionSpec::new("SetId", VALUE_UI4_ARGS, &[], set_id),
            ActionSpec::new("Stop", &[], &[], stop),
            ActionSpec::new("TransportState", &[], &["Value"], transport_state),
        ],
        makestate: radio_state,
        event_style: EventStyle::Properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radios() -> Vec<RadioDef> {
        vec![
            RadioDef {
                title: "FIP".into(),
                url: "http://radio/fip".into(),
                arturl: "http://radio/fip.png".into(),
            },
            RadioDef {
                title: "Jazz".into(),
                url: "http://radio/jazz".into(),
                arturl: String::new(),
            },
        ]
    }

    #[test]
    fn test_channel_zero_is_reserved() {
        let state = RadioState::new(&radios());
        assert_eq!(state.channels.len(), 3);
        assert_eq!(state.channels[0].title, UNKNOWN_RADIO);
        assert!(state.channels[0].uri.is_empty());
        assert_eq!(state.channel_ids(), vec![1, 2]);
    }

    #[test]
    fn test_channel_didl() {
        let state = RadioState::new(&radios());
        let didl = channel_didl(&state.channels[1]);
        let song = Song::from_metadata(&didl).unwrap();
        assert_eq!(song.title, "FIP");
        assert_eq!(song.uri, "http://radio/fip");
        assert_eq!(song.art_uri, "http://radio/fip.png");
        assert!(!channel_didl(&state.channels[2]).contains("albumArtURI"));
    }
}
