//! OpenHome Receiver : réception d'un émetteur Songcast.
//!
//! Le renderer ne décode pas le protocole Songcast : il joue un flux HTTP,
//! soit l'URI de l'émetteur quand elle est en `http(s)`, soit le flux
//! configuré (`scstreamurl`) relayant l'émetteur.

use tracing::{debug, info, warn};
use upmdidl::Song;
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::{RendererContext, SourceKind};

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Receiver:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Receiver";

pub const RECEIVER_PROTOCOL_INFO: &str = "ohz:*:*:*,ohm:*:*:*,ohu:*.*.*";

#[derive(Debug, Clone, Default)]
pub struct ReceiverState {
    pub(crate) uri: String,
    pub(crate) metadata: String,
    pub(crate) playing: bool,
    /// Flux en cours de lecture
    stream_url: String,
}

fn stream_url(ctx: &RendererContext) -> Option<String> {
    let uri = &ctx.receiver.uri;
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Some(uri.clone())
    } else if !ctx.options.sc_stream_url.is_empty() {
        Some(ctx.options.sc_stream_url.clone())
    } else {
        None
    }
}

fn transport(receiver: &ReceiverState) -> &'static str {
    if receiver.playing { "Playing" } else { "Stopped" }
}

fn receiver_state(ctx: &mut RendererContext) -> StateVariableMap {
    let receiver = &ctx.receiver;
    state_map([
        ("Uri", receiver.uri.clone()),
        ("Metadata", receiver.metadata.clone()),
        ("TransportState", transport(receiver).to_string()),
        ("ProtocolInfo", RECEIVER_PROTOCOL_INFO.to_string()),
    ])
}

/// Arrête la lecture et retire le flux de la file.
fn stop_stream(ctx: &mut RendererContext) -> ActionResult<()> {
    ctx.receiver.playing = false;
    ctx.player().stop()?;
    let stream = std::mem::take(&mut ctx.receiver.stream_url);
    if stream.is_empty() {
        return Ok(());
    }
    let ids: Vec<u32> = ctx
        .player()
        .queue_data()?
        .into_iter()
        .filter(|entry| entry.song.uri == stream)
        .map(|entry| entry.id)
        .collect();
    for id in ids {
        ctx.player().delete_id(id)?;
    }
    ctx.playlist.invalidate();
    Ok(())
}

pub(crate) fn deactivate(ctx: &mut RendererContext) -> ActionResult<()> {
    stop_stream(ctx)
}

fn start_stream(ctx: &mut RendererContext) -> ActionResult<()> {
    let Some(stream) = stream_url(ctx) else {
        return Err(ActionError::internal("no stream url for this sender"));
    };
    ctx.player().stop()?;

    let existing = ctx
        .player()
        .queue_data()?
        .into_iter()
        .find(|entry| entry.song.uri == stream)
        .map(|entry| entry.id);
    let id = match existing {
        Some(id) => id,
        None => {
            let song = Song::from_metadata(&ctx.receiver.metadata).unwrap_or_default();
            let id = ctx.player().insert_after_id(&stream, 0, &Song { uri: stream.clone(), ..song })?;
            ctx.playlist.cache.insert(stream.clone(), ctx.receiver.metadata.clone());
            ctx.playlist.invalidate();
            id
        }
    };
    info!("🎧 Receiver playing {} (id {})", stream, id);
    ctx.player().play_id(id)?;
    ctx.receiver.stream_url = stream;
    ctx.receiver.playing = true;
    Ok(())
}

fn play(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    if ctx.receiver.uri.is_empty() || ctx.receiver.metadata.is_empty() {
        return Err(ActionError::internal("no sender set"));
    }
    if !ctx.source_active(SourceKind::Receiver) {
        debug!("receiver: playing while {} is the current source", ctx.current_source());
    }
    if let Err(e) = start_stream(ctx) {
        warn!("⚠️ Receiver cannot start: {}", e);
        stop_stream(ctx)?;
        return Err(e);
    }
    call.wake();
    Ok(SoapOutgoing::new())
}

fn stop(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    stop_stream(ctx)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_sender(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.receiver.uri = call.string("Uri")?.to_string();
    ctx.receiver.metadata = call.string("Metadata")?.to_string();
    debug!("receiver: sender {}", ctx.receiver.uri);
    call.wake();
    Ok(SoapOutgoing::new())
}

fn sender(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new()
        .arg("Uri", ctx.receiver.uri.clone())
        .arg("Metadata", ctx.receiver.metadata.clone()))
}

fn protocol_info(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", RECEIVER_PROTOCOL_INFO))
}

fn transport_state(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", transport(&ctx.receiver)))
}

const SET_SENDER_ARGS: &[ArgSpec] = &[ArgSpec::string("Uri"), ArgSpec::string("Metadata")];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Play", &[], &[], play),
            ActionSpec::new("Stop", &[], &[], stop),
            ActionSpec::new("SetSender", SET_SENDER_ARGS, &[], set_sender),
            ActionSpec::new("Sender", &[], &["Uri", "Metadata"], sender),
            ActionSpec::new("ProtocolInfo", &[], &["Value"], protocol_info),
            ActionSpec::new("TransportState", &[], &["Value"], transport_state),
        ],
        makestate: receiver_state,
        event_style: EventStyle::Properties,
    }
}
