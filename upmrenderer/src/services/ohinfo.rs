//! OpenHome Info : morceau courant, caractéristiques du flux, métatexte.

use upmdidl::didlmake;
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::state::state_map;
use upmupnp::{ActionSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;
use crate::services::song_secs;

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Info:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Info";

fn ohinfo_state(ctx: &mut RendererContext) -> StateVariableMap {
    let status = ctx.status().clone();
    let is_song = status.is_song();
    let (uri, metadata) = if is_song {
        let uri = status.current_song.uri.clone();
        let metadata = ctx
            .playlist
            .cache
            .get(&uri)
            .cloned()
            .unwrap_or_else(|| didlmake(&status.current_song));
        (uri, metadata)
    } else {
        (String::new(), String::new())
    };
    let when_song = |value: u32| if is_song { value.to_string() } else { "0".to_string() };

    state_map([
        ("TrackCount", status.track_counter.to_string()),
        ("DetailsCount", status.details_counter.to_string()),
        ("MetatextCount", "0".to_string()),
        ("Uri", uri),
        ("Metadata", metadata),
        ("Duration", song_secs(&status, status.length_ms)),
        ("BitRate", when_song(status.kbrate * 1000)),
        ("BitDepth", when_song(status.bit_depth)),
        ("SampleRate", when_song(status.sample_rate)),
        ("Lossless", "0".to_string()),
        ("CodecName", String::new()),
        ("Metatext", ctx.metatext.clone()),
    ])
}

fn reply(ctx: &mut RendererContext, names: &[&str]) -> ActionResult<SoapOutgoing> {
    ctx.refresh_status()?;
    let state = ohinfo_state(ctx);
    let mut out = SoapOutgoing::new();
    for name in names {
        out.push(name, state.get(*name).cloned().unwrap_or_default());
    }
    Ok(out)
}

fn counters(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    reply(ctx, COUNTERS_OUTS)
}

fn track(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    reply(ctx, TRACK_OUTS)
}

fn details(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    reply(ctx, DETAILS_OUTS)
}

fn metatext(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.metatext.clone()))
}

const COUNTERS_OUTS: &[&str] = &["TrackCount", "DetailsCount", "MetatextCount"];
const TRACK_OUTS: &[&str] = &["Uri", "Metadata"];
const DETAILS_OUTS: &[&str] = &[
    "Duration",
    "BitRate",
    "BitDepth",
    "SampleRate",
    "Lossless",
    "CodecName",
];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Counters", &[], COUNTERS_OUTS, counters),
            ActionSpec::new("Track", &[], TRACK_OUTS, track),
            ActionSpec::new("Details", &[], DETAILS_OUTS, details),
            ActionSpec::new("Metatext", &[], &["Value"], metatext),
        ],
        makestate: ohinfo_state,
        event_style: EventStyle::Properties,
    }
}
