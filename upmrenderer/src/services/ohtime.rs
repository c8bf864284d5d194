//! OpenHome Time : durée et position du morceau courant.

use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::state::state_map;
use upmupnp::{ActionSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;
use crate::services::song_secs;

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Time:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Time";

fn ohtime_state(ctx: &mut RendererContext) -> StateVariableMap {
    let status = ctx.status();
    state_map([
        ("TrackCount", status.track_counter.to_string()),
        ("Duration", song_secs(status, status.length_ms)),
        ("Seconds", song_secs(status, status.elapsed_ms)),
    ])
}

fn time(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.refresh_status()?;
    let state = ohtime_state(ctx);
    let mut out = SoapOutgoing::new();
    for name in TIME_OUTS {
        out.push(name, state.get(*name).cloned().unwrap_or_default());
    }
    Ok(out)
}

const TIME_OUTS: &[&str] = &["TrackCount", "Duration", "Seconds"];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![ActionSpec::new("Time", &[], TIME_OUTS, time)],
        makestate: ohtime_state,
        event_style: EventStyle::Properties,
    }
}
