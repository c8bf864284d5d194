//! OpenHome Volume : volume 0..100 sans balance ni fondu.

use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::soap::bool_to_wire;
use upmupnp::state::state_map;
use upmupnp::{ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Volume:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Volume";

const VOLUME_MAX: i32 = 100;
const VOLUME_STEP: i32 = 1;
/// 1 % de volume vaut 0,5 dB
const MILLI_DB_PER_STEP: &str = "500";

fn ohvolume_state(ctx: &mut RendererContext) -> StateVariableMap {
    let volume = ctx.status().volume;
    let muted = ctx.is_muted();
    state_map([
        ("VolumeMax", VOLUME_MAX.to_string()),
        ("VolumeLimit", VOLUME_MAX.to_string()),
        ("VolumeUnity", VOLUME_MAX.to_string()),
        ("VolumeSteps", VOLUME_MAX.to_string()),
        ("VolumeMilliDbPerStep", MILLI_DB_PER_STEP.to_string()),
        ("Balance", "0".to_string()),
        ("BalanceMax", "0".to_string()),
        ("Fade", "0".to_string()),
        ("FadeMax", "0".to_string()),
        ("Volume", volume.to_string()),
        ("Mute", bool_to_wire(muted).to_string()),
    ])
}

fn characteristics(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new()
        .arg("VolumeMax", VOLUME_MAX.to_string())
        .arg("VolumeUnity", VOLUME_MAX.to_string())
        .arg("VolumeSteps", VOLUME_MAX.to_string())
        .arg("VolumeMilliDbPerStep", MILLI_DB_PER_STEP)
        .arg("BalanceMax", "0")
        .arg("FadeMax", "0"))
}

fn set_volume(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.set_volume(call.i32("Value")?)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn volume(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.volume()?.to_string()))
}

fn step_volume(ctx: &mut RendererContext, call: &PendingAction, delta: i32) -> ActionResult<SoapOutgoing> {
    let current = ctx.volume()?;
    ctx.set_volume((current + delta).clamp(0, VOLUME_MAX))?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn volume_inc(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    step_volume(ctx, call, VOLUME_STEP)
}

fn volume_dec(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    step_volume(ctx, call, -VOLUME_STEP)
}

fn volume_limit(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", VOLUME_MAX.to_string()))
}

fn mute(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.refresh_status()?;
    let muted = ctx.is_muted();
    Ok(SoapOutgoing::new().arg("Value", bool_to_wire(muted)))
}

fn set_mute(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.set_mute(call.bool("Value")?)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

const SET_VOLUME_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Value")];
const SET_MUTE_ARGS: &[ArgSpec] = &[ArgSpec::boolean("Value")];
const CHARACTERISTICS_OUTS: &[&str] = &[
    "VolumeMax",
    "VolumeUnity",
    "VolumeSteps",
    "VolumeMilliDbPerStep",
    "BalanceMax",
    "FadeMax",
];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Characteristics", &[], CHARACTERISTICS_OUTS, characteristics),
            ActionSpec::new("SetVolume", SET_VOLUME_ARGS, &[], set_volume),
            ActionSpec::new("Volume", &[], &["Value"], volume),
            ActionSpec::new("VolumeInc", &[], &[], volume_inc),
            ActionSpec::new("VolumeDec", &[], &[], volume_dec),
            ActionSpec::new("VolumeLimit", &[], &["Value"], volume_limit),
            ActionSpec::new("Mute", &[], &["Value"], mute),
            ActionSpec::new("SetMute", SET_MUTE_ARGS, &[], set_mute),
        ],
        makestate: ohvolume_state,
        event_style: EventStyle::Properties,
    }
}
