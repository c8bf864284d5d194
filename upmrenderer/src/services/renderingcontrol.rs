//! # RenderingControl - volume et sourdine UPnP AV
//!
//! ## Fonctionnalités
//!
//! - ✅ GetVolume, SetVolume (0..100, canal `Master`)
//! - ✅ GetVolumeDB, SetVolumeDB, GetVolumeDBRange (1/256 dB)
//! - ✅ GetMute, SetMute (volume mémorisé puis restauré)
//! - ✅ ListPresets, SelectPreset (`FactoryDefaults`)
//! - ✅ Événements `LastChange`

use tracing::debug;
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::lastchange::RCS_NAMESPACE;
use upmupnp::soap::bool_to_wire;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;
use crate::volume::{MAX_VOLUME_DB, MIN_VOLUME_DB, db_to_percent, percent_to_db};

pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
pub const SERVICE_ID: &str = "urn:upnp-org:serviceId:RenderingControl";

const PRESET_NAME: &str = "FactoryDefaults";
const DEFAULT_VOLUME: i32 = 50;

const INVALID_NAME: u16 = 701;
const INVALID_INSTANCE_ID: u16 = 702;

fn check_instance(call: &PendingAction) -> ActionResult<()> {
    match call.int("InstanceID")? {
        0 => Ok(()),
        other => Err(ActionError::service(
            INVALID_INSTANCE_ID,
            format!("Invalid InstanceID {}", other),
        )),
    }
}

fn check_channel(call: &PendingAction) -> ActionResult<()> {
    check_instance(call)?;
    match call.string("Channel")? {
        "Master" => Ok(()),
        other => Err(ActionError::invalid_param(format!("unknown channel {}", other))),
    }
}

fn rcs_state(ctx: &mut RendererContext) -> StateVariableMap {
    let volume = ctx.status().volume;
    let muted = ctx.is_muted();
    state_map([
        ("Volume", volume.to_string()),
        ("VolumeDB", percent_to_db(volume).to_string()),
        ("Mute", bool_to_wire(muted).to_string()),
        ("PresetNameList", PRESET_NAME.to_string()),
    ])
}

fn get_volume(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    Ok(SoapOutgoing::new().arg("CurrentVolume", ctx.volume()?.to_string()))
}

fn set_volume(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    let volume = call.i32("DesiredVolume")?;
    if !(0..=100).contains(&volume) {
        return Err(ActionError::invalid_param(format!("volume {} out of range", volume)));
    }
    ctx.set_volume(volume)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn get_volume_db(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    let db = percent_to_db(ctx.volume()?);
    Ok(SoapOutgoing::new().arg("CurrentVolume", db.to_string()))
}

fn set_volume_db(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    let db = call.i32("DesiredVolume")?.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
    ctx.set_volume(db_to_percent(db))?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn get_volume_db_range(_ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    Ok(SoapOutgoing::new()
        .arg("MinValue", MIN_VOLUME_DB.to_string())
        .arg("MaxValue", MAX_VOLUME_DB.to_string()))
}

fn get_mute(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    ctx.refresh_status()?;
    let muted = ctx.is_muted();
    Ok(SoapOutgoing::new().arg("CurrentMute", bool_to_wire(muted)))
}

fn set_mute(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_channel(call)?;
    ctx.set_mute(call.bool("DesiredMute")?)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn list_presets(_ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    Ok(SoapOutgoing::new().arg("CurrentPresetNameList", PRESET_NAME))
}

fn select_preset(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    check_instance(call)?;
    let name = call.string("PresetName")?;
    if name != PRESET_NAME {
        return Err(ActionError::service(INVALID_NAME, format!("unknown preset {}", name)));
    }
    debug!("RenderingControl: {} preset", PRESET_NAME);
    ctx.set_volume(DEFAULT_VOLUME)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

const INSTANCE_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID")];
const CHANNEL_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID"), ArgSpec::string("Channel")];
const SET_VOLUME_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("Channel"),
    ArgSpec::ui4("DesiredVolume"),
];
const SET_VOLUME_DB_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("Channel"),
    ArgSpec::i4("DesiredVolume"),
];
const SET_MUTE_ARGS: &[ArgSpec] = &[
    ArgSpec::ui4("InstanceID"),
    ArgSpec::string("Channel"),
    ArgSpec::boolean("DesiredMute"),
];
const SELECT_PRESET_ARGS: &[ArgSpec] = &[ArgSpec::ui4("InstanceID"), ArgSpec::string("PresetName")];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("GetVolume", CHANNEL_ARGS, &["CurrentVolume"], get_volume),
            ActionSpec::new("SetVolume", SET_VOLUME_ARGS, &[], set_volume),
            ActionSpec::new("GetVolumeDB", CHANNEL_ARGS, &["CurrentVolume"], get_volume_db),
            ActionSpec::new("SetVolumeDB", SET_VOLUME_DB_ARGS, &[], set_volume_db),
            ActionSpec::new(
                "GetVolumeDBRange",
                CHANNEL_ARGS,
                &["MinValue", "MaxValue"],
                get_volume_db_range,
            ),
            ActionSpec::new("GetMute", CHANNEL_ARGS, &["CurrentMute"], get_mute),
            ActionSpec::new("SetMute", SET_MUTE_ARGS, &[], set_mute),
            ActionSpec::new("ListPresets", INSTANCE_ARGS, &["CurrentPresetNameList"], list_presets),
            ActionSpec::new("SelectPreset", SELECT_PRESET_ARGS, &[], select_preset),
        ],
        makestate: rcs_state,
        event_style: EventStyle::LastChange {
            namespace: RCS_NAMESPACE,
            quiet: &[],
            channel_vars: &["Volume", "VolumeDB", "Mute"],
        },
    }
}
