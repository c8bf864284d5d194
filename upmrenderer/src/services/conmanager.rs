//! ConnectionManager : une seule connexion (0), formats acceptés en entrée.

use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::RendererContext;

pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";
pub const SERVICE_ID: &str = "urn:upnp-org:serviceId:ConnectionManager";

fn cm_state(ctx: &mut RendererContext) -> StateVariableMap {
    state_map([
        ("SourceProtocolInfo", String::new()),
        ("SinkProtocolInfo", ctx.protocol_info.text().to_string()),
        ("CurrentConnectionIDs", "0".to_string()),
    ])
}

fn get_current_connection_ids(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("ConnectionIDs", "0"))
}

fn get_current_connection_info(_ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let id = call.string("ConnectionID")?;
    if id.trim() != "0" {
        return Err(ActionError::invalid_param(format!("unknown connection {}", id)));
    }
    Ok(SoapOutgoing::new()
        .arg("RcsID", "0")
        .arg("AVTransportID", "0")
        .arg("ProtocolInfo", "")
        .arg("PeerConnectionManager", "")
        .arg("PeerConnectionID", "-1")
        .arg("Direction", "Input")
        .arg("Status", "Unknown"))
}

fn get_protocol_info(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new()
        .arg("Source", "")
        .arg("Sink", ctx.protocol_info.text()))
}

const CONNECTION_INFO_ARGS: &[ArgSpec] = &[ArgSpec::string("ConnectionID")];
const CONNECTION_INFO_OUTS: &[&str] = &[
    "RcsID",
    "AVTransportID",
    "ProtocolInfo",
    "PeerConnectionManager",
    "PeerConnectionID",
    "Direction",
    "Status",
];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new(
                "GetCurrentConnectionIDs",
                &[],
                &["ConnectionIDs"],
                get_current_connection_ids,
            ),
            ActionSpec::new(
                "GetCurrentConnectionInfo",
                CONNECTION_INFO_ARGS,
                CONNECTION_INFO_OUTS,
                get_current_connection_info,
            ),
            ActionSpec::new("GetProtocolInfo", &[], &["Source", "Sink"], get_protocol_info),
        ],
        makestate: cm_state,
        event_style: EventStyle::AllOnly,
    }
}
