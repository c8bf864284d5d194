//! Clients typés des services de rendu.

mod avtransport;
mod ohproduct;
mod ohreceiver;
mod ohsender;
mod renderingcontrol;

pub use avtransport::{AV_TRANSPORT_TYPE, AvTransportClient, PositionInfo, TransportInfo};
pub use ohproduct::{OH_PRODUCT_TYPE, OhProductClient, ProductSource, parse_source_xml};
pub use ohreceiver::{OH_RECEIVER_TYPE, OhReceiverClient};
pub use ohsender::{OH_SENDER_TYPE, OhSenderClient};
pub use renderingcontrol::{RENDERING_CONTROL_TYPE, RenderingControlClient};
