//! # OpenHome Product - identité du produit et choix de la source
//!
//! ## Fonctionnalités
//!
//! - ✅ Manufacturer, Model, Product (configurables)
//! - ✅ Standby, SetStandby
//! - ✅ Liste des sources (Playlist, Radio, Receiver) et `SourceXml`
//! - ✅ SetSourceIndex, SetSourceIndexByName avec passage de relais entre sources

use tracing::debug;
use upmconfig::ProductInfo;
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::soap::bool_to_wire;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

use crate::context::{RendererContext, SourceKind};

pub const SERVICE_TYPE: &str = "urn:av-openhome-org:service:Product:1";
pub const SERVICE_ID: &str = "urn:av-openhome-org:serviceId:Product";

pub(crate) fn source_xml(sources: &[SourceKind]) -> String {
    let mut xml = String::from("<SourceList>\n");
    for source in sources {
        xml.push_str(&format!(
            " <Source>\n  <Name>{0}</Name>\n  <Type>{0}</Type>\n  <Visible>true</Visible>\n  </Source>\n",
            source
        ));
    }
    xml.push_str("</SourceList>\n");
    xml
}

fn attributes(sources: &[SourceKind]) -> String {
    let mut attrs = String::from("Info Time Volume");
    if sources.contains(&SourceKind::Receiver) {
        attrs.push_str(" Receiver");
    }
    if sources.contains(&SourceKind::Radio) {
        attrs.push_str(" Radio");
    }
    attrs
}

fn identity(out: SoapOutgoing, info: &ProductInfo) -> SoapOutgoing {
    out.arg("Name", info.name.clone())
        .arg("Info", info.info.clone())
        .arg("Url", info.url.clone())
        .arg("ImageUri", info.imageuri.clone())
}

fn product_state(ctx: &mut RendererContext) -> StateVariableMap {
    let options = &ctx.options;
    let product = &ctx.product;
    state_map([
        ("ManufacturerName", options.manufacturer.name.clone()),
        ("ManufacturerInfo", options.manufacturer.info.clone()),
        ("ManufacturerUrl", options.manufacturer.url.clone()),
        ("ManufacturerImageUri", options.manufacturer.imageuri.clone()),
        ("ModelName", options.model.name.clone()),
        ("ModelInfo", options.model.info.clone()),
        ("ModelUrl", options.model.url.clone()),
        ("ModelImageUri", options.model.imageuri.clone()),
        ("ProductRoom", options.room.clone()),
        ("ProductName", options.product.name.clone()),
        ("ProductInfo", options.product.info.clone()),
        ("ProductUrl", options.product.url.clone()),
        ("ProductImageUri", options.product.imageuri.clone()),
        ("Standby", bool_to_wire(product.standby).to_string()),
        ("SourceCount", product.sources.len().to_string()),
        ("SourceXml", source_xml(&product.sources)),
        ("SourceIndex", product.index.to_string()),
        ("Attributes", attributes(&product.sources)),
    ])
}

fn manufacturer(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(identity(SoapOutgoing::new(), &ctx.options.manufacturer))
}

fn model(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(identity(SoapOutgoing::new(), &ctx.options.model))
}

fn product(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let out = SoapOutgoing::new().arg("Room", ctx.options.room.clone());
    Ok(identity(out, &ctx.options.product))
}

fn standby(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", bool_to_wire(ctx.product.standby)))
}

fn set_standby(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    ctx.product.standby = call.bool("Value")?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn source_count(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.product.sources.len().to_string()))
}

fn source_xml_action(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", source_xml(&ctx.product.sources)))
}

fn source_index(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", ctx.product.index.to_string()))
}

fn set_source_index(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let index = call.int("Value")? as usize;
    ctx.set_source_index(index)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn set_source_index_by_name(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let name = call.string("Value")?;
    let index = ctx
        .product
        .sources
        .iter()
        .position(|source| source.as_str() == name)
        .ok_or_else(|| ActionError::invalid_param(format!("unknown source {}", name)))?;
    debug!("product: source {} is index {}", name, index);
    ctx.set_source_index(index)?;
    call.wake();
    Ok(SoapOutgoing::new())
}

fn source(ctx: &mut RendererContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let index = call.int("Index")? as usize;
    let source = ctx
        .product
        .sources
        .get(index)
        .ok_or_else(|| ActionError::invalid_param(format!("bad source index {}", index)))?;
    Ok(SoapOutgoing::new()
        .arg("SystemName", source.as_str())
        .arg("Type", source.as_str())
        .arg("Name", source.as_str())
        .arg("Visible", "1"))
}

fn attributes_action(ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", attributes(&ctx.product.sources)))
}

fn source_xml_change_count(_ctx: &mut RendererContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("Value", "0"))
}

const IDENTITY_OUTS: &[&str] = &["Name", "Info", "Url", "ImageUri"];
const PRODUCT_OUTS: &[&str] = &["Room", "Name", "Info", "Url", "ImageUri"];
const VALUE_BOOL_ARGS: &[ArgSpec] = &[ArgSpec::boolean("Value")];
const VALUE_UI4_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Value")];
const VALUE_STRING_ARGS: &[ArgSpec] = &[ArgSpec::string("Value")];
const INDEX_ARGS: &[ArgSpec] = &[ArgSpec::ui4("Index")];

pub fn service() -> ServiceDef<RendererContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("Manufacturer", &[], IDENTITY_OUTS, manufacturer),
            ActionSpec::new("Model", &[], IDENTITY_OUTS, model),
            ActionSpec::new("Product", &[], PRODUCT_OUTS, product),
            ActionSpec::new("Standby", &[], &["Value"], standby),
            ActionSpec::new("SetStandby", VALUE_BOOL_ARGS, &[], set_standby),
            ActionSpec::new("SourceCount", &[], &["Value"], source_count),
            ActionSpec::new("SourceXml", &[], &["Value"], source_xml_action),
            ActionSpec::new("SourceIndex", &[], &["Value"], source_index),
            ActionSpec::new("SetSourceIndex", VALUE_UI4_ARGS, &[], set_source_index),
            ActionSpec::new("SetSourceIndexByName", VALUE_STRING_ARGS, &[], set_source_index_by_name),
            ActionSpec::new(
                "Source",
                INDEX_ARGS,
                &["SystemName", "Type", "Name", "Visible"],
                source,
            ),
            ActionSpec::new("Attributes", &[], &["Value"], attributes_action),
            ActionSpec::new("SourceXmlChangeCount", &[], &["Value"], source_xml_change_count),
        ],
        makestate: product_state,
        event_style: EventStyle::Properties,
    }
}
