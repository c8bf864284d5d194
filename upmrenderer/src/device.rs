//! Assemblage des devices : MediaRenderer (UPnP AV et/ou OpenHome) et
//! Media Server relais.

use tracing::info;
use upmupnp::{Device, DeviceInfo, ServiceDef};

use crate::context::{RendererContext, RendererOptions};
use crate::services::contentdirectory::{self, MediaServerContext};
use crate::services::{
    avtransport, conmanager, ohinfo, ohplaylist, ohproduct, ohradio, ohreceiver, ohtime, ohvolume,
    renderingcontrol,
};

pub const MEDIA_RENDERER_TYPE: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
pub const MEDIA_SERVER_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";

const MANUFACTURER: &str = "UpMpd";
const MANUFACTURER_URL: &str = "https://www.musicpd.org/";

/// Services publiés selon les options.
///
/// ConnectionManager est toujours présent ; Radio et Receiver n'existent
/// que si la source correspondante est déclarée.
pub fn renderer_services(options: &RendererOptions) -> Vec<ServiceDef<RendererContext>> {
    let mut services = Vec::new();
    if options.upnpav {
        services.push(avtransport::service());
        services.push(renderingcontrol::service());
    }
    services.push(conmanager::service());
    if options.openhome {
        services.push(ohproduct::service());
        services.push(ohplaylist::service());
        services.push(ohinfo::service());
        services.push(ohtime::service());
        services.push(ohvolume::service());
        if !options.radios.is_empty() {
            services.push(ohradio::service());
        }
        if options.receiver {
            services.push(ohreceiver::service());
        }
    }
    services
}

pub fn renderer_info(udn: &str, friendly_name: &str) -> DeviceInfo {
    DeviceInfo {
        udn: udn.to_string(),
        device_type: MEDIA_RENDERER_TYPE.to_string(),
        friendly_name: friendly_name.to_string(),
        manufacturer: MANUFACTURER.to_string(),
        manufacturer_url: MANUFACTURER_URL.to_string(),
        model_name: "upmpdrenderer".to_string(),
        model_number: env!("CARGO_PKG_VERSION").to_string(),
        model_description: "UPnP/OpenHome renderer for MPD".to_string(),
    }
}

pub fn media_server_info(udn: &str, friendly_name: &str) -> DeviceInfo {
    DeviceInfo {
        device_type: MEDIA_SERVER_TYPE.to_string(),
        model_description: "Media Server proxy".to_string(),
        ..renderer_info(udn, friendly_name)
    }
}

pub fn build_renderer(info: DeviceInfo, ctx: RendererContext) -> Device<RendererContext> {
    let services = renderer_services(ctx.options());
    info!(
        "✅ MediaRenderer {} with {} services",
        info.friendly_name,
        services.len()
    );
    Device::new(info, ctx, services)
}

pub fn build_media_server(info: DeviceInfo, ctx: MediaServerContext) -> Device<MediaServerContext> {
    Device::new(info, ctx, vec![contentdirectory::service()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use upmconfig::RadioDef;

    fn ids(options: &RendererOptions) -> Vec<&'static str> {
        renderer_services(options)
            .iter()
            .map(|s| s.service_id.rsplit(':').next().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_default_services() {
        let options = RendererOptions::default();
        assert_eq!(
            ids(&options),
            vec![
                "AVTransport",
                "RenderingControl",
                "ConnectionManager",
                "Product",
                "Playlist",
                "Info",
                "Time",
                "Volume"
            ]
        );
    }

    #[test]
    fn test_optional_sources() {
        let options = RendererOptions {
            upnpav: false,
            receiver: true,
            radios: vec![RadioDef {
                title: "FIP".into(),
                url: "http://radio/fip".into(),
                arturl: String::new(),
            }],
            ..Default::default()
        };
        let ids = ids(&options);
        assert!(!ids.contains(&"AVTransport"));
        assert!(ids.contains(&"ConnectionManager"));
        assert!(ids.contains(&"Radio"));
        assert!(ids.contains(&"Receiver"));
    }

    #[test]
    fn test_openhome_only_keeps_connection_manager() {
        let options = RendererOptions {
            openhome: false,
            ..Default::default()
        };
        assert_eq!(
            ids(&options),
            vec!["AVTransport", "RenderingControl", "ConnectionManager"]
        );
    }
}
