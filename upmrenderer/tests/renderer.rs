mod common;

use common::*;
use upmrenderer::idarray::decode_id_array;
use upmrenderer::{PlayerState, RendererOptions};
use upmupnp::UpnpDevice;

fn insert(device: &dyn UpnpDevice, after: &str, uri: &str, title: &str) -> String {
    let didl = track_didl(uri, title);
    let out = call(
        device,
        PLAYLIST,
        "Insert",
        &[("AfterId", after), ("Uri", uri), ("Metadata", &didl)],
    )
    .unwrap();
    out["NewId"].clone()
}

#[test]
fn test_playlist_modes_show_in_avtransport() {
    let (device, _player) = renderer(RendererOptions::default());
    call(&device, PLAYLIST, "SetRepeat", &[("Value", "1")]).unwrap();
    call(&device, PLAYLIST, "SetShuffle", &[("Value", "1")]).unwrap();

    let out = call(&device, AVT, "GetTransportSettings", &[("InstanceID", "0")]).unwrap();
    assert_eq!(out["PlayMode"], "RANDOM");

    let shuffle = call(&device, PLAYLIST, "Shuffle", &[]).unwrap();
    assert_eq!(shuffle["Value"], "1");
}

#[test]
fn test_insert_then_read_list() {
    let (device, player) = renderer(RendererOptions::default());
    let first = insert(&device, "0", "http://srv/1.flac", "First");
    let second = insert(&device, &first, "http://srv/2.flac", "Second");
    assert_eq!(player.state.lock().uris(), vec!["http://srv/1.flac", "http://srv/2.flac"]);

    let list = format!("{} {} 999", first, second);
    let out = call(&device, PLAYLIST, "ReadList", &[("IdList", &list)]).unwrap();
    let tracks = &out["TrackList"];
    let at_first = tracks.find(&format!("<Id>{}</Id>", first)).unwrap();
    let at_second = tracks.find(&format!("<Id>{}</Id>", second)).unwrap();
    assert!(at_first < at_second);
    assert!(tracks.contains("First"));
    assert!(tracks.contains("Second"));
    assert!(!tracks.contains("<Id>999</Id>"));

    let read = call(&device, PLAYLIST, "Read", &[("Id", &first)]).unwrap();
    assert_eq!(read["Uri"], "http://srv/1.flac");
    assert!(read["Metadata"].contains("First"));

    let err = call(&device, PLAYLIST, "Read", &[("Id", "999")]).unwrap_err();
    assert_eq!(err.code(), 800);
}

#[test]
fn test_insert_after_unknown_id_fails() {
    let (device, _player) = renderer(RendererOptions::default());
    let didl = track_didl("http://srv/1.flac", "First");
    let err = call(
        &device,
        PLAYLIST,
        "Insert",
        &[("AfterId", "42"), ("Uri", "http://srv/1.flac"), ("Metadata", &didl)],
    )
    .unwrap_err();
    assert_eq!(err.code(), 800);
}

#[test]
fn test_insert_rejects_unsupported_format() {
    let (device, player) = renderer(RendererOptions::default());
    let didl = track_didl("http://srv/1.flac", "First").replace("audio/flac", "video/mp4");
    let err = call(
        &device,
        PLAYLIST,
        "Insert",
        &[("AfterId", "0"), ("Uri", "http://srv/1.flac"), ("Metadata", &didl)],
    )
    .unwrap_err();
    assert_eq!(err.code(), 402);
    assert!(player.state.lock().queue.is_empty());
}

#[test]
fn test_id_array_follows_queue_version() {
    let (device, player) = renderer(RendererOptions::default());
    let first = insert(&device, "0", "http://srv/1.flac", "First");
    let second = insert(&device, &first, "http://srv/2.flac", "Second");

    device.event_data(false);
    let reads = player.state.lock().queue_reads;
    assert!(reads >= 1);
    device.event_data(false);
    assert_eq!(player.state.lock().queue_reads, reads);

    let array = call(&device, PLAYLIST, "IdArray", &[]).unwrap();
    let again = call(&device, PLAYLIST, "IdArray", &[]).unwrap();
    assert_eq!(player.state.lock().queue_reads, reads);
    assert_eq!(again["Token"], array["Token"]);
    assert_eq!(again["Array"], array["Array"]);
    let ids = decode_id_array(&array["Array"]).unwrap();
    let expected: Vec<u32> = vec![first.parse().unwrap(), second.parse().unwrap()];
    assert_eq!(ids, expected);

    let changed = call(&device, PLAYLIST, "IdArrayChanged", &[("Token", &array["Token"])]).unwrap();
    assert_eq!(changed["Value"], "0");

    let third = insert(&device, "0", "http://srv/3.flac", "Third");
    device.event_data(false);
    assert!(player.state.lock().queue_reads > reads);

    let fresh = call(&device, PLAYLIST, "IdArray", &[]).unwrap();
    assert_ne!(fresh["Token"], array["Token"]);
    let ids = decode_id_array(&fresh["Array"]).unwrap();
    assert_eq!(ids[0].to_string(), third);
    assert_eq!(ids.len(), 3);

    let changed = call(&device, PLAYLIST, "IdArrayChanged", &[("Token", &array["Token"])]).unwrap();
    assert_eq!(changed["Value"], "1");
}

#[test]
fn test_mute_is_idempotent_across_services() {
    let (device, player) = renderer(RendererOptions::default());
    let mute = |value: &str| {
        call(
            &device,
            RCS,
            "SetMute",
            &[("InstanceID", "0"), ("Channel", "Master"), ("DesiredMute", value)],
        )
        .unwrap();
    };

    mute("1");
    assert_eq!(player.state.lock().volume, 0);
    mute("1");
    assert_eq!(player.state.lock().volume, 0);

    let oh = call(&device, VOLUME, "Mute", &[]).unwrap();
    assert_eq!(oh["Value"], "1");

    call(&device, VOLUME, "SetMute", &[("Value", "0")]).unwrap();
    assert_eq!(player.state.lock().volume, 40);
    call(&device, VOLUME, "SetMute", &[("Value", "0")]).unwrap();
    assert_eq!(player.state.lock().volume, 40);

    let rcs = call(
        &device,
        RCS,
        "GetMute",
        &[("InstanceID", "0"), ("Channel", "Master")],
    )
    .unwrap();
    assert_eq!(rcs["CurrentMute"], "0");
}

#[test]
fn test_rendering_control_checks_arguments() {
    let (device, _player) = renderer(RendererOptions::default());
    let err = call(
        &device,
        RCS,
        "SetVolume",
        &[("InstanceID", "0"), ("Channel", "Master"), ("DesiredVolume", "101")],
    )
    .unwrap_err();
    assert_eq!(err.code(), 402);

    let err = call(
        &device,
        RCS,
        "GetVolume",
        &[("InstanceID", "3"), ("Channel", "Master")],
    )
    .unwrap_err();
    assert_eq!(err.code(), 702);

    let err = call(&device, AVT, "GetTransportInfo", &[("InstanceID", "1")]).unwrap_err();
    assert_eq!(err.code(), 718);
}

#[test]
fn test_source_switch_restores_playlist() {
    let options = RendererOptions {
        radios: radios(),
        ..Default::default()
    };
    let (device, player) = renderer(options);
    let first = insert(&device, "0", "http://srv/1.flac", "First");
    insert(&device, &first, "http://srv/2.flac", "Second");
    call(&device, PLAYLIST, "SeekIndex", &[("Value", "1")]).unwrap();

    call(&device, RADIO, "SetId", &[("Value", "1")]).unwrap();
    call(&device, RADIO, "Play", &[]).unwrap();
    {
        let s = player.state.lock();
        assert_eq!(s.uris(), vec!["http://radio.example/fip"]);
        assert_eq!(s.state, PlayerState::Play);
        assert!(s.single);
    }
    let index = call(&device, PRODUCT, "SourceIndex", &[]).unwrap();
    assert_eq!(index["Value"], "1");

    let transport = call(&device, PLAYLIST, "TransportState", &[]).unwrap();
    assert_eq!(transport["Value"], "Stopped");
    let err = call(&device, PLAYLIST, "Stop", &[]).unwrap_err();
    assert_eq!(err.code(), 501);

    call(&device, PLAYLIST, "Play", &[]).unwrap();
    let s = player.state.lock();
    assert_eq!(s.uris(), vec!["http://srv/1.flac", "http://srv/2.flac"]);
    assert_eq!(s.current, Some(1));
    assert_eq!(s.state, PlayerState::Play);
    assert!(!s.single);
    drop(s);

    let index = call(&device, PRODUCT, "SourceIndex", &[]).unwrap();
    assert_eq!(index["Value"], "0");
}

#[test]
fn test_set_source_index_by_name() {
    let options = RendererOptions {
        radios: radios(),
        ..Default::default()
    };
    let (device, _player) = renderer(options);
    call(&device, PRODUCT, "SetSourceIndexByName", &[("Value", "Radio")]).unwrap();
    let index = call(&device, PRODUCT, "SourceIndex", &[]).unwrap();
    assert_eq!(index["Value"], "1");

    let err = call(&device, PRODUCT, "SetSourceIndexByName", &[("Value", "Disc")]).unwrap_err();
    assert_eq!(err.code(), 402);
    let err = call(&device, PRODUCT, "SetSourceIndex", &[("Value", "5")]).unwrap_err();
    assert_eq!(err.code(), 402);
}

#[test]
fn test_avtransport_uri_with_own_queue() {
    let (device, player) = renderer(RendererOptions::default());
    insert(&device, "0", "http://srv/1.flac", "First");
    insert(&device, "0", "http://srv/2.flac", "Second");

    let current = "http://srv/3.flac";
    let didl = track_didl(current, "Third");
    call(
        &device,
        AVT,
        "SetAVTransportURI",
        &[("InstanceID", "0"), ("CurrentURI", current), ("CurrentURIMetaData", &didl)],
    )
    .unwrap();
    assert_eq!(player.state.lock().uris(), vec![current]);

    let next = "http://srv/4.flac";
    let didl = track_didl(next, "Fourth");
    call(
        &device,
        AVT,
        "SetNextAVTransportURI",
        &[("InstanceID", "0"), ("NextURI", next), ("NextURIMetaData", &didl)],
    )
    .unwrap();
    assert_eq!(player.state.lock().uris(), vec![current, next]);

    let media = call(&device, AVT, "GetMediaInfo", &[("InstanceID", "0")]).unwrap();
    assert_eq!(media["CurrentURI"], current);
    assert_eq!(media["NextURI"], next);

    call(&device, AVT, "Play", &[("InstanceID", "0"), ("Speed", "1")]).unwrap();
    let info = call(&device, AVT, "GetTransportInfo", &[("InstanceID", "0")]).unwrap();
    assert_eq!(info["CurrentTransportState"], "PLAYING");

    call(&device, AVT, "Next", &[("InstanceID", "0")]).unwrap();
    let media = call(&device, AVT, "GetMediaInfo", &[("InstanceID", "0")]).unwrap();
    assert_eq!(media["CurrentURI"], next);
    assert_eq!(media["NextURI"], "");
}

#[test]
fn test_avtransport_rejects_unsupported_format() {
    let (device, player) = renderer(RendererOptions::default());
    let uri = "http://srv/v.mp4";
    let didl = track_didl(uri, "Video").replace("audio/flac", "video/mp4");
    let err = call(
        &device,
        AVT,
        "SetAVTransportURI",
        &[("InstanceID", "0"), ("CurrentURI", uri), ("CurrentURIMetaData", &didl)],
    )
    .unwrap_err();
    assert_eq!(err.code(), 714);
    assert!(player.state.lock().queue.is_empty());
}

#[test]
fn test_play_medium_follows_player_state() {
    let (device, _player) = renderer(RendererOptions::default());
    let uri = "http://srv/1.flac";
    let didl = track_didl(uri, "First");
    call(
        &device,
        AVT,
        "SetAVTransportURI",
        &[("InstanceID", "0"), ("CurrentURI", uri), ("CurrentURIMetaData", &didl)],
    )
    .unwrap();
    call(&device, AVT, "Play", &[("InstanceID", "0"), ("Speed", "1")]).unwrap();
    let media = call(&device, AVT, "GetMediaInfo", &[("InstanceID", "0")]).unwrap();
    assert_eq!(media["PlayMedium"], "HDD");

    call(&device, AVT, "Stop", &[("InstanceID", "0")]).unwrap();
    let media = call(&device, AVT, "GetMediaInfo", &[("InstanceID", "0")]).unwrap();
    assert_eq!(media["PlayMedium"], "NONE");
    assert_eq!(media["CurrentURI"], uri);
}
