//! End-to-end tests over localhost sockets
//!
//! Each test runs a real `LinkService` against a [`PeerSocket`] playing the
//! remote application.

use std::cell::RefCell;
use std::net::TcpListener;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use datalink_core::{LinkError, LinkId, OpCode, Template, Transform, Vec3};
use datalink_runtime::{EventKind, LinkEvent, LinkService, StartMode, CHARACTER_CREATOR, ICLONE};
use datalink_transport::LinkState;
use datalink_wire::{
    ActorPose, ActorRef, ActorTemplate, CameraSyncPayload, CharacterPayload,
    CharacterUpdatePayload, Hello, Message, MorphPayload, Notify, PosePayload, PoseRecord,
    RigifyPayload, SequenceEndPayload, SequencePayload, TemplatePayload, ViewCamera,
};

use crate::{
    closed_port, connect_peer, numbered_template, peer_hello, pump, test_config, MockScene,
    PeerSocket, TICK,
};

fn bob_template() -> Template {
    numbered_template(2, &["smile"], &["AA", "EE"])
}

fn bob_scene() -> MockScene {
    MockScene::new().with_actor("bob", "Bob", bob_template())
}

fn connected(scene: MockScene) -> (LinkService<MockScene>, PeerSocket) {
    let mut service = LinkService::new(test_config(), scene).unwrap();
    let (peer, _) = connect_peer(&mut service, &peer_hello(ICLONE)).unwrap();
    (service, peer)
}

/// Pose of bob at `frame`, shaped like [`bob_template`]
fn bob_pose(frame: u32) -> ActorPose {
    let f = frame as f32;
    let mut pose = ActorPose::new("Bob", LinkId::from("bob"));
    pose.root = Transform {
        translation: Vec3::new(f, 0.0, 0.0),
        ..Transform::IDENTITY
    };
    pose.bones = vec![Transform::IDENTITY; 2];
    pose.expressions = vec![0.5];
    pose.visemes = vec![0.25, 0.75];
    pose
}

fn bob_record(frame: u32) -> Vec<u8> {
    let mut record = PoseRecord::new(frame);
    record.actors.push(bob_pose(frame));
    record.encode()
}

fn send_bob_template(peer: &mut PeerSocket) {
    let templates = TemplatePayload::new(vec![ActorTemplate::new("Bob", "bob", &bob_template())]);
    peer.send_json(OpCode::Template, &templates).unwrap();
}

fn send_bob_sequence(peer: &mut PeerSocket, start: u32, end: u32) {
    let sequence = SequencePayload::new(30.0, start, end, vec![ActorRef::new("Bob", "bob")]);
    peer.send_json(OpCode::Sequence, &sequence).unwrap();
}

// Handshake and lifecycle

#[test]
fn test_handshake_exchanges_identity() {
    let names = Rc::new(RefCell::new(Vec::new()));
    let mut service = LinkService::new(test_config(), MockScene::new()).unwrap();
    let seen = names.clone();
    service.subscribe(EventKind::Connected, move |event| {
        if let LinkEvent::Connected { remote } = event {
            seen.borrow_mut().push(remote.application.clone());
        }
    });

    let (_peer, theirs) = connect_peer(&mut service, &peer_hello(CHARACTER_CREATOR)).unwrap();

    assert_eq!(theirs.application, "Data Link");
    assert_eq!(theirs.path, "/tmp/datalink");
    assert!(service.is_connected());
    assert!(service.is_character_creator());
    assert!(!service.is_iclone());
    assert_eq!(service.remote().unwrap().version, "4.1");
    assert_eq!(
        service.remote_export_path("Bob.fbx"),
        PathBuf::from("/tmp/peer/Bob.fbx")
    );
    assert_eq!(*names.borrow(), vec![CHARACTER_CREATOR.to_string()]);
}

#[test]
fn test_client_mode_handshake() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = test_config();
    config.start_mode = StartMode::ClientOnly;
    config.port = port;
    let mut service = LinkService::new(config, MockScene::new()).unwrap();
    service.service_start().unwrap();
    assert_eq!(service.state(), LinkState::Connecting);

    let (stream, _) = listener.accept().unwrap();
    let mut peer = PeerSocket::from_stream(stream).unwrap();
    let theirs: Hello = peer.expect_json(OpCode::Hello).unwrap();
    assert_eq!(theirs.application, "Data Link");

    peer.send_json(OpCode::Hello, &peer_hello(CHARACTER_CREATOR))
        .unwrap();
    assert!(pump(&mut service, |s| s.is_connected()));
    let notice: Notify = peer.expect_json(OpCode::Notify).unwrap();
    assert_eq!(notice.message, "Connected");
}

#[test]
fn test_auto_start_falls_back_to_server() {
    let mut config = test_config();
    config.start_mode = StartMode::Auto;
    config.port = closed_port().unwrap();
    let mut service = LinkService::new(config, MockScene::new()).unwrap();

    service.service_start().unwrap();
    assert!(service.is_running());
    assert!(service.is_listening());
    assert_eq!(service.state(), LinkState::Listening);

    // Already up: a second start is a no-op
    let addr = service.local_addr().unwrap();
    service.service_start().unwrap();
    assert_eq!(service.local_addr(), Some(addr));

    service.stop();
    assert!(!service.is_listening());
}

#[test]
fn test_client_only_start_fails_without_peer() {
    let mut config = test_config();
    config.start_mode = StartMode::ClientOnly;
    config.port = closed_port().unwrap();
    let mut service = LinkService::new(config, MockScene::new()).unwrap();

    assert!(matches!(
        service.service_start(),
        Err(LinkError::ConnectionFailed(_))
    ));
    assert!(!service.is_running());
    assert!(!service.is_listening());
}

#[test]
fn test_peer_stop_closes_everything() {
    let (mut service, mut peer) = connected(MockScene::new());
    peer.send_op(OpCode::Stop, Vec::new()).unwrap();

    assert!(pump(&mut service, |s| !s.is_running()));
    assert!(!service.is_listening());
    assert_eq!(service.state(), LinkState::Idle);
    assert!(peer.is_closed());
}

#[test]
fn test_peer_disconnect_keeps_server_listening() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    assert!(pump(&mut service, |s| s.registry().len() == 1));

    peer.send_op(OpCode::Disconnect, Vec::new()).unwrap();
    assert!(pump(&mut service, |s| s.state() == LinkState::Listening));
    assert!(service.is_running());
    assert!(service.registry().is_empty());
    assert!(service.remote().is_none());

    // A new peer can connect to the same server
    let (_peer, _) = connect_peer(&mut service, &peer_hello(CHARACTER_CREATOR)).unwrap();
    assert!(service.is_character_creator());
}

#[test]
fn test_keepalive_timers() {
    let mut config = test_config();
    config.transport.keepalive.use_ping = true;
    config.transport.keepalive.ping_interval = Duration::from_secs(1);
    config.transport.keepalive.use_keepalive = true;
    config.transport.keepalive.keepalive_timeout = Duration::from_secs(3);
    let mut service = LinkService::new(config, MockScene::new()).unwrap();
    let (mut peer, _) = connect_peer(&mut service, &peer_hello(ICLONE)).unwrap();

    service.tick(Duration::from_secs(2));
    peer.expect(OpCode::Ping).unwrap();
    assert!(service.is_connected());

    // Silent peer: the link gives up and says so
    service.tick(Duration::from_secs(2));
    peer.expect(OpCode::Stop).unwrap();
    assert!(!service.is_running());
    assert!(!service.is_listening());
}

#[test]
fn test_unknown_opcode_is_ignored() {
    let (mut service, mut peer) = connected(MockScene::new());
    peer.send(&Message {
        opcode: 999,
        payload: vec![1, 2, 3],
    })
    .unwrap();
    peer.send_op(OpCode::Ping, Vec::new()).unwrap();

    assert!(pump(&mut service, |s| s.stats().unknown_opcodes == 1));
    assert!(service.is_connected());
    assert_eq!(service.stats().handler_errors, 0);
}

#[test]
fn test_receive_cap_per_tick() {
    let (mut service, mut peer) = connected(MockScene::new());
    let before = service.stats().messages_in;

    let burst: Vec<u8> = (0..30)
        .flat_map(|_| Message::empty(OpCode::Ping).encode())
        .collect();
    peer.send_raw(&burst).unwrap();
    thread::sleep(Duration::from_millis(100));

    let delay = service.tick(TICK);
    assert_eq!(service.stats().messages_in - before, 24);
    assert_eq!(delay, Duration::ZERO);

    service.tick(TICK);
    assert_eq!(service.stats().messages_in - before, 30);
}

// Sequences

#[test]
fn test_sequence_frames_out_of_order() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    send_bob_sequence(&mut peer, 10, 13);
    for frame in [12, 10, 13, 11] {
        peer.send_op(OpCode::SequenceFrame, bob_record(frame)).unwrap();
    }
    // Outside 10..=13: rejected, session continues
    peer.send_op(OpCode::SequenceFrame, bob_record(20)).unwrap();
    peer.send_json(OpCode::SequenceEnd, &SequenceEndPayload::default())
        .unwrap();

    assert!(pump(&mut service, |s| !s.scene().materialized.is_empty()));
    assert!(!service.sequence().is_active());
    assert_eq!(service.stats().sequence_frames_received, 4);
    assert_eq!(service.stats().handler_errors, 1);
    assert!(service.is_connected());

    let scene = service.scene();
    let cache = scene.materialized_cache("bob").unwrap();
    assert_eq!(cache.start_frame(), 10);
    assert_eq!(cache.frame_count(), 4);
    assert!(cache.is_complete());
    let xs: Vec<f32> = cache.root_track().iter().map(|t| t.translation.x).collect();
    assert_eq!(xs, vec![10.0, 11.0, 12.0, 13.0]);
    assert_eq!(cache.viseme_track(1).unwrap(), &[0.75; 4]);

    assert_eq!(scene.range, (10, 13));
    assert_eq!(scene.prepared, vec![(LinkId::from("bob"), 4)]);
    assert!(scene.has_status("Live Sequence Complete: 4 frames"));
}

#[test]
fn test_connection_loss_aborts_sequence() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    send_bob_sequence(&mut peer, 1, 5);
    peer.send_op(OpCode::SequenceFrame, bob_record(1)).unwrap();
    assert!(pump(&mut service, |s| s.stats().sequence_frames_received == 1));
    assert!(service.sequence().is_receiving());

    drop(peer);
    assert!(pump(&mut service, |s| !s.is_running()));

    assert!(!service.sequence().is_active());
    assert!(service.registry().is_empty());
    assert_eq!(service.stats().connections_lost, 1);
    assert!(service.scene().materialized.is_empty());
    assert_eq!(service.scene().discarded, vec![LinkId::from("bob")]);
    assert!(!service.is_listening());
}

#[test]
fn test_peer_stop_aborts_sequence() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    send_bob_sequence(&mut peer, 1, 5);
    peer.send_op(OpCode::SequenceFrame, bob_record(1)).unwrap();
    assert!(pump(&mut service, |s| s.stats().sequence_frames_received == 1));

    peer.send_op(OpCode::Stop, Vec::new()).unwrap();
    assert!(pump(&mut service, |s| !s.is_running()));

    assert!(!service.sequence().is_active());
    assert!(service.scene().materialized.is_empty());
    assert_eq!(service.scene().discarded, vec![LinkId::from("bob")]);
    assert!(service.registry().is_empty());
}

#[test]
fn test_peer_disconnect_aborts_sequence() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    send_bob_sequence(&mut peer, 1, 5);
    peer.send_op(OpCode::SequenceFrame, bob_record(1)).unwrap();
    assert!(pump(&mut service, |s| s.stats().sequence_frames_received == 1));

    peer.send_op(OpCode::Disconnect, Vec::new()).unwrap();
    assert!(pump(&mut service, |s| s.state() == LinkState::Listening));

    assert!(service.is_running());
    assert!(!service.sequence().is_active());
    assert!(service.scene().materialized.is_empty());
    assert_eq!(service.scene().discarded, vec![LinkId::from("bob")]);
}

#[test]
fn test_oversized_sequence_range_rejected() {
    let (mut service, mut peer) = connected(bob_scene());
    send_bob_template(&mut peer);
    send_bob_sequence(&mut peer, 0, u32::MAX);
    peer.send_op(OpCode::Ping, Vec::new()).unwrap();

    assert!(pump(&mut service, |s| s.stats().handler_errors == 1));
    assert!(service.is_connected());
    assert_eq!(service.state(), LinkState::Connected);
    assert!(!service.sequence().is_active());
    assert!(service.scene().prepared.is_empty());
    assert_eq!(service.scene().range, (1, 250));

    // The link still accepts a sane sequence afterwards
    send_bob_sequence(&mut peer, 1, 2);
    assert!(pump(&mut service, |s| s.sequence().is_receiving()));
    assert_eq!(service.sequence().frame_count(), Some(2));
}

#[test]
fn test_start_sequence_streams_frames() {
    let mut scene = bob_scene();
    scene.range = (1, 3);
    let (mut service, mut peer) = connected(scene);
    let bob = LinkId::from("bob");

    assert_eq!(service.start_sequence(&[bob.clone()]).unwrap(), 1);
    assert!(matches!(
        service.start_sequence(&[bob.clone()]),
        Err(LinkError::SequenceActive)
    ));

    let notice: Notify = peer.expect_json(OpCode::Notify).unwrap();
    assert_eq!(notice.message, "Animation Sequence");
    let sequence: SequencePayload = peer.expect_json(OpCode::Sequence).unwrap();
    assert_eq!((sequence.start_frame, sequence.end_frame), (1, 3));
    assert_eq!(sequence.fps, 30.0);
    assert_eq!(sequence.actors, vec![ActorRef::new("Bob", "bob")]);
    let templates: TemplatePayload = peer.expect_json(OpCode::Template).unwrap();
    assert_eq!(templates.count, 1);
    assert_eq!(templates.actors[0].template(), bob_template());

    assert!(pump(&mut service, |s| !s.sequence().is_sending()));

    for frame in 1..=3 {
        let record = peer.expect_pose(OpCode::SequenceFrame, &templates).unwrap();
        assert_eq!(record.frame, frame);
        assert_eq!(record.actors.len(), 1);
        assert_eq!(record.actors[0].root.translation.x, frame as f32);
        assert_eq!(record.actors[0].visemes.len(), 2);
    }
    let end: SequenceEndPayload = peer.expect_json(OpCode::SequenceEnd).unwrap();
    assert_eq!(end.actors, vec![ActorRef::new("Bob", "bob")]);

    assert_eq!(service.stats().sequence_frames_sent, 3);
    assert!(service.scene().has_status("Sequence sent: 3 frames"));
}

#[test]
fn test_start_sequence_unknown_actor() {
    let (mut service, _peer) = connected(MockScene::new());
    assert!(matches!(
        service.start_sequence(&[LinkId::from("ghost")]),
        Err(LinkError::UnknownActor(_))
    ));
    assert!(!service.sequence().is_active());
}

// Poses

#[test]
fn test_send_pose_order() {
    let mut scene = MockScene::new().with_actor("bob", "Bob", numbered_template(3, &["smile"], &["AA"]));
    scene.frame = 5;
    let (mut service, mut peer) = connected(scene);

    assert_eq!(service.send_pose(&[LinkId::from("bob"), LinkId::from("ghost")]).unwrap(), 1);

    let notice: Notify = peer.expect_json(OpCode::Notify).unwrap();
    assert_eq!(notice.message, "Pose Set");
    let templates: TemplatePayload = peer.expect_json(OpCode::Template).unwrap();
    assert_eq!(templates.actors.len(), 1);
    assert_eq!(templates.actors[0].bones.len(), 3);

    let record = peer.expect_pose(OpCode::Pose, &templates).unwrap();
    assert_eq!(record.frame, 5);
    let pose = &record.actors[0];
    assert_eq!(pose.link_id, LinkId::from("bob"));
    assert_eq!(pose.root.translation.x, 5.0);
    assert_eq!(pose.bones.len(), 3);
    assert_eq!(pose.expressions, vec![5.0f32 / 100.0]);
    assert_eq!(pose.visemes, vec![5.0f32 / 200.0]);
}

#[test]
fn test_binary_pose_applies_and_materializes() {
    let (mut service, mut peer) = connected(bob_scene());
    let entity = service.scene().entity("bob").unwrap();

    send_bob_template(&mut peer);
    peer.send_op(OpCode::Pose, bob_record(12)).unwrap();

    assert!(pump(&mut service, |s| !s.scene().materialized.is_empty()));
    assert_eq!(service.stats().handler_errors, 0);

    let scene = service.scene();
    let cache = scene.materialized_cache("bob").unwrap();
    assert_eq!(cache.start_frame(), 12);
    assert!(cache.is_complete());
    assert_eq!(cache.root_track()[0].translation.x, 12.0);
    assert_eq!(
        scene.visemes_for(entity),
        vec![("AA".to_string(), 0.25), ("EE".to_string(), 0.75)]
    );
    assert_eq!(scene.frame, 12);
    assert!(scene.has_status("Pose: 12 (1 actors)"));
}

#[test]
fn test_received_pose_applies_visemes_by_name() {
    let (mut service, mut peer) = connected(bob_scene());
    let entity = service.scene().entity("bob").unwrap();

    send_bob_template(&mut peer);
    peer.send_json(
        OpCode::Pose,
        &PosePayload {
            frame: 7,
            actors: vec![ActorRef::new("Bob", "bob")],
        },
    )
    .unwrap();
    peer.send_op(OpCode::PoseFrame, bob_record(7)).unwrap();

    assert!(pump(&mut service, |s| !s.scene().materialized.is_empty()));

    let scene = service.scene();
    assert_eq!(
        scene.visemes_for(entity),
        vec![("AA".to_string(), 0.25), ("EE".to_string(), 0.75)]
    );
    assert_eq!(scene.expressions_for(entity), vec![("smile".to_string(), 0.5)]);
    assert_eq!(scene.frame, 7);
    assert_eq!(scene.prepared, vec![(LinkId::from("bob"), 1)]);
    assert_eq!(scene.materialized_cache("bob").unwrap().frame_count(), 1);
}

#[test]
fn test_pose_without_template_is_skipped() {
    let (mut service, mut peer) = connected(bob_scene());
    peer.send_op(OpCode::PoseFrame, bob_record(1)).unwrap();
    peer.send_op(OpCode::Ping, Vec::new()).unwrap();

    assert!(pump(&mut service, |s| s.stats().messages_in >= 3));
    assert_eq!(service.stats().handler_errors, 1);
    assert!(service.scene().roots.is_empty());
    assert!(service.is_connected());
}

// Assets and scene sync

#[test]
fn test_character_import_and_update() {
    let (mut service, mut peer) = connected(bob_scene());

    peer.send_json(
        OpCode::Character,
        &CharacterPayload {
            path: "/tmp/peer/Ann.fbx".into(),
            name: "Ann".into(),
            link_id: "ann".into(),
        },
    )
    .unwrap();
    peer.send_json(
        OpCode::Character,
        &CharacterPayload {
            path: "/tmp/peer/Bob.fbx".into(),
            name: "Bob".into(),
            link_id: "bob".into(),
        },
    )
    .unwrap();
    peer.send_json(
        OpCode::CharacterUpdate,
        &CharacterUpdatePayload {
            old_name: "Bob".into(),
            new_name: "Robert".into(),
            old_link_id: "bob".into(),
            new_link_id: "robert".into(),
        },
    )
    .unwrap();

    assert!(pump(&mut service, |s| s.registry().get(&LinkId::from("robert")).is_some()));

    let actor = service.registry().get(&LinkId::from("robert")).unwrap();
    assert_eq!(actor.name, "Robert");
    assert!(service.registry().get(&LinkId::from("bob")).is_none());

    let scene = service.scene();
    assert_eq!(scene.characters.len(), 1);
    assert_eq!(scene.characters[0].link_id, "ann");
    assert!(scene.has_status("Character: Bob exists!"));
    assert_eq!(scene.updates.len(), 1);
    assert!(scene.entity("robert").is_some());
}

#[test]
fn test_send_character_uses_remote_path() {
    let (mut service, mut peer) = connected(bob_scene());
    let path = service
        .send_character(&LinkId::from("bob"), "Bob.fbx")
        .unwrap();
    assert_eq!(path, PathBuf::from("/tmp/peer/Bob.fbx"));

    let notice: Notify = peer.expect_json(OpCode::Notify).unwrap();
    assert_eq!(notice.message, "Exporting: Bob");
    let character: CharacterPayload = peer.expect_json(OpCode::Character).unwrap();
    assert_eq!(character.name, "Bob");
    assert_eq!(character.link_id, "bob");
    assert_eq!(PathBuf::from(character.path), path);

    assert!(matches!(
        service.send_character(&LinkId::from("ghost"), "Ghost.fbx"),
        Err(LinkError::UnknownActor(_))
    ));
}

#[test]
fn test_morph_prop_and_rigify() {
    let (mut service, mut peer) = connected(bob_scene());

    let path = service
        .send_morph(&LinkId::from("bob"), "Smile", "Custom/Smile", true)
        .unwrap();
    assert_eq!(path, PathBuf::from("/tmp/peer/Bob_morph.obj"));
    let morph: MorphPayload = peer.expect_json(OpCode::MorphUpdate).unwrap();
    assert_eq!(morph.key_path, "/tmp/peer/Bob_morph.ObjKey");
    assert_eq!(morph.morph_name, "Smile");

    peer.send_json(OpCode::Morph, &morph).unwrap();
    peer.send_json(
        OpCode::PropUpdate,
        &CharacterPayload {
            path: "/tmp/peer/Lamp.fbx".into(),
            name: "Lamp".into(),
            link_id: "lamp".into(),
        },
    )
    .unwrap();
    peer.send_json(
        OpCode::Rigify,
        &RigifyPayload {
            name: "Bob".into(),
            link_id: "bob".into(),
        },
    )
    .unwrap();

    assert!(pump(&mut service, |s| !s.scene().rigified.is_empty()));
    let scene = service.scene();
    assert_eq!(scene.morphs.len(), 1);
    assert!(!scene.morphs[0].1);
    assert_eq!(scene.props[0].0.name, "Lamp");
    assert!(scene.props[0].1);
    assert!(scene.has_status("Rigifying: Bob"));
}

#[test]
fn test_camera_and_lights_sync() {
    let camera = CameraSyncPayload {
        view_camera: ViewCamera {
            link_id: "cam".into(),
            name: "Viewport".into(),
            loc: [0.0, -5.0, 1.5],
            rot: [0.0, 0.0, 0.0, 1.0],
            sca: [1.0, 1.0, 1.0],
            focal_length: 50.0,
        },
        pivot: [0.0, 0.0, 1.0],
    };

    let (mut service, mut peer) = connected(MockScene::new());
    assert!(!service.send_camera_sync().unwrap());

    service.scene_mut().camera = Some(camera.clone());
    assert!(service.send_camera_sync().unwrap());
    let sent: CameraSyncPayload = peer.expect_json(OpCode::CameraSync).unwrap();
    assert_eq!(sent, camera);

    peer.send_json(OpCode::CameraSync, &camera).unwrap();
    peer.send_op(OpCode::Lights, br#"{"count":1,"lights":[{"name":"Key"}]}"#.to_vec())
        .unwrap();
    assert!(pump(&mut service, |s| !s.scene().lights.is_empty()));

    let scene = service.scene();
    assert_eq!(scene.camera_syncs, vec![camera]);
    assert_eq!(scene.lights[0]["lights"][0]["name"], "Key");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_any_frame_order_completes(order in Just((0u32..6).collect::<Vec<_>>()).prop_shuffle()) {
        let (mut service, mut peer) = connected(bob_scene());
        send_bob_template(&mut peer);
        send_bob_sequence(&mut peer, 100, 105);
        for offset in &order {
            peer.send_op(OpCode::SequenceFrame, bob_record(100 + offset)).unwrap();
        }
        peer.send_json(OpCode::SequenceEnd, &SequenceEndPayload::default()).unwrap();

        prop_assert!(pump(&mut service, |s| !s.scene().materialized.is_empty()));
        let cache = service.scene().materialized_cache("bob").unwrap();
        prop_assert!(cache.is_complete());
        let xs: Vec<f32> = cache.root_track().iter().map(|t| t.translation.x).collect();
        prop_assert_eq!(xs, vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    }
}
