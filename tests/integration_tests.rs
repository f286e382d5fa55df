use p256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use sha2::{Digest, Sha256};

use lorawan_fota::{
    class::OperatingMode,
    crypto::{self, P256Verifier},
    device::{Event, FotaDevice},
    protocol::{FRAGMENTATION_PORT, MULTICAST_PORT},
    storage::BlockDevice,
    update::{UpdateHandoffRecord, UpdateSignatureHeader},
    uplink::UplinkKind,
};

use mock::{
    class_a_session, classc_session_payload, fragment_payload, frag_setup_payload,
    group_setup_payload, image_bytes, test_config, MemFlash, MockReset, MockStack, StackCall,
    UncodedFactory,
    XorPatch, DEVICE_CLASS_UUID, FLASH_SIZE, LAYOUT, MANUFACTURER_UUID,
};

type Device = FotaDevice<MockStack, MemFlash, UncodedFactory, XorPatch, P256Verifier, MockReset>;

const MC_ADDR: [u8; 4] = [0xA6, 0x1E, 0x01, 0x26];
const ROOT_KEY: [u8; 16] = [0x5C; 16];
const FRAGMENT_SIZE: usize = 20;
const FRAGMENT_COUNT: u16 = 20;
/// Scheduled by the session request in [`device_with_session`]
const SWITCH_AT: u64 = 1_065;
const CONTROL_PORT: u8 = 5;

/// Signed image as delivered over the air: header then firmware
fn signed_image(key: &SigningKey) -> Vec<u8> {
    let firmware = image_bytes(FRAGMENT_SIZE * FRAGMENT_COUNT as usize - 109, 9);
    let hash = Sha256::digest(&firmware);
    let signature: Signature = key.sign_prehash(&hash).unwrap();
    let der = signature.to_der();

    let mut sig = [0u8; 72];
    sig[..der.as_bytes().len()].copy_from_slice(der.as_bytes());
    let header = UpdateSignatureHeader {
        signature_len: der.as_bytes().len() as u8,
        signature: sig,
        manufacturer_uuid: MANUFACTURER_UUID,
        device_class_uuid: DEVICE_CLASS_UUID,
        diff_info: 0,
    };

    let mut image = header.to_bytes().to_vec();
    image.extend_from_slice(&firmware);
    image
}

fn new_device(key: &SigningKey) -> Device {
    let public_key = key
        .verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .try_into()
        .unwrap();
    let config = test_config(public_key);
    let mut device = FotaDevice::new(
        config.clone(),
        MockStack::new(class_a_session()),
        MemFlash::new(FLASH_SIZE),
        UncodedFactory::default(),
        XorPatch::default(),
        P256Verifier::new(config.public_key),
        MockReset::default(),
    );
    device.on_join(class_a_session());
    device
}

fn downlink(device: &mut Device, port: u8, payload: &[u8], now: u64) {
    let event = Event::DownlinkReceived {
        port,
        payload: heapless::Vec::from_slice(payload).unwrap(),
    };
    device.handle_event(event, now).unwrap();
}

/// Send the next queued uplink and return its port and payload
fn transmit(device: &mut Device) -> Option<(u8, Vec<u8>)> {
    let uplink = device.next_uplink().unwrap()?;
    device.complete_uplink(true);
    Some((uplink.port, uplink.payload.to_vec()))
}

/// Joined device with a multicast group and a scheduled Class C session
fn device_with_session(key: &SigningKey, with_fragmentation: bool) -> Device {
    let mut device = new_device(key);
    device.handle_event(Event::UplinkSent(0x0143), 1_005).unwrap();

    downlink(&mut device, MULTICAST_PORT, &group_setup_payload(0x01, MC_ADDR, ROOT_KEY), 1_010);
    assert_eq!(transmit(&mut device), Some((MULTICAST_PORT, vec![0x02, 0x01])));

    if with_fragmentation {
        let setup = frag_setup_payload(0, FRAGMENT_COUNT, FRAGMENT_SIZE as u8, 0);
        downlink(&mut device, FRAGMENTATION_PORT, &setup, 1_020);
        assert_eq!(transmit(&mut device), Some((FRAGMENTATION_PORT, vec![0x02, 0x00])));
    }

    let session = classc_session_payload(0x01, 60, 5, 0x43, 8_695_250, 5);
    downlink(&mut device, MULTICAST_PORT, &session, 1_030);
    assert_eq!(
        transmit(&mut device),
        Some((MULTICAST_PORT, vec![0x04, 0x01, 35, 0, 0]))
    );
    device
}

#[test]
fn test_full_update_flow() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let image = signed_image(&key);
    let mut device = device_with_session(&key, true);

    device.poll(SWITCH_AT - 1).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassA);

    device.poll(SWITCH_AT).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassC);
    assert!(!device.may_sleep());
    assert_eq!(device.stack().class, OperatingMode::ClassC);
    assert_eq!(device.stack().session.dev_addr, MC_ADDR);
    assert_eq!(device.stack().rx2, Some((869_525_000, 5)));
    assert_eq!(device.stack().link_check, (0, 0));

    for (i, chunk) in image.chunks(FRAGMENT_SIZE).enumerate() {
        let counter = i as u16 + 1;
        downlink(
            &mut device,
            FRAGMENTATION_PORT,
            &fragment_payload(counter, chunk),
            SWITCH_AT + 1 + i as u64,
        );
    }

    // Completion leaves the multicast window
    assert_eq!(device.mode(), OperatingMode::ClassA);
    assert_eq!(device.stack().class, OperatingMode::ClassA);
    assert_eq!(device.stack().session.dev_addr, class_a_session().dev_addr);
    assert_eq!(device.stack().link_check, (3, 5));
    assert_eq!(device.flash().slice(LAYOUT.update_offset, image.len()), &image[..]);

    let crc = crypto::crc64(&image);
    let mut expected = vec![0x05, 0x00];
    expected.extend_from_slice(&crc.to_le_bytes());
    assert_eq!(transmit(&mut device), Some((FRAGMENTATION_PORT, expected)));
    assert_eq!(device.reset_line().count, 0);

    let mut auth = vec![0x05, 0x00];
    auth.extend_from_slice(&crc.to_le_bytes());
    downlink(&mut device, FRAGMENTATION_PORT, &auth, 1_200);

    assert_eq!(device.reset_line().count, 1);
    let mut buf = [0u8; UpdateHandoffRecord::LEN];
    device.flash_mut().read(&mut buf, LAYOUT.handoff_offset).unwrap();
    let record = UpdateHandoffRecord::from_bytes(&buf);
    assert!(record.pending);
    assert_eq!(record.offset, LAYOUT.update_offset + 109);
    assert_eq!(record.size as usize, image.len() - 109);
    let hash: [u8; 32] = Sha256::digest(&image[109..]).into();
    assert_eq!(record.sha256, hash);
}

#[test]
fn test_rejected_block_is_not_verified() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let image = signed_image(&key);
    let mut device = device_with_session(&key, true);
    device.poll(SWITCH_AT).unwrap();

    for (i, chunk) in image.chunks(FRAGMENT_SIZE).enumerate() {
        downlink(&mut device, FRAGMENTATION_PORT, &fragment_payload(i as u16 + 1, chunk), 1_100);
    }
    assert!(transmit(&mut device).is_some());

    downlink(&mut device, FRAGMENTATION_PORT, &[0x05, 0x00], 1_200);
    assert_eq!(device.reset_line().count, 0);
    let mut buf = [0u8; UpdateHandoffRecord::LEN];
    buf.copy_from_slice(device.flash().slice(LAYOUT.handoff_offset, UpdateHandoffRecord::LEN));
    let record = UpdateHandoffRecord::from_bytes(&buf);
    assert!(record.is_valid());
    assert!(!record.pending);
}

#[test]
fn test_switch_refused_without_fragmentation_session() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = device_with_session(&key, false);

    device.poll(SWITCH_AT).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassA);
    assert_eq!(device.stack().class, OperatingMode::ClassA);
    assert!(device.stack().installs.is_empty());
    assert!(device.may_sleep());
}

#[test]
fn test_failed_switch_keeps_class_a_session() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = device_with_session(&key, true);
    device.stack_mut().fail_nth(StackCall::SetClass, 0);

    assert!(device.poll(SWITCH_AT).is_err());
    assert_eq!(device.mode(), OperatingMode::ClassA);
    assert_eq!(device.stack().session, class_a_session());
    assert_eq!(device.stack().class, OperatingMode::ClassA);

    assert!(device.send_application(10, b"telemetry"));
    assert_eq!(transmit(&mut device), Some((10, b"telemetry".to_vec())));
    assert_eq!(device.stack().session, class_a_session());
}

#[test]
fn test_class_c_window_times_out() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = device_with_session(&key, true);
    device.poll(SWITCH_AT).unwrap();

    // T = 5 gives a 32 s window, re-armed by each downlink
    downlink(&mut device, FRAGMENTATION_PORT, &fragment_payload(1, &[0; FRAGMENT_SIZE]), SWITCH_AT + 20);
    device.poll(SWITCH_AT + 32).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassC);

    device.poll(SWITCH_AT + 52).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassA);
    assert_eq!(device.stack().session.dev_addr, class_a_session().dev_addr);
}

#[test]
fn test_group_delete_leaves_class_c() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = device_with_session(&key, true);
    device.poll(SWITCH_AT).unwrap();
    assert_eq!(device.mode(), OperatingMode::ClassC);

    downlink(&mut device, MULTICAST_PORT, &[0x03, 0x01], SWITCH_AT + 5);
    assert_eq!(device.mode(), OperatingMode::ClassA);
    assert!(device.groups().group().is_none());
    assert_eq!(transmit(&mut device), Some((MULTICAST_PORT, vec![0x03, 0x01])));
}

#[test]
fn test_application_uplink_forces_class_a() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = device_with_session(&key, true);
    device.poll(SWITCH_AT).unwrap();

    assert!(device.send_application(CONTROL_PORT, b"status"));
    assert_eq!(transmit(&mut device), Some((CONTROL_PORT, b"status".to_vec())));
    assert_eq!(device.mode(), OperatingMode::ClassC);

    assert!(device.send_application(10, b"telemetry"));
    assert_eq!(transmit(&mut device), Some((10, b"telemetry".to_vec())));
    assert_eq!(device.mode(), OperatingMode::ClassA);
}

#[test]
fn test_answers_take_priority_over_application_data() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = new_device(&key);

    downlink(&mut device, MULTICAST_PORT, &group_setup_payload(0x00, MC_ADDR, ROOT_KEY), 100);
    assert!(!device.send_application(10, b"late"));

    let uplink = device.next_uplink().unwrap().unwrap();
    assert_eq!(uplink.kind, UplinkKind::Answer);
    assert!(uplink.confirmed());

    // An answer that failed to go out stays queued
    device.complete_uplink(false);
    assert_eq!(device.uplinks().len(), 1);
    assert_eq!(transmit(&mut device), Some((MULTICAST_PORT, vec![0x02, 0x00])));
    assert!(device.uplinks().is_empty());
    assert!(device.send_application(10, b"now"));
}

#[test]
fn test_foreign_and_empty_downlinks_are_ignored() {
    let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    let mut device = new_device(&key);

    downlink(&mut device, 10, &[0x02, 0x01], 100);
    downlink(&mut device, MULTICAST_PORT, &[], 100);
    downlink(&mut device, MULTICAST_PORT, &[0x7F], 100);
    downlink(&mut device, FRAGMENTATION_PORT, &[0x02, 0x00], 100);

    assert!(device.uplinks().is_empty());
    assert!(device.groups().group().is_none());
}
