use lorawan_fota::{
    crypto,
    fragmentation::{FragmentOutcome, FragmentationController, SessionState},
    protocol::commands::{DataBlockAuthAns, DataFragment, FragSessionSetupReq},
    storage::BlockDevice,
    update::{UpdateHandoffRecord, MAGIC},
};

use mock::{
    frag_setup_payload, image_bytes, test_config, MemFlash, UncodedFactory, FLASH_SIZE, LAYOUT,
};

fn controller(fail_init: bool) -> FragmentationController<UncodedFactory> {
    let factory = UncodedFactory {
        fail_init,
        ..UncodedFactory::default()
    };
    FragmentationController::new(factory, &test_config([0; 65]))
}

fn setup(
    ctl: &mut FragmentationController<UncodedFactory>,
    flash: &mut MemFlash,
    count: u16,
    size: u8,
    padding: u8,
) {
    let payload = frag_setup_payload(1, count, size, padding);
    let req = FragSessionSetupReq::from_bytes(&payload).unwrap();
    let ack = ctl.handle_setup(flash, &req);
    assert_eq!(ack.as_bytes(), &[0x02, 0x40]);
}

fn feed(
    ctl: &mut FragmentationController<UncodedFactory>,
    flash: &mut MemFlash,
    image: &[u8],
    size: usize,
    counter: u16,
) -> FragmentOutcome {
    let start = (counter as usize - 1) * size;
    let mut data = vec![0u8; size];
    let end = image.len().min(start + size);
    data[..end - start].copy_from_slice(&image[start..end]);
    ctl.handle_fragment(flash, &DataFragment { counter, data: &data })
}

fn read_record(flash: &mut MemFlash) -> UpdateHandoffRecord {
    let mut buf = [0u8; UpdateHandoffRecord::LEN];
    flash.read(&mut buf, LAYOUT.handoff_offset).unwrap();
    UpdateHandoffRecord::from_bytes(&buf)
}

#[test]
fn test_reconstruction_reports_image_crc() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);

    let (count, size, padding) = (10u16, 50u8, 17u8);
    let image = image_bytes(count as usize * size as usize - padding as usize, 3);
    setup(&mut ctl, &mut flash, count, size, padding);
    assert_eq!(ctl.state(), SessionState::Receiving);

    for counter in 1..count {
        let outcome = feed(&mut ctl, &mut flash, &image, size as usize, counter);
        assert_eq!(outcome, FragmentOutcome::Accepted);
    }
    let outcome = feed(&mut ctl, &mut flash, &image, size as usize, count);

    let expected_crc = crypto::crc64(&image);
    match outcome {
        FragmentOutcome::Complete { answer, crc64 } => {
            assert_eq!(crc64, expected_crc);
            assert_eq!(answer.as_bytes()[..2], [0x05, 0x01]);
            assert_eq!(answer.as_bytes()[2..], expected_crc.to_le_bytes());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(ctl.state(), SessionState::Complete);
    assert_eq!(flash.slice(LAYOUT.update_offset, image.len()), &image[..]);

    let record = read_record(&mut flash);
    assert!(!record.pending);
    assert_eq!(record.magic, MAGIC);
    assert_eq!(record.offset, LAYOUT.update_offset + 109);
    assert_eq!(record.size as usize, image.len() - 109);
}

#[test]
fn test_crc64_of_known_vector() {
    // CRC-64/REDIS check value
    assert_eq!(crypto::crc64(b"123456789"), 0xE9C6_D914_C4B8_D9CA);
}

#[test]
fn test_fragments_after_complete_are_ignored() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let image = image_bytes(4 * 40, 9);
    setup(&mut ctl, &mut flash, 4, 40, 0);

    for counter in 1..=4 {
        feed(&mut ctl, &mut flash, &image, 40, counter);
    }
    assert_eq!(ctl.state(), SessionState::Complete);
    let programs = flash.programs.len();

    assert_eq!(feed(&mut ctl, &mut flash, &image, 40, 4), FragmentOutcome::Ignored);
    assert_eq!(feed(&mut ctl, &mut flash, &image, 40, 4), FragmentOutcome::Ignored);
    assert_eq!(ctl.state(), SessionState::Complete);
    assert_eq!(flash.programs.len(), programs);
}

#[test]
fn test_incomplete_session_writes_no_record() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let image = image_bytes(26 * 204, 1);
    setup(&mut ctl, &mut flash, 26, 204, 0);

    // Every other frame lost
    for counter in (1..=26).step_by(2) {
        let outcome = feed(&mut ctl, &mut flash, &image, 204, counter);
        assert_eq!(outcome, FragmentOutcome::Accepted);
    }
    assert_eq!(ctl.state(), SessionState::Receiving);
    assert_eq!(ctl.lost_frame_count(), Some(12));
    assert!(!flash.programmed_at(LAYOUT.handoff_offset));
}

#[test]
fn test_engine_init_failure_reports_no_memory() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(true);

    let payload = frag_setup_payload(2, 26, 204, 0);
    let req = FragSessionSetupReq::from_bytes(&payload).unwrap();
    let ack = ctl.handle_setup(&mut flash, &req);

    assert_eq!(ack.as_bytes(), &[0x02, (2 << 6) | 0x02]);
    assert_eq!(ctl.state(), SessionState::Idle);
    assert!(!ctl.is_receiving());
}

#[test]
fn test_engine_error_aborts_session() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    setup(&mut ctl, &mut flash, 4, 40, 0);

    let short = [0u8; 10];
    let outcome = ctl.handle_fragment(&mut flash, &DataFragment { counter: 1, data: &short });
    assert_eq!(outcome, FragmentOutcome::Aborted);
    assert_eq!(ctl.state(), SessionState::Aborted);

    // A new setup recovers
    setup(&mut ctl, &mut flash, 4, 40, 0);
    assert_eq!(ctl.state(), SessionState::Receiving);
}

#[test]
fn test_flash_failure_aborts_session() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let image = image_bytes(2 * 40, 5);
    setup(&mut ctl, &mut flash, 2, 40, 0);
    feed(&mut ctl, &mut flash, &image, 40, 1);

    flash.fail_program = true;
    assert_eq!(feed(&mut ctl, &mut flash, &image, 40, 2), FragmentOutcome::Aborted);
    assert_eq!(ctl.state(), SessionState::Aborted);
}

#[test]
fn test_record_write_failure_aborts_completion() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let image = image_bytes(3 * 60, 6);
    setup(&mut ctl, &mut flash, 3, 60, 0);
    feed(&mut ctl, &mut flash, &image, 60, 1);
    feed(&mut ctl, &mut flash, &image, 60, 2);

    flash.fail_program_at = Some(LAYOUT.handoff_offset);
    assert_eq!(feed(&mut ctl, &mut flash, &image, 60, 3), FragmentOutcome::Aborted);
    assert_eq!(ctl.state(), SessionState::Aborted);
    assert!(!flash.programmed_at(LAYOUT.handoff_offset));
}

#[test]
fn test_new_setup_replaces_session() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let image = image_bytes(4 * 40, 2);
    setup(&mut ctl, &mut flash, 4, 40, 0);
    feed(&mut ctl, &mut flash, &image, 40, 1);
    feed(&mut ctl, &mut flash, &image, 40, 2);

    setup(&mut ctl, &mut flash, 3, 40, 0);
    assert_eq!(ctl.config().unwrap().fragment_count, 3);

    // Earlier fragments do not count towards the new session
    assert_eq!(feed(&mut ctl, &mut flash, &image, 40, 3), FragmentOutcome::Accepted);
}

#[test]
fn test_auth_answer_only_after_complete() {
    let mut flash = MemFlash::new(FLASH_SIZE);
    let mut ctl = controller(false);
    let accepted = DataBlockAuthAns {
        index_status: 1,
        accepted: true,
    };

    assert!(!ctl.handle_auth_answer(&accepted));

    let image = image_bytes(2 * 40, 4);
    setup(&mut ctl, &mut flash, 2, 40, 0);
    assert!(!ctl.handle_auth_answer(&accepted));

    feed(&mut ctl, &mut flash, &image, 40, 1);
    feed(&mut ctl, &mut flash, &image, 40, 2);
    assert!(!ctl.handle_auth_answer(&DataBlockAuthAns {
        index_status: 1,
        accepted: false,
    }));
    assert!(ctl.handle_auth_answer(&accepted));
}
