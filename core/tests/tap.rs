use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use hcepay::catalog::{AID_SELECT, PPSE_SELECT, READ_RECORD};
use hcepay::settings::DEFAULT_SWIPE_DATA;
use hcepay::tlv::EmvRecord;
use hcepay::{Card, Settings, Track2};

const GPO: [u8; 10] = [0x80, 0xA8, 0x00, 0x00, 0x04, 0x83, 0x02, 0x80, 0x00, 0x00];
const OTHER_SWIPE_DATA: &str = "%B5413330089010434^TEST/CARD^2512201000000000?;5413330089010434=2512201000000000?";

fn record_of(swipe_data: &str) -> Vec<u8> {
    let packed = Track2::extract(swipe_data).unwrap().pack();
    EmvRecord::read_record_response(&packed).unwrap().into()
}

#[test]
fn test_tap() {
    let card = Card::with_settings(&Settings::default());

    let ppse = card.handle(&PPSE_SELECT);
    assert_eq!([0x6F, 0x23], ppse[..2]);
    assert_eq!([0x90, 0x00], ppse[ppse.len() - 2..]);

    let aid = card.handle(&AID_SELECT);
    assert_eq!(b"VISA CREDIT", &aid[15..26]);

    let gpo = card.handle(&GPO);
    assert_eq!(
        vec![0x80, 0x06, 0x00, 0x80, 0x08, 0x01, 0x01, 0x00, 0x90, 0x00],
        gpo,
    );

    let record = card.handle(&READ_RECORD);
    assert_eq!(record_of(DEFAULT_SWIPE_DATA), record);

    let track2 = EmvRecord::read_record_response(&Track2::extract(DEFAULT_SWIPE_DATA).unwrap().pack())
        .unwrap()
        .track2()
        .unpack()
        .unwrap();
    assert_eq!("4046460664629718", track2.pan());
}

#[test]
fn test_read_record_out_of_order() {
    let card = Card::default();

    assert_eq!(record_of(DEFAULT_SWIPE_DATA), card.handle(&READ_RECORD));
    assert_eq!(record_of(DEFAULT_SWIPE_DATA), card.handle(&READ_RECORD));
}

#[test]
fn test_concurrent_updates() {
    let card = Card::default();
    let done = AtomicBool::new(false);
    let default = record_of(DEFAULT_SWIPE_DATA);
    let other = record_of(OTHER_SWIPE_DATA);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..1000 {
                let swipe_data = match i % 3 {
                    0 => OTHER_SWIPE_DATA,
                    1 => DEFAULT_SWIPE_DATA,
                    _ => "garbage",
                };
                let _ = card.on_swipe_data_changed(swipe_data);
            }
            done.store(true, Ordering::SeqCst);
        });

        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let record = card.handle(&READ_RECORD);
                assert!(record == default || record == other);
            }
        });
    });

    assert_eq!(other, card.handle(&READ_RECORD));
}
