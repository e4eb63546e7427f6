// tests/codec_tests.rs

use proptest::prelude::*;
use tmxkit::codec::{decode, encode};
use tmxkit::{Compression, DataFormat, Encoding};

fn formats() -> [DataFormat; 3] {
    [
        DataFormat::CSV,
        DataFormat::new(Encoding::Base64, Compression::Zlib).unwrap(),
        DataFormat::new(Encoding::Base64, Compression::Gzip).unwrap(),
    ]
}

proptest! {
    #[test]
    fn layer_data_round_trips(
        data in prop_oneof![
            Just(Vec::new()),
            prop::collection::vec(any::<u32>(), 1),
            prop::collection::vec(any::<u32>(), 1600),
        ],
        width in 1usize..64,
    ) {
        for format in formats() {
            let text = encode(&data, width, format).unwrap();
            prop_assert_eq!(decode(&text, format, data.len()).unwrap(), data.clone());
        }
    }
}

#[test]
fn encoding_is_deterministic() {
    let data: Vec<u32> = (0..1600).map(|i| i * 7 % 31).collect();
    for format in formats() {
        let first = encode(&data, 40, format).unwrap();
        let second = encode(&data, 40, format).unwrap();
        assert_eq!(first, second, "{format:?}");
    }
}

#[test]
fn base64_output_has_no_line_breaks() {
    let data = vec![0x1234_5678; 1600];
    let text = encode(&data, 40, DataFormat::new(Encoding::Base64, Compression::None).unwrap())
        .unwrap();
    assert!(!text.contains('\n'));
    assert_eq!(text.len(), (1600 * 4 + 2) / 3 * 4);
}
