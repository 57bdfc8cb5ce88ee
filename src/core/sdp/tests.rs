#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::sdp_record;
use std::collections::HashMap;

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Inner {
        pub name: String,
        pub weight: f32,
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Everything {
        pub flag: bool,
        pub small: i8,
        pub medium: i16,
        pub wide: i32,
        pub huge: i64,
        pub byte: u8,
        pub short: u16,
        pub word: u32,
        pub long: u64,
        pub ratio: f64,
        pub text: String,
        pub inner: Inner,
        pub list: Vec<Inner>,
        pub table: HashMap<String, i64>,
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ProfileV1 {
        pub id: u64,
        pub name: String,
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ProfileV2 {
        pub id: u64,
        pub name: String,
        pub tags: Vec<String>,
        pub nested: Inner,
        pub attrs: HashMap<u32, Vec<i16>>,
        pub score: f64 => { tag: 40 },
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Required {
        pub count: u32 => { required: true },
        pub label: String => { required: true },
        pub optional: u32,
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Mixed {
        pub a: u32,
        pub b: u32 => { tag: 0 },
        pub c: u32,
    }
}

sdp_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Counter {
        pub value: u64,
    }
}

fn sample() -> Everything {
    let mut table = HashMap::new();
    table.insert("neg".to_string(), -42);
    table.insert("pos".to_string(), 1 << 40);
    Everything {
        flag: true,
        small: -128,
        medium: 12_345,
        wide: -7,
        huge: i64::MIN,
        byte: 255,
        short: 0,
        word: 300,
        long: u64::MAX,
        ratio: -2.5,
        text: "héllo".to_string(),
        inner: Inner {
            name: "in".to_string(),
            weight: 0.5,
        },
        list: vec![
            Inner::default(),
            Inner {
                name: "x".to_string(),
                weight: -1.0,
            },
        ],
        table,
    }
}

#[test]
fn test_round_trip_all_kinds() {
    let value = sample();
    let bytes = encode(&value);
    let back: Everything = decode(&bytes).unwrap();
    assert_eq!(back, value);
}

#[test]
fn test_record_framing() {
    let bytes = encode(&Counter { value: 1 });
    assert_eq!(bytes, vec![0x70, 0x00, 0x01, STRUCT_END_MARKER]);

    // an all-zero record still writes its markers
    let bytes = encode(&Counter::default());
    assert_eq!(bytes, vec![0x70, STRUCT_END_MARKER]);
}

#[test]
fn test_unknown_fields_are_skipped() {
    let mut attrs = HashMap::new();
    attrs.insert(9, vec![-1, 2, -3]);
    let newer = ProfileV2 {
        id: 77,
        name: "ann".to_string(),
        tags: vec!["a".to_string(), "b".to_string()],
        nested: Inner {
            name: "deep".to_string(),
            weight: 3.0,
        },
        attrs,
        score: 9.5,
    };
    let bytes = encode(&newer);
    let older: ProfileV1 = decode(&bytes).unwrap();
    assert_eq!(
        older,
        ProfileV1 {
            id: 77,
            name: "ann".to_string()
        }
    );
}

#[test]
fn test_older_writer_leaves_new_fields_default() {
    let bytes = encode(&ProfileV1 {
        id: 3,
        name: "bo".to_string(),
    });
    let newer: ProfileV2 = decode(&bytes).unwrap();
    assert_eq!(newer.id, 3);
    assert_eq!(newer.name, "bo");
    assert!(newer.tags.is_empty());
    assert_eq!(newer.score, 0.0);
}

#[test]
fn test_varint_boundaries() {
    for value in [0u64, 127, 128, 1 << 35, u64::MAX] {
        let bytes = encode(&Counter { value });
        let back: Counter = decode(&bytes).unwrap();
        assert_eq!(back.value, value);
    }
}

#[test]
fn test_truncated_input_errors() {
    let bytes = encode(&sample());
    for cut in 0..bytes.len() {
        assert!(
            decode::<Everything>(&bytes[..cut]).is_err(),
            "prefix of {cut} bytes decoded"
        );
    }
}

#[test]
fn test_required_fields_written_when_zero() {
    let bytes = encode(&Required::default());
    // count=0 under tag 0, empty label under tag 1, optional omitted
    assert_eq!(bytes, vec![0x70, 0x00, 0x00, 0x41, 0x00, STRUCT_END_MARKER]);
    assert!(Required::FIELDS[0].required);
    assert!(!Required::FIELDS[2].required);
}

#[test]
fn test_explicit_tag_excludes_field_from_positional_match() {
    assert_eq!(Mixed::field_index(0), Some(1));
    assert_eq!(Mixed::field_index(1), None);
    assert_eq!(Mixed::field_index(2), Some(2));

    let value = Mixed { a: 0, b: 5, c: 6 };
    let bytes = encode(&value);
    assert_eq!(decode::<Mixed>(&bytes).unwrap(), value);
}

#[test]
fn test_spilled_tag_round_trip() {
    let value = ProfileV2 {
        score: 1.25,
        ..Default::default()
    };
    let bytes = encode(&value);
    // double under spilled tag 40
    assert!(bytes.windows(2).any(|w| w == [0x3f, 40]));
    assert_eq!(decode::<ProfileV2>(&bytes).unwrap(), value);
}

#[test]
fn test_decode_into_keeps_absent_fields() {
    let bytes = encode(&ProfileV1 {
        id: 0,
        name: "new".to_string(),
    });
    let mut target = ProfileV1 {
        id: 99,
        name: "old".to_string(),
    };
    decode_into(&mut target, &bytes).unwrap();
    assert_eq!(target.id, 99);
    assert_eq!(target.name, "new");
}

#[test]
fn test_top_level_must_be_record() {
    let err = decode::<Counter>(&[0x00, 0x01]).unwrap_err();
    assert!(matches!(err, SdpError::TypeMismatch { .. }));
}

#[test]
fn test_field_type_mismatch() {
    // field 0 of Counter is an integer, here it carries a string
    let data = [0x70, 0x40, 0x01, b'a', STRUCT_END_MARKER];
    let err = decode::<Counter>(&data).unwrap_err();
    assert!(matches!(err, SdpError::TypeMismatch { .. }));
}
