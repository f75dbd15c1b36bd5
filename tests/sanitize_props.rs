// tests/sanitize_props.rs

//! Property tests for the output sanitizer.

use proptest::prelude::*;

use scanscript::sanitize::sanitize_output;

fn is_safe_byte(b: u8) -> bool {
    matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E)
}

proptest! {
    #[test]
    fn output_contains_only_safe_bytes(input in proptest::collection::vec(any::<u8>(), 0..256)) {
        let out = sanitize_output(&input);
        prop_assert!(out.bytes().all(is_safe_byte));
    }

    #[test]
    fn sanitizing_twice_equals_sanitizing_once(input in proptest::collection::vec(any::<u8>(), 0..256)) {
        let once = sanitize_output(&input);
        let twice = sanitize_output(once.as_bytes());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn safe_input_passes_through_unchanged(input in "[ -~\t\r\n]{0,128}") {
        prop_assert_eq!(sanitize_output(input.as_bytes()), input);
    }

    #[test]
    fn unsafe_bytes_become_hex_escapes(b in any::<u8>().prop_filter("unsafe", |b| !is_safe_byte(*b))) {
        let out = sanitize_output(&[b]);
        prop_assert_eq!(&out, &format!("\\x{b:02X}"));
    }
}
