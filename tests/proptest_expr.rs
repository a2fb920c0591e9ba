use proptest::prelude::*;

use dhcpclass::{
    Error, ExpressionKind, Family, Location, Metadata, Packet, Pkt4, Pkt6, RawOption, Value,
    compile,
};

const VALID_EXPRESSIONS: &[&str] = &[
    "option[60].text == 'PXE'",
    "substring(option[125].hex,0,4) == 0x01020304",
    "not option[82].exists and (pkt4.mac == 0x001122334455 or relay4[1].text == 'eth0')",
    "concat(pkt.iface, substring(option[host-name].text, -3, all)) == 'eth0abc'",
    "vendor[4491].option[2].hex == 0x0a and vendor-class[*].data[1] == 'x'",
    "pkt.src == 192.0.2.1 or pkt.len == 300",
];

const V4_ONLY: &[&str] = &[
    "relay4[1].exists",
    "relay4[2].hex == 0x01",
    "pkt4.mac == 0x00",
    "pkt4.hlen == 0x06",
    "pkt4.htype == 0x01",
    "pkt4.ciaddr == 0.0.0.0",
    "pkt4.giaddr == 0.0.0.0",
    "pkt4.yiaddr == 0.0.0.0",
    "pkt4.siaddr == 0.0.0.0",
    "pkt4.msgtype == 0x01",
    "pkt4.transid == 0x00000001",
];

const V6_ONLY: &[&str] = &[
    "relay6[0].option[18].exists",
    "relay6[1].option[37].text == 'x'",
    "relay6[0].peeraddr == ::1",
    "relay6[2].linkaddr == ::1",
    "pkt6.msgtype == 0x01",
    "pkt6.transid == 0x000001",
];

fn empty_v4() -> Packet {
    Packet::V4(Pkt4::default())
}

fn v4_with(options: Vec<RawOption>) -> Packet {
    Packet::V4(Pkt4 {
        options,
        ..Default::default()
    })
}

fn evaluate_string(text: &str, packet: &Packet) -> Vec<u8> {
    compile(text, packet.family(), ExpressionKind::String)
        .unwrap()
        .evaluate_string(packet)
        .unwrap()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Reference substring over a non-negative start and length.
fn expected_substring(source: &[u8], start: usize, length: usize) -> Vec<u8> {
    if start >= source.len() {
        return Vec::new();
    }
    source[start..(start + length).min(source.len())].to_vec()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn compile_never_panics_on_arbitrary_text(text: String) {
        let _ = compile(&text, Family::V4, ExpressionKind::Bool);
        let _ = compile(&text, Family::V6, ExpressionKind::String);
    }

    #[test]
    fn compile_never_panics_on_grammar_characters(
        text in "[a-z0-9\\[\\]\\.\\(\\),'=* :-]{0,64}"
    ) {
        let _ = compile(&text, Family::V4, ExpressionKind::Bool);
        let _ = compile(&text, Family::V6, ExpressionKind::Bool);
    }

    #[test]
    fn compile_never_panics_on_truncated_expressions(
        index in 0usize..VALID_EXPRESSIONS.len(),
        cut in 0usize..128
    ) {
        let text = VALID_EXPRESSIONS[index];
        let cut = cut.min(text.len());
        let result = compile(&text[..cut], Family::V4, ExpressionKind::Bool);
        if cut < text.len() {
            if let Err(error) = result {
                prop_assert!(error.is_compile_error());
            }
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn substring_all_from_zero_is_identity(source in "[a-zA-Z0-9 ]{0,32}") {
        let text = format!("substring('{}', 0, all)", source);
        prop_assert_eq!(evaluate_string(&text, &empty_v4()), source.as_bytes().to_vec());
    }

    #[test]
    fn substring_matches_reference(
        source in "[a-z]{0,24}",
        start in 0usize..32,
        length in 0usize..32
    ) {
        let text = format!("substring('{}', {}, {})", source, start, length);
        let result = evaluate_string(&text, &empty_v4());
        prop_assert!(result.len() <= length);
        prop_assert_eq!(result, expected_substring(source.as_bytes(), start, length));
    }

    #[test]
    fn substring_with_negative_offsets_stays_in_bounds(
        source in "[a-z]{0,24}",
        start in -40i32..40,
        length in -40i32..40
    ) {
        let text = format!("substring('{}', {}, {})", source, start, length);
        let result = evaluate_string(&text, &empty_v4());
        prop_assert!(result.len() <= source.len());
        prop_assert!(result.len() <= length.unsigned_abs() as usize);
    }

    #[test]
    fn concat_length_and_prefix(a in "[a-z0-9]{0,16}", b in "[a-z0-9]{0,16}") {
        let text = format!("concat('{}', '{}')", a, b);
        let result = evaluate_string(&text, &empty_v4());
        prop_assert_eq!(result.len(), a.len() + b.len());
        prop_assert!(result.starts_with(a.as_bytes()));
        prop_assert!(result.ends_with(b.as_bytes()));
    }

    #[test]
    fn hex_literal_yields_its_bytes(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let text = format!("0x{}", hex(&bytes));
        prop_assert_eq!(evaluate_string(&text, &empty_v4()), bytes);
    }

    #[test]
    fn integer_literal_is_big_endian(number in 0u32..u32::MAX) {
        let text = number.to_string();
        prop_assert_eq!(evaluate_string(&text, &empty_v4()), number.to_be_bytes().to_vec());
    }

    #[test]
    fn absent_option_is_false_or_empty(code in 1u16..255) {
        let packet = empty_v4();
        let exists = compile(&format!("option[{}].exists", code), Family::V4, ExpressionKind::Bool)
            .unwrap();
        prop_assert!(!exists.evaluate_bool(&packet).unwrap());
        prop_assert_eq!(evaluate_string(&format!("option[{}].text", code), &packet), Vec::<u8>::new());
        prop_assert_eq!(evaluate_string(&format!("option[{}].hex", code), &packet), Vec::<u8>::new());
    }

    #[test]
    fn evaluation_is_total_over_arbitrary_payloads(
        relay_info in prop::collection::vec(any::<u8>(), 0..64),
        vendor_class in prop::collection::vec(any::<u8>(), 0..64),
        vendor_opts in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let packet = v4_with(vec![
            RawOption::new(82, relay_info),
            RawOption::new(124, vendor_class),
            RawOption::new(125, vendor_opts),
        ]);
        for text in [
            "relay4[1].exists",
            "relay4[2].hex == 0x00",
            "vendor[*].exists",
            "vendor[4491].option[1].exists",
            "vendor.enterprise == 4491",
            "vendor-class[0].exists",
            "vendor-class[*].data[3] == 'x'",
            "vendor-class.enterprise == 0x00000000",
            "substring(option[125].hex, -3, -2) == ''",
        ] {
            let program = compile(text, Family::V4, ExpressionKind::Bool).unwrap();
            prop_assert!(program.evaluate_bool(&packet).is_ok());
        }
    }

    #[test]
    fn equal_is_byte_equality(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
        let program = compile(&format!("'{}' == '{}'", a, b), Family::V4, ExpressionKind::Bool)
            .unwrap();
        prop_assert_eq!(program.evaluate_bool(&empty_v4()).unwrap(), a == b);
    }
}

#[test]
fn v4_constructs_fail_under_v6() {
    for text in V4_ONLY {
        let error = compile(text, Family::V6, ExpressionKind::Bool).unwrap_err();
        assert!(
            matches!(error, Error::Semantic { .. }),
            "{} compiled under DHCPv6: {}",
            text,
            error
        );
        assert!(compile(text, Family::V4, ExpressionKind::Bool).is_ok());
    }
}

#[test]
fn v6_constructs_fail_under_v4() {
    for text in V6_ONLY {
        let error = compile(text, Family::V4, ExpressionKind::Bool).unwrap_err();
        assert!(
            matches!(error, Error::Semantic { .. }),
            "{} compiled under DHCPv4: {}",
            text,
            error
        );
        assert!(compile(text, Family::V6, ExpressionKind::Bool).is_ok());
    }
}

#[test]
fn valid_expressions_compile() {
    for text in VALID_EXPRESSIONS {
        assert!(compile(text, Family::V4, ExpressionKind::Bool).is_ok(), "{}", text);
    }
}

#[test]
fn pxe_vendor_class_matches_exactly() {
    let program = compile("option[60].text == 'PXE'", Family::V4, ExpressionKind::Bool).unwrap();
    assert!(program.evaluate_bool(&v4_with(vec![RawOption::new(60, b"PXE".to_vec())])).unwrap());
    assert!(!program.evaluate_bool(&v4_with(vec![RawOption::new(60, b"pxe".to_vec())])).unwrap());
    assert!(!program.evaluate_bool(&empty_v4()).unwrap());
}

#[test]
fn substring_of_vendor_options_prefix() {
    let program = compile(
        "substring(option[125].hex,0,4) == 0x01020304",
        Family::V4,
        ExpressionKind::Bool,
    )
    .unwrap();
    let packet = v4_with(vec![RawOption::new(125, vec![1, 2, 3, 4, 0xff])]);
    assert!(program.evaluate_bool(&packet).unwrap());
}

#[test]
fn absent_relay_info_is_false() {
    let program = compile("option[82].exists", Family::V4, ExpressionKind::Bool).unwrap();
    assert_eq!(program.evaluate(&empty_v4()).unwrap(), Value::Bool(false));
}

#[test]
fn relay6_under_v4_reports_keyword_location() {
    let error = compile("relay6[0].option[17].exists", Family::V4, ExpressionKind::Bool)
        .unwrap_err();
    assert!(matches!(error, Error::Semantic { .. }));
    assert_eq!(error.location(), Some(Location::new(1, 1, 6)));
}

#[test]
fn relay6_nest_levels_select_layers() {
    let mut pkt = Pkt6::new(1, 0x123456, Metadata::default());
    for (index, id) in [b"inner".to_vec(), b"outer".to_vec()].into_iter().enumerate() {
        pkt.relays.push(dhcpclass::RelayLayer {
            msg_type: 12,
            hop_count: index as u8,
            link_addr: std::net::Ipv6Addr::UNSPECIFIED,
            peer_addr: std::net::Ipv6Addr::LOCALHOST,
            options: vec![RawOption::new(18, id)],
        });
    }
    let packet = Packet::V6(pkt);

    let inner = compile("relay6[0].option[18].text == 'inner'", Family::V6, ExpressionKind::Bool)
        .unwrap();
    let outer = compile("relay6[1].option[18].text == 'outer'", Family::V6, ExpressionKind::Bool)
        .unwrap();
    let missing = compile("relay6[2].option[18].exists", Family::V6, ExpressionKind::Bool).unwrap();
    assert!(inner.evaluate_bool(&packet).unwrap());
    assert!(outer.evaluate_bool(&packet).unwrap());
    assert!(!missing.evaluate_bool(&packet).unwrap());
}

#[test]
fn exists_versus_text_asymmetry() {
    let packet = v4_with(vec![RawOption::new(77, Vec::new())]);
    let exists = compile("option[77].exists", Family::V4, ExpressionKind::Bool).unwrap();
    let empty = compile("option[77].text == ''", Family::V4, ExpressionKind::Bool).unwrap();
    assert!(exists.evaluate_bool(&packet).unwrap());
    assert!(empty.evaluate_bool(&packet).unwrap());
    assert!(!exists.evaluate_bool(&empty_v4()).unwrap());
    assert!(empty.evaluate_bool(&empty_v4()).unwrap());
}
