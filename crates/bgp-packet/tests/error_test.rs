use bgp_packet::{AttrType, BgpParseError, DecodeError, PrefixSid};
use hex_literal::hex;

#[test]
fn test_attribute_parse_error_context() {
    let truncated = hex!(
        "c0"   // Flags: optional, transitive
        "28"   // Type: Prefix-SID
        "0a"   // Length: 10
        "05"   // Type: SRv6 L3 Service
        "0015" // Length: 21 (only 7 bytes follow)
        "00200100020000"
    );

    match PrefixSid::parse_attr(&truncated) {
        Err(BgpParseError::AttributeParseError { attr_type, source }) => {
            assert_eq!(attr_type, AttrType::PrefixSid);
            let source = source.downcast_ref::<DecodeError>().unwrap();
            assert_eq!(
                source,
                &DecodeError::TruncatedTlv {
                    tlv_type: 5,
                    declared: 21,
                    available: 7
                }
            );
        }
        other => panic!("Expected attribute parse error, got {:?}", other),
    }
}

#[test]
fn test_attribute_value_incomplete() {
    let input = hex!("c0 28 16 04 00 13");
    match PrefixSid::parse_attr(&input) {
        Err(BgpParseError::IncompleteData { needed }) => assert_eq!(needed, 19),
        other => panic!("Expected incomplete data, got {:?}", other),
    }
}

#[test]
fn test_unexpected_attribute_type() {
    let input = hex!("40 01 01 00");
    match PrefixSid::parse_attr(&input) {
        Err(BgpParseError::UnexpectedAttributeType { expected, actual }) => {
            assert_eq!(expected, AttrType::PrefixSid);
            assert_eq!(actual, AttrType::Origin);
        }
        other => panic!("Expected unexpected attribute type, got {:?}", other),
    }
}

#[test]
fn test_error_display() {
    let error = BgpParseError::AttributeParseError {
        attr_type: AttrType::PrefixSid,
        source: Box::new(DecodeError::InvalidStructure { sum: 200 }),
    };
    let error_string = format!("{}", error);
    assert!(error_string.contains("PrefixSid"));
    assert!(error_string.contains("Failed to parse BGP attribute"));
}
