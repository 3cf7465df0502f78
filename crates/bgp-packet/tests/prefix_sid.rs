use std::net::Ipv6Addr;

use bgp_packet::{AttrEmitter, PrefixSid, SidStructure};
use hex_literal::hex;

const TYPE4_CAPTURE: [u8; 22] = hex!(
    "04"   // Type: SRv6 L3 VPN SID
    "0013" // Length: 19
    "00"   // Reserved
    "01"   // SID type
    "00"   // Flags
    "20010000000000010040000000000000" // SID
);

const TYPE5_CAPTURE: [u8; 24] = hex!(
    "05"   // Type: SRv6 L3 Service
    "0015" // Length: 21
    "00"   // Reserved
    "20010002000000000000000000000010" // SID
    "00"   // SID flags
    "ffff" // Endpoint behavior
    "00"   // Reserved
);

#[test]
fn test_type4_capture_decode() {
    let attr = PrefixSid::decode(&TYPE4_CAPTURE).unwrap();
    let sid: Ipv6Addr = "2001:0:0:1:40::".parse().unwrap();
    assert_eq!(attr, PrefixSid::Type4L3Vpn { sid });
    assert_eq!(attr.sid().to_string(), "2001:0:0:1:40::");
}

#[test]
fn test_type4_capture_encode() {
    let attr = PrefixSid::Type4L3Vpn {
        sid: "2001:0:0:1:40::".parse().unwrap(),
    };
    assert_eq!(&attr.encode()[..], &TYPE4_CAPTURE[..]);
}

#[test]
fn test_type5_capture_decode() {
    let attr = PrefixSid::decode(&TYPE5_CAPTURE).unwrap();
    assert_eq!(
        attr,
        PrefixSid::Type5Srv6L3Service {
            sid: "2001:2::10".parse().unwrap(),
            behavior: PrefixSid::BEHAVIOR_OPAQUE,
            structure: None,
        }
    );
    assert_eq!(&attr.encode()[..], &TYPE5_CAPTURE[..]);
}

#[test]
fn test_round_trip() {
    let attrs = [
        PrefixSid::Type4L3Vpn {
            sid: "fc00:0:1:e000::".parse().unwrap(),
        },
        PrefixSid::Type5Srv6L3Service {
            sid: "2001:db8:1:1:fc3::".parse().unwrap(),
            behavior: 19,
            structure: Some(SidStructure::new(40, 24, 16, 0)),
        },
        PrefixSid::Type5Srv6L3Service {
            sid: "2001:db8:2:2::".parse().unwrap(),
            behavior: 18,
            structure: None,
        },
    ];
    for attr in attrs {
        let buf = attr.encode();
        assert_eq!(PrefixSid::decode(&buf).unwrap(), attr);
    }
}

#[test]
fn test_path_attribute_emit() {
    let attr = PrefixSid::decode(&TYPE4_CAPTURE).unwrap();
    let buf = attr.attr_bytes();
    assert_eq!(&buf[..3], &hex!("c0 28 16"));
    assert_eq!(&buf[3..], &TYPE4_CAPTURE[..]);

    let (rest, parsed) = PrefixSid::parse_attr(&buf).unwrap();
    assert!(rest.is_empty());
    assert_eq!(parsed, attr);
}

#[test]
fn test_path_attribute_partial_flag() {
    // Captured with the partial bit set.
    let mut input = hex!("e0 28 18").to_vec();
    input.extend_from_slice(&TYPE5_CAPTURE);
    let (_, attr) = PrefixSid::parse_attr(&input).unwrap();
    assert_eq!(attr.sid().to_string(), "2001:2::10");
}
