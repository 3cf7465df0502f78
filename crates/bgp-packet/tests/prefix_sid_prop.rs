use std::net::Ipv6Addr;

use arbitrary::{Arbitrary, Result as ArbitraryResult, Unstructured};
use bgp_packet::{AttrEmitter, DecodeError, PrefixSid, SidStructure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CASES: u64 = 20_000;

/// Any Prefix-SID the encoder can represent: structure lengths sum to at
/// most 128.
#[derive(Debug)]
struct AnyPrefixSid(PrefixSid);

impl<'a> Arbitrary<'a> for AnyPrefixSid {
    fn arbitrary(u: &mut Unstructured<'a>) -> ArbitraryResult<Self> {
        let sid = Ipv6Addr::from(u128::arbitrary(u)?);
        if bool::arbitrary(u)? {
            return Ok(Self(PrefixSid::Type4L3Vpn { sid }));
        }
        let behavior = u16::arbitrary(u)?;
        let structure = if bool::arbitrary(u)? {
            let mut lens = [0u8; 4];
            let mut left = 128u8;
            for len in lens.iter_mut() {
                *len = u.int_in_range(0..=left)?;
                left -= *len;
            }
            // Spread the budget over all four fields, not only the first.
            let rotate = u.int_in_range(0..=3usize)?;
            lens.rotate_left(rotate);
            Some(SidStructure::new(lens[0], lens[1], lens[2], lens[3]))
        } else {
            None
        };
        Ok(Self(PrefixSid::Type5Srv6L3Service {
            sid,
            behavior,
            structure,
        }))
    }
}

fn unstructured_bytes(rng: &mut StdRng, max: usize) -> Vec<u8> {
    let len = rng.random_range(0..=max);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

#[test]
fn test_round_trip_any_representable() {
    let mut rng = StdRng::seed_from_u64(0x5256);
    let mut type4 = 0;
    let mut structured = 0;

    for _ in 0..CASES {
        let data = unstructured_bytes(&mut rng, 64);
        let mut u = Unstructured::new(&data);
        let Ok(AnyPrefixSid(attr)) = AnyPrefixSid::arbitrary(&mut u) else {
            continue;
        };
        match &attr {
            PrefixSid::Type4L3Vpn { .. } => type4 += 1,
            PrefixSid::Type5Srv6L3Service {
                structure: Some(s), ..
            } => {
                assert!(s.total() <= 128);
                structured += 1;
            }
            _ => {}
        }

        let buf = attr.encode();
        assert_eq!(PrefixSid::decode(&buf), Ok(attr.clone()), "{:02x?}", &buf[..]);

        let wire = attr.attr_bytes();
        let (rest, parsed) = PrefixSid::parse_attr(&wire).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, attr);
    }
    assert!(type4 > 0);
    assert!(structured > 0);
}

#[test]
fn test_decode_arbitrary_input() {
    let mut rng = StdRng::seed_from_u64(0x7f40);

    for _ in 0..CASES {
        let mut data = unstructured_bytes(&mut rng, 96);
        // Bias the leading octet towards known TLV types to reach the
        // nested parsers.
        if let Some(first) = data.first_mut() {
            if rng.random_bool(0.75) {
                *first = if rng.random_bool(0.5) { 4 } else { 5 };
            }
        }

        match PrefixSid::decode(&data) {
            Ok(attr) => {
                if let Some(s) = attr.structure() {
                    assert!(s.total() <= 128);
                }
            }
            Err(DecodeError::UnknownType(t)) => assert!(t != 4 && t != 5),
            Err(_) => {}
        }
        let _ = PrefixSid::parse_attr(&data);
    }
}

#[test]
fn test_decode_every_truncation() {
    let mut rng = StdRng::seed_from_u64(0x0028);

    for _ in 0..2_000 {
        let data = unstructured_bytes(&mut rng, 64);
        let mut u = Unstructured::new(&data);
        let Ok(AnyPrefixSid(attr)) = AnyPrefixSid::arbitrary(&mut u) else {
            continue;
        };
        let buf = attr.encode();
        for cut in 0..buf.len() {
            assert!(PrefixSid::decode(&buf[..cut]).is_err(), "cut {} of {:?}", cut, attr);
        }
    }
}
