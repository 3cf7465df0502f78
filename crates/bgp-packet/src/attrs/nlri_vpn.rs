use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use nom::bytes::complete::take;
use nom::error::{ErrorKind, make_error};
use nom::number::complete::{be_u8, be_u32};
use nom::{IResult, Parser};

use crate::{Afi, Label, ParseBe, RouteDistinguisher, nlri_psize};

/// Label (24 bits) and RD (64 bits) counted in the NLRI prefix length.
const VPN_PREFIX_OVERHEAD: u8 = 88;

/// Labeled VPN NLRI (RFC 4364 / RFC 4659) for both address families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnNlri {
    pub id: u32,
    pub label: Label,
    pub rd: RouteDistinguisher,
    pub prefix: IpNet,
}

impl VpnNlri {
    pub fn new(rd: RouteDistinguisher, prefix: IpNet) -> Self {
        Self {
            id: 0,
            label: Label::default(),
            rd,
            prefix,
        }
    }

    pub fn parse_nlri(input: &[u8], afi: Afi, add_path: bool) -> IResult<&[u8], VpnNlri> {
        let (input, id) = if add_path { be_u32(input)? } else { (input, 0) };

        let Some(max_plen) = afi.max_plen() else {
            return Err(nom::Err::Error(make_error(input, ErrorKind::Tag)));
        };

        let (input, plen) = be_u8(input)?;
        if plen < VPN_PREFIX_OVERHEAD {
            return Err(nom::Err::Error(make_error(input, ErrorKind::LengthValue)));
        }
        let plen = plen - VPN_PREFIX_OVERHEAD;
        if plen > max_plen {
            return Err(nom::Err::Error(make_error(input, ErrorKind::LengthValue)));
        }

        let (input, label) = Label::parse_be(input)?;
        let (input, rd) = RouteDistinguisher::parse_be(input)?;

        let psize = nlri_psize(plen);
        if psize > input.len() {
            return Err(nom::Err::Error(make_error(input, ErrorKind::Eof)));
        }
        let (input, addr) = take(psize).parse(input)?;

        let prefix = match afi {
            Afi::Ip => {
                let mut paddr = [0u8; 4];
                paddr[..psize].copy_from_slice(addr);
                Ipv4Net::new(Ipv4Addr::from(paddr), plen).map(IpNet::V4)
            }
            _ => {
                let mut paddr = [0u8; 16];
                paddr[..psize].copy_from_slice(addr);
                Ipv6Net::new(Ipv6Addr::from(paddr), plen).map(IpNet::V6)
            }
        }
        .map_err(|_| nom::Err::Error(make_error(input, ErrorKind::Verify)))?;

        Ok((
            input,
            VpnNlri {
                id,
                label,
                rd,
                prefix: prefix.trunc(),
            },
        ))
    }

    pub fn emit(&self, buf: &mut BytesMut, add_path: bool) {
        if add_path {
            buf.put_u32(self.id);
        }
        let plen = self.prefix.prefix_len();
        buf.put_u8(plen + VPN_PREFIX_OVERHEAD);
        self.label.emit(buf);
        self.rd.emit(buf);
        let psize = nlri_psize(plen);
        match self.prefix {
            IpNet::V4(net) => buf.put(&net.addr().octets()[..psize]),
            IpNet::V6(net) => buf.put(&net.addr().octets()[..psize]),
        }
    }

    pub fn afi(&self) -> Afi {
        match self.prefix {
            IpNet::V4(_) => Afi::Ip,
            IpNet::V6(_) => Afi::Ip6,
        }
    }
}

impl fmt::Display for VpnNlri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.afi() {
            Afi::Ip => "VPNv4",
            _ => "VPNv6",
        };
        write!(
            f,
            "{} [{}]:[{}]{} label: {}",
            family, self.rd, self.id, self.prefix, self.label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpnv4_nlri() {
        // plen 120 = 88 + 32, label 3 (BoS), RD 1:1, 4.4.4.4.
        let input = [
            0x78, 0x00, 0x00, 0x31, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x04, 0x04,
            0x04, 0x04,
        ];
        let (rest, nlri) = VpnNlri::parse_nlri(&input, Afi::Ip, false).unwrap();
        assert!(rest.is_empty());
        assert_eq!(nlri.rd.to_string(), "1:1");
        assert_eq!(nlri.prefix.to_string(), "4.4.4.4/32");
        assert_eq!(nlri.label.label, Label::IMPLICIT_NULL);
        assert!(nlri.label.bos);

        let mut buf = BytesMut::new();
        nlri.emit(&mut buf, false);
        assert_eq!(&buf[..], &input[..]);
    }

    #[test]
    fn test_vpnv6_nlri_addpath() {
        let nlri = VpnNlri {
            id: 7,
            label: Label::default(),
            rd: RouteDistinguisher::asn(65000, 100),
            prefix: "2001:db8:10::/48".parse().unwrap(),
        };
        let mut buf = BytesMut::new();
        nlri.emit(&mut buf, true);
        assert_eq!(buf.len(), 4 + 1 + 3 + 8 + 6);

        let (rest, parsed) = VpnNlri::parse_nlri(&buf, Afi::Ip6, true).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, nlri);
    }

    #[test]
    fn test_vpn_nlri_bad_length() {
        // Prefix length below label + RD.
        let input = [0x40, 0x00, 0x00, 0x31];
        assert!(VpnNlri::parse_nlri(&input, Afi::Ip, false).is_err());

        // IPv4 prefix longer than 32 bits.
        let input = [88 + 33, 0x00, 0x00, 0x31];
        assert!(VpnNlri::parse_nlri(&input, Afi::Ip, false).is_err());
    }
}
