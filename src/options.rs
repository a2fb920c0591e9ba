//! DHCP option codes, the option-name registry and option payload walkers.
//!
//! The engine reads options as raw payloads. Structured payloads (relay agent
//! sub-options, vendor-specific information, vendor classes) are decoded
//! lazily at evaluation time by the walkers in this module. Truncated
//! structures are decoded as far as they go: classification must stay
//! decidable for any packet, so a short payload yields fewer entries rather
//! than an error.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions
//! - RFC 3046: DHCP Relay Agent Information Option (Option 82)
//! - RFC 3925: Vendor-Identifying Vendor Options for DHCPv4 (Options 124/125)
//! - RFC 8415 §21.16, §21.17: DHCPv6 Vendor Class and Vendor-specific Information

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::packet::Family;

/// DHCPv4 option codes the engine and the packet decoder care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Used for alignment.
    Pad = 0,
    /// Option overload - indicates sname/file fields contain options (RFC 2132 §9.3).
    OptionOverload = 52,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Relay agent information (RFC 3046).
    RelayAgentInfo = 82,
    /// Vendor-identifying vendor class (RFC 3925).
    VendorClass = 124,
    /// Vendor-identifying vendor-specific information (RFC 3925).
    VendorOpts = 125,
    /// End of options marker.
    End = 255,
}

/// DHCPv6 option codes the engine and the packet decoder care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Option6Code {
    /// Encapsulated message inside RELAY-FORW/RELAY-REPL.
    RelayMsg = 9,
    /// Vendor class (RFC 8415 §21.16).
    VendorClass = 16,
    /// Vendor-specific information (RFC 8415 §21.17).
    VendorOpts = 17,
}

/// Option overload flags (Option 52) as defined in RFC 2132 §9.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OverloadFlag {
    /// The `file` field contains options.
    File = 1,
    /// The `sname` field contains options.
    Sname = 2,
    /// Both `file` and `sname` fields contain options.
    Both = 3,
}

impl TryFrom<u8> for OverloadFlag {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Sname),
            3 => Ok(Self::Both),
            other => Err(other),
        }
    }
}

/// Returns the code of the vendor-specific information option for `family`.
pub fn vendor_opts_code(family: Family) -> u16 {
    match family {
        Family::V4 => OptionCode::VendorOpts as u16,
        Family::V6 => Option6Code::VendorOpts as u16,
    }
}

/// Returns the code of the vendor class option for `family`.
pub fn vendor_class_code(family: Family) -> u16 {
    match family {
        Family::V4 => OptionCode::VendorClass as u16,
        Family::V6 => Option6Code::VendorClass as u16,
    }
}

const STANDARD_V4: &[(&str, u16)] = &[
    ("subnet-mask", 1),
    ("time-offset", 2),
    ("routers", 3),
    ("time-servers", 4),
    ("name-servers", 5),
    ("domain-name-servers", 6),
    ("log-servers", 7),
    ("cookie-servers", 8),
    ("lpr-servers", 9),
    ("impress-servers", 10),
    ("resource-location-servers", 11),
    ("host-name", 12),
    ("boot-size", 13),
    ("merit-dump", 14),
    ("domain-name", 15),
    ("swap-server", 16),
    ("root-path", 17),
    ("extensions-path", 18),
    ("ip-forwarding", 19),
    ("non-local-source-routing", 20),
    ("policy-filter", 21),
    ("max-dgram-reassembly", 22),
    ("default-ip-ttl", 23),
    ("path-mtu-aging-timeout", 24),
    ("path-mtu-plateau-table", 25),
    ("interface-mtu", 26),
    ("all-subnets-local", 27),
    ("broadcast-address", 28),
    ("perform-mask-discovery", 29),
    ("mask-supplier", 30),
    ("router-discovery", 31),
    ("router-solicitation-address", 32),
    ("static-routes", 33),
    ("trailer-encapsulation", 34),
    ("arp-cache-timeout", 35),
    ("ieee802-3-encapsulation", 36),
    ("default-tcp-ttl", 37),
    ("tcp-keepalive-interval", 38),
    ("tcp-keepalive-garbage", 39),
    ("nis-domain", 40),
    ("nis-servers", 41),
    ("ntp-servers", 42),
    ("vendor-encapsulated-options", 43),
    ("netbios-name-servers", 44),
    ("netbios-dd-server", 45),
    ("netbios-node-type", 46),
    ("netbios-scope", 47),
    ("font-servers", 48),
    ("x-display-manager", 49),
    ("dhcp-requested-address", 50),
    ("dhcp-lease-time", 51),
    ("dhcp-option-overload", 52),
    ("dhcp-message-type", 53),
    ("dhcp-server-identifier", 54),
    ("dhcp-parameter-request-list", 55),
    ("dhcp-message", 56),
    ("dhcp-max-message-size", 57),
    ("dhcp-renewal-time", 58),
    ("dhcp-rebinding-time", 59),
    ("vendor-class-identifier", 60),
    ("dhcp-client-identifier", 61),
    ("nwip-domain-name", 62),
    ("nwip-suboptions", 63),
    ("tftp-server-name", 66),
    ("boot-file-name", 67),
    ("user-class", 77),
    ("fqdn", 81),
    ("dhcp-agent-options", 82),
    ("authenticate", 90),
    ("client-last-transaction-time", 91),
    ("associated-ip", 92),
    ("client-system", 93),
    ("client-ndi", 94),
    ("uuid-guid", 97),
    ("subnet-selection", 118),
    ("domain-search", 119),
    ("vivco-suboptions", 124),
    ("vivso-suboptions", 125),
];

const STANDARD_V6: &[(&str, u16)] = &[
    ("clientid", 1),
    ("serverid", 2),
    ("ia-na", 3),
    ("ia-ta", 4),
    ("iaaddr", 5),
    ("oro", 6),
    ("preference", 7),
    ("elapsed-time", 8),
    ("relay-msg", 9),
    ("auth", 11),
    ("unicast", 12),
    ("status-code", 13),
    ("rapid-commit", 14),
    ("user-class", 15),
    ("vendor-class", 16),
    ("vendor-opts", 17),
    ("interface-id", 18),
    ("reconf-msg", 19),
    ("reconf-accept", 20),
    ("sip-server-dns", 21),
    ("sip-server-addr", 22),
    ("dns-servers", 23),
    ("domain-search", 24),
    ("ia-pd", 25),
    ("iaprefix", 26),
    ("nis-servers", 27),
    ("nisp-servers", 28),
    ("nis-domain-name", 29),
    ("nisp-domain-name", 30),
    ("sntp-servers", 31),
    ("information-refresh-time", 32),
    ("bcmcs-server-dns", 33),
    ("bcmcs-server-addr", 34),
    ("geoconf-civic", 36),
    ("remote-id", 37),
    ("subscriber-id", 38),
    ("client-fqdn", 39),
    ("pana-agent", 40),
    ("new-posix-timezone", 41),
    ("new-tzdb-timezone", 42),
    ("ero", 43),
    ("lq-query", 44),
    ("client-data", 45),
    ("clt-time", 46),
    ("lq-relay-data", 47),
    ("lq-client-link", 48),
    ("bootfile-url", 59),
    ("bootfile-param", 60),
    ("client-arch-type", 61),
    ("nii", 62),
    ("aftr-name", 64),
    ("erp-local-domain-name", 65),
    ("rsoo", 66),
    ("pd-exclude", 67),
    ("client-linklayer-addr", 79),
];

/// Resolves option names used in `option[name]` to numeric codes.
///
/// [`standard`](Self::standard) carries the IANA names for both families.
/// Deployments add their own names with [`define`](Self::define).
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    v4: HashMap<String, u16>,
    v6: HashMap<String, u16>,
}

impl OptionRegistry {
    /// Creates a registry holding the standard DHCPv4 and DHCPv6 option names.
    pub fn standard() -> Self {
        let v4 = STANDARD_V4
            .iter()
            .map(|(name, code)| (name.to_string(), *code))
            .collect();
        let v6 = STANDARD_V6
            .iter()
            .map(|(name, code)| (name.to_string(), *code))
            .collect();
        Self { v4, v6 }
    }

    /// Adds or replaces a name for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty name or a DHCPv4 code
    /// outside 1..=254 (0 and 255 are Pad and End).
    pub fn define(&mut self, family: Family, name: &str, code: u16) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidConfig("option name must not be empty".to_string()));
        }
        let table = match family {
            Family::V4 => {
                if code == OptionCode::Pad as u16 || code >= OptionCode::End as u16 {
                    return Err(Error::InvalidConfig(format!(
                        "option '{}' has invalid DHCPv4 code {}",
                        name, code
                    )));
                }
                &mut self.v4
            }
            Family::V6 => &mut self.v6,
        };
        table.insert(name.to_string(), code);
        Ok(())
    }

    /// Returns the code registered for `name` in `family`.
    pub fn lookup(&self, family: Family, name: &str) -> Option<u16> {
        match family {
            Family::V4 => self.v4.get(name).copied(),
            Family::V6 => self.v6.get(name).copied(),
        }
    }
}

/// Iterates code/length/value entries of an option payload.
///
/// DHCPv4 structures use 1-byte codes and lengths, DHCPv6 2-byte ones.
pub(crate) struct TlvIter<'a> {
    data: &'a [u8],
    wide: bool,
}

impl<'a> TlvIter<'a> {
    pub(crate) fn new(data: &'a [u8], family: Family) -> Self {
        Self {
            data,
            wide: family == Family::V6,
        }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (code, length, header) = if self.wide {
            if self.data.len() < 4 {
                return None;
            }
            let code = u16::from_be_bytes([self.data[0], self.data[1]]);
            let length = u16::from_be_bytes([self.data[2], self.data[3]]) as usize;
            (code, length, 4)
        } else {
            if self.data.len() < 2 {
                return None;
            }
            (self.data[0] as u16, self.data[1] as usize, 2)
        };

        if header + length > self.data.len() {
            self.data = &[];
            return None;
        }

        let value = &self.data[header..header + length];
        self.data = &self.data[header + length..];
        Some((code, value))
    }
}

/// Finds the first sub-option with `code` inside `data`.
pub(crate) fn find_suboption(data: &[u8], code: u16, family: Family) -> Option<&[u8]> {
    TlvIter::new(data, family).find_map(|(candidate, value)| (candidate == code).then_some(value))
}

/// One enterprise-identified block of a vendor or vendor-class option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnterpriseBlock<'a> {
    pub enterprise_id: u32,
    pub data: &'a [u8],
}

/// Splits a vendor (125/17) or vendor-class (124/16) payload into blocks.
///
/// DHCPv4 payloads may carry several `enterprise(4) length(1) data` blocks.
/// A DHCPv6 payload is a single block whose data runs to the end.
pub(crate) fn enterprise_blocks(payload: &[u8], family: Family) -> Vec<EnterpriseBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = payload;

    while rest.len() >= 4 {
        let enterprise_id = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        match family {
            Family::V6 => {
                blocks.push(EnterpriseBlock {
                    enterprise_id,
                    data: &rest[4..],
                });
                break;
            }
            Family::V4 => {
                let Some(&length) = rest.get(4) else {
                    break;
                };
                let end = (5 + length as usize).min(rest.len());
                blocks.push(EnterpriseBlock {
                    enterprise_id,
                    data: &rest[5..end],
                });
                rest = &rest[end..];
            }
        }
    }

    blocks
}

/// Splits vendor-class data into its length-prefixed tuples.
pub(crate) fn tuples(data: &[u8], family: Family) -> Vec<&[u8]> {
    let mut result = Vec::new();
    let mut rest = data;

    loop {
        let (length, header) = match family {
            Family::V4 if !rest.is_empty() => (rest[0] as usize, 1),
            Family::V6 if rest.len() >= 2 => (u16::from_be_bytes([rest[0], rest[1]]) as usize, 2),
            _ => break,
        };
        if header + length > rest.len() {
            break;
        }
        result.push(&rest[header..header + length]);
        rest = &rest[header + length..];
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_flag_conversions() {
        assert_eq!(OverloadFlag::try_from(1), Ok(OverloadFlag::File));
        assert_eq!(OverloadFlag::try_from(3), Ok(OverloadFlag::Both));
        assert_eq!(OverloadFlag::try_from(4), Err(4));
    }

    #[test]
    fn test_standard_names() {
        let registry = OptionRegistry::standard();
        assert_eq!(registry.lookup(Family::V4, "host-name"), Some(12));
        assert_eq!(registry.lookup(Family::V4, "dhcp-agent-options"), Some(82));
        assert_eq!(registry.lookup(Family::V6, "vendor-class"), Some(16));
        assert_eq!(registry.lookup(Family::V6, "host-name"), None);
        assert_eq!(registry.lookup(Family::V4, "no-such-option"), None);
    }

    #[test]
    fn test_define_custom_name() {
        let mut registry = OptionRegistry::standard();
        registry.define(Family::V4, "site-token", 224).unwrap();
        registry.define(Family::V6, "site-token", 65000).unwrap();
        assert_eq!(registry.lookup(Family::V4, "site-token"), Some(224));
        assert_eq!(registry.lookup(Family::V6, "site-token"), Some(65000));
    }

    #[test]
    fn test_define_rejects_invalid_codes() {
        let mut registry = OptionRegistry::default();
        assert!(registry.define(Family::V4, "pad", 0).is_err());
        assert!(registry.define(Family::V4, "too-big", 300).is_err());
        assert!(registry.define(Family::V4, "", 10).is_err());
    }

    #[test]
    fn test_find_suboption_v4() {
        let data = [1, 3, b'e', b't', b'h', 2, 2, 0xab, 0xcd];
        assert_eq!(find_suboption(&data, 2, Family::V4), Some(&[0xab, 0xcd][..]));
        assert_eq!(find_suboption(&data, 1, Family::V4), Some(&b"eth"[..]));
        assert_eq!(find_suboption(&data, 5, Family::V4), None);
    }

    #[test]
    fn test_find_suboption_truncated() {
        let data = [1, 10, 0xff];
        assert_eq!(find_suboption(&data, 1, Family::V4), None);
    }

    #[test]
    fn test_find_suboption_v6() {
        let data = [0, 7, 0, 2, 0x11, 0x22];
        assert_eq!(find_suboption(&data, 7, Family::V6), Some(&[0x11, 0x22][..]));
    }

    #[test]
    fn test_enterprise_blocks_v4() {
        let payload = [0, 0, 0x12, 0x34, 2, 0xaa, 0xbb, 0, 0, 0, 9, 1, 0xcc];
        let blocks = enterprise_blocks(&payload, Family::V4);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].enterprise_id, 0x1234);
        assert_eq!(blocks[0].data, &[0xaa, 0xbb]);
        assert_eq!(blocks[1].enterprise_id, 9);
        assert_eq!(blocks[1].data, &[0xcc]);
    }

    #[test]
    fn test_enterprise_blocks_v6() {
        let payload = [0, 0, 0x12, 0x34, 0, 1, 0, 1, 0xaa];
        let blocks = enterprise_blocks(&payload, Family::V6);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, &[0, 1, 0, 1, 0xaa]);
    }

    #[test]
    fn test_tuples() {
        assert_eq!(
            tuples(&[2, b'a', b'b', 1, b'c'], Family::V4),
            vec![&b"ab"[..], &b"c"[..]]
        );
        assert_eq!(tuples(&[0, 3, b'x', b'y', b'z'], Family::V6), vec![&b"xyz"[..]]);
        assert!(tuples(&[5, b'a'], Family::V4).is_empty());
    }
}
