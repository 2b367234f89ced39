// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

pub mod raw;
pub use self::raw::RawEvent;

mod logical;
pub use self::logical::{Direction, EventKind, IpVersion, LogicalEvent};

/// Display name of an ip protocol number.
pub fn protocol_name(proto: u8) -> String {
    let name = match proto {
        0 => "IPPROTO_HOPOPTS",
        1 => "IPPROTO_ICMP",
        2 => "IPPROTO_IGMP",
        3 => "IPPROTO_GGP",
        4 => "IPPROTO_IPV4",
        5 => "IPPROTO_ST",
        6 => "IPPROTO_TCP",
        7 => "IPPROTO_CBT",
        8 => "IPPROTO_EGP",
        9 => "IPPROTO_IGP",
        12 => "IPPROTO_PUP",
        17 => "IPPROTO_UDP",
        22 => "IPPROTO_IDP",
        41 => "IPPROTO_IPV6",
        43 => "IPPROTO_ROUTING",
        44 => "IPPROTO_FRAGMENT",
        47 => "IPPROTO_GRE",
        50 => "IPPROTO_ESP",
        51 => "IPPROTO_AH",
        58 => "IPPROTO_ICMPV6",
        59 => "IPPROTO_NONE",
        60 => "IPPROTO_DSTOPTS",
        103 => "IPPROTO_PIM",
        113 => "IPPROTO_PGM",
        132 => "IPPROTO_SCTP",
        136 => "IPPROTO_UDPLITE",
        _ => return format!("proto {}", proto),
    };
    name.to_string()
}

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

#[cfg(test)]
mod tests {
    use super::raw::{flags, EventV0, EventV3, HeaderOld, HeaderV3, KindRich, KindV0, RawEvent};
    use super::{Direction, EventKind, LogicalEvent};

    fn v4_header(flag_bits: u32) -> HeaderOld {
        HeaderOld {
            timestamp: 132_000_000_000_000_000,
            flags: flag_bits,
            ip_version: super::raw::IP_VERSION_V4,
            ip_protocol: super::IPPROTO_TCP,
            local_addr: [192, 168, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            remote_addr: [10, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            local_port: 49152,
            remote_port: 443,
            scope_id: 0,
            app_id: String::new(),
            user_id: Vec::new(),
        }
    }

    #[test]
    fn unset_fields_decode_as_absent() {
        // every header byte is populated, but no presence bit is set
        let header = v4_header(0);
        let raw = RawEvent::V3(EventV3 {
            header: HeaderV3 {
                base: header,
                ..Default::default()
            },
            kind: KindRich::ClassifyDrop(Default::default()),
        });
        let ev = LogicalEvent::decode(&raw).unwrap();
        assert_eq!(ev.ip_version, None);
        assert_eq!(ev.protocol, None);
        assert_eq!(ev.local_addr, None);
        assert_eq!(ev.remote_addr, None);
        assert_eq!(ev.local_port, None);
        assert_eq!(ev.remote_port, None);
        assert_eq!(ev.app_id, None);
        assert_eq!(ev.user_id, None);
        assert_eq!(ev.package_id, None);
    }

    #[test]
    fn v4_addresses_decode() {
        let bits = flags::IP_VERSION_SET
            | flags::LOCAL_ADDR_SET
            | flags::REMOTE_ADDR_SET
            | flags::LOCAL_PORT_SET
            | flags::REMOTE_PORT_SET
            | flags::IP_PROTOCOL_SET;
        let raw = RawEvent::V3(EventV3 {
            header: HeaderV3 {
                base: v4_header(bits),
                ..Default::default()
            },
            kind: KindRich::ClassifyDrop(Default::default()),
        });
        let ev = LogicalEvent::decode(&raw).unwrap();
        assert_eq!(ev.kind, EventKind::ClassifyDrop);
        assert_eq!(ev.local_addr, Some("192.168.1.2".parse().unwrap()));
        assert_eq!(ev.remote_addr, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(ev.local_port, Some(49152));
        assert_eq!(ev.remote_port, Some(443));
        assert_eq!(ev.protocol, Some(super::IPPROTO_TCP));
    }

    #[test]
    fn unknown_direction_defaults_to_inbound() {
        // level 0 drop records have no direction field at all
        let raw = RawEvent::V0(EventV0 {
            header: v4_header(0),
            kind: KindV0::ClassifyDrop(Default::default()),
        });
        let ev = LogicalEvent::decode(&raw).unwrap();
        assert_eq!(ev.direction, Direction::In);
    }

    #[test]
    fn explicit_direction_is_kept() {
        let mut drop = super::raw::ClassifyDrop2::default();
        drop.direction = super::raw::direction::MS_OUT;
        let raw = RawEvent::V3(EventV3 {
            header: HeaderV3 {
                base: v4_header(0),
                ..Default::default()
            },
            kind: KindRich::ClassifyDrop(drop),
        });
        let ev = LogicalEvent::decode(&raw).unwrap();
        assert_eq!(ev.direction, Direction::Out);
    }

    #[test]
    fn unhandled_tags_are_not_decoded() {
        let raw = RawEvent::V3(EventV3 {
            header: HeaderV3::default(),
            kind: KindRich::Other(super::raw::tag::IPSEC_KERNEL_DROP),
        });
        assert!(LogicalEvent::decode(&raw).is_none());
        assert_eq!(raw.tag(), super::raw::tag::IPSEC_KERNEL_DROP);
    }
}
