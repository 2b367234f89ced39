// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use super::raw::{
    self, flags, Capability, ClassifyAllow, HeaderOld, HeaderV2, HeaderV3, KindRich, KindV0,
    KindV1, RawEvent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    ClassifyAllow,
    ClassifyDrop,
    CapabilityAllow,
    CapabilityDrop,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ClassifyAllow => "CLASSIFY_ALLOW",
            EventKind::ClassifyDrop => "CLASSIFY_DROP",
            EventKind::CapabilityAllow => "CAPABILITY_ALLOW",
            EventKind::CapabilityDrop => "CAPABILITY_DROP",
        }
    }

    pub fn is_classify(&self) -> bool {
        match self {
            EventKind::ClassifyAllow | EventKind::ClassifyDrop => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Unknown,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            // decode() never leaves this in a logical event
            Direction::Unknown => "?",
        }
    }

    fn from_wire(value: u32) -> Self {
        match value {
            raw::direction::MS_IN | raw::direction::INBOUND => Direction::In,
            raw::direction::MS_OUT | raw::direction::OUTBOUND => Direction::Out,
            _ => Direction::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// The version-independent decode target. Optional fields mirror the
/// raw header's own per-field presence bits, an unset field is `None`
/// and never a zeroed value.
#[derive(Clone, Debug)]
pub struct LogicalEvent {
    pub timestamp: u64,
    pub kind: EventKind,
    pub direction: Direction,
    pub ip_version: Option<IpVersion>,
    pub protocol: Option<u8>,
    pub local_addr: Option<IpAddr>,
    pub remote_addr: Option<IpAddr>,
    pub local_port: Option<u16>,
    pub remote_port: Option<u16>,
    pub scope_id: Option<u32>,
    pub app_id: Option<String>,
    pub user_id: Option<Vec<u8>>,
    pub package_id: Option<Vec<u8>>,
    pub filter_id: Option<u64>,
    pub layer_id: Option<u16>,
    pub capability_id: Option<i32>,
    pub is_loopback: bool,
    pub reauth_reason: Option<u32>,
    pub effective_name: Option<String>,
    /// Presence bits the pipeline recognizes but does not decode.
    pub unhandled_flags: u32,
    /// The raw header bitmap, kept for diagnostics.
    pub raw_flags: u32,
}

impl LogicalEvent {
    /// Normalize one raw record. `None` means the record carries a
    /// recognized-but-unhandled type tag and must be counted as ignored.
    pub fn decode(raw: &RawEvent) -> Option<Self> {
        match raw {
            RawEvent::V0(ev) => match &ev.kind {
                KindV0::ClassifyDrop(drop) => {
                    let mut out = Self::from_header_old(&ev.header);
                    out.kind = EventKind::ClassifyDrop;
                    out.extract_classify_drop(drop.filter_id, drop.layer_id, None, None, false);
                    Some(out.infer_direction())
                },
                KindV0::Other(_) => None,
            },
            RawEvent::V1(ev) => match &ev.kind {
                KindV1::ClassifyDrop(drop) => {
                    let mut out = Self::from_header_old(&ev.header);
                    out.kind = EventKind::ClassifyDrop;
                    out.extract_classify_drop(
                        drop.filter_id,
                        drop.layer_id,
                        Some(drop.reauth_reason),
                        Some(drop.direction),
                        drop.is_loopback,
                    );
                    Some(out.infer_direction())
                },
                KindV1::Other(_) => None,
            },
            RawEvent::V2(ev) => Self::from_rich(Self::from_header_v2(&ev.header), &ev.kind),
            RawEvent::V3(ev) => Self::from_rich(Self::from_header_v3(&ev.header), &ev.kind),
            RawEvent::V4(ev) => Self::from_rich(Self::from_header_v3(&ev.header), &ev.kind),
        }
    }

    fn from_rich(header: Self, kind: &KindRich) -> Option<Self> {
        let mut out = header;
        match kind {
            KindRich::ClassifyDrop(drop) => {
                out.kind = EventKind::ClassifyDrop;
                out.extract_classify_drop(
                    drop.filter_id,
                    drop.layer_id,
                    Some(drop.reauth_reason),
                    Some(drop.direction),
                    drop.is_loopback,
                );
            },
            KindRich::ClassifyAllow(allow) => {
                out.kind = EventKind::ClassifyAllow;
                out.extract_classify_allow(allow);
            },
            KindRich::CapabilityDrop(cap) => {
                out.kind = EventKind::CapabilityDrop;
                out.extract_capability(cap);
            },
            KindRich::CapabilityAllow(cap) => {
                out.kind = EventKind::CapabilityAllow;
                out.extract_capability(cap);
            },
            KindRich::Other(_) => return None,
        }
        Some(out.infer_direction())
    }

    /// Per-kind extractor for classify-drop records of all three shapes.
    fn extract_classify_drop(
        &mut self,
        filter_id: u64,
        layer_id: u16,
        reauth: Option<u32>,
        direction: Option<u32>,
        is_loopback: bool,
    ) {
        self.filter_id = Some(filter_id);
        self.layer_id = Some(layer_id);
        self.is_loopback = is_loopback;
        if self.flag(flags::REAUTH_REASON_SET) {
            self.reauth_reason = reauth;
        }
        self.direction = direction.map(Direction::from_wire).unwrap_or(Direction::Unknown);
    }

    /// Per-kind extractor for classify-allow records.
    fn extract_classify_allow(&mut self, allow: &ClassifyAllow) {
        self.filter_id = Some(allow.filter_id);
        self.layer_id = Some(allow.layer_id);
        self.is_loopback = allow.is_loopback;
        if self.flag(flags::REAUTH_REASON_SET) {
            self.reauth_reason = Some(allow.reauth_reason);
        }
        self.direction = Direction::from_wire(allow.direction);
    }

    /// Per-kind extractor for both capability record kinds. These carry
    /// no direction field at all.
    fn extract_capability(&mut self, cap: &Capability) {
        self.filter_id = Some(cap.filter_id);
        self.capability_id = Some(cap.capability_id);
        self.is_loopback = cap.is_loopback;
        self.direction = Direction::Unknown;
    }

    /// Older shapes do not populate the direction reliably, the
    /// platform documents inbound as the effective default.
    fn infer_direction(mut self) -> Self {
        if self.direction == Direction::Unknown {
            self.direction = Direction::In;
        }
        self
    }

    fn flag(&self, bit: u32) -> bool {
        self.raw_flags & bit != 0
    }

    fn from_header_old(header: &HeaderOld) -> Self {
        let f = header.flags;
        let set = |bit: u32| f & bit != 0;

        let ip_version = if set(flags::IP_VERSION_SET) {
            match header.ip_version {
                raw::IP_VERSION_V4 => Some(IpVersion::V4),
                raw::IP_VERSION_V6 => Some(IpVersion::V6),
                _ => None,
            }
        } else {
            None
        };

        let addr = |bytes: &[u8; 16]| -> Option<IpAddr> {
            match ip_version? {
                IpVersion::V4 => {
                    let mut v4 = [0; 4];
                    v4.copy_from_slice(&bytes[..4]);
                    Some(IpAddr::V4(Ipv4Addr::from(v4)))
                },
                IpVersion::V6 => Some(IpAddr::V6(Ipv6Addr::from(*bytes))),
            }
        };

        LogicalEvent {
            timestamp: header.timestamp,
            // overwritten by the per-kind extractor
            kind: EventKind::ClassifyDrop,
            direction: Direction::Unknown,
            ip_version,
            protocol: if set(flags::IP_PROTOCOL_SET) {
                Some(header.ip_protocol)
            } else {
                None
            },
            local_addr: if set(flags::LOCAL_ADDR_SET) {
                addr(&header.local_addr)
            } else {
                None
            },
            remote_addr: if set(flags::REMOTE_ADDR_SET) {
                addr(&header.remote_addr)
            } else {
                None
            },
            local_port: if set(flags::LOCAL_PORT_SET) {
                Some(header.local_port)
            } else {
                None
            },
            remote_port: if set(flags::REMOTE_PORT_SET) {
                Some(header.remote_port)
            } else {
                None
            },
            scope_id: if set(flags::SCOPE_ID_SET) {
                Some(header.scope_id)
            } else {
                None
            },
            app_id: if set(flags::APP_ID_SET) && !header.app_id.is_empty() {
                Some(header.app_id.clone())
            } else {
                None
            },
            user_id: if set(flags::USER_ID_SET) && !header.user_id.is_empty() {
                Some(header.user_id.clone())
            } else {
                None
            },
            package_id: None,
            filter_id: None,
            layer_id: None,
            capability_id: None,
            is_loopback: false,
            reauth_reason: None,
            effective_name: None,
            unhandled_flags: f & (flags::ENTERPRISE_ID_SET | flags::POLICY_FLAGS_SET),
            raw_flags: f,
        }
    }

    fn from_header_v2(header: &HeaderV2) -> Self {
        let mut out = Self::from_header_old(&header.base);
        if header.base.flags & flags::PACKAGE_ID_SET != 0 && !header.package_sid.is_empty() {
            out.package_id = Some(header.package_sid.clone());
        }
        out
    }

    fn from_header_v3(header: &HeaderV3) -> Self {
        let mut out = Self::from_header_old(&header.base);
        let f = header.base.flags;
        if f & flags::PACKAGE_ID_SET != 0 && !header.package_sid.is_empty() {
            out.package_id = Some(header.package_sid.clone());
        }
        if f & flags::EFFECTIVE_NAME_SET != 0 && !header.effective_name.is_empty() {
            out.effective_name = Some(header.effective_name.clone());
        }
        out
    }
}
