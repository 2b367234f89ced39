// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Owned mirrors of the five incompatible net-event record shapes.
//!
//! The platform reports events through one of five wire shapes, selected by
//! the api level the subscription was registered with. Levels 0 and 1 carry
//! the old header and only the classify-drop sub-record, levels 2-4 carry
//! the rich header and all four sub-records. Everything here is an owned
//! copy, the ffi boundary never leaks past `sys`.

/// Present-field bits of the header flags bitmap. A header field carries
/// defined data only when its bit is set.
pub mod flags {
    pub const IP_PROTOCOL_SET: u32 = 0x0000_0001;
    pub const LOCAL_ADDR_SET: u32 = 0x0000_0002;
    pub const REMOTE_ADDR_SET: u32 = 0x0000_0004;
    pub const LOCAL_PORT_SET: u32 = 0x0000_0008;
    pub const REMOTE_PORT_SET: u32 = 0x0000_0010;
    pub const APP_ID_SET: u32 = 0x0000_0020;
    pub const USER_ID_SET: u32 = 0x0000_0040;
    pub const SCOPE_ID_SET: u32 = 0x0000_0080;
    pub const IP_VERSION_SET: u32 = 0x0000_0100;
    pub const REAUTH_REASON_SET: u32 = 0x0000_0200;
    pub const PACKAGE_ID_SET: u32 = 0x0000_0400;
    pub const ENTERPRISE_ID_SET: u32 = 0x0000_0800;
    pub const POLICY_FLAGS_SET: u32 = 0x0000_1000;
    pub const EFFECTIVE_NAME_SET: u32 = 0x0000_2000;

    const NAMES: &[(u32, &str)] = &[
        (IP_PROTOCOL_SET, "IP_PROTOCOL_SET"),
        (LOCAL_ADDR_SET, "LOCAL_ADDR_SET"),
        (REMOTE_ADDR_SET, "REMOTE_ADDR_SET"),
        (LOCAL_PORT_SET, "LOCAL_PORT_SET"),
        (REMOTE_PORT_SET, "REMOTE_PORT_SET"),
        (APP_ID_SET, "APP_ID_SET"),
        (USER_ID_SET, "USER_ID_SET"),
        (SCOPE_ID_SET, "SCOPE_ID_SET"),
        (IP_VERSION_SET, "IP_VERSION_SET"),
        (REAUTH_REASON_SET, "REAUTH_REASON_SET"),
        (PACKAGE_ID_SET, "PACKAGE_ID_SET"),
        (ENTERPRISE_ID_SET, "ENTERPRISE_ID_SET"),
        (POLICY_FLAGS_SET, "POLICY_FLAGS_SET"),
        (EFFECTIVE_NAME_SET, "EFFECTIVE_NAME_SET"),
    ];

    /// Symbolic rendering of a flags bitmap, for diagnostics.
    pub fn decode(bits: u32) -> String {
        let mut s = String::new();
        for &(bit, name) in NAMES {
            if bits & bit != 0 {
                if !s.is_empty() {
                    s.push('|');
                }
                s.push_str(name);
            }
        }
        if s.is_empty() {
            s.push('0');
        }
        s
    }
}

pub const IP_VERSION_V4: u32 = 0;
pub const IP_VERSION_V6: u32 = 1;

/// Direction values observed on the wire. The platform uses both the
/// 0x390x constants and the plain enum, depending on version.
pub mod direction {
    pub const MS_IN: u32 = 0x3900;
    pub const MS_OUT: u32 = 0x3901;
    pub const INBOUND: u32 = 1;
    pub const OUTBOUND: u32 = 2;
}

/// Raw record type tags.
pub mod tag {
    pub const IKEEXT_MM_FAILURE: u32 = 0;
    pub const IKEEXT_QM_FAILURE: u32 = 1;
    pub const IKEEXT_EM_FAILURE: u32 = 2;
    pub const CLASSIFY_DROP: u32 = 3;
    pub const IPSEC_KERNEL_DROP: u32 = 4;
    pub const IPSEC_DOSP_DROP: u32 = 5;
    pub const CLASSIFY_ALLOW: u32 = 6;
    pub const CAPABILITY_DROP: u32 = 7;
    pub const CAPABILITY_ALLOW: u32 = 8;
    pub const CLASSIFY_DROP_MAC: u32 = 9;
    pub const LPM_PACKET_ARRIVAL: u32 = 10;

    pub fn name(tag: u32) -> &'static str {
        match tag {
            IKEEXT_MM_FAILURE => "IKEEXT_MM_FAILURE",
            IKEEXT_QM_FAILURE => "IKEEXT_QM_FAILURE",
            IKEEXT_EM_FAILURE => "IKEEXT_EM_FAILURE",
            CLASSIFY_DROP => "CLASSIFY_DROP",
            IPSEC_KERNEL_DROP => "IPSEC_KERNEL_DROP",
            IPSEC_DOSP_DROP => "IPSEC_DOSP_DROP",
            CLASSIFY_ALLOW => "CLASSIFY_ALLOW",
            CAPABILITY_DROP => "CAPABILITY_DROP",
            CAPABILITY_ALLOW => "CAPABILITY_ALLOW",
            CLASSIFY_DROP_MAC => "CLASSIFY_DROP_MAC",
            LPM_PACKET_ARRIVAL => "LPM_PACKET_ARRIVAL",
            _ => "UNKNOWN",
        }
    }
}

/// Header shared by levels 0 and 1.
///
/// `local_addr`/`remote_addr` hold a v4 address in the leading four bytes
/// (network order) or a full v6 address, selected by `ip_version`. The
/// timestamp is in platform filetime units (100 ns since 1601).
#[derive(Clone, Debug, Default)]
pub struct HeaderOld {
    pub timestamp: u64,
    pub flags: u32,
    pub ip_version: u32,
    pub ip_protocol: u8,
    pub local_addr: [u8; 16],
    pub remote_addr: [u8; 16],
    pub local_port: u16,
    pub remote_port: u16,
    pub scope_id: u32,
    pub app_id: String,
    pub user_id: Vec<u8>,
}

/// Header of level 2: old header plus address family and package identity.
#[derive(Clone, Debug, Default)]
pub struct HeaderV2 {
    pub base: HeaderOld,
    pub address_family: u32,
    pub package_sid: Vec<u8>,
}

/// Header of levels 3 and 4.
#[derive(Clone, Debug, Default)]
pub struct HeaderV3 {
    pub base: HeaderOld,
    pub address_family: u32,
    pub package_sid: Vec<u8>,
    pub enterprise_id: String,
    pub policy_flags: u64,
    pub effective_name: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyDrop0 {
    pub filter_id: u64,
    pub layer_id: u16,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyDrop1 {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub direction: u32,
    pub is_loopback: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyDrop2 {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub direction: u32,
    pub is_loopback: bool,
    pub vswitch_source_port: u32,
    pub vswitch_destination_port: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyAllow {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub direction: u32,
    pub is_loopback: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Capability {
    pub capability_id: i32,
    pub filter_id: u64,
    pub is_loopback: bool,
}

#[derive(Clone, Debug)]
pub enum KindV0 {
    ClassifyDrop(ClassifyDrop0),
    Other(u32),
}

#[derive(Clone, Debug)]
pub enum KindV1 {
    ClassifyDrop(ClassifyDrop1),
    Other(u32),
}

#[derive(Clone, Debug)]
pub enum KindRich {
    ClassifyDrop(ClassifyDrop2),
    ClassifyAllow(ClassifyAllow),
    CapabilityDrop(Capability),
    CapabilityAllow(Capability),
    Other(u32),
}

#[derive(Clone, Debug)]
pub struct EventV0 {
    pub header: HeaderOld,
    pub kind: KindV0,
}

#[derive(Clone, Debug)]
pub struct EventV1 {
    pub header: HeaderOld,
    pub kind: KindV1,
}

#[derive(Clone, Debug)]
pub struct EventV2 {
    pub header: HeaderV2,
    pub kind: KindRich,
}

#[derive(Clone, Debug)]
pub struct EventV3 {
    pub header: HeaderV3,
    pub kind: KindRich,
}

#[derive(Clone, Debug)]
pub struct EventV4 {
    pub header: HeaderV3,
    pub kind: KindRich,
}

/// One raw event of whichever shape the negotiated level produced.
#[derive(Clone, Debug)]
pub enum RawEvent {
    V0(EventV0),
    V1(EventV1),
    V2(EventV2),
    V3(EventV3),
    V4(EventV4),
}

impl RawEvent {
    pub fn level(&self) -> u8 {
        match self {
            RawEvent::V0(_) => 0,
            RawEvent::V1(_) => 1,
            RawEvent::V2(_) => 2,
            RawEvent::V3(_) => 3,
            RawEvent::V4(_) => 4,
        }
    }

    /// The raw type tag, for diagnostics of ignored records.
    pub fn tag(&self) -> u32 {
        match self {
            RawEvent::V0(ev) => match &ev.kind {
                KindV0::ClassifyDrop(_) => tag::CLASSIFY_DROP,
                KindV0::Other(t) => *t,
            },
            RawEvent::V1(ev) => match &ev.kind {
                KindV1::ClassifyDrop(_) => tag::CLASSIFY_DROP,
                KindV1::Other(t) => *t,
            },
            RawEvent::V2(ev) => ev.kind.tag(),
            RawEvent::V3(ev) => ev.kind.tag(),
            RawEvent::V4(ev) => ev.kind.tag(),
        }
    }
}

impl KindRich {
    pub fn tag(&self) -> u32 {
        match self {
            KindRich::ClassifyDrop(_) => tag::CLASSIFY_DROP,
            KindRich::ClassifyAllow(_) => tag::CLASSIFY_ALLOW,
            KindRich::CapabilityDrop(_) => tag::CAPABILITY_DROP,
            KindRich::CapabilityAllow(_) => tag::CAPABILITY_ALLOW,
            KindRich::Other(t) => *t,
        }
    }
}
