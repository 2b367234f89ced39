// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Local `repr(C)` mirrors of the net-event wire structures.
//!
//! Older SDK headers do not declare all of these shapes, so the monitor
//! carries its own declarations and the platform writes through pointers
//! typed as them. `system::compat` cross-checks every mirror against the
//! SDK declaration at session start, a mismatch there means these
//! definitions drifted and must not be used.

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Filetime {
    pub low: u32,
    pub high: u32,
}

impl Filetime {
    pub fn as_u64(&self) -> u64 {
        (u64::from(self.high) << 32) | u64::from(self.low)
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ByteBlob {
    pub size: u32,
    pub data: *const u8,
}

/// Only ever addressed through a pointer the platform owns.
#[repr(C)]
pub struct Sid {
    _opaque: [u8; 0],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union AddrUnion {
    pub v4: u32,
    pub v6: [u8; 16],
}

#[repr(C)]
pub struct NetEventHeader0 {
    pub time_stamp: Filetime,
    pub flags: u32,
    pub ip_version: i32,
    pub ip_protocol: u8,
    pub local_addr: AddrUnion,
    pub remote_addr: AddrUnion,
    pub local_port: u16,
    pub remote_port: u16,
    pub scope_id: u32,
    pub app_id: ByteBlob,
    pub user_id: *const Sid,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Header1ReservedInner {
    pub reserved2: [u8; 6],
    pub reserved3: [u8; 6],
    pub reserved4: u32,
    pub reserved5: u32,
    pub reserved6: u16,
    pub reserved7: u32,
    pub reserved8: u32,
    pub reserved9: u16,
    pub reserved10: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union Header1ReservedUnion {
    pub inner: Header1ReservedInner,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Header1Reserved {
    pub reserved1: i32,
    pub u: Header1ReservedUnion,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union Header1Tail {
    pub s: Header1Reserved,
}

#[repr(C)]
pub struct NetEventHeader1 {
    pub time_stamp: Filetime,
    pub flags: u32,
    pub ip_version: i32,
    pub ip_protocol: u8,
    pub local_addr: AddrUnion,
    pub remote_addr: AddrUnion,
    pub local_port: u16,
    pub remote_port: u16,
    pub scope_id: u32,
    pub app_id: ByteBlob,
    pub user_id: *const Sid,
    pub reserved: Header1Tail,
}

#[repr(C)]
pub struct NetEventHeader2 {
    pub time_stamp: Filetime,
    pub flags: u32,
    pub ip_version: i32,
    pub ip_protocol: u8,
    pub local_addr: AddrUnion,
    pub remote_addr: AddrUnion,
    pub local_port: u16,
    pub remote_port: u16,
    pub scope_id: u32,
    pub app_id: ByteBlob,
    pub user_id: *const Sid,
    pub address_family: i32,
    pub package_sid: *const Sid,
}

#[repr(C)]
pub struct NetEventHeader3 {
    pub time_stamp: Filetime,
    pub flags: u32,
    pub ip_version: i32,
    pub ip_protocol: u8,
    pub local_addr: AddrUnion,
    pub remote_addr: AddrUnion,
    pub local_port: u16,
    pub remote_port: u16,
    pub scope_id: u32,
    pub app_id: ByteBlob,
    pub user_id: *const Sid,
    pub address_family: i32,
    pub package_sid: *const Sid,
    pub enterprise_id: *const u16,
    pub policy_flags: u64,
    pub effective_name: ByteBlob,
}

#[repr(C)]
pub struct ClassifyDrop0 {
    pub filter_id: u64,
    pub layer_id: u16,
}

#[repr(C)]
pub struct ClassifyDrop1 {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub ms_fwp_direction: u32,
    pub is_loopback: i32,
}

#[repr(C)]
pub struct ClassifyDrop2 {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub ms_fwp_direction: u32,
    pub is_loopback: i32,
    pub vswitch_id: ByteBlob,
    pub vswitch_source_port: u32,
    pub vswitch_destination_port: u32,
}

#[repr(C)]
pub struct ClassifyAllow0 {
    pub filter_id: u64,
    pub layer_id: u16,
    pub reauth_reason: u32,
    pub original_profile: u32,
    pub current_profile: u32,
    pub ms_fwp_direction: u32,
    pub is_loopback: i32,
}

#[repr(C)]
pub struct CapabilityDrop0 {
    pub network_capability_id: i32,
    pub filter_id: u64,
    pub is_loopback: i32,
}

#[repr(C)]
pub struct CapabilityAllow0 {
    pub network_capability_id: i32,
    pub filter_id: u64,
    pub is_loopback: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union EventUnion0 {
    pub classify_drop: *const ClassifyDrop0,
}

#[repr(C)]
pub struct NetEvent0 {
    pub header: NetEventHeader0,
    pub event_type: i32,
    pub u: EventUnion0,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union EventUnion1 {
    pub classify_drop: *const ClassifyDrop1,
}

#[repr(C)]
pub struct NetEvent1 {
    pub header: NetEventHeader1,
    pub event_type: i32,
    pub u: EventUnion1,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union EventUnionRich {
    pub classify_drop: *const ClassifyDrop2,
    pub classify_allow: *const ClassifyAllow0,
    pub capability_drop: *const CapabilityDrop0,
    pub capability_allow: *const CapabilityAllow0,
}

#[repr(C)]
pub struct NetEvent2 {
    pub header: NetEventHeader2,
    pub event_type: i32,
    pub u: EventUnionRich,
}

#[repr(C)]
pub struct NetEvent3 {
    pub header: NetEventHeader3,
    pub event_type: i32,
    pub u: EventUnionRich,
}

#[repr(C)]
pub struct NetEvent4 {
    pub header: NetEventHeader3,
    pub event_type: i32,
    pub u: EventUnionRich,
}

#[repr(C)]
pub struct NetEvent5 {
    pub header: NetEventHeader3,
    pub event_type: i32,
    pub u: EventUnionRich,
}

#[repr(C)]
pub struct FilterCondition0 {
    pub field_key: [u8; 16],
    pub match_type: i32,
    // FWP_CONDITION_VALUE0: a type discriminant plus a value union
    pub condition_value: ConditionValue0,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union ConditionValueUnion {
    pub uint64: *const u64,
    pub byte_blob: *const ByteBlob,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConditionValue0 {
    pub value_type: i32,
    pub u: ConditionValueUnion,
}

#[repr(C)]
pub struct EnumTemplate0 {
    pub start_time: Filetime,
    pub end_time: Filetime,
    pub num_filter_conditions: u32,
    pub filter_condition: *const FilterCondition0,
}

#[repr(C)]
pub struct Subscription0 {
    pub enum_template: *const EnumTemplate0,
    pub flags: u32,
    pub session_key: [u8; 16],
}
