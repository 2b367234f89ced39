// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Copies raw platform records into the owned [`RawEvent`] shapes.
//!
//! Every read of an optional field is gated on its presence bit, the
//! platform leaves unset fields undefined. Pointers are only dereferenced
//! while the callback that delivered them is still on the stack.

use std::slice;
use crate::events::raw::{
    flags, tag, Capability, ClassifyAllow, ClassifyDrop0, ClassifyDrop1, ClassifyDrop2, EventV0,
    EventV1, EventV2, EventV3, EventV4, HeaderOld, HeaderV2, HeaderV3, KindRich, KindV0, KindV1,
    RawEvent,
};
use super::mirror::{
    ByteBlob, NetEvent0, NetEvent1, NetEvent2, NetEvent3, NetEvent4, NetEvent5, NetEventHeader0,
    NetEventHeader2, NetEventHeader3, Sid,
};

unsafe fn blob_utf16(blob: &ByteBlob) -> String {
    if blob.data.is_null() || blob.size == 0 {
        return String::new();
    }
    let chars = slice::from_raw_parts(blob.data as *const u16, (blob.size / 2) as usize);
    // drop a trailing terminator if the platform included one
    let chars = match chars.split_last() {
        Some((&0, rest)) => rest,
        _ => chars,
    };
    String::from_utf16_lossy(chars)
}

unsafe fn wide_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(slice::from_raw_parts(ptr, len))
}

unsafe fn copy_sid(ptr: *const Sid) -> Vec<u8> {
    if ptr.is_null() {
        return Vec::new();
    }
    let head = slice::from_raw_parts(ptr as *const u8, 2);
    let count = head[1] as usize;
    if head[0] != 1 || count > 15 {
        return Vec::new();
    }
    slice::from_raw_parts(ptr as *const u8, 8 + 4 * count).to_vec()
}

unsafe fn header_old(h: &NetEventHeader0) -> HeaderOld {
    let f = h.flags;
    let mut local_addr = [0; 16];
    let mut remote_addr = [0; 16];
    if f & flags::IP_VERSION_SET != 0 {
        if h.ip_version == 0 {
            if f & flags::LOCAL_ADDR_SET != 0 {
                local_addr[..4].copy_from_slice(&h.local_addr.v4.to_be_bytes());
            }
            if f & flags::REMOTE_ADDR_SET != 0 {
                remote_addr[..4].copy_from_slice(&h.remote_addr.v4.to_be_bytes());
            }
        } else {
            if f & flags::LOCAL_ADDR_SET != 0 {
                local_addr = h.local_addr.v6;
            }
            if f & flags::REMOTE_ADDR_SET != 0 {
                remote_addr = h.remote_addr.v6;
            }
        }
    }
    HeaderOld {
        timestamp: h.time_stamp.as_u64(),
        flags: f,
        ip_version: h.ip_version as u32,
        ip_protocol: h.ip_protocol,
        local_addr,
        remote_addr,
        local_port: if f & flags::LOCAL_PORT_SET != 0 {
            h.local_port
        } else {
            0
        },
        remote_port: if f & flags::REMOTE_PORT_SET != 0 {
            h.remote_port
        } else {
            0
        },
        scope_id: if f & flags::SCOPE_ID_SET != 0 {
            h.scope_id
        } else {
            0
        },
        app_id: if f & flags::APP_ID_SET != 0 {
            blob_utf16(&h.app_id)
        } else {
            String::new()
        },
        user_id: if f & flags::USER_ID_SET != 0 {
            copy_sid(h.user_id)
        } else {
            Vec::new()
        },
    }
}

unsafe fn header_v2(h: &NetEventHeader2) -> HeaderV2 {
    // the leading fields of header2 are layout-identical to header0
    let base = header_old(&*(h as *const NetEventHeader2 as *const NetEventHeader0));
    HeaderV2 {
        address_family: h.address_family as u32,
        package_sid: if h.flags & flags::PACKAGE_ID_SET != 0 {
            copy_sid(h.package_sid)
        } else {
            Vec::new()
        },
        base,
    }
}

unsafe fn header_v3(h: &NetEventHeader3) -> HeaderV3 {
    let base = header_old(&*(h as *const NetEventHeader3 as *const NetEventHeader0));
    let f = h.flags;
    HeaderV3 {
        address_family: h.address_family as u32,
        package_sid: if f & flags::PACKAGE_ID_SET != 0 {
            copy_sid(h.package_sid)
        } else {
            Vec::new()
        },
        enterprise_id: if f & flags::ENTERPRISE_ID_SET != 0 {
            wide_string(h.enterprise_id)
        } else {
            String::new()
        },
        policy_flags: if f & flags::POLICY_FLAGS_SET != 0 {
            h.policy_flags
        } else {
            0
        },
        effective_name: if f & flags::EFFECTIVE_NAME_SET != 0 {
            blob_utf16(&h.effective_name)
        } else {
            String::new()
        },
        base,
    }
}

fn drop2(d: &super::mirror::ClassifyDrop2) -> ClassifyDrop2 {
    ClassifyDrop2 {
        filter_id: d.filter_id,
        layer_id: d.layer_id,
        reauth_reason: d.reauth_reason,
        original_profile: d.original_profile,
        current_profile: d.current_profile,
        direction: d.ms_fwp_direction,
        is_loopback: d.is_loopback != 0,
        vswitch_source_port: d.vswitch_source_port,
        vswitch_destination_port: d.vswitch_destination_port,
    }
}

fn allow0(a: &super::mirror::ClassifyAllow0) -> ClassifyAllow {
    ClassifyAllow {
        filter_id: a.filter_id,
        layer_id: a.layer_id,
        reauth_reason: a.reauth_reason,
        original_profile: a.original_profile,
        current_profile: a.current_profile,
        direction: a.ms_fwp_direction,
        is_loopback: a.is_loopback != 0,
    }
}

unsafe fn kind_rich(event_type: i32, u: &super::mirror::EventUnionRich) -> KindRich {
    match event_type as u32 {
        tag::CLASSIFY_DROP if !u.classify_drop.is_null() => KindRich::ClassifyDrop(drop2(&*u.classify_drop)),
        tag::CLASSIFY_ALLOW if !u.classify_allow.is_null() => {
            KindRich::ClassifyAllow(allow0(&*u.classify_allow))
        },
        tag::CAPABILITY_DROP if !u.capability_drop.is_null() => {
            let c = &*u.capability_drop;
            KindRich::CapabilityDrop(Capability {
                capability_id: c.network_capability_id,
                filter_id: c.filter_id,
                is_loopback: c.is_loopback != 0,
            })
        },
        tag::CAPABILITY_ALLOW if !u.capability_allow.is_null() => {
            let c = &*u.capability_allow;
            KindRich::CapabilityAllow(Capability {
                capability_id: c.network_capability_id,
                filter_id: c.filter_id,
                is_loopback: c.is_loopback != 0,
            })
        },
        t => KindRich::Other(t),
    }
}

pub unsafe fn event_v0(ev: &NetEvent0) -> RawEvent {
    let kind = match ev.event_type as u32 {
        tag::CLASSIFY_DROP if !ev.u.classify_drop.is_null() => {
            let d = &*ev.u.classify_drop;
            KindV0::ClassifyDrop(ClassifyDrop0 {
                filter_id: d.filter_id,
                layer_id: d.layer_id,
            })
        },
        t => KindV0::Other(t),
    };
    RawEvent::V0(EventV0 {
        header: header_old(&ev.header),
        kind,
    })
}

pub unsafe fn event_v1(ev: &NetEvent1) -> RawEvent {
    let kind = match ev.event_type as u32 {
        tag::CLASSIFY_DROP if !ev.u.classify_drop.is_null() => {
            let d = &*ev.u.classify_drop;
            KindV1::ClassifyDrop(ClassifyDrop1 {
                filter_id: d.filter_id,
                layer_id: d.layer_id,
                reauth_reason: d.reauth_reason,
                original_profile: d.original_profile,
                current_profile: d.current_profile,
                direction: d.ms_fwp_direction,
                is_loopback: d.is_loopback != 0,
            })
        },
        t => KindV1::Other(t),
    };
    // header1 only appends reserved space after the header0 fields
    let header = header_old(&*(&ev.header as *const _ as *const NetEventHeader0));
    RawEvent::V1(EventV1 { header, kind })
}

pub unsafe fn event_v2(ev: &NetEvent2) -> RawEvent {
    RawEvent::V2(EventV2 {
        header: header_v2(&ev.header),
        kind: kind_rich(ev.event_type, &ev.u),
    })
}

pub unsafe fn event_v3(ev: &NetEvent3) -> RawEvent {
    RawEvent::V3(EventV3 {
        header: header_v3(&ev.header),
        kind: kind_rich(ev.event_type, &ev.u),
    })
}

pub unsafe fn event_v4(ev: &NetEvent4) -> RawEvent {
    RawEvent::V4(EventV4 {
        header: header_v3(&ev.header),
        kind: kind_rich(ev.event_type, &ev.u),
    })
}

pub unsafe fn event_v5(ev: &NetEvent5) -> RawEvent {
    RawEvent::V4(EventV4 {
        header: header_v3(&ev.header),
        kind: kind_rich(ev.event_type, &ev.u),
    })
}
