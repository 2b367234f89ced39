// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Startup cross-check of the local wire mirrors against the SDK layout.
//!
//! The platform writes events through pointers typed as the `sys::mirror`
//! declarations. If those drift from the SDK's own layout the callback
//! would read garbage or corrupt memory, so any mismatch of a size or a
//! canary field offset refuses to start the monitor. Runs once per
//! session start, not per event.

use std::mem::{offset_of, size_of};
use thiserror::Error;
use crate::sys::mirror;

#[derive(Debug, Error)]
pub enum CompatError {
    #[error("size mismatch of '{name}': {local} versus {sdk} bytes")]
    Size {
        name: &'static str,
        local: usize,
        sdk: usize,
    },
    #[error("offset mismatch of '{name}.{field}': {local} versus {sdk} bytes")]
    Offset {
        name: &'static str,
        field: &'static str,
        local: usize,
        sdk: usize,
    },
    #[error("header ordering violated: {0}")]
    Ordering(&'static str),
}

pub struct FieldCheck {
    pub field: &'static str,
    pub local: usize,
    pub sdk: usize,
}

pub struct StructCheck {
    pub name: &'static str,
    pub local_size: usize,
    pub sdk_size: usize,
    pub fields: Vec<FieldCheck>,
}

/// Compare one set of declarations, first mismatch wins.
pub fn verify_checks(checks: &[StructCheck]) -> Result<(), CompatError> {
    for check in checks {
        if check.local_size != check.sdk_size {
            return Err(CompatError::Size {
                name: check.name,
                local: check.local_size,
                sdk: check.sdk_size,
            });
        }
        for field in &check.fields {
            if field.local != field.sdk {
                return Err(CompatError::Offset {
                    name: check.name,
                    field: field.field,
                    local: field.local,
                    sdk: field.sdk,
                });
            }
        }
    }
    Ok(())
}

macro_rules! struct_check {
    ($name:expr, $local:ty, $sdk:ty) => {
        StructCheck {
            name: $name,
            local_size: size_of::<$local>(),
            sdk_size: size_of::<$sdk>(),
            fields: Vec::new(),
        }
    };
    ($name:expr, $local:ty, $sdk:ty, $([$field:expr, $local_field:ident, $sdk_field:ident]),+) => {
        StructCheck {
            name: $name,
            local_size: size_of::<$local>(),
            sdk_size: size_of::<$sdk>(),
            fields: vec![
                $(FieldCheck {
                    field: $field,
                    local: offset_of!($local, $local_field),
                    sdk: offset_of!($sdk, $sdk_field),
                }),+
            ],
        }
    };
}

/// The built-in check table, SDK side from `windows-sys` on Windows and
/// from the recorded `sys::sdk` layout everywhere else.
pub fn platform_checks() -> Vec<StructCheck> {
    #[cfg(windows)]
    use windows_sys::Win32::NetworkManagement::WindowsFilteringPlatform as sdk;
    #[cfg(not(windows))]
    use crate::sys::sdk;

    vec![
        struct_check!(
            "FWPM_NET_EVENT_HEADER0",
            mirror::NetEventHeader0,
            sdk::FWPM_NET_EVENT_HEADER0,
            ["appId", app_id, appId]
        ),
        struct_check!(
            "FWPM_NET_EVENT_HEADER1",
            mirror::NetEventHeader1,
            sdk::FWPM_NET_EVENT_HEADER1,
            ["appId", app_id, appId]
        ),
        struct_check!(
            "FWPM_NET_EVENT_HEADER2",
            mirror::NetEventHeader2,
            sdk::FWPM_NET_EVENT_HEADER2,
            ["appId", app_id, appId]
        ),
        struct_check!(
            "FWPM_NET_EVENT_HEADER3",
            mirror::NetEventHeader3,
            sdk::FWPM_NET_EVENT_HEADER3
        ),
        struct_check!(
            "FWPM_NET_EVENT_CLASSIFY_DROP1",
            mirror::ClassifyDrop1,
            sdk::FWPM_NET_EVENT_CLASSIFY_DROP1,
            ["msFwpDirection", ms_fwp_direction, msFwpDirection]
        ),
        struct_check!(
            "FWPM_NET_EVENT_CLASSIFY_DROP2",
            mirror::ClassifyDrop2,
            sdk::FWPM_NET_EVENT_CLASSIFY_DROP2,
            ["msFwpDirection", ms_fwp_direction, msFwpDirection]
        ),
        struct_check!(
            "FWPM_NET_EVENT_CLASSIFY_ALLOW0",
            mirror::ClassifyAllow0,
            sdk::FWPM_NET_EVENT_CLASSIFY_ALLOW0
        ),
        struct_check!("FWPM_NET_EVENT0", mirror::NetEvent0, sdk::FWPM_NET_EVENT0),
        struct_check!("FWPM_NET_EVENT1", mirror::NetEvent1, sdk::FWPM_NET_EVENT1),
        struct_check!("FWPM_NET_EVENT2", mirror::NetEvent2, sdk::FWPM_NET_EVENT2),
        struct_check!("FWPM_NET_EVENT3", mirror::NetEvent3, sdk::FWPM_NET_EVENT3),
        struct_check!("FWPM_NET_EVENT4", mirror::NetEvent4, sdk::FWPM_NET_EVENT4),
        struct_check!("FWPM_NET_EVENT5", mirror::NetEvent5, sdk::FWPM_NET_EVENT5),
    ]
}

/// Relative sanity of the header family. Header1 really is the largest,
/// it carries a big reserved union the later revisions dropped.
fn ordering() -> Result<(), CompatError> {
    if size_of::<mirror::NetEventHeader3>() <= size_of::<mirror::NetEventHeader0>() {
        return Err(CompatError::Ordering("header3 must be larger than header0"));
    }
    if size_of::<mirror::NetEventHeader3>() >= size_of::<mirror::NetEventHeader1>() {
        return Err(CompatError::Ordering("header3 must be smaller than header1"));
    }
    if size_of::<mirror::NetEventHeader3>() <= size_of::<mirror::NetEventHeader2>() {
        return Err(CompatError::Ordering("header3 must be larger than header2"));
    }
    Ok(())
}

/// The whole verification pass. Any failure is fatal to session start.
pub fn verify() -> Result<(), CompatError> {
    verify_checks(&platform_checks())?;
    ordering()
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};
    use super::{verify, verify_checks, CompatError, FieldCheck, StructCheck};

    #[repr(C)]
    struct Local {
        a: u32,
        b: u32,
    }

    #[repr(C)]
    struct SameLayout {
        a: u32,
        b: u32,
    }

    #[repr(C)]
    struct ShiftedLayout {
        a: u32,
        pad: u32,
        b: u32,
    }

    #[test]
    fn matching_declarations_pass() {
        let checks = vec![StructCheck {
            name: "Local",
            local_size: size_of::<Local>(),
            sdk_size: size_of::<SameLayout>(),
            fields: vec![FieldCheck {
                field: "b",
                local: offset_of!(Local, b),
                sdk: offset_of!(SameLayout, b),
            }],
        }];
        assert!(verify_checks(&checks).is_ok());
    }

    #[test]
    fn mismatched_offset_fails() {
        let checks = vec![StructCheck {
            name: "Local",
            local_size: size_of::<ShiftedLayout>(),
            sdk_size: size_of::<ShiftedLayout>(),
            fields: vec![FieldCheck {
                field: "b",
                local: offset_of!(Local, b),
                sdk: offset_of!(ShiftedLayout, b),
            }],
        }];
        match verify_checks(&checks) {
            Err(CompatError::Offset { field: "b", .. }) => (),
            other => panic!("expected offset mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn mismatched_size_fails() {
        let checks = vec![StructCheck {
            name: "Local",
            local_size: size_of::<Local>(),
            sdk_size: size_of::<ShiftedLayout>(),
            fields: Vec::new(),
        }];
        match verify_checks(&checks) {
            Err(CompatError::Size { local, sdk, .. }) => {
                assert_eq!(local, 8);
                assert_eq!(sdk, 12);
            },
            other => panic!("expected size mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn built_in_mirrors_verify() {
        verify().unwrap();
    }
}
