// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! The native surface the negotiator talks to.
//!
//! [`EventApi`] is the seam: the real platform behind it is the filtering
//! engine reached through the resolved entry points, tests substitute a
//! fake. Only the thin ffi adapter is Windows-gated, resolution and
//! negotiation logic run anywhere.

use std::sync::Arc;
use thiserror::Error;
use crate::events::RawEvent;
use super::load_table::{FuncEntry, LoadTable, NativeLoader, ResolveError};
use super::negotiate::ApiLevel;

/// Delivered events enter the session through this callback, invoked on
/// a thread the platform owns.
pub type EventCallback = Arc<dyn Fn(RawEvent) + Send + Sync>;

/// Opaque platform handle of a live subscription or enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeHandle(pub u64);

/// Bounded historical window for enumeration, in filetime units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("platform error {code:#010x}")]
pub struct PlatformError {
    pub code: u32,
}

impl PlatformError {
    /// Sentinel for "the entry point is not resolved", the original's
    /// function-error code.
    pub const FUNC_MISSING: Self = PlatformError { code: 0x8032_0001 };
    /// The build carries no native adapter for this platform.
    pub const NOT_SUPPORTED: Self = PlatformError { code: 0x8032_0002 };
    /// A worker could not be spawned for the timeout wrapper.
    pub const INTERNAL: Self = PlatformError { code: 0x8032_0003 };

    pub fn code(code: u32) -> Self {
        PlatformError { code }
    }
}

pub trait EventApi {
    fn has_subscribe(&self, level: ApiLevel) -> bool;
    fn subscribe(&self, level: ApiLevel, sink: EventCallback) -> Result<NativeHandle, PlatformError>;
    /// Graceful unregistration, safe to call with a stale handle.
    fn unsubscribe(&self, handle: NativeHandle) -> Result<(), PlatformError>;
    /// Forced teardown, releases the native handle without unregistering.
    fn release(&self, handle: NativeHandle);
    fn has_enumerate(&self, level: ApiLevel) -> bool;
    fn enumerate(&self, level: ApiLevel, window: TimeWindow) -> Result<Vec<RawEvent>, PlatformError>;
}

pub mod symbols {
    pub const ENGINE_OPEN: &str = "FwpmEngineOpen0";
    pub const ENGINE_CLOSE: &str = "FwpmEngineClose0";
    pub const ENGINE_SET_OPTION: &str = "FwpmEngineSetOption0";
    pub const FREE_MEMORY: &str = "FwpmFreeMemory0";
    pub const UNSUBSCRIBE: &str = "FwpmNetEventUnsubscribe0";
    pub const FILTER_GET_BY_ID: &str = "FwpmFilterGetById0";
    pub const LAYER_GET_BY_ID: &str = "FwpmLayerGetById0";
    pub const CREATE_ENUM_HANDLE: &str = "FwpmNetEventCreateEnumHandle0";
    pub const DESTROY_ENUM_HANDLE: &str = "FwpmNetEventDestroyEnumHandle0";
    pub const PRECISE_TIME: &str = "GetSystemTimePreciseAsFileTime";

    pub const SUBSCRIBE: [&str; 5] = [
        "FwpmNetEventSubscribe0",
        "FwpmNetEventSubscribe1",
        "FwpmNetEventSubscribe2",
        "FwpmNetEventSubscribe3",
        "FwpmNetEventSubscribe4",
    ];

    pub const ENUMERATE: [&str; 5] = [
        "FwpmNetEventEnum0",
        "FwpmNetEventEnum1",
        "FwpmNetEventEnum2",
        "FwpmNetEventEnum3",
        "FwpmNetEventEnum4",
    ];
}

const FWP_CLIENT: &str = "fwpuclnt.dll";
const KERNEL: &str = "kernel32.dll";

/// The fixed entry-point list. The per-level subscribe/enum exports are
/// optional, each platform version carries only a subset of them.
pub fn firewall_table() -> Vec<FuncEntry> {
    let mut entries = vec![
        FuncEntry::required(FWP_CLIENT, symbols::ENGINE_OPEN),
        FuncEntry::required(FWP_CLIENT, symbols::ENGINE_CLOSE),
        FuncEntry::required(FWP_CLIENT, symbols::ENGINE_SET_OPTION),
        FuncEntry::required(FWP_CLIENT, symbols::FREE_MEMORY),
        FuncEntry::required(FWP_CLIENT, symbols::UNSUBSCRIBE),
        FuncEntry::required(FWP_CLIENT, symbols::FILTER_GET_BY_ID),
        FuncEntry::required(FWP_CLIENT, symbols::LAYER_GET_BY_ID),
        FuncEntry::required(FWP_CLIENT, symbols::CREATE_ENUM_HANDLE),
        FuncEntry::required(FWP_CLIENT, symbols::DESTROY_ENUM_HANDLE),
    ];
    for &symbol in symbols::SUBSCRIBE.iter() {
        entries.push(FuncEntry::optional(FWP_CLIENT, symbol));
    }
    for &symbol in symbols::ENUMERATE.iter() {
        entries.push(FuncEntry::optional(FWP_CLIENT, symbol));
    }
    // Win8+, absent on older kernels
    entries.push(FuncEntry::optional(KERNEL, symbols::PRECISE_TIME));
    entries
}

/// All required entries, plus at least one subscribe and one enumerate.
pub const MIN_NEEDED: usize = 11;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("filtering engine open failed: {0}")]
    Engine(PlatformError),
}

/// The filtering-platform adapter. Construction resolves the entry-point
/// table and opens the engine session, both fatal on failure.
pub struct FwpPlatform {
    table: LoadTable<NativeLoader>,
    show_all: bool,
    engine: u64,
    #[cfg(windows)]
    contexts: std::sync::Mutex<std::collections::HashMap<u64, usize>>,
}

impl FwpPlatform {
    pub fn open(show_all: bool) -> Result<Self, OpenError> {
        let mut table = LoadTable::new(NativeLoader, firewall_table(), MIN_NEEDED);
        let resolved = table.ensure_loaded()?;
        tracing::debug!(resolved = resolved, total = table.len(), "entry points resolved");

        let mut platform = FwpPlatform {
            table,
            show_all,
            engine: 0,
            #[cfg(windows)]
            contexts: Default::default(),
        };
        platform.open_engine()?;
        Ok(platform)
    }

    pub fn table(&self) -> &LoadTable<NativeLoader> {
        &self.table
    }

    #[cfg(not(windows))]
    fn open_engine(&mut self) -> Result<(), OpenError> {
        let _ = (self.show_all, self.engine);
        Ok(())
    }

    #[cfg(not(windows))]
    fn close_engine(&mut self) {}
}

impl Drop for FwpPlatform {
    fn drop(&mut self) {
        self.close_engine();
        self.table.unresolve();
    }
}

impl EventApi for FwpPlatform {
    fn has_subscribe(&self, level: ApiLevel) -> bool {
        self.table.has(symbols::SUBSCRIBE[level.index()])
    }

    fn has_enumerate(&self, level: ApiLevel) -> bool {
        self.table.has(symbols::ENUMERATE[level.index()])
    }

    #[cfg(not(windows))]
    fn subscribe(
        &self,
        level: ApiLevel,
        _sink: EventCallback,
    ) -> Result<NativeHandle, PlatformError> {
        let _ = level;
        Err(PlatformError::NOT_SUPPORTED)
    }

    #[cfg(not(windows))]
    fn unsubscribe(&self, _handle: NativeHandle) -> Result<(), PlatformError> {
        Ok(())
    }

    #[cfg(not(windows))]
    fn release(&self, _handle: NativeHandle) {}

    #[cfg(not(windows))]
    fn enumerate(
        &self,
        level: ApiLevel,
        _window: TimeWindow,
    ) -> Result<Vec<RawEvent>, PlatformError> {
        let _ = level;
        Err(PlatformError::NOT_SUPPORTED)
    }

    #[cfg(windows)]
    fn subscribe(
        &self,
        level: ApiLevel,
        sink: EventCallback,
    ) -> Result<NativeHandle, PlatformError> {
        native::subscribe(self, level, sink)
    }

    #[cfg(windows)]
    fn unsubscribe(&self, handle: NativeHandle) -> Result<(), PlatformError> {
        native::unsubscribe(self, handle)
    }

    #[cfg(windows)]
    fn release(&self, handle: NativeHandle) {
        native::release(self, handle)
    }

    #[cfg(windows)]
    fn enumerate(
        &self,
        level: ApiLevel,
        window: TimeWindow,
    ) -> Result<Vec<RawEvent>, PlatformError> {
        native::enumerate(self, level, window)
    }
}

impl crate::lookup::NameResolver for FwpPlatform {
    #[cfg(windows)]
    fn account_for_sid(&self, sid: &[u8]) -> Option<(String, String)> {
        native::account_for_sid(sid)
    }

    #[cfg(not(windows))]
    fn account_for_sid(&self, _sid: &[u8]) -> Option<(String, String)> {
        None
    }

    #[cfg(windows)]
    fn filter_name(&self, id: u64) -> Option<String> {
        native::filter_name(self, id)
    }

    #[cfg(not(windows))]
    fn filter_name(&self, _id: u64) -> Option<String> {
        None
    }

    #[cfg(windows)]
    fn layer_name(&self, id: u16) -> Option<String> {
        native::layer_name(self, id)
    }

    #[cfg(not(windows))]
    fn layer_name(&self, _id: u16) -> Option<String> {
        None
    }

    // country lookup is an external collaborator, not wired by default
    fn country(&self, _addr: &std::net::IpAddr) -> Option<String> {
        None
    }

    fn location(&self, _addr: &std::net::IpAddr) -> Option<String> {
        None
    }

    fn service_name(&self, port: u16, protocol: u8) -> Option<String> {
        crate::lookup::well_known_service(port, protocol).map(|s| s.to_string())
    }
}

#[cfg(windows)]
impl FwpPlatform {
    fn open_engine(&mut self) -> Result<(), OpenError> {
        native::open_engine(self).map_err(OpenError::Engine)
    }

    fn close_engine(&mut self) {
        native::close_engine(self);
    }
}

#[cfg(windows)]
mod native {
    //! The ffi shims proper. Every call goes through a pointer resolved
    //! at run time, cast back to its typed signature here.

    use std::collections::HashMap;
    use std::mem;
    use std::os::raw::c_void;
    use std::ptr;
    use std::slice;
    use super::super::negotiate::ApiLevel;
    use super::{symbols, EventCallback, FwpPlatform, NativeHandle, PlatformError, TimeWindow};
    use crate::events::RawEvent;
    use crate::sys::{convert, mirror};

    const RPC_C_AUTHN_WINNT: u32 = 10;
    const ERROR_SUCCESS: u32 = 0;

    // FWPM_ENGINE_OPTION ordinals
    const OPTION_COLLECT_NET_EVENTS: i32 = 0;
    const OPTION_NET_EVENT_MATCH_ANY_KEYWORDS: i32 = 1;
    const OPTION_MONITOR_IPSEC_CONNECTIONS: i32 = 3;

    const FWP_UINT32: i32 = 3;

    const KEYWORD_INBOUND_MCAST: u32 = 0x0000_0001;
    const KEYWORD_INBOUND_BCAST: u32 = 0x0000_0002;
    const KEYWORD_CAPABILITY_DROP: u32 = 0x0000_0004;
    const KEYWORD_CAPABILITY_ALLOW: u32 = 0x0000_0008;
    const KEYWORD_CLASSIFY_ALLOW: u32 = 0x0000_0010;

    #[repr(C)]
    struct FwpValue {
        value_type: i32,
        value: u64,
    }

    #[repr(C)]
    struct DisplayData {
        name: *const u16,
        description: *const u16,
    }

    #[repr(C)]
    struct FwpmSession0 {
        session_key: [u8; 16],
        display_data: DisplayData,
        flags: u32,
        txn_wait_timeout_ms: u32,
        process_id: u32,
        sid: *const mirror::Sid,
        username: *const u16,
        kernel_mode: i32,
    }

    type FnEngineOpen0 = unsafe extern "system" fn(
        server_name: *const u16,
        authn_service: u32,
        auth_identity: *const c_void,
        session: *const FwpmSession0,
        engine_handle: *mut usize,
    ) -> u32;
    type FnEngineClose0 = unsafe extern "system" fn(engine: usize) -> u32;
    type FnEngineSetOption0 =
        unsafe extern "system" fn(engine: usize, option: i32, value: *const FwpValue) -> u32;
    type FnSubscribe = unsafe extern "system" fn(
        engine: usize,
        subscription: *const mirror::Subscription0,
        callback: *const c_void,
        context: *mut c_void,
        events_handle: *mut usize,
    ) -> u32;
    type FnUnsubscribe0 = unsafe extern "system" fn(engine: usize, events_handle: usize) -> u32;
    type FnCreateEnumHandle0 = unsafe extern "system" fn(
        engine: usize,
        template: *const mirror::EnumTemplate0,
        enum_handle: *mut usize,
    ) -> u32;
    type FnDestroyEnumHandle0 = unsafe extern "system" fn(engine: usize, enum_handle: usize) -> u32;
    type FnFreeMemory0 = unsafe extern "system" fn(p: *mut *mut c_void);

    struct CallbackCtx {
        sink: EventCallback,
    }

    unsafe fn deliver(context: *mut c_void, raw: RawEvent) {
        if context.is_null() {
            return;
        }
        let ctx = &*(context as *const CallbackCtx);
        (ctx.sink)(raw);
    }

    unsafe extern "system" fn callback_l0(context: *mut c_void, event: *const mirror::NetEvent1) {
        if let Some(event) = event.as_ref() {
            deliver(context, convert::event_v1(event));
        }
    }

    unsafe extern "system" fn callback_l1(context: *mut c_void, event: *const mirror::NetEvent2) {
        if let Some(event) = event.as_ref() {
            deliver(context, convert::event_v2(event));
        }
    }

    unsafe extern "system" fn callback_l2(context: *mut c_void, event: *const mirror::NetEvent3) {
        if let Some(event) = event.as_ref() {
            deliver(context, convert::event_v3(event));
        }
    }

    unsafe extern "system" fn callback_l3(context: *mut c_void, event: *const mirror::NetEvent4) {
        if let Some(event) = event.as_ref() {
            deliver(context, convert::event_v4(event));
        }
    }

    unsafe extern "system" fn callback_l4(context: *mut c_void, event: *const mirror::NetEvent5) {
        if let Some(event) = event.as_ref() {
            deliver(context, convert::event_v5(event));
        }
    }

    fn callback_for(level: ApiLevel) -> *const c_void {
        match level {
            ApiLevel::L0 => callback_l0 as *const c_void,
            ApiLevel::L1 => callback_l1 as *const c_void,
            ApiLevel::L2 => callback_l2 as *const c_void,
            ApiLevel::L3 => callback_l3 as *const c_void,
            ApiLevel::L4 => callback_l4 as *const c_void,
        }
    }

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(Some(0)).collect()
    }

    fn check(rc: u32) -> Result<(), PlatformError> {
        if rc == ERROR_SUCCESS {
            Ok(())
        } else {
            Err(PlatformError::code(rc))
        }
    }

    pub fn open_engine(platform: &mut FwpPlatform) -> Result<(), PlatformError> {
        let open = platform
            .table
            .get(symbols::ENGINE_OPEN)
            .ok_or(PlatformError::FUNC_MISSING)?;
        let set_option = platform
            .table
            .get(symbols::ENGINE_SET_OPTION)
            .ok_or(PlatformError::FUNC_MISSING)?;

        let name = wide("FirewallMonitoringSession");
        let description = wide("Non-dynamic session for wfp-monitor");
        let session = FwpmSession0 {
            session_key: [0; 16],
            display_data: DisplayData {
                name: name.as_ptr(),
                description: description.as_ptr(),
            },
            flags: 0,
            txn_wait_timeout_ms: 0,
            process_id: 0,
            sid: ptr::null(),
            username: ptr::null(),
            kernel_mode: 0,
        };

        unsafe {
            let open: FnEngineOpen0 = mem::transmute(open.addr());
            let mut engine = 0usize;
            check(open(
                ptr::null(),
                RPC_C_AUTHN_WINNT,
                ptr::null(),
                &session,
                &mut engine,
            ))?;
            platform.engine = engine as u64;

            let set_option: FnEngineSetOption0 = mem::transmute(set_option.addr());

            // enable collection of net events
            let value = FwpValue {
                value_type: FWP_UINT32,
                value: 1,
            };
            check(set_option(engine, OPTION_COLLECT_NET_EVENTS, &value))?;

            let mut keywords = KEYWORD_CAPABILITY_DROP | KEYWORD_CAPABILITY_ALLOW;
            if platform.show_all {
                keywords |= KEYWORD_CLASSIFY_ALLOW | KEYWORD_INBOUND_MCAST | KEYWORD_INBOUND_BCAST;
            }
            let value = FwpValue {
                value_type: FWP_UINT32,
                value: u64::from(keywords),
            };
            check(set_option(engine, OPTION_NET_EVENT_MATCH_ANY_KEYWORDS, &value))?;

            let value = FwpValue {
                value_type: FWP_UINT32,
                value: 1,
            };
            check(set_option(engine, OPTION_MONITOR_IPSEC_CONNECTIONS, &value))?;
        }
        Ok(())
    }

    pub fn close_engine(platform: &mut FwpPlatform) {
        if platform.engine == 0 {
            return;
        }
        if let Some(close) = platform.table.get(symbols::ENGINE_CLOSE) {
            unsafe {
                let close: FnEngineClose0 = mem::transmute(close.addr());
                let _ = close(platform.engine as usize);
            }
        }
        platform.engine = 0;
    }

    pub fn subscribe(
        platform: &FwpPlatform,
        level: ApiLevel,
        sink: EventCallback,
    ) -> Result<NativeHandle, PlatformError> {
        let sym = platform
            .table
            .get(symbols::SUBSCRIBE[level.index()])
            .ok_or(PlatformError::FUNC_MISSING)?;

        let subscription = mirror::Subscription0 {
            enum_template: ptr::null(),
            flags: 0,
            session_key: [0; 16],
        };
        let ctx = Box::into_raw(Box::new(CallbackCtx { sink })) as *mut c_void;

        unsafe {
            let func: FnSubscribe = mem::transmute(sym.addr());
            let mut handle = 0usize;
            let rc = func(
                platform.engine as usize,
                &subscription,
                callback_for(level),
                ctx,
                &mut handle,
            );
            if rc != ERROR_SUCCESS {
                drop(Box::from_raw(ctx as *mut CallbackCtx));
                return Err(PlatformError::code(rc));
            }
            platform
                .contexts
                .lock()
                .unwrap()
                .insert(handle as u64, ctx as usize);
            Ok(NativeHandle(handle as u64))
        }
    }

    fn forget_context(platform: &FwpPlatform, handle: NativeHandle) {
        let ctx = platform.contexts.lock().unwrap().remove(&handle.0);
        if let Some(ctx) = ctx {
            unsafe {
                drop(Box::from_raw(ctx as *mut CallbackCtx));
            }
        }
    }

    pub fn unsubscribe(platform: &FwpPlatform, handle: NativeHandle) -> Result<(), PlatformError> {
        let sym = platform
            .table
            .get(symbols::UNSUBSCRIBE)
            .ok_or(PlatformError::FUNC_MISSING)?;
        let rc = unsafe {
            let func: FnUnsubscribe0 = mem::transmute(sym.addr());
            func(platform.engine as usize, handle.0 as usize)
        };
        forget_context(platform, handle);
        check(rc)
    }

    pub fn release(platform: &FwpPlatform, handle: NativeHandle) {
        // forced teardown, drop our bookkeeping and leave the handle
        // to the engine teardown
        forget_context(platform, handle);
    }

    unsafe fn enum_records<T>(
        addr: usize,
        engine: usize,
        enum_handle: usize,
        convert_one: unsafe fn(&T) -> RawEvent,
        free: FnFreeMemory0,
    ) -> Result<Vec<RawEvent>, PlatformError> {
        type FnEnum<T> = unsafe extern "system" fn(
            engine: usize,
            enum_handle: usize,
            num_entries_requested: u32,
            entries: *mut *mut *const T,
            num_entries_returned: *mut u32,
        ) -> u32;

        let func: FnEnum<T> = mem::transmute(addr);
        let mut entries: *mut *const T = ptr::null_mut();
        let mut count = 0u32;
        check(func(engine, enum_handle, u32::MAX, &mut entries, &mut count))?;

        let mut out = Vec::with_capacity(count as usize);
        if !entries.is_null() {
            for &entry in slice::from_raw_parts(entries, count as usize) {
                if let Some(entry) = entry.as_ref() {
                    out.push(convert_one(entry));
                }
            }
            let mut p = entries as *mut c_void;
            free(&mut p);
        }
        Ok(out)
    }

    pub fn enumerate(
        platform: &FwpPlatform,
        level: ApiLevel,
        window: TimeWindow,
    ) -> Result<Vec<RawEvent>, PlatformError> {
        let sym = platform
            .table
            .get(symbols::ENUMERATE[level.index()])
            .ok_or(PlatformError::FUNC_MISSING)?;
        let create = platform
            .table
            .get(symbols::CREATE_ENUM_HANDLE)
            .ok_or(PlatformError::FUNC_MISSING)?;
        let destroy = platform
            .table
            .get(symbols::DESTROY_ENUM_HANDLE)
            .ok_or(PlatformError::FUNC_MISSING)?;
        let free = platform
            .table
            .get(symbols::FREE_MEMORY)
            .ok_or(PlatformError::FUNC_MISSING)?;

        let template = mirror::EnumTemplate0 {
            start_time: mirror::Filetime {
                low: window.start as u32,
                high: (window.start >> 32) as u32,
            },
            end_time: mirror::Filetime {
                low: window.end as u32,
                high: (window.end >> 32) as u32,
            },
            num_filter_conditions: 0,
            filter_condition: ptr::null(),
        };

        let engine = platform.engine as usize;
        unsafe {
            let create: FnCreateEnumHandle0 = mem::transmute(create.addr());
            let destroy: FnDestroyEnumHandle0 = mem::transmute(destroy.addr());
            let free: FnFreeMemory0 = mem::transmute(free.addr());

            let mut enum_handle = 0usize;
            check(create(engine, &template, &mut enum_handle))?;

            let result = match level {
                ApiLevel::L0 => enum_records::<mirror::NetEvent0>(
                    sym.addr(), engine, enum_handle, convert::event_v0, free,
                ),
                ApiLevel::L1 => enum_records::<mirror::NetEvent1>(
                    sym.addr(), engine, enum_handle, convert::event_v1, free,
                ),
                ApiLevel::L2 => enum_records::<mirror::NetEvent2>(
                    sym.addr(), engine, enum_handle, convert::event_v2, free,
                ),
                ApiLevel::L3 => enum_records::<mirror::NetEvent3>(
                    sym.addr(), engine, enum_handle, convert::event_v3, free,
                ),
                ApiLevel::L4 => enum_records::<mirror::NetEvent4>(
                    sym.addr(), engine, enum_handle, convert::event_v4, free,
                ),
            };

            let _ = destroy(engine, enum_handle);
            result
        }
    }

    pub fn account_for_sid(sid: &[u8]) -> Option<(String, String)> {
        use windows_sys::Win32::Security::LookupAccountSidW;

        let mut account = [0u16; 256];
        let mut domain = [0u16; 256];
        let mut account_len = account.len() as u32;
        let mut domain_len = domain.len() as u32;
        let mut sid_use = 0i32;

        let rc = unsafe {
            LookupAccountSidW(
                ptr::null(),
                sid.as_ptr() as *mut c_void,
                account.as_mut_ptr(),
                &mut account_len,
                domain.as_mut_ptr(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if rc == 0 {
            return None;
        }
        let account = String::from_utf16_lossy(&account[..account_len as usize]);
        let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
        Some((domain, account))
    }

    unsafe fn read_display_name(name: *const u16) -> Option<String> {
        if name.is_null() {
            return None;
        }
        let mut len = 0;
        while *name.add(len) != 0 {
            len += 1;
        }
        Some(String::from_utf16_lossy(slice::from_raw_parts(name, len)))
    }

    pub fn filter_name(platform: &FwpPlatform, id: u64) -> Option<String> {
        use windows_sys::Win32::NetworkManagement::WindowsFilteringPlatform::FWPM_FILTER0;

        type FnFilterGetById0 = unsafe extern "system" fn(
            engine: usize,
            id: u64,
            filter: *mut *mut FWPM_FILTER0,
        ) -> u32;

        let sym = platform.table.get(symbols::FILTER_GET_BY_ID)?;
        let free = platform.table.get(symbols::FREE_MEMORY)?;
        unsafe {
            let func: FnFilterGetById0 = mem::transmute(sym.addr());
            let free: FnFreeMemory0 = mem::transmute(free.addr());
            let mut filter: *mut FWPM_FILTER0 = ptr::null_mut();
            if func(platform.engine as usize, id, &mut filter) != ERROR_SUCCESS {
                return None;
            }
            let name = read_display_name((*filter).displayData.name);
            let mut p = filter as *mut c_void;
            free(&mut p);
            name
        }
    }

    pub fn layer_name(platform: &FwpPlatform, id: u16) -> Option<String> {
        use windows_sys::Win32::NetworkManagement::WindowsFilteringPlatform::FWPM_LAYER0;

        type FnLayerGetById0 = unsafe extern "system" fn(
            engine: usize,
            id: u16,
            layer: *mut *mut FWPM_LAYER0,
        ) -> u32;

        let sym = platform.table.get(symbols::LAYER_GET_BY_ID)?;
        let free = platform.table.get(symbols::FREE_MEMORY)?;
        unsafe {
            let func: FnLayerGetById0 = mem::transmute(sym.addr());
            let free: FnFreeMemory0 = mem::transmute(free.addr());
            let mut layer: *mut FWPM_LAYER0 = ptr::null_mut();
            if func(platform.engine as usize, id, &mut layer) != ERROR_SUCCESS {
                return None;
            }
            let name = read_display_name((*layer).displayData.name);
            let mut p = layer as *mut c_void;
            free(&mut p);
            name
        }
    }
}
