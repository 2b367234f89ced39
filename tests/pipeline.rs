// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};
use std::time::Duration;
use wfp_monitor::events::raw::{
    direction, flags, ClassifyDrop2, EventV3, HeaderOld, HeaderV3, KindRich, RawEvent,
    IP_VERSION_V4,
};
use wfp_monitor::events::IPPROTO_UDP;
use wfp_monitor::system::negotiate::{ApiLevel, NegotiateError, RequestedLevel};
use wfp_monitor::system::platform::{
    EventApi, EventCallback, NativeHandle, PlatformError, TimeWindow,
};
use wfp_monitor::system::{Monitor, StartError};
use wfp_monitor::{NullResolver, Policy, Session, TimeFormat, TraceSink};

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<String>>>);

impl TraceSink for SharedSink {
    fn puts(&mut self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

impl SharedSink {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct FakeApi {
    subscribe_levels: Vec<u8>,
    enumerate_levels: Vec<u8>,
    recorded: Vec<RawEvent>,
    fail_subscribe_with: Option<u32>,
    sink: Mutex<Option<EventCallback>>,
    unsubscribed: Mutex<Vec<NativeHandle>>,
}

impl FakeApi {
    fn new(subscribe_levels: &[u8]) -> Self {
        FakeApi {
            subscribe_levels: subscribe_levels.to_vec(),
            enumerate_levels: Vec::new(),
            recorded: Vec::new(),
            fail_subscribe_with: None,
            sink: Mutex::new(None),
            unsubscribed: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the platform pushing one event from its own thread.
    fn push(&self, raw: RawEvent) {
        let sink = self.sink.lock().unwrap();
        let sink = sink.as_ref().expect("no live subscription");
        sink(raw);
    }
}

impl EventApi for FakeApi {
    fn has_subscribe(&self, level: ApiLevel) -> bool {
        self.subscribe_levels.contains(&level.as_u8())
    }

    fn subscribe(&self, level: ApiLevel, sink: EventCallback) -> Result<NativeHandle, PlatformError> {
        if let Some(code) = self.fail_subscribe_with {
            return Err(PlatformError::code(code));
        }
        assert!(self.has_subscribe(level));
        *self.sink.lock().unwrap() = Some(sink);
        Ok(NativeHandle(0x40 + u64::from(level.as_u8())))
    }

    fn unsubscribe(&self, handle: NativeHandle) -> Result<(), PlatformError> {
        self.unsubscribed.lock().unwrap().push(handle);
        *self.sink.lock().unwrap() = None;
        Ok(())
    }

    fn release(&self, _handle: NativeHandle) {
        *self.sink.lock().unwrap() = None;
    }

    fn has_enumerate(&self, level: ApiLevel) -> bool {
        self.enumerate_levels.contains(&level.as_u8())
    }

    fn enumerate(&self, level: ApiLevel, _window: TimeWindow) -> Result<Vec<RawEvent>, PlatformError> {
        assert!(self.has_enumerate(level));
        Ok(self.recorded.clone())
    }
}

fn drop_event(remote_last_octet: u8) -> RawEvent {
    let bits = flags::IP_VERSION_SET
        | flags::LOCAL_ADDR_SET
        | flags::REMOTE_ADDR_SET
        | flags::LOCAL_PORT_SET
        | flags::REMOTE_PORT_SET
        | flags::IP_PROTOCOL_SET;
    RawEvent::V3(EventV3 {
        header: HeaderV3 {
            base: HeaderOld {
                timestamp: 0,
                flags: bits,
                ip_version: IP_VERSION_V4,
                ip_protocol: IPPROTO_UDP,
                local_addr: [192, 168, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                remote_addr: [8, 8, 8, remote_last_octet, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                local_port: 53124,
                remote_port: 53,
                scope_id: 0,
                app_id: String::new(),
                user_id: Vec::new(),
            },
            ..Default::default()
        },
        kind: KindRich::ClassifyDrop(ClassifyDrop2 {
            filter_id: 3,
            layer_id: 13,
            direction: direction::MS_OUT,
            ..Default::default()
        }),
    })
}

fn monitor(
    api: Arc<FakeApi>,
    requested: RequestedLevel,
) -> (Monitor<FakeApi, NullResolver, SharedSink>, SharedSink) {
    let sink = SharedSink::default();
    let session = Session::new(
        Policy::default(),
        TimeFormat::None,
        100,
        NullResolver,
        sink.clone(),
    );
    let monitor = Monitor::new(api, session, requested, Duration::from_secs(5));
    (monitor, sink)
}

#[test]
fn subscribe_deliver_stop() {
    let api = Arc::new(FakeApi::new(&[0, 1, 2, 3, 4]));
    let (mut monitor, sink) = monitor(api.clone(), RequestedLevel::Default);

    // default level with everything present registers at 3
    let level = monitor.start().unwrap();
    assert_eq!(level, ApiLevel::L3);
    assert_eq!(monitor.level(), Some(ApiLevel::L3));

    api.push(drop_event(8));
    api.push(drop_event(9));

    {
        let session = monitor.session();
        let session = session.lock().unwrap();
        assert_eq!(session.counters().accepted, 2);
        assert_eq!(session.counters().ignored, 0);
    }
    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("CLASSIFY_DROP, OUT, IPPROTO_UDP"));
    // outbound renders local first, ports annotated from the service table
    assert!(lines[0].contains("addr:    192.168.0.2 -> 8.8.8.8, ports: 53124 / 53 (domain)"));

    monitor.stop();
    assert_eq!(api.unsubscribed.lock().unwrap().len(), 1);
    // stopping again is a no-op
    monitor.stop();
    monitor.stop_forced();
    assert_eq!(api.unsubscribed.lock().unwrap().len(), 1);
}

#[test]
fn events_from_platform_threads_do_not_interleave() {
    let api = Arc::new(FakeApi::new(&[3]));
    let (mut monitor, sink) = monitor(api.clone(), RequestedLevel::Default);
    monitor.start().unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let api = api.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                api.push(drop_event((t * 25 + i) as u8));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let session = monitor.session();
    let session = session.lock().unwrap();
    assert_eq!(session.counters().accepted, 100);
    let lines = sink.lines();
    assert_eq!(lines.len(), 100);
    // every flushed buffer is one complete event, never a torn interleaving
    for line in &lines {
        assert!(line.starts_with("CLASSIFY_DROP"), "torn output: {:?}", line);
        assert!(line.contains("addr:    192.168.0.2 -> 8.8.8."), "torn output: {:?}", line);
    }
}

#[test]
fn default_negotiation_steps_down_to_the_best_present_level() {
    let api = Arc::new(FakeApi::new(&[0, 1]));
    let (mut monitor, _sink) = monitor(api, RequestedLevel::Default);
    assert_eq!(monitor.start().unwrap(), ApiLevel::L1);
}

#[test]
fn pinned_level_never_steps_down() {
    let api = Arc::new(FakeApi::new(&[0, 1, 2, 3]));
    let (mut monitor, _sink) = monitor(api, RequestedLevel::Pinned(ApiLevel::L4));
    match monitor.start() {
        Err(StartError::Negotiate(NegotiateError::NotAvailable { level, .. })) => {
            assert_eq!(level, ApiLevel::L4);
        },
        other => panic!("expected not-available, got {:?}", other.map(|l| l.as_u8())),
    }
    assert_eq!(monitor.level(), None);
}

#[test]
fn failing_registration_is_reported_with_the_native_error() {
    let mut api = FakeApi::new(&[0, 1, 2, 3, 4]);
    api.fail_subscribe_with = Some(5);
    let (mut monitor, _sink) = monitor(Arc::new(api), RequestedLevel::Default);
    match monitor.start() {
        Err(StartError::Negotiate(NegotiateError::Registration { level, error, .. })) => {
            assert_eq!(level, ApiLevel::L3);
            assert_eq!(error.code, 5);
        },
        other => panic!("expected registration failure, got {:?}", other.map(|l| l.as_u8())),
    }
}

#[test]
fn dump_runs_the_recorded_window_through_the_pipeline() {
    let mut api = FakeApi::new(&[]);
    api.enumerate_levels = vec![0, 1, 2];
    api.recorded = vec![drop_event(1), drop_event(2)];
    let (mut monitor, sink) = monitor(Arc::new(api), RequestedLevel::Default);

    // enumeration negotiates independently of the subscription surface
    let (level, count) = monitor.dump_recorded().unwrap();
    assert_eq!(level, ApiLevel::L2);
    assert_eq!(count, 2);

    let session = monitor.session();
    let mut session = session.lock().unwrap();
    assert_eq!(session.counters().accepted, 2);
    session.print_statistics();
    drop(session);

    let lines = sink.lines();
    assert!(lines.last().unwrap().contains("Got 2 events, 0 ignored."));
}
