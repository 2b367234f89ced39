// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Per-session decode, classification, filtering and formatting.
//!
//! One [`Session`] owns everything an event callback touches: the line
//! buffer, both lookup caches and the accept/ignore counters. The caller
//! wraps it in a single mutex and runs the whole cycle per raw record
//! under it, the platform delivers callbacks on threads it owns and the
//! buffer is mutated across several helper calls that must appear atomic.

use std::collections::HashSet;
use std::net::IpAddr;
use chrono::TimeZone;
use serde::Deserialize;
use crate::events::{
    protocol_name, Direction, IpVersion, LogicalEvent, RawEvent, IPPROTO_TCP, IPPROTO_UDP,
};
use crate::lookup::{FilterCache, NameResolver, SidCache, UNRESOLVED};
use crate::output::{LineBuf, TraceSink};

/// Capacity of the per-event line buffer.
pub const BUF_CAPACITY: usize = 2000;

const INDENT: usize = 9;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_DIFF_US: i64 = 11_644_473_600_000_000;

pub fn filetime_to_unix_micros(filetime: u64) -> i64 {
    (filetime / 10) as i64 - FILETIME_UNIX_DIFF_US
}

pub fn now_filetime() -> u64 {
    let micros = chrono::Utc::now().timestamp_micros() + FILETIME_UNIX_DIFF_US;
    (micros as u64) * 10
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    None,
    Absolute,
    Relative,
    Delta,
}

impl Default for TimeFormat {
    fn default() -> Self {
        TimeFormat::Absolute
    }
}

/// Renders event timestamps. Relative and delta formats may legally go
/// negative, the filtering layers timestamp events themselves and do not
/// deliver them in order.
pub struct TimeStamper {
    format: TimeFormat,
    ref_us: i64,
    last_us: Option<i64>,
}

impl TimeStamper {
    pub fn new(format: TimeFormat) -> Self {
        TimeStamper {
            format,
            ref_us: filetime_to_unix_micros(now_filetime()),
            last_us: None,
        }
    }

    /// Re-arm the reference timestamp, called at session start.
    pub fn reset(&mut self) {
        self.ref_us = filetime_to_unix_micros(now_filetime());
        self.last_us = None;
    }

    pub fn render(&mut self, filetime: u64) -> String {
        let us = filetime_to_unix_micros(filetime);
        match self.format {
            TimeFormat::None => String::new(),
            TimeFormat::Absolute => {
                match chrono::Utc.timestamp_micros(us) {
                    chrono::LocalResult::Single(dt) => format!("{}: ", dt.format("%H:%M:%S%.6f")),
                    _ => "?: ".to_string(),
                }
            },
            TimeFormat::Relative => {
                self.last_us = Some(us);
                Self::render_diff(us - self.ref_us)
            },
            TimeFormat::Delta => {
                let diff = match self.last_us {
                    Some(last) => us - last,
                    None => 0,
                };
                self.last_us = Some(us);
                Self::render_diff(diff)
            },
        }
    }

    fn render_diff(diff_us: i64) -> String {
        let sign = if diff_us < 0 { "-" } else { "" };
        let diff = diff_us.abs();
        format!("{}{}.{:03} sec: ", sign, diff / 1_000_000, (diff / 1000) % 1000)
    }
}

/// The per-session filter policy, derived from the configuration once.
#[derive(Clone, Debug)]
pub struct Policy {
    pub show_all: bool,
    pub show_ipv4: bool,
    pub show_ipv6: bool,
    pub own_user_only: bool,
    pub exclude_addresses: Vec<String>,
    pub exclude_programs: Vec<String>,
    pub logged_on_user: String,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            show_all: false,
            show_ipv4: true,
            show_ipv6: true,
            own_user_only: false,
            exclude_addresses: Vec::new(),
            exclude_programs: Vec::new(),
            logged_on_user: String::new(),
        }
    }
}

impl Policy {
    fn address_excluded(&self, addr: &str) -> bool {
        self.exclude_addresses.iter().any(|a| a == addr)
    }

    fn program_excluded(&self, full: &str, base: &str) -> bool {
        self.exclude_programs
            .iter()
            .any(|p| p.eq_ignore_ascii_case(full) || p.eq_ignore_ascii_case(base))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub accepted: u64,
    pub ignored: u64,
}

/// Why a record did not reach the sink, for the diagnostic log.
enum Skip {
    UnhandledTag(u32),
    IpVersionDisabled,
    AddressExcluded(String),
    ProgramExcluded(String),
    ForeignUser,
    NothingInteresting,
}

enum Rendered {
    Emit,
    Skip(Skip),
}

/// Presence of one interesting field after filtering.
#[derive(Clone, Copy, PartialEq)]
enum Presence {
    Absent,
    Printed,
}

pub struct Session<R, S> {
    policy: Policy,
    resolver: R,
    sink: S,
    buf: LineBuf,
    time: TimeStamper,
    sids: SidCache,
    filters: FilterCache,
    counters: Counters,
    countries_v4: HashSet<String>,
    countries_v6: HashSet<String>,
}

impl<R, S> Session<R, S>
where
    R: NameResolver,
    S: TraceSink,
{
    pub fn new(policy: Policy, format: TimeFormat, width: usize, resolver: R, sink: S) -> Self {
        Session {
            policy,
            resolver,
            sink,
            buf: LineBuf::new(BUF_CAPACITY, width),
            time: TimeStamper::new(format),
            sids: SidCache::new(),
            filters: FilterCache::new(),
            counters: Counters::default(),
            countries_v4: HashSet::new(),
            countries_v6: HashSet::new(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Called at session start, the counters and the time reference
    /// belong to one monitoring run.
    pub fn reset(&mut self) {
        self.counters = Counters::default();
        self.time.reset();
        self.buf.reset();
    }

    /// The whole decode-classify-filter-format cycle for one raw record.
    /// Exactly one of the two counters is incremented per call.
    pub fn handle_raw(&mut self, raw: &RawEvent) {
        self.buf.reset();
        let outcome = match LogicalEvent::decode(raw) {
            Some(event) => {
                let outcome = self.render(&event);
                if event.unhandled_flags != 0 {
                    tracing::debug!(
                        flags = crate::events::raw::flags::decode(event.unhandled_flags).as_str(),
                        "unhandled header flags",
                    );
                }
                outcome
            },
            None => Rendered::Skip(Skip::UnhandledTag(raw.tag())),
        };
        match outcome {
            Rendered::Emit => {
                self.buf.flush(&mut self.sink);
                self.counters.accepted += 1;
            },
            Rendered::Skip(reason) => {
                // filtered events still reset the buffer, nothing is flushed
                self.buf.reset();
                self.counters.ignored += 1;
                match reason {
                    Skip::UnhandledTag(tag) => {
                        tracing::debug!(
                            tag = crate::events::raw::tag::name(tag),
                            level = raw.level(),
                            "ignoring event",
                        );
                    },
                    Skip::IpVersionDisabled => tracing::debug!("ignoring disabled ip version"),
                    Skip::AddressExcluded(addr) => {
                        tracing::debug!(addr = addr.as_str(), "ignoring excluded address")
                    },
                    Skip::ProgramExcluded(name) => {
                        tracing::debug!(program = name.as_str(), "ignoring excluded program")
                    },
                    Skip::ForeignUser => tracing::debug!("ignoring foreign user"),
                    Skip::NothingInteresting => (),
                }
            },
        }
    }

    fn render(&mut self, event: &LogicalEvent) -> Rendered {
        // (a) ip-version enablement
        match event.ip_version {
            Some(IpVersion::V4) if !self.policy.show_ipv4 => {
                return Rendered::Skip(Skip::IpVersionDisabled)
            },
            Some(IpVersion::V6) if !self.policy.show_ipv6 => {
                return Rendered::Skip(Skip::IpVersionDisabled)
            },
            _ => (),
        }

        self.render_heading(event);
        self.render_layer_and_filter(event);

        // (b) address exclusion
        let addresses = match self.render_addresses(event) {
            Ok(presence) => presence,
            Err(addr) => return Rendered::Skip(Skip::AddressExcluded(addr)),
        };
        // (c) program exclusion
        let program = match self.render_app(event) {
            Ok(presence) => presence,
            Err(name) => return Rendered::Skip(Skip::ProgramExcluded(name)),
        };
        // (d) restrict to the logged-on user
        let user = match self.render_user(event) {
            Ok(presence) => presence,
            Err(()) => return Rendered::Skip(Skip::ForeignUser),
        };
        let package = self.render_package(event);

        self.render_effective_name(event);
        self.render_reauth(event);

        let interesting = [addresses, program, user, package];
        if interesting.iter().any(|p| *p == Presence::Printed) {
            Rendered::Emit
        } else {
            Rendered::Skip(Skip::NothingInteresting)
        }
    }

    fn render_heading(&mut self, event: &LogicalEvent) {
        let time = self.time.render(event.timestamp);
        self.buf.add(format_args!("{}{}", time, event.kind.name()));
        if event.kind.is_classify() {
            self.buf
                .add(format_args!(", {}", event.direction.name()));
        }
        match event.protocol {
            Some(proto) => {
                self.buf.add(format_args!(", {}\n", protocol_name(proto)));
            },
            None => {
                self.buf.add_char('\n');
            },
        }
    }

    fn render_layer_and_filter(&mut self, event: &LogicalEvent) {
        if event.kind.is_classify() {
            if let Some(layer_id) = event.layer_id {
                if layer_id != 0 {
                    if let Some(name) = self.resolver.layer_name(layer_id) {
                        self.buf.add(format_args!(
                            "{:indent$}layer:   ({}) {}\n",
                            "",
                            layer_id,
                            name,
                            indent = INDENT,
                        ));
                    }
                }
            }
            if let Some(filter_id) = event.filter_id {
                if filter_id != 0 {
                    let entry = self.filters.lookup_or_add(filter_id, &self.resolver);
                    self.buf.add(format_args!(
                        "{:indent$}filter:  ({}) {}\n",
                        "",
                        entry.id,
                        entry.name,
                        indent = INDENT,
                    ));
                }
            }
        } else {
            // capability events always carry a filter reference, the
            // reserved zero resolves to the static sentinel
            let entry = self
                .filters
                .lookup_or_add(event.filter_id.unwrap_or(0), &self.resolver);
            let capability = capability_name(event.capability_id);
            self.buf.add(format_args!(
                "{:indent$}layer2:  ({}) {}, {}, isLoopback: {}\n",
                "",
                entry.id,
                entry.name,
                capability,
                event.is_loopback as u8,
                indent = INDENT,
            ));
        }
    }

    /// Renders the address line. `Err` carries the excluded address.
    fn render_addresses(&mut self, event: &LogicalEvent) -> Result<Presence, String> {
        let (local, remote) = match (event.local_addr, event.remote_addr) {
            (None, None) => return Ok(Presence::Absent),
            pair => pair,
        };

        let local_str = local.map(|a| a.to_string());
        let remote_str = remote.map(|a| a.to_string());

        for addr in local_str.iter().chain(remote_str.iter()) {
            if self.policy.address_excluded(addr) {
                return Err(addr.clone());
            }
        }

        let local_text = local_str.as_deref().unwrap_or("-");
        let remote_text = remote_str.as_deref().unwrap_or("-");
        let scope = match (event.ip_version, event.scope_id) {
            (Some(IpVersion::V6), Some(id)) => format!("%{}", id),
            _ => String::new(),
        };
        let ports = self.render_ports(event);

        self.buf.add(format_args!("{:indent$}", "", indent = INDENT));
        match event.direction {
            Direction::Out => {
                self.buf.add(format_args!(
                    "addr:    {}{} -> {}{}\n",
                    local_text, scope, remote_text, ports,
                ));
            },
            _ => {
                self.buf.add(format_args!(
                    "addr:    {} -> {}{}{}\n",
                    remote_text, local_text, scope, ports,
                ));
            },
        }

        if let Some(remote) = remote {
            self.render_country(&remote, event.ip_version);
        }
        Ok(Presence::Printed)
    }

    fn render_ports(&mut self, event: &LogicalEvent) -> String {
        let proto = match event.protocol {
            Some(p) if p == IPPROTO_TCP || p == IPPROTO_UDP => p,
            _ => return String::new(),
        };
        let name = |port: Option<u16>| match port {
            None => "-".to_string(),
            Some(port) => match self.resolver.service_name(port, proto) {
                Some(service) => format!("{} ({})", port, service),
                None => port.to_string(),
            },
        };
        format!(
            ", ports: {} / {}",
            name(event.local_port),
            name(event.remote_port),
        )
    }

    fn render_country(&mut self, remote: &IpAddr, version: Option<IpVersion>) {
        let country = match self.resolver.country(remote) {
            Some(country) => country,
            None => return,
        };
        match version {
            Some(IpVersion::V4) => {
                self.countries_v4.insert(country.clone());
            },
            Some(IpVersion::V6) => {
                self.countries_v6.insert(country.clone());
            },
            None => (),
        }
        match self.resolver.location(remote) {
            Some(location) => {
                self.buf.add(format_args!(
                    "{:indent$}country: {}, {}\n",
                    "",
                    country,
                    location,
                    indent = INDENT,
                ));
            },
            None => {
                self.buf.add(format_args!(
                    "{:indent$}country: {}\n",
                    "",
                    country,
                    indent = INDENT,
                ));
            },
        }
    }

    /// Renders the application identity. `Err` carries the excluded name.
    fn render_app(&mut self, event: &LogicalEvent) -> Result<Presence, String> {
        let app = match &event.app_id {
            Some(app) => volume_to_path(app),
            None => return Ok(Presence::Absent),
        };
        let base = basename(&app);

        if self.policy.program_excluded(&app, base) {
            return Err(app.clone());
        }

        if INDENT + "app:     ".len() + app.len() >= self.buf.width() {
            self.buf
                .add(format_args!("{:indent$}app:     ", "", indent = INDENT));
            self.buf.wrap_long_line(&app, INDENT, '\\');
        } else {
            self.buf.add(format_args!(
                "{:indent$}app:     {}\n",
                "",
                app,
                indent = INDENT,
            ));
        }
        Ok(Presence::Printed)
    }

    /// Renders the user identity. `Err(())` when the own-user filter
    /// rejects the event.
    fn render_user(&mut self, event: &LogicalEvent) -> Result<Presence, ()> {
        let sid = match &event.user_id {
            Some(sid) => sid,
            None => return Ok(Presence::Absent),
        };
        let entry = self.sids.lookup_or_add(sid, &self.resolver);

        if self.policy.own_user_only
            && !entry
                .account
                .eq_ignore_ascii_case(&self.policy.logged_on_user)
        {
            return Err(());
        }

        let domain = if entry.domain.is_empty() {
            UNRESOLVED
        } else {
            &entry.domain
        };
        let account = if entry.account.is_empty() {
            UNRESOLVED
        } else {
            &entry.account
        };
        let line = format!(
            "{:indent$}user:    {}\\{}\n",
            "",
            domain,
            account,
            indent = INDENT,
        );
        self.buf.add_str(&line);
        Ok(Presence::Printed)
    }

    fn render_package(&mut self, event: &LogicalEvent) -> Presence {
        const NULL_SID: &str = "S-1-0-0";

        let sid = match &event.package_id {
            Some(sid) => sid,
            None => return Presence::Absent,
        };
        let entry = self.sids.lookup_or_add(sid, &self.resolver);
        // the null package is noise unless everything was asked for
        if entry.sid_str == NULL_SID && !self.policy.show_all {
            return Presence::Absent;
        }
        let line = format!(
            "{:indent$}package: {}\n",
            "",
            entry.sid_str,
            indent = INDENT,
        );
        self.buf.add_str(&line);
        Presence::Printed
    }

    fn render_effective_name(&mut self, event: &LogicalEvent) {
        if let Some(name) = &event.effective_name {
            self.buf.add(format_args!(
                "{:indent$}eff:     {}\n",
                "",
                name,
                indent = INDENT,
            ));
        }
    }

    fn render_reauth(&mut self, event: &LogicalEvent) {
        if !event.kind.is_classify() {
            return;
        }
        if let Some(reason) = event.reauth_reason {
            self.buf.add(format_args!(
                "{:indent$}reauth:  {}\n",
                "",
                reason,
                indent = INDENT,
            ));
        }
    }

    /// End-of-session statistics, surfaced through the trace sink.
    pub fn print_statistics(&mut self) {
        if self.counters.accepted == 0 && self.counters.ignored == 0 {
            return;
        }
        self.buf.reset();
        self.buf.add(format_args!(
            "Got {} events, {} ignored.\n",
            self.counters.accepted, self.counters.ignored,
        ));
        if self.policy.show_ipv4 && !self.countries_v4.is_empty() {
            self.buf.add(format_args!(
                "Unique IPv4 countries: {:3}.\n",
                self.countries_v4.len(),
            ));
        }
        if self.policy.show_ipv6 && !self.countries_v6.is_empty() {
            self.buf.add(format_args!(
                "Unique IPv6 countries: {:3}.\n",
                self.countries_v6.len(),
            ));
        }
        self.buf.flush(&mut self.sink);
    }
}

fn capability_name(id: Option<i32>) -> &'static str {
    match id {
        Some(0) => "FWPM_APPC_NETWORK_CAPABILITY_INTERNET_CLIENT",
        Some(1) => "FWPM_APPC_NETWORK_CAPABILITY_INTERNET_CLIENT_SERVER",
        Some(2) => "FWPM_APPC_NETWORK_CAPABILITY_INTERNET_PRIVATE_NETWORK",
        _ => "?",
    }
}

/// Map a `\Device\HarddiskVolumeN\` prefix to a drive-letter path.
pub fn volume_to_path(path: &str) -> String {
    const VOLUME: &str = "\\Device\\HarddiskVolume";

    if path.len() > VOLUME.len() && path[..VOLUME.len()].eq_ignore_ascii_case(VOLUME) {
        let rest = &path[VOLUME.len()..];
        let mut chars = rest.chars();
        if let (Some(digit), Some('\\')) = (chars.next(), chars.clone().next()) {
            if let Some(d) = digit.to_digit(10) {
                let letter = (b'a' + d as u8) as char;
                return format!("{}:{}", letter, chars.as_str());
            }
        }
    }
    path.to_string()
}

pub fn basename(path: &str) -> &str {
    path.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(path)
}
