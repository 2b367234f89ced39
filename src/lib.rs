// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

pub mod sys;
pub mod events;
pub mod system;

mod lookup;
pub use self::lookup::{
    sid_string, well_known_service, FilterCache, FilterEntry, NameResolver, NullResolver,
    SidCache, SidEntry, UNRESOLVED,
};

mod output;
pub use self::output::{LineBuf, StdoutSink, TraceSink};

mod session;
pub use self::session::{
    basename, filetime_to_unix_micros, now_filetime, volume_to_path, Counters, Policy, Session,
    TimeFormat, TimeStamper,
};

mod configuration;
pub use self::configuration::{CliArgs, Config};
