// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Negotiation of the notification-interface api level.
//!
//! The subscription contract went through five incompatible revisions and
//! any given platform version exports only some of them. Negotiation
//! starts at the requested level and walks downward through *absent*
//! entry points, a present-but-failing registration is a real error and
//! never silently degraded. The same walk serves the live subscription
//! and the one-shot enumeration of recorded events, a platform may
//! support one and not the other at a given level.

use std::fmt;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use crate::events::RawEvent;
use super::platform::{EventApi, EventCallback, NativeHandle, PlatformError, TimeWindow};

pub const LEVEL_LOW: u8 = 0;
pub const LEVEL_HIGH: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub enum ApiLevel {
    L0,
    L1,
    L2,
    L3,
    L4,
}

impl ApiLevel {
    pub const DEFAULT: ApiLevel = ApiLevel::L3;

    pub fn new(level: u8) -> Result<Self, NegotiateError> {
        match level {
            0 => Ok(ApiLevel::L0),
            1 => Ok(ApiLevel::L1),
            2 => Ok(ApiLevel::L2),
            3 => Ok(ApiLevel::L3),
            4 => Ok(ApiLevel::L4),
            other => Err(NegotiateError::InvalidLevel(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ApiLevel::L0 => 0,
            ApiLevel::L1 => 1,
            ApiLevel::L2 => 2,
            ApiLevel::L3 => 3,
            ApiLevel::L4 => 4,
        }
    }

    pub fn index(self) -> usize {
        self.as_u8() as usize
    }

    fn step_down(self) -> Option<ApiLevel> {
        match self {
            ApiLevel::L0 => None,
            ApiLevel::L1 => Some(ApiLevel::L0),
            ApiLevel::L2 => Some(ApiLevel::L1),
            ApiLevel::L3 => Some(ApiLevel::L2),
            ApiLevel::L4 => Some(ApiLevel::L3),
        }
    }
}

impl fmt::Display for ApiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// How the caller chose the starting level. Only the implicit default may
/// step down through absent levels, a pinned level that is unavailable is
/// a configuration mistake worth surfacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestedLevel {
    Default,
    Pinned(ApiLevel),
}

impl RequestedLevel {
    pub fn from_config(level: Option<u8>) -> Result<Self, NegotiateError> {
        match level {
            None => Ok(RequestedLevel::Default),
            Some(v) => Ok(RequestedLevel::Pinned(ApiLevel::new(v)?)),
        }
    }

    pub fn initial(&self) -> ApiLevel {
        match self {
            RequestedLevel::Default => ApiLevel::DEFAULT,
            RequestedLevel::Pinned(level) => *level,
        }
    }

    pub fn pinned(&self) -> bool {
        match self {
            RequestedLevel::Default => false,
            RequestedLevel::Pinned(_) => true,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Registered,
    Absent,
    TimedOut,
    Failed(PlatformError),
}

#[derive(Debug)]
pub struct Attempt {
    pub level: ApiLevel,
    pub outcome: Outcome,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Registered => write!(f, "level {}: registered", self.level),
            Outcome::Absent => write!(f, "level {}: entry point absent", self.level),
            Outcome::TimedOut => write!(f, "level {}: registration timed out", self.level),
            Outcome::Failed(error) => write!(f, "level {}: {}", self.level, error),
        }
    }
}

fn attempts_list(attempts: &[Attempt]) -> String {
    let mut s = String::new();
    for attempt in attempts {
        if !s.is_empty() {
            s.push_str("; ");
        }
        s.push_str(&attempt.to_string());
    }
    s
}

#[derive(Debug, Error)]
pub enum NegotiateError {
    #[error("api level {0} is out of the legal range 0-4")]
    InvalidLevel(u8),
    #[error("entry point for pinned api level {} is not available ({})", .level, attempts_list(.attempts))]
    NotAvailable {
        level: ApiLevel,
        attempts: Vec<Attempt>,
    },
    #[error("registration at api level {} failed: {} ({})", .level, .error, attempts_list(.attempts))]
    Registration {
        level: ApiLevel,
        error: PlatformError,
        attempts: Vec<Attempt>,
    },
    #[error("registration at pinned api level {} timed out ({})", .level, attempts_list(.attempts))]
    TimedOut {
        level: ApiLevel,
        attempts: Vec<Attempt>,
    },
    #[error("no supported api level ({})", attempts_list(.attempts))]
    Exhausted { attempts: Vec<Attempt> },
}

#[derive(Debug)]
pub struct Negotiated<T> {
    pub level: ApiLevel,
    pub value: T,
    pub attempts: Vec<Attempt>,
}

pub enum AttemptResult<T> {
    Registered(T),
    Failed(PlatformError),
    TimedOut,
}

/// The negotiation walk itself, shared by subscription and enumeration.
pub fn walk<T, P, A>(
    requested: RequestedLevel,
    present: P,
    mut attempt: A,
) -> Result<Negotiated<T>, NegotiateError>
where
    P: Fn(ApiLevel) -> bool,
    A: FnMut(ApiLevel) -> AttemptResult<T>,
{
    let mut attempts = Vec::new();
    let mut level = requested.initial();

    loop {
        if !present(level) {
            attempts.push(Attempt {
                level,
                outcome: Outcome::Absent,
            });
            if requested.pinned() {
                return Err(NegotiateError::NotAvailable { level, attempts });
            }
            match level.step_down() {
                Some(below) => {
                    level = below;
                    continue;
                },
                None => return Err(NegotiateError::Exhausted { attempts }),
            }
        }

        match attempt(level) {
            AttemptResult::Registered(value) => {
                attempts.push(Attempt {
                    level,
                    outcome: Outcome::Registered,
                });
                return Ok(Negotiated {
                    level,
                    value,
                    attempts,
                });
            },
            AttemptResult::Failed(error) => {
                attempts.push(Attempt {
                    level,
                    outcome: Outcome::Failed(error.clone()),
                });
                // present but failing is a real error, not a version gap
                return Err(NegotiateError::Registration {
                    level,
                    error,
                    attempts,
                });
            },
            AttemptResult::TimedOut => {
                attempts.push(Attempt {
                    level,
                    outcome: Outcome::TimedOut,
                });
                if requested.pinned() {
                    return Err(NegotiateError::TimedOut { level, attempts });
                }
                match level.step_down() {
                    Some(below) => level = below,
                    None => return Err(NegotiateError::Exhausted { attempts }),
                }
            },
        }
    }
}

/// Run one blocking registration call with a deadline. The native calls
/// have no timeout of their own, a hung call leaves its worker behind.
pub fn with_timeout<T, F>(timeout: Duration, f: F) -> AttemptResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PlatformError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("negotiate".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        });
    if spawned.is_err() {
        return AttemptResult::Failed(PlatformError::INTERNAL);
    }
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => AttemptResult::Registered(value),
        Ok(Err(error)) => AttemptResult::Failed(error),
        Err(_) => AttemptResult::TimedOut,
    }
}

/// Negotiate a live callback subscription.
pub fn subscribe<P>(
    api: &Arc<P>,
    requested: RequestedLevel,
    timeout: Duration,
    sink: EventCallback,
) -> Result<Negotiated<NativeHandle>, NegotiateError>
where
    P: EventApi + Send + Sync + 'static,
{
    walk(
        requested,
        |level| api.has_subscribe(level),
        |level| {
            tracing::debug!(level = level.as_u8(), "trying subscription");
            let api = api.clone();
            let sink = sink.clone();
            with_timeout(timeout, move || api.subscribe(level, sink))
        },
    )
}

/// Negotiate a one-shot enumeration of the recorded event window.
pub fn enumerate<P>(
    api: &Arc<P>,
    requested: RequestedLevel,
    timeout: Duration,
    window: TimeWindow,
) -> Result<Negotiated<Vec<RawEvent>>, NegotiateError>
where
    P: EventApi + Send + Sync + 'static,
{
    walk(
        requested,
        |level| api.has_enumerate(level),
        |level| {
            tracing::debug!(level = level.as_u8(), "trying enumeration");
            let api = api.clone();
            with_timeout(timeout, move || api.enumerate(level, window))
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::{
        walk, with_timeout, ApiLevel, AttemptResult, NegotiateError, Outcome, RequestedLevel,
    };
    use crate::system::platform::PlatformError;

    fn present_at(levels: &'static [u8]) -> impl Fn(ApiLevel) -> bool {
        move |level| levels.contains(&level.as_u8())
    }

    #[test]
    fn succeeds_at_the_requested_level() {
        // monotonicity: present at the requested level means no step down
        for requested in 0..=4u8 {
            let r = RequestedLevel::from_config(Some(requested)).unwrap();
            let n = walk(r, |_| true, |l| AttemptResult::Registered(l.as_u8())).unwrap();
            assert_eq!(n.level.as_u8(), requested);
            assert_eq!(n.value, requested);
            assert_eq!(n.attempts.len(), 1);
        }
    }

    #[test]
    fn default_steps_down_through_absent_levels() {
        let n = walk(
            RequestedLevel::Default,
            present_at(&[0, 1]),
            |l| AttemptResult::Registered(l.as_u8()),
        )
        .unwrap();
        assert_eq!(n.level, ApiLevel::L1);
        // levels 3 and 2 were recorded as absent
        assert_eq!(n.attempts.len(), 3);
    }

    #[test]
    fn pinned_absent_level_fails() {
        let err = walk(
            RequestedLevel::Pinned(ApiLevel::L4),
            present_at(&[0, 1, 2, 3]),
            |l| AttemptResult::Registered(l.as_u8()),
        )
        .unwrap_err();
        match err {
            NegotiateError::NotAvailable { level, .. } => assert_eq!(level, ApiLevel::L4),
            other => panic!("expected not-available, got {}", other),
        }
    }

    #[test]
    fn present_but_failing_is_fatal_even_for_default() {
        let err = walk(RequestedLevel::Default, |_| true, |_| {
            AttemptResult::<()>::Failed(PlatformError { code: 5 })
        })
        .unwrap_err();
        match err {
            NegotiateError::Registration { level, error, attempts } => {
                assert_eq!(level, ApiLevel::DEFAULT);
                assert_eq!(error.code, 5);
                assert_eq!(attempts.len(), 1);
            },
            other => panic!("expected registration failure, got {}", other),
        }
    }

    #[test]
    fn timeout_steps_down_for_default() {
        let n = walk(RequestedLevel::Default, |_| true, |l| {
            if l == ApiLevel::DEFAULT {
                AttemptResult::TimedOut
            } else {
                AttemptResult::Registered(())
            }
        })
        .unwrap();
        assert_eq!(n.level, ApiLevel::L2);
        assert!(matches!(n.attempts[0].outcome, Outcome::TimedOut));
    }

    #[test]
    fn timeout_is_fatal_for_pinned() {
        let err = walk(
            RequestedLevel::Pinned(ApiLevel::L2),
            |_| true,
            |_| AttemptResult::<()>::TimedOut,
        )
        .unwrap_err();
        match err {
            NegotiateError::TimedOut { level, .. } => assert_eq!(level, ApiLevel::L2),
            other => panic!("expected timeout failure, got {}", other),
        }
    }

    #[test]
    fn all_levels_absent_is_exhausted() {
        let err = walk(
            RequestedLevel::Default,
            |_| false,
            |_| AttemptResult::Registered(()),
        )
        .unwrap_err();
        match err {
            NegotiateError::Exhausted { attempts } => assert_eq!(attempts.len(), 4),
            other => panic!("expected exhausted, got {}", other),
        }
    }

    #[test]
    fn out_of_range_level_is_a_configuration_error() {
        match RequestedLevel::from_config(Some(5)) {
            Err(NegotiateError::InvalidLevel(5)) => (),
            other => panic!("expected invalid level, got {:?}", other),
        }
    }

    #[test]
    fn with_timeout_expires() {
        let r = with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_secs(5));
            Ok(())
        });
        assert!(matches!(r, AttemptResult::TimedOut));
    }

    #[test]
    fn with_timeout_passes_results_through() {
        let r = with_timeout(Duration::from_secs(5), || Ok(7u32));
        match r {
            AttemptResult::Registered(v) => assert_eq!(v, 7),
            _ => panic!("expected registered"),
        }
        let r = with_timeout(Duration::from_secs(5), || {
            Err::<(), _>(PlatformError { code: 3 })
        });
        assert!(matches!(r, AttemptResult::Failed(PlatformError { code: 3 })));
    }
}
