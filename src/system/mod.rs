// Copyright (c) SimpleStaking and Tezedge Contributors
// SPDX-License-Identifier: MIT

//! Session orchestration: verify, negotiate, subscribe, tear down.

pub mod compat;
pub mod load_table;
pub mod negotiate;
pub mod platform;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use crate::lookup::NameResolver;
use crate::output::TraceSink;
use crate::session::{now_filetime, Session};
use self::compat::CompatError;
use self::negotiate::{ApiLevel, NegotiateError, RequestedLevel};
use self::platform::{EventApi, NativeHandle, TimeWindow};

#[derive(Debug, Error)]
pub enum StartError {
    #[error("structure compatibility check failed: {0}")]
    Compat(#[from] CompatError),
    #[error(transparent)]
    Negotiate(#[from] NegotiateError),
}

pub struct Subscription {
    pub level: ApiLevel,
    handle: NativeHandle,
}

/// One monitoring session over a platform. Owns the live subscription
/// and the shared session state the callbacks mutate.
pub struct Monitor<P, R, S> {
    api: Arc<P>,
    session: Arc<Mutex<Session<R, S>>>,
    requested: RequestedLevel,
    timeout: Duration,
    subscription: Option<Subscription>,
}

impl<P, R, S> Monitor<P, R, S>
where
    P: EventApi + Send + Sync + 'static,
    R: NameResolver + Send + 'static,
    S: TraceSink + Send + 'static,
{
    pub fn new(
        api: Arc<P>,
        session: Session<R, S>,
        requested: RequestedLevel,
        timeout: Duration,
    ) -> Self {
        Monitor {
            api,
            session: Arc::new(Mutex::new(session)),
            requested,
            timeout,
            subscription: None,
        }
    }

    /// Shared handle to the session state, for statistics and tests.
    pub fn session(&self) -> Arc<Mutex<Session<R, S>>> {
        self.session.clone()
    }

    pub fn level(&self) -> Option<ApiLevel> {
        self.subscription.as_ref().map(|s| s.level)
    }

    /// Verify the struct mirrors, then negotiate and register the live
    /// subscription. Exactly one subscription exists per session.
    pub fn start(&mut self) -> Result<ApiLevel, StartError> {
        if let Some(subscription) = &self.subscription {
            return Ok(subscription.level);
        }

        compat::verify()?;

        if let Ok(mut session) = self.session.lock() {
            session.reset();
        }

        let session = self.session.clone();
        let sink: platform::EventCallback = Arc::new(move |raw| {
            // one lock spans the whole decode-classify-format cycle
            if let Ok(mut session) = session.lock() {
                session.handle_raw(&raw);
            }
        });

        let negotiated = negotiate::subscribe(&self.api, self.requested, self.timeout, sink)?;
        for attempt in &negotiated.attempts {
            tracing::debug!(attempt = %attempt, "negotiation");
        }
        tracing::info!(level = negotiated.level.as_u8(), "subscribed");

        self.subscription = Some(Subscription {
            level: negotiated.level,
            handle: negotiated.value,
        });
        Ok(negotiated.level)
    }

    /// Graceful stop, unregisters the subscription. Idempotent and safe
    /// to call when nothing is subscribed.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(error) = self.api.unsubscribe(subscription.handle) {
                tracing::warn!(error = %error, "unsubscribe failed");
            }
        }
    }

    /// Forced stop, releases the handle without the graceful unregister.
    pub fn stop_forced(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.api.release(subscription.handle);
        }
    }

    /// One-shot dump of the recorded event window through the same
    /// decode pipeline, with its own level negotiation.
    pub fn dump_recorded(&mut self) -> Result<(ApiLevel, usize), StartError> {
        compat::verify()?;

        let window = TimeWindow {
            start: 0,
            end: now_filetime(),
        };
        let negotiated = negotiate::enumerate(&self.api, self.requested, self.timeout, window)?;
        for attempt in &negotiated.attempts {
            tracing::debug!(attempt = %attempt, "enum negotiation");
        }

        let count = negotiated.value.len();
        if let Ok(mut session) = self.session.lock() {
            for raw in &negotiated.value {
                session.handle_raw(raw);
            }
        }
        Ok((negotiated.level, count))
    }
}
