//! Deadlines for calls into the campaign and clip services.
//!
//! A call that outlives its deadline is abandoned on its helper thread and surfaces as
//! `UpstreamUnavailable`, so the worker handling the event is never blocked. Abandoned
//! threads keep their slot until the call returns; once `max_in_flight` slots are taken,
//! new calls fail fast instead of spawning more threads.

use super::{CampaignDataSource, CampaignSnapshot, Clip, ClipDataProvider};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Runs upstream calls under a deadline with a cap on concurrently live helper threads.
#[derive(Debug, Clone)]
pub struct UpstreamCaller {
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// One taken in-flight slot, handed back when the helper thread finishes.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UpstreamCaller {
    pub fn new(timeout: Duration, max_in_flight: usize) -> Self {
        UpstreamCaller {
            timeout,
            max_in_flight: max_in_flight.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Helper threads currently running, including abandoned ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn acquire(&self, what: &str) -> Result<Slot> {
        let max = self.max_in_flight;
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map_err(|busy| {
                tracing::warn!(call = what, in_flight = busy, "upstream call rejected");
                Error::UpstreamUnavailable(format!("{}: {} upstream calls in flight", what, busy))
            })?;
        Ok(Slot(Arc::clone(&self.in_flight)))
    }

    pub fn call<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let slot = self.acquire(what)?;
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name(format!("upstream-{}", what))
            .spawn(move || {
                let _slot = slot;
                let _ = sender.send(f());
            })
            .map_err(|e| {
                Error::UpstreamUnavailable(format!("{}: failed to spawn call: {}", what, e))
            })?;

        let timeout = self.timeout;
        match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    call = what,
                    timeout_ms = timeout.as_millis() as u64,
                    "upstream call timed out"
                );
                Err(Error::UpstreamUnavailable(format!(
                    "{} timed out after {}ms",
                    what,
                    timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::UpstreamUnavailable(format!(
                "{} ended without a result",
                what
            ))),
        }
    }
}

pub struct TimeoutCampaignSource {
    inner: Arc<dyn CampaignDataSource>,
    caller: UpstreamCaller,
}

impl TimeoutCampaignSource {
    pub fn new(inner: Arc<dyn CampaignDataSource>, caller: UpstreamCaller) -> Self {
        TimeoutCampaignSource { inner, caller }
    }
}

impl CampaignDataSource for TimeoutCampaignSource {
    fn get_campaign(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        let inner = Arc::clone(&self.inner);
        let id = campaign_id.to_string();
        self.caller.call("get_campaign", move || inner.get_campaign(&id))
    }
}

pub struct TimeoutClipProvider {
    inner: Arc<dyn ClipDataProvider>,
    caller: UpstreamCaller,
}

impl TimeoutClipProvider {
    pub fn new(inner: Arc<dyn ClipDataProvider>, caller: UpstreamCaller) -> Self {
        TimeoutClipProvider { inner, caller }
    }
}

impl ClipDataProvider for TimeoutClipProvider {
    fn approved_clips(&self, campaign_id: &str) -> Result<Vec<Clip>> {
        let inner = Arc::clone(&self.inner);
        let id = campaign_id.to_string();
        self.caller.call("approved_clips", move || inner.approved_clips(&id))
    }
}
