//! Receive-only real-time connection to `/ws/status`.
//!
//! A single driver task owns the socket and walks the [`ChannelState`] machine:
//! `Connecting -> Open -> ReconnectScheduled -> Connecting ...` until [`StatusChannel::disconnect`]
//! bumps the generation and aborts it. Every transition the driver makes is checked against
//! the generation it was spawned with, so a driver that lost the race with `disconnect` can
//! neither dispatch a message nor schedule another reconnect.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::StreamExt;
use shared::protocol::ServerEvent;
use tokio::{task::JoinHandle, time::Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub type StatusHandler = Arc<dyn Fn(ServerEvent) + Send + Sync>;

/// Push source of deployment status, opened and closed by the orchestrator.
pub trait StatusSource: Send + Sync {
    /// Opens the feed, or only swaps the handler when it is already open or connecting.
    fn connect(&self, handler: StatusHandler);
    /// Closes the feed and cancels any pending reconnect. Safe to call when closed.
    fn disconnect(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// `min(base * 2^attempts, cap)`.
    pub fn delay(&self, attempts: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempts))
            .min(self.cap)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next reconnect; counts one more failed attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting { attempt: u32 },
    Open,
    ReconnectScheduled { attempt: u32, deadline: Instant },
}

struct ChannelInner {
    state: ChannelState,
    generation: u64,
    handler: Option<StatusHandler>,
    backoff: Backoff,
    task: Option<JoinHandle<()>>,
}

/// At most one live connection per instance; one handler, last `connect` wins.
///
/// Handlers run while the channel's internal lock is held and must not call back into the
/// channel.
pub struct StatusChannel {
    url: Url,
    inner: Arc<Mutex<ChannelInner>>,
}

impl StatusChannel {
    pub fn new(url: Url, policy: ReconnectPolicy) -> Self {
        Self {
            url,
            inner: Arc::new(Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                generation: 0,
                handler: None,
                backoff: Backoff::new(policy),
                task: None,
            })),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.inner).state
    }

    pub fn is_active(&self) -> bool {
        self.state() != ChannelState::Disconnected
    }
}

impl StatusSource for StatusChannel {
    fn connect(&self, handler: StatusHandler) {
        let mut inner = lock(&self.inner);
        inner.handler = Some(handler);
        if inner.state != ChannelState::Disconnected {
            debug!(state = ?inner.state, "status channel already active");
            return;
        }

        inner.generation += 1;
        inner.state = ChannelState::Connecting {
            attempt: inner.backoff.attempts(),
        };
        let driver = drive(Arc::clone(&self.inner), self.url.clone(), inner.generation);
        inner.task = Some(tokio::spawn(driver));
    }

    fn disconnect(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = ChannelState::Disconnected;
        inner.handler = None;
        inner.backoff.reset();
        if let Some(task) = inner.task.take() {
            task.abort();
            info!(url = %self.url, "status channel disconnected");
        }
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock(inner: &Mutex<ChannelInner>) -> MutexGuard<'_, ChannelInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies `f` only if `generation` is still current.
fn transition(
    inner: &Mutex<ChannelInner>,
    generation: u64,
    f: impl FnOnce(&mut ChannelInner),
) -> bool {
    let mut guard = lock(inner);
    if guard.generation != generation {
        return false;
    }
    f(&mut guard);
    true
}

async fn drive(inner: Arc<Mutex<ChannelInner>>, url: Url, generation: u64) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut stream, _)) => {
                let opened = transition(&inner, generation, |inner| {
                    inner.backoff.reset();
                    inner.state = ChannelState::Open;
                });
                if !opened {
                    return;
                }
                info!(%url, "status channel open");

                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if !dispatch(&inner, generation, &text) {
                                return;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "status channel closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "status channel receive failed");
                            break;
                        }
                    }
                }
            }
            Err(err) => warn!(%url, error = %err, "status channel connect failed"),
        }

        let mut deadline = None;
        let scheduled = transition(&inner, generation, |inner| {
            let delay = inner.backoff.next_delay();
            let attempt = inner.backoff.attempts();
            let at = Instant::now() + delay;
            inner.state = ChannelState::ReconnectScheduled {
                attempt,
                deadline: at,
            };
            deadline = Some(at);
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "status channel lost; reconnect scheduled"
            );
        });
        let (true, Some(deadline)) = (scheduled, deadline) else {
            return;
        };
        tokio::time::sleep_until(deadline).await;

        let resumed = transition(&inner, generation, |inner| {
            inner.state = ChannelState::Connecting {
                attempt: inner.backoff.attempts(),
            };
        });
        if !resumed {
            return;
        }
    }
}

/// Decodes one text frame and hands status updates to the handler. Returns `false` once the
/// driver has been superseded.
fn dispatch(inner: &Mutex<ChannelInner>, generation: u64, text: &str) -> bool {
    let event = match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, "dropping unrecognized status payload");
            return true;
        }
    };

    let guard = lock(inner);
    if guard.generation != generation {
        return false;
    }
    if let Some(handler) = guard.handler.as_ref() {
        handler(event);
    }
    true
}

#[cfg(test)]
#[path = "tests/status_channel_tests.rs"]
mod tests;
