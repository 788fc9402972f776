//! Circuit breaking for a proxy repository's remote.
//!
//! The first target a client ever contacts becomes its main target. Requests
//! to it are gated:
//!
//! - a manually blocked remote is never contacted;
//! - after a "remote unavailable" failure, an auto-blocking client refuses
//!   requests until the block expires. Successive blocks follow
//!   [`FibonacciBackoff`], and a recovery probe (a `HEAD` to the target root)
//!   fires when each block ends so that a success can clear it without user
//!   traffic.
//!
//! Requests to any other target pass straight through. Delegate errors are
//! always returned unchanged after they have been recorded.

pub mod backoff;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use upguard_core::{
    AppConfig, AutoBlockConfig, HttpClientFacet, RemoteConnectionStatus, RemoteConnectionStatusObserver,
    RemoteConnectionStatusType,
};

pub use backoff::FibonacciBackoff;

use crate::clock::{Clock, SystemClock};
use crate::error::{NetworkError, RemoteError};
use crate::fetch::{HttpDelegate, HttpRequest, HttpResponse, Target};

type StatusChange = (RemoteConnectionStatus, RemoteConnectionStatus);

/// Blocking behaviour of a circuit-breaking client.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerConfig {
    /// Refuse every request to the main target.
    pub manual_block: bool,
    /// Block the main target after it becomes unreachable.
    pub auto_block: bool,
    /// Whether the owning repository is online.
    pub online: bool,
    pub schedule: AutoBlockConfig,
}

impl From<&AppConfig> for BreakerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            manual_block: config.blocked,
            auto_block: config.auto_block,
            online: config.online,
            schedule: config.auto_block(),
        }
    }
}

struct OriginState {
    status: RemoteConnectionStatus,
    blocked_until: Option<DateTime<Utc>>,
    backoff: FibonacciBackoff,
    probe: Option<JoinHandle<()>>,
    closed: bool,
}

impl OriginState {
    /// Replace the status when the change is material.
    fn transition(&mut self, next: RemoteConnectionStatus) -> Option<StatusChange> {
        if !self.status.is_material_change(&next) {
            return None;
        }
        let old = std::mem::replace(&mut self.status, next.clone());
        Some((old, next))
    }

    /// Blocked and offline remotes only change through reconfiguration.
    fn is_pinned(&self) -> bool {
        matches!(
            self.status.status_type,
            RemoteConnectionStatusType::Blocked | RemoteConnectionStatusType::Offline
        )
    }

    fn cancel_probe(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
    }

    fn clear_block(&mut self) -> bool {
        if self.blocked_until.take().is_none() {
            return false;
        }
        self.cancel_probe();
        self.backoff.reset();
        true
    }
}

struct Inner {
    delegate: Arc<dyn HttpDelegate>,
    manual_block: bool,
    auto_block: bool,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn RemoteConnectionStatusObserver>>,
    main_target: OnceLock<Target>,
    state: Mutex<OriginState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, OriginState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, change: Option<StatusChange>) {
        if let (Some(observer), Some((old, new))) = (&self.observer, change) {
            observer.on_status_changed(&old, &new);
        }
    }

    fn check_gate(&self) -> Result<(), RemoteError> {
        if self.manual_block {
            return Err(RemoteError::ManuallyBlocked);
        }
        if self.auto_block
            && let Some(until) = self.lock().blocked_until
            && until > self.clock.now()
        {
            return Err(RemoteError::AutoBlocked { until });
        }
        Ok(())
    }

    /// Record the outcome of a call to the main target.
    fn record(self: &Arc<Self>, target: &Target, request_url: &str, outcome: Result<(), &NetworkError>) {
        let change = {
            let mut state = self.lock();
            if state.is_pinned() {
                tracing::trace!(remote = %target, status = %state.status.status_type, "status pinned, outcome not recorded");
                return;
            }
            let next = match outcome {
                Ok(()) => {
                    if state.clear_block() {
                        tracing::debug!(remote = %target, "remote reachable again, auto-block cleared");
                    }
                    Some(RemoteConnectionStatus::new(RemoteConnectionStatusType::Available))
                }
                Err(error) if !error.is_remote_unavailable() => {
                    tracing::debug!(remote = %target, error = %error, "pool exhaustion leaves remote status unchanged");
                    None
                }
                Err(error) => Some(self.unavailable(&mut state, target, request_url, error)),
            };
            next.and_then(|next| state.transition(next))
        };
        self.notify(change);
    }

    fn unavailable(
        self: &Arc<Self>,
        state: &mut OriginState,
        target: &Target,
        request_url: &str,
        error: &NetworkError,
    ) -> RemoteConnectionStatus {
        if !self.auto_block {
            return RemoteConnectionStatus::new(RemoteConnectionStatusType::Unavailable)
                .with_reason(error.reason())
                .with_request_url(request_url);
        }

        let now = self.clock.now();
        // only the caller that sees the block expired may advance it
        if state.blocked_until.is_none_or(|until| until <= now) {
            let term = state.backoff.next_term();
            let until = add(now, term);
            state.blocked_until = Some(until);
            tracing::warn!(remote = %target, error = %error, blocked_for_secs = term.as_secs(), "auto-blocking remote");

            state.cancel_probe();
            if !state.closed {
                state.probe = Some(self.schedule_probe(target.clone(), until));
            }
        }

        let mut status = RemoteConnectionStatus::new(RemoteConnectionStatusType::AutoBlockedUnavailable)
            .with_reason(error.reason())
            .with_request_url(request_url);
        status.blocked_until = state.blocked_until;
        status
    }

    /// Spawn a probe that wakes at `until` and sends a `HEAD` to the target root.
    fn schedule_probe(self: &Arc<Self>, target: Target, until: DateTime<Utc>) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(self);
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            let wait = (until - clock.now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            let Some(inner) = inner.upgrade() else {
                return;
            };
            let url = match target.root_url() {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(remote = %target, error = %e, "cannot probe remote");
                    return;
                }
            };
            let request_url = url.to_string();

            tracing::debug!(remote = %target, "probing auto-blocked remote");
            let result = inner.delegate.execute(&target, HttpRequest::head(url)).await;
            if let Err(e) = &result {
                tracing::debug!(remote = %target, error = %e, "recovery probe failed");
            }
            inner.record(&target, &request_url, result.as_ref().map(|_| ()));
        })
    }
}

fn add(now: DateTime<Utc>, term: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(term)
        .ok()
        .and_then(|term| now.checked_add_signed(term))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// HTTP client that blocks an unhealthy remote.
pub struct CircuitBreakingHttpClient {
    inner: Arc<Inner>,
}

impl CircuitBreakingHttpClient {
    pub fn new(
        delegate: Arc<dyn HttpDelegate>,
        config: BreakerConfig,
        observer: Option<Arc<dyn RemoteConnectionStatusObserver>>,
    ) -> Self {
        Self::with_clock(delegate, config, observer, Arc::new(SystemClock))
    }

    pub fn from_config(
        delegate: Arc<dyn HttpDelegate>,
        config: &AppConfig,
        observer: Option<Arc<dyn RemoteConnectionStatusObserver>>,
    ) -> Self {
        Self::new(delegate, BreakerConfig::from(config), observer)
    }

    pub fn with_clock(
        delegate: Arc<dyn HttpDelegate>,
        config: BreakerConfig,
        observer: Option<Arc<dyn RemoteConnectionStatusObserver>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let initial = if config.manual_block {
            RemoteConnectionStatusType::Blocked
        } else if !config.online {
            RemoteConnectionStatusType::Offline
        } else {
            RemoteConnectionStatusType::Ready
        };

        let inner = Arc::new(Inner {
            delegate,
            manual_block: config.manual_block,
            auto_block: config.auto_block,
            clock,
            observer,
            main_target: OnceLock::new(),
            state: Mutex::new(OriginState {
                status: RemoteConnectionStatus::default(),
                blocked_until: None,
                backoff: FibonacciBackoff::new(config.schedule),
                probe: None,
                closed: false,
            }),
        });

        let change = inner.lock().transition(RemoteConnectionStatus::new(initial));
        inner.notify(change);

        Self { inner }
    }

    /// Execute a request, gating it when it targets a blocked main target.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::ManuallyBlocked` or `RemoteError::AutoBlocked`
    /// without contacting the remote, or the delegate's own error.
    pub async fn execute(&self, target: &Target, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
        let main_target = self.inner.main_target.get_or_init(|| target.clone());

        if target != main_target {
            tracing::trace!(remote = %target, main = %main_target, "passing through request to auxiliary target");
            return Ok(self.inner.delegate.execute(target, request).await?);
        }

        self.inner.check_gate()?;

        let request_url = request.url().to_string();
        let result = self.inner.delegate.execute(target, request).await;
        self.inner.record(target, &request_url, result.as_ref().map(|_| ()));

        Ok(result?)
    }

    pub fn status(&self) -> RemoteConnectionStatus {
        self.inner.lock().status.clone()
    }

    /// End of the current block, if one was set.
    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().blocked_until
    }

    pub fn main_target(&self) -> Option<&Target> {
        self.inner.main_target.get()
    }

    pub fn is_manually_blocked(&self) -> bool {
        self.inner.manual_block
    }

    pub fn is_auto_block_enabled(&self) -> bool {
        self.inner.auto_block
    }

    /// Cancel any pending probe, then close the delegate.
    pub fn close(&self) {
        {
            let mut state = self.inner.lock();
            state.closed = true;
            state.cancel_probe();
        }
        tracing::debug!(main = ?self.inner.main_target.get(), "closing circuit-breaking HTTP client");
        self.inner.delegate.close();
    }
}

impl HttpClientFacet for CircuitBreakingHttpClient {
    fn status(&self) -> RemoteConnectionStatus {
        CircuitBreakingHttpClient::status(self)
    }

    /// Adopt a status reported elsewhere, such as by a peer node.
    ///
    /// An auto-block extends the local block window; an available remote
    /// clears it. Blocked and offline clients keep their status.
    fn set_status(&self, status: RemoteConnectionStatus) {
        let change = {
            let mut state = self.inner.lock();
            if state.is_pinned() {
                tracing::debug!(
                    current = %state.status.status_type,
                    replicated = %status.status_type,
                    "ignoring replicated status for pinned remote"
                );
                return;
            }
            match status.status_type {
                RemoteConnectionStatusType::AutoBlockedUnavailable if self.inner.auto_block => {
                    if let Some(until) = status.blocked_until
                        && state.blocked_until.is_none_or(|current| until > current)
                    {
                        state.blocked_until = Some(until);
                    }
                }
                RemoteConnectionStatusType::Available => {
                    state.clear_block();
                }
                _ => {}
            }
            state.transition(status)
        };
        self.inner.notify(change);
    }
}

impl Drop for CircuitBreakingHttpClient {
    fn drop(&mut self) {
        self.inner.lock().cancel_probe();
    }
}
