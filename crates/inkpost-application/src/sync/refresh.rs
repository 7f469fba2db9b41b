use chrono::{DateTime, Duration, Utc};
use inkpost_core::signal::SyncEvent;
use inkpost_infrastructure::BroadcastHub;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::handle::spawn_detached;

/// Result of [`RefreshScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A timer was armed and publishes `RefreshRequested` at `fires_at`.
    Armed { fires_at: DateTime<Utc> },
    /// The token is already inside the refresh margin; `TokenExpired` was
    /// published and no timer is armed.
    Expired,
    /// No runtime to host the timer.
    NoRuntime,
}

struct ArmedTimer {
    id: Uuid,
    fires_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Owns at most one pending token-refresh timer for a session.
pub struct RefreshScheduler {
    margin: Duration,
    hub: BroadcastHub,
    slot: Arc<Mutex<Option<ArmedTimer>>>,
}

impl RefreshScheduler {
    pub fn new(margin_secs: u64, hub: BroadcastHub) -> Self {
        Self {
            margin: Duration::seconds(i64::try_from(margin_secs).unwrap_or(i64::MAX / 1000)),
            hub,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Schedules a refresh `margin` before `expires_at`, replacing any
    /// previously armed timer.
    pub fn schedule(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleOutcome {
        self.cancel();

        let delay = expires_at - self.margin - now;
        if delay <= Duration::zero() {
            tracing::info!(
                "[RefreshScheduler] Token expires at {} (within margin), publishing TokenExpired",
                expires_at
            );
            self.hub.publish(SyncEvent::TokenExpired);
            return ScheduleOutcome::Expired;
        }

        let wait = match delay.to_std() {
            Ok(wait) => wait,
            Err(_) => return ScheduleOutcome::Expired,
        };
        let fires_at = now + delay;
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_slot = Arc::clone(&self.slot);
        let hub = self.hub.clone();
        let spawned = spawn_detached(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    tracing::debug!("[RefreshScheduler] Refresh timer {} fired", id);
                    let mut slot = task_slot.lock().unwrap_or_else(|e| e.into_inner());
                    if slot.as_ref().is_some_and(|t| t.id == id) {
                        *slot = None;
                    }
                    drop(slot);
                    hub.publish(SyncEvent::RefreshRequested);
                }
            }
        });

        if spawned.is_none() {
            return ScheduleOutcome::NoRuntime;
        }

        tracing::debug!(
            "[RefreshScheduler] Refresh scheduled at {} ({}s from now)",
            fires_at,
            delay.num_seconds()
        );
        *self.lock_slot() = Some(ArmedTimer {
            id,
            fires_at,
            cancel,
        });
        ScheduleOutcome::Armed { fires_at }
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(timer) = self.lock_slot().take() {
            tracing::debug!("[RefreshScheduler] Cancelled refresh timer {}", timer.id);
            timer.cancel.cancel();
        }
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.lock_slot().as_ref().map(|t| t.fires_at)
    }

    pub fn is_armed(&self) -> bool {
        self.lock_slot().is_some()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<ArmedTimer>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpost_core::signal::Topic;

    fn scheduler() -> (RefreshScheduler, inkpost_infrastructure::Subscription) {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe(&[Topic::Token]);
        (RefreshScheduler::new(300, hub), sub)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_margin_before_expiry() {
        let (scheduler, mut sub) = scheduler();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(3600);

        let outcome = scheduler.schedule(expires_at, now);
        assert_eq!(
            outcome,
            ScheduleOutcome::Armed {
                fires_at: now + Duration::seconds(3300)
            }
        );

        tokio::time::sleep(std::time::Duration::from_secs(3299)).await;
        assert!(sub.drain().is_empty());

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert_eq!(sub.drain(), vec![SyncEvent::RefreshRequested]);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_timer() {
        let (scheduler, mut sub) = scheduler();
        let now = Utc::now();

        scheduler.schedule(now + Duration::seconds(1000), now);
        scheduler.schedule(now + Duration::seconds(2000), now);
        assert_eq!(scheduler.scheduled_at(), Some(now + Duration::seconds(1700)));

        tokio::time::sleep(std::time::Duration::from_secs(2000)).await;
        assert_eq!(sub.drain(), vec![SyncEvent::RefreshRequested]);
    }

    #[tokio::test]
    async fn test_inside_margin_publishes_expired() {
        let (scheduler, mut sub) = scheduler();
        let now = Utc::now();

        let outcome = scheduler.schedule(now + Duration::seconds(120), now);
        assert_eq!(outcome, ScheduleOutcome::Expired);
        assert!(!scheduler.is_armed());
        assert_eq!(sub.drain(), vec![SyncEvent::TokenExpired]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (scheduler, mut sub) = scheduler();
        let now = Utc::now();

        scheduler.schedule(now + Duration::seconds(400), now);
        scheduler.cancel();

        tokio::time::sleep(std::time::Duration::from_secs(500)).await;
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_schedule_without_runtime() {
        let (scheduler, _sub) = scheduler();
        let now = Utc::now();
        assert_eq!(
            scheduler.schedule(now + Duration::seconds(3600), now),
            ScheduleOutcome::NoRuntime
        );
    }
}
