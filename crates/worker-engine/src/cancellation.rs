// CancellationRegistry: routes operator-initiated cancellation for a job id
// to the scope of the attempt currently running it.

use dashmap::DashMap;
use uuid::Uuid;

use crate::context::CancelScope;

struct Subscription {
    attempt_id: Uuid,
    scope: CancelScope,
}

/// Running attempts keyed by job id. Shared by every processor of a worker.
#[derive(Default)]
pub struct CancellationRegistry {
    subscriptions: DashMap<u64, Subscription>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `scope` as the one to cancel for `job_id`. Returns the attempt
    /// id it replaced, if one was still registered.
    pub fn subscribe(&self, job_id: u64, attempt_id: Uuid, scope: CancelScope) -> Option<Uuid> {
        self.subscriptions
            .insert(job_id, Subscription { attempt_id, scope })
            .map(|previous| previous.attempt_id)
    }

    /// Forget `job_id`, but only while it still belongs to `attempt_id`.
    pub fn unsubscribe(&self, job_id: u64, attempt_id: Uuid) -> bool {
        self.subscriptions
            .remove_if(&job_id, |_, sub| sub.attempt_id == attempt_id)
            .is_some()
    }

    /// Cancel the running attempt of `job_id`. Returns whether one was found.
    pub fn cancel(&self, job_id: u64) -> bool {
        match self.subscriptions.get(&job_id) {
            Some(sub) => {
                tracing::info!(job_id, attempt_id = %sub.attempt_id, "Cancelling job");
                sub.scope.cancel();
                true
            }
            None => {
                tracing::debug!(job_id, "No running attempt to cancel");
                false
            }
        }
    }

    pub fn is_subscribed(&self, job_id: u64) -> bool {
        self.subscriptions.contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;

    #[test]
    fn cancel_reaches_subscribed_scope() {
        let registry = CancellationRegistry::new();
        let scope = CancelScope::new();
        registry.subscribe(9, Uuid::new_v4(), scope.clone());

        assert!(registry.cancel(9));
        assert_eq!(scope.error(), Some(ContextError::Cancelled));
        assert!(!registry.cancel(10));
    }

    #[test]
    fn unsubscribe_ignores_stale_attempts() {
        let registry = CancellationRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.subscribe(4, first, CancelScope::new());
        assert_eq!(registry.subscribe(4, second, CancelScope::new()), Some(first));

        assert!(!registry.unsubscribe(4, first));
        assert!(registry.is_subscribed(4));
        assert!(registry.unsubscribe(4, second));
        assert!(registry.is_empty());
    }
}
