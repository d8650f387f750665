//! Engine configuration.

use std::time::Duration;

use crate::layout::TransactionLayout;
use crate::retry::RetryPolicy;

/// Extra time granted on top of the participants' commit retry budget
/// before an unconfirmed commit is escalated.
const CONFIRMATION_SLACK: Duration = Duration::from_secs(5);

/// Coordinator engine settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub layout: TransactionLayout,
    /// Retry budget for transient store faults.
    pub store_retry: RetryPolicy,
    /// How long to wait for votes before deciding ABORT. `None` waits forever.
    pub prepare_timeout: Option<Duration>,
    /// How long to wait for every COMMITTED report after deciding COMMIT.
    pub commit_confirmation_timeout: Duration,
    /// How long to wait for participant nodes to disappear after ABORT.
    pub abort_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            layout: TransactionLayout::default(),
            store_retry: RetryPolicy::default(),
            prepare_timeout: Some(Duration::from_secs(30)),
            commit_confirmation_timeout: confirmation_bound(
                &ParticipantConfig::default().commit_retry,
            ),
            abort_grace: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(layout: TransactionLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    pub fn with_prepare_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    pub fn with_commit_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.commit_confirmation_timeout = timeout;
        self
    }

    /// Derives the commit confirmation bound from the participants' commit
    /// retry policy.
    pub fn with_participant_commit_retry(mut self, policy: &RetryPolicy) -> Self {
        self.commit_confirmation_timeout = confirmation_bound(policy);
        self
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }
}

/// Participant engine settings.
#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    pub layout: TransactionLayout,
    /// Retry budget for transient store faults.
    pub store_retry: RetryPolicy,
    /// Retry budget for the commit hook.
    pub commit_retry: RetryPolicy,
    /// How long to keep the node after reporting COMMITTED while waiting
    /// for the coordinator to remove it.
    pub release_timeout: Duration,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            layout: TransactionLayout::default(),
            store_retry: RetryPolicy::default(),
            commit_retry: RetryPolicy::exponential(
                5,
                Duration::from_millis(100),
                Duration::from_secs(2),
            ),
            release_timeout: Duration::from_secs(30),
        }
    }
}

impl ParticipantConfig {
    pub fn new(layout: TransactionLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    pub fn with_commit_retry(mut self, policy: RetryPolicy) -> Self {
        self.commit_retry = policy;
        self
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }
}

fn confirmation_bound(commit_retry: &RetryPolicy) -> Duration {
    commit_retry.total_backoff().saturating_add(CONFIRMATION_SLACK)
}
