//! Bounded polling for long-running video jobs.

use std::time::Duration;

use studio_llm::media::{MediaProvider, VideoJob, VideoStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

/// Exponential backoff with a ceiling per wait and a cap on total time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max_interval: Duration,
    pub factor: f64,
    pub max_wait: Duration,
}

impl PollPolicy {
    /// Saturates at `max_interval`; a non-finite factor jumps straight there.
    pub fn next_interval(&self, current: Duration) -> Duration {
        if !self.factor.is_finite() {
            return self.max_interval;
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor.max(1.0))
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// Sleep, poll, repeat until the job finishes, fails, the policy's
/// `max_wait` elapses, or `cancel` fires. Each poll is preceded by a wait.
pub async fn wait_for_video(
    media: &dyn MediaProvider,
    job: &VideoJob,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<String, GatewayError> {
    let started = Instant::now();
    let mut interval = policy.initial.min(policy.max_interval);
    let mut polls: u32 = 0;

    loop {
        let waited = started.elapsed();
        if waited >= policy.max_wait {
            tracing::warn!(job = %job.id, polls, ?waited, "video job timed out");
            return Err(GatewayError::Timeout { waited, polls });
        }
        let sleep_for = interval.min(policy.max_wait - waited);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(job = %job.id, polls, "video polling cancelled");
                return Err(GatewayError::Cancelled);
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }

        polls += 1;
        match media.poll_video(job).await? {
            VideoStatus::Done { uri } => {
                tracing::info!(job = %job.id, polls, "video job finished");
                return Ok(uri);
            }
            VideoStatus::Failed { reason } => return Err(GatewayError::VideoFailed(reason)),
            VideoStatus::Pending => {
                tracing::debug!(job = %job.id, polls, next_ms = interval.as_millis() as u64, "video job pending");
                interval = policy.next_interval(interval);
            }
        }
    }
}
