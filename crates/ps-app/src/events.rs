use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use ps_core::JobStatus;
use crate::error::AppError;
use crate::poller::PollHandler;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Update(JobStatus),
    Complete(JobStatus),
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }
}

/// Forward poll results into a channel, for callers that drive their own
/// loop. A dropped receiver just discards events.
impl PollHandler for UnboundedSender<JobEvent> {
    fn on_update(&mut self, status: &JobStatus) {
        forward(self, JobEvent::Update(status.clone()));
    }

    fn on_complete(&mut self, status: JobStatus) {
        forward(self, JobEvent::Complete(status));
    }

    fn on_error(&mut self, error: AppError) {
        forward(self, JobEvent::Failed(error.to_string()));
    }
}

fn forward(tx: &UnboundedSender<JobEvent>, event: JobEvent) {
    if let Err(e) = tx.send(event) {
        let job_id = match &e.0 {
            JobEvent::Update(status) | JobEvent::Complete(status) => status.id.as_str(),
            JobEvent::Failed(_) => "-",
        };
        debug!(job_id, terminal = e.0.is_terminal(), "Job event receiver dropped");
    }
}
