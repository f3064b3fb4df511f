use tracing::debug;

use ps_core::JobStatus;
use crate::configurator::ResolvedConfiguration;
use crate::error::AppError;
use crate::events::JobEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Generate,
    Customize,
    Checkout,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generate => "Generate",
            Self::Customize => "Customize",
            Self::Checkout => "Checkout",
        }
    }
}

/// Where the shopper is in generate → customize → checkout, plus what each
/// step has produced so far.
#[derive(Debug, Clone)]
pub struct FlowState {
    step: Step,
    pub job: Option<JobStatus>,
    pub configuration: Option<ResolvedConfiguration>,
    pub progress: u8,
    pub status: String,
    pub error: Option<String>,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            step: Step::Generate,
            job: None,
            configuration: None,
            progress: 0,
            status: String::new(),
            error: None,
        }
    }
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|j| j.id.as_str())
    }

    /// Feed a poller event into the flow.
    pub fn apply(&mut self, event: JobEvent) {
        match event {
            JobEvent::Update(status) => {
                if self.step == Step::Generate {
                    self.progress = status.progress;
                    self.status = status.state.status_line().to_string();
                    self.job = Some(status);
                }
            }
            JobEvent::Complete(status) => self.on_generation_complete(status),
            JobEvent::Failed(message) => {
                self.error = Some(message);
                self.status = "Failed".to_string();
            }
        }
    }

    pub fn on_generation_complete(&mut self, status: JobStatus) {
        if self.step != Step::Generate {
            debug!(job_id = %status.id, step = self.step.name(), "Ignoring completion outside generate step");
            return;
        }
        self.progress = 100;
        self.status = status.state.status_line().to_string();
        self.error = None;
        self.job = Some(status);
        self.step = Step::Customize;
    }

    pub fn proceed_to_checkout(&mut self, configuration: ResolvedConfiguration) -> Result<(), AppError> {
        if self.step != Step::Customize {
            return Err(AppError::Validation(format!(
                "cannot check out from the {} step",
                self.step.name()
            )));
        }
        self.configuration = Some(configuration);
        self.step = Step::Checkout;
        Ok(())
    }

    pub fn back_to_customize(&mut self) {
        if self.step == Step::Checkout {
            self.step = Step::Customize;
        }
    }

    /// Start over with a new prompt. Drops the job and the configuration.
    pub fn restart(&mut self) {
        *self = Self::default();
    }
}
