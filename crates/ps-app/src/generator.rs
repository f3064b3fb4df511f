use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::generator::backend::StorefrontApi;
use crate::generator::backend::schemas::{GenerateRequest, JobCreateResponse, LegacyJobRequest};
use crate::poller::{JobPoller, PollHandle, PollHandler, PollOptions};

pub mod backend;

pub const LEGACY_AGENT_NAME: &str = "web_client";

/// Visual style hint sent with the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Style {
    Figurine,
    Sculpture,
    Character,
    Object,
}

impl Style {
    /// Style ID for API communication
    pub fn id(&self) -> &'static str {
        match self {
            Self::Figurine => "figurine",
            Self::Sculpture => "sculpture",
            Self::Character => "character",
            Self::Object => "object",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Figurine => "Figurine",
            Self::Sculpture => "Sculpture",
            Self::Character => "Character",
            Self::Object => "Object",
        }
    }

    pub fn all() -> [Style; 4] {
        [Self::Figurine, Self::Sculpture, Self::Character, Self::Object]
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::Figurine
    }
}

/// A submitted job and the poller watching it.
pub struct Submission {
    pub job_id: String,
    pub handle: PollHandle,
}

pub struct Generator {
    backend: Arc<dyn StorefrontApi>,
    poller: JobPoller,
}

impl Generator {
    pub fn new(backend: Arc<dyn StorefrontApi>, options: PollOptions) -> Self {
        let poller = JobPoller::new(backend.clone(), options);
        Self { backend, poller }
    }

    pub fn backend(&self) -> &Arc<dyn StorefrontApi> {
        &self.backend
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    /// Start a concept-only job: the backend stops at the concept image.
    pub async fn submit_concept(&self, prompt: &str, style: Style) -> Result<JobCreateResponse, AppError> {
        let prompt = validate_prompt(prompt)?;
        let resp = self
            .backend
            .create_concept_job(&GenerateRequest {
                prompt: prompt.to_string(),
                style: style.id().to_string(),
            })
            .await?;

        info!(job_id = %resp.job_id, style = style.id(), "Concept job submitted");
        Ok(resp)
    }

    /// Start a full image-to-mesh job through the older endpoint.
    pub async fn submit_legacy(
        &self,
        prompt: &str,
        style: Style,
        size_mm: u32,
    ) -> Result<JobCreateResponse, AppError> {
        let prompt = validate_prompt(prompt)?;
        let resp = self
            .backend
            .create_legacy_job(&LegacyJobRequest {
                agent_name: LEGACY_AGENT_NAME.to_string(),
                description: prompt.to_string(),
                style: style.id().to_string(),
                size_mm,
            })
            .await?;

        info!(job_id = %resp.job_id, style = style.id(), size_mm, "Legacy job submitted");
        Ok(resp)
    }

    /// Submit a concept job and start polling it.
    pub async fn generate<H: PollHandler>(
        &self,
        prompt: &str,
        style: Style,
        handler: H,
    ) -> Result<Submission, AppError> {
        let resp = self.submit_concept(prompt, style).await?;
        let handle = self.poller.start(&resp.job_id, handler)?;
        Ok(Submission {
            job_id: resp.job_id,
            handle,
        })
    }

    /// Resume polling a job submitted earlier.
    pub fn watch<H: PollHandler>(&self, job_id: &str, handler: H) -> Result<PollHandle, AppError> {
        self.poller.start(job_id, handler)
    }
}

fn validate_prompt(prompt: &str) -> Result<&str, AppError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::Validation("Please enter a description".into()));
    }
    Ok(prompt)
}
