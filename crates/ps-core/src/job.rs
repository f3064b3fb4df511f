use serde::Serialize;

/// Canonical generation job state.
///
/// Both backend API versions map onto this enum at the client edge; the
/// legacy API has no `ConceptReady` and adds `EstimatingCost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    GeneratingImage,
    ConceptReady,
    #[serde(rename = "converting_3d")]
    Converting3d,
    EstimatingCost,
    Completed,
    Failed,
    Unknown,
}

impl JobState {
    /// Translate a backend status string. Unrecognised values become
    /// `Unknown` and are polled like any other in-progress state.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "generating_image" => Self::GeneratingImage,
            "concept_ready" => Self::ConceptReady,
            "converting_3d" => Self::Converting3d,
            "estimating_cost" => Self::EstimatingCost,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::GeneratingImage => "generating_image",
            Self::ConceptReady => "concept_ready",
            Self::Converting3d => "converting_3d",
            Self::EstimatingCost => "estimating_cost",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Progress shown when the backend does not report one.
    pub fn default_progress(&self) -> u8 {
        match self {
            Self::Pending => 10,
            Self::GeneratingImage => 40,
            Self::ConceptReady => 60,
            Self::Converting3d => 70,
            Self::EstimatingCost => 90,
            Self::Completed => 100,
            Self::Failed | Self::Unknown => 0,
        }
    }

    pub fn status_line(&self) -> &'static str {
        match self {
            Self::Pending => "Preparing your request...",
            Self::GeneratingImage => "Creating 2D concept...",
            Self::ConceptReady => "Concept ready",
            Self::Converting3d => "Converting to 3D model...",
            Self::EstimatingCost => "Calculating price...",
            Self::Completed => "Completed!",
            Self::Failed => "Generation failed",
            Self::Unknown => "Processing...",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Legacy cost estimate attached by the old pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub volume_cm3: f64,
    pub material_prices_usd: Vec<(String, f64)>,
}

/// Snapshot of one generation job as last reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub description: String,
    pub image_path: Option<String>,
    pub mesh_path: Option<String>,
    pub progress: u8,
    pub error_message: Option<String>,
    pub concept_only: bool,
    pub cost_estimate: Option<CostEstimate>,
    pub completion_time: Option<f64>,
}

impl JobStatus {
    /// `Completed`, or `ConceptReady` for a job that stops at the 2D concept.
    pub fn is_terminal_success(&self) -> bool {
        match self.state {
            JobState::Completed => true,
            JobState::ConceptReady => self.concept_only,
            _ => false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == JobState::Failed
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal_success() || self.is_failed()
    }

    /// Whether the preview is a 2D concept only (no mesh until purchase).
    pub fn shows_concept_only(&self) -> bool {
        self.concept_only || self.state == JobState::ConceptReady
    }

    pub fn failure_message(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Job failed".to_string())
    }
}

#[cfg(test)]
pub(crate) fn status(id: &str, state: JobState) -> JobStatus {
    JobStatus {
        id: id.to_string(),
        state,
        description: String::new(),
        image_path: None,
        mesh_path: None,
        progress: state.default_progress(),
        error_message: None,
        concept_only: false,
        cost_estimate: None,
        completion_time: None,
    }
}
