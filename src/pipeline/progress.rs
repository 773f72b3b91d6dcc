//! Progress Reporter (C5, §4.7): computes `overall_percent` from a weight
//! table and publishes to the Task Registry, enforcing monotonicity and
//! write-once terminal semantics (§3 invariants).

use chrono::Utc;
use uuid::Uuid;

use crate::database::tasks::TaskRepository;
use crate::errors::AppError;
use crate::models::task::{ErrorCode, SourceMetadata, TaskError, TaskResult};
use crate::models::{Step, StepStatus, Task, TaskState};

/// Base weight table for the full pipeline (§4.6). A task that skips stages
/// (transcription-only, no burn-in) passes a subset of these names; their
/// weight is redistributed proportionally across the remaining stages so
/// `Σ step.weight == 1.0` always holds (§3, §9 "Progress weighting and
/// renormalization").
pub const FULL_STAGE_WEIGHTS: &[(&str, f64)] = &[
    ("acquire", 0.20),
    ("probe", 0.02),
    ("extract_audio", 0.10),
    ("transcribe", 0.35),
    ("translate", 0.15),
    ("emit_subtitles", 0.03),
    ("render", 0.10),
    ("verify", 0.03),
    ("publish", 0.02),
];

const MAX_LOG_LINES: usize = 50;

/// Builds the renormalized step list for a concrete run of the pipeline.
/// `active` lists the stage names this task will actually execute, in
/// execution order; every name must appear in [`FULL_STAGE_WEIGHTS`].
pub fn renormalized_steps(active: &[&str]) -> Vec<Step> {
    let base_sum: f64 = active
        .iter()
        .filter_map(|name| FULL_STAGE_WEIGHTS.iter().find(|(n, _)| n == name))
        .map(|(_, w)| w)
        .sum();

    active
        .iter()
        .map(|name| {
            let base_weight = FULL_STAGE_WEIGHTS
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, w)| *w)
                .unwrap_or(0.0);
            let weight = if base_sum > 0.0 {
                base_weight / base_sum
            } else {
                1.0 / active.len().max(1) as f64
            };
            Step {
                name: name.to_string(),
                weight,
                status: StepStatus::Waiting,
                percent: 0.0,
                indeterminate: false,
                message: None,
            }
        })
        .collect()
}

/// Worker-side helper bound to one task's lifetime. Not `Clone`/`Sync` by
/// design: §4.2 requires a single writer per task, and this type is the
/// only thing the engine uses to mutate the record.
pub struct ProgressReporter {
    repo: TaskRepository,
    task: Task,
}

impl ProgressReporter {
    pub fn new(repo: TaskRepository, task: Task) -> Self {
        Self { repo, task }
    }

    pub fn task_id(&self) -> Uuid {
        self.task.task_id
    }

    fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.task.progress.steps.iter_mut().find(|s| s.name == name)
    }

    fn recompute_overall(&mut self) {
        let computed: f64 = self
            .task
            .progress
            .steps
            .iter()
            .map(|s| match s.status {
                StepStatus::Completed => s.weight * 100.0,
                StepStatus::InProgress if !s.indeterminate => s.weight * s.percent,
                _ => 0.0,
            })
            .sum();

        // Monotonicity (§3, §8): overall_percent never decreases.
        self.task.progress.overall_percent = self.task.progress.overall_percent.max(computed);
    }

    fn push_log(&mut self, message: String) {
        let logs = self.task.progress.logs.get_or_insert_with(Vec::new);
        logs.push(message);
        if logs.len() > MAX_LOG_LINES {
            let excess = logs.len() - MAX_LOG_LINES;
            logs.drain(0..excess);
        }
    }

    async fn persist(&mut self) -> Result<(), AppError> {
        self.task.updated_at = Utc::now();
        self.repo.save(&self.task).await
    }

    pub async fn step_start(&mut self, name: &str) -> Result<(), AppError> {
        if self.task.state == TaskState::Pending {
            self.task.state = TaskState::Progress;
        }
        if let Some(step) = self.step_mut(name) {
            step.status = StepStatus::InProgress;
        }
        self.push_log(format!("{name}: started"));
        self.recompute_overall();
        self.persist().await
    }

    /// `percent` is `Some(0..100)` for a stage with known progress, or
    /// `None` for an indeterminate stage (§3 "contributes 0 ... until it
    /// completes").
    pub async fn step_progress(
        &mut self,
        name: &str,
        percent: Option<f64>,
        message: Option<String>,
    ) -> Result<(), AppError> {
        if let Some(step) = self.step_mut(name) {
            step.status = StepStatus::InProgress;
            match percent {
                Some(p) => {
                    step.indeterminate = false;
                    step.percent = step.percent.max(p.clamp(0.0, 100.0));
                }
                None => step.indeterminate = true,
            }
            step.message = message.clone();
        }
        if let Some(message) = message {
            self.push_log(format!("{name}: {message}"));
        }
        self.recompute_overall();
        self.persist().await
    }

    pub async fn step_complete(&mut self, name: &str) -> Result<(), AppError> {
        if let Some(step) = self.step_mut(name) {
            step.status = StepStatus::Completed;
            step.percent = 100.0;
            step.indeterminate = false;
        }
        self.push_log(format!("{name}: completed"));
        self.recompute_overall();
        self.persist().await
    }

    pub async fn step_error(&mut self, name: &str, message: &str) -> Result<(), AppError> {
        if let Some(step) = self.step_mut(name) {
            step.status = StepStatus::Error;
            step.message = Some(message.to_string());
        }
        self.push_log(format!("{name}: error: {message}"));
        self.persist().await
    }

    /// Write-once (§3, §4.2): a no-op once the task is already terminal.
    pub async fn task_complete(&mut self, result: TaskResult) -> Result<(), AppError> {
        if self.task.state.is_terminal() {
            return Ok(());
        }
        self.task.progress.overall_percent = 100.0;
        self.task.state = TaskState::Success;
        self.task.result = Some(result);
        self.persist().await
    }

    pub async fn task_fail(
        &mut self,
        code: ErrorCode,
        message: String,
        user_message: String,
        recoverable: bool,
    ) -> Result<(), AppError> {
        if self.task.state.is_terminal() {
            return Ok(());
        }
        self.task.state = TaskState::Failure;
        self.task.error = Some(TaskError {
            code,
            message,
            user_message,
            recoverable,
        });
        self.persist().await
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Records S2 Probe's output on the Task Record (§3 `source_metadata`).
    pub async fn set_source_metadata(&mut self, metadata: SourceMetadata) -> Result<(), AppError> {
        self.task.source_metadata = Some(metadata);
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_weights_sum_to_one() {
        let steps = renormalized_steps(&[
            "acquire",
            "probe",
            "extract_audio",
            "transcribe",
            "translate",
            "emit_subtitles",
            "render",
            "verify",
            "publish",
        ]);
        let sum: f64 = steps.iter().map(|s| s.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn skipped_stage_weight_redistributes_proportionally() {
        // Transcription-only: S5 (translate) through S8 (verify) dropped.
        let steps = renormalized_steps(&["acquire", "probe", "extract_audio", "transcribe", "emit_subtitles", "publish"]);
        let sum: f64 = steps.iter().map(|s| s.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum was {sum}");

        // transcribe had the largest base weight, so it should still be the
        // largest share after renormalization.
        let transcribe_weight = steps.iter().find(|s| s.name == "transcribe").unwrap().weight;
        let acquire_weight = steps.iter().find(|s| s.name == "acquire").unwrap().weight;
        assert!(transcribe_weight > acquire_weight);
    }
}
