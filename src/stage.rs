//! Ordered stage execution with halt-on-first-required-failure.
//!
//! A [`Pipeline`] runs its stages in the order given at construction. A
//! failing `required` stage halts the pipeline; a failing optional stage is
//! logged and execution continues. Stage names are unique within a pipeline
//! so a halt can name its culprit unambiguously.

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Success,
    Failure(String),
}

impl StageResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        StageResult::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success)
    }
}

impl<E: fmt::Display> From<std::result::Result<(), E>> for StageResult {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => StageResult::Success,
            Err(err) => StageResult::Failure(format!("{err:#}")),
        }
    }
}

/// One named unit of work. `required` decides halt-vs-continue on failure.
pub struct Stage<'a> {
    name: String,
    required: bool,
    action: Box<dyn Fn() -> StageResult + 'a>,
}

impl<'a> Stage<'a> {
    pub fn new(
        name: impl Into<String>,
        required: bool,
        action: impl Fn() -> StageResult + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            required,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl fmt::Debug for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Execution record of one stage.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub name: String,
    pub required: bool,
    pub outcome: StageResult,
    pub elapsed: Duration,
}

/// The stage that halted a pipeline, and why.
#[derive(Debug, Clone)]
pub struct Halt {
    pub stage: String,
    pub reason: String,
}

pub struct Pipeline<'a> {
    name: String,
    stages: Vec<Stage<'a>>,
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}

impl<'a> Pipeline<'a> {
    /// Stage order is fixed here and never reordered. Duplicate stage names
    /// are a construction error.
    pub fn new(name: impl Into<String>, stages: Vec<Stage<'a>>) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                bail!("duplicate stage name '{}' in pipeline '{}'", stage.name, name);
            }
        }
        Ok(Self { name, stages })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the stages in order. Consumes the pipeline; stages run at most
    /// once.
    pub fn run(self) -> PipelineReport {
        log::info!("=== {} ===", self.name);

        let mut records = Vec::with_capacity(self.stages.len());
        let mut halted = None;
        let mut not_run = Vec::new();
        let mut stages = self.stages.into_iter();

        for stage in stages.by_ref() {
            let start = Instant::now();
            log::debug!("stage '{}' starting", stage.name);
            let outcome = (stage.action)();
            let elapsed = start.elapsed();

            match &outcome {
                StageResult::Success => {
                    log::info!("  [{:.1}s] {}", elapsed.as_secs_f64(), stage.name);
                }
                StageResult::Failure(reason) if stage.required => {
                    log::error!("stage '{}' failed: {}", stage.name, reason);
                    halted = Some(Halt {
                        stage: stage.name.clone(),
                        reason: reason.clone(),
                    });
                }
                StageResult::Failure(reason) => {
                    log::warn!("stage '{}' failed (continuing): {}", stage.name, reason);
                }
            }

            records.push(StageRecord {
                name: stage.name,
                required: stage.required,
                outcome,
                elapsed,
            });
            if halted.is_some() {
                break;
            }
        }

        for stage in stages {
            not_run.push(stage.name);
        }

        PipelineReport {
            pipeline: self.name,
            records,
            halted,
            not_run,
        }
    }
}

/// Outcome of a full pipeline run.
pub struct PipelineReport {
    pub pipeline: String,
    pub records: Vec<StageRecord>,
    pub halted: Option<Halt>,
    pub not_run: Vec<String>,
}

impl PipelineReport {
    /// True when no required stage failed. Optional-stage failures do not
    /// count against success.
    pub fn succeeded(&self) -> bool {
        self.halted.is_none()
    }

    /// Number of optional stages that failed.
    pub fn warning_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.required && !r.outcome.is_success())
            .count()
    }

    pub fn executed(&self) -> usize {
        self.records.len()
    }

    /// Print a per-stage summary to stdout.
    pub fn print(&self) {
        println!("=== {} ===", self.pipeline);
        for record in &self.records {
            let icon = match (&record.outcome, record.required) {
                (StageResult::Success, _) => "✓",
                (StageResult::Failure(_), true) => "✗",
                (StageResult::Failure(_), false) => "⚠",
            };
            match &record.outcome {
                StageResult::Success => println!("  {} {}", icon, record.name),
                StageResult::Failure(reason) => {
                    println!("  {} {}: {}", icon, record.name, reason)
                }
            }
        }
        for name in &self.not_run {
            println!("  ○ {} (not run)", name);
        }

        let passed = self
            .records
            .iter()
            .filter(|r| r.outcome.is_success())
            .count();
        let total = self.records.len() + self.not_run.len();
        println!("Summary: {}/{} passed", passed, total);
        if let Some(halt) = &self.halted {
            println!("         halted at '{}': {}", halt.stage, halt.reason);
        }
    }
}
