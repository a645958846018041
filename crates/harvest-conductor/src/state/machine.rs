use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;

use harvest_core::JobStatus;

use crate::runner::pipeline::StepHandler;

/// Fixed, ordered step list with its handlers. The successor of every step is
/// computed once here.
pub struct Pipeline {
    steps: Vec<JobStatus>,
    next: HashMap<JobStatus, JobStatus>,
    handlers: HashMap<JobStatus, Arc<dyn StepHandler>>,
}

impl Pipeline {
    /// Build from one handler per step. Every step in `JobStatus::STEPS`
    /// must be covered exactly once.
    pub fn new(handlers: Vec<(JobStatus, Arc<dyn StepHandler>)>) -> Result<Self> {
        let mut map: HashMap<JobStatus, Arc<dyn StepHandler>> = HashMap::new();
        for (status, handler) in handlers {
            if status.is_terminal() {
                bail!("no handler may be registered for terminal status {status}");
            }
            if map.insert(status, handler).is_some() {
                bail!("duplicate handler for step {status}");
            }
        }
        if let Some(missing) = JobStatus::STEPS.iter().find(|s| !map.contains_key(s)) {
            bail!("no handler for step {missing}");
        }

        let steps = JobStatus::STEPS.to_vec();
        let next = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, steps.get(i + 1).copied().unwrap_or(JobStatus::Done)))
            .collect();

        Ok(Self {
            steps,
            next,
            handlers: map,
        })
    }

    pub fn steps(&self) -> &[JobStatus] {
        &self.steps
    }

    /// Step after `status`; terminal statuses map to themselves.
    pub fn next(&self, status: JobStatus) -> JobStatus {
        self.next.get(&status).copied().unwrap_or(status)
    }

    pub fn handler(&self, status: JobStatus) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(&status)
    }
}
