use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One unit of finished work reported by a worker.
#[derive(Debug, Clone)]
pub struct Progress {
    pub step: &'static str,
    /// `controller/application` label.
    pub target: String,
    /// What was counted: `tiers`, `segment details`, `metric windows` ...
    pub item: &'static str,
    pub count: usize,
}

/// Clonable handle workers report through. Sending never blocks and never
/// fails the worker; a closed reporter just drops the message.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ProgressSink {
    /// Start the reporter task. It logs every message and returns per-step
    /// totals once every sink clone is dropped.
    pub fn spawn_reporter() -> (Self, JoinHandle<ProgressTotals>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let handle = tokio::spawn(async move {
            let mut totals = ProgressTotals::default();
            while let Some(p) = rx.recv().await {
                tracing::info!(
                    step = p.step,
                    app = %p.target,
                    item = p.item,
                    count = p.count,
                    "progress"
                );
                totals.add(&p);
            }
            totals
        });
        (Self { tx }, handle)
    }

    pub fn report(&self, step: &'static str, target: &str, item: &'static str, count: usize) {
        let _ = self.tx.send(Progress {
            step,
            target: target.to_string(),
            item,
            count,
        });
    }
}

/// Counts summed per (step, item).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTotals {
    pub by_step: BTreeMap<(String, String), usize>,
}

impl ProgressTotals {
    fn add(&mut self, p: &Progress) {
        *self
            .by_step
            .entry((p.step.to_string(), p.item.to_string()))
            .or_default() += p.count;
    }

    pub fn get(&self, step: &str, item: &str) -> usize {
        self.by_step
            .get(&(step.to_string(), item.to_string()))
            .copied()
            .unwrap_or(0)
    }
}
