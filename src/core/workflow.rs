//! Types for representing workflow files: ordered lists of SSH setup tasks.

use crate::core::task::{Outcome, Services, SshTask};
use crate::error::Error;
use crate::store::CompletionStore;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A workflow file.
///
/// ```yaml
/// ssh-dir: /tmp/isolated/.ssh   # optional; defaults to ~/.ssh
/// tasks:
///   - id: "1"
///     name: alice
///     host: github.com
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Workflow {
    /// Overrides the SSH directory of every task. Tasks run isolated when this is set to anything
    /// other than the user's SSH directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_dir: Option<PathBuf>,

    /// Tasks in execution order.
    pub tasks: Vec<SshTask>,
}

/// What [Workflow::run] did, by task identity, in execution order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(String, Outcome)>,
    pub failures: Vec<(String, Error)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Workflow {
    /// Parses a workflow from YAML and applies [Self::ssh_dir] to its tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or two tasks share an `id`, since they would
    /// share a completion marker.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let mut workflow: Workflow = serde_yaml::from_str(yaml)?;

        let mut seen = BTreeSet::new();
        for task in &workflow.tasks {
            if !seen.insert(task.id()) {
                bail!("duplicate task id {:?} in workflow", task.id());
            }
        }

        if let Some(ssh_dir) = &workflow.ssh_dir {
            for task in &mut workflow.tasks {
                task.set_ssh_dir(ssh_dir)?;
            }
        }
        Ok(workflow)
    }

    /// Loads a workflow file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
        Self::from_yaml(&yaml)
            .with_context(|| format!("failed to load workflow file: {}", path.display()))
    }

    /// Executes every task in order.
    ///
    /// A failed task does not stop the tasks after it; they target other files. The report lists
    /// every outcome and every failure with the identity of its task.
    pub fn run(&mut self, services: &Services<'_>) -> RunReport {
        let mut report = RunReport::default();

        for task in &mut self.tasks {
            match task.execute(services) {
                Ok(outcome) => report.outcomes.push((task.type_id(), outcome)),
                Err(e) => {
                    warn!("{} failed: {e}", task.type_id());
                    report.failures.push((task.type_id(), e));
                }
            }
        }

        info!(
            "Workflow finished: {} succeeded, {} failed",
            report.outcomes.len(),
            report.failures.len(),
        );
        report
    }

    /// Returns each task's identity and whether the store has it marked completed.
    pub fn status(&self, store: &dyn CompletionStore) -> crate::Result<Vec<(String, bool)>> {
        self.tasks
            .iter()
            .map(|task| {
                let type_id = task.type_id();
                let done = store.is_completed(&type_id)?;
                Ok((type_id, done))
            })
            .collect()
    }
}
