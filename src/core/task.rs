//! The SSH setup task: generates a key pair for one user and host and wires it into the SSH client.

use crate::config;
use crate::core::ssh_config::{self, AppendOutcome, HostBlock};
use crate::crypto::KeyGenerator;
use crate::error::{Error, FieldError, Result};
use crate::files;
use crate::store::CompletionStore;
use crate::trust::TrustRegistrar;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, info, info_span};

/// The task type, used as the prefix of [SshTask::type_id].
pub const TYPE: &str = "setup-git-ssh";

/// Name of the client configuration file inside the SSH directory.
pub const CONFIG_FILE: &str = "config";

/// Extension of the private key file.
pub const PRIVATE_KEY_EXTENSION: &str = "prv";

/// Extension of the public key file.
pub const PUBLIC_KEY_EXTENSION: &str = "pub";

/// Where an [SshTask] is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    NotStarted,
    Running,

    /// The completion store reported that this identity had already completed.
    Skipped,
    Completed,
    Failed,
}

/// The successful results of [SshTask::execute].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was done because the task had completed in an earlier run.
    Skipped,

    /// Keys were generated and registered.
    Completed,
}

/// The collaborators an [SshTask] needs to run.
pub struct Services<'a> {
    pub keys: &'a dyn KeyGenerator,
    pub store: &'a dyn CompletionStore,
    pub trust: &'a dyn TrustRegistrar,

    /// Whether to submit the public key to the git hosting provider after trusting the host.
    pub upload: bool,
}

/// Generates a key pair for `name` at `host` and adds it to the SSH client configuration.
///
/// Running the task writes, under [Self::ssh_dir]:
///
/// - `<name>-<host>.prv`, the private key, readable and writable by the owner only;
/// - `<name>-<host>.pub`, the public key;
/// - a `Host <host>` block appended to `config`.
///
/// When the SSH directory is the user's default one, the host is also added to `known_hosts`.
///
/// The task is at-most-once per identity: once [Self::type_id] is marked completed in the
/// [CompletionStore], further executions do nothing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SshTask {
    id: String,
    name: String,
    host: String,

    /// Empty until the first successful execution.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    public_key: String,

    #[serde(skip, default = "config::default_ssh_dir")]
    ssh_dir: PathBuf,

    // Resolved once at construction; compared with `ssh_dir` to detect isolated runs.
    #[serde(skip, default = "config::default_ssh_dir")]
    default_ssh_dir: PathBuf,

    #[serde(skip)]
    state: TaskState,
}

impl SshTask {
    /// Creates a task that works in the user's SSH directory, `~/.ssh`.
    pub fn new(id: impl Into<String>, name: impl Into<String>, host: impl Into<String>) -> Self {
        let default = config::default_ssh_dir();
        Self::build(id.into(), name.into(), host.into(), default.clone(), default)
    }

    /// Creates a task that works in `ssh_dir` instead of the user's SSH directory.
    ///
    /// Unless `ssh_dir` is the default directory, the task runs isolated: `known_hosts` is not
    /// touched and no public key is submitted.
    pub fn with_ssh_dir(
        id: impl Into<String>,
        name: impl Into<String>,
        host: impl Into<String>,
        ssh_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::build(
            id.into(),
            name.into(),
            host.into(),
            ssh_dir.into(),
            config::default_ssh_dir(),
        )
    }

    fn build(
        id: String,
        name: String,
        host: String,
        ssh_dir: PathBuf,
        default_ssh_dir: PathBuf,
    ) -> Self {
        SshTask {
            id,
            name,
            host,
            public_key: String::new(),
            ssh_dir,
            default_ssh_dir,
            state: TaskState::NotStarted,
        }
    }

    /// Points a deserialized task at another SSH directory.
    pub fn set_ssh_dir(&mut self, ssh_dir: impl Into<PathBuf>) -> Result<()> {
        self.ensure_unlocked("ssh_dir")?;
        self.ssh_dir = ssh_dir.into();
        Ok(())
    }

    /// The identifier distinguishing instances of this task type within one workflow.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.ensure_unlocked("id")?;
        self.id = id.into();
        Ok(())
    }

    /// The user's login name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_unlocked("name")?;
        self.name = name.into();
        Ok(())
    }

    /// The host name, e.g. `github.com`.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<()> {
        self.ensure_unlocked("host")?;
        self.host = host.into();
        Ok(())
    }

    /// The generated public key, or an empty string if the task has not completed.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Whether the task runs against a directory other than the user's SSH directory.
    pub fn is_isolated(&self) -> bool {
        self.ssh_dir != self.default_ssh_dir
    }

    /// The task type.
    pub fn task_type(&self) -> &'static str {
        TYPE
    }

    /// The task identity, `setup-git-ssh[<id>]`. Used for log correlation and as the key in the
    /// [CompletionStore].
    pub fn type_id(&self) -> String {
        format!("{TYPE}[{}]", self.id)
    }

    /// The key file name without extension, `<name>-<host>`.
    pub fn key_filename(&self) -> String {
        format!("{}-{}", self.name, self.host)
    }

    pub fn private_key_file(&self) -> PathBuf {
        self.key_file(PRIVATE_KEY_EXTENSION)
    }

    pub fn public_key_file(&self) -> PathBuf {
        self.key_file(PUBLIC_KEY_EXTENSION)
    }

    pub fn config_file(&self) -> PathBuf {
        self.ssh_dir.join(CONFIG_FILE)
    }

    fn key_file(&self, extension: &str) -> PathBuf {
        self.ssh_dir.join(format!("{}.{extension}", self.key_filename()))
    }

    fn ensure_unlocked(&self, field: &'static str) -> Result<()> {
        if self.state == TaskState::NotStarted {
            return Ok(());
        }
        Err(Error::Locked {
            type_id: self.type_id(),
            field,
        })
    }

    /// Checks the task inputs, reporting every field that is unusable.
    ///
    /// `name` and `host` become part of a file name and of a config-file token, so besides being
    /// non-empty they may not contain white space or path separators. `name` is also the key
    /// comment, which must be US-ASCII.
    pub fn validate(&self) -> Result<()> {
        static HOST: OnceLock<Regex> = OnceLock::new();
        let host_pattern = HOST.get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?$").unwrap()
        });

        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push(FieldError::new("id", "must not be empty"));
        }

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        } else if let Some(reason) = unsafe_file_component(&self.name) {
            errors.push(FieldError::new("name", reason));
        }

        if self.host.trim().is_empty() {
            errors.push(FieldError::new("host", "must not be empty"));
        } else if !host_pattern.is_match(&self.host) {
            errors.push(FieldError::new(
                "host",
                format!("is not a valid host name: {:?}", self.host),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Runs the task.
    ///
    /// In order: checks the [CompletionStore] and returns [Outcome::Skipped] without side effects
    /// if this identity already completed; creates the SSH directory; generates a key pair;
    /// writes the private key (owner-only) and the public key; appends the host block to
    /// `config`; registers the host as known (and submits the public key if
    /// [Services::upload]) unless the task [is isolated](Self::is_isolated); finally marks the
    /// identity completed and stores the public key.
    ///
    /// # Errors
    ///
    /// Validation errors leave the task in [TaskState::NotStarted] so its inputs can be fixed.
    /// Any other error leaves it in [TaskState::Failed]. Files written before the failure stay
    /// in place and the identity is not marked completed.
    pub fn execute(&mut self, services: &Services<'_>) -> Result<Outcome> {
        let span = info_span!("task", type_id = %self.type_id());
        let _entered = span.enter();

        self.validate()?;

        self.state = TaskState::Running;
        match self.run(services) {
            Ok(outcome) => {
                self.state = match outcome {
                    Outcome::Skipped => TaskState::Skipped,
                    Outcome::Completed => TaskState::Completed,
                };
                Ok(outcome)
            }
            Err(e) => {
                self.state = TaskState::Failed;
                error!("SSH git setup failed: {e}");
                Err(e)
            }
        }
    }

    fn run(&mut self, services: &Services<'_>) -> Result<Outcome> {
        let type_id = self.type_id();

        if services.store.is_completed(&type_id)? {
            debug!("Task already executed: {type_id}");
            return Ok(Outcome::Skipped);
        }
        debug!("Task not executed: {type_id}");

        self.prepare_dir()?;

        let keys = services.keys.generate(&self.name)?;
        let private_key_file = self.private_key_file();
        let public_key_file = self.public_key_file();
        files::write_private(&private_key_file, &keys.private_key)?;
        files::write_public(&public_key_file, &keys.public_key)?;
        info!(
            "Successfully generated and saved ssh keys: {} {}",
            private_key_file.display(),
            public_key_file.display(),
        );

        self.append_to_config(&private_key_file)?;

        if self.is_isolated() {
            debug!(
                "Skipping trust registration for isolated directory {}",
                self.ssh_dir.display(),
            );
        } else {
            services.trust.register_known_host(&self.host)?;
            if services.upload {
                services
                    .trust
                    .submit_public_key(&self.host, &keys.public_key)?;
                info!("Submitted public key to {}", self.host);
            }
        }

        services.store.mark_completed(&type_id)?;
        self.public_key = keys.public_key;
        info!("Successfully finished SSH git setup");
        Ok(Outcome::Completed)
    }

    /// Creates the SSH directory and any missing parents.
    fn prepare_dir(&self) -> Result<()> {
        if self.ssh_dir.is_dir() {
            return Ok(());
        }
        debug!("Directory does not exist: {}", self.ssh_dir.display());

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&self.ssh_dir)
            .map_err(|source| Error::CreateDir {
                path: self.ssh_dir.clone(),
                source,
            })?;

        debug!("Created directory: {}", self.ssh_dir.display());
        Ok(())
    }

    fn append_to_config(&self, private_key_file: &Path) -> Result<()> {
        let config_file = self.config_file();
        let identity_file =
            std::path::absolute(private_key_file).map_err(|source| Error::AppendConfig {
                path: config_file.clone(),
                source,
            })?;

        let block = HostBlock::new(&self.host, &self.name, identity_file);
        match ssh_config::append_block(&config_file, &block)? {
            AppendOutcome::Appended => {
                info!(
                    "Successfully added entry to ssh config: {}",
                    config_file.display(),
                );
            }
            AppendOutcome::AlreadyPresent => {
                info!(
                    "ssh config {} already has this entry for {}; left unchanged",
                    config_file.display(),
                    self.host,
                );
            }
        }
        Ok(())
    }
}

/// Returns why `value` cannot be used as part of a file name, if it cannot.
fn unsafe_file_component(value: &str) -> Option<&'static str> {
    if value.chars().any(char::is_whitespace) {
        Some("must not contain white space")
    } else if value.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else if !value.is_ascii() {
        Some("must be US-ASCII")
    } else if value == "." || value == ".." {
        Some("must not be a relative directory name")
    } else {
        None
    }
}
