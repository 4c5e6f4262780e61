use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use ssh_setup::core::{Outcome, Services, SshTask, Workflow};
use ssh_setup::crypto::{self, Ed25519Generator};
use ssh_setup::logger;
use ssh_setup::store::FileStore;
use ssh_setup::trust::OpenSshTrust;
use std::path::PathBuf;

/// Generates per-host SSH keys and registers them with the SSH client.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Log decision points as well as side effects.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Completion store file. Defaults to ~/.config/ssh-setup/completed.yaml.
    #[arg(long, global = true, value_name = "FILE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs a single task.
    Run {
        /// Task identifier; a task with an identifier that already completed is skipped.
        #[arg(long, default_value = "1")]
        id: String,

        /// Login name on the host.
        #[arg(long)]
        name: String,

        /// Host name, e.g. github.com.
        #[arg(long)]
        host: String,

        /// Use this directory instead of ~/.ssh. Skips known_hosts registration.
        #[arg(long, value_name = "DIR")]
        ssh_dir: Option<PathBuf>,

        /// Submit the public key to the git hosting provider.
        #[arg(long)]
        upload: bool,
    },

    /// Runs every task in a workflow file.
    Apply {
        workflow: PathBuf,

        /// Submit the public keys to the git hosting providers.
        #[arg(long)]
        upload: bool,
    },

    /// Shows which tasks of a workflow file have completed.
    Status { workflow: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let store = match cli.state {
        Some(path) => FileStore::new(path),
        None => FileStore::open_default(),
    };
    let trust = OpenSshTrust::new();

    match cli.command {
        Command::Run {
            id,
            name,
            host,
            ssh_dir,
            upload,
        } => {
            crypto::ensure_provider_available()?;
            let mut task = match ssh_dir {
                Some(dir) => SshTask::with_ssh_dir(id, name, host, dir),
                None => SshTask::new(id, name, host),
            };
            let services = Services {
                keys: &Ed25519Generator,
                store: &store,
                trust: &trust,
                upload,
            };
            match task.execute(&services) {
                Ok(Outcome::Skipped) => println!("{}: already done", task.type_id()),
                Ok(Outcome::Completed) => {
                    println!("{}: done", task.type_id());
                    print!("{}", task.public_key());
                }
                Err(e) => return Err(anyhow!("{} failed: {e}", task.type_id())),
            }
        }
        Command::Apply { workflow, upload } => {
            crypto::ensure_provider_available()?;
            let mut workflow = Workflow::from_file(&workflow)?;
            let services = Services {
                keys: &Ed25519Generator,
                store: &store,
                trust: &trust,
                upload,
            };
            let report = workflow.run(&services);
            for (type_id, outcome) in &report.outcomes {
                println!("{type_id}: {}", describe(*outcome));
            }
            for (type_id, error) in &report.failures {
                eprintln!("{type_id} failed: {error}");
            }
            if !report.is_success() {
                bail!("{} task(s) failed", report.failures.len());
            }
        }
        Command::Status { workflow } => {
            let workflow = Workflow::from_file(&workflow)?;
            let read_failed = || format!("failed to read {}", store.path().display());
            let completed: IndexMap<_, _> =
                store.completed().with_context(read_failed)?.into_iter().collect();
            for (type_id, done) in workflow.status(&store).with_context(read_failed)? {
                match completed.get(&type_id) {
                    Some(at) if done => println!("{type_id}: completed {}", at.to_rfc3339()),
                    _ => println!("{type_id}: pending"),
                }
            }
        }
    }
    Ok(())
}

fn describe(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Skipped => "already done",
        Outcome::Completed => "done",
    }
}
