//! Runs a task against the user's default SSH directory with `HOME` pointed at a scratch
//! directory.
//!
//! This file holds a single test because it changes the process environment.

use ssh_setup::core::{Outcome, Services, SshTask};
use ssh_setup::crypto::Ed25519Generator;
use ssh_setup::store::{CompletionStore, FileStore};
use ssh_setup::trust::{OpenSshTrust, TrustRegistrar};
use std::cell::RefCell;
use std::env;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    hosts: RefCell<Vec<String>>,
    keys: RefCell<Vec<(String, String)>>,
}

impl TrustRegistrar for Recorder {
    fn register_known_host(&self, host: &str) -> ssh_setup::Result<()> {
        self.hosts.borrow_mut().push(host.to_string());
        Ok(())
    }

    fn submit_public_key(&self, host: &str, public_key: &str) -> ssh_setup::Result<()> {
        self.keys
            .borrow_mut()
            .push((host.to_string(), public_key.to_string()));
        Ok(())
    }
}

#[test]
fn default_directory_registers_trust() {
    let home = TempDir::new().unwrap();
    env::set_var("HOME", home.path());
    let ssh_dir = home.path().join(".ssh");

    assert_eq!(ssh_dir.join("known_hosts"), OpenSshTrust::new().path());

    let store = FileStore::new(home.path().join("completed.yaml"));
    let trust = Recorder::default();
    let services = Services {
        keys: &Ed25519Generator,
        store: &store,
        trust: &trust,
        upload: true,
    };

    let mut task = SshTask::new("1", "alice", "github.com");
    assert!(!task.is_isolated());
    assert_eq!(ssh_dir, task.ssh_dir());
    assert_eq!(Outcome::Completed, task.execute(&services).unwrap());

    assert!(ssh_dir.join("alice-github.com.prv").is_file());
    assert_eq!(vec!["github.com".to_string()], *trust.hosts.borrow());
    assert_eq!(
        vec![("github.com".to_string(), task.public_key().to_string())],
        *trust.keys.borrow(),
    );
    assert!(store.is_completed("setup-git-ssh[1]").unwrap());

    // Naming the default directory explicitly is not an isolated run.
    let explicit = SshTask::with_ssh_dir("2", "alice", "gitlab.com", &ssh_dir);
    assert!(!explicit.is_isolated());
}
