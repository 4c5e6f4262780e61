//! Establishes trust with remote hosts: `known_hosts` registration and public key submission.

use crate::client;
use crate::config;
use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Adds hosts to the client's trust store and hands public keys to the hosting provider.
pub trait TrustRegistrar {
    /// Adds `host` to the known-hosts trust store. Doing so for a host that is already trusted
    /// must succeed without changes.
    fn register_known_host(&self, host: &str) -> Result<()>;

    /// Submits `public_key` to the git hosting provider behind `host`.
    ///
    /// Registrars that cannot talk to a provider keep the default, which fails.
    fn submit_public_key(&self, host: &str, _public_key: &str) -> Result<()> {
        Err(Error::Trust {
            host: host.to_string(),
            reason: "public key upload is not supported by this registrar".to_string(),
        })
    }
}

/// Registers hosts in an OpenSSH `known_hosts` file using `ssh-keyscan`.
#[derive(Clone, Debug)]
pub struct OpenSshTrust {
    known_hosts: PathBuf,
}

impl Default for OpenSshTrust {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSshTrust {
    /// Creates a registrar for `~/.ssh/known_hosts`.
    pub fn new() -> Self {
        Self::with_path(config::default_ssh_dir().join("known_hosts"))
    }

    /// Creates a registrar for an arbitrary `known_hosts` file.
    pub fn with_path(known_hosts: impl Into<PathBuf>) -> Self {
        OpenSshTrust {
            known_hosts: known_hosts.into(),
        }
    }

    /// The `known_hosts` file this registrar maintains.
    pub fn path(&self) -> &Path {
        &self.known_hosts
    }

    /// Returns whether `known_hosts` already has a plain-text entry for `host`.
    pub fn is_known(&self, host: &str) -> Result<bool> {
        match fs::read_to_string(&self.known_hosts) {
            Ok(text) => Ok(contains_host(&text, host)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                let reason = format!("cannot read {}: {e}", self.known_hosts.display());
                Err(self.error(host, reason))
            }
        }
    }

    /// Appends `keys` (lines in `known_hosts` format) to the file, creating it if needed.
    fn append(&self, host: &str, keys: &[&str]) -> Result<()> {
        if let Some(parent) = self.known_hosts.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.error(host, format!("cannot create {}: {e}", parent.display())))?;
        }

        let mut text = String::new();
        if needs_separator(&self.known_hosts) {
            text.push('\n');
        }
        for key in keys {
            text.push_str(key);
            text.push('\n');
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.known_hosts)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .map_err(|e| {
                let reason = format!("cannot write {}: {e}", self.known_hosts.display());
                self.error(host, reason)
            })
    }

    fn error(&self, host: &str, reason: String) -> Error {
        Error::Trust {
            host: host.to_string(),
            reason,
        }
    }
}

impl TrustRegistrar for OpenSshTrust {
    fn register_known_host(&self, host: &str) -> Result<()> {
        if self.is_known(host)? {
            debug!("{host} is already in {}", self.known_hosts.display());
            return Ok(());
        }

        let scanned = client::output("ssh-keyscan", &[host])
            .map_err(|e| self.error(host, format!("{e:#}")))?;
        let keys = host_key_lines(&scanned);
        if keys.is_empty() {
            return Err(self.error(host, "ssh-keyscan returned no host keys".to_string()));
        }

        self.append(host, &keys)?;
        info!(
            "Added {} host key(s) for {host} to {}",
            keys.len(),
            self.known_hosts.display(),
        );
        Ok(())
    }
}

/// Returns the key lines from `ssh-keyscan` output, dropping comments and blank lines.
fn host_key_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Returns whether a `known_hosts` document lists `host` in plain text.
///
/// Hashed entries (`|1|...`) and `@revoked` markers are not matched.
fn contains_host(known_hosts: &str, host: &str) -> bool {
    known_hosts
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next()? {
                "@revoked" => None,
                "@cert-authority" => fields.next(),
                names => Some(names),
            }
        })
        .any(|names| {
            names
                .split(',')
                .any(|name| name.eq_ignore_ascii_case(host))
        })
}

// Whether an existing, non-empty file lacks a trailing newline.
fn needs_separator(path: &Path) -> bool {
    match fs::read(path) {
        Ok(bytes) => !bytes.is_empty() && !bytes.ends_with(b"\n"),
        Err(_) => false,
    }
}
