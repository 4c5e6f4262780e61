//! Appends host blocks to an OpenSSH client configuration file.
//!
//! The configuration file is shared with the user and with other tools, so it is only ever
//! appended to: bytes already in the file are never rewritten, reordered, or removed.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The platform's line terminator, used for every line of a rendered block.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// The platform's line terminator, used for every line of a rendered block.
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Indentation of the keywords inside a block.
const INDENT: &str = "    ";

/// Serializes appends to configuration files within this process.
static APPEND_LOCK: Mutex<()> = Mutex::new(());

/// A `Host` stanza binding a host name to a user, connection host name, and identity file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostBlock {
    pub host: String,
    pub user: String,
    pub hostname: String,
    pub identity_file: PathBuf,
}

impl HostBlock {
    /// Builds the block for `user` connecting to `host` with the private key at `identity_file`.
    pub fn new(host: &str, user: &str, identity_file: impl Into<PathBuf>) -> Self {
        HostBlock {
            host: host.to_string(),
            user: user.to_string(),
            hostname: host.to_string(),
            identity_file: identity_file.into(),
        }
    }

    /// Renders the block with [LINE_ENDING] after every line, including the last.
    ///
    /// ```
    /// # use ssh_setup::core::ssh_config::HostBlock;
    /// let block = HostBlock::new("github.com", "alice", "/home/alice/.ssh/alice-github.com.prv");
    /// assert_eq!(
    ///     block.render("\n"),
    ///     "Host github.com\n    User alice\n    HostName github.com\n    \
    ///      IdentityFile /home/alice/.ssh/alice-github.com.prv\n",
    /// );
    /// ```
    pub fn render(&self, line_ending: &str) -> String {
        let lines = [
            format!("Host {}", self.host),
            format!("{INDENT}User {}", self.user),
            format!("{INDENT}HostName {}", self.hostname),
            format!("{INDENT}IdentityFile {}", quote(&self.identity_file.to_string_lossy())),
        ];

        let mut text = String::new();
        for line in lines {
            text.push_str(&line);
            text.push_str(line_ending);
        }
        text
    }
}

/// Parses every `Host` stanza in `config` that sets `User`, `HostName` and `IdentityFile`.
///
/// Keywords are matched case-insensitively and may be separated from their values by white space
/// or `=`, as OpenSSH allows. Stanzas missing any of the three keywords are ignored, as are
/// `Match` sections and global options.
pub fn parse_blocks(config: &str) -> Vec<HostBlock> {
    #[derive(Default)]
    struct Partial {
        host: String,
        user: Option<String>,
        hostname: Option<String>,
        identity_file: Option<String>,
    }

    fn finish(partial: Option<Partial>, blocks: &mut Vec<HostBlock>) {
        if let Some(Partial {
            host,
            user: Some(user),
            hostname: Some(hostname),
            identity_file: Some(identity_file),
        }) = partial
        {
            blocks.push(HostBlock {
                host,
                user,
                hostname,
                identity_file: identity_file.into(),
            });
        }
    }

    let mut blocks = Vec::new();
    let mut current: Option<Partial> = None;

    for line in config.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (keyword, value) = split_keyword(line);
        match keyword.to_ascii_lowercase().as_str() {
            "host" => {
                finish(current.take(), &mut blocks);
                current = Some(Partial {
                    host: value.to_string(),
                    ..Default::default()
                });
            }
            "match" => finish(current.take(), &mut blocks),
            keyword => {
                if let Some(partial) = current.as_mut() {
                    // The first value obtained for a keyword wins, as in OpenSSH.
                    let slot = match keyword {
                        "user" => &mut partial.user,
                        "hostname" => &mut partial.hostname,
                        "identityfile" => &mut partial.identity_file,
                        _ => continue,
                    };
                    slot.get_or_insert_with(|| value.to_string());
                }
            }
        }
    }
    finish(current, &mut blocks);
    blocks
}

/// Returns whether `config` already contains a stanza equal to `block`.
pub fn contains_block(config: &str, block: &HostBlock) -> bool {
    parse_blocks(config).iter().any(|b| b == block)
}

/// Splits `Keyword value`, `Keyword=value` or `Keyword = value`, removing double quotes around
/// the value.
fn split_keyword(line: &str) -> (&str, &str) {
    let end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    let rest = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(rest);
    (keyword, rest)
}

/// Wraps `value` in double quotes if it contains white space, which OpenSSH would otherwise read
/// as extra arguments.
fn quote(value: &str) -> Cow<'_, str> {
    if value.contains(char::is_whitespace) {
        Cow::Owned(format!("\"{value}\""))
    } else {
        Cow::Borrowed(value)
    }
}

/// What [append_block] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block was written to the end of the file.
    Appended,

    /// An identical block was already present, so the file was left untouched.
    AlreadyPresent,
}

/// Appends `block` to the configuration file at `path`, creating the file if it does not exist.
///
/// Existing content is preserved byte for byte. If the file does not end with a line terminator,
/// one is written first so the new `Host` line starts on its own line. If an identical block is
/// already present the file is not modified.
///
/// Appends from this process are serialized, and the block is written with a single append-mode
/// write so that concurrent writers do not interleave partial blocks.
pub fn append_block(path: &Path, block: &HostBlock) -> Result<AppendOutcome> {
    let _guard = APPEND_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let failed = |source: io::Error| Error::AppendConfig {
        path: path.to_owned(),
        source,
    };

    let existing = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(failed(e)),
    };

    if contains_block(&String::from_utf8_lossy(&existing), block) {
        return Ok(AppendOutcome::AlreadyPresent);
    }

    let mut text = String::new();
    if !existing.is_empty() && !existing.ends_with(b"\n") {
        text.push_str(LINE_ENDING);
    }
    text.push_str(&block.render(LINE_ENDING));

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(failed)?;
    file.write_all(text.as_bytes()).map_err(failed)?;
    file.flush().map_err(failed)?;
    Ok(AppendOutcome::Appended)
}
