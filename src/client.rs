//! Runs OpenSSH helper programs as child processes.

use anyhow::{bail, Context};
use shlex::Quoter;
use std::ffi::OsStr;
use std::process::{Command, Stdio};

/// Renders a command line for error messages, quoting where needed.
fn command_line<C: AsRef<OsStr>, A: AsRef<OsStr>>(cmd: C, args: &[A]) -> String {
    let mut components = Vec::with_capacity(args.len() + 1);
    components.push(cmd.as_ref().to_string_lossy().to_string());
    components.extend(
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().to_string()),
    );

    // Try to use shlex to properly quote the string. If that fails, naively join with spaces.
    match Quoter::new().join(components.iter().map(|s| &s[..])) {
        Ok(s) => s,
        Err(_) => components.join(" "),
    }
}

/// Runs a command, waits for it, and returns what it wrote to standard output.
///
/// Standard input is closed. Standard error is captured and included in the error if the command
/// fails.
///
/// # Errors
///
/// Returns an error if the command cannot be started, exits with an error, or writes output that
/// is not UTF-8.
pub fn output<C: AsRef<OsStr>, A: AsRef<OsStr>>(cmd: C, args: &[A]) -> anyhow::Result<String> {
    let output = Command::new(&cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to start command: {}", command_line(&cmd, args)))?;

    if !output.status.success() {
        let error = match output.status.code() {
            Some(i) => format!("exit code {i}"),
            None => "error".to_string(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "command exited with {error}: {}\n{}",
            command_line(&cmd, args),
            stderr.trim_end(),
        );
    }

    String::from_utf8(output.stdout)
        .with_context(|| format!("command wrote non-UTF-8 output: {}", command_line(&cmd, args)))
}

#[cfg(test)]
mod test;
