use std::env;
use std::path::PathBuf;

/// Environment variable that relocates [config_dir].
pub const CONFIG_DIR_VAR: &str = "SSH_SETUP_CONFIG_DIR";

/// Returns the user's SSH directory, `~/.ssh`.
///
/// If the home directory cannot be determined, falls back to a relative `.ssh` so that
/// constructing a task never fails; the first filesystem operation will report the problem.
pub fn default_ssh_dir() -> PathBuf {
    let mut path = home::home_dir().unwrap_or_default();
    path.push(".ssh");
    path
}

/// Returns a [PathBuf] to the directory where ssh-setup keeps its own state.
///
/// This is `$SSH_SETUP_CONFIG_DIR` if set, otherwise `~/.config/ssh-setup`.
pub fn config_dir() -> PathBuf {
    // Omit the leading slash so that PathBuf::push appends instead of replacing.
    const CONFIG_DIR: &str = ".config/ssh-setup";

    if let Some(dir) = env::var_os(CONFIG_DIR_VAR).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }

    let mut path = home::home_dir().unwrap_or_default();
    path.push(CONFIG_DIR);
    path
}
