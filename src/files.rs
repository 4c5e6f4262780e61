//! Writes key material to disk with the right permissions.

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Mode for private key files: owner read and write only.
pub const PRIVATE_MODE: u32 = 0o600;

/// Writes a private key, readable and writable by the owner only.
///
/// On Unix, a new file is created with mode `0600` in the same `open(2)` call, so it is never
/// group or world readable. If the file already exists, its mode is tightened before the new
/// contents are written.
pub fn write_private(path: &Path, contents: &str) -> Result<()> {
    ensure_ascii(path, contents)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_MODE);
    }

    let mut file = options.open(path).map_err(|source| Error::WriteKey {
        path: path.to_owned(),
        source,
    })?;

    // The mode passed to open(2) only applies when the file is created, and it is filtered by
    // the umask, so always set it explicitly as well.
    restrict(path, &file)?;

    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| Error::WriteKey {
            path: path.to_owned(),
            source,
        })
}

/// Writes a public key with default permissions.
pub fn write_public(path: &Path, contents: &str) -> Result<()> {
    ensure_ascii(path, contents)?;
    fs::write(path, contents).map_err(|source| Error::WriteKey {
        path: path.to_owned(),
        source,
    })
}

#[cfg(unix)]
fn restrict(path: &Path, file: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(PRIVATE_MODE))
        .map_err(|source| Error::Permissions {
            path: path.to_owned(),
            source,
        })
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _file: &fs::File) -> Result<()> {
    Ok(())
}

// Key files are written as US-ASCII; anything else means the generator broke its contract.
fn ensure_ascii(path: &Path, contents: &str) -> Result<()> {
    if contents.is_ascii() {
        return Ok(());
    }
    Err(Error::WriteKey {
        path: path.to_owned(),
        source: io::Error::new(
            io::ErrorKind::InvalidData,
            "key text is not US-ASCII encodable",
        ),
    })
}
