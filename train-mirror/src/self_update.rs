//! Compares the running executable with the copy published on the mirrors
//! and, after confirmation, replaces it.
//!
//! The published copy is fetched under the executable's file name from the
//! mirror root. Not being able to fetch it, or to read the local file, means
//! no update is possible and is not an error.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};
use train_mirror_core::contract::Fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No published copy could be fetched, or the local file is unreadable.
    Unavailable,
    UpToDate,
    Updated,
    Declined,
}

pub async fn check_for_update<F, R, W>(
    fetcher: &F,
    current: &Path,
    mut prompt: R,
    mut out: W,
    assume_yes: bool,
) -> Result<UpdateOutcome>
where
    F: Fetcher + ?Sized,
    R: BufRead,
    W: Write,
{
    let Some(name) = current.file_name().and_then(|name| name.to_str()) else {
        warn!(path = %current.display(), "[UPDATE] Executable has no usable file name");
        return Ok(UpdateOutcome::Unavailable);
    };

    let published = match fetcher.fetch_bytes(name).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(executable = name, error = %e, "[UPDATE] Could not fetch published copy");
            return Ok(UpdateOutcome::Unavailable);
        }
    };

    let local = match fs::read(current) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %current.display(), error = %e, "[UPDATE] Could not read local copy");
            return Ok(UpdateOutcome::Unavailable);
        }
    };

    if local == published {
        info!(executable = name, "[UPDATE] Up to date");
        return Ok(UpdateOutcome::UpToDate);
    }

    writeln!(out, "Update is available")?;
    if !assume_yes {
        write!(out, "Perform update? (yes/NO) ")?;
        out.flush()?;
        let mut answer = String::new();
        prompt
            .read_line(&mut answer)
            .context("Failed to read answer from prompt")?;
        let answer = answer.trim().to_ascii_lowercase();
        if answer != "y" && answer != "yes" {
            info!(executable = name, "[UPDATE] Update declined");
            return Ok(UpdateOutcome::Declined);
        }
    }

    replace(current, name, &published)?;
    info!(executable = name, bytes = published.len(), "[UPDATE] Replaced executable");
    writeln!(out, "Updated {}", current.display())?;
    Ok(UpdateOutcome::Updated)
}

/// Writes a sibling file and renames it over `current`, so a running
/// executable is never truncated in place. The sibling is removed again if
/// the swap fails.
fn replace(current: &Path, name: &str, contents: &[u8]) -> Result<()> {
    let staging = current.with_file_name(format!(".{name}.update"));
    let result = stage_and_swap(current, &staging, contents);
    if result.is_err() {
        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %staging.display(), error = %e, "[UPDATE] Failed to remove staged update");
            }
        }
    }
    result
}

fn stage_and_swap(current: &Path, staging: &Path, contents: &[u8]) -> Result<()> {
    let permissions = fs::metadata(current)
        .with_context(|| format!("Failed to stat {}", current.display()))?
        .permissions();
    fs::write(staging, contents)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    fs::set_permissions(staging, permissions)
        .with_context(|| format!("Failed to set permissions on {}", staging.display()))?;
    fs::rename(staging, current)
        .with_context(|| format!("Failed to replace {}", current.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn failed_swap_leaves_no_staged_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be replaced by a rename.
        let current = dir.path().join("train-mirror");
        fs::create_dir(&current).unwrap();
        fs::write(current.join("keep"), b"x").unwrap();

        let err = replace(&current, "train-mirror", b"v2").unwrap_err();

        assert!(format!("{err:#}").contains("Failed to replace"), "got: {err:#}");
        assert!(!dir.path().join(".train-mirror.update").exists());
        assert!(current.join("keep").exists());
    }

    #[test]
    fn swap_keeps_permissions_of_the_replaced_file() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("train-mirror");
        fs::write(&current, b"v1").unwrap();
        let mut permissions = fs::metadata(&current).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&current, permissions).unwrap();

        replace(&current, "train-mirror", b"v2").unwrap();

        assert_eq!(fs::read(&current).unwrap(), b"v2");
        assert!(fs::metadata(&current).unwrap().permissions().readonly());
        assert!(!dir.path().join(".train-mirror.update").exists());
    }
}
