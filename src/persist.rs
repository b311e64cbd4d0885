// Atomic file publication. Every persisted artifact goes through the same
// protocol: write a temp file, verify it, back up the target, rename the
// temp over it, drop the backup. A concurrent reader sees either the old
// or the new content, never a partial file.
//
// All artifacts are chmod 0666 so a differently-privileged display reader
// can consume them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, Result};

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Relaxes permissions to 0666. Best-effort; failure is logged, not fatal.
pub fn set_world_rw(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o666)) {
            tracing::debug!(path = %path.display(), error = %e, "chmod 0666 failed");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Checks that a directory exists and is writable; returns
/// `DirectoryUnwritable` with permission detail otherwise.
pub fn check_dir_writable(dir: &Path) -> Result<()> {
    let meta = fs::metadata(dir).map_err(|e| PipelineError::DirectoryUnwritable {
        path: dir.display().to_string(),
        detail: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(PipelineError::DirectoryUnwritable {
            path: dir.display().to_string(),
            detail: "not a directory".into(),
        });
    }
    let probe = dir.join(".gpumon-probe");
    match fs::OpenOptions::new().create(true).append(true).open(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(PipelineError::DirectoryUnwritable {
            path: dir.display().to_string(),
            detail: format!("{} (mode {:o})", e, permissions_mode(&meta)),
        }),
    }
}

fn permissions_mode(meta: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}

/// Atomically replaces `path` with `bytes`.
///
/// Steps: write `<name>.tmp` and fsync, verify non-empty, copy any
/// existing target to `<name>.bak`, rename tmp over target, delete the
/// backup. On verification failure the temp file is removed and the
/// previous target is untouched.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let wf = |e: std::io::Error| PipelineError::write_failure(path.display().to_string(), e);

    if bytes.is_empty() {
        return Err(wf(std::io::Error::other("refusing to publish empty content")));
    }

    let tmp = sibling(path, ".tmp");
    let bak = sibling(path, ".bak");

    let mut f = fs::File::create(&tmp).map_err(wf)?;
    f.write_all(bytes).map_err(wf)?;
    f.sync_all().map_err(wf)?;
    drop(f);

    // Verify the temp file landed with content before touching the target.
    let tmp_len = fs::metadata(&tmp).map(|m| m.len()).unwrap_or(0);
    if tmp_len == 0 {
        let _ = fs::remove_file(&tmp);
        return Err(wf(std::io::Error::other("temp file empty after write")));
    }

    if path.exists()
        && let Err(e) = fs::copy(path, &bak)
    {
        let _ = fs::remove_file(&tmp);
        return Err(wf(e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        // Target was never replaced; the old file is still valid.
        let _ = fs::remove_file(&tmp);
        let _ = fs::remove_file(&bak);
        return Err(wf(e));
    }

    let _ = fs::remove_file(&bak);
    set_world_rw(path);
    Ok(())
}

/// Serializes `value` as pretty JSON and publishes it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
        PipelineError::write_failure(path.display().to_string(), std::io::Error::other(e))
    })?;
    atomic_write(path, &bytes)
}

/// Restores `<name>.bak` over a missing target. Startup-time repair for a
/// crash between backup and rename.
pub fn restore_backup_if_needed(path: &Path) -> Result<bool> {
    let bak = sibling(path, ".bak");
    if !path.exists() && bak.exists() {
        fs::rename(&bak, path)
            .map_err(|e| PipelineError::write_failure(path.display().to_string(), e))?;
        tracing::warn!(path = %path.display(), "restored target from backup");
        return Ok(true);
    }
    // A stale backup next to a valid target is leftover from a crash
    // after rename; drop it.
    if bak.exists() {
        let _ = fs::remove_file(&bak);
    }
    Ok(false)
}

/// Appends raw bytes to `path` (creating it 0666) and fsyncs.
pub fn append_durable(path: &Path, bytes: &[u8]) -> Result<()> {
    let wf = |e: std::io::Error| PipelineError::write_failure(path.display().to_string(), e);
    let created = !path.exists();
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wf)?;
    f.write_all(bytes).map_err(wf)?;
    f.sync_all().map_err(wf)?;
    if created {
        set_world_rw(path);
    }
    Ok(())
}
