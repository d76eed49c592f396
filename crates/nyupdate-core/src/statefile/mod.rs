//! Persistence for the daemon's `key @ value` state files.
//!
//! Feed watermarks and the retry queue share one plain-text format (see
//! [`line`]). Comment lines are carried across rewrites so operators can
//! annotate the feeds file by hand.
//!
//! # Atomic Writes
//!
//! Saves use the temp file + rename pattern:
//! 1. Write the full new content to `{path}.tmp` and fsync it
//! 2. Rename `{path}.tmp` to `{path}`
//! 3. Fsync the parent directory so the rename itself is durable
//!
//! A crash or error at any step leaves the previous file intact.

pub mod line;

pub use line::{Line, format_entry, parse_line};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use snafu::prelude::*;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::emit;
use crate::error::{OpenSnafu, ReadSnafu, RenameSnafu, StateFileError, SyncSnafu, WriteSnafu};
use crate::metrics::events::{RequestStatus, StateSaved};

/// Parsed content of a state file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFile {
    /// Comment lines in file order, verbatim.
    pub comments: Vec<String>,
    /// Entries in file order. A repeated key keeps its last value.
    pub entries: IndexMap<String, u64>,
}

impl StateFile {
    /// Parse file content, logging every invalid line against `origin`.
    pub fn parse(content: &str, origin: &Path) -> Self {
        let mut state = StateFile::default();
        for raw in content.lines() {
            match parse_line(raw) {
                Line::Blank => {}
                Line::Comment(comment) => state.comments.push(comment),
                Line::Entry { key, value } => {
                    state.entries.insert(key, value);
                }
                Line::Invalid { raw } => {
                    warn!(file = %origin.display(), "Line: {raw} in {} is invalid!", origin.display());
                }
            }
        }
        state
    }
}

/// Load a state file.
///
/// Invalid lines are reported and skipped. Failing to open or read the file
/// is an error.
pub async fn load(path: &Path) -> Result<StateFile, StateFileError> {
    let content = read_to_string(path).await?;
    let state = StateFile::parse(&content, path);
    debug!(
        file = %path.display(),
        entries = state.entries.len(),
        comments = state.comments.len(),
        "Loaded state file"
    );
    Ok(state)
}

/// Load a state file, treating a missing file as empty.
pub async fn load_optional(path: &Path) -> Result<StateFile, StateFileError> {
    match load(path).await {
        Ok(state) => Ok(state),
        Err(e) if e.is_not_found() => {
            debug!(file = %path.display(), "State file does not exist yet, starting empty");
            Ok(StateFile::default())
        }
        Err(e) => Err(e),
    }
}

/// Atomically replace `path` with the given entries.
///
/// With `preserve_comments`, comment lines of the current file are written
/// first, in order, followed by one blank separator line.
pub async fn save<'a, I>(path: &Path, entries: I, preserve_comments: bool) -> Result<(), StateFileError>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let result = save_inner(path, entries, preserve_comments).await;

    emit!(StateSaved {
        file: file_label(path),
        status: if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        },
    });

    result
}

async fn save_inner<'a, I>(path: &Path, entries: I, preserve_comments: bool) -> Result<(), StateFileError>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let comments = if preserve_comments {
        existing_comments(path).await?
    } else {
        Vec::new()
    };

    let mut content = String::new();
    for comment in &comments {
        content.push_str(comment);
        content.push('\n');
    }
    content.push('\n');
    let mut count = 0usize;
    for (key, value) in entries {
        content.push_str(&format_entry(key, value));
        content.push('\n');
        count += 1;
    }

    atomic_write(path, content.as_bytes()).await?;

    debug!(file = %path.display(), entries = count, "Saved state file");
    Ok(())
}

/// Append one line to a log-style file, creating it if needed.
///
/// The write is fsynced before returning.
pub async fn append_line(path: &Path, line: &str) -> Result<(), StateFileError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context(WriteSnafu { path })?;

    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');

    file.write_all(record.as_bytes())
        .await
        .context(WriteSnafu { path })?;
    file.sync_all().await.context(SyncSnafu { path })?;
    Ok(())
}

/// Write `content` to `{path}.tmp`, then rename it over `path`.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), StateFileError> {
    let temp_path = temp_path(path);

    let mut file = File::create(&temp_path)
        .await
        .context(WriteSnafu { path: &temp_path })?;
    file.write_all(content)
        .await
        .context(WriteSnafu { path: &temp_path })?;
    file.sync_all()
        .await
        .context(SyncSnafu { path: &temp_path })?;
    drop(file);

    fs::rename(&temp_path, path).await.context(RenameSnafu {
        from: &temp_path,
        to: path,
    })?;

    let dir = parent_dir(path);
    let dir_handle = File::open(&dir).await.context(SyncSnafu { path: &dir })?;
    dir_handle.sync_all().await.context(SyncSnafu { path: &dir })?;

    Ok(())
}

/// Sibling path used while a save is in progress.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Comment lines of the current file, without re-reporting invalid lines.
async fn existing_comments(path: &Path) -> Result<Vec<String>, StateFileError> {
    let content = match read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(content
        .lines()
        .filter_map(|raw| match parse_line(raw) {
            Line::Comment(comment) => Some(comment),
            _ => None,
        })
        .collect())
}

async fn read_to_string(path: &Path) -> Result<String, StateFileError> {
    use tokio::io::AsyncReadExt;

    let mut file = File::open(path).await.context(OpenSnafu { path })?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .await
        .context(ReadSnafu { path })?;
    Ok(content)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
