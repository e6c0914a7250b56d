// src/transaction.rs

//! Transactional writes into a managed repository
//!
//! A [`FileTransaction`] collects an ordered list of file-mutating events
//! and applies them all-or-nothing. Key properties:
//!
//! - **Backup-before-overwrite**: an existing destination is moved aside
//!   before the new content lands
//! - **Side-car coupling**: each event's digesters write checksum
//!   side-cars in the same event, so a committed artifact never exists
//!   without its side-cars
//! - **Reverse-order unwind**: the first per-event failure rolls back all
//!   previously applied events; a rollback that itself fails surfaces as a
//!   distinct, more severe error
//!
//! # Lifecycle
//!
//! ```text
//! Building -> Committing -> { Committed | RolledBack }
//! ```

use crate::checksum::{self, ChecksumAlgorithm};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Detached side-car extensions carried over from a copy source when a
/// matching companion file exists next to it (e.g. a PGP signature).
const CARRIED_SIDECARS: [&str; 2] = ["asc", "sig"];

/// Transaction state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Events may be added
    Building,
    /// Events are being applied in order
    Committing,
    /// All events applied
    Committed,
    /// Unwound, either explicitly or after a commit failure
    RolledBack,
}

/// Where an event's content comes from
#[derive(Debug)]
enum EventSource {
    Copy(PathBuf),
    Create(Vec<u8>),
}

/// One file-mutating event with its rollback bookkeeping
///
/// The bookkeeping fields are populated during commit and drained by the
/// unwind, which makes rolling back an event that never ran a natural
/// no-op.
#[derive(Debug)]
struct TransactionEvent {
    source: EventSource,
    destination: PathBuf,
    digesters: Vec<ChecksumAlgorithm>,
    /// (original path, backup path) when the destination pre-existed
    backup: Option<(PathBuf, PathBuf)>,
    /// Directories this event created, parent before child
    created_dirs: Vec<PathBuf>,
    /// Files this event wrote, in write order
    written: Vec<PathBuf>,
}

impl TransactionEvent {
    fn new(source: EventSource, destination: PathBuf, digesters: &[ChecksumAlgorithm]) -> Self {
        Self {
            source,
            destination,
            digesters: digesters.to_vec(),
            backup: None,
            created_dirs: Vec::new(),
            written: Vec::new(),
        }
    }
}

/// Ordered, rollback-capable set of file mutations
pub struct FileTransaction {
    id: Uuid,
    state: TransactionState,
    events: Vec<TransactionEvent>,
    /// Holds displaced originals until the transaction settles
    backup_dir: TempDir,
}

impl FileTransaction {
    pub fn new() -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            state: TransactionState::Building,
            events: Vec::new(),
            backup_dir: TempDir::new()?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn check_building(&self, action: &str) -> Result<()> {
        if self.state != TransactionState::Building {
            return Err(Error::Transaction(format!(
                "cannot {} in state {:?}",
                action, self.state
            )));
        }
        Ok(())
    }

    /// Queue a copy of `source` to `destination`
    ///
    /// Each digester produces a checksum side-car during commit; detached
    /// signature side-cars next to `source` are carried over as well.
    pub fn add_copy(
        &mut self,
        source: &Path,
        destination: &Path,
        digesters: &[ChecksumAlgorithm],
    ) -> Result<()> {
        self.check_building("add a copy event")?;
        self.events.push(TransactionEvent::new(
            EventSource::Copy(source.to_path_buf()),
            destination.to_path_buf(),
            digesters,
        ));
        Ok(())
    }

    /// Queue creation of `destination` with the given content
    pub fn add_create(
        &mut self,
        content: Vec<u8>,
        destination: &Path,
        digesters: &[ChecksumAlgorithm],
    ) -> Result<()> {
        self.check_building("add a create event")?;
        self.events.push(TransactionEvent::new(
            EventSource::Create(content),
            destination.to_path_buf(),
            digesters,
        ));
        Ok(())
    }

    /// Apply all events strictly in the order added
    ///
    /// On the first per-event failure every previously applied event is
    /// unwound in reverse order and the commit error is returned wrapped
    /// with the rollback status. A failed unwind returns
    /// [`Error::Rollback`] instead, which callers must treat as fatal.
    pub fn commit(&mut self) -> Result<()> {
        self.check_building("commit")?;
        self.state = TransactionState::Committing;

        for index in 0..self.events.len() {
            let backup_dir = self.backup_dir.path().to_path_buf();
            if let Err(e) = commit_event(&backup_dir, index, &mut self.events[index]) {
                let cause = e.to_string();
                warn!(
                    "transaction {} event {} failed ({}), rolling back",
                    self.id, index, cause
                );
                self.state = TransactionState::RolledBack;
                return match unwind(&mut self.events) {
                    Ok(()) => Err(Error::Commit { cause }),
                    Err(rollback_err) => Err(Error::Rollback {
                        cause,
                        detail: rollback_err.to_string(),
                    }),
                };
            }
        }

        self.state = TransactionState::Committed;
        debug!("transaction {} committed {} events", self.id, self.events.len());
        Ok(())
    }

    /// Explicitly unwind the transaction
    ///
    /// Valid before commit (no-op) or after a commit failure (already
    /// unwound, still a no-op); idempotent. Rolling back a committed
    /// transaction is an error.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Committed => Err(Error::Transaction(
                "cannot roll back a committed transaction".to_string(),
            )),
            _ => {
                self.state = TransactionState::RolledBack;
                unwind(&mut self.events).map_err(|e| Error::Rollback {
                    cause: "explicit rollback requested".to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Move a file, falling back to copy+sync+delete when rename fails
/// (e.g. across filesystems)
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);
            fs::remove_file(src)?;
            Ok(())
        }
    }
}

/// Create the missing ancestors of `dest`, recording each created
/// directory parent-first
fn ensure_parents(dest: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };

    let mut missing = Vec::new();
    let mut current = parent;
    while !current.exists() {
        missing.push(current.to_path_buf());
        match current.parent() {
            Some(p) => current = p,
            None => break,
        }
    }

    for dir in missing.into_iter().rev() {
        fs::create_dir(&dir)?;
        created.push(dir);
    }
    Ok(())
}

/// Write content to `dest` via a temp file in the same directory
fn write_via_temp(
    dest: &Path,
    index: usize,
    write: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<()> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let temp = dest.with_file_name(format!(".{}.{}.part", file_name, index));

    if let Err(e) = write(&temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp, dest) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

/// Apply a single event, recording everything the unwind needs
fn commit_event(backup_dir: &Path, index: usize, event: &mut TransactionEvent) -> Result<()> {
    let dest = event.destination.clone();

    // 1. Move an existing destination aside.
    if dest.exists() {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let backup = backup_dir.join(format!("{:03}-{}", index, file_name));
        move_file(&dest, &backup)?;
        event.backup = Some((dest.clone(), backup));
    }

    // 2. Ensure parent directories, recording the newly created ones.
    ensure_parents(&dest, &mut event.created_dirs)?;

    // 3. Write the new content.
    match &event.source {
        EventSource::Copy(source) => {
            let source = source.clone();
            write_via_temp(&dest, index, |temp| fs::copy(&source, temp).map(|_| ()))?;
        }
        EventSource::Create(content) => {
            let content = content.clone();
            write_via_temp(&dest, index, |temp| fs::write(temp, &content))?;
        }
    }
    event.written.push(dest.clone());

    // 4. Checksum side-cars from the digesters.
    for algorithm in &event.digesters {
        let digest = checksum::compute(&dest, *algorithm)?;
        let sidecar = checksum::write_sidecar(&dest, &digest)?;
        event.written.push(sidecar);
    }

    // Carry over detached signature side-cars present next to the source.
    if let EventSource::Copy(source) = &event.source {
        for ext in CARRIED_SIDECARS {
            let candidate = checksum::append_extension(source, ext);
            if candidate.exists() {
                let target = checksum::append_extension(&dest, ext);
                fs::copy(&candidate, &target)?;
                event.written.push(target);
            }
        }
    }

    Ok(())
}

/// Undo applied events in reverse order
///
/// Each event's bookkeeping is drained as it is reverted, so unwinding
/// twice (or unwinding events that never ran) is a no-op.
fn unwind(events: &mut [TransactionEvent]) -> io::Result<()> {
    for event in events.iter_mut().rev() {
        // Remove written files, newest first.
        while let Some(path) = event.written.pop() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        // Restore a displaced original.
        if let Some((original, backup)) = event.backup.take() {
            move_file(&backup, &original)?;
        }

        // Remove directories this event created, child before parent,
        // but only when they are empty now.
        while let Some(dir) = event.created_dirs.pop() {
            if dir.is_dir() && fs::read_dir(&dir)?.next().is_none() {
                fs::remove_dir(&dir)?;
            }
        }
    }
    Ok(())
}
