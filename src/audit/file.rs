// ABOUTME: Append-only JSON Lines audit log on disk.
// ABOUTME: One sealed event per line; appends hold a lock file so processes never fork the chain.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::state_lock::StateFileLock;

use super::{AuditEntry, AuditError, AuditEvent, AuditSink, GENESIS_HASH, chain_head};

const TAIL_CHUNK: u64 = 4096;

#[derive(Debug)]
pub struct FileAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<state_dir>/audit.jsonl`
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("audit.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_events(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| AuditError::Corrupt {
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }

    /// Hash of the last event on disk. Only the end of the file is read.
    fn last_hash(&self) -> Result<String, AuditError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(GENESIS_HASH.to_string()),
            Err(e) => return Err(self.io_error(e)),
        };
        let Some(line) = last_line(&mut file).map_err(|e| self.io_error(e))? else {
            return Ok(GENESIS_HASH.to_string());
        };

        match serde_json::from_slice::<AuditEvent>(&line) {
            Ok(event) => Ok(event.hash),
            // The full read reports which line is broken.
            Err(_) => Ok(chain_head(&self.read_events()?).to_string()),
        }
    }
}

/// The last non-blank line of `file`, reading backwards in chunks.
fn last_line(file: &mut File) -> io::Result<Option<Vec<u8>>> {
    let mut end = file.seek(SeekFrom::End(0))?;
    let mut tail: Vec<u8> = Vec::new();
    loop {
        let content_end = tail
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        if content_end > 0
            && let Some(newline) = tail[..content_end].iter().rposition(|&b| b == b'\n')
        {
            return Ok(Some(tail[newline + 1..content_end].to_vec()));
        }
        if end == 0 {
            return Ok((content_end > 0).then(|| tail[..content_end].to_vec()));
        }

        let start = end.saturating_sub(TAIL_CHUNK);
        let mut chunk = vec![0; (end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
        end = start;
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<AuditEvent, AuditError> {
        let _guard = self.write_lock.lock();
        let _file_lock = StateFileLock::acquire(&self.path).map_err(|e| self.io_error(e))?;

        let event = entry.seal(&self.last_hash()?);

        let mut line = serde_json::to_string(&event).map_err(|e| self.io_error(e.into()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(action = %event.action, hash = %event.hash, "Audit event recorded");
        Ok(event)
    }

    fn events(&self) -> Result<Vec<AuditEvent>, AuditError> {
        self.read_events()
    }
}
