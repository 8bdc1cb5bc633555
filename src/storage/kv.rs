//! File-backed ledger storage.
//!
//! The journal (`ledger.log`) is a sequence of records, each an 8-byte little-endian
//! body length followed by the bincode-encoded [`Transaction`]. Every append is fsynced
//! before it returns. The snapshot (`ledger.bin`) holds the bincode [`LedgerState`] with
//! the journal position it covers appended as a u64 LE trailer, and is replaced through
//! `ledger.bin.tmp` plus a rename.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{LedgerState, Transaction};
use crate::storage::Storage;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const LEN_PREFIX: usize = 8;

fn io_failure(context: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |e| Error::StorageError(format!("{}: {}", context, e))
}

fn codec_failure(context: &'static str) -> impl FnOnce(bincode::Error) -> Error {
    move |e| Error::StorageError(format!("{}: {}", context, e))
}

/// One journal record: length prefix and body, ready for a single write.
fn encode_record(tx: &Transaction) -> Result<Vec<u8>> {
    let body = bincode::serialize(tx).map_err(codec_failure("encode journal record"))?;
    let mut record = Vec::with_capacity(LEN_PREFIX + body.len());
    record.extend_from_slice(&(body.len() as u64).to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Next record body, or `None` at a clean end of journal.
fn next_record<R: Read>(reader: &mut R, index: u64) -> Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; LEN_PREFIX];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::StorageError(format!("read journal: {}", e))),
    }
    let mut body = vec![0u8; u64::from_le_bytes(prefix) as usize];
    reader
        .read_exact(&mut body)
        .map_err(|e| Error::StorageError(format!("journal record {} is torn: {}", index, e)))?;
    Ok(Some(body))
}

fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(io_failure("sync data directory"))
}

pub struct FileStorage {
    journal: PathBuf,
    snapshot: PathBuf,
    snapshot_tmp: PathBuf,
}

impl FileStorage {
    /// Storage under the configured data directory.
    pub fn new(config: &Config) -> Self {
        FileStorage::with_paths(config.get_tx_log_path(), config.get_state_path())
    }

    pub fn with_paths(journal: PathBuf, snapshot: PathBuf) -> Self {
        let snapshot_tmp = snapshot.with_extension("bin.tmp");
        FileStorage {
            journal,
            snapshot,
            snapshot_tmp,
        }
    }

    fn create_parent(path: &Path) -> Result<()> {
        match path.parent() {
            Some(dir) => fs::create_dir_all(dir).map_err(io_failure("create data directory")),
            None => Ok(()),
        }
    }
}

impl Storage for FileStorage {
    fn append_tx(&mut self, tx: &Transaction) -> Result<()> {
        FileStorage::create_parent(&self.journal)?;
        let record = encode_record(tx)?;

        let mut journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal)
            .map_err(io_failure("open journal"))?;
        journal.write_all(&record).map_err(io_failure("append journal record"))?;
        journal.sync_all().map_err(io_failure("sync journal"))
    }

    fn load_state(&self) -> Result<Option<(LedgerState, u64)>> {
        let bytes = match fs::read(&self.snapshot) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_failure("read snapshot")(e)),
        };
        if bytes.len() < LEN_PREFIX {
            return Err(Error::StorageError(format!(
                "snapshot holds {} bytes, shorter than its trailer",
                bytes.len()
            )));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - LEN_PREFIX);
        let mut position = [0u8; LEN_PREFIX];
        position.copy_from_slice(trailer);
        let state = bincode::deserialize(body).map_err(codec_failure("decode snapshot"))?;
        Ok(Some((state, u64::from_le_bytes(position))))
    }

    fn persist_state(&mut self, state: &LedgerState, next_tx_id: u64) -> Result<()> {
        FileStorage::create_parent(&self.snapshot)?;
        let mut bytes = bincode::serialize(state).map_err(codec_failure("encode snapshot"))?;
        bytes.extend_from_slice(&next_tx_id.to_le_bytes());

        let mut tmp = File::create(&self.snapshot_tmp).map_err(io_failure("create snapshot"))?;
        tmp.write_all(&bytes).map_err(io_failure("write snapshot"))?;
        tmp.sync_all().map_err(io_failure("sync snapshot"))?;
        drop(tmp);

        fs::rename(&self.snapshot_tmp, &self.snapshot).map_err(io_failure("install snapshot"))?;
        match self.snapshot.parent() {
            Some(dir) => sync_dir(dir),
            None => Ok(()),
        }
    }

    fn load_txs_from(&self, from_tx_id: u64) -> Result<Vec<Transaction>> {
        let file = match File::open(&self.journal) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure("open journal")(e)),
        };
        let mut reader = BufReader::new(file);

        let mut tail = Vec::new();
        let mut index = 0u64;
        while let Some(body) = next_record(&mut reader, index)? {
            // Records before the snapshot position are skipped undecoded
            if index >= from_tx_id {
                let tx: Transaction =
                    bincode::deserialize(&body).map_err(codec_failure("decode journal record"))?;
                tail.push(tx);
            }
            index += 1;
        }
        Ok(tail)
    }
}
