use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Upper bound on one encoded event. A larger length prefix can only come from a
/// damaged file.
const MAX_RECORD_LEN: usize = 1 << 20;

fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

enum Record {
    /// An intact record and its size on disk.
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Short read, bad checksum or undecodable payload. Nothing after it is trusted.
    Damaged(&'static str),
}

/// `Ok(false)` on EOF before the buffer is full.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_record(reader: &mut impl Read) -> io::Result<Record> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Record::End),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(Record::Damaged("length prefix out of range"));
    }

    let mut payload = vec![0u8; len];
    if !fill(reader, &mut payload)? {
        return Ok(Record::Damaged("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !fill(reader, &mut crc_buf)? {
        return Ok(Record::Damaged("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Record::Damaged("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Record::Event(event, (len + 8) as u64)),
        Err(_) => Ok(Record::Damaged("undecodable payload")),
    }
}

/// Every intact record from the start of the file, and the byte length they cover.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut intact_len = 0u64;
    loop {
        match read_record(&mut reader)? {
            Record::Event(event, size) => {
                events.push(event);
                intact_len += size;
            }
            Record::End => break,
            Record::Damaged(reason) => {
                warn!(
                    kept = events.len(),
                    "discarding WAL tail of {}: {reason}",
                    path.display()
                );
                break;
            }
        }
    }
    Ok((events, intact_len))
}

/// Append-only ledger log.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`, little endian. A crash can
/// leave a torn last record; replay stops at the first record that fails to read
/// back intact and keeps everything before it.
///
/// The file never holds bytes past `committed_len` once a batch has failed or the
/// log has been reopened, so a later append always follows an intact record.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    committed_len: u64,
    /// Records buffered since the last successful `flush_sync`.
    pending: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open the log for appending and return the records it already holds. A damaged
    /// tail is cut off first.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, intact_len) = scan(path)?;
        let file = Self::open_append(path)?;
        let file_len = file.metadata()?.len();
        if file_len > intact_len {
            warn!(
                dropped_bytes = file_len - intact_len,
                "truncating WAL {} to its last intact record",
                path.display()
            );
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len: intact_len,
            pending: 0,
            appends_since_compact: 0,
        };
        Ok((wal, events))
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Buffer one record. Nothing is durable until [`Wal::flush_sync`].
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_record(&mut self.writer, event)?;
        self.pending += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.committed_len = file.metadata()?.len();
        self.appends_since_compact += self.pending;
        self.pending = 0;
        Ok(())
    }

    /// Drop everything written since the last successful [`Wal::flush_sync`]: bytes
    /// still buffered and bytes that reached the file without being synced. Called
    /// after a failed batch, whose callers were told nothing was stored.
    pub fn discard_uncommitted(&mut self) -> io::Result<()> {
        let fresh = BufWriter::new(Self::open_append(&self.path)?);
        // into_parts hands back the buffer instead of flushing it on drop.
        let (_stale, _unwritten) = std::mem::replace(&mut self.writer, fresh).into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.pending = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events`. The snapshot is written and synced to a sibling
    /// temp file first, then renamed over the log, so a crash leaves either the old
    /// log or the new one.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                write_record(&mut tmp, event)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.writer = BufWriter::new(Self::open_append(&self.path)?);
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read back every intact record without opening the log for writing. A missing
    /// file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}
