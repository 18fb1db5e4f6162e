//! Newline-delimited JSON record files.
//!
//! Each line is one self-contained `KeyValue`, so readers decode records one at a time. Writers
//! fill a temporary file next to the destination and only rename it into place once every
//! record is on disk, so a failed task never leaves a partial file under a final name.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::{TaskError, TaskResult};
use super::util::KeyValue;

/// Writes the records destined for one file.
pub struct RecordWriter {
    path: PathBuf,
    out: BufWriter<NamedTempFile>,
}

impl RecordWriter {
    /// Starts a new version of `path`. Nothing is visible under `path` until the writer is
    /// finished and its [`StagedFile`] persisted; dropping either removes the temporary file.
    pub fn create(path: &Path) -> TaskResult<Self> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir).map_err(|e| TaskError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(tmp),
        })
    }

    pub fn write(&mut self, record: &KeyValue) -> TaskResult<()> {
        serde_json::to_writer(&mut self.out, record).map_err(|source| {
            // serde_json wraps failed writes in its own error type
            if source.is_io() {
                TaskError::io(&self.path, std::io::Error::new(ErrorKind::Other, source))
            } else {
                TaskError::Encode {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        self.out.write_all(b"\n").map_err(|e| TaskError::io(&self.path, e))
    }

    /// Flushes and syncs the temporary file.
    pub fn finish(self) -> TaskResult<StagedFile> {
        let Self { path, out } = self;
        let tmp = out.into_inner().map_err(|e| TaskError::io(&path, e.into_error()))?;
        tmp.as_file().sync_all().map_err(|e| TaskError::io(&path, e))?;
        Ok(StagedFile { path, tmp })
    }
}

/// A complete file waiting to be renamed onto its final name.
pub struct StagedFile {
    path: PathBuf,
    tmp: NamedTempFile,
}

impl StagedFile {
    /// Atomically replaces the destination, discarding whatever an earlier attempt left there.
    pub fn persist(self) -> TaskResult<()> {
        let Self { path, tmp } = self;
        tmp.persist(&path).map_err(|e| TaskError::io(&path, e.error))?;
        Ok(())
    }
}

/// Streams every record in `path` into `sink`.
///
/// Returns `Ok(false)` without calling `sink` when the file does not exist. A malformed or
/// truncated record fails the whole read.
pub fn read_records<F>(path: &Path, mut sink: F) -> TaskResult<bool>
where
    F: FnMut(KeyValue),
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(TaskError::io(path, e)),
    };

    let stream =
        serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<KeyValue>();
    for record in stream {
        let record = record.map_err(|source| {
            if source.is_io() {
                TaskError::io(path, std::io::Error::new(ErrorKind::Other, source))
            } else {
                TaskError::Decode {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        sink(record);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn kv(k: &str, v: &str) -> KeyValue {
        KeyValue::new(k.to_string(), v.to_string())
    }

    fn write_file(path: &Path, records: &[KeyValue]) {
        let mut w = RecordWriter::create(path).unwrap();
        for r in records {
            w.write(r).unwrap();
        }
        w.finish().unwrap().persist().unwrap();
    }

    #[test]
    fn persisted_file_replaces_earlier_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");

        write_file(&path, &[kv("a", "1"), kv("stale", "9")]);
        write_file(&path, &[kv("b", "two words")]);

        let mut got = vec![];
        assert!(read_records(&path, |r| got.push(r)).unwrap());
        assert_eq!(got, vec![kv("b", "two words")]);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn abandoned_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");

        let mut w = RecordWriter::create(&path).unwrap();
        w.write(&kv("a", "1")).unwrap();
        drop(w);

        let staged = {
            let mut w = RecordWriter::create(&path).unwrap();
            w.write(&kv("b", "1")).unwrap();
            w.finish().unwrap()
        };
        assert!(!path.exists());
        drop(staged);

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let found = read_records(&dir.path().join("nope"), |_| calls += 1).unwrap();
        assert!(!found);
        assert_eq!(calls, 0);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        fs::write(&path, "{\"key\":\"a\",\"value\":\"1\"}\n{\"key\":\"b\",\"val").unwrap();

        let mut got = vec![];
        let err = read_records(&path, |r| got.push(r)).unwrap_err();
        assert!(matches!(err, TaskError::Decode { .. }), "{err}");
        assert_eq!(got, vec![kv("a", "1")]);
    }

    #[test]
    fn garbage_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        fs::write(&path, "not json\n").unwrap();
        assert!(matches!(
            read_records(&path, |_| {}),
            Err(TaskError::Decode { .. })
        ));
    }
}
