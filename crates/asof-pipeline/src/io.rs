//! File edges of the pipeline: JSON inputs, JSON Lines event streams and
//! write-once JSON outputs.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use asof_data::{
    DataError, EventStore, EventStream, FeatureTable, LabelIndex, LoadReport, Subject,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum IoError {
    #[display("failed to open {kind} file: {}", path.display())]
    Open {
        kind: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[display("failed to parse {kind} JSON file: {}", path.display())]
    Parse {
        kind: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("failed to write {}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[display("failed to serialize {}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("invalid input data")]
    Data { source: DataError },
}

pub fn read_json_file<T, P>(kind: &'static str, path: P) -> Result<T, IoError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| IoError::Open {
        kind,
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| IoError::Parse {
        kind,
        path: path.to_owned(),
        source,
    })
}

/// Reads the subjects file (a JSON array) into a [`LabelIndex`].
pub fn read_subjects(path: &Path) -> Result<LabelIndex, IoError> {
    let subjects: Vec<Subject> = read_json_file("subjects", path)?;
    let index = LabelIndex::new(subjects).map_err(|source| IoError::Data { source })?;
    info!(
        subjects = index.len(),
        positives = index.positives(),
        path = %path.display(),
        "loaded subjects"
    );
    Ok(index)
}

/// Reads a saved feature table and checks its shape before anything indexes it.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable, IoError> {
    let table: FeatureTable = read_json_file("features", path)?;
    table
        .check_shape()
        .map_err(|source| IoError::Data { source })?;
    Ok(table)
}

/// Loads one JSON Lines file per stream.
///
/// Lines that fail to parse are rejected and counted in the stream's
/// [`LoadReport`]; they never reach the store.
pub fn load_event_store(
    paths: &BTreeMap<String, PathBuf>,
) -> Result<(EventStore, BTreeMap<String, LoadReport>), IoError> {
    let mut store = EventStore::new();
    let mut reports = BTreeMap::new();
    for (name, path) in paths {
        let file = File::open(path).map_err(|source| IoError::Open {
            kind: "events",
            path: path.clone(),
            source,
        })?;
        let (stream, report) =
            EventStream::from_jsonl(name.as_str(), BufReader::new(file)).map_err(|source| {
                IoError::Open {
                    kind: "events",
                    path: path.clone(),
                    source,
                }
            })?;
        store
            .insert(stream)
            .map_err(|source| IoError::Data { source })?;
        reports.insert(name.clone(), report);
    }
    info!(
        streams = reports.len(),
        events = store.total_events(),
        "loaded event store"
    );
    Ok((store, reports))
}

/// Writes `value` as pretty JSON to a file that must not exist yet.
pub fn write_json_new<T>(path: &Path, value: &T) -> Result<(), IoError>
where
    T: Serialize + ?Sized,
{
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| IoError::Write {
            path: path.to_owned(),
            source,
        })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| IoError::Serialize {
        path: path.to_owned(),
        source,
    })?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .map_err(|source| IoError::Write {
            path: path.to_owned(),
            source,
        })
}

/// Writes `items` as JSON Lines, replacing any existing file.
pub fn write_jsonl<'a, I, T>(path: &Path, items: I) -> Result<(), IoError>
where
    I: IntoIterator<Item = &'a T>,
    T: Serialize + 'a,
{
    let write_err = |source| IoError::Write {
        path: path.to_owned(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item).map_err(|source| IoError::Serialize {
            path: path.to_owned(),
            source,
        })?;
        writeln!(writer).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)
}
