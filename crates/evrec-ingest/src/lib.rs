//! Record-set ingestion from zip archives of CSV files.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

pub const CRATE_NAME: &str = "evrec-ingest";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("opening archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("no csv member matches record set `{name}`")]
    NoSuchRecordSet { name: String },
    #[error("parsing csv member {member}: {source}")]
    Csv {
        member: String,
        #[source]
        source: csv::Error,
    },
}

/// Yields all raw rows for a logical record-set name.
///
/// A record set is the concatenation of every matching tabular input of one
/// run; callers deserialize into the raw row type of the event kind.
pub trait RecordSetProvider {
    fn record_set<T: DeserializeOwned>(&mut self, name: &str) -> Result<Vec<T>, IngestError>;
}

/// Reads record sets out of a zip archive: every `.csv` member whose path
/// contains the record-set name contributes its rows, in archive order.
pub struct ZipCsvProvider<R> {
    archive: ZipArchive<R>,
    path: PathBuf,
}

impl ZipCsvProvider<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_reader(file, path)
    }
}

impl<R: Read + Seek> ZipCsvProvider<R> {
    pub fn from_reader(reader: R, path: PathBuf) -> Result<Self, IngestError> {
        let archive = ZipArchive::new(reader).map_err(|source| IngestError::Zip {
            path: path.clone(),
            source,
        })?;
        Ok(Self { archive, path })
    }
}

impl<R: Read + Seek> RecordSetProvider for ZipCsvProvider<R> {
    fn record_set<T: DeserializeOwned>(&mut self, name: &str) -> Result<Vec<T>, IngestError> {
        let mut rows = Vec::new();
        let mut members = 0usize;

        for index in 0..self.archive.len() {
            let member = self
                .archive
                .by_index(index)
                .map_err(|source| IngestError::Zip {
                    path: self.path.clone(),
                    source,
                })?;
            let member_name = member.name().to_string();
            if !member_name.contains(name) || !member_name.ends_with(".csv") {
                continue;
            }
            members += 1;

            let mut reader = csv::Reader::from_reader(member);
            for row in reader.deserialize() {
                rows.push(row.map_err(|source| IngestError::Csv {
                    member: member_name.clone(),
                    source,
                })?);
            }
        }

        if members == 0 {
            return Err(IngestError::NoSuchRecordSet {
                name: name.to_string(),
            });
        }

        debug!(record_set = name, members, rows = rows.len(), "loaded record set");
        Ok(rows)
    }
}
