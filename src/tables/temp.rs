use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::{expressions::Literal, row::RowId, DBError, DBResult};

use super::{row_out_of_range, RelationSchema, Table};

#[derive(Debug, PartialEq)]
pub enum WriteError {
    Duplicate,
    /// The in-memory store reached its row limit; spill and retry.
    TableFull,
    Storage(DBError),
}

impl WriteError {
    pub fn is_ignorable(&self) -> bool {
        matches!(self, WriteError::Duplicate)
    }
}

impl From<DBError> for WriteError {
    fn from(e: DBError) -> Self {
        WriteError::Storage(e)
    }
}

/// Temporary table used as a materialization target. Storage is created
/// lazily and starts in memory; it moves to an anonymous file once full.
pub struct TempTable {
    name: String,
    schema: RelationSchema,
    max_in_memory_rows: usize,
    /// Keys of the stored rows, see [`Literal::to_key`].
    unique: Option<HashSet<Vec<Literal>>>,
    storage: Option<TempStorage>,
}

enum TempStorage {
    Heap(Vec<Vec<Literal>>),
    Disk(DiskRows),
}

/// Rows as JSON lines in a temp file, with an (offset, length) index.
struct DiskRows {
    file: File,
    index: Vec<(u64, usize)>,
    end: u64,
}

impl DiskRows {
    fn create() -> DBResult<Self> {
        Ok(DiskRows {
            file: tempfile::tempfile()?,
            index: Vec::new(),
            end: 0,
        })
    }

    fn append(&mut self, row: &[Literal]) -> DBResult<()> {
        let mut bytes = serde_json::to_vec(row)?;
        bytes.push(b'\n');
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&bytes)?;
        self.index.push((self.end, bytes.len() - 1));
        self.end += bytes.len() as u64;
        Ok(())
    }

    fn fetch(&self, row_id: RowId) -> Option<DBResult<Vec<Literal>>> {
        let (offset, len) = *self.index.get(row_id as usize)?;
        let read = || -> DBResult<Vec<Literal>> {
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0; len];
            file.read_exact(&mut buf)?;
            Ok(serde_json::from_slice(&buf)?)
        };
        Some(read())
    }

    fn clear(&mut self) -> DBResult<()> {
        self.file.set_len(0)?;
        self.index.clear();
        self.end = 0;
        Ok(())
    }
}

impl TempTable {
    pub fn new(
        name: &str,
        schema: RelationSchema,
        deduplicate: bool,
        max_in_memory_rows: usize,
    ) -> Self {
        Self {
            name: name.to_owned(),
            schema,
            max_in_memory_rows,
            unique: deduplicate.then(HashSet::new),
            storage: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deduplicates(&self) -> bool {
        self.unique.is_some()
    }

    pub fn is_instantiated(&self) -> bool {
        self.storage.is_some()
    }

    pub fn instantiate(&mut self) {
        if self.storage.is_none() {
            log::debug!("instantiating temp table {}", self.name);
            self.storage = Some(TempStorage::Heap(Vec::new()));
        }
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, Some(TempStorage::Disk(_)))
    }

    /// Delete all rows; the storage kind is kept.
    pub fn reset(&mut self) -> DBResult<()> {
        if let Some(unique) = self.unique.as_mut() {
            unique.clear();
        }
        match self.storage.as_mut() {
            Some(TempStorage::Heap(rows)) => rows.clear(),
            Some(TempStorage::Disk(disk)) => disk.clear()?,
            None => {}
        }
        Ok(())
    }

    pub fn write_row(
        &mut self,
        values: Vec<Literal>,
        check_unique: bool,
    ) -> Result<(), WriteError> {
        if values.len() != self.schema.num_fields() {
            return Err(WriteError::Storage(DBError::StorageEngine(format!(
                "temp table {} expects {} fields, got {}",
                self.name,
                self.schema.num_fields(),
                values.len()
            ))));
        }
        let values: Vec<Literal> = Iterator::zip(values.into_iter(), self.schema.get_fields().iter())
            .map(|(value, field)| value.cast_to(field.data_type()))
            .collect();
        let key = (check_unique && self.unique.is_some())
            .then(|| values.iter().map(Literal::to_key).collect::<Vec<_>>());
        if let (Some(key), Some(unique)) = (key.as_ref(), self.unique.as_ref()) {
            if unique.contains(key) {
                return Err(WriteError::Duplicate);
            }
        }
        match self.storage.as_mut() {
            None => {
                return Err(WriteError::Storage(DBError::StorageEngine(format!(
                    "temp table {} is not instantiated",
                    self.name
                ))))
            }
            Some(TempStorage::Heap(rows)) => {
                if rows.len() >= self.max_in_memory_rows {
                    return Err(WriteError::TableFull);
                }
                rows.push(values);
            }
            Some(TempStorage::Disk(disk)) => disk.append(&values)?,
        }
        if let (Some(key), Some(unique)) = (key, self.unique.as_mut()) {
            unique.insert(key);
        }
        Ok(())
    }

    /// Move the in-memory rows into a temp file; later writes go there too.
    pub fn convert_to_disk(&mut self) -> DBResult<()> {
        let rows = match self.storage.take() {
            Some(TempStorage::Heap(rows)) => rows,
            other => {
                self.storage = other;
                return Ok(());
            }
        };
        log::warn!(
            "temp table {} is full at {} rows, spilling to disk",
            self.name,
            rows.len()
        );
        let mut disk = DiskRows::create()?;
        for row in rows.iter() {
            disk.append(row)?;
        }
        self.storage = Some(TempStorage::Disk(disk));
        Ok(())
    }
}

impl Table for TempTable {
    fn schema(&self) -> &RelationSchema {
        &self.schema
    }

    fn num_rows(&self) -> usize {
        match self.storage.as_ref() {
            Some(TempStorage::Heap(rows)) => rows.len(),
            Some(TempStorage::Disk(disk)) => disk.index.len(),
            None => 0,
        }
    }

    fn fetch(&self, row_id: RowId) -> DBResult<Vec<Literal>> {
        let fetched = match self.storage.as_ref() {
            Some(TempStorage::Heap(rows)) => rows.get(row_id as usize).cloned().map(Ok),
            Some(TempStorage::Disk(disk)) => disk.fetch(row_id),
            None => None,
        };
        fetched.unwrap_or_else(|| Err(row_out_of_range(&self.name, row_id)))
    }
}
