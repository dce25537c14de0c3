use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use csv_core::{ReadRecordResult, Reader, ReaderBuilder};

use crate::{data_types::DataType, expressions::Literal, DBError, DBResult};

use super::{FieldInfo, InMemTable, RelationSchema};

const OUTPUT_BUFFER_SIZE: usize = 4096;
const MAX_FIELDS: usize = 256;

/// Loads a csv file into an in-memory table.
/// The first line holds the headers; column types are inferred from the
/// data: Boolean, Int64, Float64, otherwise String.
pub struct CsvTable;

impl CsvTable {
    pub fn load(path: &str) -> DBResult<InMemTable> {
        let mut reader = CsvRecordReader::new(path)?;
        // assume first line is headers
        let headers: Vec<String> = reader.try_read_next()?.ok_or(
            DBError::StorageEngine(format!("Provided csv file {path} is empty.")),
        )?;

        let mut records = Vec::new();
        let mut data_types = vec![DataType::Unknown; headers.len()];
        while let Some(record) = reader.try_read_next()? {
            if record.len() != headers.len() {
                return Err(DBError::StorageEngine(format!(
                    "Csv record {} of {path} has {} fields, expected {}.",
                    records.len() + 1,
                    record.len(),
                    headers.len()
                )));
            }
            for (idx, field) in record.iter().enumerate() {
                data_types[idx] = Self::determine_data_type(field, &data_types[idx]);
            }
            records.push(record);
        }
        log::debug!("loaded {} records from {path}", records.len());

        // a column without any value is read as strings
        for data_type in data_types.iter_mut() {
            if *data_type == DataType::Unknown {
                *data_type = DataType::String;
            }
        }
        let rows = records
            .into_iter()
            .map(|record| {
                Iterator::zip(record.iter(), data_types.iter())
                    .map(|(field, data_type)| Literal::parse_as(field, data_type))
                    .collect::<DBResult<Vec<_>>>()
            })
            .collect::<DBResult<Vec<_>>>()?;
        let fields = Iterator::zip(headers.into_iter(), data_types.into_iter())
            .map(|(name, data_type)| FieldInfo::new(name, data_type))
            .collect();
        InMemTable::with_rows(RelationSchema::new(fields), rows)
    }

    fn determine_data_type(field: &str, type_hint: &DataType) -> DataType {
        let lower_case = field.to_lowercase();
        let data_type = match lower_case.as_str() {
            "null" => return type_hint.clone(),
            "true" | "false" => DataType::Boolean,
            _ if lower_case.parse::<i64>().is_ok() => DataType::Int64,
            _ if lower_case.parse::<f64>().is_ok() => DataType::Float64,
            _ => DataType::String,
        };
        if &data_type == type_hint {
            data_type
        } else {
            match Self::data_type_generality(&data_type)
                .cmp(&Self::data_type_generality(type_hint))
            {
                std::cmp::Ordering::Less => type_hint.clone(),
                std::cmp::Ordering::Equal => DataType::String,
                std::cmp::Ordering::Greater => data_type,
            }
        }
    }

    /// a data type with higher generality wins when reconciling two data types
    fn data_type_generality(data_type: &DataType) -> u8 {
        match data_type {
            DataType::Int64 => 1,
            // Float has higher generality than Int
            DataType::Float64 => 2,
            // everything can be treated as string from csv
            DataType::String => u8::MAX,
            DataType::Boolean => 1,
            _ => 0,
        }
    }
}

pub struct CsvRecordReader {
    buf_reader: BufReader<File>,
    inputs_buf: String,
    outputs_buf: Vec<u8>,
    field_indices: Vec<usize>,
    csv_reader: Reader,
}

impl CsvRecordReader {
    pub fn new(path: &str) -> DBResult<Self> {
        let csv_reader = ReaderBuilder::new().build();
        let f = File::open(path)
            .map_err(|e| DBError::StorageEngine(format!("read csv file failed: {e}")))?;
        Ok(Self {
            buf_reader: BufReader::new(f),
            inputs_buf: String::with_capacity(OUTPUT_BUFFER_SIZE),
            outputs_buf: vec![0; OUTPUT_BUFFER_SIZE],
            field_indices: vec![0; MAX_FIELDS],
            csv_reader,
        })
    }

    /// Read one record. A quoted field may span lines, so input is fed line
    /// by line until csv-core reports a complete record.
    pub fn try_read_next(&mut self) -> DBResult<Option<Vec<String>>> {
        let mut num_output = 0;
        let mut num_ends = 0;
        loop {
            // read_line fails on invalid UTF-8 bytes
            self.inputs_buf.clear();
            self.buf_reader
                .read_line(&mut self.inputs_buf)
                .map_err(|e| DBError::StorageEngine(format!("read csv file error: {e}")))?;
            let inputs = self.inputs_buf.as_bytes();
            let (result, _num_read, num_write, num_fields) = self.csv_reader.read_record(
                inputs,
                &mut self.outputs_buf[num_output..],
                &mut self.field_indices[num_ends..],
            );
            num_output += num_write;
            num_ends += num_fields;
            match result {
                // the record continues on the next line, or the file ended
                // without a trailing newline and the next (empty) read flushes it
                ReadRecordResult::InputEmpty => continue,
                ReadRecordResult::OutputFull => {
                    return Err(DBError::StorageEngine(format!(
                        "Exceeded maximum csv record size: {OUTPUT_BUFFER_SIZE}"
                    )))
                }
                ReadRecordResult::OutputEndsFull => {
                    return Err(DBError::StorageEngine(format!(
                        "Exceeding maximum supported num fields ({MAX_FIELDS}) when reading csv."
                    )))
                }
                ReadRecordResult::Record => {
                    let mut offset = 0;
                    let record = self.field_indices[..num_ends]
                        .iter()
                        .map(|&end| {
                            // from_utf8_lossy checks UTF-8 validity of the bytes
                            let v = String::from_utf8_lossy(&self.outputs_buf[offset..end]);
                            offset = end;
                            v.to_string()
                        })
                        .collect();
                    return Ok(Some(record));
                }
                ReadRecordResult::End => return Ok(None),
            }
        }
    }
}
