use crate::{expressions::Literal, row::RowId, DBError, DBResult};

use super::{row_out_of_range, RelationSchema, Table};

pub struct InMemTable {
    schema: RelationSchema,
    data: Vec<Vec<Literal>>,
}

impl InMemTable {
    pub fn new(schema: RelationSchema) -> Self {
        InMemTable {
            schema,
            data: Vec::new(),
        }
    }

    pub fn with_rows(schema: RelationSchema, data: Vec<Vec<Literal>>) -> DBResult<Self> {
        let mut table = Self::new(schema);
        table.insert_data(data)?;
        Ok(table)
    }

    pub fn insert_data(&mut self, data: Vec<Vec<Literal>>) -> DBResult<()> {
        if let Some(row) = data
            .iter()
            .find(|row| row.len() != self.schema.num_fields())
        {
            return Err(DBError::StorageEngine(format!(
                "row with {} fields does not match schema with {} fields",
                row.len(),
                self.schema.num_fields()
            )));
        }
        self.data.extend(data);
        Ok(())
    }
}

impl Table for InMemTable {
    fn schema(&self) -> &RelationSchema {
        &self.schema
    }

    fn num_rows(&self) -> usize {
        self.data.len()
    }

    fn fetch(&self, row_id: RowId) -> DBResult<Vec<Literal>> {
        self.data
            .get(row_id as usize)
            .cloned()
            .ok_or_else(|| row_out_of_range("in-memory table", row_id))
    }
}
