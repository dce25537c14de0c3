pub mod csv;
pub mod inmem;
pub mod temp;

use std::cell::{Cell, Ref, RefCell};
use std::fmt::Display;
use std::ops::{BitAnd, BitOr, Sub};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::data_types::DataType;
use crate::expressions::Literal;
use crate::row::{Record, RowId};
use crate::{DBError, DBResult};

pub use inmem::InMemTable;
pub use temp::{TempTable, WriteError};

/// Identifier of a table inside one query; doubles as its bit in a [`TableMap`].
pub type TableId = usize;

pub const MAX_TABLES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSchema {
    fields: Vec<FieldInfo>,
}

impl RelationSchema {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        RelationSchema { fields }
    }

    pub fn get_fields(&self) -> &Vec<FieldInfo> {
        &self.fields
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    name: String,
    data_type: DataType,
}

impl FieldInfo {
    pub fn new(name: String, data_type: DataType) -> Self {
        Self { name, data_type }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }
}

/// A row store leaf iterators read from. Row ids are dense positions.
pub trait Table {
    fn schema(&self) -> &RelationSchema;

    fn num_rows(&self) -> usize;

    fn fetch(&self, row_id: RowId) -> DBResult<Vec<Literal>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TableMap(u64);

impl TableMap {
    pub fn empty() -> Self {
        TableMap(0)
    }

    pub fn single(id: TableId) -> Self {
        assert!(id < MAX_TABLES, "table id {id} exceeds the table map width");
        TableMap(1 << id)
    }

    pub fn from_ids(ids: impl IntoIterator<Item = TableId>) -> Self {
        ids.into_iter()
            .fold(TableMap::empty(), |map, id| map | TableMap::single(id))
    }

    pub fn contains(&self, id: TableId) -> bool {
        id < MAX_TABLES && self.0 & (1 << id) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn ids(&self) -> impl Iterator<Item = TableId> + '_ {
        (0..MAX_TABLES).filter(move |id| self.contains(*id))
    }
}

impl BitOr for TableMap {
    type Output = TableMap;

    fn bitor(self, rhs: Self) -> Self::Output {
        TableMap(self.0 | rhs.0)
    }
}

impl BitAnd for TableMap {
    type Output = TableMap;

    fn bitand(self, rhs: Self) -> Self::Output {
        TableMap(self.0 & rhs.0)
    }
}

impl Sub for TableMap {
    type Output = TableMap;

    fn sub(self, rhs: Self) -> Self::Output {
        TableMap(self.0 & !rhs.0)
    }
}

impl Display for TableMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = self.ids().map(|id| id.to_string()).collect::<Vec<_>>();
        write!(f, "{{{}}}", ids.join(","))
    }
}

pub type TableRef = Rc<QueryTable>;

/// A table as seen by one query: its store plus the record buffer that
/// iterators write the current row into.
pub struct QueryTable {
    id: TableId,
    name: String,
    schema: RelationSchema,
    storage: Rc<RefCell<dyn Table>>,
    record: RefCell<Record>,
    keep_row_id: Cell<bool>,
}

impl std::fmt::Debug for QueryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTable")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl QueryTable {
    pub fn new(id: TableId, name: &str, storage: Rc<RefCell<dyn Table>>) -> TableRef {
        assert!(id < MAX_TABLES, "table id {id} exceeds the table map width");
        let schema = storage.borrow().schema().clone();
        Rc::new(QueryTable {
            id,
            name: name.to_owned(),
            schema,
            storage,
            record: RefCell::new(Record::default()),
            keep_row_id: Cell::new(false),
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &RelationSchema {
        &self.schema
    }

    pub fn storage(&self) -> &Rc<RefCell<dyn Table>> {
        &self.storage
    }

    pub fn record(&self) -> Ref<'_, Record> {
        self.record.borrow()
    }

    pub fn column(&self, index: usize) -> DBResult<Literal> {
        self.record.borrow().get_field(index)
    }

    pub fn request_row_id(&self) {
        self.keep_row_id.set(true);
    }

    pub fn keeps_row_id(&self) -> bool {
        self.keep_row_id.get()
    }

    pub fn row_id(&self) -> Option<RowId> {
        self.record.borrow().row_id
    }

    pub fn set_null_row(&self, is_null_row: bool) {
        self.record.borrow_mut().null_row = is_null_row;
    }

    pub fn is_null_row(&self) -> bool {
        self.record.borrow().null_row
    }

    pub fn set_row(&self, values: Vec<Literal>, row_id: RowId) {
        let row_id = self.keeps_row_id().then_some(row_id);
        *self.record.borrow_mut() = Record::new(values, row_id);
    }

    pub fn snapshot(&self) -> Record {
        self.record.borrow().clone()
    }

    pub fn restore(&self, record: &Record) {
        self.record.borrow_mut().clone_from(record);
    }

    /// Re-position the record buffer on a row by its id.
    pub fn load_row(&self, row_id: RowId) -> DBResult<()> {
        let values = self.storage.borrow().fetch(row_id)?;
        *self.record.borrow_mut() = Record::new(values, Some(row_id));
        Ok(())
    }
}

pub(crate) fn row_out_of_range(table: &str, row_id: RowId) -> DBError {
    DBError::StorageEngine(format!("row {row_id} does not exist in table {table}"))
}
