use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    access_path::JoinType,
    context::JoinContext,
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    row::Record,
    tables::TableRef,
    DBResult,
};

use super::{ReadResult, RowIterator};

/// One equi-join condition: `probe` is evaluated over the outer side,
/// `build` over the inner side.
#[derive(Debug, Clone)]
pub struct HashJoinCondition {
    pub probe: Expression,
    pub build: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingProbeRow,
    ReadingMatches,
    EndOfRows,
}

/// In-memory hash join. `init()` reads the whole inner (build) side into a
/// hash table of record snapshots; `read()` probes it once per outer row.
/// Rows with a NULL join key never match.
pub struct HashJoinIterator {
    join: Rc<JoinContext>,
    build: Box<dyn RowIterator>,
    probe: Box<dyn RowIterator>,
    build_tables: Vec<TableRef>,
    conditions: Vec<HashJoinCondition>,
    extra_condition: Option<Expression>,
    join_type: JoinType,
    pfs_batch_mode: bool,
    hash_table: HashMap<Vec<Literal>, Vec<Vec<Record>>>,
    state: State,
    /// Join key of the current probe row; `None` when it has a NULL part.
    probe_key: Option<Vec<Literal>>,
    match_pos: usize,
    matched: bool,
}

impl HashJoinIterator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        join: Rc<JoinContext>,
        build: Box<dyn RowIterator>,
        probe: Box<dyn RowIterator>,
        build_tables: Vec<TableRef>,
        conditions: Vec<HashJoinCondition>,
        extra_condition: Option<Expression>,
        join_type: JoinType,
        pfs_batch_mode: bool,
    ) -> Self {
        Self {
            join,
            build,
            probe,
            build_tables,
            conditions,
            extra_condition,
            join_type,
            pfs_batch_mode,
            hash_table: HashMap::new(),
            state: State::ReadingProbeRow,
            probe_key: None,
            match_pos: 0,
            matched: false,
        }
    }

    fn join_key(&self, build_side: bool) -> DBResult<Option<Vec<Literal>>> {
        let mut key = Vec::with_capacity(self.conditions.len());
        for condition in self.conditions.iter() {
            let expr = if build_side {
                &condition.build
            } else {
                &condition.probe
            };
            let value = Interpreter::eval(expr, &self.join)?;
            if value.is_null() {
                return Ok(None);
            }
            key.push(value.to_key());
        }
        Ok(Some(key))
    }

    fn build_hash_table(&mut self) -> DBResult<()> {
        self.hash_table.clear();
        self.build.init()?;
        let mut num_rows = 0;
        loop {
            self.join.exec_context().check_killed()?;
            if self.build.read()? == ReadResult::EndOfStream {
                break;
            }
            if let Some(key) = self.join_key(true)? {
                let records = self.build_tables.iter().map(|t| t.snapshot()).collect();
                self.hash_table.entry(key).or_default().push(records);
                num_rows += 1;
            }
        }
        log::debug!(
            "hash join built {num_rows} rows under {} keys",
            self.hash_table.len()
        );
        Ok(())
    }

    fn restore_next_match(&mut self) -> bool {
        let Some(key) = &self.probe_key else {
            return false;
        };
        let pos = self.match_pos;
        self.match_pos += 1;
        match self.hash_table.get(key).and_then(|rows| rows.get(pos)) {
            Some(records) => {
                for (table, record) in self.build_tables.iter().zip(records.iter()) {
                    table.restore(record);
                }
                true
            }
            None => false,
        }
    }
}

impl RowIterator for HashJoinIterator {
    fn init(&mut self) -> DBResult<()> {
        if self.pfs_batch_mode {
            self.build.start_psi_batch_mode();
        }
        let built = self.build_hash_table();
        self.build.end_psi_batch_mode_if_started();
        built?;
        self.probe.init()?;
        self.state = State::ReadingProbeRow;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        loop {
            match self.state {
                State::EndOfRows => return Ok(ReadResult::EndOfStream),
                State::ReadingProbeRow => {
                    if self.probe.read()? == ReadResult::EndOfStream {
                        self.state = State::EndOfRows;
                        return Ok(ReadResult::EndOfStream);
                    }
                    self.probe_key = self.join_key(false)?;
                    self.match_pos = 0;
                    self.matched = false;
                    self.build.set_null_row_flag(false);
                    self.state = State::ReadingMatches;
                }
                State::ReadingMatches => {
                    if !self.restore_next_match() {
                        self.state = State::ReadingProbeRow;
                        if !self.matched
                            && matches!(self.join_type, JoinType::Outer | JoinType::Anti)
                        {
                            self.build.set_null_row_flag(true);
                            return Ok(ReadResult::Row);
                        }
                        continue;
                    }
                    if let Some(condition) = &self.extra_condition {
                        if !Interpreter::eval_condition(condition, &self.join)? {
                            continue;
                        }
                    }
                    self.matched = true;
                    match self.join_type {
                        // a match disqualifies the probe row
                        JoinType::Anti => self.state = State::ReadingProbeRow,
                        JoinType::Semi => {
                            self.state = State::ReadingProbeRow;
                            return Ok(ReadResult::Row);
                        }
                        JoinType::Inner | JoinType::Outer => return Ok(ReadResult::Row),
                    }
                }
            }
        }
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.build.set_null_row_flag(is_null_row);
        self.probe.set_null_row_flag(is_null_row);
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.build.end_psi_batch_mode_if_started();
        self.probe.end_psi_batch_mode_if_started();
    }
}
