use std::rc::Rc;

use crate::{
    access_path::AccessPath,
    compiler::create_iterator_from_access_path,
    context::{ExecContext, JoinContext},
    explain::explain,
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    iterators::{ReadResult, RowIterator},
    DBResult, ResultSet,
};

/// A plan ready to run. The iterator tree is compiled on the first
/// `execute()` and rescanned by later ones.
pub struct PreparedQuery {
    path: AccessPath,
    join: Rc<JoinContext>,
    outputs: Vec<Expression>,
    headers: Vec<String>,
    iterator: Option<Box<dyn RowIterator>>,
}

impl PreparedQuery {
    pub fn new(
        path: AccessPath,
        join: Rc<JoinContext>,
        outputs: Vec<Expression>,
        headers: Vec<String>,
    ) -> Self {
        Self {
            path,
            join,
            outputs,
            headers,
            iterator: None,
        }
    }

    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    pub fn exec_context(&self) -> &Rc<ExecContext> {
        self.join.exec_context()
    }

    /// Drive the root iterator to the end, evaluating the output
    /// expressions for every row.
    pub fn execute(&mut self) -> DBResult<ResultSet> {
        let iterator = self.iterator.get_or_insert_with(|| {
            log::debug!("compiling plan:\n{}", explain(&self.path));
            create_iterator_from_access_path(&self.path, &self.join, true)
        });
        let result = read_all(iterator.as_mut(), &self.join, &self.outputs);
        iterator.end_psi_batch_mode_if_started();
        let rows = result?;
        log::debug!("query returned {} rows", rows.len());
        Ok(ResultSet::new(self.headers.clone(), rows))
    }

    pub fn explain(&self) -> String {
        explain(&self.path)
    }
}

fn read_all(
    iterator: &mut dyn RowIterator,
    join: &JoinContext,
    outputs: &[Expression],
) -> DBResult<Vec<Vec<Literal>>> {
    iterator.init()?;
    let mut rows = vec![];
    while iterator.read()? == ReadResult::Row {
        rows.push(Interpreter::eval_all(outputs, join)?);
    }
    Ok(rows)
}
