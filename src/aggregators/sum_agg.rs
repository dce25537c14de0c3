use crate::{expressions::Literal, interpreter::arithmetic::plus_impl, DBResult};

use super::Aggregator;

pub struct SumAgg {
    sum: Literal,
}

impl SumAgg {
    pub fn new() -> Self {
        Self { sum: Literal::Null }
    }
}

impl Default for SumAgg {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator for SumAgg {
    fn reset(&mut self) {
        self.sum = Literal::Null;
    }

    fn add(&mut self, value: &Literal) -> DBResult<()> {
        let value = match value {
            Literal::Null => return Ok(()),
            Literal::Int32(v) => Literal::Int64(*v as i64),
            other => other.clone(),
        };
        self.sum = match std::mem::replace(&mut self.sum, Literal::Null) {
            Literal::Null => value,
            sum => plus_impl(sum, value)?,
        };
        Ok(())
    }

    /// NULL when the group held no non-NULL value.
    fn result(&self) -> DBResult<Literal> {
        Ok(self.sum.clone())
    }
}
