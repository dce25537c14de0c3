use crate::{expressions::Literal, DBResult};

use super::Aggregator;

/// COUNT(expr) skips NULLs, COUNT(*) counts every row.
pub struct CountAgg {
    count: u64,
    count_nulls: bool,
}

impl CountAgg {
    pub fn new(count_nulls: bool) -> Self {
        Self {
            count: 0,
            count_nulls,
        }
    }
}

impl Aggregator for CountAgg {
    fn reset(&mut self) {
        self.count = 0;
    }

    fn add(&mut self, value: &Literal) -> DBResult<()> {
        if self.count_nulls || !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn result(&self) -> DBResult<Literal> {
        Ok(Literal::UInt64(self.count))
    }
}
