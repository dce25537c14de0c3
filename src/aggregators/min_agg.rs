use crate::{expressions::Literal, interpreter::booleans::cmp_impl, DBResult};

use super::Aggregator;

pub struct MinAgg {
    min: Literal,
}

impl MinAgg {
    pub fn new() -> Self {
        Self { min: Literal::Null }
    }
}

impl Default for MinAgg {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator for MinAgg {
    fn reset(&mut self) {
        self.min = Literal::Null;
    }

    fn add(&mut self, value: &Literal) -> DBResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if self.min.is_null() || cmp_impl(value, &self.min)?.is_lt() {
            self.min = value.clone();
        }
        Ok(())
    }

    fn result(&self) -> DBResult<Literal> {
        Ok(self.min.clone())
    }
}
