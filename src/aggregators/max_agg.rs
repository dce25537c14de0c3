use crate::{expressions::Literal, interpreter::booleans::cmp_impl, DBResult};

use super::Aggregator;

pub struct MaxAgg {
    max: Literal,
}

impl MaxAgg {
    pub fn new() -> Self {
        Self { max: Literal::Null }
    }
}

impl Default for MaxAgg {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator for MaxAgg {
    fn reset(&mut self) {
        self.max = Literal::Null;
    }

    fn add(&mut self, value: &Literal) -> DBResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if self.max.is_null() || cmp_impl(value, &self.max)?.is_gt() {
            self.max = value.clone();
        }
        Ok(())
    }

    fn result(&self) -> DBResult<Literal> {
        Ok(self.max.clone())
    }
}
