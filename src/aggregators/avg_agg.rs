use crate::{expressions::Literal, DBError, DBResult};

use super::Aggregator;

pub struct AvgAgg {
    sum: f64,
    count: u64,
}

impl AvgAgg {
    pub fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }
}

impl Default for AvgAgg {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator for AvgAgg {
    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    fn add(&mut self, value: &Literal) -> DBResult<()> {
        let v = match value {
            Literal::Null => return Ok(()),
            Literal::Int32(v) => *v as f64,
            Literal::Int64(v) => *v as f64,
            Literal::UInt64(v) => *v as f64,
            Literal::Float64(v) => *v,
            other => {
                return Err(DBError::InterpretingError(format!(
                    "avg is not defined for {other:?}"
                )))
            }
        };
        self.sum += v;
        self.count += 1;
        Ok(())
    }

    fn result(&self) -> DBResult<Literal> {
        if self.count == 0 {
            return Ok(Literal::Null);
        }
        Ok(Literal::Float64(self.sum / (self.count as f64)))
    }
}
