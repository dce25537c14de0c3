use std::fmt::Display;

use crate::{
    data_types::DataType,
    expressions::{Expression, Literal},
    DBResult,
};

mod avg_agg;
mod count_agg;
mod max_agg;
mod min_agg;
mod sum_agg;
pub use avg_agg::AvgAgg;
pub use count_agg::CountAgg;
pub use max_agg::MaxAgg;
pub use min_agg::MinAgg;
pub use sum_agg::SumAgg;

/// Accumulator of one aggregate function over one group.
pub trait Aggregator {
    fn reset(&mut self);

    fn add(&mut self, value: &Literal) -> DBResult<()>;

    fn result(&self) -> DBResult<Literal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "count" => Some(AggregateKind::Count),
            "sum" => Some(AggregateKind::Sum),
            "avg" => Some(AggregateKind::Avg),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            _ => None,
        }
    }
}

impl Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateKind::Count => "count".fmt(f),
            AggregateKind::Sum => "sum".fmt(f),
            AggregateKind::Avg => "avg".fmt(f),
            AggregateKind::Min => "min".fmt(f),
            AggregateKind::Max => "max".fmt(f),
        }
    }
}

/// An aggregate function of a query block. `arg` is `None` for COUNT(*).
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    pub arg: Option<Expression>,
    pub name: String,
}

impl AggregateSpec {
    pub fn new(kind: AggregateKind, arg: Option<Expression>) -> Self {
        let name = match &arg {
            Some(arg) => format!("{kind}({arg})"),
            None => format!("{kind}(*)"),
        };
        Self { kind, arg, name }
    }

    pub fn count_star() -> Self {
        Self::new(AggregateKind::Count, None)
    }

    pub fn data_type(&self) -> DataType {
        match (self.kind, &self.arg) {
            (AggregateKind::Count, _) => DataType::UInt64,
            (AggregateKind::Avg, _) => DataType::Float64,
            (AggregateKind::Sum, Some(arg)) if arg.data_type() == DataType::Float64 => {
                DataType::Float64
            }
            (AggregateKind::Sum, Some(arg)) if arg.data_type() == DataType::UInt64 => {
                DataType::UInt64
            }
            (AggregateKind::Sum, _) => DataType::Int64,
            (AggregateKind::Min | AggregateKind::Max, Some(arg)) => arg.data_type(),
            (AggregateKind::Min | AggregateKind::Max, None) => DataType::Unknown,
        }
    }

    pub fn aggregator(&self) -> Box<dyn Aggregator> {
        match self.kind {
            AggregateKind::Count => Box::new(CountAgg::new(self.arg.is_none())),
            AggregateKind::Sum => Box::new(SumAgg::new()),
            AggregateKind::Avg => Box::new(AvgAgg::new()),
            AggregateKind::Min => Box::new(MinAgg::new()),
            AggregateKind::Max => Box::new(MaxAgg::new()),
        }
    }
}
