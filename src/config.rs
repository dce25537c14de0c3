use serde::{Deserialize, Serialize};

use crate::{DBError, DBResult};

const DEFAULT_MAX_IN_MEMORY_TEMP_ROWS: usize = 100_000;
const DEFAULT_BKA_BATCH_SIZE: usize = 128;

/// Knobs of one query execution. Read from the `config` section of a plan
/// file; any `CRACKEXEC_*` environment variable overrides the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub profiling: bool,
    pub batch_mode: bool,
    /// Rows a temp table keeps in memory before it spills to disk.
    pub max_in_memory_temp_rows: usize,
    /// Outer rows a batched key access join buffers per inner lookup round.
    pub bka_batch_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            profiling: false,
            batch_mode: true,
            max_in_memory_temp_rows: DEFAULT_MAX_IN_MEMORY_TEMP_ROWS,
            bka_batch_size: DEFAULT_BKA_BATCH_SIZE,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> DBResult<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> DBResult<Self> {
        if let Some(v) = env_value("CRACKEXEC_PROFILING") {
            self.profiling = parse_bool("CRACKEXEC_PROFILING", &v)?;
        }
        if let Some(v) = env_value("CRACKEXEC_BATCH_MODE") {
            self.batch_mode = parse_bool("CRACKEXEC_BATCH_MODE", &v)?;
        }
        if let Some(v) = env_value("CRACKEXEC_MAX_IN_MEMORY_TEMP_ROWS") {
            self.max_in_memory_temp_rows = parse_usize("CRACKEXEC_MAX_IN_MEMORY_TEMP_ROWS", &v)?;
        }
        if let Some(v) = env_value("CRACKEXEC_BKA_BATCH_SIZE") {
            self.bka_batch_size = parse_usize("CRACKEXEC_BKA_BATCH_SIZE", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> DBResult<()> {
        if self.bka_batch_size == 0 {
            return Err(DBError::Config("bka_batch_size must be positive".to_owned()));
        }
        if self.max_in_memory_temp_rows == 0 {
            return Err(DBError::Config(
                "max_in_memory_temp_rows must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> DBResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(DBError::Config(format!("{key}: expected a boolean, got {value}"))),
    }
}

fn parse_usize(key: &str, value: &str) -> DBResult<usize> {
    value
        .parse::<usize>()
        .map_err(|e| DBError::Config(format!("{key}: {e}")))
}
