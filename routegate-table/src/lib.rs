// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use routegate_core::CaseMode;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::sync::Arc;
use std::time::Duration;

/// Category name for route table related logging
pub static LOG_CATEGORY: &str = "route";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid error {message}"))]
    Invalid { message: String },
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A resolved, flattened, priority-ordered candidate array. Shared between
/// the cache and every caller that resolved the same key.
pub type Candidates<T> = Arc<[T]>;

pub(crate) fn empty_candidates<T>() -> Candidates<T> {
    Arc::new([])
}

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// How long a synchronous lookup waits for a racing cache population before
/// giving up and resolving uncached. Named on its own so it cannot be
/// mistaken for anything priority related.
pub const DEFAULT_POPULATE_TIMEOUT: Duration = Duration::from_millis(100);

/// Parameters fixed per table instance when the builder is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// How keys are compared and folded, for the exact map, the trie and the
    /// cache alike.
    pub case_mode: CaseMode,
    /// Upper bound on cached resolved keys.
    pub cache_capacity: usize,
    /// Bounded wait applied to synchronous lookups racing an in-flight
    /// cache population.
    #[serde(with = "humantime_serde")]
    pub populate_timeout: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            case_mode: CaseMode::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            populate_timeout: DEFAULT_POPULATE_TIMEOUT,
        }
    }
}

impl TableConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Invalid {
                message: "cache capacity must be greater than zero"
                    .to_string(),
            });
        }
        Ok(())
    }
}

mod cache;
mod table;
mod two_level;
mod winner;

pub use table::*;
pub use two_level::*;
pub use winner::*;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_config_default() {
        let conf = TableConfig::default();
        assert_eq!(CaseMode::Ordinal, conf.case_mode);
        assert_eq!(DEFAULT_CACHE_CAPACITY, conf.cache_capacity);
        assert_eq!(DEFAULT_POPULATE_TIMEOUT, conf.populate_timeout);
        assert_eq!(true, conf.validate().is_ok());
    }

    #[test]
    fn test_table_config_from_toml() {
        let conf: TableConfig = toml::from_str(
            r#"
case_mode = "ignore_case"
cache_capacity = 128
populate_timeout = "50ms"
"#,
        )
        .unwrap();
        assert_eq!(CaseMode::IgnoreCase, conf.case_mode);
        assert_eq!(128, conf.cache_capacity);
        assert_eq!(Duration::from_millis(50), conf.populate_timeout);

        // missing fields fall back to defaults
        let conf: TableConfig = toml::from_str("cache_capacity = 16").unwrap();
        assert_eq!(CaseMode::Ordinal, conf.case_mode);
        assert_eq!(16, conf.cache_capacity);
    }

    #[test]
    fn test_table_config_validate() {
        let conf = TableConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            "Invalid error cache capacity must be greater than zero",
            conf.validate().err().unwrap().to_string()
        );
    }
}
