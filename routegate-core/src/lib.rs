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

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum::{Display, EnumString};

mod priority;
mod radix_trie;

pub use priority::*;
pub use radix_trie::*;

/// How routing keys are compared, fixed per index instance.
///
/// Routing keys are hostnames and URL paths, so case-insensitive comparison
/// folds ASCII letters only.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Ordinal,
    IgnoreCase,
}

impl CaseMode {
    /// Normalizes a key for this comparison mode. Borrows when the key is
    /// already in normal form.
    #[inline]
    pub fn fold<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self {
            CaseMode::Ordinal => Cow::Borrowed(key),
            CaseMode::IgnoreCase => {
                if key.bytes().any(|b| b.is_ascii_uppercase()) {
                    Cow::Owned(key.to_ascii_lowercase())
                } else {
                    Cow::Borrowed(key)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_case_mode_fold() {
        assert_eq!("Svc.Local", CaseMode::Ordinal.fold("Svc.Local"));
        assert_eq!("svc.local", CaseMode::IgnoreCase.fold("Svc.Local"));
        assert_eq!(
            true,
            matches!(CaseMode::IgnoreCase.fold("svc.local"), Cow::Borrowed(_))
        );
    }

    #[test]
    fn test_case_mode_from_str() {
        assert_eq!(CaseMode::Ordinal, CaseMode::from_str("ordinal").unwrap());
        assert_eq!(
            CaseMode::IgnoreCase,
            CaseMode::from_str("ignore_case").unwrap()
        );
        assert_eq!(true, CaseMode::from_str("unknown").is_err());
    }
}
