//! Tract eligibility index built from the two reference tables.
//!
//! Each table contributes `(tract key, flag)` pairs. A key matches a lookup
//! prefix when it *contains* the prefix, since reference rows may carry extra
//! sub-tract digits. Every matching row counts: a table affirms a prefix if any
//! of its matching rows is flagged "yes".
//!
//! The index is never mutated after [`ReferenceIndex::build`], so it is shared
//! between workers behind an `Arc` with no locking.

use serde::Serialize;

/// One table's say about a tract prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Contribution {
    /// At least one matching row is flagged "yes".
    Affirmative,
    /// Matching rows exist, none flagged "yes".
    Negative,
    /// No row matches.
    Absent,
}

impl Contribution {
    pub fn is_affirmative(&self) -> bool {
        matches!(self, Self::Affirmative)
    }
}

/// Per-table contributions for one prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TractLookup {
    pub first: Contribution,
    pub second: Contribution,
}

impl TractLookup {
    /// Either table affirms.
    pub fn is_affirmative(&self) -> bool {
        self.first.is_affirmative() || self.second.is_affirmative()
    }

    /// Combined tri-state: affirmative if either affirms, negative if either
    /// has a matching row, otherwise absent.
    pub fn combined(&self) -> Contribution {
        match (self.first, self.second) {
            (Contribution::Affirmative, _) | (_, Contribution::Affirmative) => {
                Contribution::Affirmative
            }
            (Contribution::Absent, Contribution::Absent) => Contribution::Absent,
            _ => Contribution::Negative,
        }
    }
}

/// `true` for the literal flag "yes" in any letter case.
pub fn is_affirmative_flag(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("yes")
}

#[derive(Debug, Clone, Default)]
struct SourceTable {
    entries: Vec<(String, bool)>,
}

impl SourceTable {
    fn from_pairs<K, F>(pairs: impl IntoIterator<Item = (K, F)>) -> Self
    where
        K: AsRef<str>,
        F: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, flag)| {
                (
                    key.as_ref().trim().to_string(),
                    is_affirmative_flag(flag.as_ref()),
                )
            })
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { entries }
    }

    fn contribution(&self, prefix: &str) -> Contribution {
        let mut seen = false;
        for (key, affirmative) in &self.entries {
            if key.contains(prefix) {
                if *affirmative {
                    return Contribution::Affirmative;
                }
                seen = true;
            }
        }
        if seen {
            Contribution::Negative
        } else {
            Contribution::Absent
        }
    }

    fn affirmative_count(&self) -> usize {
        self.entries.iter().filter(|(_, a)| *a).count()
    }
}

/// Immutable lookup from tract prefix to eligibility.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    first: SourceTable,
    second: SourceTable,
}

impl ReferenceIndex {
    /// Build from the two tables' `(tract key, flag)` pairs. Rows with an
    /// empty key are ignored.
    pub fn build<K1, F1, K2, F2>(
        first: impl IntoIterator<Item = (K1, F1)>,
        second: impl IntoIterator<Item = (K2, F2)>,
    ) -> Self
    where
        K1: AsRef<str>,
        F1: AsRef<str>,
        K2: AsRef<str>,
        F2: AsRef<str>,
    {
        let index = Self {
            first: SourceTable::from_pairs(first),
            second: SourceTable::from_pairs(second),
        };
        tracing::debug!(
            first_rows = index.first.entries.len(),
            first_affirmative = index.first.affirmative_count(),
            second_rows = index.second.entries.len(),
            second_affirmative = index.second.affirmative_count(),
            "reference index built"
        );
        index
    }

    /// Combined verdict contribution for a prefix. An empty prefix never matches.
    pub fn lookup(&self, prefix: &str) -> Contribution {
        self.lookup_detail(prefix).combined()
    }

    /// Per-table contributions for a prefix.
    pub fn lookup_detail(&self, prefix: &str) -> TractLookup {
        if prefix.is_empty() {
            return TractLookup {
                first: Contribution::Absent,
                second: Contribution::Absent,
            };
        }
        TractLookup {
            first: self.first.contribution(prefix),
            second: self.second.contribution(prefix),
        }
    }

    /// Rows held, per table.
    pub fn len(&self) -> (usize, usize) {
        (self.first.entries.len(), self.second.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.first.entries.is_empty() && self.second.entries.is_empty()
    }
}
