//! Index-keyed result table.

use std::collections::BTreeMap;

use tractcheck_shared::{Record, Result, TractcheckError, Verdict};

/// One slot per input record, keyed by record index.
///
/// A slot is `None` until its row's verdict is written, and can be written
/// once. Rows a cancelled run never reached stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    slots: BTreeMap<usize, Option<Verdict>>,
}

impl ResultTable {
    /// Empty slots for `records`. Duplicate indices are rejected.
    pub fn for_records(records: &[Record]) -> Result<Self> {
        let mut slots = BTreeMap::new();
        for record in records {
            if slots.insert(record.index, None).is_some() {
                return Err(TractcheckError::validation(format!(
                    "duplicate record index {}",
                    record.index
                )));
            }
        }
        Ok(Self { slots })
    }

    /// Write a row's verdict.
    pub fn record(&mut self, index: usize, verdict: Verdict) -> Result<()> {
        match self.slots.get_mut(&index) {
            Some(slot @ None) => {
                *slot = Some(verdict);
                Ok(())
            }
            Some(Some(_)) => Err(TractcheckError::validation(format!(
                "verdict for record {index} written twice"
            ))),
            None => Err(TractcheckError::validation(format!(
                "no record with index {index}"
            ))),
        }
    }

    /// The verdict for `index`, if its row resolved.
    pub fn verdict(&self, index: usize) -> Option<&Verdict> {
        self.slots.get(&index).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.slots.values().filter(|v| v.is_some()).count()
    }

    /// Rows with no verdict, ascending.
    pub fn unresolved_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| *i)
            .collect()
    }

    /// Resolved rows whose verdict matches `pred`.
    pub fn count_where(&self, pred: impl Fn(&Verdict) -> bool) -> usize {
        self.slots.values().flatten().filter(|&v| pred(v)).count()
    }

    /// Every slot in index order.
    pub fn entries(&self) -> Vec<(usize, Option<Verdict>)> {
        self.slots.iter().map(|(i, v)| (*i, *v)).collect()
    }
}
