//! Per-row work: geocode one record and resolve its verdict.

use tracing::{debug, instrument};

use tractcheck_geocoder::Geocode;
use tractcheck_shared::{Record, Verdict};

use crate::reference::ReferenceIndex;
use crate::resolver::resolve;

/// Everything a worker needs, shared read-only across tasks.
#[derive(Debug)]
pub struct RowContext<G> {
    pub geocoder: G,
    pub index: ReferenceIndex,
    pub tract_suffix_len: usize,
}

impl<G: Geocode> RowContext<G> {
    pub fn new(geocoder: G, index: ReferenceIndex, tract_suffix_len: usize) -> Self {
        Self {
            geocoder,
            index,
            tract_suffix_len,
        }
    }
}

/// Geocode `record` and resolve it to a verdict.
///
/// A geocode failure becomes `Skipped` with its reason and the reference
/// tables are not consulted. Never fails.
#[instrument(skip_all, fields(index = record.index))]
pub async fn process<G: Geocode>(record: &Record, ctx: &RowContext<G>) -> (usize, Verdict) {
    let verdict = match ctx.geocoder.geocode(&record.address).await {
        Ok(geoid) => resolve(&geoid, &ctx.index, ctx.tract_suffix_len),
        Err(reason) => {
            debug!(%reason, street = %record.address.street, "row skipped");
            Verdict::Skipped(reason)
        }
    };
    (record.index, verdict)
}
