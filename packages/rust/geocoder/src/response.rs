//! Interpretation of the geographies-by-address JSON envelope.
//!
//! Expected shape:
//!
//! ```json
//! { "result": { "addressMatches": [
//!     { "geographies": { "Census Blocks": [ { "GEOID": "110010062021006" } ] } }
//! ] } }
//! ```
//!
//! Every optional level that is missing maps to a specific [`SkipReason`].

use serde::Deserialize;
use serde_json::Value;
use tractcheck_shared::{BlockGeoid, SkipReason};

// ---------------------------------------------------------------------------
// Envelope types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    result: GeocodeResult,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    /// Kept raw so one unreadable entry does not hide a good match.
    #[serde(rename = "addressMatches")]
    address_matches: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AddressMatch {
    #[serde(default)]
    geographies: Option<Geographies>,
}

#[derive(Debug, Deserialize)]
struct Geographies {
    #[serde(rename = "Census Blocks", default)]
    census_blocks: Option<Vec<CensusBlock>>,
}

#[derive(Debug, Deserialize)]
struct CensusBlock {
    /// Usually a string; some vintages have returned it as a number.
    #[serde(rename = "GEOID", default)]
    geoid: Option<Value>,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

/// Interpret a raw response body.
pub fn interpret(body: &str, geoid_length: usize) -> Result<BlockGeoid, SkipReason> {
    let value: Value = serde_json::from_str(body).map_err(|_| SkipReason::MalformedResponse)?;
    interpret_value(value, geoid_length)
}

/// Interpret an already-parsed JSON document.
///
/// Matches are scanned in order and the first one that yields a GEOID wins.
/// When none does, the reason from the first match is reported. An entry
/// that is not a match object counts as a `MalformedResponse` failure for
/// that entry only.
pub fn interpret_value(value: Value, geoid_length: usize) -> Result<BlockGeoid, SkipReason> {
    let envelope: Envelope =
        serde_json::from_value(value).map_err(|_| SkipReason::MalformedResponse)?;

    let mut first_failure = None;
    for raw_match in envelope.result.address_matches {
        let outcome = serde_json::from_value::<AddressMatch>(raw_match)
            .map_err(|_| SkipReason::MalformedResponse)
            .and_then(|address_match| match_geoid(&address_match, geoid_length));
        match outcome {
            Ok(geoid) => return Ok(geoid),
            Err(reason) => {
                first_failure.get_or_insert(reason);
            }
        }
    }

    Err(first_failure.unwrap_or(SkipReason::NoAddressMatch))
}

fn match_geoid(address_match: &AddressMatch, geoid_length: usize) -> Result<BlockGeoid, SkipReason> {
    let blocks = address_match
        .geographies
        .as_ref()
        .and_then(|g| g.census_blocks.as_ref())
        .ok_or(SkipReason::NoGeographyBlock)?;

    let first_block = blocks.first().ok_or(SkipReason::NoGeographyBlock)?;

    let raw = match &first_block.geoid {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => return Err(SkipReason::NoFipsCode),
        Some(_) => return Err(SkipReason::MalformedResponse),
    };

    if raw.is_empty() {
        return Err(SkipReason::NoFipsCode);
    }

    BlockGeoid::parse(&raw, geoid_length).ok_or(SkipReason::MalformedResponse)
}
