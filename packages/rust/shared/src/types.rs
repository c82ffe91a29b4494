//! Core domain types: records, geocode results and verdicts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The address fields sent to the geocoding service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// One input facility row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position of the row in the source dataset. Stable across filtering and
    /// used to place the row's verdict.
    pub index: usize,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_date: Option<String>,
}

// ---------------------------------------------------------------------------
// BlockGeoid
// ---------------------------------------------------------------------------

/// A census block GEOID as returned by the geocoder.
///
/// Always non-empty, ASCII digits only, and of the length it was validated
/// against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockGeoid(String);

impl BlockGeoid {
    /// Validate a raw identifier. Returns `None` unless `raw` is exactly
    /// `expected_len` ASCII digits.
    pub fn parse(raw: &str, expected_len: usize) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() != expected_len || !raw.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier with `suffix_len` trailing characters removed.
    ///
    /// A suffix at least as long as the identifier yields an empty prefix.
    pub fn tract_prefix(&self, suffix_len: usize) -> &str {
        let keep = self.0.len().saturating_sub(suffix_len);
        &self.0[..keep]
    }
}

impl std::fmt::Display for BlockGeoid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Why no verdict could be computed for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The service returned an empty match list.
    NoAddressMatch,
    /// A match had no geographies section or no census block.
    NoGeographyBlock,
    /// The first census block carried no (or an empty) GEOID.
    NoFipsCode,
    /// The response body did not have the expected shape.
    MalformedResponse,
    /// Connection failure, timeout, or an unreadable error response.
    TransportError,
}

impl SkipReason {
    /// Every reason, in reporting order.
    pub const ALL: [SkipReason; 5] = [
        Self::NoAddressMatch,
        Self::NoGeographyBlock,
        Self::NoFipsCode,
        Self::MalformedResponse,
        Self::TransportError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAddressMatch => "no_address_match",
            Self::NoGeographyBlock => "no_geography_block",
            Self::NoFipsCode => "no_fips_code",
            Self::MalformedResponse => "malformed_response",
            Self::TransportError => "transport_error",
        }
    }

    /// Position in [`SkipReason::ALL`], used for per-reason counters.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final per-row outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Qualified,
    NotQualified,
    Skipped(SkipReason),
}

impl Verdict {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// The boolean eligibility flag, if one was computed.
    pub fn qualifies(&self) -> Option<bool> {
        match self {
            Self::Qualified => Some(true),
            Self::NotQualified => Some(false),
            Self::Skipped(_) => None,
        }
    }
}
