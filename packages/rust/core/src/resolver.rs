//! Census block GEOID → eligibility verdict.

use tractcheck_shared::{BlockGeoid, Verdict};

use crate::reference::ReferenceIndex;

/// Decide eligibility for a geocoded block.
///
/// The block's tract prefix is its GEOID minus the trailing `suffix_len`
/// block digits. Qualified only if either reference table affirms the prefix;
/// a prefix no table mentions, or an empty prefix, is not qualified.
pub fn resolve(geoid: &BlockGeoid, index: &ReferenceIndex, suffix_len: usize) -> Verdict {
    let prefix = geoid.tract_prefix(suffix_len);
    let lookup = index.lookup_detail(prefix);

    tracing::trace!(
        %geoid,
        prefix,
        first = ?lookup.first,
        second = ?lookup.second,
        "tract lookup"
    );

    if lookup.is_affirmative() {
        Verdict::Qualified
    } else {
        Verdict::NotQualified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geoid(raw: &str) -> BlockGeoid {
        BlockGeoid::parse(raw, 15).unwrap()
    }

    #[test]
    fn silver_hill_block_qualifies() {
        let index = ReferenceIndex::build([("11001006202", "yes")], [("24033802405", "no")]);
        assert_eq!(resolve(&geoid("110010062021006"), &index, 4), Verdict::Qualified);
    }

    #[test]
    fn second_table_alone_qualifies() {
        let index = ReferenceIndex::build([("11001006202", "no")], [("11001006202", "Yes")]);
        assert_eq!(resolve(&geoid("110010062021006"), &index, 4), Verdict::Qualified);
    }

    #[test]
    fn unknown_or_negative_tract_is_not_qualified() {
        let index = ReferenceIndex::build([("11001006202", "no")], [("99999999999", "yes")]);
        assert_eq!(resolve(&geoid("110010062021006"), &index, 4), Verdict::NotQualified);
        assert_eq!(resolve(&geoid("240338024051000"), &index, 4), Verdict::NotQualified);
    }

    #[test]
    fn oversized_suffix_is_not_qualified() {
        let index = ReferenceIndex::build([("11001006202", "yes")], [("1", "yes")]);
        assert_eq!(resolve(&geoid("110010062021006"), &index, 15), Verdict::NotQualified);
        assert_eq!(resolve(&geoid("110010062021006"), &index, 40), Verdict::NotQualified);
    }
}
