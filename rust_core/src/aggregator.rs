//! Cross-source merge policy.
//!
//! Records are keyed by address. When two records share an address the one with
//! strictly greater volume survives and ties keep whichever was seen first.
//! Records are never field-merged: a surviving record is exactly what one
//! source reported.

use crate::types::TokenRecord;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;

/// Merge two record sets. `a` is folded in before `b`, so `a` wins ties.
///
/// Output order is unspecified.
pub fn merge(a: Vec<TokenRecord>, b: Vec<TokenRecord>) -> Vec<TokenRecord> {
    merge_all([a, b])
}

/// Left-to-right fold of [`merge`] over any number of sources.
pub fn merge_all<I>(sources: I) -> Vec<TokenRecord>
where
    I: IntoIterator<Item = Vec<TokenRecord>>,
{
    let mut by_address: FxHashMap<String, TokenRecord> = FxHashMap::default();

    for source in sources {
        for record in source {
            absorb(&mut by_address, record);
        }
    }

    by_address.into_values().collect()
}

/// Collapse duplicates inside a single list using the same volume rule.
pub fn dedup_by_volume(records: Vec<TokenRecord>) -> Vec<TokenRecord> {
    merge_all([records])
}

fn absorb(by_address: &mut FxHashMap<String, TokenRecord>, record: TokenRecord) {
    match by_address.entry(record.address.clone()) {
        Entry::Occupied(mut existing) => {
            if record.volume > existing.get().volume {
                existing.insert(record);
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(record);
        }
    }
}
