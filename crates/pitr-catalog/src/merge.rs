//! Merge: collapses per-file catalog entries into continuous
//! recoverable-time windows. A pure function over [`LogMetadata`] — no I/O.

use crate::model::LogMetadata;

/// A contiguous recoverable range, identified by the composite keys of its
/// first and last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start_key: String,
    pub end_key: String,
}

/// Returns the sequence of `[startKey, endKey]` ranges covering only entries
/// with a non-empty `replica_path`, sorted by `first_time` and merged
/// wherever one entry's `next_time` equals the next entry's `first_time`.
pub fn merge(catalog: &LogMetadata) -> Vec<Range> {
    let mut keys: Vec<&String> = catalog.0.iter().filter(|(_, e)| e.is_replicated()).map(|(k, _)| k).collect();
    keys.sort_by_key(|k| catalog.0[*k].first_time);

    let mut ranges = Vec::new();
    let mut iter = keys.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };
    let mut curr_start = first;
    let mut curr_end = first;

    for key in iter {
        let prev_next_time = catalog.0[curr_end].next_time;
        let this_first_time = catalog.0[key].first_time;
        if prev_next_time == this_first_time {
            curr_end = key;
        } else {
            ranges.push(Range {
                start_key: curr_start.clone(),
                end_key: curr_end.clone(),
            });
            curr_start = key;
            curr_end = key;
        }
    }
    ranges.push(Range {
        start_key: curr_start.clone(),
        end_key: curr_end.clone(),
    });
    ranges
}
