use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Reduce `items` to the newest one per key.
///
/// Equal timestamps resolve to the item seen last, so the result only depends
/// on input order when true ties exist. Keys come back sorted.
pub fn select_latest<'a, T, K, I, F, G>(items: I, key: F, time: G) -> BTreeMap<K, &'a T>
where
    T: 'a,
    K: Ord,
    I: IntoIterator<Item = &'a T>,
    F: Fn(&'a T) -> K,
    G: Fn(&T) -> DateTime<Utc>,
{
    let mut latest: BTreeMap<K, &'a T> = BTreeMap::new();
    for item in items {
        match latest.entry(key(item)) {
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
            Entry::Occupied(mut slot) => {
                if time(item) >= time(slot.get()) {
                    slot.insert(item);
                }
            }
        }
    }
    latest
}
