//! Case-insensitive, numeric-aware text ordering.
//!
//! Every value is reduced to a byte key whose plain byte order is the collation order, so
//! the in-memory sort and the on-disk index trees agree by construction.

use std::cmp::Ordering;

const DIGITS_TAG: u8 = 0x01;
const CHAR_TAG: u8 = 0x02;
/// Separates a key from the ordinal suffix of an index entry. Lower than any tag, so a
/// key sorts before every key it is a prefix of.
pub const KEY_TERMINATOR: u8 = 0x00;

/// Builds the collation key for `value`.
///
/// Runs of ASCII digits compare by numeric value (leading zeros ignored) and sort before
/// any other character; everything else compares by its lowercase form.
pub fn collation_key(value: &str) -> Vec<u8> {
    let lower = value.to_lowercase();
    let mut key = Vec::with_capacity(lower.len() * 2);
    let mut chars = lower.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch.is_ascii_digit() {
            let mut end = start + ch.len_utf8();
            while let Some(&(idx, next)) = chars.peek() {
                if !next.is_ascii_digit() {
                    break;
                }
                end = idx + next.len_utf8();
                chars.next();
            }
            let significant = lower[start..end].trim_start_matches('0');
            key.push(DIGITS_TAG);
            key.extend_from_slice(&(significant.len() as u32).to_be_bytes());
            key.extend_from_slice(significant.as_bytes());
        } else {
            let mut buf = [0u8; 4];
            key.push(CHAR_TAG);
            key.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    key
}

pub fn compare_text(a: &str, b: &str) -> Ordering {
    collation_key(a).cmp(&collation_key(b))
}

/// Turns an ascending, stably ordered list into descending order while keeping entries
/// with equal keys in their original relative order.
pub fn descending_stable<K: PartialEq, T>(ascending: Vec<(K, T)>) -> Vec<T> {
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut current_key: Option<K> = None;
    for (key, item) in ascending {
        if current_key.as_ref() == Some(&key) {
            if let Some(group) = groups.last_mut() {
                group.push(item);
                continue;
            }
        }
        groups.push(vec![item]);
        current_key = Some(key);
    }
    groups.into_iter().rev().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(compare_text("2", "10"), Ordering::Less);
        assert_eq!(compare_text("item 9", "item 10"), Ordering::Less);
        assert_eq!(compare_text("007", "7"), Ordering::Equal);
        assert_eq!(compare_text("1.5", "1.10"), Ordering::Less);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(compare_text("Ann", "ann"), Ordering::Equal);
        assert_eq!(compare_text("bob", "Carl"), Ordering::Less);
    }

    #[test]
    fn prefix_and_empty_sort_first() {
        assert_eq!(compare_text("", "a"), Ordering::Less);
        assert_eq!(compare_text("ab", "abc"), Ordering::Less);
        assert_eq!(compare_text("9", "a"), Ordering::Less);
    }

    #[test]
    fn terminated_keys_keep_prefix_order() {
        let mut short = collation_key("ab");
        short.push(KEY_TERMINATOR);
        short.extend_from_slice(&u64::MAX.to_be_bytes());
        let mut long = collation_key("abc");
        long.push(KEY_TERMINATOR);
        long.extend_from_slice(&0u64.to_be_bytes());
        assert!(short < long);
    }

    #[test]
    fn descending_keeps_ties_in_storage_order() {
        let ascending = vec![("a", 0), ("b", 1), ("b", 3), ("c", 2)];
        assert_eq!(descending_stable(ascending), vec![2, 1, 3, 0]);
    }
}
