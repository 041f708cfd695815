use crate::Addr;


/// Parse a hexadecimal address, with or without a `0x` prefix.
pub(crate) fn parse_hex_addr(s: &str) -> Option<Addr> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    Addr::from_str_radix(s, 16).ok()
}

/// Perform a binary search on a slice, returning the index of the match
/// (if found) or the one of the previous item (if any).
///
/// This functionality is useful for cases where we compare elements
/// with a size, such as address ranges, where an item to search for can
/// be covered by an element whose key is less than the item.
pub(crate) fn find_match_or_lower_bound_by_key<T, U, F>(
    slice: &[T],
    item: U,
    mut f: F,
) -> Option<usize>
where
    U: Ord,
    F: FnMut(&T) -> U,
{
    let idx = slice.partition_point(|e| f(e) < item);

    // At this point `idx` references the first item greater or equal to
    // the one we are looking for.
    if let Some(e) = slice.get(idx) {
        if f(e) == item {
            return Some(idx)
        }
    }

    // Otherwise `idx` points to a "greater" item (or one past the end),
    // so the previous item is the lower bound, if it exists.
    idx.checked_sub(1)
}
