//! Splitting of profiler log records into fields.

/// Split one log line into its comma-separated fields.
///
/// A field may be enclosed in double quotes, in which case it can
/// contain commas; a backslash escapes the following character. Returns
/// `None` for structurally broken lines (an unterminated quoted field),
/// which callers skip.
pub(crate) fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = line;

    loop {
        if let Some(quoted) = rest.strip_prefix('"') {
            let mut field = String::new();
            let mut iter = quoted.char_indices();
            let mut end = None;
            while let Some((idx, c)) = iter.next() {
                match c {
                    '\\' => {
                        let (_idx, escaped) = iter.next()?;
                        let () = field.push(escaped);
                    }
                    '"' => {
                        end = Some(idx);
                        break
                    }
                    c => field.push(c),
                }
            }
            let end = end?;
            let () = fields.push(field);

            // Anything between the closing quote and the next
            // separator is discarded.
            let after = &quoted[end + 1..];
            match after.find(',') {
                Some(comma) => rest = &after[comma + 1..],
                None => break,
            }
        } else {
            match rest.split_once(',') {
                Some((field, tail)) => {
                    let () = fields.push(field.to_string());
                    rest = tail;
                }
                None => {
                    let () = fields.push(rest.to_string());
                    break
                }
            }
        }
    }
    Some(fields)
}
