use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::Result;

/// Binary search for a line in `[start, end)` of an already-open file whose
/// body is sorted ascending by the whitespace-delimited key at the start of
/// each line. Tolerates variable-length lines by resynchronizing to the next
/// newline before reading a candidate line. Returns the full matching line
/// (without its trailing newline), or `None` on a miss.
///
/// Used for both term lookup in the index body and doc-id lookup in the
/// document-mapping file — both are `KEY SP REST\n`, sorted ascending by key.
pub fn binary_search_line(file: &mut File, start: u64, end: u64, target: &str) -> Result<Option<String>> {
    let mut lo = start;
    let mut hi = end;

    while hi.saturating_sub(lo) > 1 {
        let mid = lo + (hi - lo) / 2;
        file.seek(SeekFrom::Start(mid))?;
        let mut reader = BufReader::new(&mut *file);

        // Discard a partial line unless we're already at a line boundary.
        if mid > lo {
            let mut discard = Vec::new();
            reader.read_until(b'\n', &mut discard)?;
        }

        let mut line = Vec::new();
        let bytes_read = reader.read_until(b'\n', &mut line)?;
        if bytes_read == 0 {
            hi = mid;
            continue;
        }
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        let key = line.split_whitespace().next().unwrap_or("");

        match key.cmp(target) {
            std::cmp::Ordering::Equal => return Ok(Some(line)),
            std::cmp::Ordering::Less => lo = mid,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }

    // Final narrow window: scan the remaining bytes directly, since a match
    // could straddle the last midpoint without ever landing on it.
    file.seek(SeekFrom::Start(lo))?;
    let mut buf = vec![0u8; (hi - lo) as usize];
    file.read_exact(&mut buf)?;
    for raw_line in buf.split(|&b| b == b'\n') {
        if raw_line.is_empty() {
            continue;
        }
        let line = String::from_utf8_lossy(raw_line).trim_end_matches('\r').to_string();
        let key = line.split_whitespace().next().unwrap_or("");
        if key == target {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn finds_every_term_in_a_sorted_body() {
        let mut file = NamedTempFile::new().unwrap();
        let lines = ["apple 1", "banana 2", "cherry 3", "date 4", "fig 5"];
        let body = lines.join("\n") + "\n";
        file.write_all(body.as_bytes()).unwrap();
        let mut f = file.reopen().unwrap();
        let end = body.len() as u64;

        for (term, value) in [("apple", "1"), ("banana", "2"), ("cherry", "3"), ("date", "4"), ("fig", "5")] {
            let found = binary_search_line(&mut f, 0, end, term).unwrap().unwrap();
            assert_eq!(found, format!("{term} {value}"));
        }
    }

    #[test]
    fn reports_miss_for_absent_term() {
        let mut file = NamedTempFile::new().unwrap();
        let body = "apple 1\nbanana 2\ncherry 3\n";
        file.write_all(body.as_bytes()).unwrap();
        let mut f = file.reopen().unwrap();
        let found = binary_search_line(&mut f, 0, body.len() as u64, "quince").unwrap();
        assert!(found.is_none());
    }
}
