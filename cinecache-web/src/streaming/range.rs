//! HTTP Range header interpretation for single byte ranges.
//!
//! Parsing is deliberately lenient: anything that is not a satisfiable or
//! unsatisfiable `bytes=<start>-[<end>]` request is served from the first
//! byte to the last, as a partial response.

/// How a request maps onto a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No Range header; serve the whole file with 200
    Full,
    /// Inclusive byte span served with 206
    Partial { start: u64, end: u64 },
    /// Start lies beyond the file; answer 416
    Unsatisfiable,
}

impl RangeSpec {
    /// Number of body bytes this range produces for a file of `size` bytes.
    pub fn content_length(&self, size: u64) -> u64 {
        match *self {
            RangeSpec::Full => size,
            RangeSpec::Partial { start, end } => end - start + 1,
            RangeSpec::Unsatisfiable => 0,
        }
    }
}

/// Resolves an optional Range header against a file size.
///
/// # Examples
/// ```
/// use cinecache_web::streaming::{RangeSpec, parse_range};
/// assert_eq!(
///     parse_range(Some("bytes=100-199"), 1000),
///     RangeSpec::Partial { start: 100, end: 199 }
/// );
/// assert_eq!(parse_range(Some("bytes=1000-"), 1000), RangeSpec::Unsatisfiable);
/// ```
pub fn parse_range(header: Option<&str>, size: u64) -> RangeSpec {
    let Some(header) = header else {
        return RangeSpec::Full;
    };
    if size == 0 {
        return RangeSpec::Unsatisfiable;
    }

    let whole = RangeSpec::Partial {
        start: 0,
        end: size - 1,
    };

    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return whole;
    };
    if spec.contains(',') {
        return whole;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return whole;
    };
    // Suffix ranges (`bytes=-500`) fall back as well
    let Ok(start) = start.trim().parse::<u64>() else {
        return whole;
    };
    if start >= size {
        return RangeSpec::Unsatisfiable;
    }

    let end = end.trim();
    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return whole,
        }
    };

    RangeSpec::Partial { start, end }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_no_header_is_full() {
        assert_eq!(parse_range(None, 1000), RangeSpec::Full);
        assert_eq!(parse_range(None, 0), RangeSpec::Full);
    }

    #[test]
    fn test_closed_and_open_ranges() {
        assert_eq!(
            parse_range(Some("bytes=100-199"), 1000),
            RangeSpec::Partial { start: 100, end: 199 }
        );
        assert_eq!(
            parse_range(Some("bytes=990-"), 1000),
            RangeSpec::Partial { start: 990, end: 999 }
        );
        assert_eq!(
            parse_range(Some("bytes=900-5000"), 1000),
            RangeSpec::Partial { start: 900, end: 999 }
        );
    }

    #[test]
    fn test_start_past_end_is_unsatisfiable() {
        assert_eq!(
            parse_range(Some("bytes=1000-1010"), 1000),
            RangeSpec::Unsatisfiable
        );
        assert_eq!(parse_range(Some("bytes=0-"), 0), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_malformed_headers_serve_everything() {
        let whole = RangeSpec::Partial { start: 0, end: 999 };
        for header in [
            "items=0-10",
            "bytes=abc-def",
            "bytes=-500",
            "bytes=0-10,20-30",
            "bytes=500-100",
            "bytes=10",
            "",
        ] {
            assert_eq!(parse_range(Some(header), 1000), whole, "{header:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_partial_ranges_stay_inside_file(
            size in 1u64..10_000_000,
            start in 0u64..20_000_000,
            end in proptest::option::of(0u64..20_000_000),
        ) {
            let header = match end {
                Some(end) => format!("bytes={start}-{end}"),
                None => format!("bytes={start}-"),
            };
            match parse_range(Some(&header), size) {
                RangeSpec::Partial { start: s, end: e } => {
                    prop_assert!(s <= e);
                    prop_assert!(e < size);
                    prop_assert_eq!(
                        RangeSpec::Partial { start: s, end: e }.content_length(size),
                        e - s + 1
                    );
                }
                RangeSpec::Unsatisfiable => prop_assert!(start >= size),
                RangeSpec::Full => prop_assert!(false, "header present"),
            }
        }

        #[test]
        fn prop_arbitrary_headers_never_panic(header in ".*", size in 0u64..1_000_000) {
            let _ = parse_range(Some(&header), size);
        }
    }
}
