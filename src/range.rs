//! Start-offset parsing for `Range: bytes=<spec>-` requests.
//!
//! Besides plain byte offsets, the start position accepts a percentage of the
//! file (`50%`) and magnitude suffixes: decimal `k`/`kb`, `m`/`mb`, `g`/`gb`
//! and binary `kib`, `mib`, `gib`. Anything unparseable means "from the
//! beginning" rather than an error reply.

/// Binary suffixes are listed first: `kib` also ends in `b`.
const SUFFIXES: [(&str, u64); 9] = [
    ("kib", 1024),
    ("mib", 1024 * 1024),
    ("gib", 1024 * 1024 * 1024),
    ("kb", 1000),
    ("mb", 1000 * 1000),
    ("gb", 1000 * 1000 * 1000),
    ("k", 1000),
    ("m", 1000 * 1000),
    ("g", 1000 * 1000 * 1000),
];

/// A parsed start position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeSpec {
    /// Absolute byte offset.
    Bytes(u64),
    /// Fraction of the known file size, in percent.
    Percent(f64),
}

impl RangeSpec {
    /// Parse a start position. Returns `None` for anything malformed.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim().to_lowercase();
        if spec.is_empty() {
            return Some(RangeSpec::Bytes(0));
        }

        if let Some(number) = spec.strip_suffix('%') {
            let percent: f64 = number.trim().parse().ok()?;
            return percent.is_finite().then_some(RangeSpec::Percent(percent));
        }

        for (suffix, multiplier) in SUFFIXES {
            if spec.ends_with(suffix) {
                let digits: String = spec
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                let value: u64 = digits.parse().ok()?;
                return value.checked_mul(multiplier).map(RangeSpec::Bytes);
            }
        }

        spec.parse().ok().map(RangeSpec::Bytes)
    }

    /// Resolve to a byte offset against the file's current size.
    pub fn resolve(self, known_file_size: u64) -> u64 {
        match self {
            RangeSpec::Bytes(offset) => offset,
            RangeSpec::Percent(percent) => {
                let offset = percent / 100.0 * known_file_size as f64;
                if offset <= 0.0 {
                    0
                } else {
                    // Saturating float-to-int cast truncates toward zero.
                    offset as u64
                }
            }
        }
    }
}

/// Convert a textual start position to a byte offset, falling back to 0.
pub fn parse_offset(spec: &str, known_file_size: u64) -> u64 {
    match RangeSpec::parse(spec) {
        Some(range) => range.resolve(known_file_size),
        None => {
            tracing::debug!(spec, "unparseable range start, streaming from the beginning");
            0
        }
    }
}

/// Extract the start spec from a `Range` header value such as `bytes=10k-`.
///
/// Takes the text after the first `=` up to the first `-`. Returns `None`
/// when the value has no `=`.
pub fn range_spec_from_header(value: &str) -> Option<&str> {
    let (_, rest) = value.split_once('=')?;
    let start = rest.split('-').next().unwrap_or_default();
    Some(start.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integers_are_identity() {
        for value in [0u64, 1, 499, 1_000_000, u64::MAX] {
            assert_eq!(parse_offset(&value.to_string(), 12345), value);
        }
    }

    #[test]
    fn percent_of_known_size() {
        assert_eq!(parse_offset("50%", 1000), 500);
        assert_eq!(parse_offset("0%", 1000), 0);
        assert_eq!(parse_offset("100%", 1000), 1000);
        assert_eq!(parse_offset("12.5%", 1000), 125);
        assert_eq!(parse_offset("50%", 0), 0);
    }

    #[test]
    fn negative_percent_clamps_to_zero() {
        assert_eq!(parse_offset("-10%", 1000), 0);
    }

    #[test]
    fn decimal_suffixes() {
        assert_eq!(parse_offset("10k", 0), 10_000);
        assert_eq!(parse_offset("10kb", 0), 10_000);
        assert_eq!(parse_offset("3m", 0), 3_000_000);
        assert_eq!(parse_offset("3mb", 0), 3_000_000);
        assert_eq!(parse_offset("2g", 0), 2_000_000_000);
        assert_eq!(parse_offset("2gb", 0), 2_000_000_000);
    }

    #[test]
    fn binary_suffixes() {
        assert_eq!(parse_offset("10kib", 0), 10_240);
        assert_eq!(parse_offset("1mib", 0), 1_048_576);
        assert_eq!(parse_offset("1gib", 0), 1_073_741_824);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(parse_offset("10KiB", 0), 10_240);
        assert_eq!(parse_offset("4MB", 0), 4_000_000);
    }

    #[test]
    fn suffix_strips_other_characters() {
        assert_eq!(parse_offset("10 kib", 0), 10_240);
        assert_eq!(parse_offset("x5k", 0), 5_000);
    }

    #[test]
    fn fractional_magnitude_is_a_parse_failure() {
        assert_eq!(parse_offset("1.5mib", 0), 0);
    }

    #[test]
    fn garbage_resolves_to_zero() {
        assert_eq!(parse_offset("bogus", 1000), 0);
        assert_eq!(parse_offset("-5", 1000), 0);
        assert_eq!(parse_offset("%", 1000), 0);
        assert_eq!(parse_offset("k", 1000), 0);
    }

    #[test]
    fn empty_is_start_of_file() {
        assert_eq!(parse_offset("", 1000), 0);
        assert_eq!(RangeSpec::parse("  "), Some(RangeSpec::Bytes(0)));
    }

    #[test]
    fn overflow_resolves_to_zero() {
        assert_eq!(parse_offset("99999999999999999gib", 0), 0);
    }

    #[test]
    fn header_value_extraction() {
        assert_eq!(range_spec_from_header("bytes=10k-"), Some("10k"));
        assert_eq!(range_spec_from_header("bytes=500-999"), Some("500"));
        assert_eq!(range_spec_from_header("bytes=50%-"), Some("50%"));
        assert_eq!(range_spec_from_header("bytes=-500"), Some(""));
        assert_eq!(range_spec_from_header("bytes"), None);
    }
}
