//! Encoding and decoding of dump filenames.
//!
//! A dump file is named `YYYY-MM-DDTHH:MM:SS.uuuuuu-v<N>`: the dump's
//! update time in UTC at microsecond resolution, then the cache's
//! serialization format version. Atomic writes leave `.tmp` sidefiles with
//! the same stem; a leftover sidefile is benign and swept on cleanup.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// `chrono` format of the timestamp part of a dump filename. Six fractional
/// digits are mandatory, zero-padded.
pub const DUMP_NAME_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

// Parsing uses %.f: the regex has already pinned the fraction to exactly
// six digits, and %.f accepts them as microseconds.
const DUMP_NAME_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn dump_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6})-v(\d+)$")
            .expect("valid regex pattern")
    })
}

fn tmp_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6})-v(\d+)\.tmp$")
            .expect("valid regex pattern")
    })
}

/// A successfully decoded dump filename.
///
/// Produced only by [`match_dump_name`]; the fields always agree with the
/// filename they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDumpName {
    pub filename: String,
    pub update_time: DateTime<Utc>,
    pub format_version: u64,
}

/// Outcome of matching a directory entry against the dump name grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpNameMatch {
    /// The name does not look like a dump at all; ignored silently.
    NotADump,
    /// The name matches the grammar but does not decode; worth a warning.
    Malformed { reason: String },
    /// A valid dump name.
    Dump(ParsedDumpName),
}

/// Format the canonical dump filename for `(update_time, format_version)`.
///
/// `update_time` is expected to be rounded to microseconds already; extra
/// precision is truncated by the format.
pub fn dump_filename(update_time: DateTime<Utc>, format_version: u64) -> String {
    format!(
        "{}-v{}",
        update_time.format(DUMP_NAME_DATE_FORMAT),
        format_version
    )
}

/// Match `filename` against the dump name grammar and decode it.
pub fn match_dump_name(filename: &str) -> DumpNameMatch {
    let Some(captures) = dump_name_regex().captures(filename) else {
        return DumpNameMatch::NotADump;
    };

    let update_time = match NaiveDateTime::parse_from_str(&captures[1], DUMP_NAME_PARSE_FORMAT) {
        Ok(naive) => naive.and_utc(),
        Err(err) => {
            return DumpNameMatch::Malformed {
                reason: format!("bad timestamp: {err}"),
            }
        }
    };

    let format_version = match captures[2].parse::<u64>() {
        Ok(version) => version,
        Err(err) => {
            return DumpNameMatch::Malformed {
                reason: format!("bad format version: {err}"),
            }
        }
    };

    DumpNameMatch::Dump(ParsedDumpName {
        filename: filename.to_string(),
        update_time,
        format_version,
    })
}

/// Whether `filename` is a tmp sidefile left behind by an atomic dump write.
pub fn is_tmp_name(filename: &str) -> bool {
    tmp_name_regex().is_match(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .expect("valid test timestamp")
            .and_utc()
    }

    fn parsed(filename: &str) -> ParsedDumpName {
        match match_dump_name(filename) {
            DumpNameMatch::Dump(parsed) => parsed,
            other => panic!("expected a valid dump name, got {:?}", other),
        }
    }

    // ===========================================
    // Formatting
    // ===========================================

    #[test]
    fn test_dump_filename_format() {
        assert_eq!(
            dump_filename(ts("2024-01-02T03:04:05.000000"), 3),
            "2024-01-02T03:04:05.000000-v3"
        );
    }

    #[test]
    fn test_dump_filename_pads_micros() {
        assert_eq!(
            dump_filename(ts("2024-01-02T03:04:05.000001"), 0),
            "2024-01-02T03:04:05.000001-v0"
        );
    }

    #[test]
    fn test_dump_filename_no_leading_zeros_in_version() {
        assert_eq!(
            dump_filename(ts("2024-01-02T03:04:05.123456"), 12),
            "2024-01-02T03:04:05.123456-v12"
        );
    }

    // ===========================================
    // Parsing
    // ===========================================

    #[test]
    fn test_match_valid_name() {
        let dump = parsed("2024-01-02T03:04:05.123456-v7");
        assert_eq!(dump.filename, "2024-01-02T03:04:05.123456-v7");
        assert_eq!(dump.update_time, ts("2024-01-02T03:04:05.123456"));
        assert_eq!(dump.format_version, 7);
    }

    #[test]
    fn test_match_version_zero() {
        assert_eq!(parsed("2024-01-02T03:04:05.000000-v0").format_version, 0);
    }

    #[test]
    fn test_match_large_version() {
        assert_eq!(
            parsed("2024-01-02T03:04:05.000000-v18446744073709551615").format_version,
            u64::MAX
        );
    }

    #[test]
    fn test_match_accepts_leading_zero_version() {
        // The formatter never emits these, but the original files may.
        assert_eq!(parsed("2024-01-02T03:04:05.000000-v007").format_version, 7);
    }

    #[test]
    fn test_match_foreign_names_silently() {
        for name in [
            "",
            "README.md",
            "2024-01-02T03:04:05-v3",          // no fraction
            "2024-01-02T03:04:05.00000-v3",    // five digits
            "2024-01-02T03:04:05.0000000-v3",  // seven digits
            "2024-01-02T03:04:05.000000-v",    // no version digits
            "2024-01-02T03:04:05.000000-v3x",  // trailing junk
            "x2024-01-02T03:04:05.000000-v3",  // leading junk
            "2024-01-02T03:04:05.000000-v3.tmp",
        ] {
            assert_eq!(match_dump_name(name), DumpNameMatch::NotADump, "{name}");
        }
    }

    #[test]
    fn test_match_malformed_date() {
        // Matches the regex but is not a real instant.
        match match_dump_name("2024-13-02T03:04:05.000000-v3") {
            DumpNameMatch::Malformed { reason } => {
                assert!(reason.contains("bad timestamp"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_match_malformed_version_overflow() {
        match match_dump_name("2024-01-02T03:04:05.000000-v99999999999999999999") {
            DumpNameMatch::Malformed { reason } => {
                assert!(reason.contains("bad format version"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip() {
        for (time, version) in [
            ("2024-01-02T03:04:05.000000", 3),
            ("1970-01-01T00:00:00.000000", 0),
            ("2038-01-19T03:14:07.999999", 42),
            ("2024-12-31T23:59:59.500000", u64::MAX),
        ] {
            let dump = parsed(&dump_filename(ts(time), version));
            assert_eq!(dump.update_time, ts(time));
            assert_eq!(dump.format_version, version);
        }
    }

    // ===========================================
    // Tmp sidefiles
    // ===========================================

    #[test]
    fn test_is_tmp_name() {
        assert!(is_tmp_name("2024-01-02T03:04:05.000000-v3.tmp"));
        assert!(!is_tmp_name("2024-01-02T03:04:05.000000-v3"));
        assert!(!is_tmp_name("2024-01-02T03:04:05.000000-v3.tmp.tmp"));
        assert!(!is_tmp_name("other.tmp"));
    }
}
