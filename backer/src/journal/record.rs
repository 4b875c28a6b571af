//! Journal row encoding.
//!
//! One row per completed file: `key,size,mtime`, comma separated, fields
//! quoted CSV-style when they contain a comma, quote, line break or leading
//! space. The timestamp is RFC 3339 with fractional seconds.

use crate::fs::FileFingerprint;
use chrono::{DateTime, Utc};

/// One completed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    /// Path relative to the destination home, `/`-separated
    pub key: String,

    pub fingerprint: FileFingerprint,
}

/// Fields of one physical record as split from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawRecord {
    /// 1-based line the record starts on
    pub line: usize,
    pub fields: Vec<String>,
    /// False for a final record that was not followed by a line break
    pub terminated: bool,
}

impl JournalRecord {
    pub fn new(key: impl Into<String>, fingerprint: FileFingerprint) -> Self {
        Self {
            key: key.into(),
            fingerprint,
        }
    }

    /// Encode as a single line, including the trailing `\n`.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.key.len() + 48);
        push_field(&mut line, &self.key);
        line.push(',');
        line.push_str(&self.fingerprint.size.to_string());
        line.push(',');
        line.push_str(&self.fingerprint.mod_time_rfc3339());
        line.push('\n');
        line
    }

    /// Decode the fields of one record. Extra trailing fields are ignored.
    pub(crate) fn from_fields(fields: &[String]) -> Result<Self, String> {
        if fields.len() < 3 {
            return Err(format!("expected 3 fields, found {}", fields.len()));
        }
        if fields[0].is_empty() {
            return Err("empty path".to_string());
        }
        let size = fields[1]
            .parse::<u64>()
            .map_err(|e| format!("invalid size {:?}: {}", fields[1], e))?;
        let mod_time = DateTime::parse_from_rfc3339(&fields[2])
            .map_err(|e| format!("invalid timestamp {:?}: {}", fields[2], e))?
            .with_timezone(&Utc);

        Ok(Self::new(fields[0].clone(), FileFingerprint::new(size, mod_time)))
    }
}

fn push_field(out: &mut String, field: &str) {
    let needs_quotes = field.starts_with(' ')
        || field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r'));
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

/// Split journal text into records. Blank lines are skipped.
pub(crate) fn split_records(text: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut line = 1;
    let mut start_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                started = true;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if started || !field.is_empty() {
                    fields.push(std::mem::take(&mut field));
                    records.push(RawRecord {
                        line: start_line,
                        fields: std::mem::take(&mut fields),
                        terminated: true,
                    });
                }
                line += 1;
                start_line = line;
                started = false;
            }
            _ => {
                field.push(c);
                started = true;
            }
        }
    }

    if in_quotes || started || !field.is_empty() {
        fields.push(field);
        records.push(RawRecord {
            line: start_line,
            fields,
            terminated: false,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn fingerprint(size: u64, secs: u64, nanos: u32) -> FileFingerprint {
        let t = SystemTime::UNIX_EPOCH + Duration::new(secs, nanos);
        FileFingerprint::new(size, DateTime::<Utc>::from(t))
    }

    #[test]
    fn test_plain_line() {
        let record = JournalRecord::new("photos/a.txt", fingerprint(10, 1_600_000_000, 500_000_000));
        assert_eq!(record.to_line(), "photos/a.txt,10,2020-09-13T12:26:40.500Z\n");
    }

    #[test]
    fn test_awkward_paths_survive() {
        let keys = ["docs/a,b.txt", "docs/say \"hi\".txt", "docs/two\nlines", " leading"];
        let mut text = String::new();
        for key in keys {
            text.push_str(&JournalRecord::new(key, fingerprint(1, 2, 3)).to_line());
        }

        let records = split_records(&text);
        assert_eq!(records.len(), keys.len());
        for (raw, key) in records.iter().zip(keys) {
            assert!(raw.terminated);
            let record = JournalRecord::from_fields(&raw.fields).unwrap();
            assert_eq!(record.key, key);
            assert_eq!(record.fingerprint, fingerprint(1, 2, 3));
        }
        assert_eq!(records[3].line, 5);
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let text = "a,1,2020-01-01T00:00:00Z\r\n\r\nb,2,2020-01-01T00:00:00.25Z\n";
        let records = split_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 3);
        assert_eq!(JournalRecord::from_fields(&records[1].fields).unwrap().fingerprint.size, 2);
    }

    #[test]
    fn test_unterminated_tail_is_flagged() {
        let records = split_records("a,1,2020-01-01T00:00:00Z\nb,2,2020-01");
        assert_eq!(records.len(), 2);
        assert!(records[0].terminated);
        assert!(!records[1].terminated);
        assert!(JournalRecord::from_fields(&records[1].fields).is_err());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let fields = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(JournalRecord::from_fields(&fields(&["a", "1"])).is_err());
        assert!(JournalRecord::from_fields(&fields(&["", "1", "2020-01-01T00:00:00Z"])).is_err());
        assert!(JournalRecord::from_fields(&fields(&["a", "-1", "2020-01-01T00:00:00Z"])).is_err());
        assert!(JournalRecord::from_fields(&fields(&["a", "1", "yesterday"])).is_err());
    }
}
