//! Captured Data Source streams.
//!
//! A capture file holds one record per block. Each line of a block is one
//! chunk as the transport delivered it, written as hex; blank lines separate
//! records and `#` starts a comment.
//!
//! ```text
//! # Hi / Yo
//! 00 03 00 00 00 01 02 00
//! 48 69 03 02 00 59 6f
//! ```

use anyhow::Context;

/// Chunks of one record, in arrival order
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    /// Line number of the first chunk, for reporting
    pub line: usize,
    pub label: Option<String>,
    pub chunks: Vec<Vec<u8>>,
}

impl CapturedRecord {
    /// The stream with chunk boundaries removed
    pub fn stream(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

pub fn parse_capture(text: &str) -> anyhow::Result<Vec<CapturedRecord>> {
    let mut records = Vec::new();
    let mut current: Option<CapturedRecord> = None;
    let mut label = None;

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();

        if let Some(comment) = line.strip_prefix('#') {
            if current.is_none() {
                label = Some(comment.trim().to_string());
            }
            continue;
        }

        if line.is_empty() {
            records.extend(current.take());
            continue;
        }

        let chunk = parse_hex(line).with_context(|| format!("line {}", line_number))?;
        current
            .get_or_insert_with(|| CapturedRecord {
                line: line_number,
                label: label.take(),
                chunks: Vec::new(),
            })
            .chunks
            .push(chunk);
    }
    records.extend(current);

    Ok(records)
}

/// Hex bytes, optionally separated by whitespace
fn parse_hex(line: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        anyhow::bail!("non-hex characters");
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?}", &digits[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blocks() {
        let text = "# first\n00 01 02\nff\n\n# second\n0a0b\n";
        let records = parse_capture(text).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label.as_deref(), Some("first"));
        assert_eq!(records[0].chunks, vec![vec![0x00, 0x01, 0x02], vec![0xFF]]);
        assert_eq!(records[1].line, 6);
        assert_eq!(records[1].stream(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn test_rejects_bad_hex() {
        assert!(parse_capture("0g\n").is_err());
        assert!(parse_capture("012\n").is_err());
    }
}
