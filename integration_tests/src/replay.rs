//! Replays captured records through the bridge under different chunkings.

use ancs_bridge::bridge::{encode_event, Fragment, NotificationBridge};
use ancs_bridge::config::ancs::RECORD_HEADER_LEN;
use ancs_bridge::link::LinkSerialiser;
use ancs_bridge::reassembly::ReassemblerConfig;
use colored::Colorize;
use std::fmt;

use crate::capture::CapturedRecord;
use crate::protocol::{parse_frame, LinkMessage};

/// How a record was sliced for one replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slicing {
    /// Chunk boundaries exactly as captured
    Captured,
    /// Fixed-size chunks after a whole record header
    Every(usize),
}

impl fmt::Display for Slicing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slicing::Captured => write!(f, "captured"),
            Slicing::Every(size) => write!(f, "{}B", size),
        }
    }
}

/// Result of one replay of a record
pub struct Outcome {
    pub slicing: Slicing,
    pub failure: Option<String>,
}

/// Every replay of one captured record
pub struct RecordReport {
    pub label: String,
    pub outcomes: Vec<Outcome>,
}

impl RecordReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.failure.is_none())
    }

    fn slicings(&self, passed: bool) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.failure.is_none() == passed)
            .map(|o| o.slicing.to_string())
            .collect()
    }
}

/// Feed chunks through a fresh bridge and decode every frame it emits
fn replay(config: ReassemblerConfig, chunks: &[&[u8]]) -> anyhow::Result<Vec<LinkMessage>> {
    let mut bridge = NotificationBridge::new(config);
    let serialiser = LinkSerialiser::new();
    let mut messages = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let fragment = if index == 0 {
            Fragment::first(chunk)
        } else {
            Fragment::next(chunk)
        };

        if let Some(frame) = encode_event(&serialiser, &bridge.handle(fragment)) {
            messages.push(parse_frame(&frame)?);
        }
    }

    Ok(messages)
}

/// Split a stream into `size`-byte chunks, keeping the record header whole
fn rechunk(stream: &[u8], size: usize) -> Vec<&[u8]> {
    let size = size.max(1);
    let first = size.max(RECORD_HEADER_LEN).min(stream.len());
    let mut chunks = vec![&stream[..first]];
    chunks.extend(stream[first..].chunks(size));
    chunks
}

/// Replay one record as captured, then at every chunk size.
pub fn run_record(record: &CapturedRecord, config: ReassemblerConfig, chunk_sizes: &[usize]) -> RecordReport {
    let label = match &record.label {
        Some(label) => format!("line {} ({})", record.line, label),
        None => format!("line {}", record.line),
    };
    let mut report = RecordReport {
        label,
        outcomes: Vec::new(),
    };

    let captured: Vec<&[u8]> = record.chunks.iter().map(Vec::as_slice).collect();
    let reference = match replay(config, &captured) {
        Ok(messages) if messages.len() == 1 => messages,
        Ok(messages) => {
            report.outcomes.push(Outcome {
                slicing: Slicing::Captured,
                failure: Some(format!("Expected one link message, got {}", messages.len())),
            });
            return report;
        }
        Err(e) => {
            report.outcomes.push(Outcome {
                slicing: Slicing::Captured,
                failure: Some(format!("Error: {}", e)),
            });
            return report;
        }
    };
    report.outcomes.push(Outcome {
        slicing: Slicing::Captured,
        failure: None,
    });

    println!("{}", report.label.bold());
    println!("    {}", reference[0].summary().dimmed());

    let stream = record.stream();
    for &size in chunk_sizes {
        let failure = match replay(config, &rechunk(&stream, size)) {
            Ok(messages) if messages == reference => None,
            Ok(messages) => {
                let got: Vec<String> = messages.iter().map(LinkMessage::summary).collect();
                Some(format!("Output differs: {}", got.join(" | ")))
            }
            Err(e) => Some(format!("Error: {}", e)),
        };
        report.outcomes.push(Outcome {
            slicing: Slicing::Every(size),
            failure,
        });
    }

    report
}

/// Print one line per record, with the slicings that passed and why others failed.
pub fn print_results(reports: &[RecordReport]) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "Replay Results".bold());
    println!("{}", "=".repeat(60));

    for report in reports {
        let tag = if report.passed() {
            "[PASS]".green().bold()
        } else {
            "[FAIL]".red().bold()
        };
        println!("  {} {}", tag, report.label);

        let passed = report.slicings(true);
        if !passed.is_empty() {
            println!("         {}", passed.join(" ").dimmed());
        }
        for outcome in report.outcomes.iter().filter(|o| o.failure.is_some()) {
            if let Some(failure) = &outcome.failure {
                println!("         {}: {}", outcome.slicing, failure.red());
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    let replays: usize = reports.iter().map(|r| r.outcomes.len()).sum();
    let failed_replays: usize = reports.iter().map(|r| r.slicings(false).len()).sum();

    println!("{}", "-".repeat(60));
    println!(
        "  Records: {} passed, {} failed ({} of {} replays failed)",
        (reports.len() - failed).to_string().green(),
        if failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().normal()
        },
        failed_replays,
        replays
    );
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parse_capture;

    const HI_YO: &str = "00 03 00 00 00 01 02 00\n48 69 03 02 00 59 6f\n";

    #[test]
    fn test_rechunk_keeps_header_whole() {
        let stream: Vec<u8> = (0..12).collect();
        let chunks = rechunk(&stream, 2);
        assert_eq!(chunks[0], &stream[..5]);
        assert_eq!(chunks[1], &stream[5..7]);
        assert_eq!(chunks.concat(), stream);
    }

    #[test]
    fn test_hi_yo_replays_identically() {
        let records = parse_capture(HI_YO).unwrap();
        let report = run_record(&records[0], ReassemblerConfig::default(), &[1, 2, 3, 100]);

        assert!(report.passed());
        assert_eq!(report.slicings(true), vec!["captured", "1B", "2B", "3B", "100B"]);
        assert!(report.slicings(false).is_empty());
    }

    #[test]
    fn test_truncated_capture_reports_failure() {
        // Stream ends inside the message payload, so nothing is delivered
        let records = parse_capture("00 03 00 00 00 01 02 00\n48 69 03 02 00 59\n").unwrap();
        let report = run_record(&records[0], ReassemblerConfig::default(), &[1]);

        assert!(!report.passed());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.slicings(false), vec!["captured"]);
    }

    #[test]
    fn test_replay_decodes_message() {
        let records = parse_capture(HI_YO).unwrap();
        let captured: Vec<&[u8]> = records[0].chunks.iter().map(Vec::as_slice).collect();
        let messages = replay(ReassemblerConfig::default(), &captured).unwrap();

        match &messages[..] {
            [LinkMessage::Notification { uid, fields, .. }] => {
                assert_eq!(*uid, 3);
                assert_eq!(fields[0].text.as_deref(), Some("Hi"));
                assert_eq!(fields[1].text.as_deref(), Some("Yo"));
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
    }
}
