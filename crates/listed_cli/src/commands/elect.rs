//! Elect command implementation.

use listed_sync::{select_janitor, CpuPressure, PeerId, PeerMetrics, PeerRecord, TieBreak};
use serde::Serialize;
use thiserror::Error;

/// A peer record argument that could not be parsed.
#[derive(Debug, Error, PartialEq)]
pub enum ParseRecordError {
    /// Wrong number of `:`-separated fields.
    #[error("expected id:downlink:rtt:memory:pressure, got {0:?}")]
    Shape(String),

    /// A field is not a number.
    #[error("invalid {field} in {record:?}")]
    Number {
        /// Field name.
        field: &'static str,
        /// The whole record.
        record: String,
    },
}

/// Election outcome.
#[derive(Debug, Serialize)]
pub struct ElectResult {
    /// Tie-break rule used.
    pub tie_break: TieBreak,
    /// Every candidate with its score, in argument order.
    pub candidates: Vec<Candidate>,
    /// The elected janitor.
    pub janitor: Option<PeerId>,
}

/// One scored candidate.
#[derive(Debug, Serialize)]
pub struct Candidate {
    /// The parsed record.
    pub record: PeerRecord,
    /// Election score.
    pub score: f64,
}

/// Runs the elect command.
pub fn run(
    records: &[String],
    tie_break: TieBreak,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = records
        .iter()
        .map(|r| parse_record(r))
        .collect::<Result<Vec<_>, _>>()?;
    let result = elect(records, tie_break);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn elect(records: Vec<PeerRecord>, tie_break: TieBreak) -> ElectResult {
    let janitor = select_janitor(&records, tie_break);
    ElectResult {
        tie_break,
        candidates: records
            .into_iter()
            .map(|record| Candidate {
                score: record.score(),
                record,
            })
            .collect(),
        janitor,
    }
}

/// Parses `id:downlink:rtt:memory:pressure`.
pub fn parse_record(input: &str) -> Result<PeerRecord, ParseRecordError> {
    let fields: Vec<&str> = input.split(':').collect();
    let [id, downlink, rtt, memory, pressure] = fields[..] else {
        return Err(ParseRecordError::Shape(input.to_string()));
    };

    let number = |field: &'static str, value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseRecordError::Number {
                field,
                record: input.to_string(),
            })
    };
    let peer_id = id
        .trim()
        .parse::<PeerId>()
        .map_err(|_| ParseRecordError::Number {
            field: "id",
            record: input.to_string(),
        })?;

    Ok(PeerRecord::new(
        peer_id,
        PeerMetrics::new(
            number("downlink", downlink)?,
            number("rtt", rtt)?,
            number("memory", memory)?,
            CpuPressure::from_label(pressure),
        ),
    ))
}

fn print_text_output(result: &ElectResult) {
    println!("{:<20} {:>10}", "PEER", "SCORE");
    for candidate in &result.candidates {
        let marker = if Some(candidate.record.peer_id) == result.janitor {
            " *"
        } else {
            ""
        };
        println!(
            "{:<20} {:>10}{}",
            candidate.record.peer_id, candidate.score, marker
        );
    }
    match result.janitor {
        Some(janitor) => println!("\nJanitor: {} ({:?})", janitor, result.tie_break),
        None => println!("\nNo janitor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_record() {
        let record = parse_record("7:10:3:8:nominal").unwrap();
        assert_eq!(record.peer_id, 7);
        assert_eq!(record.score(), 115.0);
    }

    #[test]
    fn parse_sentinels() {
        let record = parse_record("1:-1:-1:-1:unknown").unwrap();
        assert_eq!(record.metrics, PeerMetrics::unknown());
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_record("1:2:3"),
            Err(ParseRecordError::Shape(_))
        ));
        assert_eq!(
            parse_record("x:1:1:1:fair"),
            Err(ParseRecordError::Number {
                field: "id",
                record: "x:1:1:1:fair".into()
            })
        );
        assert!(matches!(
            parse_record("1:fast:1:1:fair"),
            Err(ParseRecordError::Number { field: "downlink", .. })
        ));
    }

    #[test]
    fn scenario_leader_handoff() {
        let x = parse_record("1:80:-1:-1:unknown").unwrap();
        let y = parse_record("2:95:-1:-1:unknown").unwrap();
        assert_eq!(elect(vec![x, y], TieBreak::LowestPeerId).janitor, Some(2));
        assert_eq!(elect(vec![x], TieBreak::LowestPeerId).janitor, Some(1));
    }
}
