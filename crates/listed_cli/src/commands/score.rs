//! Score command implementation.

use listed_sync::{CpuPressure, PeerMetrics};
use serde::Serialize;

/// Score of one metrics record.
#[derive(Debug, Serialize)]
pub struct ScoreResult {
    /// Metrics after unknown readings were discarded.
    pub metrics: PeerMetrics,
    /// Bonus from CPU pressure.
    pub pressure_bonus: f64,
    /// Election score.
    pub score: f64,
}

/// Runs the score command.
pub fn run(
    downlink: f64,
    rtt: f64,
    memory: f64,
    pressure: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = compute(downlink, rtt, memory, pressure);

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

fn compute(downlink: f64, rtt: f64, memory: f64, pressure: &str) -> ScoreResult {
    let metrics = PeerMetrics::new(downlink, rtt, memory, CpuPressure::from_label(pressure));
    ScoreResult {
        metrics,
        pressure_bonus: metrics.cpu_pressure.bonus(),
        score: metrics.score(),
    }
}

fn print_text_output(result: &ScoreResult) {
    let show = |reading: Option<f64>| match reading {
        Some(value) => value.to_string(),
        None => "unknown".to_string(),
    };
    println!("Downlink:      {}", show(result.metrics.downlink));
    println!("RTT:           {}", show(result.metrics.rtt));
    println!("Device memory: {}", show(result.metrics.device_memory));
    println!(
        "CPU pressure:  {} (+{})",
        result.metrics.cpu_pressure, result.pressure_bonus
    );
    println!("Score:         {}", result.score);
}
