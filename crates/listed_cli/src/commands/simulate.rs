//! Simulate command implementation.
//!
//! Runs several in-process replicas against one relay: all of them edit,
//! one of them is partitioned for a while and edits offline, then it
//! reconnects and everyone settles.

use listed_core::LwwEngine;
use listed_sync::{
    CpuPressure, FlushPolicy, MemoryPresence, MemoryRelay, MemoryStore, NetworkLinkMonitor,
    PeerMetrics, PresenceMember, RelayEndpoint, SyncConfig, SyncProvider, SyncStatus, TieBreak,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const SCOPE: &str = "simulation";

type Provider = SyncProvider<LwwEngine, MemoryStore, RelayEndpoint, PresenceMember>;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of replicas.
    pub replicas: usize,
    /// Edits made by the partitioned replica while offline.
    pub edits: usize,
    /// Seed for generated device metrics.
    pub seed: u64,
    /// Buffered update policy.
    pub flush_policy: FlushPolicy,
    /// Election tie-break.
    pub tie_break: TieBreak,
}

/// Simulation outcome.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Janitor when the simulation ended.
    pub janitor: Option<u64>,
    /// Updates buffered by the partitioned replica before reconnecting.
    pub buffered_while_offline: usize,
    /// Whether every replica ended with byte-identical documents.
    pub converged: bool,
    /// Per-replica outcome.
    pub replicas: Vec<ReplicaReport>,
}

/// One replica's outcome.
#[derive(Debug, Serialize)]
pub struct ReplicaReport {
    /// Published metrics.
    pub metrics: PeerMetrics,
    /// Final status.
    pub status: SyncStatus,
    /// Visible document entries.
    pub entries: BTreeMap<String, String>,
    /// Size of the full encoding in bytes.
    pub document_bytes: usize,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if options.replicas < 2 {
        return Err("simulate needs at least two replicas".into());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(options))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

struct SimReplica {
    provider: Provider,
    endpoint: RelayEndpoint,
    monitor: Arc<NetworkLinkMonitor>,
    metrics: PeerMetrics,
}

async fn simulate(
    options: &SimulateOptions,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let relay = MemoryRelay::new();
    let presence = MemoryPresence::new();
    let mut rng = StdRng::seed_from_u64(options.seed);

    let mut replicas: Vec<SimReplica> = (0..options.replicas)
        .map(|i| {
            let peer_id = i as u64 + 1;
            let metrics = random_metrics(&mut rng);
            let endpoint = relay.endpoint();
            let monitor = Arc::new(NetworkLinkMonitor::new(true));
            let config = SyncConfig::new(SCOPE)
                .with_flush_policy(options.flush_policy)
                .with_tie_break(options.tie_break)
                .with_metrics(metrics);
            let provider = SyncProvider::new(
                config,
                LwwEngine::new(peer_id),
                MemoryStore::new(),
                endpoint.clone(),
                presence.join(peer_id),
                Arc::clone(&monitor),
            );
            SimReplica {
                provider,
                endpoint,
                monitor,
                metrics,
            }
        })
        .collect();

    for replica in replicas.iter_mut() {
        replica.provider.bootstrap().await?;
    }
    settle(&mut replicas).await;

    for replica in replicas.iter_mut() {
        let peer = replica.provider.peer_id();
        replica
            .provider
            .edit(|doc| doc.set(format!("peer-{peer}"), "online"))?;
    }
    settle(&mut replicas).await;

    // Partition a non-janitor; a janitor never answers its own catch-up request.
    let offline = replicas
        .iter()
        .rposition(|r| !r.provider.is_janitor())
        .unwrap_or(replicas.len() - 1);
    let online = if offline == 0 { 1 } else { 0 };

    replicas[offline].endpoint.set_connected(false);
    replicas[offline].monitor.signal_offline();
    settle(&mut replicas).await;
    info!(peer = replicas[offline].provider.peer_id(), "partitioned");

    for n in 0..options.edits {
        replicas[offline]
            .provider
            .edit(|doc| doc.set(format!("offline-{n}"), format!("edit {n}")))?;
    }
    replicas[online]
        .provider
        .edit(|doc| doc.set("during-partition", "seen by the others first"))?;
    settle(&mut replicas).await;
    let buffered_while_offline = replicas[offline].provider.pending_updates().len();

    replicas[offline].endpoint.set_connected(true);
    replicas[offline].monitor.signal_online();
    settle(&mut replicas).await;
    if options.flush_policy == FlushPolicy::Manual {
        replicas[offline].provider.flush_pending().await?;
        settle(&mut replicas).await;
    }
    info!(peer = replicas[offline].provider.peer_id(), "reconnected");

    let encodings = replicas
        .iter()
        .map(|r| r.provider.encode_full())
        .collect::<Result<Vec<_>, _>>()?;
    let converged = encodings.windows(2).all(|pair| pair[0] == pair[1]);

    Ok(SimulationReport {
        janitor: replicas[0].provider.elector().janitor(),
        buffered_while_offline,
        converged,
        replicas: replicas
            .iter()
            .zip(encodings)
            .map(|(replica, encoding)| ReplicaReport {
                metrics: replica.metrics,
                status: replica.provider.status(),
                entries: replica.provider.document().entries(),
                document_bytes: encoding.len(),
            })
            .collect(),
    })
}

fn random_metrics(rng: &mut StdRng) -> PeerMetrics {
    let pressure = match rng.gen_range(0..5) {
        0 => CpuPressure::Nominal,
        1 => CpuPressure::Fair,
        2 => CpuPressure::Serious,
        3 => CpuPressure::Critical,
        _ => CpuPressure::Unknown,
    };
    PeerMetrics::new(
        rng.gen_range(1..=100) as f64,
        rng.gen_range(20..=300) as f64,
        [2.0, 4.0, 8.0][rng.gen_range(0..3usize)],
        pressure,
    )
}

async fn settle(replicas: &mut [SimReplica]) {
    loop {
        let mut handled = 0;
        for replica in replicas.iter_mut() {
            handled += replica.provider.process_pending().await;
        }
        if handled == 0 {
            break;
        }
    }
}

fn print_text_output(report: &SimulationReport) {
    println!("=== Listed Sync Simulation ===");
    println!();
    match report.janitor {
        Some(janitor) => println!("Janitor:              {}", janitor),
        None => println!("Janitor:              none"),
    }
    println!("Buffered offline:     {}", report.buffered_while_offline);
    println!(
        "Converged:            {}",
        if report.converged { "yes" } else { "NO" }
    );
    println!();

    for replica in &report.replicas {
        let status = &replica.status;
        let state = format!("{:?}", status.state);
        println!(
            "Peer {:<4} score {:>7.1}  {:<8} {}",
            status.peer_id,
            replica.metrics.score(),
            state,
            if status.is_janitor { "janitor" } else { "" }
        );
        println!(
            "  sent {}  buffered {}  flushed {}  applied {}  answered {}  pending {}",
            status.stats.updates_sent,
            status.stats.updates_buffered,
            status.stats.updates_flushed,
            status.stats.updates_applied,
            status.stats.requests_answered,
            status.pending
        );
        println!(
            "  {} entries, {} bytes",
            replica.entries.len(),
            replica.document_bytes
        );
        if let Some(error) = &status.stats.last_error {
            println!("  last error: {}", error);
        }
    }
}
