//! proof-verify CLI - read-only verification of anchored delivery proofs.
//!
//! Runs one engine operation per invocation and prints the structured
//! result as text or JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use proof_verify_core::{
    BlockLookup, ChainTermination, EngineConfig, Fixture, GeoPoint, ProofEngine, ProvenanceChain,
    TamperVerdict, Verdict, VerificationResult, VerifyError,
};
use serde::Serialize;
use serde_json::Value;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// proof-verify - read-only verification of anchored delivery proofs.
///
/// Checks a delivery proof against three independent upstreams:
/// - Witness network: do independent nodes corroborate location and time?
/// - Ledger: which records precede this one, and where was it committed?
/// - Content store: does the stored payload still hash to the anchor?
#[derive(Parser)]
#[command(name = "proof-verify")]
#[command(version = VERSION)]
#[command(about = "Read-only verification of anchored delivery proofs")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer every upstream call from a fixture file instead of the network
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Override the per-operation deadline, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Treat the witness network as administratively disabled
    #[arg(long)]
    no_witness: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether witnesses corroborate a proof's location
    Verify {
        /// Proof identifier (hex content hash)
        proof_id: String,

        /// Claimed latitude in degrees
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Claimed longitude in degrees
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Claimed time (RFC 3339, e.g. 2024-05-01T10:00:00Z)
        #[arg(long)]
        at: Option<String>,
    },

    /// Walk a proof's provenance chain toward its origin
    Chain {
        /// Proof identifier (hex content hash)
        proof_id: String,

        /// Maximum number of back-links to follow
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Find the block a transaction was committed in
    Locate {
        /// Transaction hash
        tx_hash: String,

        /// Maximum number of blocks fetched by a window scan
        #[arg(long)]
        scan_cap: Option<u64>,
    },

    /// Compare a proof's anchored hash with its stored payload
    Tamper {
        /// Proof identifier (hex content hash)
        proof_id: String,

        /// Locally held copy of the record (JSON file)
        #[arg(long)]
        held: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<EngineConfig, VerifyError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ms) = cli.deadline_ms {
        config.request_deadline = Duration::from_millis(ms);
    }
    if cli.no_witness {
        config.witness.enabled = false;
    }
    if let Commands::Locate {
        scan_cap: Some(cap), ..
    } = &cli.command
    {
        config.ledger.block_scan_cap = *cap;
    }
    config.validate()?;
    Ok(config)
}

fn build_engine(config: EngineConfig, fixture: Option<&Path>) -> Result<ProofEngine, VerifyError> {
    match fixture {
        Some(path) => {
            let (transport, ledger, content) = Fixture::from_json_file(path)?.into_collaborators()?;
            ProofEngine::with_collaborators(
                config,
                Arc::new(transport),
                Arc::new(ledger),
                Arc::new(content),
            )
        },
        None => ProofEngine::new(config),
    }
}

fn read_json(path: &Path) -> Result<Value, VerifyError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| VerifyError::invalid_input(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| VerifyError::invalid_input(format!("Failed to parse {}: {}", path.display(), e)))
}

fn parse_claim(lat: Option<f64>, lon: Option<f64>, at: Option<&str>) -> Result<(Option<GeoPoint>, Option<i64>), VerifyError> {
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)?),
        _ => None,
    };
    let timestamp = match at {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(text)
                .map_err(|e| VerifyError::invalid_input(format!("Bad timestamp '{}': {}", text, e)))?
                .timestamp(),
        ),
        None => None,
    };
    Ok((location, timestamp))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize result: {}", e),
    }
}

fn print_verification(result: &VerificationResult) {
    println!("\nLOCATION VERIFICATION");
    println!("=====================\n");
    if result.is_degraded {
        println!("WARNING: witness network not consulted; this result is SYNTHESIZED.\n");
    }
    println!("{}\n", result);
    println!("  Confidence:     {}%", result.confidence_percent);
    println!("  Consensus tier: {}", result.consensus_tier);
    println!("  Witnesses:      {}", result.node_count);
    println!("  Location match: {}", if result.location_match { "yes" } else { "no" });
    if let Some(d) = result.distance_from_claimed_meters {
        println!("  Distance:       {:.0} m", d);
    }
    for w in &result.witnesses {
        match w.approximate_location {
            Some(p) => println!("    - {} ({:.5}, {:.5})", w.address, p.lat, p.lon),
            None => println!("    - {}", w.address),
        }
    }
}

fn print_chain(chain: &ProvenanceChain) {
    println!("\nPROVENANCE CHAIN");
    println!("================\n");
    for link in &chain.links {
        let block = link
            .block_number
            .map_or_else(|| "pending".to_string(), |n| n.to_string());
        println!("  [{}] {}  block {}", link.depth, link.hash, block);
    }
    if chain.links.is_empty() {
        println!("  (no records)");
    }
    let end = match &chain.termination {
        ChainTermination::Origin => "reached chain origin".to_string(),
        ChainTermination::NotFound { hash } => format!("record {} not available", hash),
        ChainTermination::DepthLimit => "stopped at depth limit".to_string(),
        ChainTermination::MalformedLink { link } => format!("malformed back-link '{}'", link),
        ChainTermination::Cycle { hash } => format!("cycle back to {}", hash),
        ChainTermination::DeadlineExceeded => "deadline exceeded".to_string(),
        ChainTermination::InvalidIdentifier { reason } => format!("invalid identifier: {}", reason),
    };
    println!("\n  Termination: {}", end);
}

fn print_lookup(lookup: &BlockLookup) {
    println!("\nCOMMIT BLOCK");
    println!("============\n");
    match lookup {
        BlockLookup::Located(loc) if loc.is_committed => {
            println!("  Committed in block {} (via {:?})", loc.block_number, loc.strategy);
        },
        BlockLookup::Located(loc) => {
            println!("  NOT YET COMMITTED: window open, earliest block {}", loc.block_number);
        },
        BlockLookup::Unknown { reason } => println!("  UNKNOWN: {}", reason),
    }
}

fn print_verdict(verdict: &TamperVerdict) {
    println!("\nTAMPER CHECK");
    println!("============\n");
    println!("  Verdict:    {}", verdict.verdict);
    if let Some(h) = &verdict.expected_hash {
        println!("  Anchored:   {}", h);
    }
    if let Some(h) = &verdict.recomputed_hash {
        println!("  Recomputed: {}", h);
    }
    if let Some(r) = &verdict.payload_ref {
        println!("  Payload:    {}", r);
    }
    if !verdict.stripped_fields.is_empty() {
        println!("  Stripped:   {}", verdict.stripped_fields.join(", "));
    }
    println!("\n  {}", verdict.explanation);
}

async fn run(cli: Cli) -> Result<ExitCode, VerifyError> {
    let json_output = cli.format == "json";
    let config = load_config(&cli)?;

    if let Commands::Config = cli.command {
        print_json(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let engine = build_engine(config, cli.fixture.as_deref())?;

    let code = match cli.command {
        Commands::Verify {
            proof_id,
            lat,
            lon,
            at,
        } => {
            let (location, timestamp) = parse_claim(lat, lon, at.as_deref())?;
            let result = engine.verify_location(&proof_id, location, timestamp).await;
            if json_output {
                print_json(&result);
            } else {
                print_verification(&result);
            }
            if result.verified {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        },
        Commands::Chain {
            proof_id,
            max_depth,
        } => {
            let chain = engine.walk_provenance_chain(&proof_id, max_depth).await;
            if json_output {
                print_json(&chain);
            } else {
                print_chain(&chain);
            }
            ExitCode::SUCCESS
        },
        Commands::Locate { tx_hash, .. } => {
            let lookup = engine.locate_commit_block(&tx_hash).await;
            if json_output {
                print_json(&lookup);
            } else {
                print_lookup(&lookup);
            }
            ExitCode::SUCCESS
        },
        Commands::Tamper { proof_id, held } => {
            let held = match held {
                Some(path) => read_json(&path)?,
                None => Value::Object(serde_json::Map::new()),
            };
            let verdict = engine.detect_tampering(&proof_id, &held).await;
            if json_output {
                print_json(&verdict);
            } else {
                print_verdict(&verdict);
            }
            match verdict.verdict {
                Verdict::Verified => ExitCode::SUCCESS,
                Verdict::Tampered => ExitCode::from(1),
                Verdict::Inconclusive => ExitCode::from(3),
            }
        },
        Commands::Config => ExitCode::SUCCESS,
    };
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep stdout clean for JSON output
    if cli.format == "json" {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        },
    }
}
