//! Command line driver for the session and routing core.
//!
//! Runs every party of a protocol instance in-process against the simulated
//! round engine. Key material is kept in one JSON file per party.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use mpc_router::logging::init_logging;
use mpc_router::round_engine::simulated::{SimKeyShare, SimSignature, SimulatedEngine};
use mpc_router::router::orchestrator;
use mpc_router::{Curve, EnvelopeFormat, PartyId, ProtocolParams, Role, RouterConfig, SessionRegistry};

#[derive(Parser)]
#[command(name = "mpc-router", version, about = "Threshold protocol session and routing driver")]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Write the log file as JSON instead of logfmt
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a threshold key; writes key_<party>.json per party
    Keygen {
        /// Comma-separated party ids, e.g. 1,2,3
        #[arg(short, long, value_delimiter = ',', required = true)]
        parties: Vec<u32>,

        #[arg(short, long)]
        threshold: u16,

        #[arg(short, long, value_enum, default_value_t = CurveArg::Secp256k1)]
        curve: CurveArg,

        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Refresh every share of a key in place; the public key stays the same
    Refresh {
        /// One key file per party
        #[arg(short, long, required = true, num_args = 1..)]
        keys: Vec<PathBuf>,
    },

    /// Threshold Ed25519 signature from a subset of key holders
    SignEd25519 {
        /// One key file per signer
        #[arg(short, long, required = true, num_args = 1..)]
        keys: Vec<PathBuf>,

        #[arg(short, long)]
        message: String,
    },

    /// Two-party ECDSA signature; prepares both keygen shares first
    SignEcdsa {
        #[arg(long)]
        p1_key: PathBuf,

        #[arg(long)]
        p2_key: PathBuf,

        #[arg(short, long)]
        message: String,
    },

    /// Print the payload an envelope addresses to one party (hex if not UTF-8)
    Extract {
        #[arg(short, long)]
        party: u32,

        /// Envelope file; stdin when omitted
        file: Option<PathBuf>,

        /// Defaults to the configured format
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CurveArg {
    Secp256k1,
    Ed25519,
}

impl From<CurveArg> for Curve {
    fn from(arg: CurveArg) -> Self {
        match arg {
            CurveArg::Secp256k1 => Curve::Secp256k1,
            CurveArg::Ed25519 => Curve::Ed25519,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    AddressedMap,
    DataField,
}

impl From<FormatArg> for EnvelopeFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::AddressedMap => EnvelopeFormat::AddressedMap,
            FormatArg::DataField => EnvelopeFormat::DataField,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RouterConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => RouterConfig::default(),
    };
    if let Some(dir) = cli.log_dir {
        config.log_dir = dir;
    }
    config.json_logs |= cli.json_logs;
    config.validate()?;

    let _guard = init_logging(&config.log_dir, config.json_logs);
    let registry = SessionRegistry::with_config(Arc::new(SimulatedEngine::new()), &config);

    match cli.command {
        Commands::Keygen { parties, threshold, curve, out_dir } => {
            let set: Vec<PartyId> = parties.into_iter().map(PartyId).collect();
            let params = set
                .iter()
                .map(|p| ProtocolParams::keygen(*p, threshold, &set, curve.into()))
                .collect();
            let outputs = orchestrator::run(&registry, params)?;

            std::fs::create_dir_all(&out_dir)?;
            let mut public_key = String::new();
            for (party, material) in &outputs {
                let share: SimKeyShare = serde_json::from_slice(material)?;
                public_key = share.public_key;
                let path = out_dir.join(format!("key_{party}.json"));
                std::fs::write(&path, material.as_slice())?;
                println!("saved key share: {}", path.display());
            }
            println!("Group Public Key: {public_key}");
        }

        Commands::Refresh { keys } => {
            let shares = load_keys(&keys)?;
            let first = &shares[0].1;
            let set: Vec<PartyId> = shares.iter().map(|(_, s)| s.party_id).collect();
            let params = shares
                .iter()
                .map(|(raw, share)| {
                    ProtocolParams::refresh(share.party_id, first.threshold, &set, first.curve, raw.clone().into())
                })
                .collect();
            let outputs = orchestrator::run(&registry, params)?;

            for (path, (_, share)) in keys.iter().zip(&shares) {
                let material = outputs
                    .get(&share.party_id)
                    .with_context(|| format!("no refreshed share for party {}", share.party_id))?;
                std::fs::write(path, material.as_slice())?;
                println!("refreshed key share: {}", path.display());
            }
            println!("Group Public Key: {}", first.public_key);
        }

        Commands::SignEd25519 { keys, message } => {
            let shares = load_keys(&keys)?;
            let first = &shares[0].1;
            let signers: Vec<PartyId> = shares.iter().map(|(_, s)| s.party_id).collect();
            let params = shares
                .iter()
                .map(|(raw, share)| {
                    ProtocolParams::ed25519_sign(share.party_id, first.threshold, &signers, raw.clone().into(), message.as_bytes())
                })
                .collect();
            let outputs = orchestrator::run(&registry, params)?;
            let (_, material) = outputs.first_key_value().context("signing produced no output")?;
            print_signature(material)?;
        }

        Commands::SignEcdsa { p1_key, p2_key, message } => {
            let shares = load_keys(&[p1_key, p2_key])?;
            let (p1, p2) = (shares[0].1.party_id, shares[1].1.party_id);
            let (m1, m2) = orchestrator::prepare_ecdsa(&registry, (p1, &shares[0].0), (p2, &shares[1].0))?;
            let params = vec![
                ProtocolParams::ecdsa_sign(Role::P1, p1, p2, m1, message.as_bytes()),
                ProtocolParams::ecdsa_sign(Role::P2, p2, p1, m2, message.as_bytes()),
            ];
            let outputs = orchestrator::run(&registry, params)?;
            let material = outputs.get(&p1).context("P1 produced no signature")?;
            print_signature(material)?;
        }

        Commands::Extract { party, file, format } => {
            let bytes = match file {
                Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let format = format.map(EnvelopeFormat::from).unwrap_or(config.envelope_format);
            let party = PartyId::new(party).context("party ids start at 1")?;
            let payload = format.extract(bytes.trim_ascii(), party)?;
            match std::str::from_utf8(&payload) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{}", hex::encode(&payload)),
            }
        }
    }

    info!(live_sessions = registry.live_sessions(), "done");
    Ok(())
}

/// Read key files, returning the raw bytes next to the parsed share.
fn load_keys(paths: &[PathBuf]) -> Result<Vec<(Vec<u8>, SimKeyShare)>> {
    if paths.is_empty() {
        bail!("at least one key file is required");
    }
    paths.iter().map(|p| load_key(p)).collect()
}

fn load_key(path: &Path) -> Result<(Vec<u8>, SimKeyShare)> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let share = serde_json::from_slice(&raw).with_context(|| format!("{} is not a key share", path.display()))?;
    Ok((raw, share))
}

fn print_signature(material: &[u8]) -> Result<()> {
    let sig: SimSignature = serde_json::from_slice(material)?;
    println!("R: {}", sig.r);
    println!("S: {}", sig.s);
    Ok(())
}
