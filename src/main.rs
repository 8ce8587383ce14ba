use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use paillier_he::{
    EncryptRequest, ErrorResponse, HomomorphicService, JsonCodec, KeyPair, Request, ServiceConfig,
    ServiceError,
};

#[derive(Debug, Parser)]
#[command(
    name = "paillier-he",
    about = "Paillier homomorphic encryption: encrypt, compute on ciphertexts, decrypt",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Bits per prime; the modulus has twice as many
    #[arg(long = "prime-bits", value_name = "N", global = true)]
    prime_bits: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a key pair and print both halves
    Keygen,

    /// Encrypt numbers under a fresh key pair
    Encrypt {
        #[arg(value_name = "NUM", required = true, allow_negative_numbers = true)]
        numbers: Vec<f64>,
    },

    /// Run an operation on encrypted numbers (reads a compute request as JSON)
    Compute {
        /// Request file; stdin when omitted
        #[arg(short = 'i', long = "input", value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Decrypt a value (reads a decrypt request as JSON)
    Decrypt {
        /// Request file; stdin when omitted
        #[arg(short = 'i', long = "input", value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Encrypt [10, 20, 30], sum while encrypted, decrypt and verify
    Demo,

    /// Handle one tagged request per line, writing one response per line
    ///
    /// Example line: {"op": "encrypt", "numbers": [1, 2]}
    Batch {
        /// Request file; stdin when omitted
        #[arg(short = 'i', long = "input", value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let service = HomomorphicService::new(config);

    match &cli.cmd {
        Command::Keygen => {
            let keypair = KeyPair::generate_with_config(&service.config().keygen)
                .context("generating key pair")?;
            print_json(&json!({
                "modulus_bits": keypair.bit_size(),
                "fingerprint": keypair.public_key.fingerprint(),
                "public_key": keypair.public_key.to_json(),
                "private_key": keypair.private_key.to_json(),
            }))
        }
        Command::Encrypt { numbers } => {
            let request = EncryptRequest {
                numbers: numbers.clone(),
            };
            let response = service.encrypt(&request).map_err(service_error)?;
            print_json(&response)
        }
        Command::Compute { input } => {
            let request = read_request(input.as_deref())?;
            let response = service.compute(&request).map_err(service_error)?;
            print_json(&response)
        }
        Command::Decrypt { input } => {
            let request = read_request(input.as_deref())?;
            let response = service.decrypt(&request).map_err(service_error)?;
            print_json(&response)
        }
        Command::Demo => {
            let report = service.demo_full_workflow().map_err(service_error)?;
            print_json(&report)
        }
        Command::Batch { input } => run_batch(&service, input.as_deref()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            ServiceConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => ServiceConfig::default(),
    };

    if let Some(prime_bits) = cli.prime_bits {
        config.keygen.prime_bits = prime_bits;
    }
    config.validate().context("validating configuration")?;

    info!(
        prime_bits = config.keygen.prime_bits,
        expose_private_key = config.expose_private_key,
        "configuration loaded"
    );
    Ok(config)
}

fn service_error(err: ServiceError) -> anyhow::Error {
    anyhow!("{err} (status {})", err.status_code())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

fn read_request<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    let text = read_input(path)?;
    serde_json::from_str(&text).context("parsing request")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing response")?;
    println!("{text}");
    Ok(())
}

fn run_batch(service: &HomomorphicService, path: Option<&Path>) -> Result<()> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) => Box::new(io::BufReader::new(
            fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => serde_json::to_string(&service.handle(&request))?,
            Err(err) => serde_json::to_string(&ErrorResponse {
                status: 400,
                detail: format!("line {}: {err}", index + 1),
            })?,
        };
        writeln!(out, "{response}")?;
    }

    out.flush()?;
    Ok(())
}
