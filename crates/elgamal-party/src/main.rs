//! ElGamal Party CLI
//!
//! Command-line node for the ElGamal exchange:
//! - Run the participant against the relay and the encryption service
//! - Publish domain parameters to the relay
//! - Decrypt a ciphertext pair offline

use anyhow::Result;
use clap::{Parser, Subcommand};
use elgamal_core::{
    elgamal, DecryptedResult, DomainParameters, EncryptResponse, EphemeralSecret, Participant,
    ParticipantConfig, SecretSampler,
};
use msg_relay_client::{HttpEncryptService, RelayClient, TopicSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// ElGamal Party - decryption participant node
#[derive(Parser)]
#[command(name = "elgamal-party")]
#[command(about = "ElGamal key-exchange and decryption participant")]
#[command(version)]
struct Cli {
    /// Relay service URL
    #[arg(short, long, env = "RELAY_URL", default_value = "http://127.0.0.1:8080")]
    relay: String,

    /// Topic carrying domain parameters
    #[arg(long, env = "PARAMS_TOPIC", default_value = "elgamal_params")]
    params_topic: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the participant until the round budget is exhausted
    Run {
        /// Encryption service URL
        #[arg(long, env = "ENCRYPT_SERVICE_URL", default_value = "http://127.0.0.1:8090")]
        service_url: String,

        /// Encryption service name
        #[arg(long, default_value = "elgamal_service")]
        service_name: String,

        /// Topic receiving decrypted results
        #[arg(long, env = "RESULT_TOPIC", default_value = "elgamal_result")]
        result_topic: String,

        /// Round budget
        #[arg(long, default_value_t = elgamal_core::DEFAULT_ROUNDS)]
        rounds: u32,

        /// Readiness probe timeout in milliseconds
        #[arg(long, default_value = "1000")]
        probe_timeout_ms: u64,

        /// Seed the secret sampler deterministically
        #[arg(long)]
        seed: Option<u64>,

        /// Keep consuming notifications after completion
        #[arg(long)]
        linger: bool,
    },

    /// Publish domain parameters to the relay
    Params {
        /// Prime modulus
        #[arg(short)]
        p: u64,

        /// Generator
        #[arg(short)]
        a: u64,

        /// Number of notifications to publish
        #[arg(long, default_value = "1")]
        count: u32,

        /// Delay between notifications in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Decrypt a ciphertext pair with a known secret exponent
    Decrypt {
        /// Prime modulus
        #[arg(short)]
        p: u64,

        /// Secret exponent
        #[arg(short)]
        n: u64,

        #[arg(long)]
        y1: u64,

        #[arg(long)]
        y2: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let relay = RelayClient::new(&cli.relay);

    match cli.command {
        Commands::Run {
            ref service_url,
            ref service_name,
            ref result_topic,
            rounds,
            probe_timeout_ms,
            seed,
            linger,
        } => {
            let mut config = ParticipantConfig::new(rounds)?
                .with_probe_timeout(Duration::from_millis(probe_timeout_ms));
            if linger {
                config = config.lingering();
            }
            let service = HttpEncryptService::new(service_name, service_url);
            run_participant(&cli, relay, service, result_topic, config, seed).await?;
        }
        Commands::Params {
            p,
            a,
            count,
            interval_ms,
        } => {
            publish_params(&cli, &relay, DomainParameters::new(p, a), count, interval_ms).await?;
        }
        Commands::Decrypt { p, n, y1, y2 } => {
            run_decrypt(p, n, y1, y2)?;
        }
    }

    Ok(())
}

async fn run_participant(
    cli: &Cli,
    relay: RelayClient,
    service: HttpEncryptService,
    result_topic: &str,
    config: ParticipantConfig,
    seed: Option<u64>,
) -> Result<()> {
    info!(
        relay = %cli.relay,
        params_topic = %cli.params_topic,
        result_topic = %result_topic,
        rounds = config.rounds,
        "Starting ElGamal participant"
    );

    let feed = relay.subscribe::<DomainParameters>(&cli.params_topic).await?;
    let sink = TopicSink::new(relay, result_topic);
    let sampler = match seed {
        Some(seed) => SecretSampler::with_seed(seed),
        None => SecretSampler::from_entropy(),
    };

    let participant = Participant::with_sampler(config, Arc::new(service), sink, sampler);
    let summary = participant.run(feed).await?;

    for result in &summary.results {
        println!("Round {}: x = {} (published {})", result.round, result.x, result.as_signed());
    }
    if !summary.state.finished {
        println!(
            "Stopped after {} of the configured rounds",
            summary.state.round_index
        );
    }

    Ok(())
}

async fn publish_params(
    cli: &Cli,
    relay: &RelayClient,
    params: DomainParameters,
    count: u32,
    interval_ms: u64,
) -> Result<()> {
    params.validate()?;

    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
        let seq = relay.publish(&cli.params_topic, &params).await?;
        info!(p = params.p, a = params.a, seq, "Parameters published");
    }

    Ok(())
}

fn run_decrypt(p: u64, n: u64, y1: u64, y2: u64) -> Result<()> {
    DomainParameters::new(p, 0).validate()?;
    if n == 0 || n > p - 2 {
        anyhow::bail!("n must lie in [1, {}]", p - 2);
    }

    let secret = EphemeralSecret::new(n);
    let x = elgamal::decrypt(p, &secret, &EncryptResponse { y1, y2 });
    let result = DecryptedResult { round: 0, x };

    println!("x: {}", result.x);
    println!("signed: {}", result.as_signed());

    Ok(())
}
