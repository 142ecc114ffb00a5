//! Hushboard demo binary.
//!
//! Runs a complete exchange on the simulated local chain: one wallet sends
//! encrypted messages, the other lists and decrypts them. Everything is
//! seeded, so a given `--seed` replays the same accounts and handles.
//!
//! # Usage
//!
//! ```bash
//! hushboard --message hi --message "gm"
//! RUST_LOG=hushboard_app=debug hushboard --seed 7
//! ```

use clap::Parser;
use hushboard_app::{OperationError, Phase, StatusSnapshot};
use hushboard_core::{Address, MessageId};
use hushboard_harness::{SimRuntime, SimWorld};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Hushboard local exchange
#[derive(Parser, Debug)]
#[command(name = "hushboard")]
#[command(about = "Send and decrypt confidential messages on a simulated chain")]
#[command(version)]
struct Args {
    /// Message to send; repeat for several (at most 8 UTF-8 bytes each)
    #[arg(short, long = "message", default_value = "hi")]
    messages: Vec<String>,

    /// Seed for accounts, keys and ciphertexts
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("{who} is not ready: {phase:?}")]
    NotReady { who: &'static str, phase: Phase },

    #[error("{who} failed: {source}")]
    Operation {
        who: &'static str,
        #[source]
        source: OperationError,
    },

    #[error("message {message_id} was not decrypted")]
    NotDecrypted { message_id: MessageId },
}

/// Fail with the runtime's recorded error, if the last operation left one.
fn check(who: &'static str, status: &StatusSnapshot) -> Result<(), DemoError> {
    match &status.last_error {
        Some(source) => {
            tracing::warn!(
                who,
                error = %source,
                retryable = source.is_transient(),
                "operation failed"
            );
            Err(DemoError::Operation { who, source: source.clone() })
        },
        None => Ok(()),
    }
}

async fn connect(who: &'static str, runtime: &mut SimRuntime) -> Result<Address, DemoError> {
    runtime.connect();
    runtime.settle().await;

    let status = runtime.status();
    check(who, &status)?;
    match (status.phase, status.session.signer) {
        (Phase::InstanceReady, Some(signer)) => {
            tracing::info!(who, %signer, chain_id = ?status.session.chain_id, "connected");
            Ok(signer)
        },
        (phase, _) => Err(DemoError::NotReady { who, phase }),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, "Hushboard starting on the local chain");

    let world = SimWorld::new(args.seed);
    let alice_wallet = world.wallet(1);
    let bob_wallet = world.wallet(1);

    let mut alice = world.runtime(&alice_wallet);
    let mut bob = world.runtime(&bob_wallet);
    connect("alice", &mut alice).await?;
    let bob_address = connect("bob", &mut bob).await?;

    for text in &args.messages {
        alice
            .send(&bob_address.to_string(), text)
            .map_err(|source| DemoError::Operation { who: "alice", source })?;
        alice.settle().await;
        check("alice", &alice.status())?;
    }
    tracing::info!(sent = alice.status().sent_count(), "alice sent messages");

    bob.refresh().map_err(|source| DemoError::Operation { who: "bob", source })?;
    bob.settle().await;
    check("bob", &bob.status())?;

    let received = bob.status().received;
    tracing::info!(received = received.len(), "bob listed inbox");

    for message_id in received {
        bob.decrypt(message_id).map_err(|source| DemoError::Operation { who: "bob", source })?;
        bob.settle().await;

        let status = bob.status();
        check("bob", &status)?;
        let text = status.clear_text(message_id).ok_or(DemoError::NotDecrypted { message_id })?;
        tracing::info!(message_id, text, "bob decrypted message");
    }

    tracing::info!(
        prompts = bob_wallet.sign_prompts(),
        decryptions = world.coprocessor().decryptions(),
        "exchange complete"
    );

    Ok(())
}
