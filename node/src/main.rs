// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PAISA Node
//!
//! Entry point for the `paisa-node` binary. One executable covers every
//! role in the payment simulation:
//!
//! - `bank`              — run the bank endpoint
//! - `machine`           — run a merchant's payment machine
//! - `register-user`     — open a user account
//! - `register-merchant` — open a merchant account
//! - `pay`               — pay a merchant (token via machine, or MID direct)
//! - `balance-user`      — PIN-gated user balance
//! - `balance-merchant`  — merchant balance
//! - `ledger`            — dump and verify the settlement chain
//! - `crack`             — recover the demo private key by factoring
//! - `version`           — print build version information

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use paisa_protocol::bank::Bank;
use paisa_protocol::crypto::{break_credentials, AttackOutcome, CredentialKeypair, FactorBudget};
use paisa_protocol::ledger::Ledger;
use paisa_protocol::service::{BankClient, BankService, MachineService};
use paisa_protocol::store::BankStore;
use paisa_protocol::wire::Response;

use cli::{Commands, PaisaNodeCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PaisaNodeCli::parse();

    match cli.command {
        Commands::Bank(args) => run_bank(args).await,
        Commands::Machine(args) => run_machine(args).await,
        Commands::RegisterUser(args) => register_user(args).await,
        Commands::RegisterMerchant(args) => register_merchant(args).await,
        Commands::Pay(args) => pay(args).await,
        Commands::BalanceUser(args) => balance_user(args).await,
        Commands::BalanceMerchant(args) => balance_merchant(args).await,
        Commands::Ledger(args) => show_ledger(args),
        Commands::Crack(args) => crack(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the bank: opens (or creates) the store, rehydrates accounts and
/// the chain, and serves until a shutdown signal arrives.
async fn run_bank(args: cli::BankArgs) -> Result<()> {
    logging::init_logging("paisa_node=info,paisa_protocol=info", args.log_format);

    tracing::info!(
        port = args.port,
        data_dir = %args.data_dir.display(),
        "starting paisa-node bank"
    );

    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let bank = Arc::new(
        Bank::open(&db_path)
            .with_context(|| format!("failed to open bank store at {}", db_path.display()))?,
    );

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind bank listener on {addr}"))?;

    let service = BankService::new(bank);
    tokio::select! {
        res = service.serve(listener) => {
            if let Err(e) = res {
                tracing::error!("bank service error: {e}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("paisa-node bank stopped");
    Ok(())
}

/// Starts a merchant's payment machine: issues the payment token, prints
/// it for the counter display, and relays settlements until shutdown.
async fn run_machine(args: cli::MachineArgs) -> Result<()> {
    logging::init_logging("paisa_node=info,paisa_protocol=info", args.log_format);

    let machine = MachineService::new(&args.mid, args.bank.clone())
        .with_context(|| format!("failed to issue a payment token for MID {}", args.mid))?;

    let token = machine.display_token();
    println!("Payment token : {}", token.token);
    println!("Issued at     : {}", token.issued_at);
    println!("Customers pay with: paisa-node pay --token {} ...", token.token);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind machine listener on {addr}"))?;

    tokio::select! {
        res = machine.serve(listener) => {
            if let Err(e) = res {
                tracing::error!("machine service error: {e}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, closing the terminal");
        }
    }

    tracing::info!("paisa-node machine stopped");
    Ok(())
}

/// Opens a user account and prints the issued identifiers.
async fn register_user(args: cli::RegisterUserArgs) -> Result<()> {
    let client = BankClient::new(args.bank);
    let response = client
        .register_user(
            &args.name,
            &args.ifsc,
            &args.password,
            &args.pin,
            &args.mobile,
            args.balance,
        )
        .await?;
    print_response(&response)
}

/// Opens a merchant account and prints the issued MID.
async fn register_merchant(args: cli::RegisterMerchantArgs) -> Result<()> {
    let client = BankClient::new(args.bank);
    let response = client
        .register_merchant(&args.name, &args.ifsc, &args.password, args.balance)
        .await?;
    print_response(&response)
}

/// Pays a merchant, through a machine token or directly by MID.
async fn pay(args: cli::PayArgs) -> Result<()> {
    let client = BankClient::new(args.bank);
    let response = match (&args.mid, &args.token) {
        (Some(mid), None) => client.pay(&args.mmid, &args.pin, mid, args.amount).await?,
        (None, Some(token)) => {
            client
                .pay_at_machine(&args.machine, &args.mmid, &args.pin, token, args.amount)
                .await?
        }
        _ => anyhow::bail!("exactly one of --mid or --token is required"),
    };
    print_response(&response)
}

/// Prints a user's balance line.
async fn balance_user(args: cli::BalanceUserArgs) -> Result<()> {
    let client = BankClient::new(args.bank);
    let response = client.user_balance(&args.mmid, &args.pin).await?;
    print_response(&response)
}

/// Prints a merchant's balance line.
async fn balance_merchant(args: cli::BalanceMerchantArgs) -> Result<()> {
    let client = BankClient::new(args.bank);
    let response = client.merchant_balance(&args.mid).await?;
    print_response(&response)
}

/// Dumps the settlement chain from a data directory and verifies it.
fn show_ledger(args: cli::LedgerArgs) -> Result<()> {
    let db_path = args.data_dir.join("db");
    let store = BankStore::open(&db_path)
        .with_context(|| format!("failed to open bank store at {}", db_path.display()))?;

    let blocks = store.blocks()?;
    if blocks.is_empty() {
        println!("Ledger is empty.");
        return Ok(());
    }

    let ledger = Ledger::from_blocks(blocks).context("stored chain does not link")?;
    ledger.verify().context("stored chain fails verification")?;

    for (height, block) in ledger.blocks().iter().enumerate() {
        println!("#{height}  {}", block.id);
        println!("    time     : {}", block.timestamp);
        println!("    sender   : {} ({})", block.sender_mmid, block.sender_branch);
        println!("    receiver : {} ({})", block.receiver_mid, block.receiver_branch);
        println!("    amount   : {}", block.amount);
        println!("    prev     : {}", block.prev);
    }
    println!("{} block(s), tip {}", ledger.len(), ledger.tip());
    println!("Chain verifies.");
    Ok(())
}

/// Masks a PIN under the demo key, then recovers it by factoring the
/// modulus — the whole point of shipping a 15-bit modulus.
fn crack(args: cli::CrackArgs) -> Result<()> {
    let keypair = CredentialKeypair::demo();
    let masked = keypair.public.encrypt_str(&args.pin);
    let budget = FactorBudget {
        attempts: args.attempts,
        period_iterations: args.period_iterations,
    };

    println!("Public key : e = {}, n = {}", keypair.public.e, keypair.public.n);
    println!("Captured   : {masked:?}");

    match break_credentials(&keypair.public, &masked, &budget) {
        AttackOutcome::Recovered {
            p,
            q,
            private,
            plaintext,
        } => {
            println!("Factored   : n = {p} x {q}");
            println!("Private key: d = {}", private.d);
            println!("Recovered  : {plaintext:?}");
        }
        AttackOutcome::Inconclusive { attempts } => {
            println!("Attack inconclusive after {attempts} attempt(s); rerun or raise --attempts.");
        }
    }
    Ok(())
}

/// Renders a reply for the terminal: the interesting field on success,
/// a nonzero exit with the failure text otherwise.
fn print_response(response: &Response) -> Result<()> {
    if !response.is_success() {
        anyhow::bail!(
            "{}",
            response.message.as_deref().unwrap_or("request failed")
        );
    }

    if let (Some(mmid), Some(uid)) = (&response.mmid, &response.uid) {
        println!("MMID : {mmid}");
        println!("UID  : {uid}");
    } else if let Some(mid) = &response.mid {
        println!("MID : {mid}");
    } else if let Some(balance) = &response.balance {
        println!("{balance}");
    } else if let Some(message) = &response.message {
        println!("{message}");
    } else {
        println!("OK");
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("paisa-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", paisa_protocol::config::PROTOCOL_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
