//! # CLI Interface
//!
//! Defines the command-line argument structure for `paisa-node` using
//! `clap` derive. One binary plays every role in the simulation: the bank,
//! a merchant's payment machine, the paying client, and the attacker.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use paisa_protocol::config::{
    DEFAULT_BANK_ADDR, DEFAULT_BANK_PORT, DEFAULT_FACTOR_ATTEMPTS, DEFAULT_MACHINE_ADDR,
    DEFAULT_MACHINE_PORT, DEFAULT_PERIOD_ITERATIONS,
};

use crate::logging::LogFormat;

/// PAISA payment network node.
///
/// A complete simulation of a UPI-style instant payment network: the bank
/// endpoint, merchant-side payment machines, client operations against
/// either, ledger inspection, and the textbook key-recovery attack.
#[derive(Parser, Debug)]
#[command(
    name = "paisa-node",
    about = "PAISA payment network node",
    version,
    propagate_version = true
)]
pub struct PaisaNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the PAISA node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bank: accounts, settlements, the ledger.
    Bank(BankArgs),
    /// Run a merchant's payment machine: issues the payment token and
    /// relays settlements to the bank.
    Machine(MachineArgs),
    /// Open a user account at the bank.
    RegisterUser(RegisterUserArgs),
    /// Open a merchant account at the bank.
    RegisterMerchant(RegisterMerchantArgs),
    /// Pay a merchant, either through a machine token or directly by MID.
    Pay(PayArgs),
    /// Query a user's balance (PIN required).
    BalanceUser(BalanceUserArgs),
    /// Query a merchant's balance.
    BalanceMerchant(BalanceMerchantArgs),
    /// Inspect and verify the settlement chain in a data directory.
    Ledger(LedgerArgs),
    /// Run the key-recovery attack against the demo credential key.
    Crack(CrackArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `bank` subcommand.
#[derive(Parser, Debug)]
pub struct BankArgs {
    /// Path to the bank's data directory. Created on first run.
    #[arg(long, short = 'd', env = "PAISA_DATA_DIR", default_value = "~/.paisa")]
    pub data_dir: PathBuf,

    /// TCP port the bank listens on.
    #[arg(long, env = "PAISA_BANK_PORT", default_value_t = DEFAULT_BANK_PORT)]
    pub port: u16,

    /// Log output format.
    #[arg(long, env = "PAISA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `machine` subcommand.
#[derive(Parser, Debug)]
pub struct MachineArgs {
    /// The merchant's 16-hex MID this terminal collects for.
    #[arg(long)]
    pub mid: String,

    /// TCP port the machine listens on.
    #[arg(long, env = "PAISA_MACHINE_PORT", default_value_t = DEFAULT_MACHINE_PORT)]
    pub port: u16,

    /// Address of the bank to settle against.
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// Log output format.
    #[arg(long, env = "PAISA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `register-user` subcommand.
#[derive(Parser, Debug)]
pub struct RegisterUserArgs {
    /// Address of the bank.
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// Account holder's name.
    #[arg(long)]
    pub name: String,

    /// Branch routing code, e.g. SBIN0001234.
    #[arg(long)]
    pub ifsc: String,

    /// Account password.
    #[arg(long)]
    pub password: String,

    /// Payment PIN.
    #[arg(long)]
    pub pin: String,

    /// Mobile number; the MMID is derived from it.
    #[arg(long)]
    pub mobile: String,

    /// Opening balance.
    #[arg(long, default_value_t = 0)]
    pub balance: i64,
}

/// Arguments for the `register-merchant` subcommand.
#[derive(Parser, Debug)]
pub struct RegisterMerchantArgs {
    /// Address of the bank.
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// Merchant's name.
    #[arg(long)]
    pub name: String,

    /// Branch routing code, e.g. HDFC0002345.
    #[arg(long)]
    pub ifsc: String,

    /// Account password.
    #[arg(long)]
    pub password: String,

    /// Opening balance.
    #[arg(long, default_value_t = 0)]
    pub balance: i64,
}

/// Arguments for the `pay` subcommand.
///
/// Exactly one settlement target: `--token` (the customer path, via a
/// payment machine) or `--mid` (straight to the bank, which is what the
/// machine itself does after redeeming).
#[derive(Parser, Debug)]
#[command(group(
    clap::ArgGroup::new("target")
        .required(true)
        .args(["token", "mid"])
))]
pub struct PayArgs {
    /// Address of the bank (used with --mid).
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// Address of the payment machine (used with --token).
    #[arg(long, env = "PAISA_MACHINE_ADDR", default_value = DEFAULT_MACHINE_ADDR)]
    pub machine: String,

    /// The payer's MMID.
    #[arg(long)]
    pub mmid: String,

    /// The payer's PIN.
    #[arg(long)]
    pub pin: String,

    /// The token scanned off the machine's display.
    #[arg(long)]
    pub token: Option<String>,

    /// The merchant's plain MID, for settling directly at the bank.
    #[arg(long)]
    pub mid: Option<String>,

    /// Amount to pay.
    #[arg(long)]
    pub amount: i64,
}

/// Arguments for the `balance-user` subcommand.
#[derive(Parser, Debug)]
pub struct BalanceUserArgs {
    /// Address of the bank.
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// The account's MMID.
    #[arg(long)]
    pub mmid: String,

    /// The account's PIN.
    #[arg(long)]
    pub pin: String,
}

/// Arguments for the `balance-merchant` subcommand.
#[derive(Parser, Debug)]
pub struct BalanceMerchantArgs {
    /// Address of the bank.
    #[arg(long, env = "PAISA_BANK_ADDR", default_value = DEFAULT_BANK_ADDR)]
    pub bank: String,

    /// The account's MID.
    #[arg(long)]
    pub mid: String,
}

/// Arguments for the `ledger` subcommand.
///
/// Opens the store exclusively, so the bank must not be running against
/// the same data directory.
#[derive(Parser, Debug)]
pub struct LedgerArgs {
    /// Path to the bank's data directory.
    #[arg(long, short = 'd', env = "PAISA_DATA_DIR", default_value = "~/.paisa")]
    pub data_dir: PathBuf,
}

/// Arguments for the `crack` subcommand.
#[derive(Parser, Debug)]
pub struct CrackArgs {
    /// The PIN to mask under the demo key and then recover.
    #[arg(long, default_value = "4321")]
    pub pin: String,

    /// Factoring attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_FACTOR_ATTEMPTS)]
    pub attempts: u32,

    /// Iteration cap per period search.
    #[arg(long, default_value_t = DEFAULT_PERIOD_ITERATIONS)]
    pub period_iterations: u32,
}
