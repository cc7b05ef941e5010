//! Interactive CLI demo of the full PAISA payment lifecycle.
//!
//! Walks through bank bootstrap, user and merchant registration, token
//! issuance at a payment machine, a real payment over TCP sockets, direct
//! settlement, ledger verification, and finally the factoring attack that
//! recovers a PIN from eavesdropped wire traffic. The output uses ANSI
//! escape codes for colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;

use paisa_protocol::bank::Bank;
use paisa_protocol::crypto::{break_credentials, AttackOutcome, FactorBudget};
use paisa_protocol::ledger::GENESIS_ID;
use paisa_protocol::service::{BankClient, BankService, MachineService};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";
const RED: &str = "\x1b[31m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    PAISA  --  Interactive Payment Lifecycle Demo                   {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  SHA-256 ids + 16-bit RSA + ARX tokens         {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn id_display(name: &str, label: &str, id: &str, color: &str) {
    println!("  {color}{BOLD}{name}{RESET}  {DIM}{label}={RESET}{id}  {DIM}({} hex){RESET}", id.len());
}

fn balance_row(name: &str, balance: u64, color: &str) {
    println!("  {color}{BOLD}{name:<12}{RESET}  {WHITE}{balance:>12}{RESET} {DIM}rupees{RESET}");
}

fn separator() {
    println!(
        "{DIM}{CYAN}  . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . {RESET}"
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Bank Bootstrap
    // -----------------------------------------------------------------------

    section(1, "Bank Bootstrap");
    subsection("Opening a temporary store and serving the bank on an ephemeral port...");

    let t = Instant::now();
    let bank = Arc::new(Bank::open_temporary().expect("temporary bank"));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind bank");
    let bank_addr = listener.local_addr().expect("local addr").to_string();
    let service = BankService::new(Arc::clone(&bank));
    tokio::spawn(async move { service.serve(listener).await });
    timing("bank bootstrap", t.elapsed());

    let key = bank.public_key();
    info("Bank address", &bank_addr);
    info("Public exponent e", &key.e.to_string());
    info("Public modulus n", &key.n.to_string());
    println!();
    println!(
        "  {ITALIC}{DIM}That modulus is sixteen bits wide. Keep that in mind for Step 7.{RESET}"
    );
    success("Bank is listening");

    // -----------------------------------------------------------------------
    // Step 2: Registration
    // -----------------------------------------------------------------------

    section(2, "Account Registration");
    subsection("Opening a user account and a merchant account over the wire...");

    let client = BankClient::new(&bank_addr);

    let t = Instant::now();
    let reply = client
        .register_user("Asha Rao", "SBIN0001234", "hunter2", "4321", "9876543210", 1_000)
        .await
        .expect("register user");
    assert!(reply.is_success(), "{:?}", reply.message);
    let mmid = reply.mmid.expect("mmid");
    let uid = reply.uid.expect("uid");

    let reply = client
        .register_merchant("Chai Point", "HDFC0002345", "s3cret", 0)
        .await
        .expect("register merchant");
    assert!(reply.is_success(), "{:?}", reply.message);
    let mid = reply.mid.expect("mid");
    timing("2x registration over TCP", t.elapsed());

    println!();
    id_display("Asha Rao  ", "mmid", &mmid, BLUE);
    id_display("Asha Rao  ", "uid ", &uid, BLUE);
    id_display("Chai Point", "mid ", &mid, MAGENTA);
    println!();

    println!("  {BOLD}{WHITE}--- Opening Balances ---{RESET}");
    balance_row("Asha", 1_000, BLUE);
    balance_row("Chai Point", 0, MAGENTA);
    println!();
    success("Identifiers are SHA-256 prefixes; both accounts are live");

    // -----------------------------------------------------------------------
    // Step 3: Token Issuance at the Machine
    // -----------------------------------------------------------------------

    section(3, "Payment Machine Token Issuance");
    subsection("The merchant's terminal seals its MID under the current timestamp...");

    let t = Instant::now();
    let machine = MachineService::new(&mid, &bank_addr).expect("machine token");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind machine");
    let machine_addr = listener.local_addr().expect("local addr").to_string();
    let serving = machine.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    timing("token issue + machine bootstrap", t.elapsed());

    let token = machine.display_token();
    info("Machine address", &machine_addr);
    info("Displayed token", &token.token);
    info("Issued at", &token.issued_at);
    success("This is the QR code customers scan");

    // -----------------------------------------------------------------------
    // Step 4: Payment Through the Machine
    // -----------------------------------------------------------------------

    section(4, "Payment: Asha -> Chai Point (250 rupees, via machine)");
    subsection("Masking the MMID and PIN, scanning the token, paying over TCP...");

    let masked_pin = key.encrypt_str("4321");
    let preview: Vec<String> = masked_pin.iter().map(|v| v.to_string()).collect();
    info("Masked PIN on the wire", &format!("[{}]", preview.join(", ")));

    let t = Instant::now();
    let reply = client
        .pay_at_machine(&machine_addr, &mmid, "4321", &token.token, 250)
        .await
        .expect("pay at machine");
    timing("scan -> machine -> bank -> settle", t.elapsed());

    assert!(reply.is_success(), "{:?}", reply.message);
    info("Bank says", reply.message.as_deref().unwrap_or("?"));
    success("The machine redeemed the token and the bank settled the payment");

    // -----------------------------------------------------------------------
    // Step 5: Direct Settlement and Balances
    // -----------------------------------------------------------------------

    section(5, "Payment: Asha -> Chai Point (150 rupees, direct)");
    subsection("Paying the bank directly with a plain MID, then reading balances back...");

    let t = Instant::now();
    let reply = client.pay(&mmid, "4321", &mid, 150).await.expect("pay direct");
    assert!(reply.is_success(), "{:?}", reply.message);
    timing("direct settlement", t.elapsed());

    let asha = client.user_balance(&mmid, "4321").await.expect("balance");
    let chai = client.merchant_balance(&mid).await.expect("balance");
    info("Asha", asha.balance.as_deref().unwrap_or("?"));
    info("Chai Point", chai.balance.as_deref().unwrap_or("?"));

    separator();
    println!();
    println!("  {BOLD}{WHITE}--- Balances After Two Payments ---{RESET}");
    balance_row("Asha", 600, BLUE);
    balance_row("Chai Point", 400, MAGENTA);
    println!();

    // A wrong PIN goes nowhere.
    let reply = client.pay(&mmid, "9999", &mid, 50).await.expect("bad pin call");
    assert!(!reply.is_success());
    println!(
        "  {RED}[REFUSED]{RESET} wrong PIN: {BOLD}{}{RESET}",
        reply.message.as_deref().unwrap_or("?")
    );
    success("Two settlements done; the failed attempt left no trace");

    // -----------------------------------------------------------------------
    // Step 6: Ledger Verification
    // -----------------------------------------------------------------------

    section(6, "Ledger Integrity");
    subsection("Walking the hash-linked settlement chain...");

    let t = Instant::now();
    let blocks = bank.ledger().blocks();
    assert_eq!(blocks.len(), 2, "expected two settled blocks");
    assert_eq!(blocks[0].prev, GENESIS_ID);

    for (height, block) in blocks.iter().enumerate() {
        println!(
            "  {GREEN}[VALID]{RESET} Block #{height}  {DIM}amount={RESET}{}  {DIM}id={RESET}{}...  {DIM}prev={RESET}{}...",
            block.amount,
            &block.id[..12],
            &block.prev[..12],
        );
        assert!(block.is_self_consistent(), "block {height} digest mismatch");
    }
    bank.ledger().verify().expect("chain verifies");
    timing("chain walk + verify", t.elapsed());
    info("Chain tip", &bank.ledger().tip()[..16]);
    success("Every block links to its parent and matches its own digest");

    // -----------------------------------------------------------------------
    // Step 7: The Attack
    // -----------------------------------------------------------------------

    section(7, "Breaking the Credential Cipher");
    subsection("An eavesdropper saw the masked PIN in Step 4 and knows the public key...");

    let t = Instant::now();
    let outcome = break_credentials(&key, &masked_pin, &FactorBudget::default());
    let attack_time = t.elapsed();
    timing("order-finding + key reconstruction", attack_time);

    match outcome {
        AttackOutcome::Recovered {
            p,
            q,
            private,
            plaintext,
        } => {
            info("Factored modulus", &format!("{} = {p} x {q}", key.n));
            info("Reconstructed d", &private.d.to_string());
            info("Recovered PIN", &plaintext);
            assert_eq!(plaintext, "4321");
            println!();
            println!(
                "  {ITALIC}{DIM}A sixteen-bit modulus falls in milliseconds. This is the lesson,{RESET}"
            );
            println!("  {ITALIC}{DIM}not a flaw: the pipeline is real, the key sizes are the demo.{RESET}");
            success("The PIN fell out of the wire traffic");
        }
        AttackOutcome::Inconclusive { attempts } => {
            println!(
                "  {RED}[GAVE UP]{RESET} attack inconclusive after {attempts} attempts"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Final Summary
    // -----------------------------------------------------------------------

    let total_elapsed = demo_start.elapsed();

    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    DEMO COMPLETE -- Final Summary                                  {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();

    println!("  {BOLD}{WHITE}Network Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Accounts opened", "2 (1 user, 1 merchant)");
    info("Settlements", "2 (1 via machine, 1 direct)");
    info("Blocks appended", "2 (anchored at the all-zero genesis)");
    info("Refusals", "1 (wrong PIN, nothing moved)");
    info("Identifier digest", "SHA-256, 16-hex prefix");
    info("Credential cipher", "modular exponentiation, n = 32639");
    info("Token cipher", "timestamp XOR + 22-round ARX");
    info("Transport", "4-byte length-prefixed JSON over TCP");
    println!();

    println!("  {BOLD}{WHITE}Final Balances:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    balance_row("Asha", 600, BLUE);
    balance_row("Chai Point", 400, MAGENTA);
    println!();
    println!(
        "  {ITALIC}{DIM}Conservation check: 1000 rupees entered, 1000 remain in accounts.{RESET}"
    );

    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        total_elapsed.as_secs_f64()
    );
    println!();
}
