//! End-to-end integration tests for the PAISA network.
//!
//! These tests run the real endpoints: a bank service accepting TCP on an
//! ephemeral port, a payment machine relaying to it, and clients speaking
//! the length-prefixed JSON protocol. They prove the layers compose
//! correctly: registration, credential masking, token redemption,
//! settlement under per-account locks, the hash-linked ledger, and
//! database persistence.
//!
//! Each test binds its own listeners on port 0 and opens its own temporary
//! store. No shared state, no fixed ports, no test ordering dependencies.

use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use paisa_protocol::bank::Bank;
use paisa_protocol::crypto::{break_credentials, AttackOutcome, FactorBudget, TokenKey};
use paisa_protocol::ledger::GENESIS_ID;
use paisa_protocol::service::{BankClient, BankService, MachineService};
use paisa_protocol::wire::{read_frame, write_frame, Amount, Request, Response};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Opens a throwaway bank and serves it on an ephemeral port.
/// Returns the bank itself so tests can inspect the ledger directly,
/// plus a client already pointed at the bound address.
async fn spawn_bank() -> (Arc<Bank>, BankClient, String) {
    let bank = Arc::new(Bank::open_temporary().expect("temp bank"));
    let addr = serve_bank(Arc::clone(&bank)).await;
    let client = BankClient::new(&addr);
    (bank, client, addr)
}

/// Binds port 0 and spawns the bank's accept loop. Returns the address.
async fn serve_bank(bank: Arc<Bank>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    let service = BankService::new(bank);
    tokio::spawn(async move { service.serve(listener).await });
    addr
}

/// A payment machine for `mid` on an ephemeral port, forwarding to the
/// bank at `bank_addr`. Returns the machine (its copy of the token is the
/// one being served) and the bound address.
async fn serve_machine(mid: &str, bank_addr: &str) -> (MachineService, String) {
    let machine = MachineService::new(mid, bank_addr).expect("machine token");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    let serving = machine.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (machine, addr)
}

/// Registers a user with the stock password and PIN 4321. Returns
/// `(mmid, uid)`.
async fn open_user(client: &BankClient, name: &str, mobile: &str, deposit: i64) -> (String, String) {
    let reply = client
        .register_user(name, "SBIN0001234", "hunter2", "4321", mobile, deposit)
        .await
        .expect("register_user call");
    assert!(reply.is_success(), "registration failed: {:?}", reply.message);
    (
        reply.mmid.expect("mmid on success"),
        reply.uid.expect("uid on success"),
    )
}

/// Registers a merchant and returns its MID.
async fn open_merchant(client: &BankClient, name: &str, deposit: i64) -> String {
    let reply = client
        .register_merchant(name, "HDFC0002345", "s3cret", deposit)
        .await
        .expect("register_merchant call");
    assert!(reply.is_success(), "registration failed: {:?}", reply.message);
    reply.mid.expect("mid on success")
}

/// One request, one reply, on a fresh connection. For requests the typed
/// client cannot produce.
async fn exchange<T: serde::Serialize>(addr: &str, request: &T) -> Response {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    write_frame(&mut stream, request).await.expect("send frame");
    read_frame(&mut stream)
        .await
        .expect("recv frame")
        .expect("one reply")
}

// ---------------------------------------------------------------------------
// 1. Full Payment Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_payment_lifecycle() {
    let (bank, client, _addr) = spawn_bank().await;

    // Open both sides of the payment.
    let (mmid, uid) = open_user(&client, "Asha Rao", "9876543210", 1_000).await;
    let mid = open_merchant(&client, "Chai Point", 0).await;

    assert_eq!(mmid.len(), 16);
    assert_eq!(uid.len(), 16);
    assert_eq!(mid.len(), 16);
    assert!(mmid.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(mmid, uid);

    // Pay the merchant directly at the bank.
    let reply = client.pay(&mmid, "4321", &mid, 500).await.expect("pay call");
    assert!(reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Transaction successful"));

    // Both balances over the wire.
    let reply = client.user_balance(&mmid, "4321").await.expect("balance call");
    assert_eq!(reply.balance.as_deref(), Some("Current Balance: 500"));
    let reply = client.merchant_balance(&mid).await.expect("balance call");
    assert_eq!(reply.balance.as_deref(), Some("Current Balance: 500"));

    // The settlement landed on the chain.
    let blocks = bank.ledger().blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].prev, GENESIS_ID);
    assert_eq!(blocks[0].sender_mmid, mmid);
    assert_eq!(blocks[0].receiver_mid, mid);
    assert_eq!(blocks[0].amount, 500);
    assert_eq!(bank.ledger().tip(), blocks[0].id);
    assert!(bank.ledger().verify().is_ok());
}

// ---------------------------------------------------------------------------
// 2. Registration Over the Wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registration_rejects_unknown_branches_and_bad_balances() {
    let (_bank, client, addr) = spawn_bank().await;

    // A branch code nobody issued.
    let reply = client
        .register_user("Neel", "AXIS0009999", "pw", "1111", "9812345670", 100)
        .await
        .expect("register call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("INVALID IFSC"));

    // Negative opening balances never open accounts.
    let reply = client
        .register_merchant("Corner Store", "SBIN0001234", "pw", -50)
        .await
        .expect("register call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Invalid balance"));

    // A fractional string is no better.
    let reply = exchange(
        &addr,
        &Request::RegisterMerchant {
            name: "Corner Store".to_string(),
            ifsc: "SBIN0001234".to_string(),
            password: "pw".to_string(),
            balance: Amount::Text("12.5".to_string()),
        },
    )
    .await;
    assert_eq!(reply.message.as_deref(), Some("Invalid balance"));

    // Whitespace-padded digits are what interactive clients send; they work.
    let reply = exchange(
        &addr,
        &Request::RegisterMerchant {
            name: "Kirana King".to_string(),
            ifsc: "ICIC0003456".to_string(),
            password: "pw".to_string(),
            balance: Amount::Text("  750 ".to_string()),
        },
    )
    .await;
    assert!(reply.is_success(), "registration failed: {:?}", reply.message);
    let mid = reply.mid.expect("mid on success");

    let reply = client.merchant_balance(&mid).await.expect("balance call");
    assert_eq!(reply.balance.as_deref(), Some("Current Balance: 750"));
}

// ---------------------------------------------------------------------------
// 3. Wrong PIN Moves Nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_pin_moves_nothing() {
    let (bank, client, _addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Bashir", "9000000011", 800).await;
    let mid = open_merchant(&client, "Book Stall", 100).await;

    let reply = client.pay(&mmid, "9999", &mid, 300).await.expect("pay call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Incorrect Pin"));

    // Balance queries are gated on the same PIN.
    let reply = client.user_balance(&mmid, "9999").await.expect("balance call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Invalid credentials"));

    // Nothing moved and nothing was minted.
    assert_eq!(bank.user_balance(&mmid, "4321"), Some(800));
    assert_eq!(bank.merchant_balance(&mid), Some(100));
    assert!(bank.ledger().is_empty());
}

// ---------------------------------------------------------------------------
// 4. Unknown Accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_accounts_get_precise_refusals() {
    let (bank, client, _addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Chitra", "9000000021", 400).await;
    let mid = open_merchant(&client, "Dosa Cart", 0).await;

    let reply = client
        .pay("ffffffffffffffff", "4321", &mid, 100)
        .await
        .expect("pay call");
    assert_eq!(reply.message.as_deref(), Some("Invalid sender MMID"));

    let reply = client
        .pay(&mmid, "4321", "0000000000000001", 100)
        .await
        .expect("pay call");
    assert_eq!(reply.message.as_deref(), Some("Merchant not found"));

    let reply = client
        .merchant_balance("0000000000000001")
        .await
        .expect("balance call");
    assert_eq!(reply.message.as_deref(), Some("Invalid mid"));

    assert!(bank.ledger().is_empty());
}

// ---------------------------------------------------------------------------
// 5. Bad Amounts and Thin Balances
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_amounts_and_thin_balances_leave_no_trace() {
    let (bank, client, addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Devika", "9000000051", 100).await;
    let mid = open_merchant(&client, "Flower Stand", 0).await;

    // Zero and negative amounts are refused before any balance check.
    for amount in [0, -300] {
        let reply = client.pay(&mmid, "4321", &mid, amount).await.expect("pay call");
        assert_eq!(reply.message.as_deref(), Some("Invalid amount"));
    }

    // Unparseable text amounts get the same answer.
    let key = client.public_key();
    let reply = exchange(
        &addr,
        &Request::Transaction {
            encrypted_sender_mmid: key.encrypt_str(&mmid),
            encrypted_sender_pin: key.encrypt_str("4321"),
            encrypted_receiver_mid: None,
            receiver_mid: Some(mid.clone()),
            amount: Amount::Text("junk".to_string()),
        },
    )
    .await;
    assert_eq!(reply.message.as_deref(), Some("Invalid amount"));

    // More than the account holds.
    let reply = client.pay(&mmid, "4321", &mid, 500).await.expect("pay call");
    assert_eq!(reply.message.as_deref(), Some("Error: Insufficient balance"));

    assert_eq!(bank.user_balance(&mmid, "4321"), Some(100));
    assert_eq!(bank.merchant_balance(&mid), Some(0));
    assert!(bank.ledger().is_empty());
}

// ---------------------------------------------------------------------------
// 6. Racing Payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn racing_payments_cannot_overdraw() {
    let (bank, client, _addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Esha", "9000000061", 500).await;
    let mid = open_merchant(&client, "Gol Gappa", 0).await;

    // Eight racers over real sockets, funds for exactly five.
    let mut racers = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let mmid = mmid.clone();
        let mid = mid.clone();
        racers.push(tokio::spawn(async move {
            client.pay(&mmid, "4321", &mid, 100).await.expect("pay call")
        }));
    }

    let mut settled = 0;
    let mut refused = 0;
    for racer in racers {
        let reply = racer.await.expect("racer task");
        if reply.is_success() {
            settled += 1;
        } else {
            assert_eq!(reply.message.as_deref(), Some("Error: Insufficient balance"));
            refused += 1;
        }
    }
    assert_eq!(settled, 5);
    assert_eq!(refused, 3);

    assert_eq!(bank.user_balance(&mmid, "4321"), Some(0));
    assert_eq!(bank.merchant_balance(&mid), Some(500));
    assert_eq!(bank.ledger().len(), 5);
    assert!(bank.ledger().verify().is_ok());
}

// ---------------------------------------------------------------------------
// 7. The Settlement Chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settlement_chain_links_and_verifies() {
    let (bank, client, _addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Farida", "9000000071", 1_000).await;
    let mid_a = open_merchant(&client, "Auto Stand", 0).await;
    let mid_b = open_merchant(&client, "Bhel House", 0).await;

    for (mid, amount) in [(&mid_a, 150), (&mid_b, 250), (&mid_a, 350)] {
        let reply = client.pay(&mmid, "4321", mid, amount).await.expect("pay call");
        assert!(reply.is_success(), "payment failed: {:?}", reply.message);
    }

    let blocks = bank.ledger().blocks();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].prev, GENESIS_ID);
    assert_eq!(blocks[1].prev, blocks[0].id);
    assert_eq!(blocks[2].prev, blocks[1].id);
    assert_eq!(
        blocks.iter().map(|b| b.amount).collect::<Vec<_>>(),
        [150, 250, 350]
    );
    assert_eq!(blocks[1].receiver_mid, mid_b);
    assert_eq!(blocks[2].receiver_mid, mid_a);
    assert_eq!(bank.ledger().tip(), blocks[2].id);
    assert!(bank.ledger().verify().is_ok());
}

// ---------------------------------------------------------------------------
// 8. Machine Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn machine_relays_token_payments_to_the_bank() {
    let (bank, client, bank_addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Farhan", "9000000031", 900).await;
    let mid = open_merchant(&client, "Juice Stall", 0).await;

    let (machine, machine_addr) = serve_machine(&mid, &bank_addr).await;
    let token = machine.display_token().token.clone();

    // The customer scans the displayed token and pays through the machine.
    let reply = client
        .pay_at_machine(&machine_addr, &mmid, "4321", &token, 250)
        .await
        .expect("pay call");
    assert!(reply.is_success(), "payment failed: {:?}", reply.message);
    assert_eq!(reply.message.as_deref(), Some("Transaction successful"));

    // The machine keeps serving; a second customer pays the same terminal.
    let reply = client
        .pay_at_machine(&machine_addr, &mmid, "4321", &token, 100)
        .await
        .expect("second pay call");
    assert!(reply.is_success());

    assert_eq!(bank.merchant_balance(&mid), Some(350));
    assert_eq!(bank.user_balance(&mmid, "4321"), Some(550));
    assert_eq!(bank.ledger().len(), 2);
}

// ---------------------------------------------------------------------------
// 9. Token Refusals at the Machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn machine_refuses_bad_tokens_and_wrong_requests() {
    let (bank, client, bank_addr) = spawn_bank().await;
    let (mmid, _uid) = open_user(&client, "Gita", "9000000041", 500).await;
    let mid = open_merchant(&client, "Paan Shop", 0).await;
    let (_machine, machine_addr) = serve_machine(&mid, &bank_addr).await;

    // Not a token at all.
    let reply = client
        .pay_at_machine(&machine_addr, &mmid, "4321", "zzzz", 100)
        .await
        .expect("pay call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Invalid QR code"));

    // A real token sealed on another day redeems to a different MID,
    // which the bank has never heard of.
    let stale = TokenKey::demo()
        .seal(&mid, "19990101000000")
        .expect("seal stale token");
    let reply = client
        .pay_at_machine(&machine_addr, &mmid, "4321", &stale, 100)
        .await
        .expect("pay call");
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Merchant not found"));

    // The machine only handles payments.
    let reply = exchange(&machine_addr, &Request::GetBalanceMerchant { mid: mid.clone() }).await;
    assert_eq!(
        reply.message.as_deref(),
        Some("machine accepts transactions only")
    );

    // A payment with no token attached.
    let key = client.public_key();
    let reply = exchange(
        &machine_addr,
        &Request::Transaction {
            encrypted_sender_mmid: key.encrypt_str(&mmid),
            encrypted_sender_pin: key.encrypt_str("4321"),
            encrypted_receiver_mid: None,
            receiver_mid: None,
            amount: Amount::Int(100),
        },
    )
    .await;
    assert_eq!(
        reply.message.as_deref(),
        Some("missing encrypted_receiver_mid")
    );

    // None of that moved money.
    assert_eq!(bank.user_balance(&mmid, "4321"), Some(500));
    assert!(bank.ledger().is_empty());
}

// ---------------------------------------------------------------------------
// 10. Hostile Frames on a Live Connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_connection_survives_hostile_frames() {
    let (_bank, _client, addr) = spawn_bank().await;

    let mut stream = TcpStream::connect(&addr).await.expect("connect");

    // A well-formed request on a fresh connection.
    let honest = Request::GetBalanceMerchant {
        mid: "0011223344556677".to_string(),
    };
    write_frame(&mut stream, &honest).await.expect("send");
    let reply: Response = read_frame(&mut stream).await.expect("recv").expect("reply");
    assert_eq!(reply.message.as_deref(), Some("Invalid mid"));

    // Valid JSON the protocol has no tag for.
    write_frame(&mut stream, &json!({ "type": "mystery" }))
        .await
        .expect("send");
    let reply: Response = read_frame(&mut stream).await.expect("recv").expect("reply");
    assert!(!reply.is_success());

    // Raw bytes that are not JSON at all. The length prefix keeps the
    // stream in sync, so the server can refuse the frame and move on.
    stream.write_u32(9).await.expect("prefix");
    stream.write_all(b"not json!").await.expect("body");
    let reply: Response = read_frame(&mut stream).await.expect("recv").expect("reply");
    assert!(!reply.is_success());

    // The same connection still answers honest requests.
    write_frame(&mut stream, &honest).await.expect("send");
    let reply: Response = read_frame(&mut stream).await.expect("recv").expect("reply");
    assert_eq!(reply.message.as_deref(), Some("Invalid mid"));
}

// ---------------------------------------------------------------------------
// 11. Restart Keeps Accounts and Chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restart_keeps_accounts_and_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db");

    // First session: open accounts and settle one payment, then shut down.
    let (mmid, mid);
    {
        let bank = Bank::open(&path).expect("open bank");
        let user = bank
            .register_user(
                "Asha Rao",
                "SBIN0001234",
                "hunter2",
                "4321",
                "9876543210",
                &Amount::from(700),
            )
            .expect("register user");
        let merchant = bank
            .register_merchant("Chai Point", "HDFC0002345", "s3cret", &Amount::from(0))
            .expect("register merchant");
        mmid = user.mmid.clone();
        mid = merchant.mid.clone();

        let key = bank.public_key();
        bank.transfer(
            &key.encrypt_str(&mmid),
            &key.encrypt_str("4321"),
            &mid,
            &Amount::from(300),
        )
        .expect("transfer");
    }
    // The bank is dropped here; the store lock is released.

    // Second session: reopen and serve the same store over TCP.
    let bank = Arc::new(Bank::open(&path).expect("reopen bank"));
    assert_eq!(bank.user_count(), 1);
    assert_eq!(bank.merchant_count(), 1);
    assert_eq!(bank.ledger().len(), 1);

    let addr = serve_bank(Arc::clone(&bank)).await;
    let client = BankClient::new(&addr);

    let reply = client.user_balance(&mmid, "4321").await.expect("balance call");
    assert_eq!(reply.balance.as_deref(), Some("Current Balance: 400"));
    let reply = client.merchant_balance(&mid).await.expect("balance call");
    assert_eq!(reply.balance.as_deref(), Some("Current Balance: 300"));

    // The rebuilt chain accepts new settlements on top of the old tip.
    let reply = client.pay(&mmid, "4321", &mid, 150).await.expect("pay call");
    assert_eq!(reply.message.as_deref(), Some("Transaction successful"));

    let blocks = bank.ledger().blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].prev, GENESIS_ID);
    assert_eq!(blocks[1].prev, blocks[0].id);
    assert!(bank.ledger().verify().is_ok());
}

// ---------------------------------------------------------------------------
// 12. Racing Settlements Survive a Restart
// ---------------------------------------------------------------------------

#[test]
fn racing_settlements_reopen_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db");

    // First session: ten racing 100-unit payments drain the account to
    // exactly zero, each writing through to disk as it settles.
    let (mmid, mid, tip);
    {
        let bank = Arc::new(Bank::open(&path).expect("open bank"));
        let user = bank
            .register_user(
                "Heena",
                "SBIN0001234",
                "hunter2",
                "4321",
                "9000000081",
                &Amount::from(1_000),
            )
            .expect("register user");
        let merchant = bank
            .register_merchant("Idli House", "HDFC0002345", "s3cret", &Amount::from(0))
            .expect("register merchant");
        mmid = user.mmid.clone();
        mid = merchant.mid.clone();
        let key = bank.public_key();

        let mut racers = Vec::new();
        for _ in 0..10 {
            let bank = Arc::clone(&bank);
            let enc_mmid = key.encrypt_str(&mmid);
            let enc_pin = key.encrypt_str("4321");
            let mid = mid.clone();
            racers.push(std::thread::spawn(move || {
                bank.transfer(&enc_mmid, &enc_pin, &mid, &Amount::from(100))
                    .expect("funded transfer settles")
            }));
        }
        for racer in racers {
            racer.join().expect("racer thread");
        }

        assert_eq!(bank.ledger().len(), 10);
        tip = bank.ledger().tip();
    }
    // All handles dropped; the store lock is released.

    // Second session: the store must reopen with the racers' writes in a
    // consistent order, tip included.
    let bank = Bank::open(&path).expect("reopen after racing settlements");
    assert_eq!(bank.user_balance(&mmid, "4321"), Some(0));
    assert_eq!(bank.merchant_balance(&mid), Some(1_000));
    assert_eq!(bank.ledger().len(), 10);
    assert_eq!(bank.ledger().tip(), tip);
    assert!(bank.ledger().verify().is_ok());
}

// ---------------------------------------------------------------------------
// 13. Eavesdropped Credentials
// ---------------------------------------------------------------------------

#[test]
fn eavesdropped_credentials_fall_to_factoring() {
    // What an attacker sees on the wire: the masked PIN and the public key
    // every client ships with.
    let client = BankClient::new("127.0.0.1:1");
    let key = client.public_key();
    let captured = key.encrypt_str("4321");

    match break_credentials(&key, &captured, &FactorBudget::default()) {
        AttackOutcome::Recovered {
            p, q, plaintext, ..
        } => {
            assert_eq!(p * q, key.n);
            assert_eq!(plaintext, "4321");
        }
        AttackOutcome::Inconclusive { attempts } => {
            panic!("demo modulus should factor within {attempts} attempts")
        }
    }
}
