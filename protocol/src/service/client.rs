//! # Client
//!
//! The paying side of the network. Knows how to mask credentials under
//! the bank's published key, shape each request, and run the one-request,
//! one-reply exchange. Every call opens a fresh connection; there is no
//! session state to lose.
//!
//! Payments come in two flavors. [`BankClient::pay`] settles directly
//! against the bank with a plain receiver MID, which is what the machine
//! itself does after redeeming a token. [`BankClient::pay_at_machine`]
//! is the customer path: the scanned token goes to the terminal, which
//! redeems it and relays the settlement.

use tokio::net::TcpStream;
use tracing::debug;

use crate::crypto::{CredentialKeypair, PublicKey};
use crate::wire::{read_frame, write_frame, Amount, Request, Response, WireError};

/// A client of the bank (and of any payment machine).
#[derive(Debug, Clone)]
pub struct BankClient {
    bank_addr: String,
    key: PublicKey,
}

impl BankClient {
    /// A client pointed at a bank, masking with the shared demo key.
    pub fn new(bank_addr: impl Into<String>) -> Self {
        Self::with_key(bank_addr, CredentialKeypair::demo().public)
    }

    /// A client masking under a specific public key.
    pub fn with_key(bank_addr: impl Into<String>, key: PublicKey) -> Self {
        Self {
            bank_addr: bank_addr.into(),
            key,
        }
    }

    /// The key this client masks credentials with.
    pub fn public_key(&self) -> PublicKey {
        self.key
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Open a user account.
    pub async fn register_user(
        &self,
        name: &str,
        ifsc: &str,
        password: &str,
        pin: &str,
        mobile: &str,
        balance: i64,
    ) -> Result<Response, WireError> {
        self.call(&Request::RegisterUser {
            name: name.to_string(),
            ifsc: ifsc.to_string(),
            password: password.to_string(),
            pin: pin.to_string(),
            mobile: mobile.to_string(),
            balance: Amount::Int(balance),
        })
        .await
    }

    /// Open a merchant account.
    pub async fn register_merchant(
        &self,
        name: &str,
        ifsc: &str,
        password: &str,
        balance: i64,
    ) -> Result<Response, WireError> {
        self.call(&Request::RegisterMerchant {
            name: name.to_string(),
            ifsc: ifsc.to_string(),
            password: password.to_string(),
            balance: Amount::Int(balance),
        })
        .await
    }

    /// Settle directly against the bank with a plain receiver MID.
    pub async fn pay(
        &self,
        mmid: &str,
        pin: &str,
        receiver_mid: &str,
        amount: i64,
    ) -> Result<Response, WireError> {
        self.call(&Request::Transaction {
            encrypted_sender_mmid: self.key.encrypt_str(mmid),
            encrypted_sender_pin: self.key.encrypt_str(pin),
            encrypted_receiver_mid: None,
            receiver_mid: Some(receiver_mid.to_string()),
            amount: Amount::Int(amount),
        })
        .await
    }

    /// Pay at a terminal with a scanned token. The machine redeems the
    /// token and relays the settlement to the bank.
    pub async fn pay_at_machine(
        &self,
        machine_addr: &str,
        mmid: &str,
        pin: &str,
        scanned_token: &str,
        amount: i64,
    ) -> Result<Response, WireError> {
        let request = Request::Transaction {
            encrypted_sender_mmid: self.key.encrypt_str(mmid),
            encrypted_sender_pin: self.key.encrypt_str(pin),
            encrypted_receiver_mid: Some(scanned_token.to_string()),
            receiver_mid: None,
            amount: Amount::Int(amount),
        };
        exchange(machine_addr, &request).await
    }

    /// A user's balance, PIN-gated.
    pub async fn user_balance(&self, mmid: &str, pin: &str) -> Result<Response, WireError> {
        self.call(&Request::GetBalanceUser {
            mmid: mmid.to_string(),
            pin: pin.to_string(),
        })
        .await
    }

    /// A merchant's balance.
    pub async fn merchant_balance(&self, mid: &str) -> Result<Response, WireError> {
        self.call(&Request::GetBalanceMerchant {
            mid: mid.to_string(),
        })
        .await
    }

    async fn call(&self, request: &Request) -> Result<Response, WireError> {
        exchange(&self.bank_addr, request).await
    }
}

/// One connection, one request, one reply.
async fn exchange(addr: &str, request: &Request) -> Result<Response, WireError> {
    debug!(%addr, "dialing");
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, request).await?;
    read_frame(&mut stream).await?.ok_or_else(|| {
        WireError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed without replying",
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
