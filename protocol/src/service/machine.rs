//! # Payment Machine
//!
//! The merchant-side terminal. At startup it enciphers the merchant's MID
//! under the shared terminal key, bound to the issuance wall clock; that
//! token is what gets rendered into the scannable code on the counter.
//!
//! When a payment arrives, the machine redeems the scanned token against
//! the timestamp it remembers from issuance. A token that will not even
//! parse is refused as an invalid code. A token that parses but was sealed
//! against a different timestamp deciphers to some other MID, and the bank
//! rejects that downstream as an unknown merchant; the machine cannot tell
//! a stale token from a real MID it never issued.
//!
//! The terminal keeps serving after a settlement, successful or not. One
//! counter, many customers.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::crypto::{IssuedToken, TokenError, TokenKey};
use crate::wire::{read_frame, write_frame, Request, Response, WireError};

/// Reply when the scanned token is not even a parseable token.
pub const REPLY_INVALID_QR: &str = "Invalid QR code";

/// Reply when a request other than a payment reaches the terminal.
pub const REPLY_NOT_A_PAYMENT: &str = "machine accepts transactions only";

/// Reply when the payment is missing its scanned token.
pub const REPLY_MISSING_TOKEN: &str = "missing encrypted_receiver_mid";

// ---------------------------------------------------------------------------
// MachineService
// ---------------------------------------------------------------------------

/// One merchant terminal: an issued token and the bank it settles against.
#[derive(Debug, Clone)]
pub struct MachineService {
    key: TokenKey,
    token: IssuedToken,
    bank_addr: String,
}

impl MachineService {
    /// Issue a fresh token for the merchant and stand up the terminal.
    /// Fails if `mid` is not a 16-hex identifier.
    pub fn new(mid: &str, bank_addr: impl Into<String>) -> Result<Self, TokenError> {
        let key = TokenKey::demo();
        let token = key.issue(mid)?;
        Ok(Self {
            key,
            token,
            bank_addr: bank_addr.into(),
        })
    }

    /// The token a paying customer scans, with its issuance timestamp.
    pub fn display_token(&self) -> &IssuedToken {
        &self.token
    }

    /// Redeem a scanned token against this terminal's issuance timestamp.
    pub fn redeem(&self, scanned: &str) -> Result<String, TokenError> {
        self.key.redeem(scanned, &self.token.issued_at)
    }

    /// Accept customers forever, one task per connection.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            token = %self.token.token,
            bank = %self.bank_addr,
            "payment machine listening"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            let machine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = machine.handle_customer(stream, peer).await {
                    warn!(%peer, error = %e, "customer connection ended with error");
                }
            });
        }
    }

    async fn handle_customer(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), WireError> {
        debug!(%peer, "customer connected");

        loop {
            match read_frame::<_, Request>(&mut stream).await {
                Ok(Some(request)) => {
                    let response = self.settle(request).await;
                    write_frame(&mut stream, &response).await?;
                }
                Ok(None) => break,
                Err(WireError::Json(e)) => {
                    warn!(%peer, error = %e, "malformed request");
                    write_frame(&mut stream, &Response::error(format!("malformed request: {e}")))
                        .await?;
                }
                Err(e) => {
                    let _ = write_frame(&mut stream, &Response::error(e.to_string())).await;
                    return Err(e);
                }
            }
        }

        debug!(%peer, "customer disconnected");
        Ok(())
    }

    /// Redeem the scanned token and relay the settlement to the bank.
    async fn settle(&self, request: Request) -> Response {
        let Request::Transaction {
            encrypted_sender_mmid,
            encrypted_sender_pin,
            encrypted_receiver_mid,
            amount,
            ..
        } = request
        else {
            return Response::error(REPLY_NOT_A_PAYMENT);
        };

        let Some(scanned) = encrypted_receiver_mid else {
            return Response::error(REPLY_MISSING_TOKEN);
        };

        let receiver_mid = match self.redeem(&scanned) {
            Ok(mid) => mid,
            Err(e) => {
                warn!(error = %e, "token redemption failed");
                return Response::error(REPLY_INVALID_QR);
            }
        };
        debug!(receiver = %receiver_mid, "token redeemed");

        let forwarded = Request::Transaction {
            encrypted_sender_mmid,
            encrypted_sender_pin,
            encrypted_receiver_mid: None,
            receiver_mid: Some(receiver_mid),
            amount,
        };
        match self.forward(&forwarded).await {
            Ok(response) => response,
            Err(e) => {
                warn!(bank = %self.bank_addr, error = %e, "bank unreachable");
                Response::error(format!("bank unreachable: {e}"))
            }
        }
    }

    /// One settlement, one bank connection.
    async fn forward(&self, request: &Request) -> Result<Response, WireError> {
        let mut stream = TcpStream::connect(&self.bank_addr).await?;
        write_frame(&mut stream, request).await?;
        read_frame(&mut stream).await?.ok_or_else(|| {
            WireError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "bank closed without replying",
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
