//! # Bank Service
//!
//! The TCP front of a [`Bank`]. Accepts connections, reads framed
//! requests, and answers each with exactly one framed response. Every
//! connection gets its own task; a panicking or misbehaving client takes
//! down its task and nothing else.
//!
//! One request, one reply, in order, over any number of requests per
//! connection. A malformed frame earns an error reply and the connection
//! survives; the length prefix already told us where the next frame
//! starts, so one bad payload does not poison the stream.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bank::Bank;
use crate::wire::{read_frame, write_frame, Request, Response, WireError};

/// Reply when a settlement goes through.
pub const REPLY_TRANSACTION_OK: &str = "Transaction successful";

/// Reply when a user balance query fails. One string covers both a wrong
/// PIN and an unknown MMID; callers are not told which.
pub const REPLY_INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Reply when a merchant balance query names an unknown MID.
pub const REPLY_INVALID_MID: &str = "Invalid mid";

/// Reply when a settlement request reaches the bank without a redeemed
/// receiver MID, i.e. without passing through a payment machine.
pub const REPLY_MISSING_RECEIVER: &str = "missing receiver_mid";

/// Render a balance into the line clients display verbatim.
pub fn balance_line(balance: u64) -> String {
    format!("Current Balance: {balance}")
}

// ---------------------------------------------------------------------------
// BankService
// ---------------------------------------------------------------------------

/// The bank's network endpoint.
#[derive(Debug, Clone)]
pub struct BankService {
    bank: Arc<Bank>,
}

impl BankService {
    /// Wrap a bank for serving.
    pub fn new(bank: Arc<Bank>) -> Self {
        Self { bank }
    }

    /// Accept connections forever, one task per client.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            users = self.bank.user_count(),
            merchants = self.bank.merchant_count(),
            blocks = self.bank.ledger().len(),
            "bank service listening"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            let bank = Arc::clone(&self.bank);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(bank, stream, peer).await {
                    warn!(%peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection(
    bank: Arc<Bank>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), WireError> {
    let conn = Uuid::new_v4();
    debug!(%peer, %conn, "client connected");

    loop {
        match read_frame::<_, Request>(&mut stream).await {
            Ok(Some(request)) => {
                // Dispatch hits sled and flushes on settlements; run it on
                // the blocking pool so a slow disk never stalls the
                // runtime's worker threads.
                let handler = Arc::clone(&bank);
                let response =
                    match tokio::task::spawn_blocking(move || dispatch(&handler, request)).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!(%peer, %conn, error = %e, "request handler aborted");
                            Response::error("internal error")
                        }
                    };
                write_frame(&mut stream, &response).await?;
            }
            Ok(None) => break,
            Err(WireError::Json(e)) => {
                // The frame was consumed whole; the stream is still in sync.
                warn!(%peer, %conn, error = %e, "malformed request");
                write_frame(&mut stream, &Response::error(format!("malformed request: {e}")))
                    .await?;
            }
            Err(e) => {
                let _ = write_frame(&mut stream, &Response::error(e.to_string())).await;
                return Err(e);
            }
        }
    }

    debug!(%peer, %conn, "client disconnected");
    Ok(())
}

/// Map one request to one response. Failure text comes straight off the
/// error's `Display`, which is frozen wire surface.
fn dispatch(bank: &Bank, request: Request) -> Response {
    match request {
        Request::RegisterUser {
            name,
            ifsc,
            password,
            pin,
            mobile,
            balance,
        } => match bank.register_user(&name, &ifsc, &password, &pin, &mobile, &balance) {
            Ok(account) => Response::registered_user(account.mmid, account.uid),
            Err(e) => {
                warn!(error = %e, "user registration refused");
                Response::error(e.to_string())
            }
        },

        Request::RegisterMerchant {
            name,
            ifsc,
            password,
            balance,
        } => match bank.register_merchant(&name, &ifsc, &password, &balance) {
            Ok(account) => Response::registered_merchant(account.mid),
            Err(e) => {
                warn!(error = %e, "merchant registration refused");
                Response::error(e.to_string())
            }
        },

        Request::Transaction {
            encrypted_sender_mmid,
            encrypted_sender_pin,
            receiver_mid,
            amount,
            ..
        } => {
            let Some(receiver_mid) = receiver_mid else {
                return Response::error(REPLY_MISSING_RECEIVER);
            };
            match bank.transfer(
                &encrypted_sender_mmid,
                &encrypted_sender_pin,
                &receiver_mid,
                &amount,
            ) {
                Ok(_) => Response::message(REPLY_TRANSACTION_OK),
                Err(e) => {
                    warn!(error = %e, "settlement refused");
                    Response::error(e.to_string())
                }
            }
        }

        Request::GetBalanceUser { mmid, pin } => match bank.user_balance(&mmid, &pin) {
            Some(balance) => Response::balance(balance_line(balance)),
            None => Response::error(REPLY_INVALID_CREDENTIALS),
        },

        Request::GetBalanceMerchant { mid } => match bank.merchant_balance(&mid) {
            Some(balance) => Response::balance(balance_line(balance)),
            None => Response::error(REPLY_INVALID_MID),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
