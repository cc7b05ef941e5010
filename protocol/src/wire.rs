//! # Wire Protocol
//!
//! Type-safe definitions for the JSON messages that move between clients,
//! payment machines, and the bank, plus the framing that carries them over
//! TCP. Every message is a JSON object tagged by a `type` field.
//!
//! ## Message Index
//!
//! | `type`                 | Direction        | Purpose                        |
//! |------------------------|------------------|--------------------------------|
//! | `register_user`        | client → bank    | Open a user account            |
//! | `register_merchant`    | client → bank    | Open a merchant account        |
//! | `transaction`          | client → machine | Pay a merchant by token        |
//! | `transaction`          | machine → bank   | Same payment, token redeemed   |
//! | `get_balance_user`     | client → bank    | Balance query, PIN-gated       |
//! | `get_balance_merchant` | client → bank    | Balance query by MID           |
//!
//! The two `transaction` forms share a tag and differ in one field: the
//! client sends the merchant's enciphered token as `encrypted_receiver_mid`,
//! and the machine forwards the redeemed plain id as `receiver_mid`. Both
//! are optional on the type; each endpoint demands the one it serves.
//!
//! ## Framing
//!
//! Frames are a 4-byte big-endian length prefix followed by that many
//! bytes of JSON. Bare `recv`-sized reads are how protocols lose bytes on
//! real sockets; the prefix makes message boundaries explicit and lets the
//! reader reject absurd lengths before allocating. The cap is
//! [`MAX_FRAME_BYTES`](crate::config::MAX_FRAME_BYTES).

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{LENGTH_PREFIX_BYTES, MAX_FRAME_BYTES};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors while reading or writing framed messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame body is not the JSON we expected.
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The length prefix exceeds the frame cap.
    #[error("frame of {len} bytes exceeds the {max}-byte cap")]
    FrameTooLarge {
        /// Claimed or actual frame length.
        len: usize,
        /// The configured cap.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// A money field as it arrives off the wire: a JSON integer or a numeric
/// string. Interactive clients type amounts, so `"500"` must work exactly
/// like `500`; whether the digits actually parse is the server's call to
/// make (and to reject with the right message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    /// Already a number.
    Int(i64),
    /// Digits in a string, possibly surrounded by whitespace.
    Text(String),
}

impl Amount {
    /// The numeric value, if the field holds one. Whitespace around a
    /// string form is tolerated; anything else is `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Amount::Int(value) => Some(*value),
            Amount::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Int(0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Amount::Int(value) => write!(f, "{value}"),
            Amount::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount::Int(value)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Every request the network understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open a user account. `balance` may be omitted and defaults to zero.
    RegisterUser {
        /// Display name.
        name: String,
        /// Branch routing code, validated server-side.
        ifsc: String,
        /// Login password.
        password: String,
        /// Payment PIN.
        pin: String,
        /// Mobile number, mixed into the MMID.
        mobile: String,
        /// Opening balance.
        #[serde(default)]
        balance: Amount,
    },

    /// Open a merchant account.
    RegisterMerchant {
        /// Display name.
        name: String,
        /// Branch routing code, validated server-side.
        ifsc: String,
        /// Login password.
        password: String,
        /// Opening balance.
        #[serde(default)]
        balance: Amount,
    },

    /// Pay a merchant. The sender's MMID and PIN travel enciphered under
    /// the bank's public credential key, one value per character.
    Transaction {
        /// Enciphered sender MMID.
        encrypted_sender_mmid: Vec<u64>,
        /// Enciphered sender PIN.
        encrypted_sender_pin: Vec<u64>,
        /// The merchant's payment token, as scanned. Present on the
        /// client → machine leg only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted_receiver_mid: Option<String>,
        /// The redeemed plain MID. Present on the machine → bank leg only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver_mid: Option<String>,
        /// Amount to move.
        amount: Amount,
    },

    /// A user's balance, gated on their PIN.
    GetBalanceUser {
        /// The account's MMID.
        mmid: String,
        /// The account's PIN.
        pin: String,
    },

    /// A merchant's balance.
    GetBalanceMerchant {
        /// The account's MID.
        mid: String,
    },
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outcome marker every response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The request did what it asked.
    Success,
    /// It did not; `message` says why.
    Error,
}

/// The bank's (or machine's) reply. One struct covers every endpoint;
/// fields irrelevant to an endpoint stay `None` and off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome marker.
    pub status: Status,
    /// New user's MMID, on successful user registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmid: Option<String>,
    /// New user's UID, on successful user registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// New merchant's MID, on successful merchant registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Rendered balance line, on successful balance queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    /// Human-readable outcome or failure text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    fn empty(status: Status) -> Self {
        Self {
            status,
            mmid: None,
            uid: None,
            mid: None,
            balance: None,
            message: None,
        }
    }

    /// Successful user registration.
    pub fn registered_user(mmid: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            mmid: Some(mmid.into()),
            uid: Some(uid.into()),
            ..Self::empty(Status::Success)
        }
    }

    /// Successful merchant registration.
    pub fn registered_merchant(mid: impl Into<String>) -> Self {
        Self {
            mid: Some(mid.into()),
            ..Self::empty(Status::Success)
        }
    }

    /// Success with a free-text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::empty(Status::Success)
        }
    }

    /// Successful balance query; `line` is the rendered balance text.
    pub fn balance(line: impl Into<String>) -> Self {
        Self {
            balance: Some(line.into()),
            ..Self::empty(Status::Success)
        }
    }

    /// Any failure, with its reason.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::empty(Status::Error)
        }
    }

    /// Whether the request succeeded.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, payload: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(payload)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame. `Ok(None)` means the peer closed
/// the connection before sending another frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags_match_the_wire_protocol() {
        let request = Request::GetBalanceUser {
            mmid: "8899aabbccddeeff".to_string(),
            pin: "4321".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"type\":\"get_balance_user\""));
        assert!(json.contains("\"mmid\":\"8899aabbccddeeff\""));

        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn registration_parses_from_raw_client_json() {
        let raw = r#"{
            "type": "register_user",
            "name": "Alice",
            "ifsc": "SBIN0001234",
            "password": "hunter2",
            "pin": "4321",
            "mobile": "9876543210",
            "balance": "1000"
        }"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        match request {
            Request::RegisterUser { name, balance, .. } => {
                assert_eq!(name, "Alice");
                assert_eq!(balance.as_i64(), Some(1000));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn omitted_balance_defaults_to_zero() {
        let raw = r#"{
            "type": "register_merchant",
            "name": "Bob's Store",
            "ifsc": "HDFC0002345",
            "password": "s3cret"
        }"#;
        let request: Request = serde_json::from_str(raw).unwrap();
        match request {
            Request::RegisterMerchant { balance, .. } => {
                assert_eq!(balance.as_i64(), Some(0));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn both_transaction_legs_parse() {
        let to_machine = r#"{
            "type": "transaction",
            "encrypted_sender_mmid": [12, 34],
            "encrypted_sender_pin": [56, 78],
            "encrypted_receiver_mid": "a1b2c3d4e5f60718",
            "amount": 300
        }"#;
        let request: Request = serde_json::from_str(to_machine).unwrap();
        match &request {
            Request::Transaction {
                encrypted_receiver_mid,
                receiver_mid,
                ..
            } => {
                assert!(encrypted_receiver_mid.is_some());
                assert!(receiver_mid.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }

        let to_bank = r#"{
            "type": "transaction",
            "encrypted_sender_mmid": [12, 34],
            "encrypted_sender_pin": [56, 78],
            "receiver_mid": "0011223344556677",
            "amount": "300"
        }"#;
        let request: Request = serde_json::from_str(to_bank).unwrap();
        match request {
            Request::Transaction {
                receiver_mid,
                amount,
                ..
            } => {
                assert_eq!(receiver_mid.as_deref(), Some("0011223344556677"));
                assert_eq!(amount.as_i64(), Some(300));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn amount_accepts_integers_and_numeric_strings() {
        assert_eq!(Amount::Int(500).as_i64(), Some(500));
        assert_eq!(Amount::Int(-5).as_i64(), Some(-5));
        assert_eq!(Amount::Text("500".to_string()).as_i64(), Some(500));
        assert_eq!(Amount::Text("  42 ".to_string()).as_i64(), Some(42));
        assert_eq!(Amount::Text("-7".to_string()).as_i64(), Some(-7));
        assert_eq!(Amount::Text("12.5".to_string()).as_i64(), None);
        assert_eq!(Amount::Text("abc".to_string()).as_i64(), None);
        assert_eq!(Amount::Text(String::new()).as_i64(), None);
    }

    #[test]
    fn responses_omit_irrelevant_fields() {
        let json = serde_json::to_string(&Response::balance("Current Balance: 700")).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"balance\":\"Current Balance: 700\""));
        assert!(!json.contains("mmid"));
        assert!(!json.contains("message"));

        let json = serde_json::to_string(&Response::error("Incorrect Pin")).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"message\":\"Incorrect Pin\""));
    }

    #[test]
    fn response_constructors_set_the_right_fields() {
        let reg = Response::registered_user("m", "u");
        assert!(reg.is_success());
        assert_eq!(reg.mmid.as_deref(), Some("m"));
        assert_eq!(reg.uid.as_deref(), Some("u"));

        let merchant = Response::registered_merchant("x");
        assert_eq!(merchant.mid.as_deref(), Some("x"));

        let err = Response::error("nope");
        assert!(!err.is_success());
        assert_eq!(err.message.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_socket_pair() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let request = Request::GetBalanceMerchant {
            mid: "0011223344556677".to_string(),
        };
        write_frame(&mut client, &request).await.unwrap();
        let received: Request = read_frame(&mut server).await.unwrap().expect("one frame");
        assert_eq!(received, request);

        let response = Response::balance("Current Balance: 800");
        write_frame(&mut server, &response).await.unwrap();
        let received: Response = read_frame(&mut client).await.unwrap().expect("one frame");
        assert_eq!(received, response);
    }

    #[tokio::test]
    async fn several_frames_keep_their_boundaries() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        for mid in ["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb", "cccccccccccccccc"] {
            let request = Request::GetBalanceMerchant {
                mid: mid.to_string(),
            };
            write_frame(&mut client, &request).await.unwrap();
        }
        drop(client);

        let mut mids = Vec::new();
        while let Some(Request::GetBalanceMerchant { mid }) =
            read_frame(&mut server).await.unwrap()
        {
            mids.push(mid);
        }
        assert_eq!(mids.len(), 3);
        assert_eq!(mids[0], "aaaaaaaaaaaaaaaa");
        assert_eq!(mids[2], "cccccccccccccccc");
    }

    #[tokio::test]
    async fn closed_peer_reads_as_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let got: Option<Response> = read_frame(&mut server).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_rejected_before_allocation() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_u32((MAX_FRAME_BYTES + 1) as u32)
            .await
            .unwrap();

        let err = read_frame::<_, Response>(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn oversized_payload_refused_on_write() {
        let (mut client, _server) = tokio::io::duplex(64);
        let bloated = Response::error("x".repeat(MAX_FRAME_BYTES));
        let err = write_frame(&mut client, &bloated).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn garbage_payload_is_a_json_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(9).await.unwrap();
        client.write_all(b"not json!").await.unwrap();

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::Json(_)));
    }
}
