//! Payload encoding and token conversion.
//!
//! Payload encoding is an external collaborator the core only reaches
//! through an interface. This module defines that interface
//! ([`BinaryMessage`], [`PayloadEncoder`]) plus the token conversion
//! functions, and ships one concrete encoder ([`EnhancedNotification`])
//! implementing Apple's legacy "enhanced" binary format so the crate is
//! usable standalone.

use crate::error::ApnsError;

/// An opaque, already-encoded notification frame.
///
/// The delivery loop mutates exactly two fields per token, the
/// notification id and the device token, and otherwise treats the frame
/// as an opaque byte buffer ready to write to the socket.
pub trait BinaryMessage {
    /// Overwrite the notification id (big-endian on the wire).
    fn set_notification_id(&mut self, id: u32);

    /// Overwrite the 32-byte device token.
    fn set_device_token(&mut self, token: &[u8; 32]);

    /// The current wire bytes of the frame.
    fn as_bytes(&self) -> &[u8];
}

/// Encodes an application payload into a reusable [`BinaryMessage`].
///
/// Implementations live outside this crate's core concern (framing and
/// delivery), but a concrete one ([`EnhancedNotification::encode`]) is
/// provided below.
pub trait PayloadEncoder {
    /// The concrete binary message type this encoder produces.
    type Message: BinaryMessage;

    /// Encode `payload` (already-serialized APNs JSON) into a message with
    /// a placeholder id and token, ready for per-token mutation.
    fn encode(&self, payload: &[u8]) -> Result<Self::Message, ApnsError>;
}

/// Convert a 64-character hex device token into its 32-byte binary form.
pub fn token_hex_to_binary(hex_token: &str) -> Result<[u8; 32], ApnsError> {
    let decoded =
        hex::decode(hex_token).map_err(|_| ApnsError::StringContainsNonUtf8Characters)?;
    decoded
        .try_into()
        .map_err(|_| ApnsError::StringContainsNonUtf8Characters)
}

/// Convert a 32-byte binary device token into its 64-character hex form.
#[must_use]
pub fn token_binary_to_hex(binary_token: &[u8; 32]) -> String {
    hex::encode(binary_token)
}

/// Apple's legacy "enhanced" binary notification format:
/// `command(1)=1 | id(4 BE) | expiry(4 BE) | token_len(2 BE)=32 |
/// token(32) | payload_len(2 BE) | payload`.
#[derive(Debug, Clone)]
pub struct EnhancedNotification {
    bytes: Vec<u8>,
}

const ENHANCED_HEADER_LEN: usize = 1 + 4 + 4 + 2;
const ID_OFFSET: usize = 1;
const TOKEN_OFFSET: usize = ENHANCED_HEADER_LEN;

impl EnhancedNotification {
    /// Build a frame for `payload` with `expiry` as the APNs expiration
    /// timestamp (0 = deliver once, discard if undeliverable immediately).
    /// The id and token fields are zeroed; callers mutate them per-token
    /// via [`BinaryMessage`].
    fn build(payload: &[u8], expiry: u32) -> Result<Self, ApnsError> {
        if payload.len() > u16::MAX as usize {
            return Err(ApnsError::InvalidPayloadSize);
        }
        let mut bytes = Vec::with_capacity(ENHANCED_HEADER_LEN + 32 + 2 + payload.len());
        bytes.push(1); // command
        bytes.extend_from_slice(&0u32.to_be_bytes()); // id, set per-token
        bytes.extend_from_slice(&expiry.to_be_bytes());
        bytes.extend_from_slice(&32u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 32]); // token, set per-token
        bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        bytes.extend_from_slice(payload);
        Ok(Self { bytes })
    }
}

impl BinaryMessage for EnhancedNotification {
    fn set_notification_id(&mut self, id: u32) {
        self.bytes[ID_OFFSET..ID_OFFSET + 4].copy_from_slice(&id.to_be_bytes());
    }

    fn set_device_token(&mut self, token: &[u8; 32]) {
        self.bytes[TOKEN_OFFSET..TOKEN_OFFSET + 32].copy_from_slice(token);
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// The default [`PayloadEncoder`], producing [`EnhancedNotification`]
/// frames with a fixed expiration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnhancedEncoder {
    /// APNs expiration timestamp written into every frame this encoder
    /// produces. `0` means "do not store, deliver once".
    pub expiry: u32,
}

impl PayloadEncoder for EnhancedEncoder {
    type Message = EnhancedNotification;

    fn encode(&self, payload: &[u8]) -> Result<Self::Message, ApnsError> {
        EnhancedNotification::build(payload, self.expiry)
    }
}
