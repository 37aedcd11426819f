//! Wire-level framing: the 6-byte APNs error frame and the 38-byte
//! feedback record. Both are fixed-size and big-endian.

use crate::error::ApnsError;

/// Size in bytes of an APNs error frame (`cmd | status | id`).
pub const ERROR_FRAME_LEN: usize = 6;

/// Size in bytes of a feedback record (`timestamp | token_len | token`).
pub const FEEDBACK_RECORD_LEN: usize = 38;

/// A parsed APNs error frame, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorFrame {
    /// The command byte. Apple always sends 8 for the legacy format;
    /// anything else is treated as unknown.
    pub command: u8,
    /// The APNs status byte.
    pub status: u8,
    /// The notification id the error refers to. Only meaningful when
    /// `status == 8` (`INVALID_TOKEN`), but always parsed.
    pub id: u32,
}

impl ErrorFrame {
    /// Parse a 6-byte `[cmd(1), status(1), id(4 BE)]` frame.
    #[must_use]
    pub fn parse(buf: &[u8; ERROR_FRAME_LEN]) -> Self {
        Self {
            command: buf[0],
            status: buf[1],
            id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        }
    }
}

/// Map a parsed error frame to the local error taxonomy.
///
/// A command byte other than 8 is treated as unknown; the raw status byte
/// is retained on [`ApnsError::Unknown`] so it still shows up in logs even
/// though the frame's shape was unexpected.
#[must_use]
pub fn classify(frame: &ErrorFrame) -> ApnsError {
    if frame.command != 8 {
        return ApnsError::Unknown {
            raw_status: frame.status,
        };
    }
    match frame.status {
        1 => ApnsError::ProcessingError,
        5 | 8 => ApnsError::TokenInvalid,
        7 => ApnsError::InvalidPayloadSize,
        10 => ApnsError::ServiceShutdown,
        other => ApnsError::Unknown { raw_status: other },
    }
}

/// Extract the 32-byte device token out of a 38-byte feedback record.
/// The 4-byte timestamp is ignored; the 2-byte length is read but not
/// validated, matching the legacy encoder guarantee that it is always 32.
#[must_use]
pub fn parse_feedback_record(buf: &[u8; FEEDBACK_RECORD_LEN]) -> [u8; 32] {
    let mut token = [0u8; 32];
    token.copy_from_slice(&buf[6..38]);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cmd: u8, status: u8, id: u32) -> [u8; ERROR_FRAME_LEN] {
        let id_be = id.to_be_bytes();
        [cmd, status, id_be[0], id_be[1], id_be[2], id_be[3]]
    }

    #[test]
    fn classifier_round_trips_every_documented_status() {
        let cases: &[(u8, ApnsError)] = &[
            (1, ApnsError::ProcessingError),
            (5, ApnsError::TokenInvalid),
            (7, ApnsError::InvalidPayloadSize),
            (8, ApnsError::TokenInvalid),
            (10, ApnsError::ServiceShutdown),
        ];
        for &(status, ref expected) in cases {
            let raw = frame(8, status, 42);
            let parsed = ErrorFrame::parse(&raw);
            assert_eq!(parsed.id, 42);
            assert_eq!(&classify(&parsed), expected);
        }
    }

    #[test]
    fn unmapped_statuses_become_unknown_but_keep_the_raw_byte() {
        for status in [2u8, 3, 4, 6] {
            let parsed = ErrorFrame::parse(&frame(8, status, 0));
            assert_eq!(classify(&parsed), ApnsError::Unknown { raw_status: status });
        }
    }

    #[test]
    fn non_command_8_frames_are_unknown_regardless_of_status() {
        let parsed = ErrorFrame::parse(&frame(3, 8, 7));
        assert_eq!(classify(&parsed), ApnsError::Unknown { raw_status: 8 });
    }

    #[test]
    fn feedback_record_extracts_the_token_and_ignores_timestamp_and_length() {
        let mut buf = [0u8; FEEDBACK_RECORD_LEN];
        buf[0..4].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        buf[4..6].copy_from_slice(&32u16.to_be_bytes());
        let token: [u8; 32] = core::array::from_fn(|i| i as u8);
        buf[6..38].copy_from_slice(&token);

        assert_eq!(parse_feedback_record(&buf), token);
    }
}
