//! The feedback collector: drains the feedback service's stream of
//! expired-device tokens until a read timeout.

use std::time::Duration;

use crate::context::Context;
use crate::encode::token_binary_to_hex;
use crate::error::{ApnsError, ApnsResult};
use crate::frame::{parse_feedback_record, FEEDBACK_RECORD_LEN};
use crate::session::wait_readable;

/// Idle timeout after which `feedback` concludes the service has nothing
/// more to send.
const FEEDBACK_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read one expired-token record from the context's open feedback
/// connection, or an empty list if nothing arrives within the idle
/// timeout.
///
/// The feedback service streams many records over a single connection,
/// but each call here reads exactly one rather than draining until idle;
/// callers poll `feedback` in a loop to collect everything the service
/// has queued.
pub fn feedback(ctx: &mut Context) -> ApnsResult<Vec<String>> {
    let session = ctx.feedback_session_mut()?;

    if !wait_readable(session, FEEDBACK_IDLE_TIMEOUT)? {
        return Ok(Vec::new());
    }

    let mut buf = [0u8; FEEDBACK_RECORD_LEN];
    let n = session.read(&mut buf)?;
    if n != FEEDBACK_RECORD_LEN {
        return Err(ApnsError::SslReadFailed);
    }

    let token = parse_feedback_record(&buf);
    Ok(vec![token_binary_to_hex(&token)])
}
