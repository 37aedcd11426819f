//! `send`/`feedback` precondition checks, exercised through the public
//! API.

use apns_client::{feedback, send, ApnsError, Context, EnhancedEncoder};

#[test]
fn send_rejects_an_empty_token_list() {
    let mut ctx = Context::init();
    let encoder = EnhancedEncoder::default();
    let result = send(&mut ctx, &encoder, b"{\"aps\":{}}", &[]);
    assert_eq!(result, Err(ApnsError::EmptyTokenList));
}

#[test]
fn send_requires_an_open_gateway_connection() {
    let mut ctx = Context::init();
    let encoder = EnhancedEncoder::default();
    let tokens = vec!["a".repeat(64)];
    let result = send(&mut ctx, &encoder, b"{\"aps\":{}}", &tokens);
    assert_eq!(result, Err(ApnsError::NotConnected));
}

#[test]
fn feedback_requires_an_open_feedback_connection() {
    let mut ctx = Context::init();
    assert_eq!(feedback(&mut ctx), Err(ApnsError::NotConnectedFeedback));
}
