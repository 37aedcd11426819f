//! The static table of APNs gateway and feedback endpoints.

/// Which certified APNs environment a [`crate::Context`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The production gateway/feedback endpoints.
    #[default]
    Production,
    /// The sandbox (development) gateway/feedback endpoints.
    Sandbox,
}

/// Host and port of the legacy binary gateway for a given mode.
#[must_use]
pub fn gateway_endpoint(mode: Mode) -> (&'static str, u16) {
    match mode {
        Mode::Sandbox => ("gateway.sandbox.push.apple.com", 2195),
        Mode::Production => ("gateway.push.apple.com", 2195),
    }
}

/// Host and port of the feedback service for a given mode.
#[must_use]
pub fn feedback_endpoint(mode: Mode) -> (&'static str, u16) {
    match mode {
        Mode::Sandbox => ("feedback.sandbox.push.apple.com", 2196),
        Mode::Production => ("feedback.push.apple.com", 2196),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_endpoints_match_the_static_table() {
        assert_eq!(
            gateway_endpoint(Mode::Sandbox),
            ("gateway.sandbox.push.apple.com", 2195)
        );
        assert_eq!(
            gateway_endpoint(Mode::Production),
            ("gateway.push.apple.com", 2195)
        );
    }

    #[test]
    fn feedback_endpoints_match_the_static_table() {
        assert_eq!(
            feedback_endpoint(Mode::Sandbox),
            ("feedback.sandbox.push.apple.com", 2196)
        );
        assert_eq!(
            feedback_endpoint(Mode::Production),
            ("feedback.push.apple.com", 2196)
        );
    }

    #[test]
    fn mode_defaults_to_production() {
        assert_eq!(Mode::default(), Mode::Production);
    }
}
