//! Session negotiation module.
//!
//! Implements the FRITZ!OS `login_sid.lua?version=2` challenge-response
//! login: fetch the login state, derive the challenge response, honor the
//! device's block time and exchange the response for a session id.

mod challenge;
mod negotiator;

pub use challenge::{Challenge, LoginState};
pub use negotiator::SessionNegotiator;

use thiserror::Error;

/// Session negotiation errors, one variant per protocol step.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport failure or unparsable/incomplete login-state document
    #[error("failed to fetch login state: {0}")]
    StateFetch(String),

    /// Malformed challenge string for the selected derivation scheme
    #[error("malformed challenge: {0}")]
    ChallengeFormat(String),

    /// Transport failure or missing SID when submitting the response
    #[error("failed to submit challenge response: {0}")]
    LoginSubmit(String),

    /// The device answered with the all-zero sid
    #[error("wrong username or password")]
    AuthenticationRejected,
}
