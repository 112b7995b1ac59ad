//! Test harness for the GAAP secure client.
//!
//! Deterministic implementations of the client's [`gaap_client::Environment`]
//! and [`gaap_client::HttpTransport`] seams:
//!
//! - [`SimEnv`]: seeded RNG and a virtual wall clock, so nonces and
//!   timestamps are reproducible
//! - [`MockServer`]: an in-process server that speaks the full envelope
//!   (signature verification, nonce replay rejection, AES-GCM replies) and
//!   implements the auth endpoints, with knobs for expiring tokens, delaying
//!   or failing refreshes, and corrupting replies

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod mock_server;
pub mod sim_env;

pub use mock_server::{
    ECHO_PATH, Grant, INVALID_CREDENTIALS_CODE, MockServer, RecordedRequest, WRONG_PASSWORD,
};
pub use sim_env::SimEnv;
