//! Fritzcap Core Library
//!
//! This crate provides the core functionality for Fritzcap agents:
//! - Session negotiation (FRITZ!OS `login_sid.lua` challenge-response login)
//! - Challenge parsing and response derivation (PBKDF2 with legacy MD5 fallback)
//! - Device endpoint configuration (environment, config file, defaults)
//!
//! # Example
//!
//! ```no_run
//! use fritzcap_core::session::SessionNegotiator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fritzcap_core::session::SessionError> {
//!     // Pick up the device address from the environment or config file
//!     let config = fritzcap_core::device::load_device_config();
//!
//!     // Solve the challenge-response login
//!     let negotiator = SessionNegotiator::new(&config.box_url);
//!     let sid = negotiator.acquire_session("admin", "secret").await?;
//!     println!("Session id: {}", sid);
//!
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod session;

// Re-export commonly used types
pub use device::{ConfigSource, DeviceConfig, load_device_config};
pub use session::{Challenge, LoginState, SessionError, SessionNegotiator};
