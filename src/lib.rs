//! POAP Claim Gate - social-verified POAP claims for Twitter mini-apps
//!
//! Gates a commemorative POAP claim behind social-verification steps and
//! proxies the claim through the POAP issuance API, recording successful
//! claims in Redis so the same user cannot claim twice.
//!
//! # How it works
//!
//! 1. The mini-app posts the user's Twitter handle to `/verify`
//! 2. The gate checks follow status, retweet status (when a tweet gate is
//!    configured), and prior claims, concurrently
//! 3. Eligible users submit a wallet address to `/claim`
//! 4. The claim runs the POAP three-step issuance (token, claim code,
//!    redemption) and records the claim with a one-year retention
//! 5. `/claim-status` short-circuits returning visitors to their
//!    recorded address
//!
//! The Redis store is a best-effort double-claim guard: without it the
//! service still mints, it just cannot block duplicates.

pub mod config;
pub mod gate;
pub mod poap;
pub mod server;
pub mod share;
pub mod store;
pub mod twitter;

pub use config::{Config, Secrets};
pub use gate::{ClaimGate, GateError, GateState};
pub use poap::{ClaimError, PoapClient, PoapEvent};
pub use store::{ClaimRecord, ClaimStore};
pub use twitter::{Tweet, TwitterClient, TwitterUser};
