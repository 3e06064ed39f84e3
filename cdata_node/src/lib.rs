//! C-Data photo provenance node
//!
//! HTTP service that stores user photos on Arweave through a sponsored Irys
//! account and records Ethereum Attestation Service attestations that point
//! at the stored artifacts.

pub mod api;
pub mod attestation;
pub mod config;
pub mod gateway;
pub mod sponsorship;
pub mod storage;
pub mod wallet;

pub use api::AppState;
pub use config::Settings;
