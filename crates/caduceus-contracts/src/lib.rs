//! # caduceus-contracts
//!
//! Shared types and contracts for the Caduceus provider-verification engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod decision;
pub mod document;
pub mod error;
pub mod request;
pub mod result;
