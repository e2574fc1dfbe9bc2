//! # caduceus-core
//!
//! The decision engine for provider identity verification.
//!
//! This crate provides:
//! - The four trust-boundary traits (`RegistryAdapter`, `DocumentVerifier`,
//!   `VerificationRepository`, `AuditSink`)
//! - The `Orchestrator` that cascades registry and AI evidence into one
//!   final decision
//! - The shared name matcher, circuit-breaker resilience layer, and engine
//!   configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caduceus_core::{Orchestrator, traits::{RegistryAdapter, DocumentVerifier}};
//! ```

pub mod config;
pub mod matcher;
pub mod orchestrator;
pub mod resilience;
pub mod traits;

pub use config::{AiConfig, EngineConfig};
pub use orchestrator::Orchestrator;
pub use resilience::{BreakerConfig, BreakerState, Resilience};
