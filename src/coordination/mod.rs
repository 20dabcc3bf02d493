//! Request coordination
//!
//! The orchestrator root:
//! 1. Connects the chain clients a request needs
//! 2. Dispatches single-chain actions to the action executor
//! 3. Drives cross-chain swaps through the bridge state machine

pub mod bridge;
pub mod engine;
pub mod transfer;

pub use bridge::{BridgeFailure, BridgeReport};
pub use engine::{Endpoints, OrchestrationReport, Orchestrator};
pub use transfer::{ResumePoint, TransferPhase};
