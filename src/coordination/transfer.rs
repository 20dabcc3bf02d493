//! Local record of cross-chain transfer progress

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::{Address, U256};
use serde::Serialize;
use std::fmt;

/// Bridge protocol phase as seen by this process.
///
/// The contracts hold the authoritative transfer state; this only tracks how
/// far the current run has driven it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransferPhase {
    Init,
    SourceApproved,
    TransferInitiated,
    AwaitingDestinationReady,
    Claimed,
    DestinationSwapped,
    Complete,
    Failed {
        at: Box<TransferPhase>,
        cause: String,
    },
}

impl TransferPhase {
    pub fn name(&self) -> &'static str {
        match self {
            TransferPhase::Init => "Init",
            TransferPhase::SourceApproved => "SourceApproved",
            TransferPhase::TransferInitiated => "TransferInitiated",
            TransferPhase::AwaitingDestinationReady => "AwaitingDestinationReady",
            TransferPhase::Claimed => "Claimed",
            TransferPhase::DestinationSwapped => "DestinationSwapped",
            TransferPhase::Complete => "Complete",
            TransferPhase::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Complete | TransferPhase::Failed { .. })
    }

    /// The single phase reachable from `self` on success
    fn successor(&self) -> Option<TransferPhase> {
        match self {
            TransferPhase::Init => Some(TransferPhase::SourceApproved),
            TransferPhase::SourceApproved => Some(TransferPhase::TransferInitiated),
            TransferPhase::TransferInitiated => Some(TransferPhase::AwaitingDestinationReady),
            TransferPhase::AwaitingDestinationReady => Some(TransferPhase::Claimed),
            TransferPhase::Claimed => Some(TransferPhase::DestinationSwapped),
            TransferPhase::DestinationSwapped => Some(TransferPhase::Complete),
            TransferPhase::Complete | TransferPhase::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Failed { at, .. } => write!(f, "Failed at {}", at.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Where a resumed transfer picks up again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePoint {
    /// Poll destination readiness, then claim
    #[default]
    Readiness,
    /// The claim is already confirmed; only the destination swap remains
    Claimed,
}

impl ResumePoint {
    pub fn name(self) -> &'static str {
        match self {
            ResumePoint::Readiness => "readiness",
            ResumePoint::Claimed => "claimed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "readiness" => Some(ResumePoint::Readiness),
            "claimed" => Some(ResumePoint::Claimed),
            _ => None,
        }
    }

    /// Resume point for a transfer that failed in `phase`.
    ///
    /// `None` when nothing on the destination chain can be retried: either
    /// no transfer exists yet or the destination swap already confirmed.
    pub fn after_failure_in(phase: &TransferPhase) -> Option<Self> {
        match phase {
            TransferPhase::TransferInitiated | TransferPhase::AwaitingDestinationReady => {
                Some(ResumePoint::Readiness)
            }
            TransferPhase::Claimed => Some(ResumePoint::Claimed),
            _ => None,
        }
    }

    fn phase(self) -> TransferPhase {
        match self {
            ResumePoint::Readiness => TransferPhase::TransferInitiated,
            ResumePoint::Claimed => TransferPhase::Claimed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    /// Known once the initiation receipt has been decoded
    pub transfer_id: Option<U256>,
    pub source_chain: u64,
    pub destination_chain: u64,
    pub token: Address,
    pub amount: U256,
    pub phase: TransferPhase,
}

impl TransferRecord {
    pub fn new(source_chain: u64, destination_chain: u64, token: Address, amount: U256) -> Self {
        Self {
            transfer_id: None,
            source_chain,
            destination_chain,
            token,
            amount,
            phase: TransferPhase::Init,
        }
    }

    /// Record for a transfer already driven to `from` by an earlier run
    pub fn resumed(
        transfer_id: U256,
        from: ResumePoint,
        source_chain: u64,
        destination_chain: u64,
        token: Address,
        amount: U256,
    ) -> Self {
        Self {
            transfer_id: Some(transfer_id),
            phase: from.phase(),
            ..Self::new(source_chain, destination_chain, token, amount)
        }
    }

    /// Move to `next`, which must be the direct successor of the current phase
    pub fn advance(&mut self, next: TransferPhase) -> OrchestratorResult<()> {
        if self.phase.successor().as_ref() != Some(&next) {
            return Err(OrchestratorError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Terminate the record, keeping the phase it failed in
    pub fn fail(&mut self, cause: &OrchestratorError) {
        if self.phase.is_terminal() {
            return;
        }
        let at = std::mem::replace(&mut self.phase, TransferPhase::Init);
        self.phase = TransferPhase::Failed {
            at: Box::new(at),
            cause: cause.to_string(),
        };
    }

    pub fn failed_at(&self) -> Option<&TransferPhase> {
        match &self.phase {
            TransferPhase::Failed { at, .. } => Some(at),
            _ => None,
        }
    }
}
