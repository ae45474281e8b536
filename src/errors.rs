use rust_decimal::Decimal;
use thiserror::Error;

use crate::custody::CustodyError;
use crate::decimal::{Money, TokenAmount};
use crate::types::{DealId, InvoiceItemId, ParticipantId};

#[derive(Error, Debug)]
pub enum DealError {
    #[error("deal {deal_id} not found")]
    NotFound {
        deal_id: DealId,
    },

    #[error("deal {deal_id} already exists")]
    DealAlreadyExists {
        deal_id: DealId,
    },

    #[error("{caller} is not authorized to {action} (deal {deal_id:?})")]
    Unauthorized {
        deal_id: Option<DealId>,
        caller: ParticipantId,
        action: &'static str,
    },

    #[error("deal {deal_id}: participant {participant} does not hold the required topics")]
    Ineligible {
        deal_id: DealId,
        participant: ParticipantId,
    },

    #[error("deal {deal_id}: eligibility of {participant} unknown: {reason}")]
    EligibilityUnknown {
        deal_id: DealId,
        participant: ParticipantId,
        reason: String,
    },

    #[error("deal {deal_id}: invalid state: current {current}, expected {expected}")]
    InvalidState {
        deal_id: DealId,
        current: String,
        expected: String,
    },

    #[error("deal {deal_id}: invalid amount {amount}: {reason}")]
    InvalidAmount {
        deal_id: DealId,
        amount: Decimal,
        reason: &'static str,
    },

    #[error("deal {deal_id}: repayment {amount} exceeds outstanding debt {outstanding}")]
    OverRepayment {
        deal_id: DealId,
        amount: Money,
        outstanding: Money,
    },

    #[error("deal {deal_id}: insufficient balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        deal_id: DealId,
        holder: ParticipantId,
        available: TokenAmount,
        requested: TokenAmount,
    },

    #[error("deal {deal_id}: invoice {item} is already held")]
    DuplicateCollateral {
        deal_id: DealId,
        item: InvoiceItemId,
    },

    #[error("deal {deal_id}: invoice {item} is not held")]
    InvoiceNotFound {
        deal_id: DealId,
        item: InvoiceItemId,
    },

    #[error("deal {deal_id}: funding target {target} exceeded: balance would be {balance_after}")]
    FundingTargetExceeded {
        deal_id: DealId,
        target: Money,
        balance_after: Money,
    },

    #[error("deal {deal_id}: invalid configuration: {message}")]
    InvalidConfiguration {
        deal_id: DealId,
        message: String,
    },

    #[error("deal {deal_id}: custody call failed")]
    Custody {
        deal_id: DealId,
        #[source]
        source: CustodyError,
    },

    #[error("deal {deal_id}: interest pricing failed: {message}")]
    Pricing {
        deal_id: DealId,
        message: String,
    },

    #[error("lock poisoned (deal {deal_id:?})")]
    LockPoisoned {
        deal_id: Option<DealId>,
    },

    #[error("deal {deal_id}: serialization failed: {message}")]
    Serialization {
        deal_id: DealId,
        message: String,
    },
}

impl DealError {
    /// deal the failure belongs to
    pub fn deal_id(&self) -> Option<DealId> {
        match self {
            DealError::NotFound { deal_id }
            | DealError::DealAlreadyExists { deal_id }
            | DealError::Ineligible { deal_id, .. }
            | DealError::EligibilityUnknown { deal_id, .. }
            | DealError::InvalidState { deal_id, .. }
            | DealError::InvalidAmount { deal_id, .. }
            | DealError::OverRepayment { deal_id, .. }
            | DealError::InsufficientBalance { deal_id, .. }
            | DealError::DuplicateCollateral { deal_id, .. }
            | DealError::InvoiceNotFound { deal_id, .. }
            | DealError::FundingTargetExceeded { deal_id, .. }
            | DealError::InvalidConfiguration { deal_id, .. }
            | DealError::Custody { deal_id, .. }
            | DealError::Pricing { deal_id, .. }
            | DealError::Serialization { deal_id, .. } => Some(*deal_id),
            DealError::Unauthorized { deal_id, .. } | DealError::LockPoisoned { deal_id } => *deal_id,
        }
    }

    /// failures caused by an unavailable collaborator; the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DealError::EligibilityUnknown { .. } | DealError::Custody { .. } | DealError::Pricing { .. }
        )
    }

    pub(crate) fn invalid_state(
        deal_id: DealId,
        current: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        DealError::InvalidState {
            deal_id,
            current: current.into(),
            expected: expected.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DealError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_carries_deal_id() {
        let deal_id = Uuid::new_v4();
        let err = DealError::OverRepayment {
            deal_id,
            amount: Money::from_major(300),
            outstanding: Money::from_major(200),
        };
        assert_eq!(err.deal_id(), Some(deal_id));
        assert!(err.to_string().contains("exceeds outstanding debt 200"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_eligibility_is_retryable() {
        let err = DealError::EligibilityUnknown {
            deal_id: Uuid::nil(),
            participant: ParticipantId::new("p"),
            reason: "timeout".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_lock_poisoned_message() {
        let err = DealError::LockPoisoned { deal_id: None };
        assert!(err.to_string().starts_with("lock poisoned"));
        assert_eq!(err.deal_id(), None);
    }
}
