use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a trade deal
pub type DealId = Uuid;

/// externally attested claim topic (kyc, accreditation, jurisdiction, ...)
pub type TopicId = u64;

/// identifier of a capital provider, borrower or administrator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// reference to a token or asset held by the custody collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// reference to a single invoice item (a non-fungible collateral token)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceItemId(String);

impl InvoiceItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InvoiceItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// holder of custody balances: a participant or a deal's own escrow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Account {
    Participant(ParticipantId),
    Escrow(DealId),
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Participant(p) => write!(f, "{}", p),
            Account::Escrow(deal_id) => write!(f, "escrow:{}", deal_id),
        }
    }
}

impl From<&ParticipantId> for Account {
    fn from(p: &ParticipantId) -> Self {
        Account::Participant(p.clone())
    }
}

/// how a deal admits funding and splits interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OperationMode {
    /// funding open to any eligible participant
    #[default]
    Standard,
    /// funding requires live invoice collateral in the vault
    InvoiceBacked,
}

/// what to do with deposits that push the balance past the funding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExcessFundingPolicy {
    /// accept and mint proportionally
    #[default]
    Accept,
    /// reject the whole deposit
    Reject,
}

/// coarse lifecycle phase derived from the ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealPhase {
    /// accepting funding, target not reached
    Unfunded,
    /// target reached, funds still in escrow
    Funded,
    /// funds disbursed, debt outstanding
    FundingWithdrawn,
    /// debt fully repaid, redemption unlocked
    Repaid,
    /// repaid and every collateral token redeemed
    Closed,
}

/// settlement status of an invoice item held in the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Held,
    /// consumed by settlement; can no longer be withdrawn
    Settled,
    /// returned to the depositor
    Withdrawn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_display() {
        let p = ParticipantId::new("funder-1");
        assert_eq!(format!("{}", p), "funder-1");
        assert_eq!(p, ParticipantId::from("funder-1"));
    }

    #[test]
    fn test_escrow_account_display() {
        let deal_id = Uuid::nil();
        let escrow = Account::Escrow(deal_id);
        assert_eq!(escrow.to_string(), format!("escrow:{}", deal_id));
        assert_ne!(escrow, Account::from(&ParticipantId::new("a")));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(OperationMode::default(), OperationMode::Standard);
        assert_eq!(ExcessFundingPolicy::default(), ExcessFundingPolicy::Accept);
    }
}
