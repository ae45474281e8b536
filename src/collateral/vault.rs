use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::custody::CustodyInstruction;
use crate::errors::{DealError, Result};
use crate::types::{Account, DealId, InvoiceItemId, InvoiceStatus, ParticipantId};

/// one invoice item recorded against a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePosition {
    pub item: InvoiceItemId,
    pub depositor: ParticipantId,
    pub status: InvoiceStatus,
    pub deposited_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// custody ledger of invoice collateral for one deal
///
/// An item is owned by exactly one depositor at a time. Held and settled
/// items block a second deposit of the same id; withdrawn items may come back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralVault {
    positions: BTreeMap<InvoiceItemId, InvoicePosition>,
}

impl CollateralVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// validate a deposit and build the custody move into escrow
    pub fn plan_deposit(
        &self,
        deal_id: DealId,
        depositor: &ParticipantId,
        item: &InvoiceItemId,
    ) -> Result<CustodyInstruction> {
        if let Some(position) = self.positions.get(item) {
            if position.status != InvoiceStatus::Withdrawn {
                return Err(DealError::DuplicateCollateral {
                    deal_id,
                    item: item.clone(),
                });
            }
        }

        Ok(CustodyInstruction::TransferItem {
            item: item.clone(),
            from: Account::from(depositor),
            to: Account::Escrow(deal_id),
        })
    }

    pub fn record_deposit(&mut self, depositor: &ParticipantId, item: &InvoiceItemId, timestamp: DateTime<Utc>) {
        self.positions.insert(
            item.clone(),
            InvoicePosition {
                item: item.clone(),
                depositor: depositor.clone(),
                status: InvoiceStatus::Held,
                deposited_at: timestamp,
                updated_at: timestamp,
            },
        );
    }

    /// validate a withdrawal and build the custody move back to the depositor
    ///
    /// `caller_is_admin` lets an administrator act for the depositor;
    /// `debt_outstanding` locks every item while the borrower owes funds.
    pub fn plan_withdraw(
        &self,
        deal_id: DealId,
        caller: &ParticipantId,
        caller_is_admin: bool,
        item: &InvoiceItemId,
        debt_outstanding: bool,
    ) -> Result<(ParticipantId, CustodyInstruction)> {
        let position = self
            .positions
            .get(item)
            .filter(|p| p.status != InvoiceStatus::Withdrawn)
            .ok_or_else(|| DealError::InvoiceNotFound {
                deal_id,
                item: item.clone(),
            })?;

        if &position.depositor != caller && !caller_is_admin {
            return Err(DealError::Unauthorized {
                deal_id: Some(deal_id),
                caller: caller.clone(),
                action: "withdraw another depositor's invoice",
            });
        }
        if position.status == InvoiceStatus::Settled {
            return Err(DealError::invalid_state(deal_id, "invoice settled", "invoice held"));
        }
        if debt_outstanding {
            return Err(DealError::invalid_state(deal_id, "debt outstanding", "no outstanding debt"));
        }

        let instruction = CustodyInstruction::TransferItem {
            item: item.clone(),
            from: Account::Escrow(deal_id),
            to: Account::from(&position.depositor),
        };
        Ok((position.depositor.clone(), instruction))
    }

    pub fn record_withdraw(&mut self, item: &InvoiceItemId, timestamp: DateTime<Utc>) {
        if let Some(position) = self.positions.get_mut(item) {
            position.status = InvoiceStatus::Withdrawn;
            position.updated_at = timestamp;
        }
    }

    /// validate marking a held item as consumed by settlement
    pub fn check_settle(&self, deal_id: DealId, item: &InvoiceItemId) -> Result<()> {
        match self.positions.get(item).map(|p| p.status) {
            Some(InvoiceStatus::Held) => Ok(()),
            Some(InvoiceStatus::Settled) => {
                Err(DealError::invalid_state(deal_id, "invoice settled", "invoice held"))
            }
            Some(InvoiceStatus::Withdrawn) | None => Err(DealError::InvoiceNotFound {
                deal_id,
                item: item.clone(),
            }),
        }
    }

    pub fn record_settle(&mut self, item: &InvoiceItemId, timestamp: DateTime<Utc>) {
        if let Some(position) = self.positions.get_mut(item) {
            position.status = InvoiceStatus::Settled;
            position.updated_at = timestamp;
        }
    }

    pub fn position(&self, item: &InvoiceItemId) -> Option<&InvoicePosition> {
        self.positions.get(item)
    }

    pub fn positions(&self) -> impl Iterator<Item = &InvoicePosition> {
        self.positions.values()
    }

    /// items held in escrow, settled or not
    pub fn held_count(&self) -> usize {
        self.positions
            .values()
            .filter(|p| p.status != InvoiceStatus::Withdrawn)
            .count()
    }

    /// items held and not yet settled
    pub fn live_count(&self) -> usize {
        self.positions
            .values()
            .filter(|p| p.status == InvoiceStatus::Held)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    fn bob() -> ParticipantId {
        ParticipantId::new("bob")
    }

    #[test]
    fn test_duplicate_deposit_rejected() {
        let deal_id = Uuid::new_v4();
        let mut vault = CollateralVault::new();
        let item = InvoiceItemId::new("inv-1");

        vault.plan_deposit(deal_id, &alice(), &item).unwrap();
        vault.record_deposit(&alice(), &item, Utc::now());

        let result = vault.plan_deposit(deal_id, &bob(), &item);
        assert!(matches!(result, Err(DealError::DuplicateCollateral { .. })));
    }

    #[test]
    fn test_withdraw_by_depositor_or_admin_only() {
        let deal_id = Uuid::new_v4();
        let mut vault = CollateralVault::new();
        let item = InvoiceItemId::new("inv-1");
        vault.record_deposit(&alice(), &item, Utc::now());

        let result = vault.plan_withdraw(deal_id, &bob(), false, &item, false);
        assert!(matches!(result, Err(DealError::Unauthorized { .. })));

        let (owner, instruction) = vault.plan_withdraw(deal_id, &bob(), true, &item, false).unwrap();
        assert_eq!(owner, alice());
        assert_eq!(
            instruction,
            CustodyInstruction::TransferItem {
                item: item.clone(),
                from: Account::Escrow(deal_id),
                to: Account::Participant(alice()),
            }
        );
    }

    #[test]
    fn test_settled_item_cannot_be_withdrawn() {
        let deal_id = Uuid::new_v4();
        let mut vault = CollateralVault::new();
        let item = InvoiceItemId::new("inv-1");
        vault.record_deposit(&alice(), &item, Utc::now());

        vault.check_settle(deal_id, &item).unwrap();
        vault.record_settle(&item, Utc::now());
        assert_eq!(vault.live_count(), 0);
        assert_eq!(vault.held_count(), 1);

        let result = vault.plan_withdraw(deal_id, &alice(), false, &item, false);
        assert!(matches!(result, Err(DealError::InvalidState { .. })));
        assert!(vault.check_settle(deal_id, &item).is_err());
    }

    #[test]
    fn test_outstanding_debt_locks_items() {
        let deal_id = Uuid::new_v4();
        let mut vault = CollateralVault::new();
        let item = InvoiceItemId::new("inv-1");
        vault.record_deposit(&alice(), &item, Utc::now());

        assert!(vault.plan_withdraw(deal_id, &alice(), false, &item, true).is_err());
        assert!(vault.plan_withdraw(deal_id, &alice(), false, &item, false).is_ok());
    }

    #[test]
    fn test_withdrawn_item_can_return() {
        let deal_id = Uuid::new_v4();
        let mut vault = CollateralVault::new();
        let item = InvoiceItemId::new("inv-1");
        vault.record_deposit(&alice(), &item, Utc::now());
        vault.record_withdraw(&item, Utc::now());

        assert_eq!(vault.held_count(), 0);
        assert!(vault.plan_withdraw(deal_id, &alice(), false, &item, false).is_err());
        assert!(vault.plan_deposit(deal_id, &bob(), &item).is_ok());
    }
}
