use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DealConfig;
use crate::custody::CustodyInstruction;
use crate::decimal::Money;
use crate::errors::{DealError, Result};
use crate::state::DebtLedger;
use crate::types::{Account, DealId, ParticipantId};

/// a validated repayment waiting for custody
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentPlan {
    pub payer: ParticipantId,
    pub on_behalf_of: Option<ParticipantId>,
    pub amount: Money,
    pub instructions: Vec<CustodyInstruction>,
}

/// result of an applied repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentOutcome {
    pub amount: Money,
    pub repaid_total: Money,
    pub outstanding: Money,
    /// this payment cleared the debt
    pub became_repaid: bool,
}

/// debt service for a disbursed deal
pub struct RepaymentEngine;

impl RepaymentEngine {
    /// validate a repayment; over-payment is an error, never capped
    pub fn plan(
        deal_id: DealId,
        config: &DealConfig,
        debt: &DebtLedger,
        payer: &ParticipantId,
        on_behalf_of: Option<&ParticipantId>,
        amount: Money,
    ) -> Result<RepaymentPlan> {
        if !amount.is_positive() {
            return Err(DealError::InvalidAmount {
                deal_id,
                amount: amount.as_decimal(),
                reason: "repayment must be positive",
            });
        }
        if !debt.is_open() {
            return Err(DealError::invalid_state(deal_id, "no debt", "funding withdrawn"));
        }
        if debt.is_repaid {
            return Err(DealError::invalid_state(deal_id, "repaid", "debt outstanding"));
        }

        let outstanding = debt.outstanding();
        if amount > outstanding {
            return Err(DealError::OverRepayment {
                deal_id,
                amount,
                outstanding,
            });
        }

        Ok(RepaymentPlan {
            payer: payer.clone(),
            on_behalf_of: on_behalf_of.cloned(),
            amount,
            instructions: vec![CustodyInstruction::Transfer {
                asset: config.funding_asset.clone(),
                from: Account::from(payer),
                to: Account::Escrow(deal_id),
                amount,
            }],
        })
    }

    pub fn commit(debt: &mut DebtLedger, plan: &RepaymentPlan, timestamp: DateTime<Utc>) -> RepaymentOutcome {
        let became_repaid = debt.apply_repayment(plan.amount, timestamp);
        RepaymentOutcome {
            amount: plan.amount,
            repaid_total: debt.repaid_amount,
            outstanding: debt.outstanding(),
            became_repaid,
        }
    }
}
