use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collateral::CollateralTokenIssuer;
use crate::config::DealConfig;
use crate::custody::CustodyInstruction;
use crate::decimal::{Money, TokenAmount};
use crate::errors::{DealError, Result};
use crate::interest::{AccrualContext, InterestPricer, PricingError};
use crate::modes::{strategy_for, InterestSplit, ModeContext};
use crate::state::DebtLedger;
use crate::types::{DealId, ParticipantId};

/// one interest distribution; never changed once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestDistributionRecord {
    pub sequence_number: u64,
    pub total_interest: Money,
    pub invoice_pool_share: Money,
    pub interest_pool_share: Money,
    pub tokens_minted: TokenAmount,
    pub period_start: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub allocations: Vec<(ParticipantId, TokenAmount)>,
}

/// append-only distribution history of a deal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionLog {
    records: Vec<InterestDistributionRecord>,
}

impl DistributionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    pub fn append(&mut self, record: InterestDistributionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[InterestDistributionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// a priced distribution waiting for custody
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionPlan {
    pub record: InterestDistributionRecord,
    pub instructions: Vec<CustodyInstruction>,
}

pub struct InterestDistributionEngine;

impl InterestDistributionEngine {
    /// price the period since the last distribution and split it across pools
    ///
    /// Returns `None` when nothing is owed: no open debt, debt repaid, or a
    /// zero amount from the pricer.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        deal_id: DealId,
        config: &DealConfig,
        debt: &DebtLedger,
        issuer: &CollateralTokenIssuer,
        log: &DistributionLog,
        live_invoices: usize,
        pricer: &dyn InterestPricer,
        now: DateTime<Utc>,
    ) -> Result<Option<DistributionPlan>> {
        let period_start = match debt.accrual_start {
            Some(start) if !debt.is_repaid => start,
            _ => return Ok(None),
        };
        let principal = debt.outstanding();
        if principal.is_zero() {
            return Ok(None);
        }

        let ctx = AccrualContext {
            deal_id,
            principal,
            annual_rate: config.interest_rate(),
            period_start,
            period_end: now,
            convention: config.day_count_convention,
        };
        let total_interest = pricer
            .interest_due(&ctx)
            .and_then(|amount| {
                if amount.is_negative() {
                    Err(PricingError::NegativeInterest { amount })
                } else {
                    Ok(amount)
                }
            })
            .map_err(|e| DealError::Pricing {
                deal_id,
                message: e.to_string(),
            })?;
        if total_interest.is_zero() {
            return Ok(None);
        }
        let out_of_range = |reason: &'static str| DealError::InvalidAmount {
            deal_id,
            amount: total_interest.as_decimal(),
            reason,
        };
        // interest_charged is part of total_debt, so one check covers both
        debt.total_debt
            .checked_add(total_interest)
            .ok_or_else(|| out_of_range("interest overflows the debt ledger"))?;

        let mode_ctx = ModeContext {
            deal_id,
            live_invoices,
            interest_pool_share: config.interest_pool_share,
        };
        let InterestSplit {
            invoice_pool,
            interest_pool,
        } = strategy_for(config.operation_mode).split_interest(total_interest, &mode_ctx);

        let tokens_minted = interest_pool
            .checked_to_tokens(config.collateral_to_interest_ratio)
            .ok_or_else(|| out_of_range("interest token mint overflows"))?;
        issuer.check_interest_mint(deal_id, tokens_minted)?;
        let allocations = issuer.allocate_interest(tokens_minted);
        let tokens_minted: TokenAmount = allocations.iter().map(|(_, amount)| *amount).sum();
        let instructions = allocations
            .iter()
            .map(|(holder, amount)| CollateralTokenIssuer::mint_instruction(&config.interest_token, holder, *amount))
            .collect();

        Ok(Some(DistributionPlan {
            record: InterestDistributionRecord {
                sequence_number: log.next_sequence(),
                total_interest,
                invoice_pool_share: invoice_pool,
                interest_pool_share: interest_pool,
                tokens_minted,
                period_start,
                timestamp: now,
                allocations,
            },
            instructions,
        }))
    }

    /// charge the interest to the debt, mint the allocations and append the record
    pub fn commit(
        debt: &mut DebtLedger,
        issuer: &mut CollateralTokenIssuer,
        log: &mut DistributionLog,
        plan: DistributionPlan,
    ) -> InterestDistributionRecord {
        let record = plan.record;
        debt.charge_interest(record.total_interest, record.timestamp);
        issuer.record_interest_mint(&record.allocations);
        log.append(record.clone());
        record
    }
}
