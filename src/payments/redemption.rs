use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collateral::CollateralTokenIssuer;
use crate::config::DealConfig;
use crate::custody::CustodyInstruction;
use crate::decimal::{Money, TokenAmount};
use crate::errors::{DealError, Result};
use crate::state::{DebtLedger, RedemptionLedger};
use crate::types::{Account, DealId, ParticipantId};

/// a validated redemption waiting for custody
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionPlan {
    pub holder: ParticipantId,
    pub tokens: TokenAmount,
    pub funds: Money,
    /// funding asset per collateral token at planning time
    pub rate: Decimal,
    pub instructions: Vec<CustodyInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    pub tokens_burned: TokenAmount,
    pub funds_paid: Money,
    pub remaining_supply: TokenAmount,
}

/// converts collateral tokens back into the funding asset once the debt is repaid
pub struct RedemptionEngine;

impl RedemptionEngine {
    /// funds in escrow per outstanding collateral token
    ///
    /// Read from the same locked snapshot as the debt ledger, so a redemption
    /// never sees a half-applied repayment.
    pub fn current_rate(
        debt: &DebtLedger,
        redemption: &RedemptionLedger,
        issuer: &CollateralTokenIssuer,
    ) -> Option<Decimal> {
        let supply = issuer.collateral_supply();
        if !supply.is_positive() {
            return None;
        }
        let pool = debt.repaid_amount - redemption.funds_paid;
        pool.as_decimal().checked_div(supply.as_decimal())
    }

    pub fn plan(
        deal_id: DealId,
        config: &DealConfig,
        debt: &DebtLedger,
        redemption: &RedemptionLedger,
        issuer: &CollateralTokenIssuer,
        holder: &ParticipantId,
        tokens: TokenAmount,
    ) -> Result<RedemptionPlan> {
        if !debt.is_repaid {
            return Err(DealError::invalid_state(deal_id, "debt outstanding", "repaid"));
        }
        if !tokens.is_positive() {
            return Err(DealError::InvalidAmount {
                deal_id,
                amount: tokens.as_decimal(),
                reason: "redemption must burn a positive token amount",
            });
        }
        issuer.check_burn(deal_id, holder, tokens)?;

        let out_of_range = || DealError::InvalidAmount {
            deal_id,
            amount: tokens.as_decimal(),
            reason: "redemption payout out of range",
        };
        let pool = debt.repaid_amount - redemption.funds_paid;
        // check_burn passed, so supply is positive here
        let rate = Self::current_rate(debt, redemption, issuer).ok_or_else(out_of_range)?;
        // the last tokens out take whatever is left so no dust stays in escrow
        let funds = if tokens == issuer.collateral_supply() {
            pool
        } else {
            let owed = tokens.as_decimal().checked_mul(rate).ok_or_else(out_of_range)?;
            Money::from_decimal(owed).min(pool)
        };

        let mut instructions = vec![CollateralTokenIssuer::burn_instruction(&config.collateral_token, holder, tokens)];
        if funds.is_positive() {
            instructions.push(CustodyInstruction::Transfer {
                asset: config.funding_asset.clone(),
                from: Account::Escrow(deal_id),
                to: Account::from(holder),
                amount: funds,
            });
        }

        Ok(RedemptionPlan {
            holder: holder.clone(),
            tokens,
            funds,
            rate,
            instructions,
        })
    }

    pub fn commit(
        redemption: &mut RedemptionLedger,
        issuer: &mut CollateralTokenIssuer,
        plan: &RedemptionPlan,
    ) -> RedemptionOutcome {
        issuer.record_collateral_burn(&plan.holder, plan.tokens);
        redemption.tokens_burned += plan.tokens;
        redemption.funds_paid += plan.funds;
        RedemptionOutcome {
            tokens_burned: plan.tokens,
            funds_paid: plan.funds,
            remaining_supply: issuer.collateral_supply(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn repaid_deal(repaid: i64) -> (DealConfig, DebtLedger, CollateralTokenIssuer) {
        let config = DealConfig::builder("Grain", "GRN", Money::from_major(1_000)).build();
        let now = Utc::now();
        let mut debt = DebtLedger::new();
        debt.open(Money::from_major(repaid), now);
        debt.apply_repayment(Money::from_major(repaid), now);

        let mut issuer = CollateralTokenIssuer::new();
        issuer.record_collateral_mint(&p("a"), TokenAmount::from_major(300));
        issuer.record_collateral_mint(&p("b"), TokenAmount::from_major(700));
        (config, debt, issuer)
    }

    #[test]
    fn test_redeem_requires_repaid() {
        let (config, _, issuer) = repaid_deal(1_100);
        let mut debt = DebtLedger::new();
        debt.open(Money::from_major(1_000), Utc::now());

        for tokens in [TokenAmount::ZERO, TokenAmount::from_major(10)] {
            let result =
                RedemptionEngine::plan(Uuid::nil(), &config, &debt, &RedemptionLedger::default(), &issuer, &p("a"), tokens);
            assert!(matches!(result, Err(DealError::InvalidState { .. })));
        }
    }

    #[test]
    fn test_sequential_redemptions_drain_pool_exactly() {
        let (config, debt, mut issuer) = repaid_deal(1_100);
        let mut ledger = RedemptionLedger::default();

        let first = RedemptionEngine::plan(
            Uuid::nil(),
            &config,
            &debt,
            &ledger,
            &issuer,
            &p("a"),
            TokenAmount::from_major(300),
        )
        .unwrap();
        assert_eq!(first.rate, dec!(1.1));
        assert_eq!(first.funds, Money::from_major(330));
        RedemptionEngine::commit(&mut ledger, &mut issuer, &first);

        let second = RedemptionEngine::plan(
            Uuid::nil(),
            &config,
            &debt,
            &ledger,
            &issuer,
            &p("b"),
            TokenAmount::from_major(700),
        )
        .unwrap();
        assert_eq!(second.funds, Money::from_major(770));
        let outcome = RedemptionEngine::commit(&mut ledger, &mut issuer, &second);

        assert!(outcome.remaining_supply.is_zero());
        assert_eq!(ledger.funds_paid, debt.repaid_amount);
        assert!(RedemptionEngine::current_rate(&debt, &ledger, &issuer).is_none());
    }

    #[test]
    fn test_cannot_redeem_more_than_balance() {
        let (config, debt, issuer) = repaid_deal(1_000);
        let result = RedemptionEngine::plan(
            Uuid::nil(),
            &config,
            &debt,
            &RedemptionLedger::default(),
            &issuer,
            &p("a"),
            TokenAmount::from_major(301),
        );
        assert!(matches!(result, Err(DealError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_rate_out_of_range_is_an_error() {
        let config = DealConfig::builder("Grain", "GRN", Money::from_major(1_000)).build();
        let now = Utc::now();
        let pool = Money::from_decimal(dec!(10_000_000_000_000_000_000_000_000));
        let mut debt = DebtLedger::new();
        debt.open(pool, now);
        debt.apply_repayment(pool, now);

        let dust = TokenAmount::from_decimal(dec!(0.00000001));
        let mut issuer = CollateralTokenIssuer::new();
        issuer.record_collateral_mint(&p("a"), dust);
        issuer.record_collateral_mint(&p("b"), dust);

        let ledger = RedemptionLedger::default();
        let result = RedemptionEngine::plan(Uuid::nil(), &config, &debt, &ledger, &issuer, &p("a"), dust);
        assert!(matches!(result, Err(DealError::InvalidAmount { .. })));
        assert!(RedemptionEngine::current_rate(&debt, &ledger, &issuer).is_none());
    }
}
