use log::info;

use crate::collateral::CollateralTokenIssuer;
use crate::config::DealConfig;
use crate::custody::CustodyInstruction;
use crate::decimal::{Money, TokenAmount};
use crate::errors::{DealError, Result};
use crate::modes::{strategy_for, ModeContext};
use crate::state::{DebtLedger, FundingLedger};
use crate::types::{Account, DealId, ExcessFundingPolicy, ParticipantId};

/// a validated funding deposit waiting for custody
#[derive(Debug, Clone, PartialEq)]
pub struct DepositPlan {
    pub provider: ParticipantId,
    pub amount: Money,
    pub tokens: TokenAmount,
    pub instructions: Vec<CustodyInstruction>,
}

/// a validated disbursement of the escrowed balance to the borrower
#[derive(Debug, Clone, PartialEq)]
pub struct DisbursementPlan {
    pub borrower: ParticipantId,
    pub amount: Money,
    pub instructions: Vec<CustodyInstruction>,
}

/// what a committed deposit changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepositOutcome {
    pub tokens_minted: TokenAmount,
    pub new_balance: Money,
    /// this deposit reached the funding target for the first time
    pub became_funded: bool,
}

/// funding intake, full-funding detection and borrower disbursement
pub struct FundingEngine;

impl FundingEngine {
    /// validate a deposit against the ledger, mode and excess policy
    ///
    /// Every sum the commit will write is computed here with checked
    /// arithmetic, so an oversized amount fails before custody is touched.
    pub fn plan_deposit(
        deal_id: DealId,
        config: &DealConfig,
        ledger: &FundingLedger,
        issuer: &CollateralTokenIssuer,
        live_invoices: usize,
        provider: &ParticipantId,
        amount: Money,
    ) -> Result<DepositPlan> {
        let invalid = |reason: &'static str| DealError::InvalidAmount {
            deal_id,
            amount: amount.as_decimal(),
            reason,
        };
        if !amount.is_positive() {
            return Err(invalid("funding deposit must be positive"));
        }
        if ledger.is_funding_withdrawn {
            return Err(DealError::invalid_state(deal_id, "funding withdrawn", "funding open"));
        }

        let ctx = ModeContext {
            deal_id,
            live_invoices,
            interest_pool_share: config.interest_pool_share,
        };
        strategy_for(config.operation_mode).admit_funding(&ctx)?;

        let overflow = || invalid("funding deposit overflows the deal ledger");
        ledger.total_deposited.checked_add(amount).ok_or_else(overflow)?;
        let balance_after = ledger.current_balance.checked_add(amount).ok_or_else(overflow)?;
        if config.excess_funding_policy == ExcessFundingPolicy::Reject && balance_after > ledger.funding_target {
            return Err(DealError::FundingTargetExceeded {
                deal_id,
                target: ledger.funding_target,
                balance_after,
            });
        }

        let tokens = CollateralTokenIssuer::tokens_for(amount, config.collateral_to_interest_ratio)
            .ok_or_else(|| invalid("collateral mint overflows"))?;
        if !tokens.is_positive() {
            return Err(invalid("funding deposit mints no collateral tokens"));
        }
        issuer.check_collateral_mint(deal_id, tokens)?;

        let instructions = vec![
            CustodyInstruction::Transfer {
                asset: config.funding_asset.clone(),
                from: Account::from(provider),
                to: Account::Escrow(deal_id),
                amount,
            },
            CollateralTokenIssuer::mint_instruction(&config.collateral_token, provider, tokens),
        ];

        Ok(DepositPlan {
            provider: provider.clone(),
            amount,
            tokens,
            instructions,
        })
    }

    pub fn commit_deposit(
        ledger: &mut FundingLedger,
        issuer: &mut CollateralTokenIssuer,
        plan: &DepositPlan,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> DepositOutcome {
        issuer.record_collateral_mint(&plan.provider, plan.tokens);
        let became_funded = ledger.record_deposit(plan.amount, timestamp);
        DepositOutcome {
            tokens_minted: plan.tokens,
            new_balance: ledger.current_balance,
            became_funded,
        }
    }

    /// validate handing the escrowed balance to `borrower`
    pub fn plan_disbursement(
        deal_id: DealId,
        config: &DealConfig,
        ledger: &FundingLedger,
        borrower: &ParticipantId,
    ) -> Result<DisbursementPlan> {
        if !ledger.is_funded {
            return Err(DealError::invalid_state(deal_id, "unfunded", "funded"));
        }
        if ledger.is_funding_withdrawn {
            return Err(DealError::invalid_state(deal_id, "funding withdrawn", "funded, not withdrawn"));
        }

        let amount = ledger.current_balance;
        Ok(DisbursementPlan {
            borrower: borrower.clone(),
            amount,
            instructions: vec![CustodyInstruction::Transfer {
                asset: config.funding_asset.clone(),
                from: Account::Escrow(deal_id),
                to: Account::from(borrower),
                amount,
            }],
        })
    }

    /// zero the escrow balance and open the borrower's debt at the disbursed principal
    pub fn commit_disbursement(
        deal_id: DealId,
        ledger: &mut FundingLedger,
        debt: &mut DebtLedger,
        plan: &DisbursementPlan,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Money {
        let principal = ledger.record_disbursement();
        debt.open(principal, timestamp);
        info!("deal {}: disbursed {} to {}", deal_id, principal, plan.borrower);
        principal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationMode;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn config() -> DealConfig {
        DealConfig::builder("Cocoa Shipment", "COCOA", Money::from_major(10_000))
            .interest_rate_bps(800)
            .ratio(dec!(1_000_000))
            .build()
    }

    fn funder() -> ParticipantId {
        ParticipantId::new("funder")
    }

    fn plan(config: &DealConfig, ledger: &FundingLedger, live_invoices: usize, amount: Money) -> Result<DepositPlan> {
        let issuer = CollateralTokenIssuer::new();
        FundingEngine::plan_deposit(Uuid::nil(), config, ledger, &issuer, live_invoices, &funder(), amount)
    }

    #[test]
    fn test_deposit_mints_at_ratio() {
        let deal_id = Uuid::new_v4();
        let config = config();
        let mut ledger = FundingLedger::new(config.funding_target);
        let mut issuer = CollateralTokenIssuer::new();

        let plan =
            FundingEngine::plan_deposit(deal_id, &config, &ledger, &issuer, 0, &funder(), Money::from_major(10_000))
                .unwrap();
        assert_eq!(plan.instructions.len(), 2);
        assert_eq!(plan.tokens, TokenAmount::from_major(10_000_000_000));

        let outcome = FundingEngine::commit_deposit(&mut ledger, &mut issuer, &plan, Utc::now());
        assert!(outcome.became_funded);
        assert!(ledger.is_funded);
        assert_eq!(issuer.collateral_balance(&funder()), plan.tokens);
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let config = config();
        let ledger = FundingLedger::new(config.funding_target);
        let result = plan(&config, &ledger, 0, Money::ZERO);
        assert!(matches!(result, Err(DealError::InvalidAmount { .. })));
    }

    #[test]
    fn test_reject_policy_caps_at_target() {
        let mut config = config();
        config.excess_funding_policy = ExcessFundingPolicy::Reject;
        let ledger = FundingLedger::new(config.funding_target);

        let result = plan(&config, &ledger, 0, Money::from_major(10_001));
        assert!(matches!(result, Err(DealError::FundingTargetExceeded { .. })));
        assert!(plan(&config, &ledger, 0, Money::from_major(10_000)).is_ok());
    }

    #[test]
    fn test_invoice_backed_needs_live_invoice() {
        let mut config = config();
        config.operation_mode = OperationMode::InvoiceBacked;
        let ledger = FundingLedger::new(config.funding_target);

        let result = plan(&config, &ledger, 0, Money::from_major(5));
        assert!(matches!(result, Err(DealError::InvalidState { .. })));
        assert!(plan(&config, &ledger, 1, Money::from_major(5)).is_ok());
    }

    #[test]
    fn test_overflowing_deposit_rejected() {
        let config = config();
        let ledger = FundingLedger::new(config.funding_target);
        let issuer = CollateralTokenIssuer::new();
        let huge = Money::from_decimal(Decimal::MAX / Decimal::from(2));

        // amount times a 1_000_000 ratio leaves the decimal range
        let result = FundingEngine::plan_deposit(Uuid::nil(), &config, &ledger, &issuer, 0, &funder(), huge);
        assert!(matches!(result, Err(DealError::InvalidAmount { .. })));

        let mut full = FundingLedger::new(config.funding_target);
        full.total_deposited = Money::from_decimal(Decimal::MAX);
        let result =
            FundingEngine::plan_deposit(Uuid::nil(), &config, &full, &issuer, 0, &funder(), Money::from_major(1));
        assert!(matches!(result, Err(DealError::InvalidAmount { .. })));
    }

    #[test]
    fn test_deposit_minting_nothing_rejected() {
        let config = DealConfig::builder("Dust", "DUST", Money::from_major(1))
            .ratio(dec!(0.00000001))
            .build();
        let ledger = FundingLedger::new(config.funding_target);
        let dust = Money::from_str_exact("0.00000001").unwrap();

        let result = plan(&config, &ledger, 0, dust);
        assert!(matches!(
            result,
            Err(DealError::InvalidAmount { reason: "funding deposit mints no collateral tokens", .. })
        ));
    }

    #[test]
    fn test_disbursement_opens_debt_once() {
        let deal_id = Uuid::new_v4();
        let config = config();
        let borrower = ParticipantId::new("borrower");
        let mut ledger = FundingLedger::new(config.funding_target);
        let mut debt = DebtLedger::new();

        assert!(FundingEngine::plan_disbursement(deal_id, &config, &ledger, &borrower).is_err());

        ledger.record_deposit(Money::from_major(10_000), Utc::now());
        let plan = FundingEngine::plan_disbursement(deal_id, &config, &ledger, &borrower).unwrap();
        let principal = FundingEngine::commit_disbursement(deal_id, &mut ledger, &mut debt, &plan, Utc::now());

        assert_eq!(principal, Money::from_major(10_000));
        assert_eq!(debt.total_debt, principal);
        assert!(ledger.is_funding_withdrawn);
        assert!(FundingEngine::plan_disbursement(deal_id, &config, &ledger, &borrower).is_err());

        let late = self::plan(&config, &ledger, 0, Money::from_major(1));
        assert!(matches!(late, Err(DealError::InvalidState { .. })));
    }
}
