use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use trade_deal_rs::{
    Account, AssetRef, ClaimTopicOracle, DealConfig, DealError, DealId, InMemoryCustody, Money,
    ParticipantId, SafeTimeProvider, TimeSource, TokenAmount, TradeDealRegistry,
};

const FUNDERS: [&str; 3] = ["A", "B", "C"];

fn admin() -> ParticipantId {
    ParticipantId::new("admin")
}

fn borrower() -> ParticipantId {
    ParticipantId::new("borrower")
}

fn usdc() -> AssetRef {
    AssetRef::new("USDC")
}

fn registry_with_deal(ratio: Decimal, target: i64) -> (TradeDealRegistry, Arc<InMemoryCustody>, DealId) {
    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    let custody = Arc::new(InMemoryCustody::with_assets(["PT-CT", "PT-IT", "USDC"]));
    for funder in FUNDERS {
        custody.fund(&usdc(), Account::Participant(ParticipantId::new(funder)), Money::from_major(10_000_000));
    }
    custody.fund(&usdc(), Account::from(&borrower()), Money::from_major(10_000_000));

    let registry = TradeDealRegistry::new(admin(), Arc::new(ClaimTopicOracle::new()), custody.clone(), time);
    let config = DealConfig::builder("Property Deal", "PT", Money::from_major(target))
        .ratio(ratio)
        .build();
    let deal_id = registry.create_deal(&admin(), config).unwrap();
    registry.activate_deal(&admin(), deal_id).unwrap();
    (registry, custody, deal_id)
}

/// Generate a funder from a small pool.
fn arb_funder() -> impl Strategy<Value = ParticipantId> {
    prop::sample::select(FUNDERS.to_vec()).prop_map(ParticipantId::new)
}

/// Generate a deposit of 1 to 100,000 funding units.
fn arb_deposit() -> impl Strategy<Value = i64> {
    1i64..100_000i64
}

/// Generate a positive collateral ratio.
fn arb_ratio() -> impl Strategy<Value = Decimal> {
    prop::sample::select(vec![Decimal::ONE, Decimal::from(3), Decimal::from(100), Decimal::from(1_000_000)])
}

fn total_balances(registry: &TradeDealRegistry, deal_id: DealId) -> TokenAmount {
    FUNDERS
        .iter()
        .map(|f| registry.collateral_balance(deal_id, &ParticipantId::new(*f)).unwrap())
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // ===================================================================
    // Collateral supply always equals deposits x ratio minus burns,
    // through funding and redemption.
    // ===================================================================
    #[test]
    fn prop_supply_tracks_deposits_and_redemptions(
        ratio in arb_ratio(),
        deposits in prop::collection::vec((arb_funder(), arb_deposit()), 1..12),
        redeem_fraction in 1u32..=100u32,
    ) {
        let target: i64 = deposits.iter().map(|(_, amount)| *amount).sum();
        let total = Money::from_major(target);
        let (registry, custody, deal_id) = registry_with_deal(ratio, target);

        for (funder, amount) in &deposits {
            registry.deposit_funding(deal_id, funder, Money::from_major(*amount)).unwrap();
            let status = registry.get_full_status(deal_id).unwrap();
            prop_assert_eq!(total_balances(&registry, deal_id), status.collateral_supply);
            prop_assert_eq!(status.collateral_supply, status.funding.total_deposited.to_tokens(ratio));
        }
        prop_assert!(registry.get_full_status(deal_id).unwrap().funding.is_funded);

        registry.withdraw_funding_for_borrower(&admin(), deal_id, &borrower()).unwrap();
        registry.repay(deal_id, &borrower(), total).unwrap();

        for funder in FUNDERS.iter().map(|f| ParticipantId::new(*f)) {
            let balance = registry.collateral_balance(deal_id, &funder).unwrap();
            if balance.is_zero() {
                continue;
            }
            let tokens = TokenAmount::from_decimal(balance.as_decimal() * Decimal::from(redeem_fraction) / Decimal::from(100));
            if !tokens.is_positive() {
                continue;
            }
            registry.redeem_collateral_tokens(deal_id, &funder, tokens).unwrap();

            let status = registry.get_full_status(deal_id).unwrap();
            prop_assert_eq!(total_balances(&registry, deal_id), status.collateral_supply);
            prop_assert_eq!(
                status.collateral_supply + status.redemption.tokens_burned,
                status.funding.total_deposited.to_tokens(ratio)
            );
            prop_assert!(status.redemption.funds_paid <= status.debt.repaid_amount);
        }

        // escrow never goes negative and holds exactly what is still owed to holders
        let status = registry.get_full_status(deal_id).unwrap();
        let escrow = custody.balance(&usdc(), &Account::Escrow(deal_id));
        prop_assert_eq!(escrow, (status.debt.repaid_amount - status.redemption.funds_paid).as_decimal());
    }

    // ===================================================================
    // repaidAmount never decreases, never exceeds totalDebt, and isRepaid
    // never reverts. Rejected payments leave the ledger unchanged.
    // ===================================================================
    #[test]
    fn prop_repayment_is_monotonic(
        principal in 100i64..50_000i64,
        payments in prop::collection::vec(1i64..20_000i64, 1..20),
    ) {
        let (registry, _custody, deal_id) = registry_with_deal(Decimal::ONE, principal);
        registry.deposit_funding(deal_id, &ParticipantId::new("A"), Money::from_major(principal)).unwrap();
        registry.withdraw_funding_for_borrower(&admin(), deal_id, &borrower()).unwrap();

        let mut previous = Money::ZERO;
        let mut was_repaid = false;
        for payment in payments {
            let before = registry.get_full_status(deal_id).unwrap().debt;
            let result = registry.repay(deal_id, &borrower(), Money::from_major(payment));
            let after = registry.get_full_status(deal_id).unwrap().debt;

            match result {
                Ok(outcome) => {
                    prop_assert_eq!(after.repaid_amount, before.repaid_amount + Money::from_major(payment));
                    prop_assert_eq!(outcome.repaid_total, after.repaid_amount);
                }
                Err(DealError::OverRepayment { outstanding, .. }) => {
                    prop_assert!(Money::from_major(payment) > outstanding);
                    prop_assert_eq!(&after, &before);
                }
                Err(DealError::InvalidState { .. }) => {
                    prop_assert!(before.is_repaid);
                    prop_assert_eq!(&after, &before);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }

            prop_assert!(after.repaid_amount >= previous);
            prop_assert!(after.repaid_amount <= after.total_debt);
            prop_assert_eq!(after.is_repaid, after.repaid_amount >= after.total_debt);
            prop_assert!(!was_repaid || after.is_repaid);
            previous = after.repaid_amount;
            was_repaid = after.is_repaid;
        }
    }
}
