use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::custody::CustodyInstruction;
use crate::decimal::{Money, TokenAmount};
use crate::errors::{DealError, Result};
use crate::types::{Account, AssetRef, DealId, ParticipantId};

/// per-deal record of collateral and interest token balances
///
/// Minting and burning themselves happen in custody; the issuer keeps the
/// deal's own view so supply checks and pro-rata allocations need no
/// round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralTokenIssuer {
    collateral: BTreeMap<ParticipantId, TokenAmount>,
    interest: BTreeMap<ParticipantId, TokenAmount>,
    collateral_minted: TokenAmount,
    collateral_burned: TokenAmount,
    interest_minted: TokenAmount,
}

impl CollateralTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// collateral tokens owed for a funding amount; `None` on overflow
    pub fn tokens_for(amount: Money, ratio: Decimal) -> Option<TokenAmount> {
        amount.checked_to_tokens(ratio)
    }

    pub fn mint_instruction(token: &AssetRef, holder: &ParticipantId, amount: TokenAmount) -> CustodyInstruction {
        CustodyInstruction::Mint {
            token: token.clone(),
            to: Account::from(holder),
            amount,
        }
    }

    pub fn burn_instruction(token: &AssetRef, holder: &ParticipantId, amount: TokenAmount) -> CustodyInstruction {
        CustodyInstruction::Burn {
            token: token.clone(),
            from: Account::from(holder),
            amount,
        }
    }

    /// validate that minting `amount` more collateral keeps supply in range
    pub fn check_collateral_mint(&self, deal_id: DealId, amount: TokenAmount) -> Result<()> {
        Self::check_headroom(deal_id, self.collateral_minted, amount, "collateral supply overflows")
    }

    pub fn check_interest_mint(&self, deal_id: DealId, amount: TokenAmount) -> Result<()> {
        Self::check_headroom(deal_id, self.interest_minted, amount, "interest supply overflows")
    }

    // per-holder balances never exceed the minted total, so checking the total covers them
    fn check_headroom(deal_id: DealId, minted: TokenAmount, amount: TokenAmount, reason: &'static str) -> Result<()> {
        match minted.checked_add(amount) {
            Some(_) => Ok(()),
            None => Err(DealError::InvalidAmount {
                deal_id,
                amount: amount.as_decimal(),
                reason,
            }),
        }
    }

    pub fn record_collateral_mint(&mut self, holder: &ParticipantId, amount: TokenAmount) {
        *self.collateral.entry(holder.clone()).or_default() += amount;
        self.collateral_minted += amount;
    }

    /// validate that `holder` can burn `amount`
    pub fn check_burn(&self, deal_id: DealId, holder: &ParticipantId, amount: TokenAmount) -> Result<()> {
        let available = self.collateral_balance(holder);
        if amount > available {
            return Err(DealError::InsufficientBalance {
                deal_id,
                holder: holder.clone(),
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    pub fn record_collateral_burn(&mut self, holder: &ParticipantId, amount: TokenAmount) {
        if let Some(balance) = self.collateral.get_mut(holder) {
            *balance -= amount.min(*balance);
            if balance.is_zero() {
                self.collateral.remove(holder);
            }
        }
        self.collateral_burned += amount;
    }

    /// split `total` interest tokens across collateral holders pro-rata
    ///
    /// The last holder in id order takes the rounding remainder so the
    /// allocation always sums to `total`.
    pub fn allocate_interest(&self, total: TokenAmount) -> Vec<(ParticipantId, TokenAmount)> {
        let supply = self.collateral_supply();
        if !total.is_positive() || !supply.is_positive() {
            return Vec::new();
        }

        let holders: Vec<_> = self.collateral.iter().filter(|(_, b)| b.is_positive()).collect();
        let mut allocations = Vec::with_capacity(holders.len());
        let mut allocated = TokenAmount::ZERO;
        for (index, (holder, balance)) in holders.iter().enumerate() {
            let share = if index + 1 == holders.len() {
                total - allocated
            } else {
                TokenAmount::from_decimal(total.as_decimal() * (balance.as_decimal() / supply.as_decimal()))
            };
            allocated += share;
            allocations.push(((*holder).clone(), share));
        }
        allocations
    }

    pub fn record_interest_mint(&mut self, allocations: &[(ParticipantId, TokenAmount)]) {
        for (holder, amount) in allocations {
            *self.interest.entry(holder.clone()).or_default() += *amount;
            self.interest_minted += *amount;
        }
    }

    pub fn collateral_balance(&self, holder: &ParticipantId) -> TokenAmount {
        self.collateral.get(holder).copied().unwrap_or_default()
    }

    pub fn interest_balance(&self, holder: &ParticipantId) -> TokenAmount {
        self.interest.get(holder).copied().unwrap_or_default()
    }

    /// outstanding collateral tokens
    pub fn collateral_supply(&self) -> TokenAmount {
        self.collateral_minted - self.collateral_burned
    }

    pub fn interest_supply(&self) -> TokenAmount {
        self.interest_minted
    }

    /// sum of individual balances; equals `collateral_supply`
    pub fn sum_of_balances(&self) -> TokenAmount {
        self.collateral.values().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut issuer = CollateralTokenIssuer::new();
        let minted = CollateralTokenIssuer::tokens_for(Money::from_major(10_000), dec!(1_000_000)).unwrap();
        issuer.record_collateral_mint(&p("a"), minted);
        assert_eq!(issuer.collateral_supply(), TokenAmount::from_major(10_000_000_000));

        issuer.check_burn(Uuid::nil(), &p("a"), minted).unwrap();
        issuer.record_collateral_burn(&p("a"), minted);
        assert!(issuer.collateral_supply().is_zero());
        assert_eq!(issuer.sum_of_balances(), TokenAmount::ZERO);
        assert!(issuer.collateral_balance(&p("a")).is_zero());
    }

    #[test]
    fn test_burn_beyond_balance_rejected() {
        let mut issuer = CollateralTokenIssuer::new();
        issuer.record_collateral_mint(&p("a"), TokenAmount::from_major(5));
        let result = issuer.check_burn(Uuid::nil(), &p("a"), TokenAmount::from_major(6));
        assert!(matches!(result, Err(DealError::InsufficientBalance { .. })));
        assert!(issuer.check_burn(Uuid::nil(), &p("b"), TokenAmount::from_major(1)).is_err());
    }

    #[test]
    fn test_interest_allocation_is_pro_rata_and_exact() {
        let mut issuer = CollateralTokenIssuer::new();
        issuer.record_collateral_mint(&p("a"), TokenAmount::from_major(1));
        issuer.record_collateral_mint(&p("b"), TokenAmount::from_major(2));

        let total = TokenAmount::from_major(100);
        let allocations = issuer.allocate_interest(total);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].0, p("a"));
        assert_eq!(allocations[0].1.as_decimal(), dec!(33.33333333));
        assert_eq!(allocations[1].1.as_decimal(), dec!(66.66666667));

        let sum: TokenAmount = allocations.iter().map(|(_, amount)| *amount).sum();
        assert_eq!(sum, total);

        issuer.record_interest_mint(&allocations);
        assert_eq!(issuer.interest_supply(), total);
        assert_eq!(issuer.interest_balance(&p("b")).as_decimal(), dec!(66.66666667));
    }

    #[test]
    fn test_mint_headroom() {
        let mut issuer = CollateralTokenIssuer::new();
        issuer.record_collateral_mint(&p("a"), TokenAmount::from_decimal(Decimal::MAX));
        let result = issuer.check_collateral_mint(Uuid::nil(), TokenAmount::from_major(1));
        assert!(matches!(result, Err(DealError::InvalidAmount { .. })));
        assert!(issuer.check_interest_mint(Uuid::nil(), TokenAmount::from_major(1)).is_ok());
        assert!(CollateralTokenIssuer::tokens_for(Money::from_decimal(Decimal::MAX), dec!(2)).is_none());
    }

    #[test]
    fn test_allocation_of_large_balances() {
        // holder balance times total would leave the decimal range
        let mut issuer = CollateralTokenIssuer::new();
        let big = TokenAmount::from_decimal(dec!(10_000_000_000_000_000_000));
        issuer.record_collateral_mint(&p("a"), big);
        issuer.record_collateral_mint(&p("b"), big);

        let total = TokenAmount::from_decimal(dec!(1_000_000_000_000_000));
        let allocations = issuer.allocate_interest(total);
        assert_eq!(allocations[0].1, TokenAmount::from_decimal(dec!(500_000_000_000_000)));
        let sum: TokenAmount = allocations.iter().map(|(_, amount)| *amount).sum();
        assert_eq!(sum, total);
    }

    #[test]
    fn test_no_holders_no_allocation() {
        let issuer = CollateralTokenIssuer::new();
        assert!(issuer.allocate_interest(TokenAmount::from_major(10)).is_empty());
    }
}
