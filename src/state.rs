use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, TokenAmount};
use crate::types::{DealId, DealPhase};

/// funding intake for one deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingLedger {
    pub funding_target: Money,
    /// funds currently held in escrow from deposits
    pub current_balance: Money,
    /// lifetime deposits
    pub total_deposited: Money,
    /// sticky once set
    pub is_funded: bool,
    pub is_funding_withdrawn: bool,
    pub funded_at: Option<DateTime<Utc>>,
    pub disbursed_amount: Money,
}

impl FundingLedger {
    pub fn new(funding_target: Money) -> Self {
        Self {
            funding_target,
            current_balance: Money::ZERO,
            total_deposited: Money::ZERO,
            is_funded: false,
            is_funding_withdrawn: false,
            funded_at: None,
            disbursed_amount: Money::ZERO,
        }
    }

    /// record a deposit; returns true when this deposit first reaches the target
    pub fn record_deposit(&mut self, amount: Money, timestamp: DateTime<Utc>) -> bool {
        self.current_balance += amount;
        self.total_deposited += amount;

        if !self.is_funded && self.current_balance >= self.funding_target {
            self.is_funded = true;
            self.funded_at = Some(timestamp);
            return true;
        }
        false
    }

    /// move the escrowed balance out to the borrower
    pub fn record_disbursement(&mut self) -> Money {
        let amount = self.current_balance;
        self.current_balance = Money::ZERO;
        self.disbursed_amount = amount;
        self.is_funding_withdrawn = true;
        amount
    }
}

/// borrower debt for one deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtLedger {
    pub total_debt: Money,
    /// never decreases
    pub repaid_amount: Money,
    pub is_repaid: bool,
    pub principal: Money,
    pub interest_charged: Money,
    /// start of the next accrual period
    pub accrual_start: Option<DateTime<Utc>>,
    pub repaid_at: Option<DateTime<Utc>>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self {
            total_debt: Money::ZERO,
            repaid_amount: Money::ZERO,
            is_repaid: false,
            principal: Money::ZERO,
            interest_charged: Money::ZERO,
            accrual_start: None,
            repaid_at: None,
        }
    }

    /// debt exists once principal has been disbursed
    pub fn is_open(&self) -> bool {
        self.accrual_start.is_some()
    }

    pub fn outstanding(&self) -> Money {
        (self.total_debt - self.repaid_amount).max(Money::ZERO)
    }

    pub fn open(&mut self, principal: Money, timestamp: DateTime<Utc>) {
        self.principal = principal;
        self.total_debt = principal;
        self.accrual_start = Some(timestamp);
    }

    /// add distributed interest to the debt and restart the accrual period
    pub fn charge_interest(&mut self, interest: Money, period_end: DateTime<Utc>) {
        self.total_debt += interest;
        self.interest_charged += interest;
        self.accrual_start = Some(period_end);
    }

    /// apply an already validated repayment; returns true when the debt became fully repaid
    pub fn apply_repayment(&mut self, amount: Money, timestamp: DateTime<Utc>) -> bool {
        self.repaid_amount += amount.min(self.outstanding());
        if !self.is_repaid && self.repaid_amount >= self.total_debt {
            self.is_repaid = true;
            self.repaid_at = Some(timestamp);
            return true;
        }
        false
    }
}

impl Default for DebtLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// what has been paid out against burned collateral tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedemptionLedger {
    pub tokens_burned: TokenAmount,
    pub funds_paid: Money,
}

/// aggregated read-only view of a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealStatus {
    pub deal_id: DealId,
    pub name: String,
    pub symbol: String,
    pub active: bool,
    pub phase: DealPhase,
    pub created_at: DateTime<Utc>,
    pub funding: FundingLedger,
    pub debt: DebtLedger,
    pub redemption: RedemptionLedger,
    pub collateral_supply: TokenAmount,
    pub interest_supply: TokenAmount,
    pub invoices_held: usize,
    pub invoices_live: usize,
    pub invoice_pool_accrued: Money,
    pub distributions: usize,
}

impl DealStatus {
    /// pretty json rendering
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
