use crate::decimal::{Money, Rate};
use crate::errors::{DealError, Result};
use crate::types::{DealId, OperationMode};

/// what a mode strategy sees of the deal
#[derive(Debug, Clone, Copy)]
pub struct ModeContext {
    pub deal_id: DealId,
    /// invoice items held and not yet settled
    pub live_invoices: usize,
    pub interest_pool_share: Rate,
}

/// interest split between the two pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestSplit {
    pub invoice_pool: Money,
    pub interest_pool: Money,
}

/// per-mode rules applied at the entry of funding and interest distribution
pub trait ModeStrategy: Send + Sync {
    fn admit_funding(&self, ctx: &ModeContext) -> Result<()>;

    fn split_interest(&self, total: Money, ctx: &ModeContext) -> InterestSplit;
}

pub struct StandardMode;

pub struct InvoiceBackedMode;

/// resolve the strategy for a configured mode
pub fn strategy_for(mode: OperationMode) -> &'static dyn ModeStrategy {
    match mode {
        OperationMode::Standard => &StandardMode,
        OperationMode::InvoiceBacked => &InvoiceBackedMode,
    }
}

fn proportional_split(total: Money, share: Rate) -> InterestSplit {
    let interest_pool = total * share.as_decimal();
    InterestSplit {
        invoice_pool: total - interest_pool,
        interest_pool,
    }
}

impl ModeStrategy for StandardMode {
    fn admit_funding(&self, _ctx: &ModeContext) -> Result<()> {
        Ok(())
    }

    /// no live invoice collateral means no invoice pool to credit
    fn split_interest(&self, total: Money, ctx: &ModeContext) -> InterestSplit {
        if ctx.live_invoices == 0 {
            return InterestSplit {
                invoice_pool: Money::ZERO,
                interest_pool: total,
            };
        }
        proportional_split(total, ctx.interest_pool_share)
    }
}

impl ModeStrategy for InvoiceBackedMode {
    fn admit_funding(&self, ctx: &ModeContext) -> Result<()> {
        if ctx.live_invoices == 0 {
            return Err(DealError::invalid_state(
                ctx.deal_id,
                "no live invoice collateral",
                "at least one held invoice before funding",
            ));
        }
        Ok(())
    }

    fn split_interest(&self, total: Money, ctx: &ModeContext) -> InterestSplit {
        proportional_split(total, ctx.interest_pool_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(live_invoices: usize) -> ModeContext {
        ModeContext {
            deal_id: Uuid::nil(),
            live_invoices,
            interest_pool_share: Rate::from_percentage(70),
        }
    }

    #[test]
    fn test_standard_folds_invoice_share_without_collateral() {
        let split = strategy_for(OperationMode::Standard).split_interest(Money::from_major(100), &ctx(0));
        assert_eq!(split.interest_pool, Money::from_major(100));
        assert_eq!(split.invoice_pool, Money::ZERO);
    }

    #[test]
    fn test_split_sums_to_total() {
        let total = Money::from_str_exact("65.75342466").unwrap();
        for mode in [OperationMode::Standard, OperationMode::InvoiceBacked] {
            let split = strategy_for(mode).split_interest(total, &ctx(2));
            assert_eq!(split.invoice_pool + split.interest_pool, total);
        }
    }

    #[test]
    fn test_invoice_backed_requires_collateral() {
        let strategy = strategy_for(OperationMode::InvoiceBacked);
        assert!(matches!(strategy.admit_funding(&ctx(0)), Err(DealError::InvalidState { .. })));
        assert!(strategy.admit_funding(&ctx(1)).is_ok());
        assert!(strategy_for(OperationMode::Standard).admit_funding(&ctx(0)).is_ok());
    }
}
