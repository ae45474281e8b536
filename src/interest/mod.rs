pub mod accrual;
pub mod distribution;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::types::DealId;

pub use accrual::{AccrualEngine, DayCountConvention, DayCountPricer};
pub use distribution::{DistributionLog, InterestDistributionEngine, InterestDistributionRecord};

/// inputs handed to a pricer for one distribution period
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualContext {
    pub deal_id: DealId,
    /// outstanding debt the interest accrues on
    pub principal: Money,
    pub annual_rate: Rate,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub convention: DayCountConvention,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("invalid accrual period: {start} .. {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("pricer returned a negative amount: {amount}")]
    NegativeInterest {
        amount: Money,
    },

    #[error("interest on {principal} is out of range")]
    Overflow {
        principal: Money,
    },

    #[error("pricer unavailable: {0}")]
    Unavailable(String),
}

/// pluggable source of the interest owed for a period
pub trait InterestPricer: Send + Sync {
    fn interest_due(&self, ctx: &AccrualContext) -> Result<Money, PricingError>;
}

impl<F> InterestPricer for F
where
    F: Fn(&AccrualContext) -> Money + Send + Sync,
{
    fn interest_due(&self, ctx: &AccrualContext) -> Result<Money, PricingError> {
        Ok(self(ctx))
    }
}
