pub mod redemption;
pub mod repayment;

pub use redemption::{RedemptionEngine, RedemptionOutcome, RedemptionPlan};
pub use repayment::{RepaymentEngine, RepaymentOutcome, RepaymentPlan};
