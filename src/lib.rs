pub mod collateral;
pub mod config;
pub mod custody;
pub mod deal;
pub mod decimal;
pub mod eligibility;
pub mod errors;
pub mod events;
pub mod funding;
pub mod interest;
pub mod modes;
pub mod payments;
pub mod registry;
pub mod state;
pub mod types;

// re-export key types
pub use collateral::{CollateralTokenIssuer, CollateralVault, InvoicePosition};
pub use config::{DealConfig, DealConfigBuilder};
pub use custody::{CustodyError, CustodyInstruction, InMemoryCustody, TokenCustody};
pub use deal::TradeDeal;
pub use decimal::{Money, Rate, TokenAmount};
pub use eligibility::{ClaimTopicOracle, EligibilityOracle, OracleError};
pub use errors::{DealError, Result};
pub use events::{Event, EventStore};
pub use funding::FundingEngine;
pub use interest::{
    AccrualContext, AccrualEngine, DayCountConvention, DayCountPricer, DistributionLog,
    InterestDistributionEngine, InterestDistributionRecord, InterestPricer, PricingError,
};
pub use modes::{InterestSplit, ModeStrategy};
pub use payments::{RedemptionEngine, RedemptionOutcome, RepaymentEngine, RepaymentOutcome};
pub use registry::TradeDealRegistry;
pub use state::{DealStatus, DebtLedger, FundingLedger, RedemptionLedger};
pub use types::{
    Account, AssetRef, DealId, DealPhase, ExcessFundingPolicy, InvoiceItemId, InvoiceStatus,
    OperationMode, ParticipantId, TopicId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
