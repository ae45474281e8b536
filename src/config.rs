use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{DealError, Result};
use crate::interest::DayCountConvention;
use crate::types::{AssetRef, DealId, ExcessFundingPolicy, OperationMode, TopicId};

/// trade deal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealConfig {
    /// pin an id; one is allocated when absent
    pub deal_id: Option<DealId>,
    pub name: String,
    pub symbol: String,
    pub interest_rate_bps: u32,
    /// collateral tokens minted per unit of funding
    pub collateral_to_interest_ratio: Decimal,
    /// fraction of distributed interest credited to the interest pool
    pub interest_pool_share: Rate,
    pub funding_target: Money,
    pub required_topics: BTreeSet<TopicId>,
    pub collateral_token: AssetRef,
    pub interest_token: AssetRef,
    pub funding_asset: AssetRef,
    pub operation_mode: OperationMode,
    pub excess_funding_policy: ExcessFundingPolicy,
    pub day_count_convention: DayCountConvention,
}

impl DealConfig {
    /// start a config with the fields every deal needs
    pub fn builder(
        name: impl Into<String>,
        symbol: impl Into<String>,
        funding_target: Money,
    ) -> DealConfigBuilder {
        DealConfigBuilder::new(name.into(), symbol.into(), funding_target)
    }

    /// invoice financing preset: invoice-backed funding, 70% of interest to the interest pool
    pub fn invoice_financing(
        name: impl Into<String>,
        symbol: impl Into<String>,
        funding_target: Money,
        interest_rate_bps: u32,
        funding_asset: AssetRef,
    ) -> Self {
        let symbol = symbol.into();
        Self::builder(name, symbol.clone(), funding_target)
            .interest_rate_bps(interest_rate_bps)
            .ratio(Decimal::ONE)
            .interest_pool_share(Rate::from_percentage(70))
            .collateral_token(AssetRef::new(format!("{}-CT", symbol)))
            .interest_token(AssetRef::new(format!("{}-IT", symbol)))
            .funding_asset(funding_asset)
            .operation_mode(OperationMode::InvoiceBacked)
            .build()
    }

    pub fn interest_rate(&self) -> Rate {
        Rate::from_bps(self.interest_rate_bps)
    }

    /// check field-level invariants
    pub fn validate(&self, deal_id: DealId) -> Result<()> {
        let invalid = |message: &str| DealError::InvalidConfiguration {
            deal_id,
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if self.collateral_to_interest_ratio <= Decimal::ZERO {
            return Err(invalid("collateral to interest ratio must be positive"));
        }
        if self.interest_pool_share < Rate::ZERO || self.interest_pool_share > Rate::ONE {
            return Err(invalid("interest pool share must be within 0..=1"));
        }
        if !self.funding_target.is_positive() {
            return Err(invalid("funding target must be positive"));
        }
        if self.collateral_token == self.interest_token
            || self.collateral_token == self.funding_asset
            || self.interest_token == self.funding_asset
        {
            return Err(invalid("token and asset references must be distinct"));
        }
        Ok(())
    }

    /// references custody has to resolve
    pub fn asset_refs(&self) -> [&AssetRef; 3] {
        [&self.collateral_token, &self.interest_token, &self.funding_asset]
    }

    /// overwrite the mutable fields from `update`
    ///
    /// Immutable fields may be repeated unchanged; a differing value fails.
    /// The funding target is frozen once the deal is funded.
    pub fn merge_update(&mut self, update: &DealConfig, deal_id: DealId, is_funded: bool) -> Result<()> {
        update.validate(deal_id)?;

        let frozen = |field: &str| {
            DealError::invalid_state(deal_id, format!("{} changed", field), format!("{} unchanged", field))
        };
        if update.deal_id.is_some_and(|id| id != deal_id) {
            return Err(frozen("deal id"));
        }
        if update.collateral_token != self.collateral_token
            || update.interest_token != self.interest_token
            || update.funding_asset != self.funding_asset
        {
            return Err(frozen("asset references"));
        }
        if update.operation_mode != self.operation_mode {
            return Err(frozen("operation mode"));
        }
        if update.collateral_to_interest_ratio != self.collateral_to_interest_ratio {
            return Err(frozen("collateral to interest ratio"));
        }
        if is_funded && update.funding_target != self.funding_target {
            return Err(DealError::invalid_state(deal_id, "funded", "unfunded to change funding target"));
        }

        self.name = update.name.clone();
        self.symbol = update.symbol.clone();
        self.interest_rate_bps = update.interest_rate_bps;
        self.interest_pool_share = update.interest_pool_share;
        self.funding_target = update.funding_target;
        self.required_topics = update.required_topics.clone();
        self.excess_funding_policy = update.excess_funding_policy;
        self.day_count_convention = update.day_count_convention;
        Ok(())
    }
}

/// builder for deal configurations
pub struct DealConfigBuilder {
    config: DealConfig,
}

impl DealConfigBuilder {
    fn new(name: String, symbol: String, funding_target: Money) -> Self {
        let collateral_token = AssetRef::new(format!("{}-CT", symbol));
        let interest_token = AssetRef::new(format!("{}-IT", symbol));
        Self {
            config: DealConfig {
                deal_id: None,
                name,
                symbol,
                interest_rate_bps: 0,
                collateral_to_interest_ratio: Decimal::ONE,
                interest_pool_share: Rate::ONE,
                funding_target,
                required_topics: BTreeSet::new(),
                collateral_token,
                interest_token,
                funding_asset: AssetRef::new("USDC"),
                operation_mode: OperationMode::Standard,
                excess_funding_policy: ExcessFundingPolicy::Accept,
                day_count_convention: DayCountConvention::Actual365,
            },
        }
    }

    pub fn deal_id(mut self, deal_id: DealId) -> Self {
        self.config.deal_id = Some(deal_id);
        self
    }

    pub fn interest_rate_bps(mut self, bps: u32) -> Self {
        self.config.interest_rate_bps = bps;
        self
    }

    pub fn ratio(mut self, ratio: Decimal) -> Self {
        self.config.collateral_to_interest_ratio = ratio;
        self
    }

    pub fn interest_pool_share(mut self, share: Rate) -> Self {
        self.config.interest_pool_share = share;
        self
    }

    pub fn required_topics(mut self, topics: impl IntoIterator<Item = TopicId>) -> Self {
        self.config.required_topics = topics.into_iter().collect();
        self
    }

    pub fn collateral_token(mut self, token: AssetRef) -> Self {
        self.config.collateral_token = token;
        self
    }

    pub fn interest_token(mut self, token: AssetRef) -> Self {
        self.config.interest_token = token;
        self
    }

    pub fn funding_asset(mut self, asset: AssetRef) -> Self {
        self.config.funding_asset = asset;
        self
    }

    pub fn operation_mode(mut self, mode: OperationMode) -> Self {
        self.config.operation_mode = mode;
        self
    }

    pub fn excess_funding_policy(mut self, policy: ExcessFundingPolicy) -> Self {
        self.config.excess_funding_policy = policy;
        self
    }

    pub fn day_count_convention(mut self, convention: DayCountConvention) -> Self {
        self.config.day_count_convention = convention;
        self
    }

    pub fn build(self) -> DealConfig {
        self.config
    }
}
