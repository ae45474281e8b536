use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use log::{debug, info};
use uuid::Uuid;

use crate::collateral::InvoicePosition;
use crate::config::DealConfig;
use crate::custody::TokenCustody;
use crate::deal::TradeDeal;
use crate::decimal::{Money, TokenAmount};
use crate::eligibility::{EligibilityOracle, OracleError};
use crate::errors::{DealError, Result};
use crate::events::Event;
use crate::interest::{DayCountPricer, InterestDistributionRecord, InterestPricer};
use crate::payments::RepaymentOutcome;
use crate::state::DealStatus;
use crate::types::{DealId, InvoiceItemId, ParticipantId, TopicId};

#[derive(Default)]
struct DealMap {
    by_id: HashMap<DealId, Arc<Mutex<TradeDeal>>>,
    /// creation order
    order: Vec<DealId>,
}

/// keyed store of trade deals and the entry point for every operation
///
/// The map lock is only held to find or insert a deal; each deal has its own
/// mutex, so operations on different deals never wait on each other.
pub struct TradeDealRegistry {
    deals: RwLock<DealMap>,
    administrators: RwLock<BTreeSet<ParticipantId>>,
    oracle: Arc<dyn EligibilityOracle>,
    custody: Arc<dyn TokenCustody>,
    pricer: Arc<dyn InterestPricer>,
    time: SafeTimeProvider,
}

impl TradeDealRegistry {
    /// create a registry with one administrator and the day-count pricer
    pub fn new(
        administrator: ParticipantId,
        oracle: Arc<dyn EligibilityOracle>,
        custody: Arc<dyn TokenCustody>,
        time: SafeTimeProvider,
    ) -> Self {
        Self {
            deals: RwLock::new(DealMap::default()),
            administrators: RwLock::new([administrator].into_iter().collect()),
            oracle,
            custody,
            pricer: Arc::new(DayCountPricer),
            time,
        }
    }

    /// replace the interest pricer
    pub fn with_pricer(mut self, pricer: Arc<dyn InterestPricer>) -> Self {
        self.pricer = pricer;
        self
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    // administrators

    pub fn is_administrator(&self, participant: &ParticipantId) -> Result<bool> {
        let admins = self
            .administrators
            .read()
            .map_err(|_| DealError::LockPoisoned { deal_id: None })?;
        Ok(admins.contains(participant))
    }

    pub fn add_administrator(&self, caller: &ParticipantId, new_admin: ParticipantId) -> Result<bool> {
        self.require_admin(caller, None, "add administrators")?;
        let mut admins = self
            .administrators
            .write()
            .map_err(|_| DealError::LockPoisoned { deal_id: None })?;
        let added = admins.insert(new_admin.clone());
        if added {
            info!("{} granted administrator by {}", new_admin, caller);
        }
        Ok(added)
    }

    fn require_admin(&self, caller: &ParticipantId, deal_id: Option<DealId>, action: &'static str) -> Result<()> {
        if !self.is_administrator(caller)? {
            return Err(DealError::Unauthorized {
                deal_id,
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    // deal store

    fn deal(&self, deal_id: DealId) -> Result<Arc<Mutex<TradeDeal>>> {
        let deals = self
            .deals
            .read()
            .map_err(|_| DealError::LockPoisoned { deal_id: Some(deal_id) })?;
        deals
            .by_id
            .get(&deal_id)
            .cloned()
            .ok_or(DealError::NotFound { deal_id })
    }

    /// run `f` under the deal's exclusive lock
    fn with_deal<T>(&self, deal_id: DealId, f: impl FnOnce(&mut TradeDeal) -> Result<T>) -> Result<T> {
        self.with_deal_at(deal_id, |deal, _| f(deal))
    }

    /// like `with_deal`, passing the clock as read once the lock is held
    ///
    /// Timestamps therefore follow the order in which calls acquire the deal.
    fn with_deal_at<T>(
        &self,
        deal_id: DealId,
        f: impl FnOnce(&mut TradeDeal, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let handle = self.deal(deal_id)?;
        let mut deal = handle
            .lock()
            .map_err(|_| DealError::LockPoisoned { deal_id: Some(deal_id) })?;
        let now = self.now();
        f(&mut *deal, now)
    }

    pub fn create_deal(&self, caller: &ParticipantId, config: DealConfig) -> Result<DealId> {
        let deal_id = config.deal_id.unwrap_or_else(Uuid::new_v4);
        self.require_admin(caller, Some(deal_id), "create deals")?;
        config.validate(deal_id)?;
        if let Some(missing) = config.asset_refs().into_iter().find(|r| !self.custody.resolves(r)) {
            return Err(DealError::InvalidConfiguration {
                deal_id,
                message: format!("custody cannot resolve {}", missing),
            });
        }

        let mut deals = self
            .deals
            .write()
            .map_err(|_| DealError::LockPoisoned { deal_id: Some(deal_id) })?;
        if deals.by_id.contains_key(&deal_id) {
            return Err(DealError::DealAlreadyExists { deal_id });
        }

        let deal = TradeDeal::new(deal_id, config, self.now());
        info!("deal {} created: {} ({})", deal_id, deal.config().name, deal.config().symbol);
        deals.by_id.insert(deal_id, Arc::new(Mutex::new(deal)));
        deals.order.push(deal_id);
        Ok(deal_id)
    }

    pub fn update_deal(&self, caller: &ParticipantId, deal_id: DealId, config: &DealConfig) -> Result<()> {
        self.require_admin(caller, Some(deal_id), "update deals")?;
        self.with_deal_at(deal_id, |deal, now| deal.update(caller, config, now))
    }

    /// no-op when already active; returns whether the flag changed
    pub fn activate_deal(&self, caller: &ParticipantId, deal_id: DealId) -> Result<bool> {
        self.require_admin(caller, Some(deal_id), "activate deals")?;
        self.with_deal_at(deal_id, |deal, now| Ok(deal.activate(now)))
    }

    /// no-op when already inactive; returns whether the flag changed
    pub fn deactivate_deal(&self, caller: &ParticipantId, deal_id: DealId) -> Result<bool> {
        self.require_admin(caller, Some(deal_id), "deactivate deals")?;
        self.with_deal_at(deal_id, |deal, now| Ok(deal.deactivate(now)))
    }

    /// deal ids in creation order
    pub fn list_deal_ids(&self) -> Result<Vec<DealId>> {
        let deals = self.deals.read().map_err(|_| DealError::LockPoisoned { deal_id: None })?;
        Ok(deals.order.clone())
    }

    pub fn get_all_deal_ids(&self) -> Result<Vec<DealId>> {
        self.list_deal_ids()
    }

    pub fn get_config(&self, deal_id: DealId) -> Result<DealConfig> {
        self.with_deal(deal_id, |deal| Ok(deal.config().clone()))
    }

    pub fn get_full_status(&self, deal_id: DealId) -> Result<DealStatus> {
        self.with_deal(deal_id, |deal| Ok(deal.status()))
    }

    pub fn status_json(&self, deal_id: DealId) -> Result<String> {
        self.get_full_status(deal_id)?
            .to_json()
            .map_err(|e| DealError::Serialization {
                deal_id,
                message: e.to_string(),
            })
    }

    /// whether `participant` currently holds every topic the deal requires
    pub fn is_participant(&self, deal_id: DealId, participant: &ParticipantId) -> Result<bool> {
        let topics = self.get_required_topics(deal_id)?;
        match self.oracle.is_eligible(deal_id, participant, &topics) {
            Ok(eligible) => Ok(eligible),
            Err(OracleError::Unreachable(reason)) => Err(DealError::EligibilityUnknown {
                deal_id,
                participant: participant.clone(),
                reason,
            }),
        }
    }

    pub fn get_required_topics(&self, deal_id: DealId) -> Result<BTreeSet<TopicId>> {
        self.with_deal(deal_id, |deal| Ok(deal.config().required_topics.clone()))
    }

    pub fn set_required_topics(
        &self,
        caller: &ParticipantId,
        deal_id: DealId,
        topics: impl IntoIterator<Item = TopicId>,
    ) -> Result<()> {
        self.require_admin(caller, Some(deal_id), "set required topics")?;
        let topics: BTreeSet<TopicId> = topics.into_iter().collect();
        self.with_deal_at(deal_id, |deal, now| {
            deal.set_required_topics(caller, topics, now);
            Ok(())
        })
    }

    // collateral

    pub fn deposit_invoice(&self, deal_id: DealId, depositor: &ParticipantId, item: &InvoiceItemId) -> Result<()> {
        self.with_deal_at(deal_id, |deal, now| {
            deal.deposit_invoice(self.oracle.as_ref(), self.custody.as_ref(), depositor, item, now)
        })
    }

    /// returns the depositor the item went back to
    pub fn withdraw_invoice(
        &self,
        deal_id: DealId,
        caller: &ParticipantId,
        item: &InvoiceItemId,
    ) -> Result<ParticipantId> {
        let is_admin = self.is_administrator(caller)?;
        self.with_deal_at(deal_id, |deal, now| {
            deal.withdraw_invoice(self.oracle.as_ref(), self.custody.as_ref(), caller, is_admin, item, now)
        })
    }

    pub fn settle_invoice(&self, caller: &ParticipantId, deal_id: DealId, item: &InvoiceItemId) -> Result<()> {
        self.require_admin(caller, Some(deal_id), "settle invoices")?;
        self.with_deal_at(deal_id, |deal, now| deal.settle_invoice(item, now))
    }

    pub fn invoice_items(&self, deal_id: DealId) -> Result<Vec<InvoicePosition>> {
        self.with_deal(deal_id, |deal| Ok(deal.invoice_items()))
    }

    // funding

    /// returns the collateral tokens minted to `provider`
    pub fn deposit_funding(&self, deal_id: DealId, provider: &ParticipantId, amount: Money) -> Result<TokenAmount> {
        self.with_deal_at(deal_id, |deal, now| {
            deal.deposit_funding(self.oracle.as_ref(), self.custody.as_ref(), provider, amount, now)
        })
    }

    /// hand the escrowed funding to the borrower; returns the principal
    pub fn withdraw_funding_for_borrower(
        &self,
        caller: &ParticipantId,
        deal_id: DealId,
        borrower: &ParticipantId,
    ) -> Result<Money> {
        self.require_admin(caller, Some(deal_id), "disburse funding")?;
        self.with_deal_at(deal_id, |deal, now| deal.disburse(self.custody.as_ref(), borrower, now))
    }

    // interest

    /// `None` when no interest is owed for the period
    pub fn distribute_interest(
        &self,
        caller: &ParticipantId,
        deal_id: DealId,
    ) -> Result<Option<InterestDistributionRecord>> {
        self.require_admin(caller, Some(deal_id), "distribute interest")?;
        self.with_deal_at(deal_id, |deal, now| {
            deal.distribute_interest(self.custody.as_ref(), self.pricer.as_ref(), now)
        })
    }

    pub fn distribution_history(&self, deal_id: DealId) -> Result<Vec<InterestDistributionRecord>> {
        self.with_deal(deal_id, |deal| Ok(deal.distributions().to_vec()))
    }

    // repayment and redemption

    pub fn repay(&self, deal_id: DealId, payer: &ParticipantId, amount: Money) -> Result<RepaymentOutcome> {
        self.with_deal_at(deal_id, |deal, now| deal.repay(self.custody.as_ref(), payer, None, amount, now))
    }

    /// administrator pays from its own account on the borrower's behalf
    pub fn repay_for_borrower(
        &self,
        caller: &ParticipantId,
        deal_id: DealId,
        borrower: &ParticipantId,
        amount: Money,
    ) -> Result<RepaymentOutcome> {
        self.require_admin(caller, Some(deal_id), "repay for a borrower")?;
        self.with_deal_at(deal_id, |deal, now| {
            deal.repay(self.custody.as_ref(), caller, Some(borrower), amount, now)
        })
    }

    /// burn `tokens` of the holder's collateral balance; returns the funds paid out
    pub fn redeem_collateral_tokens(
        &self,
        deal_id: DealId,
        holder: &ParticipantId,
        tokens: TokenAmount,
    ) -> Result<Money> {
        self.with_deal_at(deal_id, |deal, now| {
            deal.redeem(self.oracle.as_ref(), self.custody.as_ref(), holder, tokens, now)
        })
    }

    // balances and events

    pub fn collateral_balance(&self, deal_id: DealId, holder: &ParticipantId) -> Result<TokenAmount> {
        self.with_deal(deal_id, |deal| Ok(deal.issuer().collateral_balance(holder)))
    }

    pub fn interest_balance(&self, deal_id: DealId, holder: &ParticipantId) -> Result<TokenAmount> {
        self.with_deal(deal_id, |deal| Ok(deal.issuer().interest_balance(holder)))
    }

    /// drain the deal's pending events
    pub fn take_events(&self, deal_id: DealId) -> Result<Vec<Event>> {
        self.with_deal(deal_id, |deal| {
            let events = deal.take_events();
            debug!("deal {}: drained {} events", deal_id, events.len());
            Ok(events)
        })
    }
}
