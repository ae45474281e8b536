use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::collateral::{CollateralTokenIssuer, CollateralVault, InvoicePosition};
use crate::config::DealConfig;
use crate::custody::{CustodyInstruction, TokenCustody};
use crate::decimal::{Money, TokenAmount};
use crate::eligibility::{EligibilityOracle, OracleError};
use crate::errors::{DealError, Result};
use crate::events::{Event, EventStore};
use crate::funding::FundingEngine;
use crate::interest::distribution::{DistributionLog, InterestDistributionEngine, InterestDistributionRecord};
use crate::interest::InterestPricer;
use crate::payments::{RedemptionEngine, RepaymentEngine, RepaymentOutcome};
use crate::state::{DealStatus, DebtLedger, FundingLedger, RedemptionLedger};
use crate::types::{DealId, DealPhase, InvoiceItemId, ParticipantId, TopicId};

/// one trade deal: configuration, ledgers and event store
///
/// Every mutating method validates first, makes at most one custody call, and
/// only then writes its ledgers. A failed call leaves the deal untouched.
#[derive(Debug)]
pub struct TradeDeal {
    id: DealId,
    config: DealConfig,
    active: bool,
    created_at: DateTime<Utc>,
    funding: FundingLedger,
    debt: DebtLedger,
    redemption: RedemptionLedger,
    vault: CollateralVault,
    issuer: CollateralTokenIssuer,
    distributions: DistributionLog,
    /// interest credited to the invoice pool across all distributions
    invoice_pool_accrued: Money,
    events: EventStore,
}

impl TradeDeal {
    /// create an inactive deal
    pub fn new(id: DealId, mut config: DealConfig, now: DateTime<Utc>) -> Self {
        config.deal_id = Some(id);
        let mut events = EventStore::new();
        events.emit(Event::DealCreated {
            deal_id: id,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            timestamp: now,
        });

        Self {
            id,
            funding: FundingLedger::new(config.funding_target),
            config,
            active: false,
            created_at: now,
            debt: DebtLedger::new(),
            redemption: RedemptionLedger::default(),
            vault: CollateralVault::new(),
            issuer: CollateralTokenIssuer::new(),
            distributions: DistributionLog::new(),
            invoice_pool_accrued: Money::ZERO,
            events,
        }
    }

    pub fn id(&self) -> DealId {
        self.id
    }

    pub fn config(&self) -> &DealConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn funding(&self) -> &FundingLedger {
        &self.funding
    }

    pub fn debt(&self) -> &DebtLedger {
        &self.debt
    }

    pub fn issuer(&self) -> &CollateralTokenIssuer {
        &self.issuer
    }

    pub fn distributions(&self) -> &[InterestDistributionRecord] {
        self.distributions.records()
    }

    pub fn invoice_items(&self) -> Vec<InvoicePosition> {
        self.vault.positions().cloned().collect()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    pub fn phase(&self) -> DealPhase {
        if self.debt.is_repaid {
            if self.issuer.collateral_supply().is_zero() {
                DealPhase::Closed
            } else {
                DealPhase::Repaid
            }
        } else if self.funding.is_funding_withdrawn {
            DealPhase::FundingWithdrawn
        } else if self.funding.is_funded {
            DealPhase::Funded
        } else {
            DealPhase::Unfunded
        }
    }

    pub fn status(&self) -> DealStatus {
        DealStatus {
            deal_id: self.id,
            name: self.config.name.clone(),
            symbol: self.config.symbol.clone(),
            active: self.active,
            phase: self.phase(),
            created_at: self.created_at,
            funding: self.funding.clone(),
            debt: self.debt.clone(),
            redemption: self.redemption.clone(),
            collateral_supply: self.issuer.collateral_supply(),
            interest_supply: self.issuer.interest_supply(),
            invoices_held: self.vault.held_count(),
            invoices_live: self.vault.live_count(),
            invoice_pool_accrued: self.invoice_pool_accrued,
            distributions: self.distributions.len(),
        }
    }

    fn require_active(&self) -> Result<()> {
        if !self.active {
            return Err(DealError::invalid_state(self.id, "inactive", "active"));
        }
        Ok(())
    }

    /// gate a participant-facing call on the oracle
    pub fn check_eligible(&self, oracle: &dyn EligibilityOracle, participant: &ParticipantId) -> Result<()> {
        match oracle.is_eligible(self.id, participant, &self.config.required_topics) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DealError::Ineligible {
                deal_id: self.id,
                participant: participant.clone(),
            }),
            Err(OracleError::Unreachable(reason)) => {
                warn!("deal {}: eligibility of {} unknown: {}", self.id, participant, reason);
                Err(DealError::EligibilityUnknown {
                    deal_id: self.id,
                    participant: participant.clone(),
                    reason,
                })
            }
        }
    }

    fn execute(&self, custody: &dyn TokenCustody, batch: &[CustodyInstruction]) -> Result<()> {
        custody.execute(batch).map_err(|source| {
            warn!("deal {}: custody rejected batch of {}: {}", self.id, batch.len(), source);
            DealError::Custody {
                deal_id: self.id,
                source,
            }
        })
    }

    /// returns whether the flag changed
    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.events.emit(Event::DealActivated {
            deal_id: self.id,
            timestamp: now,
        });
        info!("deal {} activated", self.id);
        true
    }

    /// returns whether the flag changed
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.events.emit(Event::DealDeactivated {
            deal_id: self.id,
            timestamp: now,
        });
        info!("deal {} deactivated", self.id);
        true
    }

    pub fn update(&mut self, updated_by: &ParticipantId, update: &DealConfig, now: DateTime<Utc>) -> Result<()> {
        if !self.funding.is_funded && update.funding_target < self.funding.current_balance {
            return Err(DealError::invalid_state(
                self.id,
                format!("balance {}", self.funding.current_balance),
                "funding target at or above the current balance",
            ));
        }

        let mut config = self.config.clone();
        config.merge_update(update, self.id, self.funding.is_funded)?;
        self.funding.funding_target = config.funding_target;
        self.config = config;

        self.events.emit(Event::DealUpdated {
            deal_id: self.id,
            updated_by: updated_by.clone(),
            timestamp: now,
        });
        debug!("deal {} updated by {}", self.id, updated_by);
        Ok(())
    }

    pub fn set_required_topics(&mut self, updated_by: &ParticipantId, topics: BTreeSet<TopicId>, now: DateTime<Utc>) {
        self.config.required_topics = topics;
        self.events.emit(Event::DealUpdated {
            deal_id: self.id,
            updated_by: updated_by.clone(),
            timestamp: now,
        });
    }

    pub fn deposit_invoice(
        &mut self,
        oracle: &dyn EligibilityOracle,
        custody: &dyn TokenCustody,
        depositor: &ParticipantId,
        item: &InvoiceItemId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require_active()?;
        self.check_eligible(oracle, depositor)?;
        let instruction = self.vault.plan_deposit(self.id, depositor, item)?;

        self.execute(custody, &[instruction])?;

        self.vault.record_deposit(depositor, item, now);
        self.events.emit(Event::InvoiceDeposited {
            deal_id: self.id,
            item: item.clone(),
            depositor: depositor.clone(),
            timestamp: now,
        });
        debug!("deal {}: invoice {} deposited by {}", self.id, item, depositor);
        Ok(())
    }

    /// return an invoice item to its depositor; an administrator may act for them
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_invoice(
        &mut self,
        oracle: &dyn EligibilityOracle,
        custody: &dyn TokenCustody,
        caller: &ParticipantId,
        caller_is_admin: bool,
        item: &InvoiceItemId,
        now: DateTime<Utc>,
    ) -> Result<ParticipantId> {
        self.require_active()?;
        if !caller_is_admin {
            self.check_eligible(oracle, caller)?;
        }
        let debt_outstanding = self.debt.is_open() && !self.debt.is_repaid;
        let (depositor, instruction) =
            self.vault
                .plan_withdraw(self.id, caller, caller_is_admin, item, debt_outstanding)?;

        self.execute(custody, &[instruction])?;

        self.vault.record_withdraw(item, now);
        self.events.emit(Event::InvoiceWithdrawn {
            deal_id: self.id,
            item: item.clone(),
            returned_to: depositor.clone(),
            timestamp: now,
        });
        debug!("deal {}: invoice {} returned to {}", self.id, item, depositor);
        Ok(depositor)
    }

    /// mark an invoice as consumed by settlement; it stays in escrow
    pub fn settle_invoice(&mut self, item: &InvoiceItemId, now: DateTime<Utc>) -> Result<()> {
        self.vault.check_settle(self.id, item)?;
        self.vault.record_settle(item, now);
        self.events.emit(Event::InvoiceSettled {
            deal_id: self.id,
            item: item.clone(),
            timestamp: now,
        });
        debug!("deal {}: invoice {} settled", self.id, item);
        Ok(())
    }

    pub fn deposit_funding(
        &mut self,
        oracle: &dyn EligibilityOracle,
        custody: &dyn TokenCustody,
        provider: &ParticipantId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<TokenAmount> {
        self.require_active()?;
        self.check_eligible(oracle, provider)?;
        let plan = FundingEngine::plan_deposit(
            self.id,
            &self.config,
            &self.funding,
            &self.issuer,
            self.vault.live_count(),
            provider,
            amount,
        )?;

        self.execute(custody, &plan.instructions)?;

        let outcome = FundingEngine::commit_deposit(&mut self.funding, &mut self.issuer, &plan, now);
        self.events.emit(Event::FundingDeposited {
            deal_id: self.id,
            provider: provider.clone(),
            amount,
            tokens_minted: outcome.tokens_minted,
            new_balance: outcome.new_balance,
            timestamp: now,
        });
        debug!(
            "deal {}: {} deposited {}, minted {}",
            self.id, provider, amount, outcome.tokens_minted
        );

        if outcome.became_funded {
            self.events.emit(Event::DealFullyFunded {
                deal_id: self.id,
                funding_target: self.funding.funding_target,
                balance: outcome.new_balance,
                timestamp: now,
            });
            info!(
                "deal {} fully funded: {} of {}",
                self.id, outcome.new_balance, self.funding.funding_target
            );
        }
        Ok(outcome.tokens_minted)
    }

    pub fn disburse(
        &mut self,
        custody: &dyn TokenCustody,
        borrower: &ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Money> {
        self.require_active()?;
        let plan = FundingEngine::plan_disbursement(self.id, &self.config, &self.funding, borrower)?;

        self.execute(custody, &plan.instructions)?;

        let principal = FundingEngine::commit_disbursement(self.id, &mut self.funding, &mut self.debt, &plan, now);
        self.events.emit(Event::FundingDisbursed {
            deal_id: self.id,
            borrower: borrower.clone(),
            amount: principal,
            timestamp: now,
        });
        Ok(principal)
    }

    pub fn distribute_interest(
        &mut self,
        custody: &dyn TokenCustody,
        pricer: &dyn InterestPricer,
        now: DateTime<Utc>,
    ) -> Result<Option<InterestDistributionRecord>> {
        self.require_active()?;
        if !self.funding.is_funded {
            return Err(DealError::invalid_state(self.id, "unfunded", "funded"));
        }

        let plan = InterestDistributionEngine::plan(
            self.id,
            &self.config,
            &self.debt,
            &self.issuer,
            &self.distributions,
            self.vault.live_count(),
            pricer,
            now,
        )?;
        let Some(plan) = plan else {
            debug!("deal {}: no interest owed", self.id);
            return Ok(None);
        };

        if !plan.instructions.is_empty() {
            self.execute(custody, &plan.instructions)?;
        }

        let record = InterestDistributionEngine::commit(&mut self.debt, &mut self.issuer, &mut self.distributions, plan);
        self.invoice_pool_accrued += record.invoice_pool_share;
        self.events.emit(Event::InterestDistributed {
            deal_id: self.id,
            sequence_number: record.sequence_number,
            total_interest: record.total_interest,
            tokens_minted: record.tokens_minted,
            timestamp: now,
        });
        info!(
            "deal {}: distribution #{} of {} interest",
            self.id, record.sequence_number, record.total_interest
        );
        Ok(Some(record))
    }

    /// accepted whether or not the deal is active
    pub fn repay(
        &mut self,
        custody: &dyn TokenCustody,
        payer: &ParticipantId,
        on_behalf_of: Option<&ParticipantId>,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RepaymentOutcome> {
        let plan = RepaymentEngine::plan(self.id, &self.config, &self.debt, payer, on_behalf_of, amount)?;

        self.execute(custody, &plan.instructions)?;

        let outcome = RepaymentEngine::commit(&mut self.debt, &plan, now);
        self.events.emit(Event::RepaymentReceived {
            deal_id: self.id,
            payer: payer.clone(),
            on_behalf_of: plan.on_behalf_of.clone(),
            amount,
            repaid_total: outcome.repaid_total,
            outstanding: outcome.outstanding,
            timestamp: now,
        });
        debug!("deal {}: {} repaid {}, {} outstanding", self.id, payer, amount, outcome.outstanding);

        if outcome.became_repaid {
            self.events.emit(Event::DealRepaid {
                deal_id: self.id,
                total_debt: self.debt.total_debt,
                timestamp: now,
            });
            info!("deal {} repaid in full: {}", self.id, self.debt.total_debt);
        }
        Ok(outcome)
    }

    pub fn redeem(
        &mut self,
        oracle: &dyn EligibilityOracle,
        custody: &dyn TokenCustody,
        holder: &ParticipantId,
        tokens: TokenAmount,
        now: DateTime<Utc>,
    ) -> Result<Money> {
        // the repaid check comes before eligibility and amount validation
        if !self.debt.is_repaid {
            return Err(DealError::invalid_state(self.id, "debt outstanding", "repaid"));
        }
        self.check_eligible(oracle, holder)?;
        let plan = RedemptionEngine::plan(
            self.id,
            &self.config,
            &self.debt,
            &self.redemption,
            &self.issuer,
            holder,
            tokens,
        )?;

        self.execute(custody, &plan.instructions)?;

        let outcome = RedemptionEngine::commit(&mut self.redemption, &mut self.issuer, &plan);
        self.events.emit(Event::CollateralRedeemed {
            deal_id: self.id,
            holder: holder.clone(),
            tokens_burned: outcome.tokens_burned,
            funds_paid: outcome.funds_paid,
            timestamp: now,
        });
        info!(
            "deal {}: {} redeemed {} tokens for {} at {}",
            self.id, holder, outcome.tokens_burned, outcome.funds_paid, plan.rate
        );
        Ok(outcome.funds_paid)
    }
}
