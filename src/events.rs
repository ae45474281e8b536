use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, TokenAmount};
use crate::types::{DealId, InvoiceItemId, ParticipantId};

/// all events that can be emitted by a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    DealCreated {
        deal_id: DealId,
        name: String,
        symbol: String,
        timestamp: DateTime<Utc>,
    },
    DealUpdated {
        deal_id: DealId,
        updated_by: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    DealActivated {
        deal_id: DealId,
        timestamp: DateTime<Utc>,
    },
    DealDeactivated {
        deal_id: DealId,
        timestamp: DateTime<Utc>,
    },

    // collateral events
    InvoiceDeposited {
        deal_id: DealId,
        item: InvoiceItemId,
        depositor: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    InvoiceWithdrawn {
        deal_id: DealId,
        item: InvoiceItemId,
        returned_to: ParticipantId,
        timestamp: DateTime<Utc>,
    },
    InvoiceSettled {
        deal_id: DealId,
        item: InvoiceItemId,
        timestamp: DateTime<Utc>,
    },

    // funding events
    FundingDeposited {
        deal_id: DealId,
        provider: ParticipantId,
        amount: Money,
        tokens_minted: TokenAmount,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },
    DealFullyFunded {
        deal_id: DealId,
        funding_target: Money,
        balance: Money,
        timestamp: DateTime<Utc>,
    },
    FundingDisbursed {
        deal_id: DealId,
        borrower: ParticipantId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // interest events
    InterestDistributed {
        deal_id: DealId,
        sequence_number: u64,
        total_interest: Money,
        tokens_minted: TokenAmount,
        timestamp: DateTime<Utc>,
    },

    // repayment events
    RepaymentReceived {
        deal_id: DealId,
        payer: ParticipantId,
        on_behalf_of: Option<ParticipantId>,
        amount: Money,
        repaid_total: Money,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },
    DealRepaid {
        deal_id: DealId,
        total_debt: Money,
        timestamp: DateTime<Utc>,
    },

    // redemption events
    CollateralRedeemed {
        deal_id: DealId,
        holder: ParticipantId,
        tokens_burned: TokenAmount,
        funds_paid: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
