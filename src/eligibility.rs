use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use thiserror::Error;

use crate::types::{DealId, ParticipantId, TopicId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// the attestation system could not be queried; retry later
    #[error("attestation system unreachable: {0}")]
    Unreachable(String),
}

/// source of participant eligibility for a deal
///
/// A participant is eligible when it holds every topic in `required_topics`.
/// The core never issues or validates the underlying claims.
pub trait EligibilityOracle: Send + Sync {
    fn is_eligible(
        &self,
        deal_id: DealId,
        participant: &ParticipantId,
        required_topics: &BTreeSet<TopicId>,
    ) -> Result<bool, OracleError>;
}

/// in-memory claim registry: participant -> attested topics
#[derive(Debug, Default)]
pub struct ClaimTopicOracle {
    claims: RwLock<HashMap<ParticipantId, BTreeSet<TopicId>>>,
    outage: RwLock<Option<String>>,
}

impl ClaimTopicOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// attest a topic for a participant
    pub fn attest(&self, participant: &ParticipantId, topic: TopicId) {
        if let Ok(mut claims) = self.claims.write() {
            claims.entry(participant.clone()).or_default().insert(topic);
        }
    }

    /// attest several topics at once
    pub fn attest_all(&self, participant: &ParticipantId, topics: impl IntoIterator<Item = TopicId>) {
        for topic in topics {
            self.attest(participant, topic);
        }
    }

    pub fn revoke(&self, participant: &ParticipantId, topic: TopicId) {
        if let Ok(mut claims) = self.claims.write() {
            if let Some(held) = claims.get_mut(participant) {
                held.remove(&topic);
            }
        }
    }

    /// simulate the attestation system going down (`Some`) or recovering (`None`)
    pub fn set_outage(&self, reason: Option<String>) {
        if let Ok(mut outage) = self.outage.write() {
            *outage = reason;
        }
    }
}

impl EligibilityOracle for ClaimTopicOracle {
    fn is_eligible(
        &self,
        _deal_id: DealId,
        participant: &ParticipantId,
        required_topics: &BTreeSet<TopicId>,
    ) -> Result<bool, OracleError> {
        let outage = self
            .outage
            .read()
            .map_err(|_| OracleError::Unreachable("outage flag poisoned".to_string()))?;
        if let Some(reason) = outage.as_ref() {
            return Err(OracleError::Unreachable(reason.clone()));
        }

        let claims = self
            .claims
            .read()
            .map_err(|_| OracleError::Unreachable("claim store poisoned".to_string()))?;
        let held = claims.get(participant);
        Ok(required_topics
            .iter()
            .all(|topic| held.map(|h| h.contains(topic)).unwrap_or(false)))
    }
}
