//! Claim gate workflow
//!
//! Orchestrates the social-verification checks and the claim sequence.
//! Eligibility and claim progress collapse into a single [`GateState`]
//! so that impossible flag combinations (claiming while already claimed,
//! eligible while unverified) cannot be represented.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::poap::{ClaimError, PoapClient};
use crate::store::{ClaimRecord, ClaimStore};
use crate::twitter::{Tweet, TwitterClient, TwitterUser};

/// Session state for one user, as reported to the UI.
///
/// `Submitting` is never produced by the server; the caller holds it
/// while a claim request is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// Username did not resolve; requirements cannot be evaluated
    Unverified,
    Ineligible {
        is_following: bool,
        has_retweeted: bool,
    },
    Eligible,
    Submitting,
    /// A claim already exists; carries the recorded recipient address
    Claimed { address: String },
    Failed { reason: String },
}

impl GateState {
    /// Combine the social checks into an eligibility verdict.
    ///
    /// `has_retweeted` is `None` when no tweet gate is configured, which
    /// satisfies the requirement vacuously.
    pub fn from_checks(is_following: bool, has_retweeted: Option<bool>) -> Self {
        let retweet_met = has_retweeted.unwrap_or(true);
        if is_following && retweet_met {
            GateState::Eligible
        } else {
            GateState::Ineligible {
                is_following,
                has_retweeted: retweet_met,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("You have already claimed this POAP")]
    AlreadyClaimed,
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

pub struct ClaimGate {
    twitter: TwitterClient,
    poap: PoapClient,
    store: ClaimStore,
    follow_username: String,
    tweet_id: Option<String>,
    event_id: String,
}

impl ClaimGate {
    pub fn new(
        twitter: TwitterClient,
        poap: PoapClient,
        store: ClaimStore,
        follow_username: String,
        tweet_id: Option<String>,
    ) -> Self {
        let event_id = poap.event_id().to_string();
        Self {
            twitter,
            poap,
            store,
            follow_username,
            tweet_id,
            event_id,
        }
    }

    pub fn follow_username(&self) -> &str {
        &self.follow_username
    }

    pub fn tweet_id(&self) -> Option<&str> {
        self.tweet_id.as_deref()
    }

    pub fn store_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Tweet behind the retweet gate, for display alongside the steps.
    /// Absent when no tweet gate is configured or the lookup fails.
    pub async fn tweet_context(&self) -> Option<Tweet> {
        let tweet_id = self.tweet_id.as_deref()?;
        self.twitter.get_tweet(tweet_id).await
    }

    /// Resolve a username and evaluate the gate for it
    pub async fn verify(&self, username: &str) -> (Option<TwitterUser>, GateState) {
        match self.twitter.get_user_by_username(username).await {
            Some(user) => {
                let state = self.check_user(&user.id).await;
                (Some(user), state)
            }
            None => (None, GateState::Unverified),
        }
    }

    /// Evaluate the gate for a resolved user id.
    ///
    /// The follow check, the retweet check, and the already-claimed read
    /// are independent and issued concurrently. An existing claim
    /// short-circuits to `Claimed` regardless of the social reads; the
    /// mint step is never offered again.
    pub async fn check_user(&self, user_id: &str) -> GateState {
        let follow = self.twitter.is_following(user_id, &self.follow_username);
        let retweet = async {
            match &self.tweet_id {
                Some(tweet_id) => Some(self.twitter.has_retweeted(user_id, tweet_id).await),
                None => None,
            }
        };
        let claimed = self.store.get_claim(&self.event_id, user_id);

        let (is_following, has_retweeted, existing) = tokio::join!(follow, retweet, claimed);

        if let Some(record) = existing {
            return GateState::Claimed {
                address: record.address,
            };
        }

        GateState::from_checks(is_following, has_retweeted)
    }

    /// Already-claimed lookup for the status endpoint
    pub async fn status(&self, user_id: &str) -> Option<ClaimRecord> {
        self.store.get_claim(&self.event_id, user_id).await
    }

    /// Run the claim sequence for a user.
    ///
    /// The existing-claim pre-check and the final record write are not
    /// atomic: two rapid concurrent submits can both pass the pre-check.
    /// The store is best-effort by contract, so this stays a guard, not
    /// a guarantee.
    pub async fn submit_claim(
        &self,
        address: &str,
        user_id: &str,
        username: &str,
    ) -> Result<(), GateError> {
        if self.store.get_claim(&self.event_id, user_id).await.is_some() {
            return Err(GateError::AlreadyClaimed);
        }

        self.poap.claim(address).await?;

        let record = ClaimRecord {
            address: address.to_string(),
            username: username.to_string(),
            claimed_at: Utc::now(),
        };
        if self.store.is_enabled() {
            self.store
                .record_claim(&self.event_id, user_id, &record)
                .await;
        } else {
            warn!("Claim store disabled; claim for {} not recorded", username);
        }

        info!("POAP claimed by {} for address {}", username, address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Secrets};

    fn test_gate(store: ClaimStore) -> ClaimGate {
        let config = Config::default();
        let secrets = Secrets::default();
        ClaimGate::new(
            TwitterClient::new(None),
            PoapClient::new(&config, &secrets),
            store,
            "poapxyz".to_string(),
            None,
        )
    }

    fn record(address: &str) -> ClaimRecord {
        ClaimRecord {
            address: address.to_string(),
            username: "alice".to_string(),
            claimed_at: Utc::now(),
        }
    }

    #[test]
    fn test_not_following_is_never_eligible() {
        // Retweet status cannot compensate for a missing follow
        assert_eq!(
            GateState::from_checks(false, Some(true)),
            GateState::Ineligible {
                is_following: false,
                has_retweeted: true
            }
        );
        assert_eq!(
            GateState::from_checks(false, None),
            GateState::Ineligible {
                is_following: false,
                has_retweeted: true
            }
        );
    }

    #[test]
    fn test_retweet_vacuously_satisfied_without_tweet() {
        assert_eq!(GateState::from_checks(true, None), GateState::Eligible);
    }

    #[test]
    fn test_both_requirements_needed_when_tweet_configured() {
        assert_eq!(
            GateState::from_checks(true, Some(false)),
            GateState::Ineligible {
                is_following: true,
                has_retweeted: false
            }
        );
        assert_eq!(GateState::from_checks(true, Some(true)), GateState::Eligible);
    }

    #[tokio::test]
    async fn test_existing_claim_rejects_resubmit_before_issuance() {
        let store = ClaimStore::in_memory();
        let event_id = Config::default().event_id();
        store.record_claim(&event_id, "u1", &record("0xABC")).await;

        let gate = test_gate(store);
        // Fails on the pre-check; the issuance client is never reached
        // (its credentials are empty and would error differently).
        let err = gate.submit_claim("0xDEF", "u1", "alice").await.unwrap_err();
        assert!(matches!(err, GateError::AlreadyClaimed));
        assert_eq!(err.to_string(), "You have already claimed this POAP");
    }

    #[tokio::test]
    async fn test_status_reports_recorded_address() {
        let store = ClaimStore::in_memory();
        let event_id = Config::default().event_id();
        store.record_claim(&event_id, "u1", &record("0xAbC123")).await;

        let gate = test_gate(store);
        let found = gate.status("u1").await.unwrap();
        assert_eq!(found.address, "0xAbC123");
        assert!(gate.status("u2").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_never_reports_claimed() {
        let gate = test_gate(ClaimStore::disabled());
        assert!(gate.status("u1").await.is_none());
    }

    #[test]
    fn test_gate_state_serialization() {
        let state = GateState::Claimed {
            address: "0xABC".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "claimed");
        assert_eq!(json["address"], "0xABC");

        let json = serde_json::to_value(GateState::Eligible).unwrap();
        assert_eq!(json["state"], "eligible");
    }
}
