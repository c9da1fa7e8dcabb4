// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Consent Grant State Machine
//!
//! A grant is only final once two independent signals have been observed:
//!
//! 1. the registry confirms the `grantConsent` transaction, and
//! 2. the registry reports the issued token id via `ConsentGranted`.
//!
//! Either may arrive first. The listener for (2) is registered *before* the
//! transaction is submitted and lives exactly as long as the flow; it is
//! consumed by the first matching event and dropped with the flow on every
//! exit path (success, failure, timeout, cancellation).
//!
//! ```text
//! Idle → Submitting → AwaitingConfirmation ─┬─ (receipt, no token) → AwaitingTokenNotification ─┐
//!                                           └─ (receipt + token) ─────────────────────────────────┴→ Granted
//! any non-terminal state → Failed
//! ```

use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ConsentError;
use super::registry::ConsentRegistry;
use super::types::{ConsentGranted, GrantRequest, IssuedToken, RecordId, TokenId, TxReceipt};

/// Observable state of one grant flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantState {
    Idle,
    Submitting,
    AwaitingConfirmation { tx_hash: String },
    AwaitingTokenNotification { tx_hash: String },
    Granted { token_id: TokenId, tx_hash: String },
    Failed { error: ConsentError },
}

impl GrantState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GrantState::Granted { .. } | GrantState::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            GrantState::Idle => "idle",
            GrantState::Submitting => "submitting",
            GrantState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            GrantState::AwaitingTokenNotification { .. } => "awaiting_token_notification",
            GrantState::Granted { .. } => "granted",
            GrantState::Failed { .. } => "failed",
        }
    }
}

/// One-shot listener for the `ConsentGranted` event of a single grant.
pub struct TokenListener {
    events: broadcast::Receiver<ConsentGranted>,
    record_id: RecordId,
    grantee: Address,
}

/// What [`TokenListener::next`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Token(TokenId),
    /// The receiver fell behind and this many notifications were dropped.
    Lagged(u64),
    Closed,
}

impl TokenListener {
    /// Subscribe to the registry's notifications for `(record_id, grantee)`.
    pub fn register(registry: &dyn ConsentRegistry, record_id: RecordId, grantee: Address) -> Self {
        Self {
            events: registry.subscribe_consent_granted(),
            record_id,
            grantee,
        }
    }

    fn matches(&self, event: &ConsentGranted, tx_hash: &str) -> bool {
        event.record_id == self.record_id
            && event.grantee == self.grantee
            && event
                .tx_hash
                .as_deref()
                .is_none_or(|hash| hash.eq_ignore_ascii_case(tx_hash))
    }

    /// Wait for the next notification relevant to `tx_hash`.
    ///
    /// Cancel safe: events for other grants are discarded either way.
    pub async fn next(&mut self, tx_hash: &str) -> ListenerEvent {
        loop {
            match self.events.recv().await {
                Ok(event) if self.matches(&event, tx_hash) => {
                    return ListenerEvent::Token(event.token_id)
                }
                Ok(event) => {
                    debug!(
                        record_id = %event.record_id,
                        token_id = %event.token_id,
                        "Ignoring ConsentGranted for another grant"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return ListenerEvent::Lagged(skipped)
                }
                Err(broadcast::error::RecvError::Closed) => return ListenerEvent::Closed,
            }
        }
    }

    /// Wait for the token issued by `tx_hash`. Consumes the listener.
    ///
    /// Returns `None` if the notification channel closes first.
    pub async fn next_token(mut self, tx_hash: &str) -> Option<TokenId> {
        loop {
            match self.next(tx_hash).await {
                ListenerEvent::Token(token_id) => return Some(token_id),
                ListenerEvent::Lagged(skipped) => {
                    warn!(skipped, "Token listener lagged behind notifications");
                }
                ListenerEvent::Closed => return None,
            }
        }
    }
}

/// Drive one grant to a terminal state, publishing every transition on
/// `state`. The final state is always `Granted` or `Failed`.
pub async fn run_grant(
    registry: &dyn ConsentRegistry,
    request: &GrantRequest,
    timeout: Duration,
    state: &watch::Sender<GrantState>,
    cancel: &CancellationToken,
) -> Result<IssuedToken, ConsentError> {
    let result = drive(registry, request, timeout, state, cancel).await;

    match &result {
        Ok(issued) => {
            info!(
                record_id = %request.record_id,
                grantee = %request.grantee,
                token_id = %issued.token_id,
                tx_hash = %issued.tx_hash,
                "Consent granted"
            );
            state.send_replace(GrantState::Granted {
                token_id: issued.token_id.clone(),
                tx_hash: issued.tx_hash.clone(),
            });
        }
        Err(error) => {
            warn!(
                record_id = %request.record_id,
                grantee = %request.grantee,
                error = %error,
                "Consent grant failed"
            );
            state.send_replace(GrantState::Failed {
                error: error.clone(),
            });
        }
    }

    result
}

async fn drive(
    registry: &dyn ConsentRegistry,
    request: &GrantRequest,
    timeout: Duration,
    state: &watch::Sender<GrantState>,
    cancel: &CancellationToken,
) -> Result<IssuedToken, ConsentError> {
    state.send_replace(GrantState::Submitting);

    // One deadline covers submission, receipt and notification.
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    // Must exist before submission: the event can be observed before the receipt.
    let mut listener = TokenListener::register(registry, request.record_id, request.grantee);

    let pending = tokio::select! {
        _ = cancel.cancelled() => return Err(ConsentError::Cancelled),
        submitted = registry.grant_consent(request) => {
            submitted.map_err(|e| ConsentError::GrantSubmissionFailed { reason: e.reason() })?
        }
        _ = &mut deadline => {
            return Err(ConsentError::GrantSubmissionFailed {
                reason: format!("grant not submitted within {}s", timeout.as_secs()),
            });
        }
    };

    debug!(tx_hash = %pending.tx_hash, "Grant submitted, awaiting confirmation and token");
    state.send_replace(GrantState::AwaitingConfirmation {
        tx_hash: pending.tx_hash.clone(),
    });

    let confirmation = registry.wait_for_confirmation(&pending);
    tokio::pin!(confirmation);

    let mut receipt: Option<TxReceipt> = None;
    let mut token: Option<TokenId> = None;
    let mut skipped: u64 = 0;

    loop {
        if let (Some(receipt), Some(token)) = (&receipt, &token) {
            return Ok(IssuedToken {
                token_id: token.clone(),
                tx_hash: receipt.tx_hash.clone(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ConsentError::Cancelled),

            confirmed = &mut confirmation, if receipt.is_none() => {
                let confirmed = confirmed
                    .map_err(|e| ConsentError::GrantSubmissionFailed { reason: e.reason() })?;
                if !confirmed.success {
                    return Err(ConsentError::GrantSubmissionFailed {
                        reason: format!("transaction {} reverted", confirmed.tx_hash),
                    });
                }
                debug!(
                    tx_hash = %confirmed.tx_hash,
                    block_number = confirmed.block_number,
                    token_seen = token.is_some(),
                    "Grant confirmed"
                );
                if token.is_none() {
                    state.send_replace(GrantState::AwaitingTokenNotification {
                        tx_hash: confirmed.tx_hash.clone(),
                    });
                }
                receipt = Some(confirmed);
            }

            observed = listener.next(&pending.tx_hash), if token.is_none() => {
                match observed {
                    ListenerEvent::Token(token_id) => {
                        debug!(token_id = %token_id, confirmed = receipt.is_some(), "Token notification observed");
                        token = Some(token_id);
                    }
                    ListenerEvent::Lagged(count) => {
                        warn!(skipped = count, tx_hash = %pending.tx_hash, "Token listener lagged behind notifications");
                        skipped += count;
                    }
                    ListenerEvent::Closed => {
                        return Err(ConsentError::GrantTimedOut {
                            reason: "notification channel closed".to_string(),
                        });
                    }
                }
            }

            _ = &mut deadline => {
                return Err(if receipt.is_some() {
                    let mut reason = format!("no ConsentGranted event within {}s", timeout.as_secs());
                    if skipped > 0 {
                        reason.push_str(&format!(
                            " (listener skipped {skipped} notifications, the token may have been among them)"
                        ));
                    }
                    ConsentError::GrantTimedOut { reason }
                } else {
                    ConsentError::GrantSubmissionFailed {
                        reason: format!(
                            "transaction {} not confirmed within {}s",
                            pending.tx_hash,
                            timeout.as_secs()
                        ),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::memory::{InMemoryRegistry, NotificationTiming, SimulationBehavior};
    use crate::consent::registry::testing::StalledRegistry;
    use crate::consent::types::WrappedKey;
    use alloy::primitives::address;

    const PATIENT: Address = address!("0x1000000000000000000000000000000000000001");
    const DOCTOR: Address = address!("0x2000000000000000000000000000000000000002");

    async fn setup(behavior: SimulationBehavior) -> (InMemoryRegistry, GrantRequest) {
        let registry = InMemoryRegistry::new(PATIENT, behavior);
        let record_id = RecordId::derive("scan1.pdf", 1);
        let tx = registry
            .register_record(record_id, "FAKE_IPFS_CID_FOR_scan1.pdf", "scan1.pdf")
            .await
            .unwrap();
        registry.wait_for_confirmation(&tx).await.unwrap();

        let request = GrantRequest {
            record_id,
            grantee: DOCTOR,
            wrapped_key: WrappedKey::new("K"),
            duration: Duration::from_secs(3600),
        };
        (registry, request)
    }

    /// Run a grant while recording every state the flow publishes.
    async fn run_recording(
        registry: &InMemoryRegistry,
        request: &GrantRequest,
        timeout: Duration,
    ) -> (Result<IssuedToken, ConsentError>, Vec<GrantState>) {
        let (tx, mut rx) = watch::channel(GrantState::Idle);
        let recorder = tokio::spawn(async move {
            let mut seen = vec![rx.borrow().clone()];
            while rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().clone());
            }
            seen
        });

        let result = run_grant(registry, request, timeout, &tx, &CancellationToken::new()).await;
        drop(tx);
        (result, recorder.await.unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn granted_when_notification_follows_confirmation() {
        let (registry, request) = setup(SimulationBehavior {
            notification: NotificationTiming::AfterConfirmation(Duration::from_secs(3)),
            ..SimulationBehavior::default()
        })
        .await;

        let (result, states) = run_recording(&registry, &request, Duration::from_secs(60)).await;

        let issued = result.unwrap();
        assert_eq!(issued.token_id.as_str(), "1");
        let names: Vec<_> = states.iter().map(GrantState::name).collect();
        assert!(names.contains(&"awaiting_token_notification"));
        assert_eq!(names.last(), Some(&"granted"));
    }

    #[tokio::test(start_paused = true)]
    async fn granted_when_notification_precedes_confirmation() {
        let (registry, request) = setup(SimulationBehavior {
            notification: NotificationTiming::BeforeConfirmation(Duration::from_secs(1)),
            ..SimulationBehavior::default()
        })
        .await;

        let (result, states) = run_recording(&registry, &request, Duration::from_secs(60)).await;

        assert_eq!(result.unwrap().token_id.as_str(), "1");
        // Token was already known when the receipt arrived.
        assert!(!states
            .iter()
            .any(|s| matches!(s, GrantState::AwaitingTokenNotification { .. })));
        assert_eq!(states.last().map(GrantState::name), Some("granted"));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_alone_never_reaches_granted() {
        let (registry, request) = setup(SimulationBehavior {
            notification: NotificationTiming::Never,
            ..SimulationBehavior::default()
        })
        .await;

        let (result, states) = run_recording(&registry, &request, Duration::from_secs(30)).await;

        assert!(matches!(result, Err(ConsentError::GrantTimedOut { .. })));
        assert!(!states.iter().any(|s| matches!(s, GrantState::Granted { .. })));
        assert!(matches!(
            states.last(),
            Some(GrantState::Failed {
                error: ConsentError::GrantTimedOut { .. }
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_grant_times_out_as_submission_failure() {
        let (registry, request) = setup(SimulationBehavior {
            confirmation_delay: Duration::from_secs(600),
            notification: NotificationTiming::Never,
            ..SimulationBehavior::default()
        })
        .await;

        let (result, _) = run_recording(&registry, &request, Duration::from_secs(30)).await;

        assert!(matches!(
            result,
            Err(ConsentError::GrantSubmissionFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_fails_with_reason() {
        let (registry, mut request) = setup(SimulationBehavior::default()).await;
        request.record_id = RecordId::derive("unknown.pdf", 2);

        let (result, states) = run_recording(&registry, &request, Duration::from_secs(30)).await;

        assert_eq!(
            result.unwrap_err(),
            ConsentError::GrantSubmissionFailed {
                reason: "Record does not exist".to_string()
            }
        );
        assert_eq!(states.last().map(GrantState::name), Some("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_is_released_after_resolution() {
        let (registry, request) = setup(SimulationBehavior::default()).await;
        assert_eq!(registry.listener_count(), 0);

        let (result, _) = run_recording(&registry, &request, Duration::from_secs(30)).await;
        assert!(result.is_ok());
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_listener_and_fails() {
        let (registry, request) = setup(SimulationBehavior {
            notification: NotificationTiming::Never,
            ..SimulationBehavior::default()
        })
        .await;

        let (tx, rx) = watch::channel(GrantState::Idle);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = run_grant(&registry, &request, Duration::from_secs(60), &tx, &cancel).await;

        assert_eq!(result.unwrap_err(), ConsentError::Cancelled);
        assert_eq!(
            *rx.borrow(),
            GrantState::Failed {
                error: ConsentError::Cancelled
            }
        );
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn listener_ignores_events_for_other_grants() {
        let (registry, request) = setup(SimulationBehavior::default()).await;
        let listener = TokenListener::register(&registry, request.record_id, request.grantee);

        let other = ConsentGranted {
            record_id: RecordId::derive("other.pdf", 9),
            grantee: DOCTOR,
            token_id: TokenId::from(99u64),
            tx_hash: None,
        };
        let same_record_other_tx = ConsentGranted {
            record_id: request.record_id,
            grantee: DOCTOR,
            token_id: TokenId::from(98u64),
            tx_hash: Some("0xdead".into()),
        };
        let ours = ConsentGranted {
            record_id: request.record_id,
            grantee: DOCTOR,
            token_id: TokenId::from(17u64),
            tx_hash: Some("0xBEEF".into()),
        };
        registry.emit(other);
        registry.emit(same_record_other_tx);
        registry.emit(ours);

        assert_eq!(listener.next_token("0xbeef").await, Some(TokenId::from(17u64)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_submission_fails_at_deadline() {
        let registry = StalledRegistry::new(PATIENT);
        let request = GrantRequest {
            record_id: RecordId::derive("scan1.pdf", 1),
            grantee: DOCTOR,
            wrapped_key: WrappedKey::new("K"),
            duration: Duration::from_secs(3600),
        };
        let (tx, rx) = watch::channel(GrantState::Idle);

        let result = tokio::time::timeout(
            Duration::from_secs(3600),
            run_grant(
                &registry,
                &request,
                Duration::from_secs(30),
                &tx,
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("grant flow outlived its deadline");

        let Err(ConsentError::GrantSubmissionFailed { reason }) = result else {
            panic!("expected a submission failure, got {result:?}");
        };
        assert!(reason.contains("not submitted within 30s"));
        assert_eq!(rx.borrow().name(), "failed");
        assert_eq!(registry.events.receiver_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_listener_reports_skipped_notifications() {
        let (registry, request) = setup(SimulationBehavior {
            notification: NotificationTiming::Never,
            ..SimulationBehavior::default()
        })
        .await;

        // Overflow the listener after the receipt has arrived.
        let flood = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            for n in 0..100u64 {
                registry.emit(ConsentGranted {
                    record_id: RecordId::derive("other.pdf", 9),
                    grantee: DOCTOR,
                    token_id: TokenId::from(1_000 + n),
                    tx_hash: None,
                });
            }
        };
        let (tx, _rx) = watch::channel(GrantState::Idle);
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(
            run_grant(&registry, &request, Duration::from_secs(30), &tx, &cancel),
            flood
        );

        let Err(ConsentError::GrantTimedOut { reason }) = result else {
            panic!("expected a timeout, got {result:?}");
        };
        assert!(reason.contains("skipped 36 notifications"), "{reason}");
    }

    #[tokio::test]
    async fn listener_reports_lag_and_closure() {
        let registry = InMemoryRegistry::new(PATIENT, SimulationBehavior::default());
        let record_id = RecordId::derive("scan1.pdf", 1);
        let mut listener = TokenListener::register(&registry, record_id, DOCTOR);

        for n in 0..65u64 {
            registry.emit(ConsentGranted {
                record_id,
                grantee: DOCTOR,
                token_id: TokenId::from(n),
                tx_hash: None,
            });
        }
        assert_eq!(listener.next("0x01").await, ListenerEvent::Lagged(1));
        assert_eq!(
            listener.next("0x01").await,
            ListenerEvent::Token(TokenId::from(1u64))
        );

        let (events, _) = broadcast::channel::<ConsentGranted>(1);
        let mut orphan = TokenListener {
            events: events.subscribe(),
            record_id,
            grantee: DOCTOR,
        };
        drop(events);
        assert_eq!(orphan.next("0x01").await, ListenerEvent::Closed);
    }

    #[test]
    fn terminal_states() {
        assert!(!GrantState::Idle.is_terminal());
        assert!(!GrantState::AwaitingConfirmation { tx_hash: "0x1".into() }.is_terminal());
        assert!(GrantState::Failed {
            error: ConsentError::Cancelled
        }
        .is_terminal());
    }
}
