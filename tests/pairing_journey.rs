//! Pairing journeys from the caller's perspective.
//!
//! The platform is the scripted mock in `common`; the clock is paused so the
//! pipeline's real delays (settle, polling, retry, grace) run unchanged.
//!
//! Run: `cargo test --test pairing_journey`

mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{MockBehavior, PAIRING_CODE, SELF_CHAT, harness, harness_with, wait_until};
use pairlink::pairing::{PairingAttempt, PlatformSessionState};

async fn wait_terminal(attempt: &PairingAttempt) {
    attempt
        .subscribe_state()
        .wait_for(|state| *state == PlatformSessionState::ClosedTerminal)
        .await
        .unwrap();
}

fn assert_between(elapsed: Duration, low: u64, high: u64) {
    assert!(
        elapsed >= Duration::from_secs(low) && elapsed < Duration::from_secs(high),
        "elapsed {:?}, expected between {}s and {}s",
        elapsed,
        low,
        high
    );
}

// ============================================================================
// 1. Happy path
// ============================================================================
mod happy_path {
    use pairlink::platform::OutgoingMessage;
    use pairlink::session::unpack;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_code_then_delivery_then_teardown() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;

        let code = rx.await.unwrap().unwrap();
        assert_eq!(code, PAIRING_CODE);
        assert_eq!(control.session.pairing_calls(), 1);

        let opened_at = Instant::now();
        control.open();

        // Fourth poll happens 74s after open; land the credentials just before.
        tokio::time::sleep(Duration::from_secs(73)).await;
        let creds: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        control.push_credentials(&creds);

        wait_terminal(&attempt).await;

        let sent = control.session.sent();
        assert_eq!(sent.len(), 1);
        let (jid, message, sent_at) = &sent[0];
        assert_eq!(jid, SELF_CHAT);
        // poll 4 at +74s, then the 5s pre-send wait
        assert_between(*sent_at - opened_at, 79, 80);

        let OutgoingMessage::Interactive(interactive) = message else {
            panic!("expected an interactive message, got {:?}", message);
        };
        assert!(interactive.text.starts_with("Buddy~"));
        assert_eq!(unpack(&interactive.text).unwrap(), creds);
        assert_eq!(
            interactive.buttons[0].copy_code().as_deref(),
            Some(interactive.text.as_str())
        );

        // Teardown: 3s settle plus the 10 minute grace period.
        assert!(opened_at.elapsed() >= Duration::from_secs(79 + 3 + 600));
        assert_eq!(control.session.closes(), 1);
        assert!(attempt.is_delivered());
        assert!(attempt.is_cleaned_up());
        assert!(h.store.session_ids().await.is_empty());
        assert_eq!(h.connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_options_carry_identity_and_timeouts() {
        let h = harness(MockBehavior::default());
        let (attempt, _rx) = h.service.start("+1 555 123 4567").unwrap();
        let control = h.connector.next_session().await;

        assert_eq!(&control.options.session_id, attempt.session_id());
        assert!(control.options.auth.is_empty());
        assert_eq!(control.options.connect_timeout, Duration::from_secs(60));
        assert_eq!(control.options.keep_alive_interval, Duration::from_secs(30));
    }
}

// ============================================================================
// 2. Disconnects
// ============================================================================
mod disconnects {
    use pairlink::store::CREDENTIALS_KEY;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_logout_is_terminal() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        assert_eq!(rx.await.unwrap().unwrap(), PAIRING_CODE);

        control.close(401);
        wait_terminal(&attempt).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.connects(), 1);
        assert!(attempt.is_cleaned_up());
        assert!(h.store.session_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_required_reconnects_with_persisted_auth() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let first = h.connector.next_session().await;
        assert_eq!(rx.await.unwrap().unwrap(), PAIRING_CODE);

        let partial = br#"{"registered":true}"#;
        first.push_credentials(partial);
        let closed_at = Instant::now();
        first.close(515);

        let second = h.connector.next_session().await;
        assert_between(closed_at.elapsed(), 5, 6);
        assert_eq!(h.connector.connects(), 2);
        assert_eq!(second.options.session_id, first.options.session_id);
        assert_eq!(
            second.options.auth.get(CREDENTIALS_KEY).map(Vec::as_slice),
            Some(&partial[..])
        );
        assert!(!attempt.is_cleaned_up());
        assert_ne!(attempt.state(), PlatformSessionState::ClosedTerminal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_limit_ends_attempt() {
        let h = harness_with(MockBehavior::default(), |m| m.with_max_reconnects(Some(1)));
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let first = h.connector.next_session().await;
        assert_eq!(rx.await.unwrap().unwrap(), PAIRING_CODE);

        first.close(515);
        let second = h.connector.next_session().await;
        second.close(428);

        wait_terminal(&attempt).await;
        assert_eq!(h.connector.connects(), 2);
        assert!(h.store.session_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_delivery_reconnects_until_grace_ends() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let first = h.connector.next_session().await;
        rx.await.unwrap().unwrap();

        first.push_credentials(&[7u8; 300]);
        first.open();
        let session = first.session.clone();
        wait_until(|| session.sent().len() == 1).await;
        let delivered_at = session.sent()[0].2;

        tokio::time::sleep(Duration::from_secs(60)).await;
        let closed_at = Instant::now();
        first.close(428);

        let second = h.connector.next_session().await;
        assert_between(closed_at.elapsed(), 5, 6);
        assert_eq!(h.connector.connects(), 2);
        assert_eq!(
            second.options.auth.get(CREDENTIALS_KEY).map(Vec::as_slice),
            Some(&[7u8; 300][..])
        );
        assert!(!attempt.is_cleaned_up());

        second.open();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(second.session.pairing_calls(), 0);
        assert!(second.session.sent().is_empty());
        assert_eq!(first.session.sent().len(), 1);
        assert!(!h.store.session_ids().await.is_empty());

        // The teardown armed after the first delivery closes the new session.
        wait_terminal(&attempt).await;
        assert_between(delivered_at.elapsed(), 603, 604);
        assert_eq!(second.session.closes(), 1);
        assert_eq!(first.session.closes(), 0);
        assert!(attempt.is_cleaned_up());
        assert!(h.store.session_ids().await.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_after_delivery_ends_attempt_once() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        rx.await.unwrap().unwrap();

        control.push_credentials(&[7u8; 300]);
        control.open();
        let session = control.session.clone();
        wait_until(|| session.sent().len() == 1).await;

        control.close(401);
        wait_terminal(&attempt).await;
        assert!(attempt.is_cleaned_up());
        assert!(h.store.session_ids().await.is_empty());

        // The disarmed teardown never fires and nothing reconnects.
        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(control.session.closes(), 0);
        assert_eq!(h.connector.connects(), 1);
    }
}

// ============================================================================
// 3. Failures
// ============================================================================
mod failures {
    use pairlink::error::PairingError;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failing_send_gives_up_after_five_attempts() {
        let h = harness(MockBehavior {
            fail_sends: true,
            ..MockBehavior::default()
        });
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        rx.await.unwrap().unwrap();

        control.push_credentials(&[1u8; 300]);
        control.open();
        wait_terminal(&attempt).await;

        let sent = control.session.sent();
        assert_eq!(sent.len(), 5);
        for pair in sent.windows(2) {
            assert!(pair[1].2 - pair[0].2 >= Duration::from_secs(3));
        }
        assert!(sent[4].2 - sent[0].2 >= Duration::from_secs(12));
        assert!(!attempt.is_delivered());
        assert!(attempt.is_cleaned_up());
        assert_eq!(control.session.closes(), 1);
        assert!(h.store.session_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_never_arrive() {
        let h = harness(MockBehavior::default());
        let (attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        rx.await.unwrap().unwrap();

        let opened_at = Instant::now();
        control.open();
        // Too small to count.
        control.push_credentials(&[0u8; 100]);
        wait_terminal(&attempt).await;

        // 50s settle plus 15 polls 8s apart.
        assert_between(opened_at.elapsed(), 50 + 15 * 8, 50 + 15 * 8 + 1);
        assert!(control.session.sent().is_empty());
        assert!(attempt.is_cleaned_up());
        assert!(h.store.session_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connection_answers_unavailable() {
        let h = harness(MockBehavior {
            refuse_connect: true,
            ..MockBehavior::default()
        });
        let err = h.service.request_pairing("15551234567").await.unwrap_err();
        assert!(matches!(err, PairingError::ServiceUnavailable { .. }));
        assert_eq!(err.public_message(), "Service is Currently Unavailable");
    }
}

// ============================================================================
// 4. Extras on open
// ============================================================================
mod on_open {
    use pairlink::platform::{IncomingMessage, OutgoingMessage};
    use pairlink::session::InviteCode;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bot_answers_direct_messages() {
        let h = harness(MockBehavior::default());
        let (_attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        rx.await.unwrap().unwrap();
        control.open();

        control.push_message(IncomingMessage {
            id: "M1".to_string(),
            from: "15550000000@s.whatsapp.net".to_string(),
            from_me: false,
            text: Some(".ping".to_string()),
        });
        let session = control.session.clone();
        wait_until(|| !session.sent().is_empty()).await;

        let sent = control.session.sent();
        assert_eq!(sent[0].0, "15550000000@s.whatsapp.net");
        assert_eq!(
            sent[0].1,
            OutgoingMessage::Text {
                text: "pong ✅".to_string(),
                quoted: Some("M1".to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_invite_joined_on_open() {
        let h = harness_with(MockBehavior::default(), |m| {
            m.with_group_invite(InviteCode::parse("https://chat.whatsapp.com/GrP42"))
        });
        let (_attempt, rx) = h.service.start("15551234567").unwrap();
        let control = h.connector.next_session().await;
        rx.await.unwrap().unwrap();
        assert!(control.session.invites().is_empty());

        control.open();
        let session = control.session.clone();
        wait_until(|| !session.invites().is_empty()).await;
        assert_eq!(control.session.invites(), vec!["GrP42".to_string()]);
    }
}

// ============================================================================
// 5. HTTP surface
// ============================================================================
mod http {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pairlink::server::{CodeResponse, router};
    use tower::ServiceExt;

    use super::*;

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, CodeResponse) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_code_response() {
        let h = harness(MockBehavior::default());
        let (status, body) = get(router(h.service.clone()), "/?number=15551234567").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.code, PAIRING_CODE);
        assert_eq!(h.connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_number_is_bad_request() {
        let h = harness(MockBehavior::default());
        for uri in ["/", "/?number=", "/?number=abc"] {
            let (status, body) = get(router(h.service.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body.code, "Invalid phone number");
        }
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_platform_is_server_error() {
        let h = harness(MockBehavior {
            refuse_connect: true,
            ..MockBehavior::default()
        });
        let (status, body) = get(router(h.service.clone()), "/?number=15551234567").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "Service is Currently Unavailable");
    }
}
