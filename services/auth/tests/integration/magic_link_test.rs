use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::time::Instant;

use latchkey_auth::domain::types::{EventType, Outcome, RateLimitPolicy, Session};
use latchkey_auth::error::{AuthServiceError, CredentialError};
use latchkey_auth::usecase::magic_link::{
    RequestMagicLinkInput, RequestMagicLinkUseCase, VerifyMagicLinkInput,
};
use latchkey_auth::usecase::rate_limit::RateLimiter;

use crate::helpers::{
    ADMIN_EMAIL, EXTERNAL_TIMEOUT, Harness, HangingAccounts, RESPONSE_FLOOR, magic_link_policy,
    origin, test_account,
};

fn request(email: &str, remember_me: bool) -> RequestMagicLinkInput {
    RequestMagicLinkInput {
        email: email.to_owned(),
        remember_me,
        origin: origin(),
    }
}

fn verify(bearer: &str, session: &Session, remember_me: bool) -> VerifyMagicLinkInput {
    VerifyMagicLinkInput {
        bearer: bearer.to_owned(),
        csrf_token: session.csrf_token.clone(),
        session: Some(session.clone()),
        remember_me,
        origin: origin(),
    }
}

/// Issuance outcomes all land on the response floor, give or take timer
/// granularity.
fn assert_padded(started: Instant) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= RESPONSE_FLOOR && elapsed < RESPONSE_FLOOR + StdDuration::from_millis(5),
        "expected ~{RESPONSE_FLOOR:?}, took {elapsed:?}"
    );
}

/// Let spawned notification tasks run to completion.
async fn drain_spawned(h: &Harness, expected_messages: usize) {
    for _ in 0..100 {
        if h.mailer.sent().len() >= expected_messages {
            return;
        }
        tokio::task::yield_now().await;
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn should_send_link_to_registered_admin() {
    let h = Harness::new();
    let started = Instant::now();

    h.request_link()
        .execute(request(" Admin@Example.ORG ", false))
        .await
        .unwrap();

    assert_padded(started);
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ADMIN_EMAIL);
    assert!(sent[0].html_body.contains("Site Admin"));
    let (bearer, remember) = h.mailer.last_link();
    assert_eq!(bearer.len(), 43);
    assert!(!remember);

    let secrets = h.secrets.snapshot();
    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets[0].subject, ADMIN_EMAIL);
    assert_eq!(secrets[0].expires_at - secrets[0].issued_at, Duration::minutes(5));
    assert_eq!(h.audit.event_types(), vec![EventType::MagicLinkSent]);
}

#[tokio::test(start_paused = true)]
async fn should_answer_unknown_email_identically_without_sending() {
    let h = Harness::new();
    let started = Instant::now();

    let result = h
        .request_link()
        .execute(request("stranger@example.org", false))
        .await;

    assert!(result.is_ok(), "unknown email must look like success, got {result:?}");
    assert_padded(started);
    assert!(h.mailer.sent().is_empty());
    assert!(h.secrets.snapshot().is_empty());
    assert_eq!(
        h.audit.event_types(),
        vec![EventType::MagicLinkRequestedNonexistentEmail]
    );
}

#[tokio::test(start_paused = true)]
async fn should_answer_rate_limited_request_identically() {
    let h = Harness::new().with_rate_limit(RateLimitPolicy {
        max_attempts_per_email: 1,
        max_attempts_per_ip: 100,
        window: Duration::minutes(15),
    });
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();

    let started = Instant::now();
    let result = h.request_link().execute(request(ADMIN_EMAIL, false)).await;

    assert!(result.is_ok(), "rate limit must look like success, got {result:?}");
    assert_padded(started);
    assert_eq!(h.mailer.sent().len(), 1, "no second email");

    let events = h.audit.events();
    let blocked = events.last().unwrap();
    assert_eq!(blocked.event_type, EventType::RateLimitExceeded);
    assert_eq!(blocked.outcome, Outcome::Blocked);
    assert_eq!(blocked.metadata["email"], ADMIN_EMAIL);
    assert_eq!(blocked.metadata["scope"], "email");
}

#[tokio::test(start_paused = true)]
async fn should_reject_malformed_email_without_padding() {
    let h = Harness::new();
    let started = Instant::now();

    let result = h.request_link().execute(request("not-an-email", false)).await;

    assert!(
        matches!(result, Err(AuthServiceError::InvalidRequest)),
        "expected InvalidRequest, got {result:?}"
    );
    assert!(started.elapsed() < RESPONSE_FLOOR);
    assert_eq!(h.audit.event_types(), vec![EventType::InvalidRequest]);
    assert_eq!(h.limits.logged("magic_link:rl:ip:203.0.113.7"), 0);
}

#[tokio::test(start_paused = true)]
async fn should_supersede_earlier_link_on_reissue() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (first, _) = h.mailer.last_link();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (second, _) = h.mailer.last_link();
    assert_ne!(first, second);

    let session = h.establisher().start_anonymous().await.unwrap();
    let stale = h.verify_link().execute(verify(&first, &session, false)).await;
    assert!(
        matches!(stale, Err(AuthServiceError::Credential(CredentialError::Revoked))),
        "expected Revoked, got {stale:?}"
    );
    assert!(h.verify_link().execute(verify(&second, &session, false)).await.is_ok());

    let sent_events: Vec<_> = h
        .audit
        .events()
        .into_iter()
        .filter(|e| e.event_type == EventType::MagicLinkSent)
        .collect();
    assert_eq!(sent_events[1].metadata["superseded"], 1);
}

#[tokio::test(start_paused = true)]
async fn should_surface_delivery_failure_as_dependency_error() {
    let h = Harness::new();
    h.mailer.set_failing(true);
    let started = Instant::now();

    let result = h.request_link().execute(request(ADMIN_EMAIL, false)).await;

    assert!(
        matches!(result, Err(AuthServiceError::Dependency(_))),
        "expected Dependency, got {result:?}"
    );
    assert_padded(started);
    assert_eq!(h.audit.event_types(), vec![EventType::MagicLinkEmailFailed]);

    let stored = h.secrets.snapshot();
    assert_eq!(stored.len(), 1);
    assert!(
        stored[0].revoked_at.is_some(),
        "undelivered link must not stay redeemable"
    );
}

#[tokio::test(start_paused = true)]
async fn should_bound_a_hanging_account_lookup() {
    let h = Harness::new();
    let usecase = RequestMagicLinkUseCase {
        accounts: HangingAccounts,
        secrets: h.secret_store(),
        limiter: RateLimiter::new(h.limits.clone(), h.rate_limit),
        audit: h.audit_log(),
        mailer: h.mailer.clone(),
        policy: magic_link_policy(),
    };
    let started = Instant::now();

    let result = usecase.execute(request(ADMIN_EMAIL, false)).await;

    assert!(
        matches!(result, Err(AuthServiceError::Dependency(_))),
        "expected Dependency, got {result:?}"
    );
    assert!(started.elapsed() >= EXTERNAL_TIMEOUT);
    assert!(h.mailer.sent().is_empty());
}

// ── Verify ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn should_log_in_through_landing_page_then_post() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();

    // GET: a link scanner fetching the page gets an anonymous session only.
    let landing = h.establisher().load_or_start(None).await.unwrap();
    assert!(!landing.is_authenticated());
    assert!(h.sessions.authenticated().is_empty());
    assert!(h.secrets.snapshot()[0].consumed_at.is_none());

    // POST: the browser submits the form.
    let output = h
        .verify_link()
        .execute(verify(&bearer, &landing, false))
        .await
        .unwrap();

    assert_eq!(output.account.id, test_account().id);
    assert_eq!(output.session.admin_account_id, test_account().id);
    assert_ne!(output.session.session_id, landing.id);
    assert!(output.remember_me.is_none());
    assert!(h.establisher().load(&landing.id).await.unwrap().is_none());
    assert_eq!(h.sessions.authenticated().len(), 1);
    assert!(h.secrets.snapshot()[0].consumed_at.is_some());

    assert_eq!(
        h.audit.event_types(),
        vec![
            EventType::MagicLinkSent,
            EventType::SessionCreated,
            EventType::AdminLoginSuccess,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn should_reject_replayed_link() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    let session = h.establisher().start_anonymous().await.unwrap();
    h.verify_link().execute(verify(&bearer, &session, false)).await.unwrap();

    let other = h.establisher().start_anonymous().await.unwrap();
    let replay = h.verify_link().execute(verify(&bearer, &other, false)).await;

    assert!(
        matches!(
            replay,
            Err(AuthServiceError::Credential(CredentialError::AlreadyConsumed))
        ),
        "expected AlreadyConsumed, got {replay:?}"
    );
    assert_eq!(h.sessions.authenticated().len(), 1, "no second session");
    let invalid = h.audit.events().pop().unwrap();
    assert_eq!(invalid.event_type, EventType::MagicLinkInvalid);
    assert_eq!(invalid.metadata["reason"], "already_consumed");
}

#[tokio::test(start_paused = true)]
async fn should_reject_expired_link() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    let id = h.secrets.snapshot()[0].id;
    h.secrets.set_expiry(id, chrono::Utc::now() - Duration::seconds(1));
    let session = h.establisher().start_anonymous().await.unwrap();

    let result = h.verify_link().execute(verify(&bearer, &session, false)).await;

    assert!(
        matches!(result, Err(AuthServiceError::Credential(CredentialError::Expired))),
        "expected Expired, got {result:?}"
    );
    assert!(h.sessions.authenticated().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_stop_at_csrf_mismatch_before_touching_the_secret() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    let session = h.establisher().start_anonymous().await.unwrap();

    let mut input = verify(&bearer, &session, false);
    input.csrf_token = "forged".to_owned();
    let forged = h.verify_link().execute(input).await;
    assert!(
        matches!(forged, Err(AuthServiceError::CsrfMismatch)),
        "expected CsrfMismatch, got {forged:?}"
    );

    let mut input = verify(&bearer, &session, false);
    input.session = None;
    let sessionless = h.verify_link().execute(input).await;
    assert!(matches!(sessionless, Err(AuthServiceError::CsrfMismatch)));

    assert!(h.secrets.snapshot()[0].consumed_at.is_none());
    assert_eq!(
        h.audit.event_types(),
        vec![
            EventType::MagicLinkSent,
            EventType::CsrfFailure,
            EventType::CsrfFailure,
        ]
    );

    // The untouched link still works with the right token.
    assert!(h.verify_link().execute(verify(&bearer, &session, false)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn should_issue_remember_me_when_requested() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, true)).await.unwrap();
    let (bearer, remember) = h.mailer.last_link();
    assert!(remember, "remember flag travels in the link");
    let session = h.establisher().start_anonymous().await.unwrap();

    let output = h
        .verify_link()
        .execute(verify(&bearer, &session, remember))
        .await
        .unwrap();

    let issued = output.remember_me.expect("remember-me secret");
    let account_id = h
        .remember_me()
        .validate(&issued.bearer, &origin())
        .await
        .unwrap();
    assert_eq!(account_id, test_account().id);
    assert!(h.audit.event_types().contains(&EventType::RememberMeIssued));
}

#[tokio::test(start_paused = true)]
async fn should_refuse_link_whose_account_was_deleted() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    h.accounts.remove(test_account().id);
    let session = h.establisher().start_anonymous().await.unwrap();

    let result = h.verify_link().execute(verify(&bearer, &session, false)).await;

    assert!(
        matches!(result, Err(AuthServiceError::AccountMissing)),
        "expected AccountMissing, got {result:?}"
    );
    assert!(h.sessions.authenticated().is_empty());
    assert_eq!(
        h.audit.event_types().last(),
        Some(&EventType::MagicLinkNoAdminAccount)
    );
}

#[tokio::test(start_paused = true)]
async fn should_notify_admin_of_new_sign_in() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    let session = h.establisher().start_anonymous().await.unwrap();

    h.verify_link().execute(verify(&bearer, &session, false)).await.unwrap();
    drain_spawned(&h, 2).await;

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 2);
    let notice = &sent[1];
    assert_eq!(notice.subject, "New admin sign-in");
    assert_eq!(notice.to, ADMIN_EMAIL);
    assert!(notice.text_body.contains("203.0.113.7"));
    assert!(notice.text_body.contains("Firefox"));
}

#[tokio::test(start_paused = true)]
async fn should_not_fail_login_when_notification_fails() {
    let h = Harness::new();
    h.request_link().execute(request(ADMIN_EMAIL, false)).await.unwrap();
    let (bearer, _) = h.mailer.last_link();
    let session = h.establisher().start_anonymous().await.unwrap();
    h.mailer.set_failing(true);

    let result = h.verify_link().execute(verify(&bearer, &session, false)).await;
    drain_spawned(&h, 2).await;

    assert!(result.is_ok(), "login must not depend on the notice, got {result:?}");
    assert_eq!(h.mailer.sent().len(), 1);
    assert_eq!(h.sessions.authenticated().len(), 1);
}
