use chrono::{Duration, Utc};

use latchkey_auth::domain::types::{EventType, SecretKind};
use latchkey_auth::error::{AuthServiceError, CredentialError};
use latchkey_auth::usecase::remember_me::{AutoLoginInput, should_clear_cookie};

use crate::helpers::{ADMIN_EMAIL, Harness, origin, test_account};

fn auto_login(bearer: &str, previous_session_id: Option<String>) -> AutoLoginInput {
    AutoLoginInput {
        bearer: bearer.to_owned(),
        previous_session_id,
        origin: origin(),
    }
}

#[tokio::test]
async fn should_validate_remember_me_more_than_once() {
    let h = Harness::new();
    let issued = h.remember_me().issue(test_account().id, &origin()).await.unwrap();

    for _ in 0..2 {
        let account = h.remember_me().validate(&issued.bearer, &origin()).await.unwrap();
        assert_eq!(account, test_account().id);
    }

    let stored = h.secrets.snapshot();
    assert_eq!(stored[0].kind, SecretKind::RememberMe);
    assert_eq!(stored[0].subject, test_account().id.to_string());
    assert!(stored[0].revoked_at.is_none());
    assert_eq!(stored[0].expires_at - stored[0].issued_at, Duration::days(30));
}

#[tokio::test]
async fn should_reject_revoked_remember_me() {
    let h = Harness::new();
    let issued = h.remember_me().issue(test_account().id, &origin()).await.unwrap();

    let revoked = h
        .remember_me()
        .revoke(&issued.bearer, Some(test_account().id), &origin())
        .await
        .unwrap();
    assert!(revoked);
    let result = h.remember_me().validate(&issued.bearer, &origin()).await;

    assert!(
        matches!(result, Err(AuthServiceError::Credential(CredentialError::Revoked))),
        "expected Revoked, got {result:?}"
    );
    let last = h.audit.events().pop().unwrap();
    assert_eq!(last.event_type, EventType::RememberMeInvalid);
    assert_eq!(last.metadata["reason"], "revoked");
}

#[tokio::test]
async fn should_treat_unknown_bearer_revoke_as_no_op() {
    let h = Harness::new();
    let revoked = h
        .remember_me()
        .revoke("definitely-not-a-secret", None, &origin())
        .await
        .unwrap();
    assert!(!revoked);
    assert!(h.audit.events().is_empty());
}

#[tokio::test]
async fn should_reject_expired_remember_me() {
    let h = Harness::new();
    let issued = h.remember_me().issue(test_account().id, &origin()).await.unwrap();
    h.secrets.set_expiry(issued.id, Utc::now() - Duration::seconds(1));

    let result = h.remember_me().validate(&issued.bearer, &origin()).await;

    assert!(
        matches!(result, Err(AuthServiceError::Credential(CredentialError::Expired))),
        "expected Expired, got {result:?}"
    );
}

#[tokio::test]
async fn should_not_accept_magic_link_bearer_as_remember_me() {
    let h = Harness::new();
    let magic = h
        .secret_store()
        .issue(SecretKind::MagicLink, ADMIN_EMAIL, Duration::minutes(5), None)
        .await
        .unwrap();

    let result = h.auto_login().execute(auto_login(&magic.bearer, None)).await;

    assert!(
        matches!(result, Err(AuthServiceError::Credential(CredentialError::NotFound))),
        "expected NotFound, got {result:?}"
    );
    assert!(h.sessions.authenticated().is_empty());
}

#[tokio::test]
async fn should_auto_login_with_fresh_session() {
    let h = Harness::new();
    let issued = h.remember_me().issue(test_account().id, &origin()).await.unwrap();
    let anonymous = h.establisher().start_anonymous().await.unwrap();

    let handle = h
        .auto_login()
        .execute(auto_login(&issued.bearer, Some(anonymous.id.clone())))
        .await
        .unwrap();

    assert_eq!(handle.admin_account_id, test_account().id);
    assert_ne!(handle.session_id, anonymous.id);
    assert!(h.establisher().load(&anonymous.id).await.unwrap().is_none());
    assert!(
        h.establisher()
            .current(&handle.session_id)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(
        h.audit.event_types(),
        vec![
            EventType::RememberMeIssued,
            EventType::SessionCreated,
            EventType::RememberMeLogin,
        ]
    );
    // Still usable afterwards.
    assert!(h.auto_login().execute(auto_login(&issued.bearer, None)).await.is_ok());
}

#[tokio::test]
async fn should_revoke_everything_when_account_is_gone() {
    let h = Harness::new();
    let first = h.remember_me().issue(test_account().id, &origin()).await.unwrap();
    let second = h.remember_me().issue(test_account().id, &origin()).await.unwrap();
    h.accounts.remove(test_account().id);

    let result = h.auto_login().execute(auto_login(&first.bearer, None)).await;

    assert!(
        matches!(result, Err(AuthServiceError::AccountMissing)),
        "expected AccountMissing, got {result:?}"
    );
    let err = result.unwrap_err();
    assert!(should_clear_cookie(&err));
    assert!(h.sessions.authenticated().is_empty());
    assert!(h.secrets.snapshot().iter().all(|s| s.revoked_at.is_some()));

    let other = h.remember_me().validate(&second.bearer, &origin()).await;
    assert!(matches!(
        other,
        Err(AuthServiceError::Credential(CredentialError::Revoked))
    ));
}

#[tokio::test]
async fn should_keep_cookie_on_dependency_failure() {
    let err = AuthServiceError::dependency(anyhow::anyhow!("db down"));
    assert!(!should_clear_cookie(&err));
    assert!(should_clear_cookie(&CredentialError::Expired.into()));
}
