mod common;

use common::harness;
use learnhub_auth::error::AuthError;
use learnhub_auth::identity::IdentityProvider;
use learnhub_auth::provider::Provider;
use learnhub_auth::store::CredentialStore;

#[actix_web::test]
async fn test_connect_and_disconnect_provider() {
    let h = harness();
    let outcome = h
        .state
        .accounts
        .register("alice@example.com", "password123", None)
        .await
        .unwrap();

    let user = h
        .state
        .links
        .connect_provider(outcome.user.id, Provider::Google, "g-1", "alice@example.com")
        .await
        .unwrap();
    assert_eq!(user.google_id.as_deref(), Some("g-1"));
    assert_eq!(user.google_email.as_deref(), Some("alice@example.com"));

    // Password remains, so the provider can go.
    let user = h
        .state
        .links
        .disconnect_provider(outcome.user.id, Provider::Google)
        .await
        .unwrap();
    assert!(user.google_id.is_none());
    assert!(user.google_email.is_none());
}

#[actix_web::test]
async fn test_connect_rejects_email_mismatch() {
    let h = harness();
    let outcome = h
        .state
        .accounts
        .register("bob@example.com", "password123", None)
        .await
        .unwrap();

    let err = h
        .state
        .links
        .connect_provider(outcome.user.id, Provider::Google, "g-2", "evil@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailMismatch));

    // Nothing was linked.
    let user = h
        .store
        .find_user_by_id(outcome.user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(user.google_id.is_none());
}

#[actix_web::test]
async fn test_connect_rejects_identity_linked_elsewhere() {
    let h = harness();
    let alice = h
        .state
        .accounts
        .register("alice@example.com", "password123", None)
        .await
        .unwrap();
    let bob = h
        .state
        .accounts
        .register("bob@example.com", "password123", None)
        .await
        .unwrap();

    // Facebook allows the same email on two identities, so give both
    // accounts matching provider emails.
    h.state
        .links
        .connect_provider(alice.user.id, Provider::Facebook, "f-1", "alice@example.com")
        .await
        .unwrap();

    // Simulate the same provider identity reported for Bob's account.
    let mut bob_user = h.store.find_user_by_id(bob.user.id).await.unwrap().unwrap();
    bob_user.set_provider(
        Provider::Facebook,
        "f-1".to_string(),
        "bob@example.com".to_string(),
    );
    let err = h.store.update_user(&bob_user).await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderAlreadyLinked));
}

#[actix_web::test]
async fn test_connect_provider_rejects_identity_held_by_other_account() {
    let h = harness();
    let alice = h
        .state
        .accounts
        .register("alice@example.com", "password123", None)
        .await
        .unwrap();
    let bob = h
        .state
        .accounts
        .register("bob@example.com", "password123", None)
        .await
        .unwrap();

    h.state
        .links
        .connect_provider(alice.user.id, Provider::Facebook, "f-1", "alice@example.com")
        .await
        .unwrap();

    // Bob's own email matches his account, but the identity is Alice's.
    let err = h
        .state
        .links
        .connect_provider(bob.user.id, Provider::Facebook, "f-1", "bob@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderAlreadyLinked));

    let bob_user = h.store.find_user_by_id(bob.user.id).await.unwrap().unwrap();
    assert!(bob_user.facebook_id.is_none());
}

#[actix_web::test]
async fn test_cannot_disconnect_last_login_method() {
    let h = harness();

    // Federated-only account: no password, single provider.
    h.google.grant("g-token", "g-sub", "carol@example.com", None);
    let claims = h.google.verify_identity_token("g-token").await.unwrap();
    let user = h.state.federated.create_or_update_user(&claims).await.unwrap();

    let err = h
        .state
        .links
        .disconnect_provider(user.id, Provider::Google)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::LastLoginMethod));

    // Still linked.
    let user = h.store.find_user_by_id(user.id).await.unwrap().unwrap();
    assert!(user.google_id.is_some());
}

#[actix_web::test]
async fn test_disconnect_allowed_when_other_provider_remains() {
    let h = harness();

    h.google.grant("g-token", "g-sub", "dave@example.com", None);
    let claims = h.google.verify_identity_token("g-token").await.unwrap();
    let user = h.state.federated.create_or_update_user(&claims).await.unwrap();

    // Second provider with the same email.
    h.state
        .links
        .connect_provider(user.id, Provider::Facebook, "f-9", "dave@example.com")
        .await
        .unwrap();

    let user = h
        .state
        .links
        .disconnect_provider(user.id, Provider::Google)
        .await
        .unwrap();
    assert!(user.google_id.is_none());
    assert!(user.facebook_id.is_some());
}

#[actix_web::test]
async fn test_disconnect_allowed_after_password_added() {
    use learnhub_auth::password::PasswordHasher;

    let h = harness();

    // Provider-only account.
    h.google.grant("g-token", "g-sub", "carol@example.com", None);
    let claims = h.google.verify_identity_token("g-token").await.unwrap();
    let user = h.state.federated.create_or_update_user(&claims).await.unwrap();

    // The user later sets a password.
    let hasher = PasswordHasher::new();
    let mut user = h.store.find_user_by_id(user.id).await.unwrap().unwrap();
    user.password_hash = Some(hasher.hash_password("password123").unwrap());
    h.store.update_user(&user).await.unwrap();

    // The provider is no longer the last login method.
    let user = h
        .state
        .links
        .disconnect_provider(user.id, Provider::Google)
        .await
        .unwrap();
    assert!(user.google_id.is_none());

    h.state
        .accounts
        .login("carol@example.com", "password123")
        .await
        .unwrap();
}

#[actix_web::test]
async fn test_federated_sign_in_matches_mailbox_regardless_of_case() {
    let h = harness();
    let registered = h
        .state
        .accounts
        .register("frank@example.com", "password123", None)
        .await
        .unwrap();

    // The provider reports the same mailbox with different casing.
    h.google
        .grant("g-token", "g-frank", "Frank@Example.com", Some("Frank"));
    let claims = h.google.verify_identity_token("g-token").await.unwrap();
    let user = h.state.federated.create_or_update_user(&claims).await.unwrap();

    // Same account, not a second one for the same mailbox.
    assert_eq!(user.id, registered.user.id);
    assert_eq!(user.email, "frank@example.com");
    assert_eq!(user.google_id.as_deref(), Some("g-frank"));
    assert_eq!(user.google_email.as_deref(), Some("frank@example.com"));
}

#[actix_web::test]
async fn test_connect_provider_accepts_differently_cased_email() {
    let h = harness();
    let outcome = h
        .state
        .accounts
        .register("grace@example.com", "password123", None)
        .await
        .unwrap();

    let user = h
        .state
        .links
        .connect_provider(
            outcome.user.id,
            Provider::Google,
            "g-grace",
            "Grace@Example.COM",
        )
        .await
        .unwrap();

    assert_eq!(user.google_id.as_deref(), Some("g-grace"));
    assert_eq!(user.google_email.as_deref(), Some("grace@example.com"));
}

#[actix_web::test]
async fn test_disconnect_unlinked_provider_is_noop() {
    let h = harness();
    let outcome = h
        .state
        .accounts
        .register("erin@example.com", "password123", None)
        .await
        .unwrap();

    let user = h
        .state
        .links
        .disconnect_provider(outcome.user.id, Provider::Facebook)
        .await
        .unwrap();
    assert!(user.facebook_id.is_none());
}

#[actix_web::test]
async fn test_federated_sign_in_links_by_email() {
    let h = harness();
    h.state
        .accounts
        .register("frank@example.com", "password123", None)
        .await
        .unwrap();

    h.google.grant("g-token", "g-frank", "frank@example.com", Some("Frank"));
    let claims = h.google.verify_identity_token("g-token").await.unwrap();
    let user = h.state.federated.create_or_update_user(&claims).await.unwrap();

    assert_eq!(user.google_id.as_deref(), Some("g-frank"));
    assert!(user.password_hash.is_some());

    // Password login still works after the link.
    h.state
        .accounts
        .login("frank@example.com", "password123")
        .await
        .unwrap();
}
