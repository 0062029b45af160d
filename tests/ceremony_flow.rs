mod common;

use common::{
    authenticator, engine, engine_with, register, sign_in, sign_in_assertion, target, ORIGIN, RP_ID,
};
use passkey_ceremony::crypto::soft::SoftAuthenticator;
use passkey_ceremony::encoding;
use passkey_ceremony::webauthn::client_data::CollectedClientData;
use passkey_ceremony::{
    AssertionCredential, AuthError, CeremonyConfig, CeremonyPhase, ChallengeContext,
    CoseAlgorithm, CredentialPolicy, CredentialStore, ErrorKind, Identity,
    RegistrationCredential, UserVerification,
};

#[test]
fn test_alice_registers_and_signs_in() {
    let engine = engine();
    let mut alice = authenticator();

    let registered = register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();
    assert_eq!(registered.identity.as_str(), "alice");
    assert_eq!(registered.credential_id.as_bytes(), alice.credential_ids()[0].as_slice());

    let assertion = sign_in_assertion(&engine, &mut alice, "alice").unwrap();
    let outcome = engine
        .finish_authentication(&target("alice"), assertion.clone())
        .unwrap();
    assert_eq!(outcome.identity, Identity::new("alice").unwrap());
    assert_eq!(outcome.credential_id, registered.credential_id);
    assert_eq!(outcome.sign_count, 1);

    // Resubmitting the same assertion finds its challenge already consumed.
    let replay = engine.finish_authentication(&target("alice"), assertion);
    assert!(matches!(replay, Err(AuthError::NoChallenge)));

    let record = engine
        .credentials()
        .find_by_credential_id(&registered.credential_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.sign_count, 1);
    assert!(record.last_used_at.is_some());
    assert_eq!(record.transports, vec!["internal".to_string()]);
}

#[test]
fn test_every_algorithm_round_trips() {
    let engine = engine();
    for (identity, alg) in [
        ("p256-user", CoseAlgorithm::Es256),
        ("k256-user", CoseAlgorithm::Es256k),
        ("ed25519-user", CoseAlgorithm::EdDsa),
        ("rsa-user", CoseAlgorithm::Rs256),
    ] {
        let mut authenticator = authenticator();
        register(&engine, &mut authenticator, identity, alg).unwrap();
        let record = engine
            .credentials()
            .find_by_identity(&Identity::new(identity).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record[0].public_key.algorithm(), alg);

        for expected_count in 1..=3 {
            let outcome = sign_in(&engine, &mut authenticator, identity).unwrap();
            assert_eq!(outcome.identity.as_str(), identity);
            assert_eq!(outcome.sign_count, expected_count);
        }
    }
}

#[test]
fn test_superseded_challenge_is_rejected() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::EdDsa).unwrap();

    let stale = engine.start_authentication(Some("alice")).unwrap();
    let fresh = engine.start_authentication(Some("alice")).unwrap();
    assert_ne!(stale.public_key.challenge, fresh.public_key.challenge);

    let stale_assertion = AssertionCredential::try_from(alice.get(&stale.public_key).unwrap()).unwrap();
    assert!(matches!(
        engine.finish_authentication(&target("alice"), stale_assertion),
        Err(AuthError::ChallengeMismatch)
    ));

    let fresh_assertion = AssertionCredential::try_from(alice.get(&fresh.public_key).unwrap()).unwrap();
    engine
        .finish_authentication(&target("alice"), fresh_assertion)
        .unwrap();
}

#[test]
fn test_expired_challenge() {
    let engine = engine_with(CeremonyConfig {
        challenge_timeout_secs: 0,
        ..CeremonyConfig::default()
    });
    let mut alice = authenticator();

    let result = register(&engine, &mut alice, "alice", CoseAlgorithm::Es256);
    assert!(matches!(result, Err(AuthError::Expired)));
    assert_eq!(engine.credentials().credential_count().unwrap(), 0);
}

#[test]
fn test_registration_for_another_identity_is_not_live() {
    let engine = engine();
    let mut authenticator = authenticator();

    let options = engine.start_registration("alice").unwrap();
    let created = authenticator.create(&options, CoseAlgorithm::Es256).unwrap();
    let credential = RegistrationCredential::try_from(created).unwrap();

    // Alice's challenge cannot complete Bob's registration.
    assert!(matches!(
        engine.finish_registration("bob", credential.clone()),
        Err(AuthError::NoChallenge)
    ));
    engine.finish_registration("alice", credential).unwrap();
}

#[test]
fn test_single_policy_identity_exists() {
    let engine = engine();
    let mut first = authenticator();
    let mut second = authenticator();
    register(&engine, &mut first, "alice", CoseAlgorithm::Es256).unwrap();

    let err = register(&engine, &mut second, "alice", CoseAlgorithm::Es256).unwrap_err();
    assert!(matches!(err, AuthError::IdentityExists));
    let caller = err.for_caller(CeremonyPhase::RegistrationStart);
    assert_eq!(caller.kind, ErrorKind::IdentityExists);
}

#[test]
fn test_multiple_policy() {
    let engine = engine_with(CeremonyConfig {
        credential_policy: CredentialPolicy::MultiplePerIdentity,
        ..CeremonyConfig::default()
    });
    let mut laptop = authenticator();
    let mut phone = authenticator();
    register(&engine, &mut laptop, "alice", CoseAlgorithm::Es256).unwrap();

    // The laptop's credential is excluded, so it refuses to register twice.
    let options = engine.start_registration("alice").unwrap();
    assert_eq!(options.exclude_credentials.len(), 1);
    assert!(laptop.create(&options, CoseAlgorithm::Es256).is_err());

    register(&engine, &mut phone, "alice", CoseAlgorithm::EdDsa).unwrap();
    let owned = engine
        .credentials()
        .find_by_identity(&Identity::new("alice").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(owned.len(), 2);

    let start = engine.start_authentication(Some("alice")).unwrap();
    assert_eq!(start.public_key.allow_credentials.len(), 2);
    sign_in(&engine, &mut laptop, "alice").unwrap();
    sign_in(&engine, &mut phone, "alice").unwrap();
}

#[test]
fn test_credential_id_collision() {
    let engine = engine();
    let mut alice = authenticator();

    let options = engine.start_registration("alice").unwrap();
    let created = alice.create(&options, CoseAlgorithm::Es256).unwrap();
    engine
        .finish_registration("alice", RegistrationCredential::try_from(created.clone()).unwrap())
        .unwrap();

    // Replay Alice's attestation under Bob's registration challenge.
    let bob_options = engine.start_registration("bob").unwrap();
    let client_data = CollectedClientData::new(
        ChallengeContext::Registration,
        bob_options.challenge.as_bytes(),
        ORIGIN,
    );
    let mut copied = created;
    copied.response.client_data_json = encoding::encode(client_data.to_json().unwrap());

    let result = engine.finish_registration("bob", RegistrationCredential::try_from(copied).unwrap());
    assert!(matches!(result, Err(AuthError::CredentialIdCollision)));
    assert!(engine
        .credentials()
        .find_by_identity(&Identity::new("bob").unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn test_tampered_signature() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::EdDsa).unwrap();

    let mut assertion = sign_in_assertion(&engine, &mut alice, "alice").unwrap();
    assertion.signature[10] ^= 0x80;
    assert!(matches!(
        engine.finish_authentication(&target("alice"), assertion),
        Err(AuthError::SignatureInvalid)
    ));
}

#[test]
fn test_signature_over_different_client_data() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();

    let start = engine.start_authentication(Some("alice")).unwrap();
    let mut signed = alice.get(&start.public_key).unwrap();
    // Same challenge and origin, different bytes than the authenticator signed.
    let rewritten = format!(
        r#"{{ "type": "webauthn.get", "challenge": "{}", "origin": "{ORIGIN}" }}"#,
        encoding::encode(start.public_key.challenge.as_bytes())
    );
    signed.response.client_data_json = encoding::encode(rewritten);

    let assertion = AssertionCredential::try_from(signed).unwrap();
    assert!(matches!(
        engine.finish_authentication(&target("alice"), assertion),
        Err(AuthError::SignatureInvalid)
    ));
}

#[test]
fn test_unknown_identity_looks_like_bad_signature() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();

    let unknown = engine.start_authentication(Some("bob")).unwrap_err();
    assert!(matches!(unknown, AuthError::UserNotFound));

    let mut forged = sign_in_assertion(&engine, &mut alice, "alice").unwrap();
    let last = forged.signature.len() - 1;
    forged.signature[last] ^= 0x01;
    let bad_signature = engine
        .finish_authentication(&target("alice"), forged)
        .unwrap_err();

    assert_ne!(unknown.kind(), bad_signature.kind());
    assert_eq!(
        unknown.for_caller(CeremonyPhase::AuthenticationStart),
        bad_signature.for_caller(CeremonyPhase::AuthenticationFinish)
    );
    assert_eq!(
        bad_signature.for_caller(CeremonyPhase::AuthenticationFinish).kind,
        ErrorKind::AuthenticationFailed
    );
}

#[test]
fn test_credential_of_another_identity() {
    let engine = engine();
    let mut alice = authenticator();
    let mut bob = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();
    register(&engine, &mut bob, "bob", CoseAlgorithm::Es256).unwrap();

    // Bob answers Alice's challenge with his own, validly signed credential.
    let start = engine.start_authentication(Some("alice")).unwrap();
    let mut options = start.public_key.clone();
    options.allow_credentials.clear();
    let assertion = AssertionCredential::try_from(bob.get(&options).unwrap()).unwrap();

    assert!(matches!(
        engine.finish_authentication(&target("alice"), assertion),
        Err(AuthError::UserNotFound)
    ));
    // The attempt burned Alice's challenge.
    assert!(matches!(
        engine.ceremony_state("alice", ChallengeContext::Authentication),
        Ok(passkey_ceremony::CeremonyState::Idle)
    ));
}

#[test]
fn test_discoverable_sign_in() {
    let engine = engine();
    let mut alice = authenticator();
    let registered = register(&engine, &mut alice, "alice", CoseAlgorithm::EdDsa).unwrap();

    let start = engine.start_authentication(None).unwrap();
    let target = start.discoverable_target().unwrap();
    let assertion = AssertionCredential::try_from(alice.get(&start.public_key).unwrap()).unwrap();

    let outcome = engine.finish_authentication(&target, assertion).unwrap();
    assert_eq!(outcome.identity.as_str(), "alice");
    assert_eq!(outcome.credential_id, registered.credential_id);
}

#[test]
fn test_discoverable_requires_matching_user_handle() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();

    let start = engine.start_authentication(None).unwrap();
    let mut signed = alice.get(&start.public_key).unwrap();
    signed.response.user_handle = None;
    let without_handle = AssertionCredential::try_from(signed).unwrap();
    assert!(matches!(
        engine.finish_authentication(&start.discoverable_target().unwrap(), without_handle),
        Err(AuthError::UserNotFound)
    ));

    let start = engine.start_authentication(None).unwrap();
    let mut signed = alice.get(&start.public_key).unwrap();
    signed.response.user_handle = Some(encoding::encode("mallory"));
    let wrong_handle = AssertionCredential::try_from(signed).unwrap();
    assert!(matches!(
        engine.finish_authentication(&start.discoverable_target().unwrap(), wrong_handle),
        Err(AuthError::UserNotFound)
    ));
}

#[test]
fn test_discoverable_sessions_are_independent() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();

    let first = engine.start_authentication(None).unwrap();
    let second = engine.start_authentication(None).unwrap();
    assert_ne!(first.session_id, second.session_id);

    // Starting a second attempt does not supersede the first.
    let assertion = AssertionCredential::try_from(alice.get(&first.public_key).unwrap()).unwrap();
    engine
        .finish_authentication(&first.discoverable_target().unwrap(), assertion)
        .unwrap();

    // An assertion for one session cannot finish another.
    let assertion = AssertionCredential::try_from(alice.get(&second.public_key).unwrap()).unwrap();
    assert!(matches!(
        engine.finish_authentication(&first.discoverable_target().unwrap(), assertion),
        Err(AuthError::NoChallenge)
    ));
}

#[test]
fn test_cloned_authenticator_counter_rollback() {
    let engine = engine();
    let mut original = authenticator();
    register(&engine, &mut original, "alice", CoseAlgorithm::Es256k).unwrap();
    sign_in(&engine, &mut original, "alice").unwrap();

    let mut clone = original.clone();
    sign_in(&engine, &mut original, "alice").unwrap();

    let err = sign_in(&engine, &mut clone, "alice").unwrap_err();
    assert!(matches!(err, AuthError::CounterRollback { stored: 2, presented: 2 }));
    assert!(err.is_security_relevant());
    assert_eq!(
        err.for_caller(CeremonyPhase::AuthenticationFinish).kind,
        ErrorKind::AuthenticationFailed
    );
}

#[test]
fn test_counterless_authenticator() {
    let engine = engine();
    let mut authenticator = SoftAuthenticator::new(RP_ID, ORIGIN).without_counter();
    register(&engine, &mut authenticator, "alice", CoseAlgorithm::EdDsa).unwrap();

    for _ in 0..3 {
        let outcome = sign_in(&engine, &mut authenticator, "alice").unwrap();
        assert_eq!(outcome.sign_count, 0);
    }
}

#[test]
fn test_origin_mismatch() {
    let engine = engine();
    let mut alice = authenticator();
    register(&engine, &mut alice, "alice", CoseAlgorithm::Es256).unwrap();

    let mut phished = alice.with_origin("https://login.evil.example");
    let err = sign_in(&engine, &mut phished, "alice").unwrap_err();
    assert!(matches!(err, AuthError::OriginMismatch));

    let mut wrong_origin = SoftAuthenticator::new(RP_ID, "https://login.evil.example");
    let err = register(&engine, &mut wrong_origin, "bob", CoseAlgorithm::Es256).unwrap_err();
    assert!(matches!(err, AuthError::RegistrationRejected(msg) if msg.contains("origin")));
}

#[test]
fn test_relying_party_mismatch() {
    let engine = engine();
    let mut other_rp = SoftAuthenticator::new("evil.example", ORIGIN);
    let err = register(&engine, &mut other_rp, "alice", CoseAlgorithm::Es256).unwrap_err();
    assert!(matches!(err, AuthError::RegistrationRejected(msg) if msg.contains("relying party")));
}

#[test]
fn test_required_user_verification() {
    let engine = engine_with(CeremonyConfig {
        user_verification: UserVerification::Required,
        ..CeremonyConfig::default()
    });
    let mut presence_only = authenticator().without_user_verification();
    let err = register(&engine, &mut presence_only, "alice", CoseAlgorithm::Es256).unwrap_err();
    assert!(matches!(err, AuthError::RegistrationRejected(_)));

    let mut verifying = authenticator();
    register(&engine, &mut verifying, "bob", CoseAlgorithm::Es256).unwrap();
    sign_in(&engine, &mut verifying, "bob").unwrap();
}

#[test]
fn test_malformed_payload_is_internal_for_caller() {
    let err = AssertionCredential::from_json(r#"{"id":"AQID"}"#).unwrap_err();
    let caller = err.for_caller(CeremonyPhase::AuthenticationFinish);
    assert_eq!(caller.kind, ErrorKind::InternalError);
    assert_eq!(caller.message, "internal error");
}
