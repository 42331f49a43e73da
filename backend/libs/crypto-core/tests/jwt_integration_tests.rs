/// Integration tests for the crypto-core token contract
///
/// This test module covers:
/// - Issue/verify round trip through the public API
/// - Uniform failure classification for expired, foreign and malformed tokens
/// - Side-effect free unverified decoding
use chrono::Duration;
use crypto_core::{
    decode_unverified, issue_token, verify_token, ClaimConstraint, SecretKey,
    ValidationConstraints, VerificationError, DEFAULT_AUDIENCE, DEFAULT_ISSUER,
};

const SERVER_SECRET: &str = "your-very-secure-secret-key-change-in-production";

fn server_constraints() -> ValidationConstraints {
    ValidationConstraints::new(
        ClaimConstraint::from_config(Some(DEFAULT_ISSUER)),
        ClaimConstraint::from_config(Some(DEFAULT_AUDIENCE)),
    )
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn test_round_trip_alice() {
    let key = SecretKey::from(SERVER_SECRET);
    let token = issue_token(&key, "alice", Duration::seconds(3600)).expect("issue token");

    let claims = verify_token(&token, &key, &ValidationConstraints::default())
        .expect("token should verify");
    assert_eq!(claims.sub, "alice");
}

#[test]
fn test_round_trip_many_subjects() {
    let key = SecretKey::from(SERVER_SECRET);

    for subject in ["alice", "bob", "test-user", "ユーザー", "a b c"] {
        let token = issue_token(&key, subject, Duration::minutes(5)).unwrap();
        let claims = verify_token(&token, &key, &server_constraints()).unwrap();
        assert_eq!(claims.sub, subject);
    }
}

// ============================================================================
// Failure Classification
// ============================================================================

#[test]
fn test_already_expired_at_issuance() {
    let key = SecretKey::from(SERVER_SECRET);

    for ttl in [-1, 0, -29, -3600] {
        let token = issue_token(&key, "alice", Duration::seconds(ttl))
            .expect("negative ttl must still issue");
        let result = verify_token(&token, &key, &server_constraints());
        assert_eq!(result.unwrap_err(), VerificationError::Expired, "ttl={ttl}");
    }
}

#[test]
fn test_foreign_key_rejected() {
    let token = issue_token(&SecretKey::from("attacker-key"), "mallory", Duration::hours(1))
        .unwrap();

    let result = verify_token(&token, &SecretKey::from(SERVER_SECRET), &server_constraints());
    assert_eq!(result.unwrap_err(), VerificationError::BadSignature);
}

#[test]
fn test_malformed_strings_rejected() {
    let key = SecretKey::from(SERVER_SECRET);

    for token in ["", ".", "..", "a.b.c", "Bearer abc", "eyJhbGciOiJIUzI1NiJ9"] {
        let result = verify_token(token, &key, &server_constraints());
        assert!(
            matches!(result, Err(VerificationError::Malformed(_))),
            "token {token:?} gave {result:?}"
        );
    }
}

#[test]
fn test_payload_byte_change_invalidates() {
    let key = SecretKey::from(SERVER_SECRET);
    let token = issue_token(&key, "alice", Duration::hours(1)).unwrap();
    let other = issue_token(&key, "bob", Duration::hours(1)).unwrap();

    // Splice bob's payload under alice's signature
    let alice: Vec<&str> = token.split('.').collect();
    let bob: Vec<&str> = other.split('.').collect();
    let spliced = format!("{}.{}.{}", alice[0], bob[1], alice[2]);

    let result = verify_token(&spliced, &key, &server_constraints());
    assert_eq!(result.unwrap_err(), VerificationError::BadSignature);
}

// ============================================================================
// Unverified Decode
// ============================================================================

#[test]
fn test_decode_is_constant_and_signature_blind() {
    let token = issue_token(&SecretKey::from("attacker-key"), "eve", Duration::hours(1)).unwrap();

    let decoded: Vec<_> = (0..3).map(|_| decode_unverified(&token).unwrap()).collect();
    assert!(decoded.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(decoded[0].sub, "eve");
    assert_eq!(decoded[0].iss, DEFAULT_ISSUER);
}
