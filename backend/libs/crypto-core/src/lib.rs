//! Shared token primitives for the greeter workspace.
//!
//! - [`jwt`]: HS256 token issuance, unverified decoding and verification
//! - [`secret`]: the shared signing secret and its strength classification

pub mod jwt;
pub mod secret;

pub use jwt::{
    decode_unverified, issue_token, sign_claims, verify_token, ClaimConstraint, Claims,
    TokenError, ValidationConstraints, VerificationError, DEFAULT_AUDIENCE, DEFAULT_ISSUER,
    VALIDATION_LEEWAY_SECS,
};
pub use secret::{SecretKey, SecretStrength};
