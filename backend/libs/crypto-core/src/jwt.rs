/// Shared HS256 token codec for the greeter workspace
///
/// The same contract is used on both sides of a call: the client issues a
/// token with [`issue_token`], the server verifies it with [`verify_token`].
/// Nothing here holds state; the secret is passed in by the caller.
///
/// ## Token format
///
/// `header.claims.signature`, base64url encoded, signed with HMAC-SHA256.
/// Claims carry `sub`, `iat`, `exp`, `iss`, `aud` and optionally `nbf`.
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt::{issue_token, verify_token, ValidationConstraints};
/// use crypto_core::SecretKey;
///
/// let secret = SecretKey::from("your-very-secure-secret-key-change-in-production");
/// let token = issue_token(&secret, "alice", chrono::Duration::hours(1)).unwrap();
///
/// let claims = verify_token(&token, &secret, &ValidationConstraints::default()).unwrap();
/// assert_eq!(claims.sub, "alice");
/// ```
use crate::secret::SecretKey;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// The only algorithm accepted or produced
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Clock-skew tolerance applied to `exp` and `nbf`
pub const VALIDATION_LEEWAY_SECS: u64 = 30;

/// Issuer stamped on every issued token
pub const DEFAULT_ISSUER: &str = "greeter-service";

/// Audience stamped on every issued token
pub const DEFAULT_AUDIENCE: &str = "greeter-clients";

// ============================================================================
// Data Structures
// ============================================================================

/// Signed claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (authenticated identity)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issuer
    #[serde(default)]
    pub iss: String,
    /// Audience
    #[serde(default)]
    pub aud: String,
}

impl Claims {
    /// Build claims for `subject` valid for `ttl` from now
    ///
    /// `ttl` may be zero or negative; such claims are already expired.
    /// A `ttl` that pushes `exp` outside the representable date range is
    /// refused with [`TokenError::InvalidLifetime`].
    pub fn new(subject: impl Into<String>, ttl: Duration) -> Result<Self, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::InvalidLifetime)?;

        Ok(Self {
            sub: subject.into(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: None,
            iss: DEFAULT_ISSUER.to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
        })
    }

    /// Lifetime chosen by the issuer, in seconds
    ///
    /// Saturates, since unverified claims may carry arbitrary timestamps.
    pub fn lifetime_secs(&self) -> i64 {
        self.exp.saturating_sub(self.iat)
    }
}

/// Whether a claim must match an expected value during verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClaimConstraint {
    /// Claim must equal this value
    Enforced(String),
    /// Claim is not checked
    #[default]
    Ignored,
}

impl ClaimConstraint {
    /// `None` and empty strings both mean the claim is ignored
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(expected) if !expected.is_empty() => Self::Enforced(expected.to_string()),
            _ => Self::Ignored,
        }
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, Self::Enforced(_))
    }
}

/// Optional issuer/audience checks applied by [`verify_token`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationConstraints {
    pub issuer: ClaimConstraint,
    pub audience: ClaimConstraint,
}

impl ValidationConstraints {
    pub fn new(issuer: ClaimConstraint, audience: ClaimConstraint) -> Self {
        Self { issuer, audience }
    }

    fn to_validation(&self) -> Validation {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        match &self.issuer {
            ClaimConstraint::Enforced(iss) => validation.set_issuer(&[iss]),
            ClaimConstraint::Ignored => validation.iss = None,
        }

        match &self.audience {
            ClaimConstraint::Enforced(aud) => validation.set_audience(&[aud]),
            ClaimConstraint::Ignored => {
                validation.aud = None;
                validation.validate_aud = false;
            }
        }

        validation
    }
}

/// Why a token failed verification
///
/// The variants are logged; callers outside the gate only ever see one
/// uniform rejection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token signature")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("claim mismatch: {0}")]
    ClaimMismatch(String),
}

impl VerificationError {
    /// Stable reason code for structured logs
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::BadSignature => "bad_signature",
            Self::Malformed(_) => "malformed",
            Self::ClaimMismatch(_) => "claim_mismatch",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::BadSignature,
            ErrorKind::InvalidIssuer => Self::ClaimMismatch("issuer".to_string()),
            ErrorKind::InvalidAudience => Self::ClaimMismatch("audience".to_string()),
            ErrorKind::InvalidSubject => Self::ClaimMismatch("subject".to_string()),
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::ClaimMismatch(format!("missing {claim}"))
            }
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Token issuance failure
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret is empty")]
    EmptySecret,

    #[error("token lifetime out of range")]
    InvalidLifetime,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

// ============================================================================
// Token Generation
// ============================================================================

/// Issue a token for `subject` valid for `ttl`
///
/// A negative `ttl` is accepted and yields a token that is already expired,
/// which is how failure paths are exercised.
pub fn issue_token(secret: &SecretKey, subject: &str, ttl: Duration) -> Result<String, TokenError> {
    sign_claims(secret, &Claims::new(subject, ttl)?)
}

/// Sign arbitrary claims with HS256
pub fn sign_claims(secret: &SecretKey, claims: &Claims) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::EmptySecret);
    }

    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(encode(&Header::new(JWT_ALGORITHM), claims, &key)?)
}

// ============================================================================
// Token Inspection
// ============================================================================

/// Read the claims of a token without checking signature or validity window
///
/// For diagnostics only. Never base an authorization decision on the result.
pub fn decode_unverified(token: &str) -> Result<Claims, VerificationError> {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| VerificationError::Malformed(e.to_string()))
}

// ============================================================================
// Token Validation
// ============================================================================

/// Verify signature, validity window and configured claim constraints
///
/// ## Checks
///
/// - HS256 signature against `secret`
/// - `exp` (with [`VALIDATION_LEEWAY_SECS`] leeway)
/// - `nbf` when present (same leeway)
/// - issuer / audience when the constraint is [`ClaimConstraint::Enforced`]
/// - `exp > iat`: a token issued with a non-positive lifetime is never valid
///
/// An empty `secret` verifies nothing and reports [`VerificationError::BadSignature`].
pub fn verify_token(
    token: &str,
    secret: &SecretKey,
    constraints: &ValidationConstraints,
) -> Result<Claims, VerificationError> {
    if secret.is_empty() {
        return Err(VerificationError::BadSignature);
    }

    let key = DecodingKey::from_secret(secret.as_bytes());
    let claims = decode::<Claims>(token, &key, &constraints.to_validation())?.claims;

    if claims.lifetime_secs() <= 0 {
        return Err(VerificationError::Expired);
    }

    Ok(claims)
}

// ============================================================================
// Tests
// ============================================================================
