//! Short-lived authorization tokens carrying scope claims.
//!
//! Tokens are minted per request by the token stage of the middleware
//! pipeline and never leave the process: there is no signing key and no
//! verification step. The claim set mirrors a JWT payload (`exp` as a
//! NumericDate, `scopes` as an array of strings) so a signing adapter can be
//! bolted on later without changing the read side.
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Claim key holding the expiry as seconds since the Unix epoch.
pub const EXPIRY_CLAIM: &str = "exp";
/// Claim key holding the ordered list of granted scopes.
pub const SCOPES_CLAIM: &str = "scopes";

/// Lifetime of tokens minted by [`TokenIssuer::default`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Raw claim set backing a [`Token`].
pub type ClaimSet = Map<String, Value>;

/// Errors raised while building or reading a token.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TokenError {
    /// Encoding the claim set into a JSON object failed.
    #[error("unable to build token: {0}")]
    Build(#[source] serde_json::Error),

    /// The token lifetime does not fit in a timestamp.
    #[error("unable to build token: ttl of {0:?} is out of range")]
    TtlOutOfRange(Duration),

    /// A required claim is absent from the claim set.
    #[error("token does not contain {claim:?}")]
    MissingClaim { claim: &'static str },

    /// A claim is present but holds a value of the wrong type.
    #[error("token claim {claim:?} is not {expected}")]
    InvalidClaimType {
        claim: &'static str,
        expected: &'static str,
    },
}

#[derive(Serialize)]
struct IssuedClaims<'a> {
    exp: i64,
    scopes: &'a [String],
}

/// Mints tokens with a fixed lifetime and scope set.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    ttl: Duration,
    scopes: Vec<String>,
}

impl TokenIssuer {
    /// Create an issuer whose tokens expire `ttl` after issuance and carry no scopes.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            scopes: Vec::new(),
        }
    }

    /// Grant `scopes` (in order) to every token this issuer mints.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token expiring `ttl` from now.
    pub fn issue(&self) -> Result<Token, TokenError> {
        self.issue_at(Utc::now())
    }

    /// Mint a token as if the current time were `now`.
    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<Token, TokenError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|_| TokenError::TtlOutOfRange(self.ttl))?;
        // `exp` has second precision; keep the in-memory expiry identical.
        let expiry = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::TtlOutOfRange(self.ttl))?
            .trunc_subsecs(0);

        let claims = serde_json::to_value(IssuedClaims {
            exp: expiry.timestamp(),
            scopes: &self.scopes,
        })
        .and_then(serde_json::from_value::<ClaimSet>)
        .map_err(TokenError::Build)?;

        Ok(Token { expiry, claims })
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// An immutable, short-lived authorization credential.
///
/// There are no setters: once built, the claims stay as they are for the
/// remainder of the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    expiry: DateTime<Utc>,
    claims: ClaimSet,
}

impl Token {
    /// Mint a token expiring in 15 minutes with an empty scope list.
    pub fn issue_default() -> Result<Self, TokenError> {
        TokenIssuer::default().issue()
    }

    /// Build a token from an arbitrary claim set.
    ///
    /// The `exp` claim is required here; `scopes` is only checked when read,
    /// so a token without it can exist and reports the gap through
    /// [`Token::scopes`].
    pub fn from_claims(claims: ClaimSet) -> Result<Self, TokenError> {
        let exp = claims
            .get(EXPIRY_CLAIM)
            .ok_or(TokenError::MissingClaim {
                claim: EXPIRY_CLAIM,
            })?
            .as_i64()
            .ok_or(TokenError::InvalidClaimType {
                claim: EXPIRY_CLAIM,
                expected: "an integer timestamp",
            })?;

        let expiry = DateTime::<Utc>::from_timestamp(exp, 0).ok_or(
            TokenError::InvalidClaimType {
                claim: EXPIRY_CLAIM,
                expected: "a representable timestamp",
            },
        )?;

        Ok(Self { expiry, claims })
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Raw access to a single claim.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// The scopes granted to the bearer, in issuance order.
    ///
    /// A claim set without `scopes` is an error, never an empty list: that
    /// keeps "malformed token" apart from "token with no grants".
    pub fn scopes(&self) -> Result<Vec<String>, TokenError> {
        let value = self
            .claims
            .get(SCOPES_CLAIM)
            .ok_or(TokenError::MissingClaim {
                claim: SCOPES_CLAIM,
            })?;

        let invalid = || TokenError::InvalidClaimType {
            claim: SCOPES_CLAIM,
            expected: "an array of strings",
        };

        value
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|scope| scope.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn assert_expires_in_default_ttl(token: &Token, before: DateTime<Utc>, after: DateTime<Utc>) {
        // `exp` is carried with second precision.
        let lower = before + chrono::Duration::minutes(15) - chrono::Duration::seconds(1);
        let upper = after + chrono::Duration::minutes(15) + chrono::Duration::seconds(1);
        assert!(
            token.expiry() >= lower && token.expiry() <= upper,
            "expiry {} outside [{lower}, {upper}]",
            token.expiry()
        );
    }

    #[test]
    fn test_issue_default_tokens_are_independent() {
        let before = Utc::now();
        let first = Token::issue_default().unwrap();
        let second = Token::issue_default().unwrap();
        let after = Utc::now();

        assert_expires_in_default_ttl(&first, before, after);
        assert_expires_in_default_ttl(&second, before, after);
        assert_eq!(first.scopes().unwrap(), Vec::<String>::new());
        assert_eq!(second.scopes().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_issue_at_writes_numeric_date() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let token = TokenIssuer::default().issue_at(now).unwrap();

        assert_eq!(token.claim(EXPIRY_CLAIM), Some(&json!(1_700_000_900)));
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + chrono::Duration::minutes(15)));
    }

    #[test]
    fn test_expiry_matches_exp_claim() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let token = TokenIssuer::default().issue_at(now).unwrap();

        assert_eq!(token.expiry().timestamp_subsec_nanos(), 0);
        let rebuilt = Token::from_claims(token.claims.clone()).unwrap();
        assert_eq!(rebuilt.expiry(), token.expiry());
        assert_eq!(rebuilt, token);
    }

    #[test]
    fn test_issuer_scopes_keep_order() {
        let token = TokenIssuer::new(Duration::from_secs(60))
            .with_scopes(["status:read", "admin", "audit"])
            .issue()
            .unwrap();

        assert_eq!(token.scopes().unwrap(), vec!["status:read", "admin", "audit"]);
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        let result = TokenIssuer::new(Duration::MAX).issue();
        assert!(matches!(result, Err(TokenError::TtlOutOfRange(_))));
    }

    #[test]
    fn test_missing_scopes_claim_is_an_error() {
        let mut claims = ClaimSet::new();
        claims.insert(EXPIRY_CLAIM.to_string(), json!(1_700_000_000));
        let token = Token::from_claims(claims).unwrap();

        let err = token.scopes().unwrap_err();
        assert!(matches!(err, TokenError::MissingClaim { claim: "scopes" }));
        assert_eq!(err.to_string(), "token does not contain \"scopes\"");
    }

    #[test]
    fn test_wrongly_typed_scopes_claim_is_an_error() {
        for bad in [json!("admin"), json!(["admin", 7]), json!({"admin": true})] {
            let mut claims = ClaimSet::new();
            claims.insert(EXPIRY_CLAIM.to_string(), json!(1_700_000_000));
            claims.insert(SCOPES_CLAIM.to_string(), bad);
            let token = Token::from_claims(claims).unwrap();

            assert!(matches!(
                token.scopes(),
                Err(TokenError::InvalidClaimType {
                    claim: "scopes",
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_from_claims_requires_expiry() {
        let mut claims = ClaimSet::new();
        claims.insert(SCOPES_CLAIM.to_string(), json!([]));

        assert!(matches!(
            Token::from_claims(claims),
            Err(TokenError::MissingClaim { claim: "exp" })
        ));
    }
}
