use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity claims carried by a Google id token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Stable Google account identifier
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// Hosted (Workspace) domain of the account
    #[serde(default)]
    pub hd: Option<String>,
}

/// Decode the claims of a Google id token
///
/// The signature is not verified: the token was received directly from
/// Google's token endpoint over TLS, so it is only read for identity.
///
/// # Errors
///
/// Returns an error if the JWT is malformed or lacks the `sub` claim
pub fn decode_id_token(token: &str) -> Result<IdTokenClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(token_data.claims)
}
