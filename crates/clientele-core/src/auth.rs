use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Verdict returned by the login service for a bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

impl TokenValidation {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Identity attached to a request once its token has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Option<String>,
    pub email: Option<String>,
}

impl From<TokenValidation> for Caller {
    fn from(v: TokenValidation) -> Self {
        Self {
            user_id: v.user_id,
            email: v.email,
        }
    }
}
