use serde::{Deserialize, Serialize};

/// Administrator confirmed for the current request. Attached as a request
/// extension by the authorization predicate; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizedPrincipal {
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}
