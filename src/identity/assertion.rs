use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailEntry {
    pub value: String,
}

/// Profile returned by a completed identity-provider handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityAssertion {
    pub id: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub emails: Vec<EmailEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl IdentityAssertion {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, emails: &[&str]) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            emails: emails.iter().map(|e| EmailEntry { value: e.to_string() }).collect(),
            ..Default::default()
        }
    }

    /// The email used for administrator matching: always the first listed.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(|e| e.value.as_str()).filter(|e| !e.is_empty())
    }

    /// Build from an OIDC userinfo document. `sub` is required.
    pub fn from_userinfo(info: &serde_json::Value) -> Option<Self> {
        let text = |k: &str| info.get(k).and_then(|v| v.as_str()).map(str::to_string);
        let id = text("sub").filter(|s| !s.is_empty())?;
        let emails = text("email").map(|value| vec![EmailEntry { value }]).unwrap_or_default();
        Some(Self {
            display_name: text("name").unwrap_or_else(|| id.clone()),
            id,
            emails,
            nickname: text("nickname"),
            picture: text("picture"),
        })
    }
}
