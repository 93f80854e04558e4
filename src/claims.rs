use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single identity assertion: a `(type, value)` pair issued by the
/// provider.
///
/// Serializes as `{"type": ..., "value": ...}` — the shape the `/claims`
/// endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

/// Ordered set of claims forming the authenticated user's identity.
///
/// Order is preserved end-to-end: claims appear in the session cookie and
/// in the `/claims` response exactly as they were issued. The same claim
/// type may occur more than once (`role` typically does); an exact
/// `(type, value)` pair never occurs twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Vec<Claim>);

/// Rule mapping a raw JSON key from the provider onto a claim type.
///
/// The default registration maps the `role` JSON key to the `role` claim
/// type; additional rules are configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMapping {
    pub json_key: String,
    pub claim_type: String,
}

impl ClaimMapping {
    #[must_use]
    pub fn new(json_key: impl Into<String>, claim_type: impl Into<String>) -> Self {
        Self {
            json_key: json_key.into(),
            claim_type: claim_type.into(),
        }
    }
}

impl ClaimSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a claim unless the exact `(type, value)` pair is already
    /// present. Repeats of the same type with different values are kept.
    pub fn push(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        let claim = Claim {
            claim_type: claim_type.into(),
            value: value.into(),
        };
        if !self.0.contains(&claim) {
            self.0.push(claim);
        }
    }

    /// First value for a claim type.
    #[must_use]
    pub fn get(&self, claim_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// All values for a claim type, in issuance order.
    pub fn all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    #[must_use]
    pub fn has(&self, claim_type: &str, value: &str) -> bool {
        self.0
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    #[must_use]
    pub fn has_role(&self, role_claim: &str, role: &str) -> bool {
        self.has(role_claim, role)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Folds a JSON value into claims of the given type: a string becomes
    /// one claim, an array one claim per scalar element, numbers and bools
    /// their string rendering. Nulls and objects are skipped.
    pub fn merge_value(&mut self, claim_type: &str, value: &JsonValue) {
        match value {
            JsonValue::String(s) => self.push(claim_type, s.clone()),
            JsonValue::Bool(b) => self.push(claim_type, b.to_string()),
            JsonValue::Number(n) => self.push(claim_type, n.to_string()),
            JsonValue::Array(items) => {
                for item in items {
                    match item {
                        JsonValue::String(s) => self.push(claim_type, s.clone()),
                        JsonValue::Bool(b) => self.push(claim_type, b.to_string()),
                        JsonValue::Number(n) => self.push(claim_type, n.to_string()),
                        _ => {}
                    }
                }
            }
            JsonValue::Null | JsonValue::Object(_) => {}
        }
    }

    /// Builds a claim set from a JSON object in document order, skipping
    /// the `excluded` keys.
    #[must_use]
    pub fn from_json_object(
        object: &serde_json::Map<String, JsonValue>,
        excluded: &[&str],
    ) -> Self {
        let mut claims = Self::new();
        for (key, value) in object {
            if excluded.contains(&key.as_str()) {
                continue;
            }
            claims.merge_value(key, value);
        }
        claims
    }

    /// Merges claims fetched from the userinfo endpoint into an existing
    /// set: mapping rules apply first, then remaining scalar fields under
    /// their own names, but only for claim types the set does not already
    /// carry. The provider's original assertions are never overwritten.
    pub fn merge_userinfo(
        &mut self,
        userinfo: &serde_json::Map<String, JsonValue>,
        mappings: &[ClaimMapping],
        excluded: &[&str],
    ) {
        for mapping in mappings {
            if let Some(value) = userinfo.get(&mapping.json_key) {
                if self.get(&mapping.claim_type).is_none() {
                    self.merge_value(&mapping.claim_type, value);
                }
            }
        }
        for (key, value) in userinfo {
            if excluded.contains(&key.as_str()) {
                continue;
            }
            if mappings.iter().any(|m| &m.json_key == key) {
                continue;
            }
            if self.get(key).is_none() {
                self.merge_value(key, value);
            }
        }
    }
}

impl IntoIterator for ClaimSet {
    type Item = Claim;
    type IntoIter = std::vec::IntoIter<Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
