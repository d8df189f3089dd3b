//! Declarative upload policy and its resolved, read-only form.
//!
//! `UploadPolicy` is what callers write (usually as JSON). It keeps the
//! optional, nested shape callers are used to. `ResolvedPolicy` is built
//! once from it, with every default filled in, and is then shared
//! read-only across requests.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Mimetype marker that enables JSON ingestion when present in the global list.
pub const JSON_MIMETYPE: &str = "application/json";

const DEFAULT_FIELD_FILE_LIMIT: usize = 1;
const DEFAULT_BASE64_FIELD_NAME: &str = "base64";
const DEFAULT_URL_FIELD_NAME: &str = "urls";

/// How a detected mimetype is compared against an allow-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeMatch {
    /// Case-sensitive substring containment (`image/` admits `image/png`).
    #[default]
    Contains,
    /// Exact string equality.
    Exact,
}

impl MimeMatch {
    pub fn matches(&self, expected: &str, actual: &str) -> bool {
        match self {
            MimeMatch::Contains => actual.contains(expected),
            MimeMatch::Exact => actual == expected,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetypes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<FileLimits>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            mimetypes: None,
            limits: None,
        }
    }

    pub fn with_mimetypes<I, S>(mut self, mimetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mimetypes = Some(mimetypes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_file_limit(mut self, files: usize) -> Self {
        self.limits = Some(FileLimits { files: Some(files) });
        self
    }
}

/// Upload policy as configured by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadPolicy {
    pub enabled_fields: Vec<FieldRule>,
    pub enabled_additional_fields: bool,
    pub limits: Option<FileLimits>,
    pub mimetypes: Vec<String>,
    pub mime_match: MimeMatch,
    pub body_base64_field_name: String,
    pub body_url_field_name: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            enabled_fields: Vec::new(),
            enabled_additional_fields: false,
            limits: None,
            mimetypes: Vec::new(),
            mime_match: MimeMatch::default(),
            body_base64_field_name: DEFAULT_BASE64_FIELD_NAME.to_string(),
            body_url_field_name: DEFAULT_URL_FIELD_NAME.to_string(),
        }
    }
}

impl UploadPolicy {
    /// Parse a policy from its JSON representation.
    pub fn from_json(raw: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid upload policy: {}", e))
    }

    /// Fill in defaults and check the policy for contradictions.
    pub fn resolve(&self) -> Result<ResolvedPolicy, anyhow::Error> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.enabled_fields.len());

        for rule in &self.enabled_fields {
            let field = rule.field.trim();
            if field.is_empty() {
                return Err(anyhow::anyhow!("Field rules must name a field"));
            }
            if !seen.insert(field.to_string()) {
                return Err(anyhow::anyhow!("Field {} is declared more than once", field));
            }

            // A rule without an explicit positive limit admits one file.
            let file_limit = rule
                .limits
                .as_ref()
                .and_then(|l| l.files)
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_FIELD_FILE_LIMIT);

            rules.push(ResolvedRule {
                field: field.to_string(),
                mimetypes: rule.mimetypes.clone().unwrap_or_default(),
                file_limit,
            });
        }

        if self.body_base64_field_name.trim().is_empty()
            || self.body_url_field_name.trim().is_empty()
        {
            return Err(anyhow::anyhow!("JSON body field names must not be empty"));
        }

        Ok(ResolvedPolicy {
            rules,
            allow_undeclared_fields: self.enabled_additional_fields,
            default_file_limit: self.limits.as_ref().and_then(|l| l.files).filter(|&n| n > 0),
            json_enabled: self.mimetypes.iter().any(|m| m == JSON_MIMETYPE),
            default_mimetypes: self.mimetypes.clone(),
            mime_match: self.mime_match,
            body_base64_field_name: self.body_base64_field_name.clone(),
            body_url_field_name: self.body_url_field_name.clone(),
        })
    }
}

/// One field rule with its defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    pub field: String,
    /// Empty means any mimetype is accepted for this field.
    pub mimetypes: Vec<String>,
    pub file_limit: usize,
}

/// Fully-resolved upload policy. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    rules: Vec<ResolvedRule>,
    allow_undeclared_fields: bool,
    default_file_limit: Option<usize>,
    default_mimetypes: Vec<String>,
    json_enabled: bool,
    mime_match: MimeMatch,
    body_base64_field_name: String,
    body_url_field_name: String,
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            allow_undeclared_fields: false,
            default_file_limit: None,
            default_mimetypes: Vec::new(),
            json_enabled: false,
            mime_match: MimeMatch::default(),
            body_base64_field_name: DEFAULT_BASE64_FIELD_NAME.to_string(),
            body_url_field_name: DEFAULT_URL_FIELD_NAME.to_string(),
        }
    }
}

impl ResolvedPolicy {
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// First rule declared for `field`, if any.
    pub fn rule_for(&self, field: &str) -> Option<&ResolvedRule> {
        self.rules.iter().find(|rule| rule.field == field)
    }

    pub fn allow_undeclared_fields(&self) -> bool {
        self.allow_undeclared_fields
    }

    pub fn default_file_limit(&self) -> Option<usize> {
        self.default_file_limit
    }

    pub fn default_mimetypes(&self) -> &[String] {
        &self.default_mimetypes
    }

    pub fn json_enabled(&self) -> bool {
        self.json_enabled
    }

    pub fn mime_match(&self) -> MimeMatch {
        self.mime_match
    }

    pub fn body_base64_field_name(&self) -> &str {
        &self.body_base64_field_name
    }

    pub fn body_url_field_name(&self) -> &str {
        &self.body_url_field_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_applies_field_limit_default() {
        let policy = UploadPolicy {
            enabled_fields: vec![
                FieldRule::new("doc"),
                FieldRule::new("photos").with_file_limit(3),
                FieldRule {
                    field: "scan".to_string(),
                    mimetypes: None,
                    limits: Some(FileLimits { files: Some(0) }),
                },
            ],
            ..UploadPolicy::default()
        };
        let resolved = policy.resolve().unwrap();
        assert_eq!(resolved.rule_for("doc").unwrap().file_limit, 1);
        assert_eq!(resolved.rule_for("photos").unwrap().file_limit, 3);
        assert_eq!(resolved.rule_for("scan").unwrap().file_limit, 1);
        assert!(resolved.rule_for("other").is_none());
    }

    #[test]
    fn test_resolve_rejects_duplicate_fields() {
        let policy = UploadPolicy {
            enabled_fields: vec![FieldRule::new("doc"), FieldRule::new("doc")],
            ..UploadPolicy::default()
        };
        assert!(policy.resolve().is_err());
    }

    #[test]
    fn test_json_marker_enables_json_mode() {
        let policy = UploadPolicy {
            mimetypes: vec!["image/".to_string(), JSON_MIMETYPE.to_string()],
            ..UploadPolicy::default()
        };
        let resolved = policy.resolve().unwrap();
        assert!(resolved.json_enabled());
        assert!(!UploadPolicy::default().resolve().unwrap().json_enabled());
    }

    #[test]
    fn test_zero_global_limit_means_unlimited() {
        let policy = UploadPolicy {
            limits: Some(FileLimits { files: Some(0) }),
            ..UploadPolicy::default()
        };
        assert_eq!(policy.resolve().unwrap().default_file_limit(), None);
    }

    #[test]
    fn test_policy_from_json() {
        let raw = r#"{
            "enabledFields": [
                { "field": "avatar", "mimetypes": ["image/"], "limits": { "files": 2 } }
            ],
            "enabledAdditionalFields": true,
            "limits": { "files": 5 },
            "mimetypes": ["application/json"],
            "mimeMatch": "exact"
        }"#;
        let policy = UploadPolicy::from_json(raw).unwrap();
        let resolved = policy.resolve().unwrap();
        assert_eq!(resolved.rule_for("avatar").unwrap().file_limit, 2);
        assert!(resolved.allow_undeclared_fields());
        assert_eq!(resolved.default_file_limit(), Some(5));
        assert_eq!(resolved.mime_match(), MimeMatch::Exact);
        assert_eq!(resolved.body_base64_field_name(), "base64");
        assert_eq!(resolved.body_url_field_name(), "urls");
    }

    #[test]
    fn test_mime_match_modes() {
        assert!(MimeMatch::Contains.matches("image/", "image/png"));
        assert!(!MimeMatch::Contains.matches("Image/", "image/png"));
        assert!(!MimeMatch::Exact.matches("image/", "image/png"));
        assert!(MimeMatch::Exact.matches("image/png", "image/png"));
    }
}
