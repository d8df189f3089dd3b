use std::sync::Arc;

use barkeeper_core::{AcceptedFile, IngestError, ResolvedPolicy, ResolvedRule};

/// Policy rejections raised while validating an upload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyRejection {
    #[error("The field {field} is not expected")]
    UnexpectedField { field: String },

    #[error("{}", mimetype_message(field.as_deref(), allowed))]
    UnsupportedMimetype {
        /// Set when the allow-list came from a field rule.
        field: Option<String>,
        mimetype: String,
        allowed: Vec<String>,
    },

    #[error("{}", file_count_message(field.as_deref(), *limit))]
    TooManyFiles {
        /// Set when the limit came from a field rule.
        field: Option<String>,
        limit: usize,
    },
}

fn mimetype_message(field: Option<&str>, allowed: &[String]) -> String {
    match field {
        Some(field) => format!(
            "The field {} expected one of the following mimetypes: {}",
            field,
            allowed.join(",")
        ),
        None => format!(
            "Expected one of the following mimetypes: {}",
            allowed.join(",")
        ),
    }
}

fn file_count_message(field: Option<&str>, limit: usize) -> String {
    match field {
        Some(field) => format!("The field {} accepts a maximum of {} files", field, limit),
        None => format!("Accepts a maximum of {} files", limit),
    }
}

impl From<PolicyRejection> for IngestError {
    fn from(rejection: PolicyRejection) -> Self {
        let message = rejection.to_string();
        match rejection {
            PolicyRejection::UnexpectedField { .. } => IngestError::UnexpectedField(message),
            PolicyRejection::UnsupportedMimetype { .. } => {
                IngestError::UnsupportedMimetype(message)
            }
            PolicyRejection::TooManyFiles { .. } => IngestError::too_many_files(message),
        }
    }
}

/// Upload policy validator
///
/// Pure checks over a resolved policy. The validator never mutates the
/// policy or the accepted list; callers decide what to do with a rejection.
#[derive(Debug, Clone)]
pub struct FieldPolicyValidator {
    policy: Arc<ResolvedPolicy>,
}

impl FieldPolicyValidator {
    pub fn new(policy: Arc<ResolvedPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    /// Check that files may be sent under `field`.
    ///
    /// Returns the matching rule for declared fields and `None` for fields
    /// admitted because no rules exist or undeclared fields are enabled.
    pub fn check_field_allowed(&self, field: &str) -> Result<Option<&ResolvedRule>, PolicyRejection> {
        if !self.policy.has_rules() {
            return Ok(None);
        }

        if let Some(rule) = self.policy.rule_for(field) {
            return Ok(Some(rule));
        }

        if self.policy.allow_undeclared_fields() {
            return Ok(None);
        }

        tracing::debug!(field, "Field is not declared by the upload policy");
        Err(PolicyRejection::UnexpectedField {
            field: field.to_string(),
        })
    }

    /// Check a mimetype against the allow-list that applies to `field`.
    pub fn check_mimetype(&self, field: &str, mimetype: &str) -> Result<(), PolicyRejection> {
        let rule = self.check_field_allowed(field)?;

        let (allowed, rule_field) = match rule {
            Some(rule) => (rule.mimetypes.as_slice(), Some(rule.field.clone())),
            None => (self.policy.default_mimetypes(), None),
        };

        if allowed.is_empty() {
            return Ok(());
        }

        let mime_match = self.policy.mime_match();
        if allowed
            .iter()
            .any(|expected| mime_match.matches(expected, mimetype))
        {
            return Ok(());
        }

        tracing::debug!(field, mimetype, allowed = ?allowed, "Mimetype rejected");
        Err(PolicyRejection::UnsupportedMimetype {
            field: rule_field,
            mimetype: mimetype.to_string(),
            allowed: allowed.to_vec(),
        })
    }

    /// Check that one more file may be accepted under `field`, given the
    /// files accepted so far in this request.
    pub fn check_file_count(
        &self,
        accepted: &[AcceptedFile],
        field: &str,
    ) -> Result<(), PolicyRejection> {
        let rule = self.check_field_allowed(field)?;

        let (count, limit, rule_field) = match rule {
            Some(rule) => (
                accepted.iter().filter(|f| f.field_name == field).count(),
                rule.file_limit,
                Some(rule.field.clone()),
            ),
            None => match self.policy.default_file_limit() {
                Some(limit) => (accepted.len(), limit, None),
                None => return Ok(()),
            },
        };

        if count < limit {
            return Ok(());
        }

        tracing::debug!(field, count, limit, "File count limit reached");
        Err(PolicyRejection::TooManyFiles {
            field: rule_field,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barkeeper_core::{FieldRule, FileLimits, MimeMatch, UploadPolicy};

    fn validator(policy: UploadPolicy) -> FieldPolicyValidator {
        FieldPolicyValidator::new(Arc::new(policy.resolve().unwrap()))
    }

    fn accepted(field: &str) -> AcceptedFile {
        AcceptedFile {
            key: "k".to_string(),
            field_name: field.to_string(),
            original_name: "f.bin".to_string(),
            encoding: "7bit".to_string(),
            mime_type: "image/png".to_string(),
            extension: Some("png".to_string()),
            size_bytes: 1,
        }
    }

    #[test]
    fn test_no_rules_allows_any_field() {
        let v = validator(UploadPolicy::default());
        assert_eq!(v.check_field_allowed("anything"), Ok(None));
    }

    #[test]
    fn test_undeclared_field_rejected() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("avatar")],
            ..UploadPolicy::default()
        });
        let err = v.check_field_allowed("other").unwrap_err();
        assert_eq!(err.to_string(), "The field other is not expected");
        assert!(v.check_field_allowed("avatar").unwrap().is_some());
    }

    #[test]
    fn test_undeclared_field_admitted_when_additional_enabled() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("avatar")],
            enabled_additional_fields: true,
            ..UploadPolicy::default()
        });
        assert_eq!(v.check_field_allowed("other"), Ok(None));
    }

    #[test]
    fn test_field_mimetypes_use_substring_match() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("avatar").with_mimetypes(["image/"])],
            ..UploadPolicy::default()
        });
        assert!(v.check_mimetype("avatar", "image/png").is_ok());
        let err = v.check_mimetype("avatar", "application/pdf").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The field avatar expected one of the following mimetypes: image/"
        );
    }

    #[test]
    fn test_undeclared_field_uses_global_mimetypes() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("avatar")],
            enabled_additional_fields: true,
            mimetypes: vec!["application/pdf".to_string()],
            ..UploadPolicy::default()
        });
        // Declared field without its own list accepts anything.
        assert!(v.check_mimetype("avatar", "text/plain").is_ok());
        assert!(v.check_mimetype("scan", "application/pdf").is_ok());
        let err = v.check_mimetype("scan", "image/png").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected one of the following mimetypes: application/pdf"
        );
    }

    #[test]
    fn test_exact_mime_match() {
        let v = validator(UploadPolicy {
            mimetypes: vec!["image/png".to_string()],
            mime_match: MimeMatch::Exact,
            ..UploadPolicy::default()
        });
        assert!(v.check_mimetype("f", "image/png").is_ok());
        assert!(v.check_mimetype("f", "image/png; charset=binary").is_err());
    }

    #[test]
    fn test_mimetype_check_runs_field_check_first() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("avatar")],
            ..UploadPolicy::default()
        });
        assert!(matches!(
            v.check_mimetype("other", "image/png"),
            Err(PolicyRejection::UnexpectedField { .. })
        ));
    }

    #[test]
    fn test_field_count_limit_defaults_to_one() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![FieldRule::new("doc")],
            ..UploadPolicy::default()
        });
        assert!(v.check_file_count(&[], "doc").is_ok());
        let err = v.check_file_count(&[accepted("doc")], "doc").unwrap_err();
        assert_eq!(err.to_string(), "The field doc accepts a maximum of 1 files");
    }

    #[test]
    fn test_field_count_only_counts_same_field() {
        let v = validator(UploadPolicy {
            enabled_fields: vec![
                FieldRule::new("doc").with_file_limit(2),
                FieldRule::new("photo"),
            ],
            ..UploadPolicy::default()
        });
        let so_far = vec![accepted("photo"), accepted("doc")];
        assert!(v.check_file_count(&so_far, "doc").is_ok());
        assert!(v.check_file_count(&so_far, "photo").is_err());
    }

    #[test]
    fn test_global_count_limit_for_undeclared_fields() {
        let v = validator(UploadPolicy {
            limits: Some(FileLimits { files: Some(2) }),
            ..UploadPolicy::default()
        });
        let so_far = vec![accepted("a"), accepted("b")];
        assert!(v.check_file_count(&so_far[..1], "c").is_ok());
        let err = v.check_file_count(&so_far, "c").unwrap_err();
        assert_eq!(err.to_string(), "Accepts a maximum of 2 files");
    }

    #[test]
    fn test_no_global_limit_is_unbounded() {
        let v = validator(UploadPolicy::default());
        let so_far: Vec<_> = (0..100).map(|_| accepted("x")).collect();
        assert!(v.check_file_count(&so_far, "x").is_ok());
    }

    #[test]
    fn test_rejection_maps_to_ingest_error() {
        let err: IngestError = PolicyRejection::TooManyFiles {
            field: Some("doc".to_string()),
            limit: 1,
        }
        .into();
        assert_eq!(
            err,
            IngestError::too_many_files("The field doc accepts a maximum of 1 files")
        );
    }
}
