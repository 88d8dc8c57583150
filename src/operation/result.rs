//! The mutable result of an operation.

use crate::dn::Dn;
use crate::error::{DirectoryError, ResultCode};
use log::warn;

/// Result code, diagnostic message, matched DN and referrals of an operation.
///
/// The code is assigned once, where the pipeline stops. Later attempts to
/// set it are ignored and logged; the only sanctioned way to change an
/// assigned result is [`OperationResult::override_with`], used by
/// post-operation plugins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResult {
    result_code: Option<ResultCode>,
    message: String,
    matched_dn: Option<Dn>,
    referrals: Vec<String>,
    auth_failure_reason: Option<String>,
}

impl OperationResult {
    pub fn result_code(&self) -> Option<ResultCode> {
        self.result_code
    }

    pub fn is_set(&self) -> bool {
        self.result_code.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.result_code == Some(ResultCode::Success)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn matched_dn(&self) -> Option<&Dn> {
        self.matched_dn.as_ref()
    }

    pub fn referrals(&self) -> &[String] {
        &self.referrals
    }

    /// Server-side reason for a failed authentication. Never sent to the client.
    pub fn auth_failure_reason(&self) -> Option<&str> {
        self.auth_failure_reason.as_deref()
    }

    /// Assign the final result code and message. Returns `false` if a result
    /// was already assigned.
    pub fn set(&mut self, result_code: ResultCode, message: impl Into<String>) -> bool {
        if let Some(existing) = self.result_code {
            warn!(
                "Ignoring attempt to replace result {} with {}",
                existing, result_code
            );
            return false;
        }
        self.result_code = Some(result_code);
        self.message = message.into();
        true
    }

    /// Assign the result carried by an error.
    pub fn fail(&mut self, error: &DirectoryError) -> bool {
        if !self.set(error.result_code, error.message.clone()) {
            return false;
        }
        self.apply_details(error);
        true
    }

    /// Replace whatever result was assigned. Only post-operation plugins may
    /// downgrade a result this way.
    pub fn override_with(&mut self, error: &DirectoryError) {
        self.result_code = Some(error.result_code);
        self.message = error.message.clone();
        self.matched_dn = None;
        self.referrals.clear();
        self.apply_details(error);
    }

    fn apply_details(&mut self, error: &DirectoryError) {
        if error.result_code == ResultCode::NoSuchObject {
            self.matched_dn = error.matched_dn.clone();
        }
        self.referrals = error.referrals.clone();
    }

    /// Drop the matched DN, e.g. when it must not be disclosed.
    pub fn clear_matched_dn(&mut self) {
        self.matched_dn = None;
    }

    pub fn set_auth_failure_reason(&mut self, reason: impl Into<String>) {
        self.auth_failure_reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_is_assigned_once() {
        let mut result = OperationResult::default();
        assert!(result.set(ResultCode::Success, ""));
        assert!(!result.set(ResultCode::Other, "late failure"));
        assert_eq!(result.result_code(), Some(ResultCode::Success));
        assert_eq!(result.message(), "");
    }

    #[test]
    fn matched_dn_only_kept_for_no_such_object() {
        let matched = Dn::parse("o=test").unwrap();
        let mut result = OperationResult::default();
        result.fail(
            &DirectoryError::unwilling_to_perform("nope").with_matched_dn(Some(matched.clone())),
        );
        assert!(result.matched_dn().is_none());

        let mut result = OperationResult::default();
        result.fail(&DirectoryError::no_such_object("missing", Some(matched.clone())));
        assert_eq!(result.matched_dn(), Some(&matched));
    }

    #[test]
    fn override_replaces_everything() {
        let mut result = OperationResult::default();
        result.fail(&DirectoryError::no_such_object(
            "missing",
            Some(Dn::parse("o=test").unwrap()),
        ));
        result.override_with(&DirectoryError::unwilling_to_perform("post-op veto"));
        assert_eq!(result.result_code(), Some(ResultCode::UnwillingToPerform));
        assert!(result.matched_dn().is_none());
        assert_eq!(result.message(), "post-op veto");
    }
}
