//! Certificate-to-account mapping
//!
//! An ordered rule list walked once per resolution; the first rule that
//! matches wins. If two rules could both match the same certificate the
//! configured order is the only tie-break — that contract is deliberate
//! and callers must not expect most-specific-match behavior.

use regex::Regex;

use strata_core::MappingRuleConfig;

/// One mapping rule: a match condition plus the account it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRule {
    /// Exact match against the one-line subject
    ExactSubject {
        /// Subject string to compare against
        pattern: String,
        /// Account granted on match
        account: String,
    },
    /// Regex match against the one-line subject
    RegexSubject {
        /// Regex source, compiled per invocation
        pattern: String,
        /// Account granted on match
        account: String,
    },
    /// Exact match against any certificate email
    ExactEmail {
        /// Email to compare against
        pattern: String,
        /// Account granted on match
        account: String,
    },
    /// Regex match against any certificate email
    RegexEmail {
        /// Regex source, compiled per invocation
        pattern: String,
        /// Account granted on match
        account: String,
    },
}

impl MappingRule {
    /// The account this rule grants.
    pub fn account(&self) -> &str {
        match self {
            Self::ExactSubject { account, .. }
            | Self::RegexSubject { account, .. }
            | Self::ExactEmail { account, .. }
            | Self::RegexEmail { account, .. } => account,
        }
    }

    /// Whether this rule matches the certificate's subject or any of its
    /// emails. A regex that fails to compile makes the rule a non-match
    /// (logged), never an abort.
    pub fn matches(&self, subject: &str, emails: &[String]) -> bool {
        match self {
            Self::ExactSubject { pattern, .. } => pattern == subject,
            Self::RegexSubject { pattern, .. } => {
                regex_matches(pattern, std::iter::once(subject))
            }
            Self::ExactEmail { pattern, .. } => emails.iter().any(|e| e == pattern),
            Self::RegexEmail { pattern, .. } => {
                regex_matches(pattern, emails.iter().map(String::as_str))
            }
        }
    }
}

fn regex_matches<'a>(pattern: &str, inputs: impl Iterator<Item = &'a str>) -> bool {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "skipping mapping rule with invalid regex");
            return false;
        }
    };
    let mut inputs = inputs;
    inputs.any(|input| regex.is_match(input))
}

impl From<MappingRuleConfig> for MappingRule {
    fn from(config: MappingRuleConfig) -> Self {
        match config {
            MappingRuleConfig::ExactSubject { pattern, account } => {
                Self::ExactSubject { pattern, account }
            }
            MappingRuleConfig::RegexSubject { pattern, account } => {
                Self::RegexSubject { pattern, account }
            }
            MappingRuleConfig::ExactEmail { pattern, account } => {
                Self::ExactEmail { pattern, account }
            }
            MappingRuleConfig::RegexEmail { pattern, account } => {
                Self::RegexEmail { pattern, account }
            }
        }
    }
}

/// Resolves a verified certificate to a local account name.
#[derive(Debug, Clone, Default)]
pub struct AccountMapper {
    rules: Vec<MappingRule>,
}

impl AccountMapper {
    /// Build a mapper over an ordered rule list.
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// Walk the rules once, in configured order, and return the first
    /// matching rule's account. `None` means no account: the caller must
    /// treat that as access denied, not as an error to retry.
    pub fn find_account(&self, subject: &str, emails: &[String]) -> Option<String> {
        let rule = self.rules.iter().find(|r| r.matches(subject, emails))?;
        tracing::debug!(subject = %subject, account = %rule.account(), "mapped certificate to account");
        Some(rule.account().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn regex_subject_rule_matches() {
        let mapper = AccountMapper::new(vec![MappingRule::RegexSubject {
            pattern: r"^/CN=.*\.example\.com$".into(),
            account: "svc-acct".into(),
        }]);
        assert_eq!(
            mapper.find_account("/CN=node1.example.com", &[]),
            Some("svc-acct".to_string())
        );
        assert_eq!(mapper.find_account("/CN=node1.other.org", &[]), None);
    }

    #[test]
    fn exact_subject_requires_full_equality() {
        let mapper = AccountMapper::new(vec![MappingRule::ExactSubject {
            pattern: "/O=Acme/CN=bsmith".into(),
            account: "bsmith".into(),
        }]);
        assert_eq!(
            mapper.find_account("/O=Acme/CN=bsmith", &[]),
            Some("bsmith".to_string())
        );
        assert_eq!(mapper.find_account("/O=Acme/CN=bsmithx", &[]), None);
    }

    #[test]
    fn email_rules_test_every_email() {
        let mapper = AccountMapper::new(vec![
            MappingRule::ExactEmail {
                pattern: "root@example.com".into(),
                account: "root".into(),
            },
            MappingRule::RegexEmail {
                pattern: "@example\\.com$".into(),
                account: "user".into(),
            },
        ]);
        assert_eq!(
            mapper.find_account("/CN=x", &emails(&["other@else.org", "root@example.com"])),
            Some("root".to_string())
        );
        assert_eq!(
            mapper.find_account("/CN=x", &emails(&["bsmith@example.com"])),
            Some("user".to_string())
        );
        assert_eq!(mapper.find_account("/CN=x", &emails(&["x@else.org"])), None);
    }

    #[test]
    fn first_match_wins_in_configured_order() {
        let mapper = AccountMapper::new(vec![
            MappingRule::RegexSubject {
                pattern: "^/CN=".into(),
                account: "generic".into(),
            },
            MappingRule::ExactSubject {
                pattern: "/CN=admin".into(),
                account: "admin".into(),
            },
        ]);
        // the broader rule is first, so it wins even for /CN=admin
        assert_eq!(
            mapper.find_account("/CN=admin", &[]),
            Some("generic".to_string())
        );
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let mapper = AccountMapper::new(vec![
            MappingRule::RegexSubject {
                pattern: "[unclosed".into(),
                account: "broken".into(),
            },
            MappingRule::ExactSubject {
                pattern: "/CN=ok".into(),
                account: "ok".into(),
            },
        ]);
        assert_eq!(mapper.find_account("/CN=ok", &[]), Some("ok".to_string()));
    }

    #[test]
    fn no_rules_means_no_account() {
        let mapper = AccountMapper::default();
        assert_eq!(mapper.find_account("/CN=anyone", &[]), None);
    }
}
