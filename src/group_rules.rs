pub mod group_settings;

use crate::group_rules::group_settings::SubscriberRule;
use log::debug;
use regex::Regex;

fn match_string(string: &str, pattern: &Regex) -> bool {
    let result = pattern.is_match(string);
    let sanitized_string: String = string
        .chars()
        .take(50)
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();
    debug!("Subject {:?} pattern {:?} result {}", sanitized_string, pattern.as_str(), result);
    result
}

/// An empty whitelist lets every sender through; otherwise the address
/// must equal one entry exactly, including case.
pub fn valid_from_email(from_email: &str, whitelist: &[String]) -> bool {
    whitelist.is_empty() || whitelist.iter().any(|allowed| allowed == from_email)
}

/// An empty pattern list lets every subject through; otherwise the first
/// pattern found anywhere in the subject admits it.
pub fn valid_subject(subject: &str, patterns: &[Regex]) -> bool {
    patterns.is_empty() || patterns.iter().any(|pattern| match_string(subject, pattern))
}

/// Whether `rule` wants a message from `from_email` titled `subject`.
pub fn admits(rule: &SubscriberRule, from_email: &str, subject: &str) -> bool {
    valid_from_email(from_email, &rule.sender_whitelist)
        && valid_subject(subject, &rule.subject_patterns)
}
