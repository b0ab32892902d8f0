// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::debug;
use regex::Regex;

use crate::errors::ConfigError;

const UNIT_SUFFIX: &str = ".service";

/// Prefix that forces a rule to be compiled as a pattern even when it has no
/// regex metacharacters.
const PATTERN_PREFIX: &str = "re:";

const PATTERN_METACHARACTERS: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// A single allow/deny entry.
///
/// Both variants accept the exact unit name or the name with `.service`
/// appended. Beyond that they match at the start of the unit name, so `systemd`
/// covers `systemd-journald.service`.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Plain string, matched as a name prefix.
    Literal(String),
    /// Regular expression anchored at the start of the unit name.
    Pattern { source: String, regex: Regex },
}

impl Rule {
    /// Parse a configured rule string.
    ///
    /// Plain strings become literals. Anything containing regex
    /// metacharacters, or prefixed with `re:`, is compiled as a pattern.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (expr, forced) = match raw.strip_prefix(PATTERN_PREFIX) {
            Some(expr) => (expr, true),
            None => (raw, false),
        };

        if !forced && !expr.contains(PATTERN_METACHARACTERS) {
            return Ok(Rule::Literal(expr.to_string()));
        }

        Regex::new(&format!("^(?:{expr})"))
            .map(|regex| Rule::Pattern {
                source: expr.to_string(),
                regex,
            })
            .map_err(|source| ConfigError::InvalidPattern {
                rule: raw.to_string(),
                source,
            })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Rule::Literal(literal) => name.starts_with(literal.as_str()),
            Rule::Pattern { source, regex } => {
                is_unit_name(name, source) || regex.is_match(name)
            }
        }
    }
}

fn is_unit_name(name: &str, rule: &str) -> bool {
    name == rule
        || name
            .strip_suffix(UNIT_SUFFIX)
            .is_some_and(|stem| stem == rule)
}

/// Decides which units are in scope. Deny rules always win over allow rules.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    allow: Vec<Rule>,
    deny: Vec<Rule>,
}

impl FilterEngine {
    pub fn new<A, D>(allow: A, deny: D) -> Result<Self, ConfigError>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Ok(Self {
            allow: parse_rules(allow)?,
            deny: parse_rules(deny)?,
        })
    }

    pub fn is_included(&self, name: &str) -> bool {
        if let Some(rule) = self.deny.iter().find(|rule| rule.matches(name)) {
            debug!("service {name} excluded by deny rule {rule:?}");
            return false;
        }

        self.allow.is_empty() || self.allow.iter().any(|rule| rule.matches(name))
    }
}

fn parse_rules<I>(raw: I) -> Result<Vec<Rule>, ConfigError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    raw.into_iter()
        .map(|rule| Rule::parse(rule.as_ref()))
        .collect()
}
