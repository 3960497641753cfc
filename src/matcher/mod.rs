//! Decides which tracking rule, if any, a URL belongs to.
//!
//! Rules come in two forms. Plain hostnames match the host of the URL and any of its
//! subdomains. Rules containing `*` are globs matched against the whole URL string, which allows
//! path-scoped rules such as `*.jira.com/browse/*`.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{trace, warn};
use url::Url;

use crate::store::keys;

const WILDCARD: char = '*';

#[derive(Debug, Clone)]
enum RulePattern {
    Exact,
    /// `None` when the glob couldn't be compiled. Such a rule never matches.
    Wildcard(Option<Regex>),
}

#[derive(Debug, Clone)]
pub struct TrackingRule {
    key: Arc<str>,
    pattern: RulePattern,
}

impl TrackingRule {
    pub fn new(key: &str) -> Self {
        let pattern = if key.contains(WILDCARD) {
            let regex = Regex::new(&glob_to_regex(key))
                .inspect_err(|e| warn!("Rule {key} can't be used as a pattern: {e}"))
                .ok();
            RulePattern::Wildcard(regex)
        } else {
            RulePattern::Exact
        };
        Self {
            key: key.into(),
            pattern,
        }
    }

    pub fn key(&self) -> &Arc<str> {
        &self.key
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.pattern, RulePattern::Wildcard(_))
    }

    fn matches(&self, url: &ParsedUrl) -> bool {
        match &self.pattern {
            RulePattern::Exact => host_matches(&url.host, &self.key),
            RulePattern::Wildcard(Some(regex)) => regex.is_match(url.full),
            RulePattern::Wildcard(None) => false,
        }
    }
}

/// Ordered collection of rules. The order is the order of keys in the store, and the first
/// matching rule wins regardless of its form.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<TrackingRule>,
}

impl RuleSet {
    pub fn from_store(data: &Map<String, Value>) -> Self {
        keys::rule_keys(data).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the key of the first rule that the url satisfies. Urls that can't be parsed match
    /// nothing.
    pub fn match_url(&self, url: &str) -> Option<Arc<str>> {
        let parsed = ParsedUrl::parse(url)?;
        let found = self.rules.iter().find(|rule| rule.matches(&parsed));
        trace!("Matched {url} against {} rules: {:?}", self.rules.len(), found.map(|v| &v.key));
        found.map(|rule| rule.key.clone())
    }
}

impl<'a> FromIterator<&'a str> for RuleSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().map(TrackingRule::new).collect(),
        }
    }
}

struct ParsedUrl<'a> {
    full: &'a str,
    host: String,
}

impl<'a> ParsedUrl<'a> {
    fn parse(full: &'a str) -> Option<Self> {
        let parsed = Url::parse(full)
            .inspect_err(|e| trace!("Ignoring unparsable url {full:?}: {e}"))
            .ok()?;
        // Urls without a host (about:blank, file:///) have an empty one. The parser already
        // lowercases hosts of http(s) urls.
        let host = parsed.host_str().unwrap_or_default().to_owned();
        Some(Self { full, host })
    }
}

fn host_matches(host: &str, rule: &str) -> bool {
    host == rule || host.ends_with(&format!(".{rule}"))
}

/// Converts a glob where `*` stands for any run of characters into an anchored regex. Everything
/// else is literal.
fn glob_to_regex(glob: &str) -> String {
    let body = glob
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}
