//! Rule matching against a single usage record.
//!
//! Every matcher kind is handled by an exhaustive `match`, and a pattern that
//! fails to compile degrades to "never matches" instead of an error. One bad
//! rule must not stop classification of everything else.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::domain::normalize_domain;
use crate::rules::RuleKind;
use crate::types::ValidationError;

/// How a rule pattern is compared against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Case-insensitive equality with the application name.
    Exact,
    /// `*` / `?` wildcard pattern over the application name.
    Glob,
    /// Regular expression over the application name or window title.
    Regex,
    /// Domain equals the pattern or is a subdomain of it.
    DomainSuffix,
    /// Domain equals the pattern.
    DomainExact,
    /// Domain contains the pattern.
    DomainContains,
}

impl Matcher {
    /// Canonical string used for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Glob => "glob",
            Self::Regex => "regex",
            Self::DomainSuffix => "domain_suffix",
            Self::DomainExact => "domain_exact",
            Self::DomainContains => "domain_contains",
        }
    }

    /// Parses a matcher type as written on a rule of the given kind.
    ///
    /// App rules use `EXACT`, `GLOB`, `REGEX` and `DOMAIN`; domain rules use
    /// `EXACT`, `SUFFIX` and `CONTAINS`. `EXACT` therefore means a different
    /// comparison depending on the kind. Canonical names are accepted for both.
    pub fn parse(kind: RuleKind, value: &str) -> Result<Self, ValidationError> {
        let normalized = value.trim().to_ascii_lowercase();
        let parsed = match (kind, normalized.as_str()) {
            (RuleKind::App, "exact") => Some(Self::Exact),
            (RuleKind::App, "glob") => Some(Self::Glob),
            (RuleKind::App, "regex") => Some(Self::Regex),
            (RuleKind::App, "domain") | (_, "domain_suffix") | (RuleKind::Domain, "suffix") => {
                Some(Self::DomainSuffix)
            }
            (RuleKind::Domain, "exact") | (_, "domain_exact") => Some(Self::DomainExact),
            (RuleKind::Domain, "contains") | (_, "domain_contains") => Some(Self::DomainContains),
            _ => None,
        };
        parsed.ok_or_else(|| ValidationError::InvalidMatcher {
            kind: kind.as_str(),
            value: value.to_string(),
        })
    }

    /// Whether this matcher inspects the record's domain rather than its name.
    #[must_use]
    pub const fn targets_domain(&self) -> bool {
        matches!(
            self,
            Self::DomainSuffix | Self::DomainExact | Self::DomainContains
        )
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of a usage record that rules can look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchTarget<'a> {
    pub name: &'a str,
    pub window_title: Option<&'a str>,
    pub domain: Option<&'a str>,
}

impl<'a> MatchTarget<'a> {
    #[must_use]
    pub const fn new(name: &'a str) -> Self {
        Self {
            name,
            window_title: None,
            domain: None,
        }
    }

    #[must_use]
    pub const fn with_title(mut self, title: Option<&'a str>) -> Self {
        self.window_title = title;
        self
    }

    #[must_use]
    pub const fn with_domain(mut self, domain: Option<&'a str>) -> Self {
        self.domain = domain;
        self
    }
}

/// A matcher with its pattern prepared for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    matcher: Matcher,
    pattern: String,
    /// Suffix form (`.example.com`) for subdomain checks.
    dotted: String,
    /// Compiled expression for `Glob` and `Regex`. `None` if compilation failed.
    regex: Option<Regex>,
}

impl CompiledMatcher {
    /// Prepares a pattern. Never fails: an uncompilable pattern is kept as a
    /// matcher that rejects every record.
    pub fn compile(matcher: Matcher, pattern: &str) -> Self {
        let regex = match matcher {
            Matcher::Glob => build_regex(&glob_to_regex(pattern), pattern),
            Matcher::Regex => build_regex(pattern, pattern),
            Matcher::Exact
            | Matcher::DomainSuffix
            | Matcher::DomainExact
            | Matcher::DomainContains => None,
        };
        // Domain patterns are normalized like the domains they are compared to.
        let pattern = match matcher {
            Matcher::DomainSuffix => {
                normalize_domain(pattern.trim().trim_start_matches('.')).unwrap_or_default()
            }
            Matcher::DomainExact => normalize_domain(pattern).unwrap_or_default(),
            Matcher::DomainContains => {
                let lower = pattern.trim().to_lowercase();
                lower.strip_prefix("www.").map_or_else(|| lower.clone(), str::to_string)
            }
            Matcher::Exact => pattern.to_lowercase(),
            Matcher::Glob | Matcher::Regex => pattern.to_string(),
        };
        let dotted = format!(".{pattern}");
        Self {
            matcher,
            pattern,
            dotted,
            regex,
        }
    }

    #[must_use]
    pub const fn matcher(&self) -> Matcher {
        self.matcher
    }

    /// Returns `false` for a regex or glob pattern that did not compile, and
    /// for a domain pattern with no host left after normalization.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        match self.matcher {
            Matcher::Glob | Matcher::Regex => self.regex.is_some(),
            Matcher::Exact => true,
            Matcher::DomainSuffix | Matcher::DomainExact | Matcher::DomainContains => {
                !self.pattern.is_empty()
            }
        }
    }

    /// Tests the record against this matcher.
    pub fn is_match(&self, target: &MatchTarget<'_>) -> bool {
        match self.matcher {
            Matcher::Exact => target.name.to_lowercase() == self.pattern,
            Matcher::Glob => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(target.name)),
            Matcher::Regex => self.regex.as_ref().is_some_and(|re| {
                re.is_match(target.name) || target.window_title.is_some_and(|t| re.is_match(t))
            }),
            Matcher::DomainSuffix => self.with_domain(target, |domain| {
                domain == self.pattern || domain.ends_with(&self.dotted)
            }),
            Matcher::DomainExact => self.with_domain(target, |domain| domain == self.pattern),
            Matcher::DomainContains => {
                self.with_domain(target, |domain| domain.contains(&self.pattern))
            }
        }
    }

    fn with_domain(&self, target: &MatchTarget<'_>, check: impl Fn(&str) -> bool) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        target
            .domain
            .and_then(normalize_domain)
            .is_some_and(|d| check(&d))
    }
}

/// Tests a single rule pattern against a record.
///
/// Convenience over [`CompiledMatcher`] for one-off checks; rule sets compile
/// their patterns once instead.
pub fn test_rule(matcher: Matcher, pattern: &str, target: &MatchTarget<'_>) -> bool {
    CompiledMatcher::compile(matcher, pattern).is_match(target)
}

/// Translates a wildcard pattern into an anchored regular expression.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

fn build_regex(expr: &str, original: &str) -> Option<Regex> {
    match RegexBuilder::new(expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!(
                pattern = original,
                error = %err,
                "rule pattern does not compile, treating as non-matching"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> MatchTarget<'_> {
        MatchTarget::new(name)
    }

    #[test]
    fn exact_is_case_insensitive_full_match() {
        assert!(test_rule(Matcher::Exact, "slack", &app("Slack")));
        assert!(!test_rule(Matcher::Exact, "slack", &app("Slack Helper")));
    }

    #[test]
    fn glob_wildcards_are_anchored() {
        assert!(test_rule(Matcher::Glob, "Visual Studio*", &app("visual studio code")));
        assert!(test_rule(Matcher::Glob, "vi?", &app("Vim")));
        assert!(!test_rule(Matcher::Glob, "vi?", &app("Vimr")));
        assert!(!test_rule(Matcher::Glob, "code", &app("vscode")));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        assert!(test_rule(Matcher::Glob, "C++ (IDE)*", &app("c++ (ide) 2024")));
        assert!(!test_rule(Matcher::Glob, "a.b", &app("axb")));
    }

    #[test]
    fn regex_matches_name_or_title() {
        let target = app("Google Chrome").with_title(Some("YouTube - Cat videos"));
        assert!(test_rule(Matcher::Regex, "youtube", &target));
        assert!(test_rule(Matcher::Regex, "^google", &target));
        assert!(!test_rule(Matcher::Regex, "netflix", &target));
    }

    #[test]
    fn invalid_regex_never_matches() {
        let compiled = CompiledMatcher::compile(Matcher::Regex, "([unclosed");
        assert!(!compiled.is_usable());
        assert!(!compiled.is_match(&app("([unclosed")));
    }

    #[test]
    fn domain_suffix_matches_subdomains_only() {
        let gist = app("Firefox").with_domain(Some("gist.github.com"));
        let exact = app("Firefox").with_domain(Some("GitHub.com "));
        let lookalike = app("Firefox").with_domain(Some("notgithub.com"));
        assert!(test_rule(Matcher::DomainSuffix, "github.com", &gist));
        assert!(test_rule(Matcher::DomainSuffix, "github.com", &exact));
        assert!(!test_rule(Matcher::DomainSuffix, "github.com", &lookalike));
    }

    #[test]
    fn domain_matchers_require_a_domain() {
        let none = app("Firefox");
        assert!(!test_rule(Matcher::DomainSuffix, "github.com", &none));
        assert!(!test_rule(Matcher::DomainExact, "github.com", &none));
        assert!(!test_rule(Matcher::DomainContains, "git", &none));
    }

    #[test]
    fn domain_exact_and_contains() {
        let target = app("Safari").with_domain(Some("  News.YCombinator.com"));
        assert!(test_rule(Matcher::DomainExact, "news.ycombinator.com", &target));
        assert!(!test_rule(Matcher::DomainExact, "ycombinator.com", &target));
        assert!(test_rule(Matcher::DomainContains, "combinator", &target));
        assert!(!test_rule(Matcher::DomainContains, "", &target));
    }

    #[test]
    fn domain_patterns_are_normalized_like_domains() {
        let www = app("Firefox").with_domain(Some("www.example.com"));
        let url = app("Firefox").with_domain(Some("https://www.example.com/docs"));
        let deeper = app("Firefox").with_domain(Some("a.www.example.com"));
        assert!(test_rule(Matcher::DomainExact, "www.example.com", &www));
        assert!(test_rule(Matcher::DomainExact, "https://Example.com/", &url));
        assert!(test_rule(Matcher::DomainSuffix, "www.example.com", &www));
        assert!(test_rule(Matcher::DomainSuffix, "www.example.com", &deeper));
        assert!(test_rule(Matcher::DomainContains, "www.example", &url));
        assert!(!test_rule(Matcher::DomainContains, "www.", &www));
        assert!(!CompiledMatcher::compile(Matcher::DomainContains, "www.").is_usable());
        assert!(!CompiledMatcher::compile(Matcher::DomainExact, "not a host").is_usable());
    }

    #[test]
    fn parse_depends_on_rule_kind() {
        assert_eq!(Matcher::parse(RuleKind::App, "EXACT").unwrap(), Matcher::Exact);
        assert_eq!(
            Matcher::parse(RuleKind::Domain, "EXACT").unwrap(),
            Matcher::DomainExact
        );
        assert_eq!(
            Matcher::parse(RuleKind::App, "DOMAIN").unwrap(),
            Matcher::DomainSuffix
        );
        assert_eq!(
            Matcher::parse(RuleKind::Domain, "suffix").unwrap(),
            Matcher::DomainSuffix
        );
        assert!(Matcher::parse(RuleKind::Domain, "GLOB").is_err());
        assert!(Matcher::parse(RuleKind::App, "CONTAINS").is_err());
    }

    #[test]
    fn canonical_names_roundtrip() {
        for matcher in [
            Matcher::Exact,
            Matcher::Glob,
            Matcher::Regex,
            Matcher::DomainSuffix,
            Matcher::DomainExact,
            Matcher::DomainContains,
        ] {
            let kind = if matcher.targets_domain() {
                RuleKind::Domain
            } else {
                RuleKind::App
            };
            assert_eq!(Matcher::parse(kind, matcher.as_str()).unwrap(), matcher);
        }
    }
}
