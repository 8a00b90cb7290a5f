//! # Ticker Validator
//!
//! Ordered rule list applied to each candidate span:
//!
//! 1. [`Rule::Length`] rejects normalized text outside the length bounds.
//! 2. [`Rule::Stoplist`] rejects common words that collide with real symbols,
//!    unless the span carried an explicit `$` and the override is enabled.
//! 3. [`Rule::Registry`] accepts only registry members.
//!
//! The first rule that rejects decides. Evaluation is a pure function of the
//! span text, the policy and the registry snapshot.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use crate::registry::TickerRegistry;
use crate::{normalize, CandidateSpan, ConfigError, Ticker};

/// Words that are valid symbols but far more often plain English or slang.
pub const DEFAULT_STOPLIST: &[&str] = &[
    "A", "AI", "ALL", "AM", "AN", "ANY", "ARE", "AT", "ATH", "BE", "BIG", "BY", "CAN", "CEO",
    "DD", "DO", "EOD", "EPS", "ETF", "EV", "FDA", "FOR", "FUN", "GDP", "GO", "GOOD", "HAS", "HE",
    "HOLD", "I", "IF", "IMO", "IN", "IPO", "IS", "IT", "JUST", "LOVE", "ME", "MY", "NEW", "NO",
    "NOW", "OF", "OK", "ON", "ONE", "OR", "OUT", "PM", "RE", "REAL", "SEC", "SEE", "SO", "TV",
    "TWO", "UK", "UP", "US", "USA", "USD", "VERY", "WE", "YOLO",
];

/// One step of the decision sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Character count after normalization must lie in `min..=max`.
    Length { min: usize, max: usize },
    Stoplist {
        words: BTreeSet<String>,
        dollar_override: bool,
    },
    Registry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Empty,
    Length,
    Stoplisted,
    NotInRegistry,
    Malformed,
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Length => "length",
            Self::Stoplisted => "stoplisted",
            Self::NotInRegistry => "not_in_registry",
            Self::Malformed => "malformed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept(Ticker),
    Reject(RejectReason),
}

impl Verdict {
    pub fn ticker(self) -> Option<Ticker> {
        match self {
            Self::Accept(ticker) => Some(ticker),
            Self::Reject(_) => None,
        }
    }

    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

/// The ordered rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    rules: Vec<Rule>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::standard(1, 5, default_stoplist(), true)
    }
}

impl ValidationPolicy {
    /// Length, then stoplist, then registry.
    pub fn standard(
        min_len: usize,
        max_len: usize,
        stoplist: BTreeSet<String>,
        dollar_override: bool,
    ) -> Self {
        Self {
            rules: vec![
                Rule::Length {
                    min: min_len,
                    max: max_len,
                },
                Rule::Stoplist {
                    words: stoplist,
                    dollar_override,
                },
                Rule::Registry,
            ],
        }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.rules {
            if let Rule::Length { min, max } = *rule {
                if min == 0 {
                    return Err(ConfigError::Zero {
                        field: "min_ticker_len",
                    });
                }
                if min > max {
                    return Err(ConfigError::LengthBounds { min, max });
                }
            }
        }
        if !self.rules.contains(&Rule::Registry) {
            return Err(ConfigError::Invalid(String::from(
                "validation policy must include the registry rule",
            )));
        }
        Ok(())
    }

    pub fn evaluate(&self, span: &CandidateSpan, registry: &TickerRegistry) -> Verdict {
        let normalized = normalize(&span.text);
        if normalized.is_empty() {
            return Verdict::Reject(RejectReason::Empty);
        }

        for rule in &self.rules {
            match rule {
                Rule::Length { min, max } => {
                    let len = normalized.chars().count();
                    if len < *min || len > *max {
                        return Verdict::Reject(RejectReason::Length);
                    }
                }
                Rule::Stoplist {
                    words,
                    dollar_override,
                } => {
                    let overridden = *dollar_override && span.has_dollar_prefix();
                    if words.contains(&normalized) && !overridden {
                        return Verdict::Reject(RejectReason::Stoplisted);
                    }
                }
                Rule::Registry => {
                    if !registry.is_valid(&normalized) {
                        return Verdict::Reject(RejectReason::NotInRegistry);
                    }
                }
            }
        }

        match Ticker::parse(&normalized) {
            Ok(ticker) => Verdict::Accept(ticker),
            Err(_) => Verdict::Reject(RejectReason::Malformed),
        }
    }
}

/// Policy bound to one registry snapshot.
#[derive(Debug, Clone)]
pub struct TickerValidator {
    policy: ValidationPolicy,
    registry: Arc<TickerRegistry>,
}

impl TickerValidator {
    pub fn new(policy: ValidationPolicy, registry: Arc<TickerRegistry>) -> Self {
        Self { policy, registry }
    }

    pub fn evaluate(&self, span: &CandidateSpan) -> Verdict {
        self.policy.evaluate(span, &self.registry)
    }

    pub fn validate(&self, span: &CandidateSpan) -> Option<Ticker> {
        self.evaluate(span).ticker()
    }

    pub fn registry(&self) -> &TickerRegistry {
        &self.registry
    }
}

pub fn default_stoplist() -> BTreeSet<String> {
    DEFAULT_STOPLIST.iter().map(|word| (*word).to_owned()).collect()
}

/// Reads a stoplist file: one word per line, `#` starts a comment line.
pub fn load_stoplist(path: &Path) -> std::io::Result<BTreeSet<String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_stoplist(&raw))
}

pub fn parse_stoplist(raw: &str) -> BTreeSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize)
        .filter(|word| !word.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str) -> CandidateSpan {
        CandidateSpan::new(text, 0, "t1")
    }

    fn validator(stoplist: &[&str], dollar_override: bool) -> TickerValidator {
        let policy = ValidationPolicy::standard(
            1,
            5,
            stoplist.iter().map(|w| (*w).to_owned()).collect(),
            dollar_override,
        );
        TickerValidator::new(
            policy,
            Arc::new(TickerRegistry::from_symbols(["AAPL", "TSLA", "A", "ON", "GOOGL"])),
        )
    }

    #[test]
    fn rules_apply_in_order() {
        let validator = validator(&["A", "ON"], true);

        let reject = |reason| Verdict::Reject(reason);

        assert_eq!(
            validator.validate(&span("AAPL")).map(String::from),
            Some(String::from("AAPL"))
        );
        assert_eq!(validator.evaluate(&span("A")), reject(RejectReason::Stoplisted));
        assert!(validator.evaluate(&span("$A")).is_accept());
        assert_eq!(validator.evaluate(&span("MSFT")), reject(RejectReason::NotInRegistry));
        assert_eq!(validator.evaluate(&span("GOOGLE")), reject(RejectReason::Length));
        assert_eq!(validator.evaluate(&span("$")), reject(RejectReason::Empty));
    }

    #[test]
    fn length_is_checked_before_stoplist() {
        let policy = ValidationPolicy::standard(2, 5, ["A".to_owned()].into(), true);
        let registry = TickerRegistry::from_symbols(["A"]);

        assert_eq!(
            policy.evaluate(&span("$A"), &registry),
            Verdict::Reject(RejectReason::Length)
        );
    }

    #[test]
    fn override_can_be_disabled() {
        let validator = validator(&["A"], false);
        assert_eq!(
            validator.evaluate(&span("$A")),
            Verdict::Reject(RejectReason::Stoplisted)
        );
    }

    #[test]
    fn validation_is_a_pure_decision() {
        let validator = validator(&["A", "ON"], true);
        for input in ["$tsla", "aapl", "$A", "A", "on", "zzz"] {
            assert_eq!(validator.evaluate(&span(input)), validator.evaluate(&span(input)));
        }

        for input in ["$tsla", "aapl"] {
            let ticker = validator.validate(&span(input)).expect("accepted");
            assert_eq!(validator.validate(&span(ticker.as_str())), Some(ticker));
        }
    }

    #[test]
    fn parses_stoplist_files() {
        let words = parse_stoplist("# common words\n on\n\n$yolo\nDD\n");
        let expected: BTreeSet<String> = ["DD", "ON", "YOLO"].iter().map(|w| w.to_string()).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn rejects_inverted_length_bounds() {
        let policy = ValidationPolicy::standard(4, 2, BTreeSet::new(), true);
        assert_eq!(policy.validate(), Err(ConfigError::LengthBounds { min: 4, max: 2 }));
        assert!(ValidationPolicy::default().validate().is_ok());
    }
}
