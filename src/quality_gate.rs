// 🚦 Quality Gate - Rules as Data
// Classifies a candidate investor mention as accept / quarantine / reject.
//
// The gate is an ordered rule table evaluated by a small engine. Each rule is
// independently testable and the table can be loaded from JSON, so new garbage
// patterns never touch control flow.
//
// Verdict:
//   no rule fires                                   → Accept
//   exactly one Weak rule + firm AND url present    → Quarantine
//   anything else that fires                        → Reject
//
// The gate is pure: the same (name, context) always yields the same verdict,
// which makes offline re-validation of historical mentions safe.

use crate::mention::normalize_name_key;
use anyhow::{Context as AnyhowContext, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

// ============================================================================
// VERDICT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Quarantine,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Quarantine => "quarantine",
            Verdict::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStrength {
    /// Can be downgraded to quarantine by a strong positive signal
    Weak,

    /// Always rejects
    Strong,
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleMatcher {
    /// Name shorter than `min` characters
    MinLength { min: usize },

    /// Nothing left once punctuation is removed
    EmptyAfterStrip,

    /// Name starts with one of these words/phrases (case-insensitive, whole word)
    LeadingPhrase { phrases: Vec<String> },

    /// Arbitrary regex against the trimmed name
    Pattern { regex: String },

    /// Normalized name equals one of these phrases
    ExactPhrase { phrases: Vec<String> },

    /// Job title in the name with no funding vocabulary in name or context
    TitleWithoutFundingContext {
        titles: Vec<String>,
        funding_terms: Vec<String>,
    },

    /// Parenthetical that merely repeats the name, e.g. "founded Greylock (Greylock)"
    FirmEcho { funding_terms: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRule {
    /// Rule ID, reported as the rejection reason
    pub id: String,

    pub description: String,

    pub strength: RuleStrength,

    pub matcher: RuleMatcher,
}

/// Rule with its regex compiled once
struct CompiledRule {
    rule: GateRule,
    regex: Option<Regex>,
    phrases: HashSet<String>,

    /// Whole-word funding vocabulary for the context-sensitive rules
    funding: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: GateRule) -> Result<Self> {
        let mut phrases = HashSet::new();

        let regex = match &rule.matcher {
            RuleMatcher::LeadingPhrase { phrases: words } => {
                let alternatives: Vec<String> = words
                    .iter()
                    .map(|w| regex::escape(w.trim()).replace(' ', r"\s+"))
                    .collect();
                Some(format!(r"(?i)^(?:{})\b", alternatives.join("|")))
            }
            RuleMatcher::Pattern { regex } => Some(regex.clone()),
            RuleMatcher::TitleWithoutFundingContext { titles, .. } => {
                let alternatives: Vec<String> =
                    titles.iter().map(|t| regex::escape(t.trim())).collect();
                Some(format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
            }
            RuleMatcher::ExactPhrase { phrases: list } => {
                phrases = list.iter().map(|p| normalize_name_key(p)).collect();
                None
            }
            _ => None,
        };

        let funding = match &rule.matcher {
            RuleMatcher::TitleWithoutFundingContext { funding_terms, .. }
            | RuleMatcher::FirmEcho { funding_terms } => whole_word_pattern(funding_terms),
            _ => None,
        };

        let compile = |pattern: Option<String>| -> Result<Option<Regex>> {
            match pattern {
                Some(pattern) => Ok(Some(
                    Regex::new(&pattern)
                        .with_context(|| format!("Invalid pattern in gate rule '{}'", rule.id))?,
                )),
                None => Ok(None),
            }
        };
        let regex = compile(regex)?;
        let funding = compile(funding)?;

        Ok(CompiledRule {
            rule,
            regex,
            phrases,
            funding,
        })
    }

    /// Funding vocabulary present as whole words in the name or snippet
    fn has_funding_context(&self, name: &str, snippet: &str) -> bool {
        self.funding
            .as_ref()
            .map(|re| re.is_match(name) || re.is_match(snippet))
            .unwrap_or(false)
    }

    fn fires(&self, name: &str, ctx: &GateContext<'_>) -> bool {
        match &self.rule.matcher {
            RuleMatcher::MinLength { min } => name.chars().count() < *min,
            RuleMatcher::EmptyAfterStrip => normalize_name_key(name).is_empty(),
            RuleMatcher::LeadingPhrase { .. } | RuleMatcher::Pattern { .. } => self
                .regex
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false),
            RuleMatcher::ExactPhrase { .. } => self.phrases.contains(&normalize_name_key(name)),
            RuleMatcher::TitleWithoutFundingContext { .. } => {
                let has_title = self
                    .regex
                    .as_ref()
                    .map(|re| re.is_match(name))
                    .unwrap_or(false);
                has_title && !self.has_funding_context(name, ctx.snippet)
            }
            RuleMatcher::FirmEcho { .. } => {
                is_firm_echo(name) && !self.has_funding_context(name, ctx.snippet)
            }
        }
    }
}

fn whole_word_pattern(terms: &[String]) -> Option<String> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    Some(format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
}

fn is_firm_echo(name: &str) -> bool {
    let (open, close) = match (name.find('('), name.rfind(')')) {
        (Some(o), Some(c)) if c > o => (o, c),
        _ => return false,
    };

    let inner = normalize_name_key(&name[open + 1..close]);
    if inner.is_empty() {
        return false;
    }

    let outside = normalize_name_key(&format!("{} {}", &name[..open], &name[close + 1..]));
    // Whole-token run: "(AC)" is not an echo of "Acme Capital"
    format!(" {} ", outside).contains(&format!(" {} ", inner))
}

// ============================================================================
// DEFAULT RULE TABLE
// ============================================================================

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

const FUNDING_TERMS: &[&str] = &[
    "backed", "led", "invested", "participated", "round", "seed", "series", "funding",
    "raised", "closed",
];

/// Built-in ordered rule table
pub fn default_rules() -> Vec<GateRule> {
    vec![
        GateRule {
            id: "too_short".to_string(),
            description: "Name shorter than 3 characters".to_string(),
            strength: RuleStrength::Strong,
            matcher: RuleMatcher::MinLength { min: 3 },
        },
        GateRule {
            id: "empty_after_strip".to_string(),
            description: "Name is punctuation only".to_string(),
            strength: RuleStrength::Strong,
            matcher: RuleMatcher::EmptyAfterStrip,
        },
        GateRule {
            id: "continuation_word".to_string(),
            description: "Name begins with a sentence-continuation word".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::LeadingPhrase {
                phrases: terms(&[
                    "and", "or", "but", "nor", "so", "yet", "the", "a", "an", "as", "with",
                    "for", "to", "of", "in", "on", "at", "by", "from", "than", "then", "which",
                    "who", "day ago", "days ago", "ago",
                ]),
            },
        },
        GateRule {
            id: "article_metadata".to_string(),
            description: "Article or page metadata leaked into the name".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::Pattern {
                regex: r"(?i)^(?:article|how|why|what|min\s+read|\d+\s+min\s+read)\b".to_string(),
            },
        },
        GateRule {
            id: "sentence_fragment".to_string(),
            description: "Lowercase word, capitalized token and a parenthetical".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::Pattern {
                regex: r"^[a-z][a-z'’-]*\s+[A-Z][^\s(]*.*\([^)]*\)".to_string(),
            },
        },
        GateRule {
            id: "non_entity_phrase".to_string(),
            description: "Known phrase that is not an investor".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::ExactPhrase {
                phrases: terms(&[
                    "blockchain group",
                    "cost of capital",
                    "venture capital",
                    "private equity",
                    "angel investors",
                    "lead investor",
                    "existing investors",
                    "our investors",
                    "seed round",
                    "series a",
                    "series b",
                    "the company",
                    "press release",
                ]),
            },
        },
        GateRule {
            id: "role_without_context".to_string(),
            description: "Job title with no investment context".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::TitleWithoutFundingContext {
                titles: terms(&[
                    "managing", "senior", "finance", "research", "design", "operations",
                    "policy", "council", "director",
                ]),
                funding_terms: terms(FUNDING_TERMS),
            },
        },
        GateRule {
            id: "firm_echo".to_string(),
            description: "Biographical firm echo, not an investment event".to_string(),
            strength: RuleStrength::Weak,
            matcher: RuleMatcher::FirmEcho {
                funding_terms: terms(FUNDING_TERMS),
            },
        },
    ]
}

/// Well-known firms that skip the Weak rules
pub const KNOWN_FIRMS: &[&str] = &[
    "a16z", "andreessen horowitz", "500 startups", "500 global", "y combinator",
    "sequoia capital", "sequoia", "accel", "accel partners", "greylock", "greylock partners",
    "benchmark", "benchmark capital", "first round", "first round capital", "lightspeed",
    "lightspeed venture partners", "kleiner perkins", "nea", "new enterprise associates",
    "bessemer", "bessemer venture partners", "insight partners", "tiger global", "softbank",
    "softbank vision fund", "general catalyst", "index ventures", "redpoint",
    "redpoint ventures", "matrix partners", "spark capital", "union square ventures", "usv",
    "founders fund", "thrive capital", "coatue", "d1 capital", "google ventures",
    "microsoft ventures", "salesforce ventures", "intel capital", "angellist", "techstars",
    "masschallenge", "startx", "alchemist",
];

// ============================================================================
// GATE INPUT / RESULT
// ============================================================================

/// Evidence available alongside the candidate name
#[derive(Debug, Clone, Copy, Default)]
pub struct GateContext<'a> {
    pub firm: Option<&'a str>,
    pub url: Option<&'a str>,
    pub snippet: &'a str,
}

impl<'a> GateContext<'a> {
    /// Strong positive signal: has a firm name AND a URL
    pub fn has_positive_signal(&self) -> bool {
        let present = |v: Option<&str>| v.map(|s| !s.trim().is_empty()).unwrap_or(false);
        present(self.firm) && present(self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub verdict: Verdict,

    /// IDs of fired rules in table order (plus override/allowlist markers)
    pub reasons: Vec<String>,
}

impl GateResult {
    pub fn is_reject(&self) -> bool {
        self.verdict == Verdict::Reject
    }
}

// ============================================================================
// GATE ENGINE
// ============================================================================

pub struct QualityGate {
    rules: Vec<CompiledRule>,
    known_firms: HashSet<String>,
}

impl QualityGate {
    /// Gate with the built-in rule table and known-firm allowlist
    pub fn with_defaults() -> Result<Self> {
        Self::from_rules(default_rules())
    }

    /// Compile a rule table; order of the table is evaluation order
    pub fn from_rules(rules: Vec<GateRule>) -> Result<Self> {
        let compiled = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(QualityGate {
            rules: compiled,
            known_firms: KNOWN_FIRMS.iter().map(|f| normalize_name_key(f)).collect(),
        })
    }

    /// Load rule table from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read gate rules file: {:?}", path.as_ref()))?;

        let rules: Vec<GateRule> =
            serde_json::from_str(&content).context("Failed to parse gate rules JSON")?;

        Self::from_rules(rules)
    }

    /// Classify a candidate name
    pub fn validate(&self, candidate_name: &str, ctx: &GateContext<'_>) -> GateResult {
        let name = candidate_name.trim();
        let known_firm = self.known_firms.contains(&normalize_name_key(name));

        let mut fired: Vec<&CompiledRule> = Vec::new();
        for rule in &self.rules {
            if known_firm && rule.rule.strength == RuleStrength::Weak {
                continue;
            }
            if rule.fires(name, ctx) {
                fired.push(rule);
            }
        }

        let mut reasons: Vec<String> = fired.iter().map(|r| r.rule.id.clone()).collect();

        let verdict = if fired.is_empty() {
            if known_firm {
                reasons.push("known_firm".to_string());
            }
            Verdict::Accept
        } else if fired.len() == 1
            && fired[0].rule.strength == RuleStrength::Weak
            && ctx.has_positive_signal()
        {
            reasons.push("firm_and_url_override".to_string());
            Verdict::Quarantine
        } else {
            Verdict::Reject
        };

        GateResult { verdict, reasons }
    }

    /// Re-validate a batch of (name, context) pairs offline
    pub fn validate_batch<'a, I>(&self, items: I) -> Vec<GateResult>
    where
        I: IntoIterator<Item = (&'a str, GateContext<'a>)>,
    {
        items
            .into_iter()
            .map(|(name, ctx)| self.validate(name, &ctx))
            .collect()
    }

    /// Summary statistics for a batch re-validation
    pub fn batch_summary(&self, results: &[GateResult]) -> GateSummary {
        let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in results.iter().filter(|r| r.verdict != Verdict::Accept) {
            for reason in &result.reasons {
                *reason_counts.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        let mut top_reasons: Vec<(String, usize)> = reason_counts.into_iter().collect();
        top_reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let count = |v: Verdict| results.iter().filter(|r| r.verdict == v).count();

        GateSummary {
            total: results.len(),
            accepted: count(Verdict::Accept),
            quarantined: count(Verdict::Quarantine),
            rejected: count(Verdict::Reject),
            top_reasons,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSummary {
    pub total: usize,
    pub accepted: usize,
    pub quarantined: usize,
    pub rejected: usize,
    pub top_reasons: Vec<(String, usize)>,
}

impl GateSummary {
    pub fn summary(&self) -> String {
        let top = self
            .top_reasons
            .iter()
            .take(3)
            .map(|(reason, n)| format!("{} ({})", reason, n))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{} mentions: {} accepted, {} quarantined, {} rejected | top reasons: {}",
            self.total,
            self.accepted,
            self.quarantined,
            self.rejected,
            if top.is_empty() { "none".to_string() } else { top }
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
