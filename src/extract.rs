// 🔎 Candidate Extraction - raw text → candidate investor mentions
//
// Patterns:
//   "First Last (Firm)"      person with firm in parentheses
//   "First Last @ Firm"      person at firm
//   "... Capital/Ventures"   firm name ending in a fund-type suffix
//
// Each hit carries ±50 characters of context for the quality gate.
// Extraction is deliberately permissive; the gate decides what is garbage.

use crate::mention::Mention;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Characters of context captured on each side of a hit
pub const CONTEXT_RADIUS: usize = 50;

const FIRM_SUFFIXES: &str = "Capital|Ventures|Partners|Fund|Investments|Equity|Holdings|Management|Group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionPattern {
    PersonWithFirm,
    PersonAtFirm,
    FirmSuffix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCandidate {
    pub name: String,
    pub firm: Option<String>,
    pub raw_span: String,
    pub context: String,
    pub pattern: ExtractionPattern,
}

pub struct CandidateExtractor {
    person_paren: Regex,
    person_at: Regex,
    firm_suffix: Regex,
}

impl CandidateExtractor {
    pub fn new() -> Result<Self> {
        let person = r"([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})";
        let firm = r"([A-Z][A-Za-z0-9&.\-]*(?:\s+[A-Z0-9][A-Za-z0-9&.\-]*){0,4})";

        Ok(CandidateExtractor {
            person_paren: Regex::new(&format!(r"{}\s*\(\s*{}\s*\)", person, firm))
                .context("person (firm) pattern")?,
            person_at: Regex::new(&format!(r"{}\s+@\s+{}", person, firm))
                .context("person @ firm pattern")?,
            firm_suffix: Regex::new(&format!(
                r"\b((?:[A-Z0-9][A-Za-z0-9&.\-]*\s+){{1,3}}(?:{}))\b",
                FIRM_SUFFIXES
            ))
            .context("firm suffix pattern")?,
        })
    }

    /// All candidates in order of appearance; repeated (name, firm) pairs dropped
    pub fn extract(&self, text: &str) -> Vec<ExtractedCandidate> {
        let mut hits: Vec<(usize, ExtractedCandidate)> = Vec::new();

        for (re, pattern) in [
            (&self.person_paren, ExtractionPattern::PersonWithFirm),
            (&self.person_at, ExtractionPattern::PersonAtFirm),
        ] {
            for caps in re.captures_iter(text) {
                let (Some(whole), Some(name), Some(firm)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                hits.push((
                    whole.start(),
                    ExtractedCandidate {
                        name: name.as_str().trim().to_string(),
                        firm: Some(firm.as_str().trim().to_string()),
                        raw_span: whole.as_str().to_string(),
                        context: context_window(text, whole.start(), whole.end()),
                        pattern,
                    },
                ));
            }
        }

        for caps in self.firm_suffix.captures_iter(text) {
            let Some(firm) = caps.get(1) else { continue };
            let name = firm.as_str().trim().to_string();
            hits.push((
                firm.start(),
                ExtractedCandidate {
                    firm: Some(name.clone()),
                    name,
                    raw_span: firm.as_str().to_string(),
                    context: context_window(text, firm.start(), firm.end()),
                    pattern: ExtractionPattern::FirmSuffix,
                },
            ));
        }

        hits.sort_by_key(|(start, _)| *start);

        let mut seen = HashSet::new();
        hits.into_iter()
            .map(|(_, c)| c)
            .filter(|c| seen.insert((c.name.to_lowercase(), c.firm.clone().map(|f| f.to_lowercase()))))
            .collect()
    }

    /// Extract and wrap as mentions from one source
    pub fn to_mentions(
        &self,
        text: &str,
        source_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Vec<Mention> {
        self.extract(text)
            .into_iter()
            .map(|c| {
                let mut mention = Mention::new(c.raw_span, source_id, observed_at)
                    .with_candidate(c.name)
                    .with_context(c.context);
                if let Some(firm) = c.firm {
                    mention = mention.with_firm(firm);
                }
                mention
            })
            .collect()
    }
}

/// Slice [start - r, end + r] snapped to char boundaries, whitespace collapsed
fn context_window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }

    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn extractor() -> CandidateExtractor {
        CandidateExtractor::new().unwrap()
    }

    #[test]
    fn test_person_with_firm() {
        let text = "The round was led by Roelof Botha (Sequoia Capital) last week.";

        let hits = extractor().extract(text);

        let person = hits
            .iter()
            .find(|c| c.pattern == ExtractionPattern::PersonWithFirm)
            .unwrap();
        assert_eq!(person.name, "Roelof Botha");
        assert_eq!(person.firm.as_deref(), Some("Sequoia Capital"));
        assert!(person.context.contains("led by"));
    }

    #[test]
    fn test_person_at_firm() {
        let hits = extractor().extract("Great chat with Sarah Guo @ Conviction today");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Sarah Guo");
        assert_eq!(hits[0].firm.as_deref(), Some("Conviction"));
        assert_eq!(hits[0].pattern, ExtractionPattern::PersonAtFirm);
    }

    #[test]
    fn test_firm_suffix_pattern() {
        let text = "Acme raised $5M from Lux Capital and Founders Fund, with Kleiner Perkins.";

        let names: Vec<String> = extractor().extract(text).into_iter().map(|c| c.name).collect();

        assert!(names.contains(&"Lux Capital".to_string()));
        assert!(names.contains(&"Founders Fund".to_string()));
    }

    #[test]
    fn test_context_window_is_bounded() {
        let filler = "x".repeat(200);
        let text = format!("{} Lux Capital {}", filler, filler);

        let hits = extractor().extract(&text);

        assert_eq!(hits.len(), 1);
        assert!(hits[0].context.len() <= "Lux Capital".len() + 2 * CONTEXT_RADIUS);
    }

    #[test]
    fn test_repeated_hits_deduplicated() {
        let text = "Lux Capital led. Later, Lux Capital followed on.";

        assert_eq!(extractor().extract(text).len(), 1);
    }

    #[test]
    fn test_to_mentions() {
        let at = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        let mentions = extractor().to_mentions("Backed by Lux Capital.", "rss-42", at);

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].candidate_name, "Lux Capital");
        assert_eq!(mentions[0].source_id, "rss-42");
        assert_eq!(mentions[0].firm(), Some("Lux Capital"));
    }
}
