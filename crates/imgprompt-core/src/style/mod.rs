//! Prompt styling: turns a raw caption into a prompt of the requested detail
//! level and length.
//!
//! The detail transform runs first, then the length transform. Word counts are
//! taken over whitespace-delimited tokens and truncation always cuts between
//! tokens. Random phrase picks go through [`PhraseChooser`] so callers can
//! substitute a deterministic source.

pub mod phrases;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::is_flux_style;
use crate::error::Error;

use phrases::{
    ARTISTIC_PHRASES, DETAIL_PHRASES, EXPANSION_PHRASES, FLUX_PHRASES, QUALITY_PHRASES, STOPLIST,
    TECHNICAL_PHRASES,
};

const MINIMAL_MAX_WORDS: usize = 15;
const DETAIL_PICKS: usize = 2;
const FLUX_PICKS: usize = 3;

/// Requested prompt length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthTarget {
    Short,
    Medium,
    Long,
    Detailed,
}

impl LengthTarget {
    /// Minimum word count to expand towards, if any.
    pub fn min_words(self) -> Option<usize> {
        match self {
            Self::Short | Self::Medium => None,
            Self::Long => Some(150),
            Self::Detailed => Some(200),
        }
    }

    pub fn max_words(self) -> usize {
        match self {
            Self::Short => 50,
            Self::Medium => 100,
            Self::Long => 200,
            Self::Detailed => 300,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Detailed => "detailed",
        }
    }
}

impl Default for LengthTarget {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for LengthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            "detailed" => Ok(Self::Detailed),
            other => Err(Error::InvalidInput(format!(
                "Unsupported prompt length: {other}. Supported: short, medium, long, detailed"
            ))),
        }
    }
}

/// Requested amount of descriptive detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Minimal,
    Balanced,
    Detailed,
    Comprehensive,
}

impl DetailLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Balanced => "balanced",
            Self::Detailed => "detailed",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl Default for DetailLevel {
    fn default() -> Self {
        Self::Balanced
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "balanced" => Ok(Self::Balanced),
            "detailed" => Ok(Self::Detailed),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(Error::InvalidInput(format!(
                "Unsupported detail level: {other}. Supported: minimal, balanced, detailed, comprehensive"
            ))),
        }
    }
}

/// Source of random phrase picks.
pub trait PhraseChooser {
    /// Pick `count` distinct entries of `pool` (all of it when `count` exceeds its length).
    fn choose(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str>;
}

/// Uniform selection without replacement.
pub struct RandomChooser<R> {
    rng: R,
}

impl<R: Rng> RandomChooser<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomChooser<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PhraseChooser for RandomChooser<R> {
    fn choose(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str> {
        let mut picked = pool.to_vec();
        picked.shuffle(&mut self.rng);
        picked.truncate(count);
        picked
    }
}

/// Deterministic chooser returning the first `count` pool entries in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstChoices;

impl PhraseChooser for FirstChoices {
    fn choose(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str> {
        pool.iter().take(count).copied().collect()
    }
}

/// Per-call styling input.
#[derive(Debug, Clone)]
pub struct StyleRequest {
    pub raw_text: String,
    /// `None` leaves the length untouched.
    pub length_target: Option<LengthTarget>,
    pub detail_level: DetailLevel,
    pub model_key: String,
}

impl StyleRequest {
    /// Full styling pass: detail and length adjustment, then the model-specific post-pass.
    pub fn render(&self, chooser: &mut dyn PhraseChooser) -> String {
        let adjusted = adjust(
            &self.raw_text,
            self.length_target,
            self.detail_level,
            chooser,
        );
        if is_flux_style(&self.model_key) {
            enhance_for_flux(&adjusted, chooser)
        } else {
            adjusted
        }
    }
}

/// Apply the detail transform, then the length transform.
pub fn adjust(
    raw_text: &str,
    length_target: Option<LengthTarget>,
    detail_level: DetailLevel,
    chooser: &mut dyn PhraseChooser,
) -> String {
    let detailed = match detail_level {
        DetailLevel::Minimal => simplify(raw_text),
        DetailLevel::Balanced => raw_text.to_string(),
        DetailLevel::Detailed => add_detail_phrases(raw_text, chooser),
        DetailLevel::Comprehensive => add_comprehensive_details(raw_text),
    };

    match length_target {
        None => detailed,
        Some(target) => match target.min_words() {
            Some(min) => expand_to_length(&detailed, min, target.max_words()),
            None => truncate_words(&detailed, target.max_words()),
        },
    }
}

/// Append three distinct Flux quality phrases. Not subject to any length cap.
pub fn enhance_for_flux(text: &str, chooser: &mut dyn PhraseChooser) -> String {
    append_phrases(text, &chooser.choose(&FLUX_PHRASES, FLUX_PICKS))
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep at most `max_words` tokens. Text already within the limit is returned unchanged.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    words[..max_words].join(" ")
}

/// Append expansion phrases in order until `min_words` is reached, then cap at `max_words`.
pub fn expand_to_length(text: &str, min_words: usize, max_words: usize) -> String {
    let mut count = word_count(text);
    if count >= min_words {
        return truncate_words(text, max_words);
    }

    let mut expanded = text.to_string();
    for phrase in EXPANSION_PHRASES {
        if count >= min_words {
            break;
        }
        expanded.push_str(", ");
        expanded.push_str(phrase);
        count += word_count(phrase);
    }

    truncate_words(&expanded, max_words)
}

fn is_stopword(token: &str) -> bool {
    STOPLIST.iter().any(|stop| stop.eq_ignore_ascii_case(token))
}

fn simplify(text: &str) -> String {
    let kept: Vec<&str> = text
        .split_whitespace()
        .filter(|token| !is_stopword(token))
        .take(MINIMAL_MAX_WORDS)
        .collect();

    // A caption made only of stoplist words would otherwise vanish.
    if kept.is_empty() {
        return truncate_words(text, MINIMAL_MAX_WORDS);
    }
    kept.join(" ")
}

fn add_detail_phrases(text: &str, chooser: &mut dyn PhraseChooser) -> String {
    append_phrases(text, &chooser.choose(&DETAIL_PHRASES, DETAIL_PICKS))
}

fn add_comprehensive_details(text: &str) -> String {
    append_phrases(
        text,
        &[TECHNICAL_PHRASES[0], ARTISTIC_PHRASES[0], QUALITY_PHRASES[0]],
    )
}

fn append_phrases(text: &str, phrases: &[&str]) -> String {
    if phrases.is_empty() {
        return text.to_string();
    }
    format!("{}, {}", text, phrases.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn seeded() -> RandomChooser<StdRng> {
        RandomChooser::seeded(7)
    }

    #[test]
    fn short_minimal_keeps_small_caption() {
        let out = adjust(
            "a dog running in a field",
            Some(LengthTarget::Short),
            DetailLevel::Minimal,
            &mut FirstChoices,
        );
        assert_eq!(out, "a dog running in a field");
    }

    #[test]
    fn balanced_without_length_is_identity() {
        let raw = "  a cat\tsleeping on a  sofa ";
        assert_eq!(adjust(raw, None, DetailLevel::Balanced, &mut seeded()), raw);
    }

    #[test]
    fn minimal_drops_stopwords_and_caps_tokens() {
        let raw = format!("Beautiful STUNNING lovely {} wonderful", words(30));
        let out = adjust(&raw, None, DetailLevel::Minimal, &mut FirstChoices);
        assert_eq!(word_count(&out), 15);
        for token in out.split_whitespace() {
            assert!(!is_stopword(token), "stopword survived: {token}");
        }
        assert!(out.starts_with("w0 w1"));
    }

    #[test]
    fn minimal_only_stopwords_stays_non_empty() {
        let out = adjust("Beautiful gorgeous", None, DetailLevel::Minimal, &mut FirstChoices);
        assert_eq!(out, "Beautiful gorgeous");
    }

    #[test]
    fn detailed_appends_two_pool_phrases() {
        let out = adjust("a red barn", None, DetailLevel::Detailed, &mut FirstChoices);
        assert_eq!(
            out,
            "a red barn, with intricate details, featuring rich textures"
        );

        let random = adjust("a red barn", None, DetailLevel::Detailed, &mut seeded());
        let suffix = random.strip_prefix("a red barn, ").unwrap();
        let picked: Vec<&str> = suffix.split(", ").collect();
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert!(picked.iter().all(|p| DETAIL_PHRASES.contains(p)));
    }

    #[test]
    fn comprehensive_is_deterministic() {
        let out = adjust("a lighthouse", None, DetailLevel::Comprehensive, &mut seeded());
        assert_eq!(
            out,
            "a lighthouse, shot with professional camera equipment, \
             following rule of thirds composition, ultra-high resolution"
        );
    }

    #[test]
    fn short_and_medium_truncate() {
        let raw = words(180);
        let short = adjust(&raw, Some(LengthTarget::Short), DetailLevel::Balanced, &mut FirstChoices);
        let medium = adjust(&raw, Some(LengthTarget::Medium), DetailLevel::Balanced, &mut FirstChoices);
        assert_eq!(word_count(&short), 50);
        assert_eq!(word_count(&medium), 100);
        assert!(short.ends_with("w49"));
    }

    #[test]
    fn long_expands_until_minimum() {
        let raw = words(140);
        let out = adjust(&raw, Some(LengthTarget::Long), DetailLevel::Balanced, &mut FirstChoices);
        let count = word_count(&out);
        assert!((150..=200).contains(&count), "got {count} words");
        assert!(out.starts_with(&raw));
        assert!(out.contains(EXPANSION_PHRASES[0]));
        assert!(out.contains(EXPANSION_PHRASES[1]));
        assert!(!out.contains(EXPANSION_PHRASES[2]));
    }

    #[test]
    fn long_truncates_when_already_long_enough() {
        let raw = words(260);
        let out = adjust(&raw, Some(LengthTarget::Long), DetailLevel::Balanced, &mut FirstChoices);
        assert_eq!(word_count(&out), 200);
        assert!(!out.contains(','));
    }

    #[test]
    fn expansion_stops_when_pool_is_exhausted() {
        let out = adjust("a tree", Some(LengthTarget::Detailed), DetailLevel::Balanced, &mut FirstChoices);
        let pool_words: usize = EXPANSION_PHRASES.iter().map(|p| word_count(p)).sum();
        assert_eq!(word_count(&out), 2 + pool_words);
        assert!(out.ends_with(EXPANSION_PHRASES[6]));
    }

    #[test]
    fn detailed_length_caps_at_three_hundred() {
        let raw = words(195);
        let out = adjust(&raw, Some(LengthTarget::Detailed), DetailLevel::Comprehensive, &mut FirstChoices);
        let count = word_count(&out);
        assert!((200..=300).contains(&count), "got {count} words");
    }

    #[test]
    fn flux_post_pass_adds_three_distinct_phrases() {
        let request = StyleRequest {
            raw_text: words(60),
            length_target: Some(LengthTarget::Short),
            detail_level: DetailLevel::Balanced,
            model_key: "flux1".to_string(),
        };
        let mut chooser = seeded();
        let out = request.render(&mut chooser);
        let base = words(50);
        assert!(word_count(&out) > word_count(&base));
        let suffix = out.strip_prefix(&format!("{base}, ")).unwrap();
        let picked: Vec<&str> = suffix.split(", ").collect();
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|p| FLUX_PHRASES.contains(p)));
        assert_ne!(picked[0], picked[1]);
        assert_ne!(picked[1], picked[2]);
        assert_ne!(picked[0], picked[2]);
    }

    #[test]
    fn non_flux_models_skip_post_pass() {
        let request = StyleRequest {
            raw_text: "a boat at dusk".to_string(),
            length_target: Some(LengthTarget::Medium),
            detail_level: DetailLevel::Balanced,
            model_key: "midjourney".to_string(),
        };
        assert_eq!(request.render(&mut seeded()), "a boat at dusk");
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("LONG".parse::<LengthTarget>().unwrap(), LengthTarget::Long);
        assert_eq!(
            " comprehensive ".parse::<DetailLevel>().unwrap(),
            DetailLevel::Comprehensive
        );
        assert!("huge".parse::<LengthTarget>().is_err());
        assert!("extreme".parse::<DetailLevel>().is_err());
    }
}
