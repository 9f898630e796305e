//! Lexicon scorer for technology-trend sentiment.
//!
//! Used when no model is configured and to fill in a sentiment the model
//! omitted.

/// Word weights.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` are negative.
pub(crate) const LEXICON: &[(&str, f64)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("amazing", 0.5),
    ("awesome", 0.5),
    ("love", 0.5),
    ("best", 0.5),
    ("fast", 0.3),
    ("faster", 0.3),
    ("launch", 0.3),
    ("launches", 0.3),
    ("released", 0.3),
    ("release", 0.2),
    ("open", 0.1),
    ("free", 0.2),
    ("improved", 0.4),
    ("breakthrough", 0.5),
    ("growing", 0.3),
    ("popular", 0.3),
    ("win", 0.4),
    ("success", 0.4),
    // Negative signals
    ("bug", -0.3),
    ("breach", -0.7),
    ("vulnerability", -0.6),
    ("exploit", -0.6),
    ("outage", -0.6),
    ("down", -0.3),
    ("layoffs", -0.6),
    ("lawsuit", -0.5),
    ("deprecated", -0.3),
    ("slow", -0.3),
    ("broken", -0.5),
    ("bad", -0.4),
    ("terrible", -0.6),
    ("worst", -0.6),
    ("failed", -0.4),
    ("failure", -0.4),
    ("problem", -0.3),
    ("concern", -0.3),
    ("warning", -0.4),
    ("ban", -0.6),
    ("banned", -0.6),
    ("shutdown", -0.6),
];

/// Score a text string using the lexicon.
///
/// Splits text into lowercase words, sums matching weights, and clamps
/// the result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f64 {
    let mut score = 0.0_f64;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        if let Some(&(_, weight)) = LEXICON.iter().find(|(lex_word, _)| *lex_word == w) {
            score += weight;
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Mean lexicon score across `texts`, `0.0` when empty.
#[must_use]
pub fn mean_lexicon_score<'a>(texts: impl IntoIterator<Item = &'a str>) -> f64 {
    let (sum, count) = texts
        .into_iter()
        .fold((0.0_f64, 0_u32), |(sum, n), t| (sum + lexicon_score(t), n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / f64::from(count)).clamp(-1.0, 1.0)
    }
}
