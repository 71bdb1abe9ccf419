//! Title keys and approximate title comparison.

use strsim::normalized_levenshtein;

/// Matching key for a title: lower-cased, punctuation removed, whitespace
/// collapsed. With `transliterate` accents are folded to ASCII first.
pub fn normalize_title(title: &str, transliterate: bool) -> String {
  let folded;
  let text = if transliterate {
    folded = unidecode::unidecode(title);
    folded.as_str()
  } else {
    title
  };
  text
    .to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Similarity ratio in [0, 1]; 1.0 only for identical keys.
pub fn title_similarity(a: &str, b: &str) -> f64 {
  normalized_levenshtein(a, b)
}

/// A candidate accepted by [`best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub index: usize,
  pub score: f64,
}

/// Picks the most similar candidate scoring at least `threshold`.
///
/// Ties keep the earliest candidate. Empty keys never match.
pub fn best_match<'a, I>(needle: &str, candidates: I, threshold: f64) -> Option<Candidate>
where
  I: IntoIterator<Item = (usize, &'a str)>,
{
  if needle.is_empty() {
    return None;
  }
  let mut best: Option<Candidate> = None;
  for (index, candidate) in candidates {
    if candidate.is_empty() {
      continue;
    }
    let score = title_similarity(needle, candidate);
    if score < threshold {
      continue;
    }
    match best {
      Some(current) if current.score >= score => {}
      _ => best = Some(Candidate { index, score }),
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalization_ignores_case_punctuation_and_spacing() {
    assert_eq!(normalize_title("Deep  Learning", false), "deep learning");
    assert_eq!(
      normalize_title(" Deep-Learning: a Survey! ", false),
      "deeplearning a survey"
    );
    assert_eq!(normalize_title("Café culture", false), "café culture");
    assert_eq!(normalize_title("Café culture", true), "cafe culture");
  }

  #[test]
  fn best_match_respects_threshold() {
    let candidates = vec![(0, "neural networks for vision"), (1, "deep learning systems")];
    let hit = best_match("deep learning systems", candidates.clone(), 0.95).unwrap();
    assert_eq!(hit.index, 1);
    assert!((hit.score - 1.0).abs() < f64::EPSILON);
    assert!(best_match("neural networks", candidates, 0.95).is_none());
  }

  #[test]
  fn ties_go_to_the_earliest_candidate() {
    let candidates = vec![(3, "graph theory"), (7, "graph theory")];
    assert_eq!(best_match("graph theory", candidates, 0.95).unwrap().index, 3);
  }

  #[test]
  fn empty_titles_never_match() {
    assert!(best_match("", vec![(0, "")], 0.0).is_none());
    assert!(best_match("x", vec![(0, "")], 0.0).is_none());
  }
}
