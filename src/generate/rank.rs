// src/generate/rank.rs
//! Urgency ranking: one batched prompt, a bracketed list of ranks back.
//!
//! Ranking is advisory — on any parse failure every candidate is marked
//! unranked (`-1`) and the call still succeeds. Availability beats correctness
//! here.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::generate::provider::TextGenerator;
use crate::store::UNRANKED;

static RE_BRACKET_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*\]").expect("bracket list regex"));

/// The fields the model sees per candidate.
#[derive(Debug, Clone)]
pub struct RankCandidate {
    pub relief_title: String,
    pub description: String,
    pub headline_title: String,
}

pub fn build_rank_prompt(candidates: &[RankCandidate]) -> String {
    let mut prompt = String::from(
        "Given this list of relief effort, output a list in equivalent length \
         containing just numbers (1 - number of relief effort) and rank them \
         accordingly based on perceived urgency of such relief effort. Strictly \
         output only the bracketed list containing the rankings of the relief \
         effort.\n\n",
    );
    for c in candidates {
        prompt.push_str(&format!(
            "Relief Effort Title: {}\n Description: {}\n News Headline Title: {}\n",
            c.relief_title, c.description, c.headline_title
        ));
    }
    prompt.push_str(
        "\nStrictly output just a bracketed list containing numbers that represent \
         the ranking of each relief effort. The ranking values should only range \
         from 1 up to the number of relief effort given. Do not include anything else.",
    );
    prompt
}

/// Extract the first bracketed list substring and parse it as integers.
/// `None` on any shape violation, including a length mismatch.
pub fn extract_ranks(response: &str, expected_len: usize) -> Option<Vec<i64>> {
    let list = RE_BRACKET_LIST.find(response)?.as_str();
    let inner = &list[1..list.len() - 1];

    let mut ranks = Vec::with_capacity(expected_len);
    for piece in inner.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        ranks.push(piece.parse::<i64>().ok()?);
    }
    if ranks.len() != expected_len {
        return None;
    }
    Some(ranks)
}

/// Rank a batch. The returned vector always has the batch's length.
pub async fn rank_candidates(
    generator: &dyn TextGenerator,
    candidates: &[RankCandidate],
) -> Vec<i64> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let prompt = build_rank_prompt(candidates);
    let response = match generator.generate(&prompt).await {
        Ok(response) => response,
        Err(e) => {
            warn!(target: "rank", error = ?e, "relief effort ranking failed");
            return vec![UNRANKED; candidates.len()];
        }
    };

    match extract_ranks(&response, candidates.len()) {
        Some(ranks) => {
            info!(target: "rank", count = ranks.len(), "relief effort ranking succeeded");
            ranks
        }
        None => {
            warn!(target: "rank", "unparsable ranking response, marking batch unranked");
            vec![UNRANKED; candidates.len()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::provider::MockGenerator;

    fn batch(n: usize) -> Vec<RankCandidate> {
        (0..n)
            .map(|i| RankCandidate {
                relief_title: format!("Relief {i}"),
                description: format!("Description {i}"),
                headline_title: format!("Headline {i}"),
            })
            .collect()
    }

    #[test]
    fn extracts_bracketed_list() {
        assert_eq!(
            extract_ranks("Sure! [2, 1, 3] there you go", 3),
            Some(vec![2, 1, 3])
        );
    }

    #[test]
    fn length_mismatch_is_a_failure() {
        assert_eq!(extract_ranks("[1, 2]", 3), None);
    }

    #[test]
    fn non_numeric_is_a_failure() {
        assert_eq!(extract_ranks("[one, two, three]", 3), None);
        assert_eq!(extract_ranks("no list at all", 3), None);
    }

    #[tokio::test]
    async fn parse_failure_falls_back_to_unranked() {
        let generator = MockGenerator::scripted(["I cannot rank these."]);
        let ranks = rank_candidates(&generator, &batch(4)).await;
        assert_eq!(ranks, vec![UNRANKED; 4]);
    }

    #[tokio::test]
    async fn generator_error_falls_back_to_unranked() {
        let generator = MockGenerator::scripted(Vec::<String>::new());
        let ranks = rank_candidates(&generator, &batch(2)).await;
        assert_eq!(ranks, vec![UNRANKED, UNRANKED]);
    }

    #[tokio::test]
    async fn successful_ranking_applies() {
        let generator = MockGenerator::scripted(["[3, 1, 2]"]);
        let ranks = rank_candidates(&generator, &batch(3)).await;
        assert_eq!(ranks, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let generator = MockGenerator::scripted(Vec::<String>::new());
        assert!(rank_candidates(&generator, &[]).await.is_empty());
    }

    #[test]
    fn prompt_lists_every_candidate() {
        let prompt = build_rank_prompt(&batch(2));
        assert!(prompt.contains("Relief 0"));
        assert!(prompt.contains("Headline 1"));
    }
}
