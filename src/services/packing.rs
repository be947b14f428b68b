//! Ranking and token-budget packing of retrieved chunks.

use strata_models::PackedChunk;

use super::retrieval::Candidate;

/// Score reported for every packed chunk.
pub const PLACEHOLDER_SCORE: f64 = 1.0;

/// Packed query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packed {
    pub chunks: Vec<PackedChunk>,
    /// True when at least one candidate was left out.
    pub truncated: bool,
    pub tokens: usize,
}

/// Approximate token cost: whitespace-delimited word count.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Rank candidates and take them in order until the next one would exceed
/// `max_tokens`.
///
/// Ranking is `access_count + importance`, descending; equal ranks keep
/// their retrieval order. Packing stops at the first candidate that does
/// not fit, even if a later, shorter one would.
pub fn pack(mut candidates: Vec<Candidate>, max_tokens: usize) -> Packed {
    candidates.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));

    let total = candidates.len();
    let mut packed = Packed::default();

    for candidate in candidates {
        let cost = count_tokens(&candidate.chunk.context);
        if packed.tokens + cost > max_tokens {
            break;
        }
        packed.tokens += cost;
        packed.chunks.push(PackedChunk {
            repo_path: candidate.chunk.repo_path,
            level: candidate.chunk.level,
            context: candidate.chunk.context,
            score: PLACEHOLDER_SCORE,
        });
    }

    packed.truncated = packed.chunks.len() < total;
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strata_models::{ChunkInput, ChunkRecord, Level};

    fn candidate(path: &str, words: usize, importance: f64) -> Candidate {
        let input = ChunkInput {
            level: Level::File,
            repo_path: path.to_string(),
            context: vec!["word"; words].join(" "),
            score: None,
        };
        Candidate {
            chunk: ChunkRecord::new(&input, 1, "c1"),
            importance,
        }
    }

    fn paths(packed: &Packed) -> Vec<&str> {
        packed.chunks.iter().map(|c| c.repo_path.as_str()).collect()
    }

    #[rstest]
    #[case("", 0)]
    #[case("def add(a,b): return a+b", 4)]
    #[case("  spaced\tout\n words ", 3)]
    fn test_count_tokens(#[case] text: &str, #[case] expected: usize) {
        assert_eq!(count_tokens(text), expected);
    }

    #[test]
    fn test_ranked_by_importance_stable() {
        let packed = pack(
            vec![
                candidate("/low", 1, 1.0),
                candidate("/high", 1, 2.0),
                candidate("/low2", 1, 1.0),
            ],
            100,
        );

        assert_eq!(paths(&packed), vec!["/high", "/low", "/low2"]);
        assert!(packed.chunks.iter().all(|c| c.score == PLACEHOLDER_SCORE));
        assert!(!packed.truncated);
        assert_eq!(packed.tokens, 3);
    }

    #[test]
    fn test_stops_at_first_overflow() {
        let packed = pack(
            vec![
                candidate("/a", 30, 3.0),
                candidate("/b", 30, 2.0),
                candidate("/c", 5, 1.0),
            ],
            50,
        );

        // /c would fit, but packing stops at /b.
        assert_eq!(paths(&packed), vec!["/a"]);
        assert_eq!(packed.tokens, 30);
        assert!(packed.truncated);
    }

    #[test]
    fn test_first_candidate_over_budget_is_truncated() {
        let packed = pack(vec![candidate("/big", 60, 1.0)], 50);
        assert!(packed.chunks.is_empty());
        assert_eq!(packed.tokens, 0);
        assert!(packed.truncated);
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let packed = pack(vec![candidate("/a", 25, 1.0), candidate("/b", 25, 1.0)], 50);
        assert_eq!(packed.tokens, 50);
        assert!(!packed.truncated);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(pack(vec![], 50), Packed::default());
    }

    #[test]
    fn test_larger_budget_never_packs_fewer() {
        let make = || {
            (1..=8)
                .map(|i| candidate(&format!("/{}", i), i * 7, (i % 3) as f64))
                .collect::<Vec<_>>()
        };

        let mut previous = 0;
        for budget in (50..=400).step_by(25) {
            let packed = pack(make(), budget);
            assert!(packed.tokens <= budget);
            assert!(packed.chunks.len() >= previous);
            previous = packed.chunks.len();
        }
    }
}
