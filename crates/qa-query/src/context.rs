//! Render ranked candidates into a bounded context block.

use tracing::debug;

use qa_core::{format_clock, Candidate, ContextBlock, ContextStats, FragmentKind};

/// Context text when there is nothing to show.
pub const NO_CONTENT: &str = "No relevant content found.";

/// Context text when results exist but none fits the budget.
pub const BUDGET_TOO_SMALL: &str = "Context budget too small for the top result.";

/// Build a context block of at most `max_length` characters.
///
/// Candidates are rendered in rank order and joined by newlines. Assembly
/// stops at the first block that would exceed the budget; blocks are never
/// cut mid-text.
pub fn assemble(candidates: &[Candidate], max_length: usize) -> ContextBlock {
    let mut text = String::new();
    let mut length = 0;
    let mut included = 0;

    for (position, candidate) in candidates.iter().enumerate() {
        let block = render(position + 1, candidate);
        let separator = usize::from(included > 0);
        let added = block.chars().count() + separator;

        if length + added > max_length {
            debug!(
                "Context budget reached after {} of {} candidates",
                included,
                candidates.len()
            );
            break;
        }

        if separator == 1 {
            text.push('\n');
        }
        text.push_str(&block);
        length += added;
        included += 1;
    }

    if included == 0 {
        let notice = if candidates.is_empty() {
            NO_CONTENT
        } else {
            BUDGET_TOO_SMALL
        };
        if notice.chars().count() <= max_length {
            text = notice.to_string();
            length = notice.chars().count();
        }
    }

    ContextBlock {
        text,
        stats: ContextStats {
            original_count: candidates.len(),
            deduplicated_count: candidates.len(),
            final_count: included,
            context_length: length,
        },
    }
}

/// Render one candidate as a labeled block.
pub fn render(position: usize, candidate: &Candidate) -> String {
    let fragment = &candidate.fragment;

    let mut header = format!("[{}] Source: {}", position, fragment.display_source());
    if let Some(chunk) = fragment.chunk_id {
        header.push_str(&format!(", chunk {}", chunk));
    }

    let body = match &fragment.kind {
        FragmentKind::QaPair { question, answer } => {
            format!("Question: {}\nAnswer: {}", question.trim(), answer.trim())
        }
        FragmentKind::Dialogue {
            speakers,
            start_time,
            end_time,
            start_seconds,
            end_seconds,
        } => {
            let start = clock_label(start_time, *start_seconds);
            let end = clock_label(end_time, *end_seconds);
            let speakers = if speakers.is_empty() {
                "unknown".to_string()
            } else {
                speakers.join(", ")
            };
            format!(
                "Time: {} - {}\nSpeakers: {}\nContent: {}",
                start,
                end,
                speakers,
                fragment.content.trim()
            )
        }
        FragmentKind::GenericText => format!("Content: {}", fragment.content.trim()),
    };

    format!(
        "{}\n{}\nRelevance: {:.3}\n",
        header,
        body,
        candidate.final_score()
    )
}

fn clock_label(text: &str, seconds: u32) -> String {
    if text.trim().is_empty() {
        format_clock(seconds)
    } else {
        text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::Fragment;
    use std::sync::Arc;

    fn qa(id: &str, question: &str, answer: &str) -> Candidate {
        let fragment = Fragment::text(id, answer, "/corpus/chap01_processed.json")
            .with_chunk_id(3)
            .with_kind(FragmentKind::QaPair {
                question: question.to_string(),
                answer: answer.to_string(),
            });
        Candidate::semantic(Arc::new(fragment), 0)
    }

    fn dialogue() -> Candidate {
        let fragment = Fragment::text("talk-1", "we begin with ownership", "talk.txt").with_kind(
            FragmentKind::Dialogue {
                speakers: vec!["Li".to_string(), "Chen".to_string()],
                start_time: String::new(),
                end_time: "00:11:00".to_string(),
                start_seconds: 600,
                end_seconds: 660,
            },
        );
        Candidate::temporal(Arc::new(fragment), 0)
    }

    #[test]
    fn test_render_qa_pair() {
        let block = render(1, &qa("q-1", "What is BM25?", "A ranking function."));
        assert!(block.starts_with("[1] Source: chap01, chunk 3\n"));
        assert!(block.contains("Question: What is BM25?\nAnswer: A ranking function."));
        assert!(block.contains("Relevance: 0.000"));
    }

    #[test]
    fn test_render_dialogue() {
        let block = render(2, &dialogue());
        assert!(block.starts_with("[2] Source: talk\n"));
        assert!(block.contains("Time: 00:10:00 - 00:11:00"));
        assert!(block.contains("Speakers: Li, Chen"));
        assert!(block.contains("Content: we begin with ownership"));
    }

    #[test]
    fn test_render_generic_without_source() {
        let fragment = Fragment::text("g-1", "plain prose", "");
        let block = render(1, &Candidate::semantic(Arc::new(fragment), 0));
        assert!(block.starts_with("[1] Source: unknown source\n"));
    }

    #[test]
    fn test_assemble_respects_budget() {
        let candidates = vec![
            qa("q-1", "first?", "one"),
            qa("q-2", "second?", "two"),
            qa("q-3", "third?", "three"),
        ];
        let one = render(1, &candidates[0]).chars().count();
        let two = render(2, &candidates[1]).chars().count();

        let block = assemble(&candidates, one + 1 + two);
        assert_eq!(block.stats.final_count, 2);
        assert_eq!(block.text.chars().count(), one + 1 + two);
        assert_eq!(block.stats.context_length, one + 1 + two);

        let block = assemble(&candidates, one + two);
        assert_eq!(block.stats.final_count, 1);
        assert!(block.text.chars().count() <= one + two);
    }

    #[test]
    fn test_assemble_never_exceeds_budget() {
        let candidates = vec![qa("q-1", "first?", "one"), dialogue()];
        for max in [0, 5, 30, 60, 90, 120, 500] {
            let block = assemble(&candidates, max);
            assert!(block.text.chars().count() <= max);
        }
    }

    #[test]
    fn test_assemble_over_budget_is_not_reported_as_empty() {
        let candidates = vec![qa("q-1", "first?", "one")];
        let block = assemble(&candidates, 50);
        assert_eq!(block.text, BUDGET_TOO_SMALL);
        assert_eq!(block.stats.final_count, 0);
        assert_eq!(block.stats.original_count, 1);
    }

    #[test]
    fn test_assemble_empty() {
        let block = assemble(&[], 2000);
        assert_eq!(block.text, NO_CONTENT);
        assert_eq!(block.stats.final_count, 0);
        assert_eq!(block.stats.original_count, 0);
    }
}
