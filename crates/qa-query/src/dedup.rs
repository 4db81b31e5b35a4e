//! Collapse hits for the same logical fragment.

use std::collections::HashMap;

use tracing::debug;

use qa_core::{Candidate, Dimension, DuplicateSummary};

/// Identity of a logical fragment across retrieval paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkKey {
    /// A numbered chunk of a source document.
    Numbered { source: String, number: i64 },
    /// No chunk number could be derived; the raw id.
    Raw(String),
}

/// Derive the identity key of a candidate.
///
/// Preference: the explicit chunk number, then the last `-` segment of the
/// id when numeric, then the number after a leading `chunk_`, then the raw
/// id.
///
/// Numbered keys are scoped to the fragment's source, so chunk 3 of two
/// different documents stays two fragments. This is narrower than keying on
/// the chunk number alone, which would merge them.
pub fn chunk_key(candidate: &Candidate) -> ChunkKey {
    let fragment = &candidate.fragment;
    let id = fragment.id.as_str();

    let number = fragment
        .chunk_id
        .or_else(|| id.rsplit_once('-').and_then(|(_, tail)| tail.parse().ok()))
        .or_else(|| {
            id.strip_prefix("chunk_").and_then(|rest| {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            })
        });

    match number {
        Some(number) => ChunkKey::Numbered {
            source: fragment.source_label.clone(),
            number,
        },
        None => ChunkKey::Raw(id.to_string()),
    }
}

/// Keep one candidate per logical fragment.
///
/// Within a group the lowest dimension priority wins, then the higher
/// retrieval score, then the earlier candidate. The survivor records the
/// summed score and the sources of every merged hit. Groups keep the order
/// of their first member, and a candidate without duplicates passes through
/// unchanged, so deduplicating twice changes nothing.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let original = candidates.len();

    let mut groups: Vec<Vec<Candidate>> = Vec::new();
    let mut slots: HashMap<ChunkKey, usize> = HashMap::new();

    for candidate in candidates {
        let key = chunk_key(&candidate);
        match slots.get(&key) {
            Some(&slot) => groups[slot].push(candidate),
            None => {
                slots.insert(key, groups.len());
                groups.push(vec![candidate]);
            }
        }
    }

    let merged: Vec<Candidate> = groups.into_iter().filter_map(merge_group).collect();

    debug!("Deduplicated {} candidates to {}", original, merged.len());

    merged
}

fn merge_group(group: Vec<Candidate>) -> Option<Candidate> {
    if group.len() <= 1 {
        return group.into_iter().next();
    }

    let mut total_score = 0.0;
    let mut sources: Vec<Dimension> = Vec::new();
    for member in &group {
        match &member.duplicates {
            Some(summary) => {
                total_score += summary.total_score;
                sources.extend(summary.sources.iter().copied());
            }
            None => {
                total_score += member.score;
                sources.push(member.source);
            }
        }
    }

    let mut best: Option<Candidate> = None;
    for member in group {
        let better = match &best {
            None => true,
            Some(current) => {
                let (p, q) = (member.source.priority(), current.source.priority());
                p < q || (p == q && member.score > current.score)
            }
        };
        if better {
            best = Some(member);
        }
    }

    best.map(|mut survivor| {
        survivor.duplicates = Some(DuplicateSummary {
            total_score,
            sources,
        });
        survivor
    })
}
