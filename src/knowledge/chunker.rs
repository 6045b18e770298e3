//! Document chunking strategies
//!
//! Sentence chunks accumulate until the size budget would overflow, with a
//! character-overlap carry into the next chunk. Paragraph chunks split on
//! blank lines and fall back to sentences for oversized paragraphs. The
//! semantic strategy is Markdown-aware: chunks carry their heading
//! breadcrumb, oversized sections fall back to paragraphs.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use regex::Regex;

use once_cell::sync::Lazy;

use crate::error::{MnemoError, Result};
use crate::types::ChunkingStrategy;

static SENTENCE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(.*?[.!?。！？])\s*").expect("sentence regex"));

/// A chunk of content before it becomes a stored `Chunk`
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub content: String,
    pub section_path: Vec<String>,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Split content into chunk pieces with the requested strategy
pub fn split_content(
    content: &str,
    strategy: ChunkingStrategy,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkPiece>> {
    if chunk_size <= overlap {
        return Err(MnemoError::Validation(
            "chunk_size must be greater than overlap".to_string(),
        ));
    }

    let chunks = match strategy {
        ChunkingStrategy::Sentence => split_by_sentence(content, chunk_size, overlap),
        ChunkingStrategy::Paragraph => split_by_paragraph(content, chunk_size, overlap),
        ChunkingStrategy::Semantic => split_by_markdown(content, chunk_size, overlap),
    };

    Ok(finalize(chunks))
}

/// Attach has_previous / has_next flags
fn finalize(chunks: Vec<(String, Vec<String>)>) -> Vec<ChunkPiece> {
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, (content, section_path))| ChunkPiece {
            content,
            section_path,
            has_previous: i > 0,
            has_next: i + 1 < count,
        })
        .collect()
}

fn sentences(content: &str) -> Vec<String> {
    let mut result: Vec<String> = SENTENCE_SPLIT_RE
        .captures_iter(content)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    // Trailing text without a terminator
    let consumed: usize = SENTENCE_SPLIT_RE
        .find_iter(content)
        .map(|m| m.end())
        .max()
        .unwrap_or(0);
    let rest = content[consumed..].trim();
    if !rest.is_empty() {
        result.push(rest.to_string());
    }

    result
}

fn last_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

fn split_by_sentence(content: &str, chunk_size: usize, overlap: usize) -> Vec<(String, Vec<String>)> {
    if content.trim().is_empty() {
        return vec![];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences(content) {
        if !current.is_empty()
            && current.chars().count() + sentence.chars().count() > chunk_size
        {
            chunks.push(current.trim().to_string());

            // Carry the tail of the previous chunk into the next
            if overlap > 0 && current.chars().count() > overlap {
                current = format!("{} {}", last_chars(&current, overlap), sentence);
            } else {
                current = sentence;
            }
        } else if current.is_empty() {
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks.into_iter().map(|c| (c, vec![])).collect()
}

fn split_by_paragraph(content: &str, chunk_size: usize, overlap: usize) -> Vec<(String, Vec<String>)> {
    if content.trim().is_empty() {
        return vec![];
    }

    let mut chunks: Vec<(String, Vec<String>)> = Vec::new();

    for paragraph in content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() <= chunk_size {
            chunks.push((paragraph.to_string(), vec![]));
        } else {
            // Oversized paragraph falls back to the sentence strategy
            chunks.extend(split_by_sentence(paragraph, chunk_size, overlap));
        }
    }

    chunks
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Markdown heading spans extracted via pulldown-cmark
struct Heading {
    depth: usize,
    text: String,
    start: usize,
    end: usize,
}

fn parse_headings(content: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(Heading {
                    depth: heading_depth(level),
                    text: String::new(),
                    start: range.start,
                    end: range.end,
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(ref mut heading) = current {
                    heading.text.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.end = range.end;
                    heading.text = heading.text.trim().to_string();
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }

    headings
}

fn split_by_markdown(content: &str, chunk_size: usize, overlap: usize) -> Vec<(String, Vec<String>)> {
    if content.trim().is_empty() {
        return vec![];
    }

    let headings = parse_headings(content);
    if headings.is_empty() {
        return split_by_paragraph(content, chunk_size, overlap);
    }

    // (section_path, section body) in document order
    let mut sections: Vec<(Vec<String>, &str)> = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let preamble = &content[..headings[0].start];
    if !preamble.trim().is_empty() {
        sections.push((vec![], preamble));
    }

    for (i, heading) in headings.iter().enumerate() {
        path.truncate(heading.depth.saturating_sub(1));
        path.push(heading.text.clone());

        let body_start = heading.end;
        let body_end = headings
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(content.len());
        sections.push((path.clone(), &content[body_start..body_end]));
    }

    let mut chunks: Vec<(String, Vec<String>)> = Vec::new();
    for (section_path, body) in sections {
        let body = body.trim();
        if body.is_empty() {
            continue;
        }

        if body.chars().count() <= chunk_size {
            chunks.push((body.to_string(), section_path));
        } else {
            // Oversized section falls back to the paragraph strategy,
            // keeping the breadcrumb
            for (content, _) in split_by_paragraph(body, chunk_size, overlap) {
                chunks.push((content, section_path.clone()));
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content() {
        let chunks = split_content("", ChunkingStrategy::Sentence, 500, 50).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller() {
        assert!(split_content("text", ChunkingStrategy::Sentence, 50, 50).is_err());
    }

    #[test]
    fn test_sentence_chunks_respect_size() {
        let content = "One sentence here. Another sentence follows. A third one lands. \
                       Yet another continues. The final sentence closes."
            .to_string();
        let chunks = split_content(&content, ChunkingStrategy::Sentence, 60, 10).unwrap();

        assert!(chunks.len() > 1);
        assert!(!chunks[0].has_previous);
        assert!(chunks[0].has_next);
        assert!(!chunks.last().unwrap().has_next);
    }

    #[test]
    fn test_sentence_overlap_carried() {
        let content = "Alpha beta gamma delta one. Epsilon zeta eta theta two. \
                       Iota kappa lambda mu three.";
        let chunks = split_content(content, ChunkingStrategy::Sentence, 30, 8).unwrap();

        assert!(chunks.len() >= 2);
        // The second chunk starts with the tail of the first
        let tail: String = chunks[0].content.chars().rev().take(8).collect::<Vec<_>>()
            .into_iter().rev().collect();
        assert!(chunks[1].content.starts_with(&tail));
    }

    #[test]
    fn test_paragraph_split() {
        let content = "First paragraph stays whole.\n\nSecond paragraph stays whole too.";
        let chunks = split_content(content, ChunkingStrategy::Paragraph, 500, 50).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "First paragraph stays whole.");
    }

    #[test]
    fn test_markdown_section_paths() {
        let content = "# Guide\n\nIntro text here.\n\n## Setup\n\nSetup text here.\n\n\
                       ### Linux\n\nLinux steps here.\n\n## Usage\n\nUsage text here.\n";
        let chunks = split_content(content, ChunkingStrategy::Semantic, 500, 50).unwrap();

        let paths: Vec<&Vec<String>> = chunks.iter().map(|c| &c.section_path).collect();
        assert!(paths.contains(&&vec!["Guide".to_string()]));
        assert!(paths.contains(&&vec!["Guide".to_string(), "Setup".to_string()]));
        assert!(paths.contains(&&vec![
            "Guide".to_string(),
            "Setup".to_string(),
            "Linux".to_string()
        ]));
        assert!(paths.contains(&&vec!["Guide".to_string(), "Usage".to_string()]));
    }

    #[test]
    fn test_plain_text_semantic_falls_back() {
        let content = "Just plain text.\n\nWith two paragraphs.";
        let chunks = split_content(content, ChunkingStrategy::Semantic, 500, 50).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.section_path.is_empty()));
    }
}
