//! Heading-based structural split

use super::Headings;

/// Text between two headings, tagged with the headings enclosing it
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub content: String,
    pub headings: Headings,
}

/// Parse an ATX heading of level 1 to 3 into `(level, title)`.
///
/// The marker must be followed by whitespace or end the line. Deeper markers
/// (`####`) and `#tag` style text are body content.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&level) {
        return None;
    }

    let rest = &line[level..];
    if rest.is_empty() {
        return Some((level, ""));
    }
    if rest.starts_with([' ', '\t']) {
        return Some((level, rest.trim()));
    }
    None
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```") || line.starts_with("~~~")
}

/// Split `text` into sections on `#`, `##` and `###` headings.
///
/// Heading lines are not part of any section body. Lines inside fenced code
/// blocks are never treated as headings. Runs of blank lines collapse into a
/// single paragraph break so the windowing pass can split on it. Sections with
/// no content are dropped, and adjacent sections carrying identical headings
/// are merged.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut headings = Headings::default();
    let mut lines: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for raw in text.lines() {
        let trimmed = raw.trim();

        if is_fence(trimmed) {
            in_code_block = !in_code_block;
            lines.push(trimmed.to_string());
            continue;
        }

        if in_code_block {
            lines.push(raw.trim_end().to_string());
            continue;
        }

        if let Some((level, title)) = parse_heading(trimmed) {
            flush(&mut sections, &mut lines, &headings);
            headings.enter(level, title.to_string());
            continue;
        }

        if trimmed.is_empty() {
            if lines.last().is_some_and(|last| !last.is_empty()) {
                lines.push(String::new());
            }
            continue;
        }

        lines.push(trimmed.to_string());
    }

    flush(&mut sections, &mut lines, &headings);
    sections
}

fn flush(sections: &mut Vec<Section>, lines: &mut Vec<String>, headings: &Headings) {
    let content = lines.join("\n").trim().to_string();
    lines.clear();

    if content.is_empty() {
        return;
    }

    match sections.last_mut() {
        Some(last) if last.headings == *headings => {
            last.content.push_str("\n\n");
            last.content.push_str(&content);
        }
        _ => sections.push(Section {
            content,
            headings: headings.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_headings_single_section() {
        let sections = split_sections("first paragraph\n\nsecond paragraph");

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "first paragraph\n\nsecond paragraph");
        assert!(sections[0].headings.is_empty());
    }

    #[test]
    fn test_heading_hierarchy() {
        let text = "# Guide\nintro\n## Install\nsteps\n### Linux\napt\n## Usage\nrun it";
        let sections = split_sections(text);

        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].headings.header_1.as_deref(), Some("Guide"));
        assert_eq!(sections[0].headings.header_2, None);

        assert_eq!(sections[2].content, "apt");
        assert_eq!(sections[2].headings.header_2.as_deref(), Some("Install"));
        assert_eq!(sections[2].headings.header_3.as_deref(), Some("Linux"));

        // New level-2 heading clears the level-3 one
        assert_eq!(sections[3].content, "run it");
        assert_eq!(sections[3].headings.header_2.as_deref(), Some("Usage"));
        assert_eq!(sections[3].headings.header_3, None);
    }

    #[test]
    fn test_deep_heading_is_body_text() {
        let sections = split_sections("# Top\n#### Not a split\nbody");

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "#### Not a split\nbody");
    }

    #[test]
    fn test_hash_without_space_is_body_text() {
        let sections = split_sections("#hashtag line\n## Real\ntext");

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "#hashtag line");
        assert!(sections[0].headings.is_empty());
    }

    #[test]
    fn test_code_block_comments_are_not_headings() {
        let text = "## Script\n```bash\n# install deps\n  pip install x\n```\nafter";
        let sections = split_sections(text);

        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("# install deps"));
        assert!(sections[0].content.contains("  pip install x"));
        assert_eq!(sections[0].headings.header_2.as_deref(), Some("Script"));
    }

    #[test]
    fn test_empty_heading_is_declared() {
        let sections = split_sections("#\ncontent");

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].headings.header_1.as_deref(), Some(""));
    }

    #[test]
    fn test_blank_line_runs_collapse() {
        let sections = split_sections("a\n\n\n\nb");
        assert_eq!(sections[0].content, "a\n\nb");
    }

    #[test]
    fn test_heading_only_document_has_no_sections() {
        assert!(split_sections("# Title\n## Sub").is_empty());
    }

    #[test]
    fn test_repeated_heading_merges_sections() {
        let sections = split_sections("## Same\none\n## Same\ntwo");

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "one\n\ntwo");
    }
}
