//! Minimal markdown heading index used by the document quality gates.
//!
//! A section is the body between a heading and the next heading of the same or a
//! shallower level. Lines inside fenced code blocks are never treated as headings.

/// An ATX heading (`#` .. `######`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    /// Byte offset where the heading line starts.
    pub start: usize,
    /// Byte offset just past the heading line (start of its body).
    pub body_start: usize,
}

/// Headings of a document, in order, with section slicing helpers.
#[derive(Debug, Clone)]
pub struct SectionIndex<'a> {
    content: &'a str,
    headings: Vec<Heading>,
}

impl<'a> SectionIndex<'a> {
    pub fn parse(content: &'a str) -> Self {
        let mut headings = Vec::new();
        let mut in_fence = false;
        let mut offset = 0;

        for line in content.split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some((level, text)) = parse_heading(line) {
                headings.push(Heading {
                    level,
                    text,
                    start,
                    body_start: offset,
                });
            }
        }

        Self { content, headings }
    }

    pub fn headings(&self) -> &[Heading] {
        &self.headings
    }

    /// Find a heading by text, case-insensitively, at any level.
    pub fn find(&self, name: &str) -> Option<&Heading> {
        let wanted = normalize_title(name);
        self.headings
            .iter()
            .find(|heading| normalize_title(&heading.text) == wanted)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Body of the named section, excluding its heading line.
    pub fn section_body(&self, name: &str) -> Option<&'a str> {
        let heading = self.find(name)?;
        let end = self.section_end(heading);
        Some(&self.content[heading.body_start..end])
    }

    /// Headings strictly inside the named section.
    pub fn subheadings(&self, name: &str) -> Vec<&Heading> {
        let Some(heading) = self.find(name) else {
            return Vec::new();
        };
        let end = self.section_end(heading);
        self.headings
            .iter()
            .filter(|h| h.start >= heading.body_start && h.start < end)
            .collect()
    }

    fn section_end(&self, heading: &Heading) -> usize {
        self.headings
            .iter()
            .find(|h| h.start > heading.start && h.level <= heading.level)
            .map_or(self.content.len(), |h| h.start)
    }
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let line = line.trim_end_matches(['\n', '\r']);
    // Up to three leading spaces are allowed for ATX headings.
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let level = rest.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.is_empty() && !after.starts_with([' ', '\t']) {
        return None;
    }
    let text = after.trim().trim_end_matches('#').trim().to_string();
    Some((level, text))
}

fn normalize_title(text: &str) -> String {
    text.trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Title\n\n## Summary\nshort summary\n\n## Phases\nintro\n### Phase 1\nwork\n### Phase 2\nmore\n## Testing Strategy\n### Unit\n";

    #[test]
    fn finds_sections_case_insensitively_at_any_level() {
        let index = SectionIndex::parse(DOC);
        assert!(index.has_section("summary"));
        assert!(index.has_section("TESTING STRATEGY"));
        assert!(index.has_section("title"));
        assert!(!index.has_section("Overview"));
    }

    #[test]
    fn section_body_stops_at_same_level_heading() {
        let index = SectionIndex::parse(DOC);
        assert_eq!(index.section_body("Summary"), Some("short summary\n\n"));
        let phases = index.section_body("Phases").expect("phases");
        assert!(phases.contains("### Phase 2"));
        assert!(!phases.contains("Testing"));
    }

    #[test]
    fn subheadings_are_scoped_to_section() {
        let index = SectionIndex::parse(DOC);
        let phases: Vec<&str> = index
            .subheadings("Phases")
            .iter()
            .map(|h| h.text.as_str())
            .collect();
        assert_eq!(phases, vec!["Phase 1", "Phase 2"]);
    }

    #[test]
    fn ignores_headings_in_code_fences_and_hashtags() {
        let doc = "## Summary\n```bash\n# not a heading\n```\n#hashtag\n## Key Files\n";
        let index = SectionIndex::parse(doc);
        let texts: Vec<&str> = index.headings().iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["Summary", "Key Files"]);
    }

    #[test]
    fn trailing_colon_and_closing_hashes_are_ignored() {
        let index = SectionIndex::parse("## Summary: ##\nbody\n");
        assert!(index.has_section("Summary"));
    }
}
