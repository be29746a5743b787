//! Research document quality gate.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::markdown::SectionIndex;

/// `path/to/file.ext:12` or `file.ext:12-40`.
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[\w.\-]+/)*[\w\-]+(?:\.[\w\-]+)*\.([A-Za-z0-9]+):\d+(?:-\d+)?")
        .expect("citation regex should compile")
});

/// Extensions that make a slash-less `name.ext:N` a file rather than `host:port`.
const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cfg", "cjs", "cpp", "cs", "css", "dart", "ex", "exs", "go", "h", "hpp", "hs",
    "html", "ini", "java", "js", "json", "jsx", "kt", "kts", "lock", "lua", "md", "mjs", "ml",
    "php", "proto", "py", "rb", "rs", "scala", "scss", "sh", "sql", "svelte", "swift", "tf",
    "toml", "ts", "tsx", "txt", "vue", "xml", "yaml", "yml", "zig",
];

const SUMMARY: &str = "Summary";
const ANALYSIS: &str = "Current State Analysis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchQualityOptions {
    pub required_sections: Vec<String>,
    pub min_citations: usize,
    pub min_summary_length: usize,
    pub min_analysis_length: usize,
}

impl Default for ResearchQualityOptions {
    fn default() -> Self {
        Self {
            required_sections: [
                SUMMARY,
                ANALYSIS,
                "Key Files",
                "Technical Considerations",
                "Risks and Mitigations",
                "Recommended Approach",
            ]
            .map(String::from)
            .to_vec(),
            min_citations: 5,
            min_summary_length: 100,
            min_analysis_length: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchQualityResult {
    pub valid: bool,
    pub citations: usize,
    pub summary_length: usize,
    pub analysis_length: usize,
    pub missing_sections: Vec<String>,
    pub errors: Vec<String>,
}

/// Count `path:line[-line]` citations anywhere in `content`.
///
/// URL authorities and bare `host:port` pairs are not citations: a match needs a
/// `/` or a known source extension, and must not follow `://`.
pub fn count_citations(content: &str) -> usize {
    CITATION_RE
        .captures_iter(content)
        .filter(|caps| {
            let (Some(whole), Some(ext)) = (caps.get(0), caps.get(1)) else {
                return false;
            };
            if content[..whole.start()].ends_with("://") {
                return false;
            }
            whole.as_str().contains('/')
                || SOURCE_EXTENSIONS.contains(&ext.as_str().to_ascii_lowercase().as_str())
        })
        .count()
}

pub fn validate_research_quality(
    content: &str,
    options: &ResearchQualityOptions,
) -> ResearchQualityResult {
    let index = SectionIndex::parse(content);
    let mut errors = Vec::new();

    let missing_sections: Vec<String> = options
        .required_sections
        .iter()
        .filter(|name| !index.has_section(name))
        .cloned()
        .collect();
    if !missing_sections.is_empty() {
        errors.push(format!(
            "missing required sections: {}",
            missing_sections.join(", ")
        ));
    }

    let citations = count_citations(content);
    if citations < options.min_citations {
        errors.push(format!(
            "found {citations} file citations (path:line), need at least {}",
            options.min_citations
        ));
    }

    let summary_length = body_length(&index, SUMMARY);
    if index.has_section(SUMMARY) && summary_length < options.min_summary_length {
        errors.push(format!(
            "Summary section is {summary_length} characters, need at least {}",
            options.min_summary_length
        ));
    }

    let analysis_length = body_length(&index, ANALYSIS);
    if index.has_section(ANALYSIS) && analysis_length < options.min_analysis_length {
        errors.push(format!(
            "Current State Analysis section is {analysis_length} characters, need at least {}",
            options.min_analysis_length
        ));
    }

    ResearchQualityResult {
        valid: errors.is_empty(),
        citations,
        summary_length,
        analysis_length,
        missing_sections,
        errors,
    }
}

fn body_length(index: &SectionIndex<'_>, name: &str) -> usize {
    index
        .section_body(name)
        .map_or(0, |body| body.trim().chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::research_doc;

    #[test]
    fn counts_citations_with_line_ranges() {
        let text = "See `src/lib.rs:10`, src/io/git.rs:20-40 and main.rs:3. Not 10:30 or http.";
        assert_eq!(count_citations(text), 3);
    }

    #[test]
    fn host_port_pairs_are_not_citations() {
        let hosts = "localhost.dev:8080, api.example.com:443, db.internal:5432, \
                     cache.local:6379, web.app:3000";
        assert_eq!(count_citations(hosts), 0);

        assert_eq!(count_citations("https://github.com/acme/app/src/lib.rs:10"), 0);
        assert_eq!(count_citations("see http://example.com/x.rs:4"), 0);

        assert_eq!(count_citations("Cargo.toml:12 and README.md:3"), 2);
    }

    #[test]
    fn accepts_complete_document() {
        let result =
            validate_research_quality(&research_doc(6), &ResearchQualityOptions::default());
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.citations, 6);
        assert!(result.missing_sections.is_empty());
    }

    #[test]
    fn rejects_too_few_citations_even_with_all_sections() {
        let result =
            validate_research_quality(&research_doc(2), &ResearchQualityOptions::default());
        assert!(!result.valid);
        assert!(result.missing_sections.is_empty());
        assert_eq!(result.citations, 2);
        assert!(result.errors.iter().any(|e| e.contains("citations")));
    }

    #[test]
    fn reports_missing_sections_and_short_summary() {
        let doc = "# Research\n## Summary\ntoo short\n## Key Files\n- a.rs:1\n";
        let options = ResearchQualityOptions {
            min_citations: 1,
            ..ResearchQualityOptions::default()
        };
        let result = validate_research_quality(doc, &options);
        assert!(!result.valid);
        assert!(result.missing_sections.contains(&"Current State Analysis".to_string()));
        assert_eq!(result.summary_length, "too short".len());
        assert!(result.errors.iter().any(|e| e.contains("Summary section")));
    }

    #[test]
    fn thresholds_are_configurable() {
        let doc = "## summary\nok\n";
        let options = ResearchQualityOptions {
            required_sections: vec!["Summary".to_string()],
            min_citations: 0,
            min_summary_length: 2,
            min_analysis_length: 0,
        };
        assert!(validate_research_quality(doc, &options).valid);
    }
}
