//! Plan document quality gate.

use serde::{Deserialize, Serialize};

use super::markdown::SectionIndex;

const PHASES: &str = "Phases";
const PHASE_HEADING_LEVEL: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanQualityOptions {
    pub required_sections: Vec<String>,
    pub min_phases: usize,
}

impl Default for PlanQualityOptions {
    fn default() -> Self {
        Self {
            required_sections: [
                "Overview",
                "Current State",
                "Desired End State",
                "What We're NOT Doing",
                "Implementation Approach",
                PHASES,
                "Testing Strategy",
            ]
            .map(String::from)
            .to_vec(),
            min_phases: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanQualityResult {
    pub valid: bool,
    pub phases: usize,
    pub missing_sections: Vec<String>,
    pub errors: Vec<String>,
}

/// Count `###` headings inside the `Phases` section only.
pub fn count_phases(content: &str) -> usize {
    SectionIndex::parse(content)
        .subheadings(PHASES)
        .iter()
        .filter(|heading| heading.level == PHASE_HEADING_LEVEL)
        .count()
}

pub fn validate_plan_quality(content: &str, options: &PlanQualityOptions) -> PlanQualityResult {
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

    let phases = count_phases(content);
    if phases < options.min_phases {
        errors.push(format!(
            "found {phases} phases (### headings under Phases), need at least {}",
            options.min_phases
        ));
    }

    PlanQualityResult {
        valid: errors.is_empty(),
        phases,
        missing_sections,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::plan_doc;

    #[test]
    fn accepts_complete_plan() {
        let result = validate_plan_quality(&plan_doc(2), &PlanQualityOptions::default());
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.phases, 2);
    }

    #[test]
    fn headings_outside_phases_are_not_counted() {
        let doc = "## Overview\n### Not a phase\n## Phases\ntext only\n## Testing Strategy\n### Unit tests\n";
        assert_eq!(count_phases(doc), 0);

        let result = validate_plan_quality(doc, &PlanQualityOptions::default());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("found 0 phases")));
    }

    #[test]
    fn deeper_headings_inside_phases_are_not_phases() {
        let doc = "## Phases\n### Phase 1\n#### Step a\n#### Step b\n### Phase 2\n";
        assert_eq!(count_phases(doc), 2);
    }

    #[test]
    fn reports_missing_sections() {
        let result = validate_plan_quality(
            "## Phases\n### Phase 1\n",
            &PlanQualityOptions::default(),
        );
        assert!(!result.valid);
        assert!(result.missing_sections.contains(&"Overview".to_string()));
        assert!(!result.missing_sections.contains(&"Phases".to_string()));
    }
}
