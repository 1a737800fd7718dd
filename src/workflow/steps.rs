//! Static step table of the authoring workflow.

use serde::{Deserialize, Serialize};

/// One stage of the authoring workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStep {
    Architecture,
    Blueprint,
    Draft,
}

#[derive(Debug, Clone, Copy)]
pub struct StepConfig {
    pub key: WorkflowStep,
    pub label: &'static str,
    pub prerequisite: Option<WorkflowStep>,
}

/// Steps in declared order.
pub const WORKFLOW_STEPS: [StepConfig; 3] = [
    StepConfig {
        key: WorkflowStep::Architecture,
        label: "Architecture",
        prerequisite: None,
    },
    StepConfig {
        key: WorkflowStep::Blueprint,
        label: "Blueprint",
        prerequisite: Some(WorkflowStep::Architecture),
    },
    StepConfig {
        key: WorkflowStep::Draft,
        label: "Draft",
        prerequisite: Some(WorkflowStep::Blueprint),
    },
];

impl WorkflowStep {
    pub fn config(&self) -> &'static StepConfig {
        // The table covers every variant.
        WORKFLOW_STEPS
            .iter()
            .find(|c| c.key == *self)
            .unwrap_or(&WORKFLOW_STEPS[0])
    }

    pub fn prerequisite(&self) -> Option<WorkflowStep> {
        self.config().prerequisite
    }

    pub fn label(&self) -> &'static str {
        self.config().label
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Blueprint => "blueprint",
            Self::Draft => "draft",
        }
    }

    pub fn first() -> WorkflowStep {
        WORKFLOW_STEPS[0].key
    }

    pub fn last() -> WorkflowStep {
        WORKFLOW_STEPS[WORKFLOW_STEPS.len() - 1].key
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `step` plus every step that transitively requires it, in declared order.
pub fn dependency_closure(step: WorkflowStep) -> Vec<WorkflowStep> {
    let mut closure = vec![step];
    loop {
        let before = closure.len();
        for config in WORKFLOW_STEPS.iter() {
            if let Some(prereq) = config.prerequisite {
                if closure.contains(&prereq) && !closure.contains(&config.key) {
                    closure.push(config.key);
                }
            }
        }
        if closure.len() == before {
            break;
        }
    }
    closure.sort_by_key(|s| WORKFLOW_STEPS.iter().position(|c| c.key == *s));
    closure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisites() {
        assert_eq!(WorkflowStep::Architecture.prerequisite(), None);
        assert_eq!(
            WorkflowStep::Blueprint.prerequisite(),
            Some(WorkflowStep::Architecture)
        );
        assert_eq!(WorkflowStep::Draft.prerequisite(), Some(WorkflowStep::Blueprint));
        assert_eq!(WorkflowStep::last(), WorkflowStep::Draft);
    }

    #[test]
    fn test_dependency_closure() {
        assert_eq!(
            dependency_closure(WorkflowStep::Architecture),
            vec![
                WorkflowStep::Architecture,
                WorkflowStep::Blueprint,
                WorkflowStep::Draft
            ]
        );
        assert_eq!(
            dependency_closure(WorkflowStep::Blueprint),
            vec![WorkflowStep::Blueprint, WorkflowStep::Draft]
        );
        assert_eq!(dependency_closure(WorkflowStep::Draft), vec![WorkflowStep::Draft]);
    }
}
