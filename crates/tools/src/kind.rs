//! The closed set of tools the model may call.

/// Every tool known to the dispatcher.
///
/// Names are the exact strings the model uses in `action.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReportList,
    ArtifactList,
    ArtifactData,
    GrepSearch,
    SemanticSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::ReportList,
        ToolKind::ArtifactList,
        ToolKind::ArtifactData,
        ToolKind::GrepSearch,
        ToolKind::SemanticSearch,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReportList => "viewReportList",
            Self::ArtifactList => "viewArtifactList",
            Self::ArtifactData => "viewArtifactData",
            Self::GrepSearch => "grepSearch",
            Self::SemanticSearch => "semanticSearch",
        }
    }

    /// Whether the caller's dataset id is injected as `job_name`.
    pub fn accepts_dataset(&self) -> bool {
        !matches!(self, Self::ReportList)
    }

    /// Input signature shown to the model.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::ReportList => "{}",
            Self::ArtifactList => r#"{"job_name": str}"#,
            Self::ArtifactData => {
                r#"{"job_name": str, "artifact_type_id": int | [int], "limit"?: int = 100, "offset"?: int = 0}"#
            }
            Self::GrepSearch => {
                r#"{"pattern": str, "job_name": str, "artifact_type_id"?: int | [int], "limit"?: int = 50, "case_sensitive"?: bool = false}"#
            }
            Self::SemanticSearch => {
                r#"{"query": str, "job_name"?: str, "n_results"?: int = 10}"#
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ReportList => "List every ingested LEAPP report with its status and upload date.",
            Self::ArtifactList => {
                "List the artifact tables (TSV files) of one report, with their ids and row counts."
            }
            Self::ArtifactData => {
                "Read rows from one or more artifact tables of a report. Paginate with limit/offset."
            }
            Self::GrepSearch => {
                "Find rows containing a literal text pattern in a report, optionally restricted to some artifact tables."
            }
            Self::SemanticSearch => {
                "Find rows whose content is semantically close to a natural-language query."
            }
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("shell"), None);
        assert_eq!(ToolKind::from_name("viewreportlist"), None);
    }

    #[test]
    fn only_report_list_ignores_dataset() {
        assert!(!ToolKind::ReportList.accepts_dataset());
        assert!(ToolKind::SemanticSearch.accepts_dataset());
        assert!(ToolKind::GrepSearch.accepts_dataset());
    }
}
