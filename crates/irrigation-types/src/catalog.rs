//! The closed signal catalog.
//!
//! Every signal type belongs to exactly one category, may only be emitted from a fixed set of
//! pipeline phases, and can only be consumed by a unit that declares its required capability.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest pipeline phase index.
pub const MAX_PHASE: u8 = 9;

/// The seven signal categories.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Extraction,
    Assembly,
    Enrichment,
    Validation,
    Scoring,
    Aggregation,
    Report,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Extraction => "EXTRACTION",
            Category::Assembly => "ASSEMBLY",
            Category::Enrichment => "ENRICHMENT",
            Category::Validation => "VALIDATION",
            Category::Scoring => "SCORING",
            Category::Aggregation => "AGGREGATION",
            Category::Report => "REPORT",
        }
    }
}

/// Capability tokens a consumer may declare.
///
/// This is a closed set: configuration strings that do not parse into one of these are rejected
/// before a consumer is registered.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadEvidence,
    ReadQuestionContext,
    WriteMetadata,
    CrossReference,
    CheckConsistency,
    CheckCoverage,
    ComputeScore,
    AdjustScore,
    AggregateScores,
    RenderReport,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::ReadEvidence,
        Capability::ReadQuestionContext,
        Capability::WriteMetadata,
        Capability::CrossReference,
        Capability::CheckConsistency,
        Capability::CheckCoverage,
        Capability::ComputeScore,
        Capability::AdjustScore,
        Capability::AggregateScores,
        Capability::RenderReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ReadEvidence => "read_evidence",
            Capability::ReadQuestionContext => "read_question_context",
            Capability::WriteMetadata => "write_metadata",
            Capability::CrossReference => "cross_reference",
            Capability::CheckConsistency => "check_consistency",
            Capability::CheckCoverage => "check_coverage",
            Capability::ComputeScore => "compute_score",
            Capability::AdjustScore => "adjust_score",
            Capability::AggregateScores => "aggregate_scores",
            Capability::RenderReport => "render_report",
        }
    }

    pub fn parse(token: &str) -> Option<Capability> {
        Capability::ALL.into_iter().find(|c| c.as_str() == token)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seventeen catalog signal types.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    ExtractionEvidence,
    ExtractionPattern,
    ExtractionEntity,
    AssemblyQuestion,
    AssemblyContext,
    EnrichmentMetadata,
    EnrichmentCrossReference,
    EnrichmentSemantic,
    ValidationConsistency,
    ValidationCoverage,
    ScoringPrimary,
    ScoringAdjustment,
    AggregationDimension,
    AggregationPolicyArea,
    AggregationCluster,
    ReportSection,
    ReportFinal,
}

impl SignalType {
    pub const ALL: [SignalType; 17] = [
        SignalType::ExtractionEvidence,
        SignalType::ExtractionPattern,
        SignalType::ExtractionEntity,
        SignalType::AssemblyQuestion,
        SignalType::AssemblyContext,
        SignalType::EnrichmentMetadata,
        SignalType::EnrichmentCrossReference,
        SignalType::EnrichmentSemantic,
        SignalType::ValidationConsistency,
        SignalType::ValidationCoverage,
        SignalType::ScoringPrimary,
        SignalType::ScoringAdjustment,
        SignalType::AggregationDimension,
        SignalType::AggregationPolicyArea,
        SignalType::AggregationCluster,
        SignalType::ReportSection,
        SignalType::ReportFinal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::ExtractionEvidence => "EXTRACTION_EVIDENCE",
            SignalType::ExtractionPattern => "EXTRACTION_PATTERN",
            SignalType::ExtractionEntity => "EXTRACTION_ENTITY",
            SignalType::AssemblyQuestion => "ASSEMBLY_QUESTION",
            SignalType::AssemblyContext => "ASSEMBLY_CONTEXT",
            SignalType::EnrichmentMetadata => "ENRICHMENT_METADATA",
            SignalType::EnrichmentCrossReference => "ENRICHMENT_CROSS_REFERENCE",
            SignalType::EnrichmentSemantic => "ENRICHMENT_SEMANTIC",
            SignalType::ValidationConsistency => "VALIDATION_CONSISTENCY",
            SignalType::ValidationCoverage => "VALIDATION_COVERAGE",
            SignalType::ScoringPrimary => "SCORING_PRIMARY",
            SignalType::ScoringAdjustment => "SCORING_ADJUSTMENT",
            SignalType::AggregationDimension => "AGGREGATION_DIMENSION",
            SignalType::AggregationPolicyArea => "AGGREGATION_POLICY_AREA",
            SignalType::AggregationCluster => "AGGREGATION_CLUSTER",
            SignalType::ReportSection => "REPORT_SECTION",
            SignalType::ReportFinal => "REPORT_FINAL",
        }
    }

    pub fn parse(name: &str) -> Option<SignalType> {
        SignalType::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn category(self) -> Category {
        use SignalType::*;
        match self {
            ExtractionEvidence | ExtractionPattern | ExtractionEntity => Category::Extraction,
            AssemblyQuestion | AssemblyContext => Category::Assembly,
            EnrichmentMetadata | EnrichmentCrossReference | EnrichmentSemantic => {
                Category::Enrichment
            }
            ValidationConsistency | ValidationCoverage => Category::Validation,
            ScoringPrimary | ScoringAdjustment => Category::Scoring,
            AggregationDimension | AggregationPolicyArea | AggregationCluster => {
                Category::Aggregation
            }
            ReportSection | ReportFinal => Category::Report,
        }
    }

    /// Phases that are allowed to emit this type.
    pub fn legal_source_phases(self) -> &'static [u8] {
        use SignalType::*;
        match self {
            ExtractionEvidence | ExtractionPattern => &[1],
            ExtractionEntity => &[0, 1],
            AssemblyQuestion | AssemblyContext => &[2],
            EnrichmentMetadata | EnrichmentCrossReference | EnrichmentSemantic => &[1, 2, 3],
            ValidationConsistency | ValidationCoverage => &[2, 3, 4],
            ScoringPrimary => &[4],
            ScoringAdjustment => &[4, 5],
            AggregationDimension => &[5],
            AggregationPolicyArea => &[6],
            AggregationCluster => &[7],
            ReportSection => &[8],
            ReportFinal => &[9],
        }
    }

    pub fn is_legal_source_phase(self, phase: u8) -> bool {
        self.legal_source_phases().contains(&phase)
    }

    /// Capability a consumer must declare to accept this type.
    pub fn required_capability(self) -> Capability {
        use SignalType::*;
        match self {
            ExtractionEvidence | ExtractionPattern | ExtractionEntity => Capability::ReadEvidence,
            AssemblyQuestion | AssemblyContext => Capability::ReadQuestionContext,
            EnrichmentMetadata => Capability::WriteMetadata,
            EnrichmentCrossReference | EnrichmentSemantic => Capability::CrossReference,
            ValidationConsistency => Capability::CheckConsistency,
            ValidationCoverage => Capability::CheckCoverage,
            ScoringPrimary => Capability::ComputeScore,
            ScoringAdjustment => Capability::AdjustScore,
            AggregationDimension | AggregationPolicyArea | AggregationCluster => {
                Capability::AggregateScores
            }
            ReportSection | ReportFinal => Capability::RenderReport,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn catalog_has_seventeen_types_across_seven_categories() {
        assert_eq!(SignalType::ALL.len(), 17);
        let categories: BTreeSet<Category> =
            SignalType::ALL.iter().map(|t| t.category()).collect();
        assert_eq!(categories.len(), 7);
    }

    #[test]
    fn names_parse_back() {
        for t in SignalType::ALL {
            assert_eq!(SignalType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SignalType::parse("SCORING_SECONDARY"), None);
    }

    #[test]
    fn wire_name_matches_as_str() {
        let json = serde_json::to_string(&SignalType::EnrichmentCrossReference).unwrap();
        assert_eq!(json, "\"ENRICHMENT_CROSS_REFERENCE\"");
        let err = serde_json::from_str::<SignalType>("\"NOT_A_TYPE\"");
        assert!(err.is_err());
    }

    #[test]
    fn every_type_has_phases_within_range() {
        for t in SignalType::ALL {
            assert!(!t.legal_source_phases().is_empty(), "{t} has no phases");
            assert!(t.legal_source_phases().iter().all(|p| *p <= MAX_PHASE));
        }
        assert!(SignalType::ScoringPrimary.is_legal_source_phase(4));
        assert!(!SignalType::ScoringPrimary.is_legal_source_phase(3));
    }

    #[test]
    fn capability_tokens_parse() {
        for c in Capability::ALL {
            assert_eq!(Capability::parse(c.as_str()), Some(c));
        }
        assert_eq!(Capability::parse("score"), None);
    }
}
