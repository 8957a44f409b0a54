//! Whole-cohort segregation checks (spec §4.9, PED mode).

use super::genotype;
use super::Pattern;
use crate::model::PedigreeEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegregationStatus {
    Segregates,
    DoesNotSegregate,
    Unknown,
}

/// For `pattern` and the cohort's genotypes at one variant, decide whether
/// the pattern segregates with the phenotype.
///
/// Missing genotype data in a critical (affected) role resolves to
/// `Unknown`; any unaffected carrier under a dominant pattern resolves to
/// `DoesNotSegregate` (incomplete penetrance, reported upstream).
pub fn check_segregation(
    pattern: Pattern,
    genotypes: &IndexMap<String, String>,
    pedigree: &[PedigreeEntry],
) -> SegregationStatus {
    let affected: Vec<&PedigreeEntry> = pedigree
        .iter()
        .filter(|p| matches!(p.affected_status, crate::model::AffectedStatus::Affected))
        .collect();
    let unaffected: Vec<&PedigreeEntry> = pedigree
        .iter()
        .filter(|p| matches!(p.affected_status, crate::model::AffectedStatus::Unaffected))
        .collect();

    if affected.is_empty() {
        return SegregationStatus::Unknown;
    }

    let missing_critical = affected.iter().any(|p| {
        genotypes
            .get(&p.sample_id)
            .map_or(true, |g| genotype::is_missing(g))
    });
    if missing_critical {
        return SegregationStatus::Unknown;
    }

    let affected_without_variant = affected
        .iter()
        .filter(|p| {
            genotypes
                .get(&p.sample_id)
                .is_some_and(|g| !genotype::is_variant(g))
        })
        .count();
    if affected_without_variant > 0 {
        return SegregationStatus::DoesNotSegregate;
    }

    let is_dominant_like = matches!(pattern, Pattern::AutosomalDominant | Pattern::XLinkedDominant);
    if is_dominant_like {
        let unaffected_carriers = unaffected
            .iter()
            .filter(|p| {
                genotypes
                    .get(&p.sample_id)
                    .is_some_and(genotype::is_variant)
            })
            .count();
        if unaffected_carriers > 0 {
            return SegregationStatus::DoesNotSegregate;
        }
    }

    SegregationStatus::Segregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AffectedStatus, Sex};

    fn entry(sample: &str, affected: AffectedStatus) -> PedigreeEntry {
        PedigreeEntry {
            family_id: "FAM".to_string(),
            sample_id: sample.to_string(),
            father_id: "0".to_string(),
            mother_id: "0".to_string(),
            sex: Sex::Male,
            affected_status: affected,
        }
    }

    #[test]
    fn segregates_when_all_affected_carry_and_no_unaffected_carrier() {
        let pedigree = vec![
            entry("child", AffectedStatus::Affected),
            entry("parent", AffectedStatus::Unaffected),
        ];
        let genotypes = IndexMap::from([
            ("child".to_string(), "0/1".to_string()),
            ("parent".to_string(), "0/0".to_string()),
        ]);
        assert_eq!(
            check_segregation(Pattern::AutosomalDominant, &genotypes, &pedigree),
            SegregationStatus::Segregates
        );
    }

    #[test]
    fn does_not_segregate_when_unaffected_carries_dominant_pattern() {
        let pedigree = vec![
            entry("child", AffectedStatus::Affected),
            entry("parent", AffectedStatus::Unaffected),
        ];
        let genotypes = IndexMap::from([
            ("child".to_string(), "0/1".to_string()),
            ("parent".to_string(), "0/1".to_string()),
        ]);
        assert_eq!(
            check_segregation(Pattern::AutosomalDominant, &genotypes, &pedigree),
            SegregationStatus::DoesNotSegregate
        );
    }

    #[test]
    fn missing_affected_genotype_is_unknown() {
        let pedigree = vec![entry("child", AffectedStatus::Affected)];
        let genotypes = IndexMap::new();
        assert_eq!(
            check_segregation(Pattern::AutosomalRecessive, &genotypes, &pedigree),
            SegregationStatus::Unknown
        );
    }
}
