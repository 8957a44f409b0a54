//! Inheritance engine (spec §4.9): genotype classification, Mendelian
//! pattern deduction, whole-cohort segregation, and compound-het detection.

pub mod comphet;
pub mod genotype;
pub mod segregation;

use crate::common::is_chrom_x;
use crate::model::{AnnotationRecord, GenotypeMap, PedigreeEntry};
use comphet::CompHetInfo;
use indexmap::IndexMap;
use segregation::SegregationStatus;
use serde::{Deserialize, Serialize};

/// All patterns the engine can assign (spec §4.9 GLOSSARY list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    DeNovo,
    DeNovoCandidate,
    AutosomalDominant,
    AutosomalDominantPossible,
    AutosomalRecessive,
    AutosomalRecessivePossible,
    XLinkedDominant,
    XLinkedRecessive,
    XLinkedRecessivePossible,
    Homozygous,
    PotentialXLinked,
    Dominant,
    Reference,
    NonMendelian,
    CompoundHeterozygous,
    CompoundHeterozygousPossible,
    Unknown,
    UnknownWithMissingData,
    /// Per-variant inheritance analysis failure (spec §7 category 7).
    ErrorAnalysisFailed,
}

/// Fixed priority order, highest first (spec §4.9 "Prioritisation").
const PRIORITY: &[Pattern] = &[
    Pattern::DeNovo,
    Pattern::CompoundHeterozygous,
    Pattern::AutosomalRecessive,
    Pattern::XLinkedRecessive,
    Pattern::XLinkedDominant,
    Pattern::PotentialXLinked,
    Pattern::AutosomalDominant,
    Pattern::Homozygous,
    Pattern::DeNovoCandidate,
    Pattern::AutosomalRecessivePossible,
    Pattern::XLinkedRecessivePossible,
    Pattern::AutosomalDominantPossible,
    Pattern::CompoundHeterozygousPossible,
    Pattern::NonMendelian,
    Pattern::Dominant,
    Pattern::Reference,
    Pattern::Unknown,
    Pattern::UnknownWithMissingData,
    Pattern::ErrorAnalysisFailed,
];

fn priority_rank(pattern: Pattern) -> usize {
    PRIORITY.iter().position(|p| *p == pattern).unwrap_or(PRIORITY.len())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceResult {
    pub possible_patterns: Vec<Pattern>,
    pub prioritized_pattern: Pattern,
    pub segregation: IndexMap<Pattern, SegregationStatus>,
    pub comp_het: Option<CompHetInfo>,
}

/// Explicit trio role assignment (spec §4.9 mode selection, tier 2).
#[derive(Debug, Clone)]
pub struct RoleMap {
    pub index: String,
    pub mother: Option<String>,
    pub father: Option<String>,
}

enum Mode<'a> {
    Pedigree(&'a [PedigreeEntry]),
    Trio { index: String, mother: Option<String>, father: Option<String> },
    SingleSample { sample: String },
}

/// Mode selection priority: pedigree → explicit trio role map → first-three-
/// samples default trio → single-sample (spec §4.9).
fn select_mode<'a>(
    pedigree: Option<&'a [PedigreeEntry]>,
    role_map: Option<&RoleMap>,
    genotypes: &IndexMap<String, String>,
) -> Mode<'a> {
    if let Some(pedigree) = pedigree {
        if !pedigree.is_empty() {
            return Mode::Pedigree(pedigree);
        }
    }
    if let Some(roles) = role_map {
        return Mode::Trio {
            index: roles.index.clone(),
            mother: roles.mother.clone(),
            father: roles.father.clone(),
        };
    }
    let samples: Vec<&String> = genotypes.keys().collect();
    if samples.len() >= 3 {
        return Mode::Trio {
            index: samples[0].clone(),
            mother: Some(samples[1].clone()),
            father: Some(samples[2].clone()),
        };
    }
    Mode::SingleSample {
        sample: samples.first().map(|s| s.to_string()).unwrap_or_default(),
    }
}

/// Per-variant Mendelian deduction for a single sample with no family data.
fn deduce_single_sample(genotype_str: &str) -> Vec<Pattern> {
    if genotype::is_missing(genotype_str) {
        return vec![Pattern::UnknownWithMissingData];
    }
    if genotype::is_ref(genotype_str) {
        return vec![Pattern::Reference];
    }
    if genotype::is_variant(genotype_str) {
        let mut patterns = vec![Pattern::Dominant];
        if genotype::is_hom_alt(genotype_str) {
            patterns.push(Pattern::Homozygous);
        }
        return patterns;
    }
    vec![Pattern::Unknown]
}

/// Per-variant trio deduction (spec §4.9 "Trio rules (abbreviated)").
fn deduce_trio(chrom: &str, index_gt: &str, mother_gt: Option<&str>, father_gt: Option<&str>) -> Vec<Pattern> {
    if genotype::is_missing(index_gt) {
        return vec![Pattern::UnknownWithMissingData];
    }

    let mother_known = mother_gt.is_some_and(|g| !genotype::is_missing(g));
    let father_known = father_gt.is_some_and(|g| !genotype::is_missing(g));
    let any_parent_missing = !mother_known || !father_known;

    let index_variant = genotype::is_variant(index_gt);
    let index_het = genotype::is_het(index_gt);
    let index_homalt = genotype::is_hom_alt(index_gt);
    let index_ref = genotype::is_ref(index_gt);

    let mother_ref = mother_known && genotype::is_ref(mother_gt.unwrap());
    let father_ref = father_known && genotype::is_ref(father_gt.unwrap());
    let mother_het = mother_known && genotype::is_het(mother_gt.unwrap());
    let father_het = father_known && genotype::is_het(father_gt.unwrap());
    let mother_variant = mother_known && genotype::is_variant(mother_gt.unwrap());
    let on_x = is_chrom_x(chrom);

    let mut patterns: Vec<Pattern> = Vec::new();

    if index_ref {
        return vec![Pattern::Reference];
    }

    if index_homalt {
        patterns.push(Pattern::Homozygous);
    }

    if index_variant && mother_known && father_known && mother_ref && father_ref {
        patterns.push(Pattern::DeNovo);
    } else if index_variant
        && any_parent_missing
        && ((mother_known && mother_ref) || (father_known && father_ref))
    {
        patterns.push(Pattern::DeNovoCandidate);
    }

    if index_homalt && mother_known && father_known && mother_het && father_het {
        patterns.push(Pattern::AutosomalRecessive);
    } else if index_homalt
        && any_parent_missing
        && ((mother_known && mother_het) || (father_known && father_het))
    {
        patterns.push(Pattern::AutosomalRecessivePossible);
    } else if index_homalt && mother_known && father_known && mother_ref && father_ref {
        patterns.push(Pattern::NonMendelian);
    }

    if index_het {
        let known_het_count = [mother_het, father_het].iter().filter(|x| **x).count();
        if known_het_count >= 1 {
            patterns.push(Pattern::AutosomalDominant);
        } else if any_parent_missing {
            patterns.push(Pattern::AutosomalDominantPossible);
        }
    }

    if on_x && index_variant {
        patterns.push(Pattern::PotentialXLinked);
        if mother_known && father_known && mother_variant && father_ref {
            patterns.push(Pattern::XLinkedRecessive);
        } else if any_parent_missing
            && ((mother_known && mother_variant) || !mother_known)
            && ((father_known && father_ref) || !father_known)
        {
            patterns.push(Pattern::XLinkedRecessivePossible);
        }
    }

    if patterns.is_empty() {
        patterns.push(if any_parent_missing {
            Pattern::UnknownWithMissingData
        } else {
            Pattern::Unknown
        });
    }

    patterns
}

/// Prioritise among `patterns` using `segregation` status, preferring
/// `Segregates`, then `Unknown`, then all (spec §4.9).
fn prioritize(patterns: &[Pattern], segregation: &IndexMap<Pattern, SegregationStatus>) -> Pattern {
    let segregating: Vec<Pattern> = patterns
        .iter()
        .copied()
        .filter(|p| segregation.get(p) == Some(&SegregationStatus::Segregates))
        .collect();
    let candidates: Vec<Pattern> = if !segregating.is_empty() {
        segregating
    } else {
        let unknown: Vec<Pattern> = patterns
            .iter()
            .copied()
            .filter(|p| matches!(segregation.get(p), None | Some(SegregationStatus::Unknown)))
            .collect();
        if !unknown.is_empty() {
            unknown
        } else {
            patterns.to_vec()
        }
    };
    candidates
        .into_iter()
        .min_by_key(|p| priority_rank(*p))
        .unwrap_or(Pattern::Unknown)
}

/// Deduce the inheritance result for one variant's genotype row.
///
/// `chrom` gates X-linked pattern checks; `genotypes` maps sample id to
/// genotype string for this single variant.
pub fn deduce_for_variant(
    chrom: &str,
    genotypes: &IndexMap<String, String>,
    pedigree: Option<&[PedigreeEntry]>,
    role_map: Option<&RoleMap>,
) -> InheritanceResult {
    let mode = select_mode(pedigree, role_map, genotypes);

    let possible_patterns = match &mode {
        Mode::SingleSample { sample } => genotypes
            .get(sample)
            .map(|gt| deduce_single_sample(gt))
            .unwrap_or_else(|| vec![Pattern::UnknownWithMissingData]),
        Mode::Trio { index, mother, father } => deduce_trio(
            chrom,
            genotypes.get(index).map(String::as_str).unwrap_or("."),
            mother.as_deref().and_then(|m| genotypes.get(m)).map(String::as_str),
            father.as_deref().and_then(|f| genotypes.get(f)).map(String::as_str),
        ),
        Mode::Pedigree(pedigree) => {
            let index = pedigree.first();
            match index {
                Some(index_entry) => {
                    let mother = if index_entry.has_mother() {
                        Some(index_entry.mother_id.as_str())
                    } else {
                        None
                    };
                    let father = if index_entry.has_father() {
                        Some(index_entry.father_id.as_str())
                    } else {
                        None
                    };
                    deduce_trio(
                        chrom,
                        genotypes.get(&index_entry.sample_id).map(String::as_str).unwrap_or("."),
                        mother.and_then(|m| genotypes.get(m)).map(String::as_str),
                        father.and_then(|f| genotypes.get(f)).map(String::as_str),
                    )
                }
                None => vec![Pattern::UnknownWithMissingData],
            }
        }
    };

    let mut segregation_map = IndexMap::new();
    if let Mode::Pedigree(pedigree) = &mode {
        for pattern in &possible_patterns {
            segregation_map.insert(
                *pattern,
                segregation::check_segregation(*pattern, genotypes, pedigree),
            );
        }
    }

    let prioritized_pattern = prioritize(&possible_patterns, &segregation_map);

    InheritanceResult {
        possible_patterns,
        prioritized_pattern,
        segregation: segregation_map,
        comp_het: None,
    }
}

/// Run compound-het detection across a batch and fold results into each
/// annotation's inheritance result, upgrading `prioritized_pattern` unless a
/// stronger pattern was already assigned (spec §4.9 step 4).
pub fn apply_compound_het(
    annotations: &mut [AnnotationRecord],
    genotypes: &GenotypeMap,
    index_sample: &str,
    mother_sample: Option<&str>,
    father_sample: Option<&str>,
) {
    let comp_het_by_variant =
        comphet::detect_compound_het(annotations, genotypes, index_sample, mother_sample, father_sample);

    for annotation in annotations.iter_mut() {
        let Some(comp_het) = comp_het_by_variant.get(&annotation.variant_key) else {
            continue;
        };
        let pattern = if comp_het.confirmed {
            Pattern::CompoundHeterozygous
        } else {
            Pattern::CompoundHeterozygousPossible
        };
        let Some(inheritance) = annotation.inheritance.as_mut() else {
            continue;
        };
        inheritance.comp_het = Some(comp_het.clone());
        inheritance.possible_patterns.push(pattern);
        if priority_rank(pattern) < priority_rank(inheritance.prioritized_pattern) {
            inheritance.prioritized_pattern = pattern;
        }
    }
}
