//! Genotype string classification (spec §4.9).
//!
//! Generalised from a query-time genotype filter that classifies a sample's
//! genotype string to decide whether a variant record passes a filter, into
//! a free-standing classifier used for pattern *deduction* instead.

/// Separators `/`, `|`, `-` are treated as equivalent (spec §4.9).
fn alleles(genotype: &str) -> Vec<&str> {
    genotype.split(['/', '|', '-']).collect()
}

pub fn is_missing(genotype: &str) -> bool {
    let alleles = alleles(genotype);
    alleles.is_empty() || alleles.iter().all(|a| *a == "." || a.is_empty())
}

pub fn is_ref(genotype: &str) -> bool {
    if is_missing(genotype) {
        return false;
    }
    alleles(genotype).iter().all(|a| *a == "0")
}

pub fn is_het(genotype: &str) -> bool {
    if is_missing(genotype) {
        return false;
    }
    let alleles = alleles(genotype);
    alleles.len() >= 2 && alleles.iter().collect::<std::collections::HashSet<_>>().len() > 1
}

pub fn is_hom_alt(genotype: &str) -> bool {
    if is_missing(genotype) {
        return false;
    }
    let alleles = alleles(genotype);
    !alleles.is_empty() && alleles.iter().all(|a| *a != "0" && *a != ".") && {
        let unique: std::collections::HashSet<_> = alleles.iter().collect();
        unique.len() == 1
    }
}

/// Het or hom-alt (spec §4.9).
pub fn is_variant(genotype: &str) -> bool {
    is_het(genotype) || is_hom_alt(genotype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/")]
    #[case("|")]
    #[case("-")]
    fn classifies_ref_het_homalt_missing_with_all_separators(#[case] sep: &str) {
        assert!(is_ref(&format!("0{sep}0")));
        assert!(is_het(&format!("0{sep}1")));
        assert!(is_hom_alt(&format!("1{sep}1")));
        assert!(is_missing(&format!(".{sep}.")));
    }

    #[rstest]
    #[case("0/1", true)]
    #[case("1/1", true)]
    #[case("0/0", false)]
    #[case("./.", false)]
    fn is_variant_covers_het_and_homalt_only(#[case] genotype: &str, #[case] expected: bool) {
        assert_eq!(is_variant(genotype), expected);
    }
}
