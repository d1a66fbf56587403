// 📝 Textual Clusterer - Group records without coordinates by name
// Normalized-name similarity is the only duplicate signal left once the
// spatial one is gone. Names are case-folded, diacritics stripped and
// generic institutional prefixes removed before Jaro-Winkler comparison;
// transitive closure over the similarity graph merges chains of
// near-duplicates.

use anyhow::{bail, Result};
use log::debug;
use std::collections::HashMap;
use strsim::jaro_winkler;

use crate::cluster::{Cluster, ClusterMethod};
use crate::record::RawRecord;
use crate::union_find::UnionFind;

/// Above this subset size, only pairs sharing the first letter of the
/// normalized name are compared (blocking keeps the O(k²) pass bounded)
const BLOCKING_THRESHOLD: usize = 512;

// ============================================================================
// NAME NORMALIZER
// ============================================================================

/// Folds a name down to the tokens that actually identify the facility
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    /// Stopword phrases, pre-normalized and tokenized
    stopword_phrases: Vec<Vec<String>>,
}

impl NameNormalizer {
    pub fn new(stopwords: &[String]) -> Self {
        let mut stopword_phrases: Vec<Vec<String>> = stopwords
            .iter()
            .map(|phrase| tokenize(&fold_text(phrase)))
            .filter(|tokens| !tokens.is_empty())
            .collect();

        // Longest phrases first so "centro educativo" wins over "centro"
        stopword_phrases.sort_by_key(|tokens| std::cmp::Reverse(tokens.len()));

        NameNormalizer { stopword_phrases }
    }

    /// Normalize a raw facility name.
    ///
    /// "I.E. José María Córdoba - Sede Principal" with stopwords
    /// ["institucion educativa", "ie", "sede"] becomes
    /// "jose maria cordoba principal".
    pub fn normalize(&self, name: &str) -> String {
        let mut tokens = tokenize(&fold_text(name));

        for phrase in &self.stopword_phrases {
            tokens = remove_phrase(&tokens, phrase);
        }

        tokens.join(" ")
    }
}

/// Lowercase and fold Spanish diacritics, mapping punctuation to spaces
fn fold_text(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());

    for c in text.to_lowercase().chars() {
        let mapped = match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        };
        folded.push(mapped);
    }

    folded
}

fn tokenize(folded: &str) -> Vec<String> {
    folded
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Remove every occurrence of a token phrase from a token list
fn remove_phrase(tokens: &[String], phrase: &[String]) -> Vec<String> {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return tokens.to_vec();
    }

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + phrase.len() <= tokens.len() && tokens[i..i + phrase.len()] == phrase[..] {
            i += phrase.len();
        } else {
            out.push(tokens[i].clone());
            i += 1;
        }
    }
    out
}

// ============================================================================
// TEXTUAL CLUSTERER
// ============================================================================

pub struct TextualClusterer {
    /// Minimum similarity (0-100) for two names to join a cluster
    pub similarity_threshold: f64,

    pub normalizer: NameNormalizer,
}

impl TextualClusterer {
    pub fn new(similarity_threshold: f64, stopwords: &[String]) -> Self {
        TextualClusterer {
            similarity_threshold,
            normalizer: NameNormalizer::new(stopwords),
        }
    }

    /// Cluster the non-geolocated subset by normalized-name similarity.
    ///
    /// `indices` are positions into the full batch. Records whose name
    /// normalizes to the empty string never merge with anything. The only
    /// error is a threshold outside 0-100; the engine degrades to the
    /// exact-key fallback in that case.
    pub fn cluster(&self, records: &[RawRecord], indices: &[usize]) -> Result<Vec<Cluster>> {
        if !self.similarity_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.similarity_threshold)
        {
            bail!(
                "Textual similarity threshold out of range: {}",
                self.similarity_threshold
            );
        }

        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<String> = indices
            .iter()
            .map(|&index| self.normalizer.normalize(&records[index].name))
            .collect();

        let mut uf = UnionFind::new(indices.len());

        if indices.len() > BLOCKING_THRESHOLD {
            debug!(
                "textual subset of {} records: blocking by first letter",
                indices.len()
            );
            // Compare only within first-letter blocks
            let mut blocks: HashMap<char, Vec<usize>> = HashMap::new();
            for (pos, name) in names.iter().enumerate() {
                if let Some(first) = name.chars().next() {
                    blocks.entry(first).or_default().push(pos);
                }
            }
            for block in blocks.values() {
                self.union_similar(&names, block, &mut uf);
            }
        } else {
            let all_positions: Vec<usize> = (0..indices.len()).collect();
            self.union_similar(&names, &all_positions, &mut uf);
        }

        let clusters = uf
            .groups()
            .into_iter()
            .map(|positions| {
                let members = positions.into_iter().map(|pos| indices[pos]).collect();
                Cluster::new(members, ClusterMethod::Textual, None)
            })
            .collect();

        Ok(clusters)
    }

    /// Union every pair of positions whose names clear the threshold
    fn union_similar(&self, names: &[String], positions: &[usize], uf: &mut UnionFind) {
        for (i, &a) in positions.iter().enumerate() {
            if names[a].is_empty() {
                continue; // unnameable records stay singletons
            }
            for &b in &positions[i + 1..] {
                if names[b].is_empty() {
                    continue;
                }
                let similarity = jaro_winkler(&names[a], &names[b]) * 100.0;
                if similarity >= self.similarity_threshold {
                    uf.union(a, b);
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::create_test_record;

    fn test_stopwords() -> Vec<String> {
        vec![
            "institucion educativa".to_string(),
            "i e".to_string(),
            "ie".to_string(),
            "sede".to_string(),
        ]
    }

    fn create_test_clusterer() -> TextualClusterer {
        TextualClusterer::new(85.0, &test_stopwords())
    }

    #[test]
    fn test_normalize_strips_diacritics_and_prefixes() {
        let normalizer = NameNormalizer::new(&test_stopwords());

        assert_eq!(
            normalizer.normalize("Institución Educativa José María Córdoba"),
            "jose maria cordoba"
        );
        assert_eq!(
            normalizer.normalize("I.E. José María Córdoba - Sede Principal"),
            "jose maria cordoba principal"
        );
    }

    #[test]
    fn test_normalize_prefers_longest_stopword_phrase() {
        // "institucion educativa" must be removed as a phrase, not leave
        // a dangling "educativa" behind after removing a shorter match
        let normalizer = NameNormalizer::new(&[
            "institucion".to_string(),
            "institucion educativa".to_string(),
        ]);
        assert_eq!(normalizer.normalize("Institución Educativa Central"), "central");
    }

    #[test]
    fn test_spelling_variants_merge() {
        let records = vec![
            create_test_record("Institución Educativa José María Córdoba", None, None),
            create_test_record("I.E. Jose Maria Cordoba", None, None),
            create_test_record("Biblioteca Departamental", None, None),
        ];

        let clusters = create_test_clusterer()
            .cluster(&records, &[0, 1, 2])
            .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].member_indices, vec![0, 1]);
        assert_eq!(clusters[1].member_indices, vec![2]);
        assert_eq!(clusters[0].method, ClusterMethod::Textual);
        assert_eq!(clusters[0].centroid, None);
    }

    #[test]
    fn test_transitive_chain_merges() {
        // 0~1 and 1~2 are close; 0~2 alone might not clear the bar, but
        // the chain still lands all three in one cluster
        let records = vec![
            create_test_record("Polideportivo El Diamante", None, None),
            create_test_record("Polideportivo El Diamante Etapa II", None, None),
            create_test_record("Polideportivo El Diamante Etapa II Fase B", None, None),
        ];

        let clusters = create_test_clusterer()
            .cluster(&records, &[0, 1, 2])
            .unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_distinct_names_stay_apart() {
        let records = vec![
            create_test_record("Hospital Carlos Holmes", None, None),
            create_test_record("Estación de Bomberos Norte", None, None),
        ];

        let clusters = create_test_clusterer()
            .cluster(&records, &[0, 1])
            .unwrap();

        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_empty_names_never_merge() {
        // Both names normalize to "" (pure stopwords); they must not be
        // treated as identical
        let records = vec![
            create_test_record("Sede", None, None),
            create_test_record("I.E.", None, None),
        ];

        let clusters = create_test_clusterer()
            .cluster(&records, &[0, 1])
            .unwrap();

        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_out_of_range_threshold_is_an_error() {
        let records = vec![create_test_record("A", None, None)];

        let clusterer = TextualClusterer::new(185.0, &test_stopwords());
        assert!(clusterer.cluster(&records, &[0]).is_err());

        let clusterer = TextualClusterer::new(f64::NAN, &test_stopwords());
        assert!(clusterer.cluster(&records, &[0]).is_err());
    }

    #[test]
    fn test_empty_subset_is_fine() {
        let clusters = create_test_clusterer().cluster(&[], &[]).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_blocking_path_still_groups_duplicates() {
        // Enough records to trip the blocking threshold, with one known
        // duplicate pair in the middle
        let mut records: Vec<_> = (0..BLOCKING_THRESHOLD + 2)
            .map(|i| create_test_record(&format!("Registro Unico {:04}", i), None, None))
            .collect();
        records[100] = create_test_record("Cancha La Esperanza", None, None);
        records[400] = create_test_record("Cancha La Esperansa", None, None);

        let indices: Vec<usize> = (0..records.len()).collect();
        let clusters = create_test_clusterer().cluster(&records, &indices).unwrap();

        let pair = clusters
            .iter()
            .find(|c| c.member_indices.contains(&100))
            .unwrap();
        assert_eq!(pair.member_indices, vec![100, 400]);
    }
}
