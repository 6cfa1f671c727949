//! Pure file selection over a registry listing.

use std::collections::{BTreeMap, BTreeSet};

use super::quant::{families, MatchStrength};
use super::shard::{order_complete_set, parse_shard, ShardInfo};
use super::types::{DefaultFile, TreeEntry};
use crate::error::DownloadError;
use crate::reference::ModelReference;

/// Regular `.gguf` files, minus multimodal projector weights.
pub fn is_candidate(entry: &TreeEntry) -> bool {
    if !entry.is_file() {
        return false;
    }
    let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".gguf") && !lower.starts_with("mmproj")
}

/// Picks the files for `reference` from `entries`, ordered by shard index.
///
/// With a quant tag the listing is matched by token; without one the
/// registry's `default` variant is used and its absence is `QuantRequired`.
pub fn select(
    reference: &ModelReference,
    entries: &[TreeEntry],
    default: Option<&DefaultFile>,
) -> Result<Vec<TreeEntry>, DownloadError> {
    match (&reference.quant_tag, default) {
        (Some(tag), _) => select_by_tag(reference, tag, entries),
        (None, Some(default)) => select_default(reference, default, entries),
        (None, None) => Err(DownloadError::QuantRequired {
            repo: reference.repo(),
        }),
    }
}

fn select_by_tag(
    reference: &ModelReference,
    tag: &str,
    entries: &[TreeEntry],
) -> Result<Vec<TreeEntry>, DownloadError> {
    let matched: Vec<(&TreeEntry, MatchStrength, BTreeSet<String>)> = entries
        .iter()
        .filter(|e| is_candidate(e))
        .filter_map(|e| families(&e.path, tag).map(|(s, f)| (e, s, f)))
        .collect();
    let Some(top) = matched.iter().map(|(_, s, _)| *s).max() else {
        return Err(DownloadError::QuantNotFound {
            repo: reference.repo(),
            tag: tag.to_string(),
        });
    };
    let matched: Vec<_> = matched.into_iter().filter(|(_, s, _)| *s == top).collect();

    let all_families: BTreeSet<&String> = matched.iter().flat_map(|(_, _, f)| f).collect();
    if all_families.len() > 1 {
        return Err(DownloadError::AmbiguousQuant {
            tag: tag.to_string(),
            candidates: all_families.into_iter().cloned().collect(),
        });
    }

    let mut artifacts = group_artifacts(matched.into_iter().map(|(e, _, _)| e));
    if artifacts.len() > 1 {
        return Err(DownloadError::AmbiguousQuant {
            tag: tag.to_string(),
            candidates: artifacts.into_keys().collect(),
        });
    }
    match artifacts.pop_first() {
        Some((name, members)) => order_artifact(&name, members),
        None => Err(DownloadError::QuantNotFound {
            repo: reference.repo(),
            tag: tag.to_string(),
        }),
    }
}

fn select_default(
    reference: &ModelReference,
    default: &DefaultFile,
    entries: &[TreeEntry],
) -> Result<Vec<TreeEntry>, DownloadError> {
    if let Some(info) = parse_shard(&default.rfilename) {
        let members = entries
            .iter()
            .filter(|e| is_candidate(e))
            .filter(|e| parse_shard(&e.path).is_some_and(|s| s.set_key == info.set_key));
        let mut artifacts = group_artifacts(members);
        let members = artifacts.remove(&info.set_key).unwrap_or_default();
        if members.is_empty() {
            return Err(DownloadError::IncompleteShardSet {
                set: info.set_key,
                expected: info.total,
                found: Vec::new(),
            });
        }
        return order_artifact(&info.set_key, members);
    }

    if let Some(entry) = entries.iter().find(|e| e.is_file() && e.path == default.rfilename) {
        return Ok(vec![entry.clone()]);
    }
    match default.size {
        Some(size) => Ok(vec![TreeEntry {
            kind: "file".to_string(),
            path: default.rfilename.clone(),
            size,
            oid: None,
            lfs: None,
        }]),
        None => Err(DownloadError::Registry {
            url: reference.repo(),
            reason: format!(
                "default file {} is not in the listing and has no size",
                default.rfilename
            ),
        }),
    }
}

/// Groups entries into artifacts: a shard set under its set key, a single
/// file under its own path.
fn group_artifacts<'a>(entries: impl Iterator<Item = &'a TreeEntry>) -> BTreeMap<String, Vec<&'a TreeEntry>> {
    let mut out: BTreeMap<String, Vec<&TreeEntry>> = BTreeMap::new();
    for e in entries {
        let key = parse_shard(&e.path)
            .map(|s| s.set_key)
            .unwrap_or_else(|| e.path.clone());
        out.entry(key).or_default().push(e);
    }
    out
}

fn order_artifact(name: &str, members: Vec<&TreeEntry>) -> Result<Vec<TreeEntry>, DownloadError> {
    let infos: Option<Vec<ShardInfo>> = members.iter().map(|e| parse_shard(&e.path)).collect();
    match infos {
        Some(infos) => {
            let order = order_complete_set(name, &infos)?;
            Ok(order.into_iter().map(|i| members[i].clone()).collect())
        }
        None => Ok(members.into_iter().cloned().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::LfsInfo;

    fn entry(path: &str, size: u64) -> TreeEntry {
        TreeEntry {
            kind: "file".to_string(),
            path: path.to_string(),
            size: 100,
            oid: Some("blob".to_string()),
            lfs: Some(LfsInfo {
                oid: "0".repeat(64),
                size,
            }),
        }
    }

    fn listing() -> Vec<TreeEntry> {
        vec![
            entry("README.md", 1),
            entry("model-Q4_K_M.gguf", 40),
            entry("model-Q4_0.gguf", 38),
            entry("model-IQ4_XS.gguf", 35),
            entry("model-Q8_0.gguf", 80),
            entry("mmproj-model-Q8_0.gguf", 5),
            entry("BF16/model-BF16-00002-of-00002.gguf", 15),
            entry("BF16/model-BF16-00001-of-00002.gguf", 40),
        ]
    }

    fn reference(text: &str) -> ModelReference {
        ModelReference::parse(text).unwrap()
    }

    fn paths(v: &[TreeEntry]) -> Vec<&str> {
        v.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn exact_tag_selects_single_file() {
        let got = select(&reference("acme/m:q8_0"), &listing(), None).unwrap();
        assert_eq!(paths(&got), vec!["model-Q8_0.gguf"]);
    }

    #[test]
    fn shard_set_is_ordered_by_index() {
        let got = select(&reference("acme/m:BF16"), &listing(), None).unwrap();
        assert_eq!(
            paths(&got),
            vec![
                "BF16/model-BF16-00001-of-00002.gguf",
                "BF16/model-BF16-00002-of-00002.gguf"
            ]
        );
    }

    #[test]
    fn prefix_over_several_families_is_ambiguous() {
        match select(&reference("acme/m:Q4"), &listing(), None) {
            Err(DownloadError::AmbiguousQuant { candidates, .. }) => {
                assert_eq!(candidates, vec!["Q4_0", "Q4_K_M"]);
            }
            other => panic!("expected AmbiguousQuant, got {other:?}"),
        }
    }

    #[test]
    fn hyphenated_tag_selects_dynamic_quant() {
        let l = vec![
            entry("GLM-4.7-Flash-UD-Q4_K_XL.gguf", 10),
            entry("GLM-4.7-Flash-Q4_K_M.gguf", 9),
        ];
        let got = select(&reference("unsloth/GLM-4.7-Flash-GGUF:UD-Q4_K_XL"), &l, None).unwrap();
        assert_eq!(paths(&got), vec!["GLM-4.7-Flash-UD-Q4_K_XL.gguf"]);
        let got = select(&reference("unsloth/GLM-4.7-Flash-GGUF:ud-q4"), &l, None).unwrap();
        assert_eq!(paths(&got), vec!["GLM-4.7-Flash-UD-Q4_K_XL.gguf"]);
    }

    #[test]
    fn hyphenated_tag_over_a_sharded_directory() {
        let l = vec![
            entry("UD-Q2_K_XL/GLM-UD-Q2_K_XL-00002-of-00002.gguf", 5),
            entry("UD-Q2_K_XL/GLM-UD-Q2_K_XL-00001-of-00002.gguf", 9),
            entry("UD-Q4_K_XL/GLM-UD-Q4_K_XL-00001-of-00001.gguf", 12),
            entry("GLM-Q2_K.gguf", 4),
        ];
        let got = select(&reference("acme/GLM:UD-Q2_K_XL"), &l, None).unwrap();
        assert_eq!(
            paths(&got),
            vec![
                "UD-Q2_K_XL/GLM-UD-Q2_K_XL-00001-of-00002.gguf",
                "UD-Q2_K_XL/GLM-UD-Q2_K_XL-00002-of-00002.gguf"
            ]
        );
        // The last token still only matches at a `_` boundary.
        assert!(matches!(
            select(&reference("acme/GLM:UD-Q"), &l, None),
            Err(DownloadError::QuantNotFound { .. })
        ));
        let mut l = l;
        l.push(entry("GLM-UD-Q2_K_M.gguf", 6));
        match select(&reference("acme/GLM:UD-Q2"), &l, None) {
            Err(DownloadError::AmbiguousQuant { candidates, .. }) => {
                assert_eq!(candidates, vec!["UD-Q2_K_M", "UD-Q2_K_XL"]);
            }
            other => panic!("expected AmbiguousQuant, got {other:?}"),
        }
    }

    #[test]
    fn two_artifacts_in_one_family_are_ambiguous() {
        let mut l = listing();
        l.push(entry("other-Q8_0.gguf", 81));
        match select(&reference("acme/m:Q8_0"), &l, None) {
            Err(DownloadError::AmbiguousQuant { candidates, .. }) => {
                assert_eq!(candidates, vec!["model-Q8_0.gguf", "other-Q8_0.gguf"]);
            }
            other => panic!("expected AmbiguousQuant, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_and_projectors() {
        assert!(matches!(
            select(&reference("acme/m:Q3_K_S"), &listing(), None),
            Err(DownloadError::QuantNotFound { .. })
        ));
        let only_proj = vec![entry("mmproj-F16.gguf", 1)];
        assert!(matches!(
            select(&reference("acme/m:F16"), &only_proj, None),
            Err(DownloadError::QuantNotFound { .. })
        ));
    }

    #[test]
    fn missing_shard_is_incomplete() {
        let l = vec![
            entry("m-Q4.part-0001-of-0003.gguf", 1),
            entry("m-Q4.part-0003-of-0003.gguf", 1),
        ];
        match select(&reference("acme/m:Q4"), &l, None) {
            Err(DownloadError::IncompleteShardSet {
                set,
                expected,
                found,
            }) => {
                assert_eq!(set, "m-Q4.part-*-of-0003.gguf");
                assert_eq!(expected, 3);
                assert_eq!(found, vec![1, 3]);
            }
            other => panic!("expected IncompleteShardSet, got {other:?}"),
        }
    }

    #[test]
    fn no_tag_uses_default_or_requires_one() {
        assert!(matches!(
            select(&reference("acme/m"), &listing(), None),
            Err(DownloadError::QuantRequired { .. })
        ));
        let d = DefaultFile {
            rfilename: "model-Q4_K_M.gguf".to_string(),
            size: Some(40),
        };
        let got = select(&reference("acme/m"), &listing(), Some(&d)).unwrap();
        assert_eq!(paths(&got), vec!["model-Q4_K_M.gguf"]);

        let sharded = DefaultFile {
            rfilename: "BF16/model-BF16-00001-of-00002.gguf".to_string(),
            size: None,
        };
        let got = select(&reference("acme/m"), &listing(), Some(&sharded)).unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn selection_is_deterministic() {
        let mut reversed = listing();
        reversed.reverse();
        let a = select(&reference("acme/m:BF16"), &listing(), None).unwrap();
        let b = select(&reference("acme/m:BF16"), &reversed, None).unwrap();
        assert_eq!(a, b);
    }
}
