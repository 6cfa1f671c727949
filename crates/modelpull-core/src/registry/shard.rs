//! Shard set detection (`-00001-of-00003`, `part-0001-of-0002`).

use std::collections::BTreeMap;

use crate::error::DownloadError;

/// Position of one file in a shard set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub index: u32,
    pub total: u32,
    /// Path with the index digits replaced by `*`; equal for all members.
    pub set_key: String,
}

/// Parses the last `NNNN-of-MMMM` of the file name in `path`.
pub fn parse_shard(path: &str) -> Option<ShardInfo> {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];
    let bytes = name.as_bytes();
    let (sep, _) = name.rmatch_indices("-of-").find(|(i, _)| {
        *i > 0 && bytes[*i - 1].is_ascii_digit() && bytes.get(*i + 4).is_some_and(u8::is_ascii_digit)
    })?;

    let idx_start = name[..sep]
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let tot_end = name[sep + 4..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| sep + 4 + i)
        .unwrap_or(name.len());

    let index: u32 = name[idx_start..sep].parse().ok()?;
    let total: u32 = name[sep + 4..tot_end].parse().ok()?;
    if total == 0 {
        return None;
    }
    let set_key = format!(
        "{}{}*{}",
        &path[..name_start],
        &name[..idx_start],
        &name[sep..]
    );
    Some(ShardInfo {
        index,
        total,
        set_key,
    })
}

/// Checks that `members` (shard info per file, one set) hold every index
/// `1..=total` exactly once, and returns the member positions ordered by
/// shard index.
pub fn order_complete_set(set_key: &str, members: &[ShardInfo]) -> Result<Vec<usize>, DownloadError> {
    let expected = members.first().map(|m| m.total).unwrap_or(0);
    let mut by_index: BTreeMap<u32, usize> = BTreeMap::new();
    let mut duplicate = false;
    for (pos, m) in members.iter().enumerate() {
        duplicate |= by_index.insert(m.index, pos).is_some();
    }
    let complete = !duplicate
        && by_index.len() as u32 == expected
        && by_index.keys().copied().eq(1..=expected);
    if !complete {
        let mut found: Vec<u32> = members.iter().map(|m| m.index).collect();
        found.sort_unstable();
        return Err(DownloadError::IncompleteShardSet {
            set: set_key.to_string(),
            expected,
            found,
        });
    }
    Ok(by_index.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shard_names() {
        let s = parse_shard("BF16/GLM-4.7-BF16-00001-of-00015.gguf").unwrap();
        assert_eq!((s.index, s.total), (1, 15));
        assert_eq!(s.set_key, "BF16/GLM-4.7-BF16-*-of-00015.gguf");

        let s = parse_shard("model-Q4.part-0002-of-0002.gguf").unwrap();
        assert_eq!((s.index, s.total), (2, 2));
        assert_eq!(s.set_key, "model-Q4.part-*-of-0002.gguf");
    }

    #[test]
    fn single_files_are_not_shards() {
        assert!(parse_shard("model.gguf").is_none());
        assert!(parse_shard("Q4_K_M/model-Q4_K_M.gguf").is_none());
        assert!(parse_shard("state-of-the-art.gguf").is_none());
        assert!(parse_shard("00001-of-00002/model.gguf").is_none());
    }

    fn members(indices: &[u32], total: u32) -> Vec<ShardInfo> {
        indices
            .iter()
            .map(|i| ShardInfo {
                index: *i,
                total,
                set_key: "k".to_string(),
            })
            .collect()
    }

    #[test]
    fn complete_set_is_ordered() {
        let m = members(&[3, 1, 2], 3);
        assert_eq!(order_complete_set("k", &m).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn gaps_and_duplicates_are_incomplete() {
        match order_complete_set("k", &members(&[1, 3], 3)) {
            Err(DownloadError::IncompleteShardSet {
                expected, found, ..
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(found, vec![1, 3]);
            }
            other => panic!("expected IncompleteShardSet, got {other:?}"),
        }
        assert!(order_complete_set("k", &members(&[1, 1], 2)).is_err());
        assert!(order_complete_set("k", &members(&[0, 1], 2)).is_err());
    }
}
