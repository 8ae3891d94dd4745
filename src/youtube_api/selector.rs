//! 选择算法：在排序后的前 K 个候选中均匀随机抽取一个。
//! 随机数来自操作系统 CSPRNG。

use rand::{Rng, rngs::OsRng};
use std::collections::HashSet;

use crate::dao::api_key::ApiKey;

/// 从候选列表中随机选取一个 key。
///
/// `exclude` 中的 key（本次调用里已经报过配额耗尽的）会被跳过；
/// 如果候选全部被排除，则退回到完整候选列表，让调用方按重试上限收敛。
pub fn pick_candidate<'a>(candidates: &'a [ApiKey], exclude: &HashSet<String>) -> Option<&'a ApiKey> {
    if candidates.is_empty() {
        return None;
    }

    let preferred: Vec<&ApiKey> = candidates
        .iter()
        .filter(|key| !exclude.contains(&key.id))
        .collect();

    if preferred.is_empty() {
        let index = OsRng.gen_range(0..candidates.len());
        return candidates.get(index);
    }

    let index = OsRng.gen_range(0..preferred.len());
    preferred.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> ApiKey {
        let mut key = ApiKey::new("ciphertext".to_string(), None, None);
        key.id = id.to_string();
        key
    }

    #[test]
    fn test_empty_candidates() {
        assert!(pick_candidate(&[], &HashSet::new()).is_none());
    }

    #[test]
    fn test_every_candidate_reachable() {
        let candidates: Vec<ApiKey> = (0..5).map(|i| key(&format!("k{}", i))).collect();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let picked = pick_candidate(&candidates, &HashSet::new()).unwrap();
            seen.insert(picked.id.clone());
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_excluded_candidates_skipped() {
        let candidates = vec![key("a"), key("b"), key("c")];
        let exclude: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        for _ in 0..100 {
            assert_eq!(pick_candidate(&candidates, &exclude).unwrap().id, "c");
        }
    }

    #[test]
    fn test_falls_back_when_all_excluded() {
        let candidates = vec![key("a"), key("b")];
        let exclude: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert!(pick_candidate(&candidates, &exclude).is_some());
    }
}
