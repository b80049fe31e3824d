//! 使われ方の合議
//!
//! 複数レシピのエンリッチ結果から、アレルゲンの代表的な使われ方を決める。

use crate::types::Usage;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// 合議結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    pub usage: String,
    pub count: usize,
}

/// 最頻出の使われ方を選ぶ
///
/// 同数の場合は重大度（central < garnish < trace < none/不明）の小さい方。
/// 入力が空なら `None`。
pub fn pick_consensus<S: AsRef<str>>(labels: &[S]) -> Option<Consensus> {
    // 初出順を保持して数える
    let mut counts: Vec<(String, usize)> = Vec::new();
    for label in labels {
        let label = label.as_ref().trim().to_lowercase();
        if label.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    counts
        .into_iter()
        .min_by_key(|(label, count)| (Reverse(*count), Usage::severity_of(label)))
        .map(|(usage, count)| Consensus { usage, count })
}
