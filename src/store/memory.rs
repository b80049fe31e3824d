use super::{Projection, RecipeStore, RecordUpdate};
use crate::error::{Result, ScoutError};
use allergen_scout_common::RecipeRecord;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// JSONファイル（レコードの配列）を背後に持つインメモリのストア
///
/// 書き込みはメモリ上で行い、`save` でファイルに反映する。
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<RecipeRecord>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(records: Vec<RecipeRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            path: None,
        }
    }

    /// ストアファイルを開く
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScoutError::FileNotFound(path.display().to_string()));
        }
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<RecipeRecord> = serde_json::from_reader(reader)
            .map_err(|e| ScoutError::InvalidCorpus(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), records = records.len(), "ストアを読み込みました");
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path.to_path_buf()),
        })
    }

    /// ストアファイルを開く（無ければ空で作る）
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self {
                records: RwLock::new(Vec::new()),
                path: Some(path.to_path_buf()),
            })
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 開いたファイルに書き戻す
    pub async fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| ScoutError::Store("保存先のファイルがありません".into()))?;
        self.save_to(path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let records = self.records.read().await;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &*records)?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<RecipeRecord> {
        self.records.read().await.clone()
    }

    /// レコードを追加する。同じidがあれば置き換える
    ///
    /// # Returns
    /// (追加件数, 置換件数)
    pub async fn insert_many(&self, incoming: Vec<RecipeRecord>) -> (usize, usize) {
        let mut records = self.records.write().await;
        let mut index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        let (mut inserted, mut replaced) = (0, 0);
        for record in incoming {
            match index.get(&record.id) {
                Some(&i) => {
                    records[i] = record;
                    replaced += 1;
                }
                None => {
                    index.insert(record.id.clone(), records.len());
                    records.push(record);
                    inserted += 1;
                }
            }
        }
        (inserted, replaced)
    }

    /// (全件, 完了, うちエラー)
    pub async fn progress(&self) -> (usize, usize, usize) {
        let records = self.records.read().await;
        let complete = records.iter().filter(|r| r.enrichment_complete).count();
        let errored = records.iter().filter(|r| r.analysis_error.is_some()).count();
        (records.len(), complete, errored)
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn query(&self, title_pattern: &str, projection: Projection) -> Result<Vec<RecipeRecord>> {
        let pattern = title_pattern.trim().to_lowercase();
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.title.to_lowercase().contains(&pattern))
            .map(|r| projection.apply(r.clone()))
            .collect())
    }

    async fn find_unprocessed(
        &self,
        page_size: usize,
        skip: &HashSet<String>,
    ) -> Result<Vec<RecipeRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| !r.enrichment_complete && !skip.contains(&r.id))
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn bulk_update(&self, updates: Vec<RecordUpdate>) -> Result<usize> {
        let mut records = self.records.write().await;
        let index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        let mut updated = 0;
        for update in updates {
            match index.get(&update.id) {
                Some(&i) => {
                    update.fields.apply_to(&mut records[i]);
                    updated += 1;
                }
                None => tracing::warn!(id = %update.id, "更新対象のレコードがありません"),
            }
        }
        tracing::debug!(updated, "一括更新");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UpdateFields;
    use tempfile::tempdir;

    fn record(id: &str, title: &str) -> RecipeRecord {
        RecipeRecord::new(id, title, vec!["salt".into()])
    }

    #[tokio::test]
    async fn test_query_is_case_insensitive_substring() {
        let store = MemoryStore::new(vec![
            record("1", "Chicken Parmesan"),
            record("2", "Eggplant PARMESAN"),
            record("3", "Beef Stew"),
        ]);
        let found = store.query("parmesan", Projection::Full).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_find_unprocessed_pages() {
        let mut records: Vec<RecipeRecord> = (0..5).map(|i| record(&i.to_string(), "x")).collect();
        records[1].enrichment_complete = true;
        let store = MemoryStore::new(records);

        let page = store.find_unprocessed(3, &HashSet::new()).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "2", "3"]);

        let skip: HashSet<String> = ["0".to_string(), "3".to_string()].into();
        let page = store.find_unprocessed(3, &skip).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4"]);
    }

    #[tokio::test]
    async fn test_bulk_update_ignores_unknown_ids() {
        let store = MemoryStore::new(vec![record("1", "Toast")]);
        let updated = store
            .bulk_update(vec![
                RecordUpdate::new("1", UpdateFields::errored("x")),
                RecordUpdate::new("missing", UpdateFields::errored("x")),
            ])
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.progress().await, (1, 1, 1));
    }

    #[tokio::test]
    async fn test_insert_many_replaces_same_id() {
        let store = MemoryStore::new(vec![record("1", "Old")]);
        let (inserted, replaced) = store
            .insert_many(vec![record("1", "New"), record("2", "Other")])
            .await;
        assert_eq!((inserted, replaced), (1, 1));
        assert_eq!(store.snapshot().await[0].title, "New");
    }

    #[tokio::test]
    async fn test_save_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.json");

        let store = MemoryStore::open_or_create(&path).unwrap();
        assert!(store.is_empty().await);
        store.insert_many(vec![record("1", "Toast")]).await;
        store.save().await.unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.len().await, 1);
    }

    #[test]
    fn test_open_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(matches!(MemoryStore::open(&path), Err(ScoutError::InvalidCorpus(_))));
    }
}
