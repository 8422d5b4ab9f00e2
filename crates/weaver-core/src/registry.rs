//! プロセスレジストリ
//!
//! プロセスID → [`ProcessRecord`] の並行安全なストア。カーネルが知っている状態の
//! 唯一の情報源です。単一の RwLock で保護し、ロックの範囲はマップ操作のみ。
//! ランタイムやビルダーの呼び出しはロック外で行うこと。

use crate::error::{RegistryError, Result};
use crate::model::ProcessRecord;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: RwLock<HashMap<String, ProcessRecord>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// レコードを追加。同じIDが既に存在する場合は `AlreadyExists`
    pub fn insert(&self, record: ProcessRecord) -> Result<()> {
        let mut records = self.write();
        if records.contains_key(record.id()) {
            return Err(RegistryError::AlreadyExists(record.id().to_string()));
        }
        records.insert(record.id().to_string(), record);
        Ok(())
    }

    /// レコードのコピーを取得
    pub fn get(&self, id: &str) -> Result<ProcessRecord> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// 書き込みロック下でレコードを更新し、更新後のコピーを返す
    ///
    /// `mutator` はロックを保持したまま呼ばれるため、短く同期的であること。
    pub fn update<F>(&self, id: &str, mutator: F) -> Result<ProcessRecord>
    where
        F: FnOnce(&mut ProcessRecord),
    {
        let mut records = self.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        mutator(record);
        Ok(record.clone())
    }

    /// 全レコードのスナップショット（順序は保証しない）
    pub fn list(&self) -> Vec<ProcessRecord> {
        self.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Result<ProcessRecord> {
        self.write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // マップ単位の不変条件しか持たないため、ポイズンは無視して続行する
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProcessRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProcessRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
