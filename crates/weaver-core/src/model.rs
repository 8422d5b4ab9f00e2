//! プロセスモデル
//!
//! カーネルが管理するワークロード（コンテナインスタンス）1つ分の記録と、
//! その状態を表す型を定義します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// レジストリにキャッシュされるプロセス状態
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// 実行中
    Running,
    /// 停止済み
    Stopped,
    /// 異常終了
    Failed,
    /// ランタイムから状態を取得できない
    Unknown,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ステータス照会の結果
///
/// 照会は失敗しない。未登録のIDは `NotFound`、ランタイムに問い合わせられない場合は
/// `Unknown` に縮退する。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusReport {
    Running,
    Stopped,
    Failed,
    Unknown,
    NotFound,
}

impl StatusReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReport::Running => "running",
            StatusReport::Stopped => "stopped",
            StatusReport::Failed => "failed",
            StatusReport::Unknown => "unknown",
            StatusReport::NotFound => "not_found",
        }
    }
}

impl From<ProcessStatus> for StatusReport {
    fn from(status: ProcessStatus) -> Self {
        match status {
            ProcessStatus::Running => StatusReport::Running,
            ProcessStatus::Stopped => StatusReport::Stopped,
            ProcessStatus::Failed => StatusReport::Failed,
            ProcessStatus::Unknown => StatusReport::Unknown,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ProcessRecord - カーネルが把握しているプロセス1件
///
/// `id`・`runtime_handle`・`created_at` は挿入時に確定し、以後変更できない。
/// 変更可能なのは `status` のみで、[`ProcessRecord::set_status`] 経由で行う。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    id: String,
    runtime_handle: String,
    created_at: DateTime<Utc>,
    status: ProcessStatus,
    /// 呼び出し側が指定した名前（一意とは限らない）
    pub name: String,
    /// 言語タグ（検証しない）
    pub language: String,
    /// 公開ポート（一意性は保証しない）
    pub port: i32,
    /// ランタイム上のインスタンス名
    pub instance_name: String,
    /// 起動に使ったイメージタグ
    pub image: String,
}

impl ProcessRecord {
    pub fn new(
        id: impl Into<String>,
        runtime_handle: impl Into<String>,
        name: impl Into<String>,
        language: impl Into<String>,
        port: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            runtime_handle: runtime_handle.into(),
            created_at,
            status: ProcessStatus::Running,
            name: name.into(),
            language: language.into(),
            port,
            instance_name: String::new(),
            image: String::new(),
        }
    }

    pub fn with_instance(mut self, instance_name: impl Into<String>, image: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self.image = image.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn runtime_handle(&self) -> &str {
        &self.runtime_handle
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ProcessStatus) {
        self.status = status;
    }

    /// 一覧表示用のサマリーに射影
    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            process_id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            language: self.language.clone(),
            port: self.port,
            created_at: self.created_at,
        }
    }
}

/// `ListProcesses` が返すサマリー
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSummary {
    pub process_id: String,
    pub name: String,
    pub status: ProcessStatus,
    pub language: String,
    pub port: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProcessRecord {
        ProcessRecord::new(
            "abc123def456",
            "abc123def4567890",
            "svc-a",
            "python",
            8000,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn test_new_record_is_running() {
        let record = record();
        assert_eq!(record.status(), ProcessStatus::Running);
        assert_eq!(record.id(), "abc123def456");
        assert_eq!(record.runtime_handle(), "abc123def4567890");
    }

    #[test]
    fn test_summary_projection() {
        let mut record = record().with_instance("weaver-svc-a-1700000000", "weaver-app-svc-a:latest");
        record.set_status(ProcessStatus::Stopped);

        let summary = record.summary();
        assert_eq!(summary.process_id, "abc123def456");
        assert_eq!(summary.name, "svc-a");
        assert_eq!(summary.status, ProcessStatus::Stopped);
        assert_eq!(summary.language, "python");
        assert_eq!(summary.port, 8000);
        assert_eq!(summary.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ProcessStatus::Failed.to_string(), "failed");
        assert_eq!(StatusReport::NotFound.as_str(), "not_found");
        assert_eq!(StatusReport::from(ProcessStatus::Unknown), StatusReport::Unknown);
        assert_eq!(
            serde_json::to_string(&StatusReport::NotFound).unwrap(),
            "\"not_found\""
        );
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Running).unwrap(),
            "\"running\""
        );
    }
}
