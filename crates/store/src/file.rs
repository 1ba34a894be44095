//! The file-backed [`Store`].
//!
//! Serializes the whole schema as one JSON document with an array per
//! table. Chosen automatically when no database is configured; acceptable
//! for single-process use only — cross-process concurrent use of this
//! backend is not supported.
//!
//! Writes are guarded by a single in-process `tokio::sync::Mutex` and
//! follow a load-modify-save discipline: every mutating call rewrites the
//! whole document to disk before returning.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::contract::{row_matches, project_row, ColumnSet, Row, Store, Table, Where};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default, rename = "Nodes")]
    nodes: Vec<Row>,
    #[serde(default, rename = "Jobs")]
    jobs: Vec<Row>,
    #[serde(default, rename = "Workflows")]
    workflows: Vec<Row>,
    #[serde(default, rename = "Tasks")]
    tasks: Vec<Row>,
    #[serde(default, rename = "TaskExecutions")]
    task_executions: Vec<Row>,
    #[serde(default, rename = "Integrations")]
    integrations: Vec<Row>,
}

impl Document {
    fn table(&self, table: Table) -> &Vec<Row> {
        match table {
            Table::Jobs => &self.jobs,
            Table::Workflows => &self.workflows,
            Table::Tasks => &self.tasks,
            Table::TaskExecutions => &self.task_executions,
            Table::Nodes => &self.nodes,
            Table::Integrations => &self.integrations,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut Vec<Row> {
        match table {
            Table::Jobs => &mut self.jobs,
            Table::Workflows => &mut self.workflows,
            Table::Tasks => &mut self.tasks,
            Table::TaskExecutions => &mut self.task_executions,
            Table::Nodes => &mut self.nodes,
            Table::Integrations => &mut self.integrations,
        }
    }
}

/// A single-document, file-backed `Store` implementation.
pub struct FileStore {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl FileStore {
    /// Open (or lazily create) a file-backed store at `path`. A missing or
    /// empty file starts as an empty document; the file is only written on
    /// the first mutating call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text).unwrap_or_default(),
            _ => Document::default(),
        };
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    async fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        }
        let text = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|source| StoreError::Io { path: self.path.clone(), source })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn insert(&self, table: Table, row: Row) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().await;
        doc.table_mut(table).push(row);
        self.persist(&doc).await
    }

    async fn update(&self, table: Table, where_: &Where, set: &ColumnSet) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().await;
        for row in doc.table_mut(table).iter_mut() {
            if row_matches(row, where_) {
                for (col, value) in set {
                    row.insert(col.clone(), value.clone());
                }
            }
        }
        self.persist(&doc).await
    }

    async fn query(
        &self,
        table: Table,
        where_: &Where,
        projection: Option<&[String]>,
    ) -> Result<Vec<Row>, StoreError> {
        let doc = self.doc.lock().await;
        Ok(doc
            .table(table)
            .iter()
            .filter(|row| row_matches(row, where_))
            .map(|row| project_row(row, projection))
            .collect())
    }

    async fn exists(&self, table: Table, where_: &Where) -> Result<bool, StoreError> {
        let doc = self.doc.lock().await;
        Ok(doc.table(table).iter().any(|row| row_matches(row, where_)))
    }
}
