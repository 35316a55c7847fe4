//! LanceDB Vector Store - 영속 밀집 인덱스 저장소
//!
//! 회의록 청크의 임베딩을 디스크에 저장하고 ANN 검색을 제공합니다.
//! 한 테이블은 하나의 임베딩 차원(=하나의 임베딩 모델)만 허용합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::passage::{Passage, PassageMetadata, RetrievalResult};
use super::vector::{VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "passages";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (인덱스 수명 동안 고정)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            dimension: i32::try_from(dimension).context("Embedding dimension too large")?,
        })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("source_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, true),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.embedding.len()
            );
        }

        let source_ids: Vec<&str> = entries
            .iter()
            .map(|e| e.passage.metadata.source_id.as_str())
            .collect();
        let chunk_indices: Vec<i32> = entries
            .iter()
            .map(|e| e.passage.metadata.chunk_index)
            .collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.passage.content.as_str()).collect();
        let titles: Vec<Option<&str>> = entries
            .iter()
            .map(|e| e.passage.metadata.title.as_deref())
            .collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(source_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(titles)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open passages table")
    }
}

/// RecordBatch 행을 Passage로 변환
fn batch_to_passages(batch: &RecordBatch) -> Result<Vec<Passage>> {
    let source_ids = batch
        .column_by_name("source_id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing source_id column"))?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

    let contents = batch
        .column_by_name("content")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing content column"))?;

    let titles = batch
        .column_by_name("title")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing title column"))?;

    Ok((0..batch.num_rows())
        .map(|i| {
            Passage::new(
                contents.value(i),
                PassageMetadata {
                    source_id: source_ids.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    title: (!titles.is_null(i)).then(|| titles.value(i).to_string()),
                },
            )
        })
        .collect())
}

/// 필터 문자열 리터럴 이스케이프
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievalResult>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let stream = self
            .open_table()
            .await?
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut results = Vec::new();

        for batch in batches {
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for (i, passage) in batch_to_passages(&batch)?.into_iter().enumerate() {
                // L2 거리 -> 유사도 (정규화 임베딩에서는 코사인과 순서 동일)
                let similarity = 1.0 / (1.0 + distances.value(i));
                results.push(RetrievalResult::new(passage, similarity));
            }
        }

        Ok(results)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = format!("source_id = {}", quote_literal(source_id));

        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for source")?;

        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    async fn all_passages(&self) -> Result<Vec<Passage>> {
        let total = self.count().await?;
        if total == 0 {
            return Ok(vec![]);
        }

        let stream = self
            .open_table()
            .await?
            .query()
            .limit(total)
            .execute()
            .await
            .context("Failed to scan passages table")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut passages = Vec::with_capacity(total);
        for batch in &batches {
            passages.extend(batch_to_passages(batch)?);
        }

        // 청크 순서 복원 (source 내부는 chunk_index 오름차순)
        passages.sort_by(|a, b| {
            a.metadata
                .source_id
                .cmp(&b.metadata.source_id)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });

        Ok(passages)
    }
}

// ============================================================================
// Tests
// ============================================================================
