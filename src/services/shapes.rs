use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};

use crate::{
    models::{
        event::ChangeEvent,
        shape::{NewShape, Shape, ShapePatch, ShapeRow},
    },
    services::broadcast::ChangeNotifier,
};

/// Storage of shape records. Every method returns only after the write is
/// committed.
#[async_trait]
pub trait ShapeStore: Send + Sync {
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Shape>>;
    async fn get(&self, id: i64) -> anyhow::Result<Option<Shape>>;
    async fn create(&self, new: &NewShape) -> anyhow::Result<Shape>;
    async fn update(&self, id: i64, patch: &ShapePatch) -> anyhow::Result<Option<Shape>>;
    /// `false` if no such record.
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
}

pub struct PgShapeStore {
    pool: PgPool,
}

impl PgShapeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShapeStore for PgShapeStore {
    async fn list(&self) -> anyhow::Result<Vec<Shape>> {
        let rows = sqlx::query_as::<_, ShapeRow>(
            "SELECT * FROM shapes ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Shape::try_from).collect()
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<Shape>> {
        let row = sqlx::query_as::<_, ShapeRow>("SELECT * FROM shapes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Shape::try_from).transpose()
    }

    async fn create(&self, new: &NewShape) -> anyhow::Result<Shape> {
        let row = sqlx::query_as::<_, ShapeRow>(
            "INSERT INTO shapes (name, shape_type, shape_color)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(&new.name)
        .bind(new.shape.to_string())
        .bind(&new.color)
        .fetch_one(&self.pool)
        .await?;
        Shape::try_from(row)
    }

    async fn update(&self, id: i64, patch: &ShapePatch) -> anyhow::Result<Option<Shape>> {
        let row = sqlx::query_as::<_, ShapeRow>(
            "UPDATE shapes
             SET name = COALESCE($1, name),
                 shape_type = COALESCE($2, shape_type),
                 shape_color = COALESCE($3, shape_color),
                 updated_at = NOW()
             WHERE id = $4
             RETURNING *",
        )
        .bind(&patch.name)
        .bind(patch.shape.map(|s| s.to_string()))
        .bind(&patch.color)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Shape::try_from).transpose()
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM shapes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryShapeStore {
    inner: RwLock<MemoryShapes>,
}

#[derive(Default)]
struct MemoryShapes {
    last_id: i64,
    rows: BTreeMap<i64, Shape>,
}

impl MemoryShapeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShapeStore for MemoryShapeStore {
    async fn list(&self) -> anyhow::Result<Vec<Shape>> {
        // Ids grow with creation time, so reverse id order is newest first.
        Ok(self.inner.read().await.rows.values().rev().cloned().collect())
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<Shape>> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn create(&self, new: &NewShape) -> anyhow::Result<Shape> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let now = Utc::now();
        let shape = Shape {
            id: inner.last_id,
            name: new.name.clone(),
            shape: new.shape,
            color: new.color.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(shape.id, shape.clone());
        Ok(shape)
    }

    async fn update(&self, id: i64, patch: &ShapePatch) -> anyhow::Result<Option<Shape>> {
        let mut inner = self.inner.write().await;
        let Some(shape) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            shape.name = name.clone();
        }
        if let Some(kind) = patch.shape {
            shape.shape = kind;
        }
        if let Some(color) = &patch.color {
            shape.color = color.clone();
        }
        shape.updated_at = Utc::now();
        Ok(Some(shape.clone()))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.inner.write().await.rows.remove(&id).is_some())
    }
}

/// The write path for shapes. Each committed mutation produces exactly one
/// [`ChangeEvent`]; a failed write produces none.
pub struct ShapeService {
    store: Arc<dyn ShapeStore>,
    notifier: Arc<dyn ChangeNotifier>,
    /// Held across commit + notify so events leave in commit order.
    writer: Mutex<()>,
}

impl ShapeService {
    pub fn new(store: Arc<dyn ShapeStore>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self {
            store,
            notifier,
            writer: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Shape>> {
        self.store.list().await
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<Shape>> {
        self.store.get(id).await
    }

    pub async fn create(&self, new: NewShape) -> anyhow::Result<Shape> {
        let _guard = self.writer.lock().await;
        let shape = self.store.create(&new).await?;
        tracing::info!("Shape created - ID: {}. Broadcasting", shape.id);
        self.notifier.notify(ChangeEvent::Created { shape: shape.clone() });
        Ok(shape)
    }

    pub async fn update(&self, id: i64, patch: ShapePatch) -> anyhow::Result<Option<Shape>> {
        let _guard = self.writer.lock().await;
        let Some(shape) = self.store.update(id, &patch).await? else {
            return Ok(None);
        };
        tracing::info!("Shape updated - ID: {}. Broadcasting", shape.id);
        self.notifier.notify(ChangeEvent::Updated { shape: shape.clone() });
        Ok(Some(shape))
    }

    pub async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let _guard = self.writer.lock().await;
        if !self.store.delete(id).await? {
            return Ok(false);
        }
        tracing::info!("Shape deleted - ID: {}. Broadcasting", id);
        self.notifier.notify(ChangeEvent::Deleted { shape_id: id });
        Ok(true)
    }
}
