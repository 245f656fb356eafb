use crate::{
    error::Result,
    models::{TaskKey, TaskMetadata, TaskMetadataInput},
    services::TaskMetadataStore,
};
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

pub async fn upsert_task(
    State(tasks): State<Arc<TaskMetadataStore>>,
    Path((campaign_id, task_index)): Path<(u64, u32)>,
    Json(input): Json<TaskMetadataInput>,
) -> Result<Json<TaskMetadata>> {
    let metadata = tasks
        .upsert(TaskKey::new(campaign_id, task_index), input)
        .await?;
    Ok(Json(metadata.as_ref().clone()))
}

pub async fn get_task(
    State(tasks): State<Arc<TaskMetadataStore>>,
    Path((campaign_id, task_index)): Path<(u64, u32)>,
) -> Result<Json<TaskMetadata>> {
    let metadata = tasks.require(TaskKey::new(campaign_id, task_index)).await?;
    Ok(Json(metadata.as_ref().clone()))
}
