//! MongoDB implementation of the orchestration store traits

use crate::adapters::database::traits::{ExportStore, ProfileStore, TaskStore};
use crate::adapters::mongodb::client::{is_duplicate_key, MongoClient};
use crate::adapters::mongodb::filter::{
    export_filter, export_key, export_status_update, task_filter, task_update,
};
use crate::adapters::mongodb::models::{from_bson_date, ExportDocument, TaskDocument};
use crate::domain::export::Export;
use crate::domain::ids::{ExportKey, TaskKey, WorkerName};
use crate::domain::profile::{SourceProfile, TargetProfile};
use crate::domain::query::{ExportFilter, TaskFilter, TaskUpdate};
use crate::domain::status::Status;
use crate::domain::task::ExportTask;
use crate::domain::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReplaceOptions, ReturnDocument,
};
use mongodb::Collection;
use std::sync::Arc;

fn query_failed(e: mongodb::error::Error) -> crate::domain::TidewaterError {
    StoreError::QueryFailed(e.to_string()).into()
}

fn write_failed(e: mongodb::error::Error) -> crate::domain::TidewaterError {
    StoreError::WriteFailed(e.to_string()).into()
}

fn oldest_first() -> Document {
    doc! { "created_at": 1, "_id": 1 }
}

pub struct MongoStore {
    client: Arc<MongoClient>,
}

impl MongoStore {
    pub fn new(client: Arc<MongoClient>) -> Self {
        Self { client }
    }

    fn exports(&self) -> Collection<ExportDocument> {
        self.client
            .collection(&self.client.config().exports_collection)
    }

    fn tasks(&self) -> Collection<TaskDocument> {
        self.client.collection(&self.client.config().tasks_collection)
    }

    fn sources(&self) -> Collection<SourceProfile> {
        self.client
            .collection(&self.client.config().sources_collection)
    }

    fn targets(&self) -> Collection<TargetProfile> {
        self.client
            .collection(&self.client.config().targets_collection)
    }

    async fn find_active_export(&self, key: &ExportKey) -> Result<Option<Export>> {
        let filter = export_filter(&ExportFilter::active_triple(key));
        self.exports()
            .find_one(filter, None)
            .await
            .map_err(query_failed)?
            .map(Export::try_from)
            .transpose()
    }

    async fn find_active_task(&self, key: &TaskKey) -> Result<Option<ExportTask>> {
        let filter = task_filter(&TaskFilter::active_collection(key));
        self.tasks()
            .find_one(filter, None)
            .await
            .map_err(query_failed)?
            .map(ExportTask::try_from)
            .transpose()
    }
}

/// Upsert that only inserts when `guard` matches nothing
///
/// Returns the document that matched the guard, if any.
async fn insert_unless<T>(
    collection: &Collection<T>,
    guard: Document,
    record: Document,
) -> std::result::Result<Option<T>, mongodb::error::Error>
where
    T: serde::de::DeserializeOwned + Send + Sync + Unpin,
{
    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::Before)
        .build();
    collection
        .find_one_and_update(guard, doc! { "$setOnInsert": record }, options)
        .await
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<Document> {
    bson::to_document(value).map_err(|e| StoreError::InvalidDocument(e.to_string()).into())
}

#[async_trait]
impl ExportStore for MongoStore {
    async fn insert_export(&self, export: &Export) -> Result<Option<Export>> {
        let guard = export_filter(&ExportFilter::active_triple(&export.key));
        let record = to_document(&ExportDocument::from(export))?;
        match insert_unless(&self.exports(), guard, record).await {
            Ok(existing) => existing.map(Export::try_from).transpose(),
            Err(e) if is_duplicate_key(&e) => match self.find_active_export(&export.key).await? {
                Some(active) => Ok(Some(active)),
                None => Err(StoreError::WriteFailed(format!(
                    "transaction {} already exists",
                    export.key.transaction
                ))
                .into()),
            },
            Err(e) => Err(write_failed(e)),
        }
    }

    async fn find_export(&self, key: &ExportKey) -> Result<Option<Export>> {
        self.exports()
            .find_one(export_key(key), None)
            .await
            .map_err(query_failed)?
            .map(Export::try_from)
            .transpose()
    }

    async fn list_exports(&self, filter: &ExportFilter) -> Result<Vec<Export>> {
        let options = FindOptions::builder().sort(oldest_first()).build();
        let docs: Vec<ExportDocument> = self
            .exports()
            .find(export_filter(filter), options)
            .await
            .map_err(query_failed)?
            .try_collect()
            .await
            .map_err(query_failed)?;
        docs.into_iter().map(Export::try_from).collect()
    }

    async fn update_export_status(
        &self,
        key: &ExportKey,
        expected: Status,
        next: Status,
    ) -> Result<Option<Export>> {
        let mut filter = export_key(key);
        filter.insert("status", expected.as_str());
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        match self
            .exports()
            .find_one_and_update(filter, export_status_update(next, Utc::now()), options)
            .await
        {
            Ok(updated) => updated.map(Export::try_from).transpose(),
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!(export = %key, "Status swap blocked by an active export");
                Ok(None)
            }
            Err(e) => Err(write_failed(e)),
        }
    }

    async fn delete_export(&self, key: &ExportKey) -> Result<u64> {
        let result = self
            .exports()
            .delete_many(export_key(key), None)
            .await
            .map_err(write_failed)?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl TaskStore for MongoStore {
    async fn insert_task(&self, task: &ExportTask) -> Result<Option<ExportTask>> {
        let guard = task_filter(&TaskFilter::active_collection(&task.key));
        let record = to_document(&TaskDocument::from(task))?;
        match insert_unless(&self.tasks(), guard, record).await {
            Ok(existing) => existing.map(ExportTask::try_from).transpose(),
            Err(e) if is_duplicate_key(&e) => match self.find_active_task(&task.key).await? {
                Some(active) => Ok(Some(active)),
                None => {
                    Err(StoreError::WriteFailed(format!("task {} already exists", task.key)).into())
                }
            },
            Err(e) => Err(write_failed(e)),
        }
    }

    async fn find_task(&self, key: &TaskKey) -> Result<Option<ExportTask>> {
        self.tasks()
            .find_one(task_filter(&TaskFilter::for_task(key)), None)
            .await
            .map_err(query_failed)?
            .map(ExportTask::try_from)
            .transpose()
    }

    async fn first_task(&self, filter: &TaskFilter) -> Result<Option<ExportTask>> {
        let options = FindOneOptions::builder().sort(oldest_first()).build();
        self.tasks()
            .find_one(task_filter(filter), options)
            .await
            .map_err(query_failed)?
            .map(ExportTask::try_from)
            .transpose()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<ExportTask>> {
        let options = FindOptions::builder().sort(oldest_first()).build();
        let docs: Vec<TaskDocument> = self
            .tasks()
            .find(task_filter(filter), options)
            .await
            .map_err(query_failed)?
            .try_collect()
            .await
            .map_err(query_failed)?;
        docs.into_iter().map(ExportTask::try_from).collect()
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        self.tasks()
            .count_documents(task_filter(filter), None)
            .await
            .map_err(query_failed)
    }

    async fn find_and_update_task(
        &self,
        filter: &TaskFilter,
        update: &TaskUpdate,
    ) -> Result<Option<ExportTask>> {
        let options = FindOneAndUpdateOptions::builder()
            .sort(oldest_first())
            .return_document(ReturnDocument::After)
            .build();
        match self
            .tasks()
            .find_one_and_update(task_filter(filter), task_update(update, Utc::now()), options)
            .await
        {
            Ok(updated) => updated.map(ExportTask::try_from).transpose(),
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!("Task swap blocked by an active task");
                Ok(None)
            }
            Err(e) => Err(write_failed(e)),
        }
    }

    async fn update_tasks(&self, filter: &TaskFilter, update: &TaskUpdate) -> Result<u64> {
        let result = self
            .tasks()
            .update_many(task_filter(filter), task_update(update, Utc::now()), None)
            .await
            .map_err(write_failed)?;
        Ok(result.modified_count)
    }

    async fn delete_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let result = self
            .tasks()
            .delete_many(task_filter(filter), None)
            .await
            .map_err(write_failed)?;
        Ok(result.deleted_count)
    }

    async fn busy_workers(&self) -> Result<Vec<WorkerName>> {
        let filter = doc! { "active": true, "worker": { "$type": "string" } };
        let names = self
            .tasks()
            .distinct("worker", filter, None)
            .await
            .map_err(query_failed)?;
        let mut workers: Vec<WorkerName> = names
            .into_iter()
            .filter_map(|b| b.as_str().and_then(|s| WorkerName::new(s).ok()))
            .collect();
        workers.sort();
        Ok(workers)
    }

    async fn last_terminated_window_end(&self, key: &TaskKey) -> Result<Option<DateTime<Utc>>> {
        let export = &key.export;
        let pipeline = vec![
            doc! { "$match": {
                "source": &export.source,
                "target": &export.target,
                "database": &export.database,
                "collection": &key.collection,
                "status": Status::Terminated.as_str(),
                "window.end": { "$type": "date" },
            }},
            doc! { "$group": { "_id": Bson::Null, "end": { "$max": "$window.end" } } },
        ];
        let mut cursor = self
            .tasks()
            .clone_with_type::<Document>()
            .aggregate(pipeline, None)
            .await
            .map_err(query_failed)?;
        let Some(group) = cursor.try_next().await.map_err(query_failed)? else {
            return Ok(None);
        };
        Ok(group.get_datetime("end").ok().copied().map(from_bson_date))
    }
}

#[async_trait]
impl ProfileStore for MongoStore {
    async fn find_source(&self, name: &str) -> Result<Option<SourceProfile>> {
        self.sources()
            .find_one(doc! { "name": name }, None)
            .await
            .map_err(query_failed)
    }

    async fn save_source(&self, profile: &SourceProfile) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.sources()
            .replace_one(doc! { "name": &profile.name }, profile, options)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<SourceProfile>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        self.sources()
            .find(None, options)
            .await
            .map_err(query_failed)?
            .try_collect()
            .await
            .map_err(query_failed)
    }

    async fn find_target(&self, name: &str) -> Result<Option<TargetProfile>> {
        self.targets()
            .find_one(doc! { "name": name }, None)
            .await
            .map_err(query_failed)
    }

    async fn save_target(&self, profile: &TargetProfile) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.targets()
            .replace_one(doc! { "name": &profile.name }, profile, options)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<TargetProfile>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        self.targets()
            .find(None, options)
            .await
            .map_err(query_failed)?
            .try_collect()
            .await
            .map_err(query_failed)
    }
}
