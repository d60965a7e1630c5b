//! Translation of store-agnostic queries into MongoDB documents

use crate::adapters::mongodb::models::{to_bson_date, WindowDocument};
use crate::core::stamp::StampPlan;
use crate::domain::ids::ExportKey;
use crate::domain::query::{ExportFilter, TaskFilter, TaskUpdate, WorkerMatch};
use crate::domain::status::Status;
use crate::domain::task::Window;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};

fn statuses(statuses: &[Status]) -> Bson {
    let values: Vec<Bson> = statuses.iter().map(|s| Bson::from(s.as_str())).collect();
    Bson::Document(doc! { "$in": values })
}

fn put_opt(filter: &mut Document, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        filter.insert(field, value);
    }
}

pub fn export_key(key: &ExportKey) -> Document {
    doc! {
        "transaction": key.transaction.as_str(),
        "source": &key.source,
        "target": &key.target,
        "database": &key.database,
    }
}

pub fn export_filter(filter: &ExportFilter) -> Document {
    let mut doc = Document::new();
    put_opt(&mut doc, "transaction", filter.transaction.as_ref().map(|t| t.as_str()));
    put_opt(&mut doc, "source", filter.source.as_deref());
    put_opt(&mut doc, "target", filter.target.as_deref());
    put_opt(&mut doc, "database", filter.database.as_deref());
    if !filter.statuses.is_empty() {
        doc.insert("status", statuses(&filter.statuses));
    }
    doc
}

pub fn task_filter(filter: &TaskFilter) -> Document {
    let mut doc = Document::new();
    put_opt(&mut doc, "transaction", filter.transaction.as_ref().map(|t| t.as_str()));
    put_opt(&mut doc, "source", filter.source.as_deref());
    put_opt(&mut doc, "target", filter.target.as_deref());
    put_opt(&mut doc, "database", filter.database.as_deref());
    put_opt(&mut doc, "collection", filter.collection.as_deref());
    if !filter.statuses.is_empty() {
        doc.insert("status", statuses(&filter.statuses));
    }
    match &filter.worker {
        WorkerMatch::Any => {}
        WorkerMatch::Unassigned => {
            doc.insert("worker", Bson::Null);
        }
        WorkerMatch::Assigned(name) => {
            doc.insert("worker", name.as_str());
        }
    }
    doc
}

/// `$set` document of a status change on an export
pub fn export_status_update(next: Status, now: DateTime<Utc>) -> Document {
    doc! {
        "$set": {
            "status": next.as_str(),
            "active": next.is_active(),
            "updated_at": to_bson_date(now),
        }
    }
}

pub fn task_update(update: &TaskUpdate, now: DateTime<Utc>) -> Document {
    let mut set = doc! { "updated_at": to_bson_date(now) };
    if let Some(status) = update.status {
        set.insert("status", status.as_str());
        set.insert("active", status.is_active());
    }
    if let Some(worker) = &update.worker {
        set.insert(
            "worker",
            worker.as_ref().map_or(Bson::Null, |w| Bson::from(w.as_str())),
        );
    }
    if let Some(error) = &update.error {
        set.insert(
            "error",
            error.as_ref().map_or(Bson::Null, |e| Bson::from(e.as_str())),
        );
    }
    if let Some(count) = update.count {
        set.insert("count", i64::try_from(count).unwrap_or(i64::MAX));
    }
    if let Some(window) = update.window {
        let window = WindowDocument::from(window);
        set.insert("window", doc! { "begin": window.begin, "end": window.end });
    }
    doc! { "$set": set }
}

/// `$expr` selecting documents whose effective stamp lies in `(begin, end]`
///
/// The stamp is the first non-null candidate field, then `_id`, converted to
/// a date; values that do not convert become null and never match.
pub fn window_filter(plan: &StampPlan, window: &Window) -> Document {
    let chosen = plan
        .fields()
        .iter()
        .rev()
        .fold(Bson::from("$_id"), |fallback, field| {
            Bson::Document(doc! { "$ifNull": [format!("${field}"), fallback] })
        });
    let stamp = doc! {
        "$convert": {
            "input": chosen,
            "to": "date",
            "onError": Bson::Null,
            "onNull": Bson::Null,
        }
    };
    doc! {
        "$expr": {
            "$and": [
                { "$gt": [stamp.clone(), to_bson_date(window.begin)] },
                { "$lte": [stamp, to_bson_date(window.end)] },
            ]
        }
    }
}
