use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::StreamExt;
use log::error;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::options::ReturnDocument;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{Frequency, LogAction, LogEntry, PersonalTask, Priority, TaskStatus};
use crate::store::with_timeout;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub frequency: Frequency,
}

/// Matches the owner's tasks whose trail has no `deleted` entry; tasks with
/// no logs field at all count as active.
pub fn active_filter(user_id: &str) -> Document {
    doc! {
        "user_id": user_id,
        "$or": [
            { "logs": { "$not": { "$elemMatch": { "action": LogAction::Deleted.as_str() } } } },
            { "logs": { "$exists": false } },
        ],
    }
}

// POST /task/create
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let payload = payload.into_inner();
    let now = Utc::now();
    let task = PersonalTask {
        id: Uuid::new_v4().to_string(),
        title: payload.title,
        description: payload.description,
        due_date: payload.due_date,
        due_time: payload.due_time,
        priority: payload.priority,
        status: payload.status,
        frequency: payload.frequency,
        user_id: user_id.clone(),
        logs: vec![LogEntry::new(LogAction::Created, &user_id)],
        created_at: now,
        updated_at: now,
    };

    with_timeout(data.config.store_timeout, data.mongodb.tasks().insert_one(&task)).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Task created successfully", "task": task })))
}

async fn collect_tasks(
    data: &web::Data<AppState>,
    filter: Document,
) -> Result<Vec<PersonalTask>, ApiError> {
    let mut cursor = with_timeout(data.config.store_timeout, data.mongodb.tasks().find(filter)).await?;
    let mut tasks = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(err) => {
                error!("Error iterating tasks: {}", err);
                return Err(ApiError::from(err));
            }
        }
    }
    Ok(tasks)
}

// GET /task — active (non-deleted) tasks only.
pub async fn list_active_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };
    let tasks = collect_tasks(&data, active_filter(&user_id)).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

// GET /task/all — everything the user owns, soft-deleted included.
pub async fn list_all_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };
    let tasks = collect_tasks(&data, doc! { "user_id": &user_id }).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// Strips fields a patch may never touch: identity, ownership and the
/// append-only trail.
fn sanitize_patch(mut patch: Document) -> Document {
    patch.remove("_id");
    patch.remove("user_id");
    patch.remove("logs");
    patch
}

// PATCH /task/update/{id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    patch: web::Json<Document>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let mut set_doc = sanitize_patch(patch.into_inner());
    set_doc.insert("updated_at", to_bson(&Utc::now())?);
    let entry = LogEntry::new(LogAction::Updated, &user_id);
    let update = doc! { "$set": set_doc, "$push": { "logs": to_bson(&entry)? } };

    let filter = doc! { "_id": task_id.as_str(), "user_id": &user_id };
    let updated = with_timeout(
        data.config.store_timeout,
        data.mongodb
            .tasks()
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Task updated", "task": updated })))
}

// DELETE /task/delete/{id} — soft delete via a `deleted` log entry.
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let entry = LogEntry::new(LogAction::Deleted, &user_id);
    let update = doc! {
        "$set": { "updated_at": to_bson(&Utc::now())? },
        "$push": { "logs": to_bson(&entry)? },
    };
    let filter = doc! { "_id": task_id.as_str(), "user_id": &user_id };
    let deleted = with_timeout(
        data.config.store_timeout,
        data.mongodb
            .tasks()
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Task soft-deleted", "task": deleted })))
}
