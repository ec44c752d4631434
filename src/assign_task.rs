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
use crate::models::{
    AssignStatus, AssignedTask, Frequency, LogEntry, Priority, TaskStatus, User,
};
use crate::notify_server::{event, Emit};
use crate::store::with_timeout;
use crate::workflow::{self, AssignAction};

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentRequest {
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
    /// Username of the receiver.
    pub send_to: String,
}

async fn find_user_by_id(data: &web::Data<AppState>, id: &str) -> Result<Option<User>, ApiError> {
    with_timeout(
        data.config.store_timeout,
        data.mongodb.users().find_one(doc! { "_id": id }),
    )
    .await
}

fn sent_filter(user_id: &str) -> Document {
    doc! { "sent_by.user_id": user_id }
}

/// Received view: rejected tasks are intentionally excluded here, while the
/// sender still sees them in the sent view.
fn received_filter(user_id: &str) -> Document {
    doc! {
        "send_to.user_id": user_id,
        "assign_status": { "$ne": AssignStatus::Rejected.as_str() },
    }
}

// GET /assignTask — the caller's sent and received assignments.
pub async fn list_assignments(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let sent = collect(&data, sent_filter(&user_id)).await?;
    let received = collect(&data, received_filter(&user_id)).await?;

    Ok(HttpResponse::Ok().json(json!({ "sent": sent, "received": received })))
}

async fn collect(
    data: &web::Data<AppState>,
    filter: Document,
) -> Result<Vec<AssignedTask>, ApiError> {
    let mut cursor = with_timeout(
        data.config.store_timeout,
        data.mongodb.assigned_tasks().find(filter),
    )
    .await?;
    let mut tasks = Vec::new();
    while let Some(task_res) = cursor.next().await {
        match task_res {
            Ok(task) => tasks.push(task),
            Err(err) => {
                error!("Error iterating assigned tasks: {}", err);
                return Err(ApiError::from(err));
            }
        }
    }
    Ok(tasks)
}

// POST /assignTask — create an assignment. A sender already in the
// receiver's collaborator list skips the handshake and starts assigned.
pub async fn create_assignment(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateAssignmentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let sender = find_user_by_id(&data, &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Sender not found".to_string()))?;
    let receiver = with_timeout(
        data.config.store_timeout,
        data.mongodb.users().find_one(doc! { "username": &payload.send_to }),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Recipient user not found".to_string()))?;

    if receiver.id == sender.id {
        return Err(ApiError::InvalidOperation(
            "Cannot assign task to yourself".to_string(),
        ));
    }

    let (assign_status, log_action) = workflow::initial_status(&receiver, &sender.username);
    let payload = payload.into_inner();
    let now = Utc::now();
    let task = AssignedTask {
        id: Uuid::new_v4().to_string(),
        title: payload.title,
        description: payload.description,
        due_date: payload.due_date,
        due_time: payload.due_time,
        priority: payload.priority,
        status: payload.status,
        frequency: payload.frequency,
        sent_by: sender.to_ref(),
        send_to: receiver.to_ref(),
        assign_status,
        logs: vec![LogEntry::with_target(log_action, &sender.id, &receiver.id)],
        created_at: now,
        updated_at: now,
    };

    with_timeout(
        data.config.store_timeout,
        data.mongodb.assigned_tasks().insert_one(&task),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": format!("Task {} to {}", task.assign_status.as_str(), receiver.username),
        "status": task.assign_status,
        "task": task,
    })))
}

/// Strips identity, endpoints and the append-only trail from an edit patch,
/// and validates an explicit assign_status value if the caller set one.
fn sanitize_patch(mut patch: Document) -> Result<Document, ApiError> {
    patch.remove("_id");
    patch.remove("sent_by");
    patch.remove("send_to");
    patch.remove("logs");
    if let Ok(raw) = patch.get_str("assign_status") {
        serde_json::from_value::<AssignStatus>(json!(raw)).map_err(|_| {
            ApiError::InvalidOperation(format!("'{}' is not a valid assign status", raw))
        })?;
    }
    Ok(patch)
}

// PUT /assignTask/edit/{id} — super-user style edit, valid from any state.
pub async fn edit_assignment(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    patch: web::Json<Document>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let actor = find_user_by_id(&data, &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let mut set_doc = sanitize_patch(patch.into_inner())?;
    let status_override = set_doc.get_str("assign_status").ok().map(String::from);
    set_doc.insert("updated_at", to_bson(&Utc::now())?);
    let entry = LogEntry::new(AssignAction::Edit.log_action(), &user_id);
    let update = doc! { "$set": set_doc, "$push": { "logs": to_bson(&entry)? } };

    let task = with_timeout(
        data.config.store_timeout,
        data.mongodb
            .assigned_tasks()
            .find_one_and_update(AssignAction::Edit.guard_filter(&task_id), update)
            .return_document(ReturnDocument::After),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Assigned task not found".to_string()))?;

    let to = task.counterparty_of(&user_id).to_string();
    data.notify_server.do_send(Emit {
        to: to.clone(),
        event: event::UPDATE_TASK,
        payload: json!({
            "task": &task,
            "doneBy": actor.username,
            "to": to,
            "act": status_override,
        }),
    });

    Ok(HttpResponse::Ok().json(json!({ "message": "Assigned task updated", "task": task })))
}

// DELETE /assignTask/delete/{id} — soft delete, valid from any state.
pub async fn delete_assignment(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    let actor = find_user_by_id(&data, &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let action = AssignAction::Delete;
    let target = action.target().expect("delete always has a target state");
    let entry = LogEntry::new(action.log_action(), &user_id);
    let update = doc! {
        "$set": { "assign_status": target.as_str(), "updated_at": to_bson(&Utc::now())? },
        "$push": { "logs": to_bson(&entry)? },
    };

    let task = with_timeout(
        data.config.store_timeout,
        data.mongodb
            .assigned_tasks()
            .find_one_and_update(action.guard_filter(&task_id), update)
            .return_document(ReturnDocument::After),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Assigned task not found".to_string()))?;

    let to = task.counterparty_of(&user_id).to_string();
    data.notify_server.do_send(Emit {
        to: to.clone(),
        event: event::DELETE_TASK,
        payload: json!({ "deletedTask": &task, "doneBy": actor.username, "to": to }),
    });

    Ok(HttpResponse::Ok().json(json!({ "message": "Assigned task soft-deleted", "task": task })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_patch_cannot_rewire_parties_or_trail() {
        let patch = doc! {
            "_id": "other",
            "sent_by": { "user_id": "x", "username": "x" },
            "send_to": { "user_id": "y", "username": "y" },
            "logs": [],
            "title": "renamed",
            "assign_status": "assigned",
        };
        let clean = sanitize_patch(patch).unwrap();
        assert_eq!(clean, doc! { "title": "renamed", "assign_status": "assigned" });
    }

    #[test]
    fn received_view_excludes_rejected_tasks() {
        assert_eq!(
            received_filter("u-bob"),
            doc! {
                "send_to.user_id": "u-bob",
                "assign_status": { "$ne": "rejected" },
            }
        );
        // The sent view has no status filter; the sender keeps seeing them.
        assert_eq!(sent_filter("u-alice"), doc! { "sent_by.user_id": "u-alice" });
    }

    #[test]
    fn edit_patch_rejects_unknown_status() {
        let patch = doc! { "assign_status": "archived" };
        match sanitize_patch(patch) {
            Err(ApiError::InvalidOperation(_)) => {}
            other => panic!("expected InvalidOperation, got {:?}", other.map(|_| ())),
        }
    }
}
