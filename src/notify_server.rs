use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use chrono::Utc;
use log::{info, warn};
use mongodb::bson::{doc, to_bson};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{AssignedTask, LogEntry, User};
use crate::store::{with_timeout, MongoDB};
use crate::workflow::AssignAction;

/// Wire event names. Literal strings are the contract with the frontend.
pub mod event {
    pub const NEW_USER_JOINED: &str = "new_user_joined";
    pub const TASK_REQUEST_SUCCESS: &str = "taskRequestSuccess";
    pub const TASK_REQUEST_REJECT: &str = "taskRequestReject";
    pub const UPDATE_TASK: &str = "Update-task";
    pub const DELETE_TASK: &str = "Delete-task";
    pub const TASK_ASSIGN: &str = "task-assign";
    pub const ERROR: &str = "error";
}

/// A named event pushed down one websocket connection.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct RoomMessage {
    pub event: &'static str,
    pub payload: Value,
}

/// Associates a connection with the room keyed by its username. Idempotent;
/// multiple connections (devices) may join the same room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub username: String,
    pub addr: Recipient<RoomMessage>,
}

/// Removes one connection from its room, dropping the room when empty, so
/// stale memberships never outlive the socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub username: String,
    pub addr: Recipient<RoomMessage>,
}

/// Best-effort, at-most-once delivery to every connection in `to`'s room.
/// Dropped silently when nobody is joined.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Emit {
    pub to: String,
    pub event: &'static str,
    pub payload: Value,
}

/// Delivery to every connected session regardless of room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct BroadcastAll {
    pub event: &'static str,
    pub payload: Value,
}

/// The only resolutions a counterparty can send over the socket channel.
/// A separate type from `AssignAction` so edit/delete can never arrive
/// through this path dressed up as a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn action(self) -> AssignAction {
        match self {
            Decision::Accept => AssignAction::Accept,
            Decision::Reject => AssignAction::Reject,
        }
    }
}

/// An accept or reject decision arriving over the socket channel, carrying
/// `{id, from, to}` usernames. Failures go back to `requester` as an
/// `error` event.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ResolveRequest {
    pub decision: Decision,
    pub task_id: String,
    pub from: String,
    pub to: String,
    pub requester: Recipient<RoomMessage>,
}

type Rooms = HashMap<String, Vec<Recipient<RoomMessage>>>;

/// Registry actor owning the connection-to-username room map and executing
/// socket-borne transitions against the store.
pub struct NotifyServer {
    rooms: Rooms,
    db: Arc<MongoDB>,
    store_timeout: Duration,
}

impl NotifyServer {
    pub fn new(db: Arc<MongoDB>, store_timeout: Duration) -> Self {
        NotifyServer {
            rooms: HashMap::new(),
            db,
            store_timeout,
        }
    }
}

fn deliver(rooms: &Rooms, to: &str, event: &'static str, payload: &Value) {
    if let Some(addrs) = rooms.get(to) {
        for addr in addrs {
            addr.do_send(RoomMessage {
                event,
                payload: payload.clone(),
            });
        }
    }
}

fn broadcast(rooms: &Rooms, event: &'static str, payload: &Value) {
    for addrs in rooms.values() {
        for addr in addrs {
            addr.do_send(RoomMessage {
                event,
                payload: payload.clone(),
            });
        }
    }
}

impl Actor for NotifyServer {
    type Context = Context<Self>;
}

impl Handler<Join> for NotifyServer {
    type Result = ();

    fn handle(&mut self, msg: Join, _: &mut Context<Self>) {
        info!("User {} joined their room (WS)", msg.username);
        let addrs = self.rooms.entry(msg.username.clone()).or_default();
        if !addrs.contains(&msg.addr) {
            addrs.push(msg.addr);
        }
        let payload = json!({ "username": msg.username });
        broadcast(&self.rooms, event::NEW_USER_JOINED, &payload);
    }
}

impl Handler<Disconnect> for NotifyServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.username);
        if let Some(addrs) = self.rooms.get_mut(&msg.username) {
            addrs.retain(|a| a != &msg.addr);
            if addrs.is_empty() {
                self.rooms.remove(&msg.username);
            }
        }
    }
}

impl Handler<Emit> for NotifyServer {
    type Result = ();

    fn handle(&mut self, msg: Emit, _: &mut Context<Self>) {
        deliver(&self.rooms, &msg.to, msg.event, &msg.payload);
    }
}

impl Handler<BroadcastAll> for NotifyServer {
    type Result = ();

    fn handle(&mut self, msg: BroadcastAll, _: &mut Context<Self>) {
        broadcast(&self.rooms, msg.event, &msg.payload);
    }
}

impl Handler<ResolveRequest> for NotifyServer {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, msg: ResolveRequest, ctx: &mut Context<Self>) -> Self::Result {
        let addr = ctx.address();
        let db = self.db.clone();
        let limit = self.store_timeout;
        Box::pin(async move {
            match resolve_transition(&db, limit, msg.decision, &msg.task_id, &msg.from, &msg.to)
                .await
            {
                Ok(task) => {
                    let (event_name, accepted, verb) = match msg.decision {
                        Decision::Accept => (event::TASK_REQUEST_SUCCESS, true, "accepted"),
                        Decision::Reject => (event::TASK_REQUEST_REJECT, false, "rejected"),
                    };
                    // The write is durable at this point; route the single
                    // delivery attempt back through the actor so it sees
                    // room membership as of emit time, not as of receipt.
                    addr.do_send(Emit {
                        to: msg.from,
                        event: event_name,
                        payload: json!({
                            "accepted": accepted,
                            "message": format!("{} {} your task request", msg.to, verb),
                            "task": task,
                        }),
                    });
                }
                Err(err) => {
                    warn!(
                        "socket {:?} on task {} failed: {}",
                        msg.decision, msg.task_id, err
                    );
                    msg.requester.do_send(RoomMessage {
                        event: event::ERROR,
                        payload: json!({ "kind": err.kind(), "message": err.to_string() }),
                    });
                }
            }
        })
    }
}

/// Applies an accept/reject transition. The status change and log append
/// land in one conditional update keyed on the guarded source state, so a
/// concurrent resolution makes this one fail with InvalidState instead of
/// silently overwriting it.
async fn resolve_transition(
    db: &MongoDB,
    limit: Duration,
    decision: Decision,
    task_id: &str,
    from: &str,
    to: &str,
) -> Result<AssignedTask, ApiError> {
    let action = decision.action();
    let tasks = db.assigned_tasks();
    let users = db.users();

    let mut task = with_timeout(limit, tasks.find_one(doc! { "_id": task_id }))
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    action.check(task.assign_status)?;

    let sender = with_timeout(limit, users.find_one(doc! { "username": from }))
        .await?
        .ok_or_else(|| ApiError::NotFound("Sender not found".to_string()))?;
    let receiver = with_timeout(limit, users.find_one(doc! { "username": to }))
        .await?
        .ok_or_else(|| ApiError::NotFound("Receiver not found".to_string()))?;

    let new_status = action
        .target()
        .expect("accept/reject always have a target state");
    let entry = LogEntry::new(action.log_action(), &receiver.id);
    let now = Utc::now();
    let update = doc! {
        "$set": { "assign_status": new_status.as_str(), "updated_at": to_bson(&now)? },
        "$push": { "logs": to_bson(&entry)? },
    };
    let result = with_timeout(limit, tasks.update_one(action.guard_filter(task_id), update)).await?;
    if result.matched_count == 0 {
        // Lost the race: the task moved out of `requested` between the read
        // and the conditional write.
        return Err(ApiError::InvalidState(format!(
            "task is no longer in a state that allows {:?}",
            action
        )));
    }

    if decision == Decision::Accept {
        record_collaborator(db, limit, &sender, &receiver).await;
    }

    task.assign_status = new_status;
    task.logs.push(entry);
    task.updated_at = now;
    Ok(task)
}

/// One-directional graph edge: the receiver's username goes into the
/// sender's collaborator set. `$addToSet` makes retries and concurrent
/// accepts idempotent at the store. Runs after the status change has
/// durably landed, so a failed graph write is logged and must not turn the
/// accepted transition into an error; the next accept repairs the edge.
async fn record_collaborator(db: &MongoDB, limit: Duration, sender: &User, receiver: &User) {
    let filter = doc! { "_id": &sender.id };
    let update = doc! { "$addToSet": { "collaborators": &receiver.username } };
    if let Err(err) = with_timeout(limit, db.users().update_one(filter, update)).await {
        warn!(
            "collaborator add {} -> {} after accept failed: {}",
            receiver.username, sender.username, err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every RoomMessage it receives, standing in for a websocket
    /// session.
    #[derive(Default)]
    struct Collector {
        received: Vec<RoomMessage>,
    }

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<RoomMessage> for Collector {
        type Result = ();

        fn handle(&mut self, msg: RoomMessage, _: &mut Context<Self>) {
            self.received.push(msg);
        }
    }

    #[derive(Message)]
    #[rtype(result = "Vec<RoomMessage>")]
    struct Drain;

    impl Handler<Drain> for Collector {
        type Result = MessageResult<Drain>;

        fn handle(&mut self, _: Drain, _: &mut Context<Self>) -> Self::Result {
            MessageResult(std::mem::take(&mut self.received))
        }
    }

    // The mongodb client is lazy; no connection is made unless a query
    // runs, so room-routing tests can use a throwaway URI.
    async fn test_db() -> Arc<MongoDB> {
        Arc::new(MongoDB::init("mongodb://localhost:27017", "taskmate_test").await)
    }

    async fn server() -> Addr<NotifyServer> {
        NotifyServer::new(test_db().await, Duration::from_secs(1)).start()
    }

    fn user(username: &str) -> User {
        User {
            id: format!("u-{}", username),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "hash".to_string(),
            collaborators: vec![],
        }
    }

    #[actix_web::test]
    async fn emit_reaches_only_the_addressed_room() {
        let srv = server().await;
        let alice = Collector::default().start();
        let carol = Collector::default().start();

        srv.send(Join {
            username: "alice".into(),
            addr: alice.clone().recipient(),
        })
        .await
        .unwrap();
        srv.send(Join {
            username: "carol".into(),
            addr: carol.clone().recipient(),
        })
        .await
        .unwrap();
        // Clear the join broadcasts before the targeted emit.
        alice.send(Drain).await.unwrap();
        carol.send(Drain).await.unwrap();

        srv.send(Emit {
            to: "alice".into(),
            event: event::TASK_REQUEST_SUCCESS,
            payload: json!({ "accepted": true }),
        })
        .await
        .unwrap();

        let got = alice.send(Drain).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].event, event::TASK_REQUEST_SUCCESS);
        assert_eq!(got[0].payload, json!({ "accepted": true }));
        assert!(carol.send(Drain).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn emit_to_empty_room_is_dropped() {
        let srv = server().await;
        // No one joined; nothing to assert beyond the send not failing.
        srv.send(Emit {
            to: "ghost".into(),
            event: event::UPDATE_TASK,
            payload: json!({}),
        })
        .await
        .unwrap();
    }

    #[actix_web::test]
    async fn multiple_devices_share_one_room() {
        let srv = server().await;
        let phone = Collector::default().start();
        let laptop = Collector::default().start();
        for addr in [phone.clone(), laptop.clone()] {
            srv.send(Join {
                username: "bob".into(),
                addr: addr.recipient(),
            })
            .await
            .unwrap();
        }
        phone.send(Drain).await.unwrap();
        laptop.send(Drain).await.unwrap();

        srv.send(Emit {
            to: "bob".into(),
            event: event::DELETE_TASK,
            payload: json!({ "id": "t1" }),
        })
        .await
        .unwrap();

        assert_eq!(phone.send(Drain).await.unwrap().len(), 1);
        assert_eq!(laptop.send(Drain).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn join_broadcasts_presence_to_everyone() {
        let srv = server().await;
        let alice = Collector::default().start();
        srv.send(Join {
            username: "alice".into(),
            addr: alice.clone().recipient(),
        })
        .await
        .unwrap();
        alice.send(Drain).await.unwrap();

        let bob = Collector::default().start();
        srv.send(Join {
            username: "bob".into(),
            addr: bob.clone().recipient(),
        })
        .await
        .unwrap();

        let got = alice.send(Drain).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].event, event::NEW_USER_JOINED);
        assert_eq!(got[0].payload, json!({ "username": "bob" }));
    }

    #[actix_web::test]
    async fn broadcast_all_reaches_every_connection() {
        let srv = server().await;
        let alice = Collector::default().start();
        let bob = Collector::default().start();
        for (name, addr) in [("alice", alice.clone()), ("bob", bob.clone())] {
            srv.send(Join {
                username: name.into(),
                addr: addr.recipient(),
            })
            .await
            .unwrap();
        }
        alice.send(Drain).await.unwrap();
        bob.send(Drain).await.unwrap();

        srv.send(BroadcastAll {
            event: event::NEW_USER_JOINED,
            payload: json!({ "username": "carol" }),
        })
        .await
        .unwrap();

        for collector in [&alice, &bob] {
            let got = collector.send(Drain).await.unwrap();
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].event, event::NEW_USER_JOINED);
        }
    }

    #[actix_web::test]
    async fn disconnect_tears_down_room_membership() {
        let srv = server().await;
        let alice = Collector::default().start();
        srv.send(Join {
            username: "alice".into(),
            addr: alice.clone().recipient(),
        })
        .await
        .unwrap();
        srv.send(Disconnect {
            username: "alice".into(),
            addr: alice.clone().recipient(),
        })
        .await
        .unwrap();
        alice.send(Drain).await.unwrap();

        srv.send(Emit {
            to: "alice".into(),
            event: event::TASK_REQUEST_REJECT,
            payload: json!({}),
        })
        .await
        .unwrap();
        assert!(alice.send(Drain).await.unwrap().is_empty());
    }

    #[test]
    fn decisions_map_to_their_guarded_actions() {
        assert_eq!(Decision::Accept.action(), AssignAction::Accept);
        assert_eq!(Decision::Reject.action(), AssignAction::Reject);
    }

    #[actix_web::test]
    async fn collaborator_write_failure_stays_swallowed() {
        // With a sub-millisecond bound the graph update cannot complete;
        // the accepted transition must come out of this as a plain return,
        // not an error.
        let db = test_db().await;
        record_collaborator(&db, Duration::from_millis(1), &user("alice"), &user("bob")).await;
    }
}
