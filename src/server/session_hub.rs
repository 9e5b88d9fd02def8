use crate::application_port::*;
use crate::domain_model::*;
use crate::server::*;
use anyhow::anyhow;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const MAILBOX_CAP: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct ActorConfig {
    pub max_inflight_messages: usize,
    pub max_inflight_results: usize,
    pub max_worker_timeout: u64,
}

pub struct ClientRecord {
    pub member_id: MemberId,
    /// Distinguishes this connection from a later one under the same member,
    /// so a finished actor never evicts its replacement.
    pub conn_seq: u64,
    pub control: Sender<ConnMessage>,
    pub mailbox: Sender<ConnMessage>,
    pub subscriptions: Arc<Mutex<HashSet<RoomId>>>,
    pub cancellation_token: CancellationToken,
}

pub struct ServiceRegistry {
    pub chat_service: Arc<dyn ChatService>,
    pub auth_service: Arc<dyn AuthService>,
}

pub struct SessionHub {
    online_members: Arc<DashMap<MemberId, ClientRecord>>,
    services: Arc<ServiceRegistry>,
    config: ActorConfig,
    tracker: TaskTracker,
    root_cancel: CancellationToken,
    conn_seq: AtomicU64,
}

impl SessionHub {
    pub fn new(services: Arc<ServiceRegistry>, config: ActorConfig) -> Self {
        Self {
            online_members: Arc::new(DashMap::new()),
            services,
            config,
            tracker: TaskTracker::new(),
            root_cancel: CancellationToken::new(),
            conn_seq: AtomicU64::new(0),
        }
    }

    pub async fn shutdown(&self) {
        tracing::info!("SessionHub shutting down...");

        self.root_cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        tracing::info!("All SessionHub actors shut down.");
    }
}

// region connection acceptor

#[async_trait::async_trait]
impl ConnectionAcceptor for SessionHub {
    async fn accept_connection(
        &self,
        s2c_channel: Box<dyn ConnSender>,
        c2s_channel: Box<dyn ConnReceiver>,
        identity: Option<MemberId>,
    ) -> anyhow::Result<()> {
        let conn_seq = self.conn_seq.fetch_add(1, Ordering::Relaxed);
        let actor_cancel = self.root_cancel.child_token();

        let (sender_control_tx, sender_control_rx) = tokio::sync::mpsc::channel(MAILBOX_CAP);
        let (sender_buffer_tx, sender_buffer_rx) = tokio::sync::mpsc::channel(MAILBOX_CAP);

        self.tracker.spawn(client_actor(ConnActorArgs {
            conn_seq,
            provisional: identity,
            s2c_channel,
            c2s_channel,
            sender_control_tx,
            sender_control_rx,
            sender_buffer_tx,
            sender_buffer_rx,
            services: self.services.clone(),
            config: self.config,
            actor_cancel,
            online_members: self.online_members.clone(),
        }));

        Ok(())
    }
}

/// Connection-scoped identity: provisional until the first operation that
/// needs it, immutable afterwards.
#[derive(Clone, Copy)]
enum ConnIdentity {
    Pending(Option<MemberId>),
    Fixed(MemberId),
}

struct ConnActorArgs {
    conn_seq: u64,
    provisional: Option<MemberId>,
    s2c_channel: Box<dyn ConnSender>,
    c2s_channel: Box<dyn ConnReceiver>,
    sender_control_tx: Sender<ConnMessage>,
    sender_control_rx: Receiver<ConnMessage>,
    sender_buffer_tx: Sender<ConnMessage>,
    sender_buffer_rx: Receiver<ConnMessage>,
    services: Arc<ServiceRegistry>,
    config: ActorConfig,
    actor_cancel: CancellationToken,
    online_members: Arc<DashMap<MemberId, ClientRecord>>,
}

async fn client_actor(args: ConnActorArgs) {
    tracing::info!("ClientActor [conn {}] starting", args.conn_seq);

    let sender_token = args.actor_cancel.clone();
    let sender_handle = tokio::spawn(outbound_sender(
        args.s2c_channel,
        args.sender_control_rx,
        args.sender_buffer_rx,
        sender_token,
    ));

    let receiver_token = args.actor_cancel.clone();
    let receiver_handle = tokio::spawn(inbound_receiver(
        args.conn_seq,
        args.provisional,
        args.c2s_channel,
        args.sender_control_tx,
        args.sender_buffer_tx,
        args.services,
        args.config,
        receiver_token,
        args.online_members.clone(),
    ));

    tokio::select! {
        res = sender_handle => {
            tracing::warn!("Sender task ended first (conn {}): {:?}", args.conn_seq, res);
        },
        res = receiver_handle => {
            tracing::warn!("Receiver task ended first (conn {}): {:?}", args.conn_seq, res);
        }
    };
    tracing::debug!("online_members: {}", args.online_members.len());
}

async fn outbound_sender(
    mut s2c_channel: Box<dyn ConnSender>,
    mut sender_control_rx: Receiver<ConnMessage>,
    mut sender_data_rx: Receiver<ConnMessage>,
    actor_cancel: CancellationToken,
) {
    while let Some(msg) = tokio::select! {
        biased;
        _ = actor_cancel.cancelled() => None,
        m = sender_control_rx.recv() => m,
        m = sender_data_rx.recv() => m,
    } {
        tracing::trace!("outbound_sender: {:?}", msg);
        if s2c_channel.send(msg).await.is_err() {
            tracing::trace!("outbound_sender shutting down");
            actor_cancel.cancel();
            return;
        }
    }

    // Cancelled: flush control frames already queued (a final error or ack
    // must reach the peer before the socket drops).
    while let Ok(msg) = sender_control_rx.try_recv() {
        if s2c_channel.send(msg).await.is_err() {
            break;
        }
    }
}

fn register_online(
    online_members: &DashMap<MemberId, ClientRecord>,
    member_id: MemberId,
    conn_seq: u64,
    control: &Sender<ConnMessage>,
    mailbox: &Sender<ConnMessage>,
    subscriptions: &Arc<Mutex<HashSet<RoomId>>>,
    cancellation_token: &CancellationToken,
) {
    let record = ClientRecord {
        member_id,
        conn_seq,
        control: control.clone(),
        mailbox: mailbox.clone(),
        subscriptions: subscriptions.clone(),
        cancellation_token: cancellation_token.clone(),
    };
    if let Some(old) = online_members.insert(member_id, record) {
        // The newer connection wins; the stale actor is told to stop.
        old.cancellation_token.cancel();
    }
}

async fn send_event(sender_control_tx: &Sender<ConnMessage>, event: &S2CEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = sender_control_tx.send(ConnMessage::Text(json)).await;
        }
        Err(e) => tracing::error!("failed to serialize s2c event: {e}"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn inbound_receiver(
    conn_seq: u64,
    provisional: Option<MemberId>,
    mut c2s_channel: Box<dyn ConnReceiver>,
    sender_control_tx: Sender<ConnMessage>,
    sender_data_tx: Sender<ConnMessage>,
    services: Arc<ServiceRegistry>,
    config: ActorConfig,
    actor_cancel: CancellationToken,
    online_members: Arc<DashMap<MemberId, ClientRecord>>,
) {
    let mut identity = ConnIdentity::Pending(provisional);
    let subscriptions: Arc<Mutex<HashSet<RoomId>>> = Arc::new(Mutex::new(HashSet::new()));

    let worker_sem = Arc::new(Semaphore::new(config.max_inflight_messages));
    let join_sem = Arc::new(Semaphore::new(config.max_inflight_results));

    let mut task_set = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = actor_cancel.cancelled() => {
                tracing::info!("ClientActor [conn {}] shutdown by cancel", conn_seq);
                break;
            },

            maybe_message = c2s_channel.next() => {
                let result = match maybe_message {
                    Some(result) => result,
                    None => break,  // connection closed
                };

                let conn_msg = match result {
                    Ok(m) => m,
                    Err(_) => break,  // low level error
                };

                let command = match conn_msg {
                    ConnMessage::Text(t) => {
                        match serde_json::from_str::<C2SCommand>(&t) {
                            Ok(command) => command,
                            Err(_) => {
                                tracing::error!("failed to deserialize message: {}", t);
                                let _ = sender_control_tx
                                    .send(ConnMessage::Text("malformed message".to_owned()))
                                    .await;
                                continue;
                            }
                        }
                    }
                    ConnMessage::Binary(_) => {
                        tracing::error!("unexpected binary message on conn {}", conn_seq);
                        continue;
                    }
                    ConnMessage::Ping => {
                        let _ = sender_control_tx.send(ConnMessage::Pong).await;
                        continue;
                    }
                    ConnMessage::Pong => {
                        tracing::error!("unexpected pong on conn {}", conn_seq);
                        continue;
                    }
                    ConnMessage::Close => {
                        actor_cancel.cancel();
                        continue;
                    }
                };

                match command {
                    C2SCommand::Authenticate(frame) => {
                        match identity {
                            ConnIdentity::Fixed(member_id) => {
                                // Identity never changes once set.
                                tracing::warn!(
                                    "conn {} re-authentication ignored (already {})",
                                    conn_seq,
                                    member_id
                                );
                            }
                            ConnIdentity::Pending(_) => {
                                match services.auth_service.verify_token(&frame.token).await {
                                    Ok(member_id) => {
                                        // A frame credential beats the
                                        // handshake-time one.
                                        identity = ConnIdentity::Fixed(member_id);
                                        register_online(
                                            &online_members,
                                            member_id,
                                            conn_seq,
                                            &sender_control_tx,
                                            &sender_data_tx,
                                            &subscriptions,
                                            &actor_cancel,
                                        );
                                        send_event(
                                            &sender_control_tx,
                                            &S2CEvent::Authenticated(Authenticated { member_id }),
                                        )
                                        .await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("conn {} authenticate failed: {e}", conn_seq);
                                        send_event(
                                            &sender_control_tx,
                                            &S2CEvent::Error(ErrorEvent::new(
                                                "unauthorized",
                                                "invalid credential",
                                            )),
                                        )
                                        .await;
                                        actor_cancel.cancel();
                                    }
                                }
                            }
                        }
                    }

                    C2SCommand::Subscribe(frame) => {
                        let member_id = match fix_identity(
                            &mut identity,
                            conn_seq,
                            &online_members,
                            &sender_control_tx,
                            &sender_data_tx,
                            &subscriptions,
                            &actor_cancel,
                        ) {
                            Some(member_id) => member_id,
                            None => {
                                send_event(
                                    &sender_control_tx,
                                    &S2CEvent::Error(ErrorEvent::new(
                                        "unauthorized",
                                        "connection carries no identity",
                                    )),
                                )
                                .await;
                                actor_cancel.cancel();
                                continue;
                            }
                        };

                        match services
                            .chat_service
                            .verify_participant(frame.room_id, member_id)
                            .await
                        {
                            Ok(()) => {
                                if let Ok(mut subs) = subscriptions.lock() {
                                    subs.insert(frame.room_id);
                                }
                                send_event(
                                    &sender_control_tx,
                                    &S2CEvent::SubscribeAck(SubscribeAck {
                                        room_id: frame.room_id,
                                    }),
                                )
                                .await;
                            }
                            Err(ChatError::NotParticipant) => {
                                send_event(
                                    &sender_control_tx,
                                    &S2CEvent::Error(ErrorEvent::new(
                                        "forbidden",
                                        "not a participant of the room",
                                    )),
                                )
                                .await;
                            }
                            Err(e) => {
                                tracing::error!("subscribe check failed: {e}");
                                send_event(
                                    &sender_control_tx,
                                    &S2CEvent::Error(ErrorEvent::new("internal", "try again")),
                                )
                                .await;
                            }
                        }
                    }

                    C2SCommand::ChatMessageSend(frame) => {
                        let member_id = match fix_identity(
                            &mut identity,
                            conn_seq,
                            &online_members,
                            &sender_control_tx,
                            &sender_data_tx,
                            &subscriptions,
                            &actor_cancel,
                        ) {
                            Some(member_id) => member_id,
                            None => {
                                send_event(
                                    &sender_control_tx,
                                    &S2CEvent::Error(ErrorEvent::new(
                                        "unauthorized",
                                        "connection carries no identity",
                                    )),
                                )
                                .await;
                                actor_cancel.cancel();
                                continue;
                            }
                        };

                        let permit = match worker_sem.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                tracing::warn!("conn {} is throttled", conn_seq);
                                let _ = sender_control_tx
                                    .send(ConnMessage::Text(String::from("Too many messages")))
                                    .await;
                                continue;
                            }
                        };

                        let join_permit = match join_sem.try_acquire() {
                            Ok(p) => p,
                            Err(_) => {
                                tracing::warn!("conn {} join-backlog limit reached", conn_seq);
                                continue;
                            }
                        };
                        join_permit.forget();

                        let sender_control_tx = sender_control_tx.clone();
                        let chat_service = services.chat_service.clone();
                        let timeout = Duration::from_secs(config.max_worker_timeout);
                        task_set.spawn(async move {
                            let _permit_guard = permit;
                            let fut = handle_send_message(
                                member_id,
                                frame,
                                sender_control_tx,
                                chat_service,
                            );
                            if tokio::time::timeout(timeout, fut).await.is_err() {
                                tracing::warn!("worker timeout for member [{}]", member_id);
                            }
                        });
                    }
                }
            }

            Some(join_result) = task_set.join_next() => {
                if let Err(e) = join_result {
                    tracing::error!("worker panicked: {e}");
                }
                join_sem.add_permits(1);
            }
        }
    }

    actor_cancel.cancel();
    while task_set.join_next().await.is_some() {}

    if let ConnIdentity::Fixed(member_id) = identity {
        online_members.remove_if(&member_id, |_, record| record.conn_seq == conn_seq);
    }
    tracing::info!("ClientActor [conn {}] shutting down", conn_seq);
}

/// Binds the provisional handshake identity on first use. Returns `None`
/// when the connection never presented a valid credential.
fn fix_identity(
    identity: &mut ConnIdentity,
    conn_seq: u64,
    online_members: &DashMap<MemberId, ClientRecord>,
    control: &Sender<ConnMessage>,
    mailbox: &Sender<ConnMessage>,
    subscriptions: &Arc<Mutex<HashSet<RoomId>>>,
    cancellation_token: &CancellationToken,
) -> Option<MemberId> {
    match *identity {
        ConnIdentity::Fixed(member_id) => Some(member_id),
        ConnIdentity::Pending(Some(member_id)) => {
            *identity = ConnIdentity::Fixed(member_id);
            register_online(
                online_members,
                member_id,
                conn_seq,
                control,
                mailbox,
                subscriptions,
                cancellation_token,
            );
            Some(member_id)
        }
        ConnIdentity::Pending(None) => None,
    }
}

async fn handle_send_message(
    member_id: MemberId,
    frame: ChatMessageSend,
    sender_control_tx: Sender<ConnMessage>,
    chat_service: Arc<dyn ChatService>,
) {
    match chat_service
        .send_message(frame.room_id, member_id, frame.content.as_str())
        .await
    {
        Ok(record) => {
            send_event(
                &sender_control_tx,
                &S2CEvent::ChatMessageAck(ChatMessageAck {
                    room_id: record.room_id,
                    message_id: record.message_id,
                    inserted_at: record.inserted_at,
                }),
            )
            .await;
        }
        // Reported to the sender only; the connection stays open.
        Err(ChatError::EmptyMessage) => {
            send_event(
                &sender_control_tx,
                &S2CEvent::Error(ErrorEvent::new("invalid_argument", "message content is empty")),
            )
            .await;
        }
        Err(ChatError::RoomNotFound) => {
            send_event(
                &sender_control_tx,
                &S2CEvent::Error(ErrorEvent::new("not_found", "room not found")),
            )
            .await;
        }
        Err(ChatError::NotParticipant) => {
            send_event(
                &sender_control_tx,
                &S2CEvent::Error(ErrorEvent::new("forbidden", "not a participant of the room")),
            )
            .await;
        }
        Err(e) => {
            tracing::error!("failed to send chat message: {e}");
            send_event(
                &sender_control_tx,
                &S2CEvent::Error(ErrorEvent::new("internal", "try again")),
            )
            .await;
        }
    }
}

// endregion

// region outbound queue

#[async_trait::async_trait]
impl OutboundQueue for SessionHub {
    async fn enqueue(
        &self,
        receiver: MemberId,
        room_id: RoomId,
        event: &S2CEvent,
    ) -> anyhow::Result<()> {
        if let Some(record) = self.online_members.get(&receiver) {
            let subscribed = record
                .subscriptions
                .lock()
                .map(|subs| subs.contains(&room_id))
                .unwrap_or(false);
            if !subscribed {
                tracing::trace!("member {} online but not subscribed to {}", receiver, room_id);
                return Ok(());
            }

            let message = serde_json::to_string(event)?;
            match record.mailbox.try_send(ConnMessage::Text(message)) {
                Ok(_) => Ok(()),
                Err(TrySendError::Full(..)) => Err(anyhow!("backpressure retry")),
                Err(e) => Err(anyhow!("failed to enqueue message: {e}")),
            }
        } else {
            Err(anyhow::anyhow!("member {} not connected", receiver))
        }
    }
}

// endregion
