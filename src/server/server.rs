use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::Settings;
use nanoid::nanoid;
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct StorageWiring {
    room_repo: Arc<dyn RoomRepo>,
    message_repo: Arc<dyn MessageRepo>,
    participant_repo: Arc<dyn ParticipantRepo>,
    listing_repo: Arc<dyn ListingRepo>,
    member_repo: Arc<dyn MemberRepo>,
    outbox_repo: Arc<dyn OutboxRepo>,
    tx_manager: Arc<dyn TxManager>,
    pool: Option<Pool<MySql>>,
}

async fn wire_storage(settings: &Settings) -> anyhow::Result<StorageWiring> {
    match settings.storage.backend.as_str() {
        "mysql" => {
            let pool = Pool::<MySql>::connect(&settings.storage.mysql_dsn).await?;
            Ok(StorageWiring {
                room_repo: Arc::new(MySqlRoomRepo::new(pool.clone())),
                message_repo: Arc::new(MySqlMessageRepo::new(pool.clone())),
                participant_repo: Arc::new(MySqlParticipantRepo::new(pool.clone())),
                listing_repo: Arc::new(MySqlListingRepo::new(pool.clone())),
                member_repo: Arc::new(MySqlMemberRepo::new(pool.clone())),
                outbox_repo: Arc::new(MySqlOutboxRepo::new(pool.clone())),
                tx_manager: Arc::new(MySqlTxManager::new(pool.clone())),
                pool: Some(pool),
            })
        }
        "memory" => {
            let store = Arc::new(MemoryStore::new());
            Ok(StorageWiring {
                room_repo: Arc::new(MemoryRoomRepo::new(store.clone())),
                message_repo: Arc::new(MemoryMessageRepo::new(store.clone())),
                participant_repo: Arc::new(MemoryParticipantRepo::new(store.clone())),
                listing_repo: Arc::new(MemoryListingRepo::new(store.clone())),
                member_repo: Arc::new(MemoryMemberRepo::new(store.clone())),
                outbox_repo: Arc::new(MemoryOutboxRepo::new(store.clone())),
                tx_manager: Arc::new(MemoryTxManager),
                pool: None,
            })
        }
        other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
    }
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub chat_service: Arc<dyn ChatService>,
    pub connection_acceptor: Arc<dyn ConnectionAcceptor>,
    fanout_handle: Mutex<Option<JoinHandle<()>>>,
    notifier_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    session_hub: Arc<SessionHub>,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let alphabet: [char; 16] = [
            '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
        ];
        let run_id = nanoid!(10, &alphabet);

        let storage = wire_storage(settings).await?;

        let key = std::env::var("JWT_SIGNING_KEY")
            .unwrap_or_else(|_| "my-dev-secret-key".to_string())
            .into_bytes();
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            access_ttl: Duration::from_secs(24 * 60 * 60),
            signing_key: key,
        }));

        let session_store: Arc<dyn AuthSessionStore> =
            match settings.auth.revocation_backend.as_str() {
                "redis" => {
                    let redis_client = redis::Client::open(settings.storage.redis_dsn.as_str())?;
                    let redis_manager = redis_client.get_connection_manager().await?;
                    Arc::new(RedisAuthSessionStore::new(redis_manager, "auth:revoked"))
                }
                "none" => Arc::new(NullSessionStore),
                other => return Err(anyhow::anyhow!("Unknown revocation backend: {}", other)),
            };

        let auth_service: Arc<dyn AuthService> =
            Arc::new(RealAuthService::new(token_codec, session_store));

        let urls = PublicUrlBuilder::new(
            settings.media.image_prefix.clone(),
            settings.media.default_avatar.clone(),
            settings.media.default_listing_thumb.clone(),
        );
        let chat_service: Arc<dyn ChatService> = Arc::new(RealChatService::new(
            storage.room_repo.clone(),
            storage.message_repo.clone(),
            storage.participant_repo.clone(),
            storage.listing_repo.clone(),
            storage.member_repo.clone(),
            storage.outbox_repo.clone(),
            storage.tx_manager.clone(),
            urls,
        ));

        // region runtime infra
        let cancel = CancellationToken::new();

        let topic = format!("chat.room.events.{}", run_id);

        let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaPublisher::new(
            &settings.storage.kafka_bootstrap,
            &format!("chat-pub-{}", run_id),
        )?);
        let consumer: Arc<dyn EventConsumer> = Arc::new(KafkaConsumer::new(
            &settings.storage.kafka_bootstrap,
            &format!("chat-sub-{}", run_id),
            cancel.clone(),
        ));

        let service_registry = Arc::new(ServiceRegistry {
            chat_service: chat_service.clone(),
            auth_service: auth_service.clone(),
        });
        let actor_config = ActorConfig {
            max_inflight_messages: settings.chat.max_inflight_messages,
            max_inflight_results: settings.chat.max_inflight_results,
            max_worker_timeout: settings.chat.max_worker_timeout,
        };
        let session_hub = Arc::new(SessionHub::new(service_registry, actor_config));
        let connection_acceptor: Arc<dyn ConnectionAcceptor> = session_hub.clone();
        let outbound_queue: Arc<dyn OutboundQueue> = session_hub.clone();

        let fanout_handler: Arc<dyn EventHandler> =
            Arc::new(RoomFanoutHandler::new(outbound_queue.clone()));
        let notifier = Notifier::new(
            storage.tx_manager.clone(),
            storage.outbox_repo.clone(),
            publisher.clone(),
            &topic,
            cancel.clone(),
        );

        let run_id_clone = run_id.clone();
        let fanout_handle = tokio::spawn(async move {
            let _ = consumer
                .run(
                    &format!("ws-fanout-{}", run_id_clone),
                    &[&topic],
                    fanout_handler,
                )
                .await;
        });
        let notifier_handle = tokio::spawn(async move {
            let _ = notifier.run().await;
        });

        // endregion

        info!("server started");

        Ok(Self {
            auth_service,
            chat_service,
            connection_acceptor,
            fanout_handle: Mutex::new(Some(fanout_handle)),
            notifier_handle: Mutex::new(Some(notifier_handle)),
            cancel,
            session_hub,
            pool: storage.pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        if let Ok(mut lock) = self.notifier_handle.lock() {
            if let Some(handle) = lock.take() {
                let r = handle.await;
                info!("notifier handle dropped: {:?}", r);
            }
        }
        if let Ok(mut lock) = self.fanout_handle.lock() {
            if let Some(handle) = lock.take() {
                let r = handle.await;
                info!("fanout handle dropped: {:?}", r);
            }
        }

        self.session_hub.shutdown().await;
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
