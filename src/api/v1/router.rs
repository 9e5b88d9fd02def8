use super::error::*;
use super::handler;
use super::handler::{MarkReadQuery, MessagesQuery, OpenRoomQuery};
use crate::application_port::AuthService;
use crate::domain_model::{MemberId, RoomId};
use crate::server::*;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let open_room = warp::post()
        .and(warp::path("rooms"))
        .and(warp::path("open"))
        .and(warp::path::end())
        .and(warp::query::<OpenRoomQuery>())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::open_room);

    let my_rooms = warp::get()
        .and(warp::path("rooms"))
        .and(warp::path("my"))
        .and(warp::path::end())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::my_rooms);

    let list_messages = warp::get()
        .and(warp::path("rooms"))
        .and(warp::path::param::<RoomId>())
        .and(warp::path("messages"))
        .and(warp::path::end())
        .and(warp::query::<MessagesQuery>())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::list_messages);

    let mark_read = warp::post()
        .and(warp::path("rooms"))
        .and(warp::path::param::<RoomId>())
        .and(warp::path("read"))
        .and(warp::path::end())
        .and(warp::query::<MarkReadQuery>())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::mark_read);

    let room_detail = warp::get()
        .and(warp::path("rooms"))
        .and(warp::path::param::<RoomId>())
        .and(warp::path::end())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::room_detail);

    let delete_room = warp::delete()
        .and(warp::path("rooms"))
        .and(warp::path::param::<RoomId>())
        .and(warp::path::end())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.chat_service.clone()))
        .and_then(handler::delete_room);

    let chat = warp::get()
        .and(warp::path("chat"))
        .and(warp::path::end())
        .and(with_handshake_identity(server.auth_service.clone()))
        .and(warp::ws())
        .and(with(server.connection_acceptor.clone()))
        .map(
            |identity: Option<MemberId>,
             ws: warp::ws::Ws,
             connection_acceptor: Arc<dyn ConnectionAcceptor>| {
                ws.on_upgrade(move |socket| {
                    handler::join_chat(socket, identity, connection_acceptor)
                })
            },
        );

    open_room
        .or(my_rooms)
        .or(list_messages)
        .or(mark_read)
        .or(room_detail)
        .or(delete_room)
        .or(chat)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (MemberId,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let auth_service = auth_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let member_id = auth_service
                    .verify_token(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(member_id)
            } else {
                Err(reject::custom(ApiErrorCode::InvalidToken))
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    token: Option<String>,
}

/// Handshake-time credential for the websocket route. Browsers cannot set
/// headers on the upgrade request, so a `token` query parameter is accepted
/// as well. An absent or invalid credential does not reject the upgrade —
/// the connection simply starts without identity and may authenticate with
/// its first control frame.
fn with_handshake_identity(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (Option<MemberId>,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_ref())
        .and(warp::query::<WsAuthQuery>())
        .and_then(move |header: Option<String>, query: WsAuthQuery| {
            let auth_service = auth_service.clone();
            async move {
                let token = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer ").map(str::to_owned))
                    .or(query.token);

                let identity = match token {
                    Some(token) => match auth_service.verify_token(&token).await {
                        Ok(member_id) => Some(member_id),
                        Err(e) => {
                            tracing::debug!("handshake credential rejected: {e}");
                            None
                        }
                    },
                    None => None,
                };

                Ok::<_, warp::Rejection>(identity)
            }
        })
}
