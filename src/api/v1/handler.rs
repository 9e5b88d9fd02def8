use super::error::*;
use crate::application_port::ChatService;
use crate::domain_model::*;
use crate::logger::*;
use crate::server::ConnectionAcceptor;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenRoomQuery {
    pub listing_id: ListingId,
}

pub async fn open_room(
    query: OpenRoomQuery,
    member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let opened = chat_service
        .open_or_get_room(query.listing_id, member_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(opened)))
}

pub async fn my_rooms(
    member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let rooms = chat_service
        .list_my_rooms(member_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(rooms)))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub before_id: Option<MessageId>,
    pub after_id: Option<MessageId>,
    pub limit: Option<u16>,
}

pub async fn list_messages(
    room_id: RoomId,
    query: MessagesQuery,
    _member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let limit = PageSize::normalize(query.limit);
    let messages = chat_service
        .list_messages(room_id, query.before_id, query.after_id, limit)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(messages)))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadQuery {
    pub last_message_id: Option<MessageId>,
}

pub async fn mark_read(
    room_id: RoomId,
    query: MarkReadQuery,
    member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    chat_service
        .mark_read(room_id, member_id, query.last_message_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn room_detail(
    room_id: RoomId,
    _member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let detail = chat_service
        .room_detail(room_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(detail)))
}

pub async fn delete_room(
    room_id: RoomId,
    member_id: MemberId,
    chat_service: Arc<dyn ChatService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    chat_service
        .delete_room(room_id, member_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn join_chat(
    socket: warp::ws::WebSocket,
    identity: Option<MemberId>,
    connection_acceptor: Arc<dyn ConnectionAcceptor>,
) {
    let (s2c, c2s) = socket.split();
    if let Err(e) = connection_acceptor
        .accept_connection(Box::new(s2c), Box::new(c2s), identity)
        .await
    {
        error!("accepting connection: {}", e);
    }
}
