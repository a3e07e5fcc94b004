//! 房间消息的 WebSocket 推送
//!
//! 握手前完成令牌校验和租户检查；连接建立后每次房间变化推送一份完整快照
//! （`MessageFeed` 的 JSON）。客户端只需要保持连接，发送的文本帧会被忽略。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use application::{AuthSession, MessageFeed};
use domain::RoomId;

use crate::{error::ApiError, routes::authenticate_token, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    /// 浏览器无法给 WebSocket 握手加请求头，令牌放在查询参数里
    pub token: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<WebSocketQuery>,
) -> Result<Response, ApiError> {
    let session = authenticate_token(&state, &query.token).await?;
    let room_id = RoomId::parse(room_id)?;
    session.tenant()?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session, room_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session: AuthSession, room_id: RoomId) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<MessageFeed>();

    let subscription = match state
        .chat_service
        .subscribe_messages(&session, room_id.clone(), move |feed| {
            let _ = tx.send(feed);
        })
        .await
    {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(room_id = %room_id, error = %err, "websocket subscription failed");
            let _ = sender.send(WsMessage::Close(None)).await;
            return;
        }
    };
    info!(room_id = %room_id, "websocket subscribed");

    loop {
        tokio::select! {
            feed = rx.recv() => {
                let Some(feed) = feed else { break };
                let payload = match serde_json::to_string(&feed) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to encode message feed");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    subscription.cancel();
    info!(room_id = %room_id, "websocket closed");
}
