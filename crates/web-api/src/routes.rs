use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{AuthSession, ChatState, MessageFeed, NicknameChange};
use domain::{
    ActiveUser, AuthUser, ChatRoom, Message, Nickname, Post, PostId, Profile, ProfileUpdate,
    RoomId, UserId,
};

use crate::{
    auth::{Claims, LoginResponse},
    error::ApiError,
    state::AppState,
    websocket,
};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct VerifyEmailPayload {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UpdateProfilePayload {
    nickname: Option<String>,
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenamePayload {
    nickname: String,
}

#[derive(Debug, Serialize)]
struct NicknameAvailability {
    nickname: String,
    exists: bool,
}

#[derive(Debug, Serialize)]
struct NicknameSuggestion {
    nickname: Nickname,
}

#[derive(Debug, Serialize)]
struct DisplayName {
    user_id: UserId,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ActivityPayload {
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePostPayload {
    title: String,
    content: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/logout", post(logout_user))
        .route("/auth/verify-email", post(confirm_email))
        .route("/auth/verify-email/send", post(send_email_verification))
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/profile/nickname", put(rename))
        .route("/profile/nickname/suggestion", get(suggest_nickname))
        .route("/nicknames/{nickname}", get(nickname_exists))
        .route("/users/{user_id}/display-name", get(display_name))
        .route("/rooms", get(list_rooms).post(create_room))
        .route(
            "/rooms/{room_id}/messages",
            get(latest_messages).post(send_message),
        )
        .route("/rooms/{room_id}/ws", get(websocket::upgrade))
        .route("/presence", get(list_active_users).post(record_activity))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{post_id}/like", post(toggle_like))
        .route("/posts/{post_id}", delete(delete_post))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 令牌有效但用户已不存在时同样视为未登录
async fn restore_session(state: &AppState, claims: &Claims) -> Result<AuthSession, ApiError> {
    state
        .auth_service
        .restore_session(claims.user_id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("user no longer exists"))
}

/// 从 Bearer 令牌恢复会话；已注销的令牌会被拒绝
pub(crate) async fn authenticate_token(
    state: &AppState,
    token: &str,
) -> Result<AuthSession, ApiError> {
    let claims = state.jwt_service.verify_token(token).await?;
    restore_session(state, &claims).await
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthSession, ApiError> {
    let claims = state.jwt_service.extract_claims_from_headers(headers).await?;
    restore_session(state, &claims).await
}

fn login_response(state: &AppState, user: AuthUser) -> Result<LoginResponse, ApiError> {
    let token = state.jwt_service.generate_token(user.id)?;
    Ok(LoginResponse { user, token })
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let session = AuthSession::anonymous();
    let user = state
        .auth_service
        .sign_up(&session, &payload.email, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(login_response(&state, user)?)))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = AuthSession::anonymous();
    let user = state
        .auth_service
        .sign_in(&session, &payload.email, &payload.password)
        .await?;

    Ok(Json(login_response(&state, user)?))
}

async fn logout_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let claims = state.jwt_service.extract_claims_from_headers(&headers).await?;
    let session = restore_session(&state, &claims).await?;
    state.jwt_service.revoke(&claims).await?;
    state.auth_service.sign_out(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn confirm_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailPayload>,
) -> Result<Json<AuthUser>, ApiError> {
    let session = AuthSession::anonymous();
    let user = state
        .auth_service
        .confirm_email(&session, &payload.token)
        .await?;
    Ok(Json(user))
}

async fn send_email_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session = authenticate(&state, &headers).await?;
    state.auth_service.send_email_verification(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let user = session.require_user()?;
    Ok(Json(state.profile_service.load(&user).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<Profile>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let user = session.require_user()?;
    let update = ProfileUpdate {
        nickname: payload.nickname.map(Nickname::parse).transpose()?,
        bio: payload.bio,
    };
    Ok(Json(state.profile_service.update(&user, update).await?))
}

async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RenamePayload>,
) -> Result<Json<NicknameChange>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let user = session.require_user()?;
    Ok(Json(
        state.profile_service.rename(&user, &payload.nickname).await?,
    ))
}

async fn suggest_nickname(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NicknameSuggestion>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let user = session.require_user()?;
    let nickname = state.profile_service.generate_unique_nickname(&user).await?;
    Ok(Json(NicknameSuggestion { nickname }))
}

async fn nickname_exists(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(nickname): Path<String>,
) -> Result<Json<NicknameAvailability>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let user = session.require_user()?;
    let exists = state.profile_service.nickname_exists(&user, &nickname).await?;
    Ok(Json(NicknameAvailability { nickname, exists }))
}

async fn display_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DisplayName>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let viewer = session.require_user()?;
    let user_id = UserId::from(user_id);
    let display_name = state
        .chat_service
        .display_name(Some(user_id), viewer.id)
        .await;
    Ok(Json(DisplayName {
        user_id,
        display_name,
    }))
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatRoom>>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    Ok(Json(state.chat_service.list_rooms(&session).await?))
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<ChatRoom>), ApiError> {
    let session = authenticate(&state, &headers).await?;
    let room = state
        .chat_service
        .create_room(&session, &payload.id, &payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// 一次性读取：订阅后取第一份快照立即取消
async fn latest_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<MessageFeed>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let room_id = RoomId::parse(room_id)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = state
        .chat_service
        .subscribe_messages(&session, room_id, move |feed| {
            let _ = tx.send(feed);
        })
        .await?;
    let feed = rx.recv().await;
    subscription.cancel();

    feed.map(Json)
        .ok_or_else(|| ApiError::internal_server_error("message feed closed"))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let session = authenticate(&state, &headers).await?;
    let room_id = RoomId::parse(room_id)?;
    let message = state
        .chat_service
        .send(&session, room_id, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn record_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<ActivityPayload>>,
) -> Result<Json<ActiveUser>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let nickname = payload.and_then(|Json(payload)| payload.nickname);
    Ok(Json(
        state
            .chat_service
            .record_activity(&session, nickname)
            .await?,
    ))
}

async fn list_active_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActiveUser>>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let chat_state = ChatState::default();
    Ok(Json(
        state
            .chat_service
            .list_active_users(&session, &chat_state)
            .await?,
    ))
}

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Post>>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    Ok(Json(state.post_service.get_all(&session).await?))
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostPayload>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let session = authenticate(&state, &headers).await?;
    let post = state
        .post_service
        .create(&session, &payload.title, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn toggle_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    Ok(Json(
        state
            .post_service
            .toggle_like(&session, PostId::from(post_id))
            .await?,
    ))
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = authenticate(&state, &headers).await?;
    state
        .post_service
        .delete(&session, PostId::from(post_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
