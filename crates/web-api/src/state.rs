use std::sync::Arc;

use application::{AuthService, ChatService, PostService, ProfileService};
use infrastructure::Infrastructure;

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub profile_service: Arc<ProfileService>,
    pub chat_service: Arc<ChatService>,
    pub post_service: Arc<PostService>,
    pub auth_service: Arc<AuthService>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(infrastructure: &Infrastructure, jwt_service: Arc<JwtService>) -> Self {
        Self {
            profile_service: infrastructure.profile_service.clone(),
            chat_service: infrastructure.chat_service.clone(),
            post_service: infrastructure.post_service.clone(),
            auth_service: infrastructure.auth_service.clone(),
            jwt_service,
        }
    }
}
