use std::sync::Arc;

use domain::{AuthUser, DomainError, Post, PostId, PostRepository, TenantDomain};
use tracing::{error, info};

use crate::{
    clock::Clock, error::ApplicationError, services::profile_service::ProfileService,
    session::AuthSession,
};

pub struct PostServiceDependencies {
    pub post_repository: Arc<dyn PostRepository>,
    pub profile_service: Arc<ProfileService>,
    pub clock: Arc<dyn Clock>,
}

pub struct PostService {
    deps: PostServiceDependencies,
}

impl PostService {
    pub fn new(deps: PostServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create(
        &self,
        session: &AuthSession,
        title: &str,
        content: &str,
    ) -> Result<Post, ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;
        let profile = self.deps.profile_service.load(&user).await?;

        let post = Post::new(
            PostId::generate(),
            domain,
            user.id,
            profile.nickname.as_str(),
            title,
            content,
            self.deps.clock.now(),
        )?;

        let stored = self
            .deps
            .post_repository
            .create(post)
            .await
            .inspect_err(|err| error!(user_id = %user.id, error = %err, "failed to create post"))?;
        info!(post_id = %stored.id, domain = %stored.domain, "post created");
        Ok(stored)
    }

    /// 当前租户域的全部帖子，最新的在前
    pub async fn get_all(&self, session: &AuthSession) -> Result<Vec<Post>, ApplicationError> {
        let domain = session.tenant()?;
        Ok(self.deps.post_repository.list_by_domain(domain).await?)
    }

    /// 切换点赞；对同一帖子连续调用两次恢复原状
    pub async fn toggle_like(
        &self,
        session: &AuthSession,
        post_id: PostId,
    ) -> Result<Post, ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;
        self.load_in_domain(post_id, &domain).await?;

        let post = self
            .deps
            .post_repository
            .toggle_like(post_id, user.id)
            .await
            .inspect_err(|err| error!(post_id = %post_id, error = %err, "failed to toggle like"))?;
        Ok(post)
    }

    /// 删除帖子，只有作者本人可以删除
    pub async fn delete(
        &self,
        session: &AuthSession,
        post_id: PostId,
    ) -> Result<(), ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;
        let post = self.load_in_domain(post_id, &domain).await?;
        ensure_author(&post, &user)?;

        self.deps
            .post_repository
            .delete(post_id)
            .await
            .inspect_err(|err| error!(post_id = %post_id, error = %err, "failed to delete post"))?;
        info!(post_id = %post_id, user_id = %user.id, "post deleted");
        Ok(())
    }

    /// 其他租户域的帖子按不存在处理
    async fn load_in_domain(
        &self,
        post_id: PostId,
        domain: &TenantDomain,
    ) -> Result<Post, ApplicationError> {
        match self.deps.post_repository.find_by_id(post_id).await? {
            Some(post) if &post.domain == domain => Ok(post),
            _ => Err(DomainError::not_found("post", post_id.to_string()).into()),
        }
    }
}

fn ensure_author(post: &Post, user: &AuthUser) -> Result<(), DomainError> {
    if post.author_id != user.id {
        return Err(DomainError::permission_denied("delete post"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, services::profile_service::ProfileServiceDependencies, NicknameIndex};
    use chrono::Utc;
    use domain::{
        MockNicknameRepository, MockPostRepository, MockProfileRepository, Nickname, Profile,
        UserId,
    };
    use uuid::Uuid;

    fn user(email: &str) -> AuthUser {
        AuthUser::new(UserId::from(Uuid::new_v4()), email, true)
    }

    fn profile_service() -> Arc<ProfileService> {
        let mut profiles = MockProfileRepository::new();
        profiles.expect_find_by_id().returning(|id| {
            Ok(Some(Profile::new(
                id,
                Nickname::parse("QuietOtter").unwrap(),
                None,
                Utc::now(),
            )))
        });
        let profiles = Arc::new(profiles);
        let index = NicknameIndex::new(
            Arc::new(MockNicknameRepository::new()),
            profiles.clone(),
            Arc::new(SystemClock),
            10,
        );
        Arc::new(ProfileService::new(ProfileServiceDependencies {
            profile_repository: profiles,
            nickname_index: Arc::new(index),
            clock: Arc::new(SystemClock),
        }))
    }

    fn service(posts: MockPostRepository) -> PostService {
        PostService::new(PostServiceDependencies {
            post_repository: Arc::new(posts),
            profile_service: profile_service(),
            clock: Arc::new(SystemClock),
        })
    }

    fn post_by(author: &AuthUser) -> Post {
        Post::new(
            PostId::generate(),
            author.tenant().unwrap(),
            author.id,
            "QuietOtter",
            "Standup",
            "Moved to 10am",
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_uses_profile_nickname() {
        let mut posts = MockPostRepository::new();
        posts.expect_create().times(1).returning(Ok);

        let author = user("a@co.com");
        let session = AuthSession::authenticated(author.clone());
        let post = service(posts)
            .create(&session, "Hello", "World")
            .await
            .unwrap();

        assert_eq!(post.author_nickname, "QuietOtter");
        assert_eq!(post.domain.as_str(), "co.com");
        assert_eq!(post.likes, 0);
    }

    #[tokio::test]
    async fn anonymous_cannot_list() {
        let service = service(MockPostRepository::new());
        let err = service.get_all(&AuthSession::anonymous()).await.unwrap_err();
        assert!(err.is_unauthenticated());
    }

    #[tokio::test]
    async fn only_author_can_delete() {
        let author = user("a@co.com");
        let colleague = user("b@co.com");
        let post = post_by(&author);
        let id = post.id;

        let mut posts = MockPostRepository::new();
        posts
            .expect_find_by_id()
            .returning(move |_| Ok(Some(post.clone())));
        posts.expect_delete().times(1).returning(|_| Ok(()));
        let service = service(posts);

        let err = service
            .delete(&AuthSession::authenticated(colleague), id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::PermissionDenied { .. })
        ));

        service
            .delete(&AuthSession::authenticated(author), id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_tenant_post_is_not_found() {
        let author = user("a@co.com");
        let outsider = user("c@other.com");
        let post = post_by(&author);
        let id = post.id;

        let mut posts = MockPostRepository::new();
        posts
            .expect_find_by_id()
            .returning(move |_| Ok(Some(post.clone())));
        posts.expect_toggle_like().never();
        let service = service(posts);

        let err = service
            .toggle_like(&AuthSession::authenticated(outsider), id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
