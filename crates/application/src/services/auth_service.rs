use std::sync::Arc;

use domain::{AuthUser, Registration, RegistrationRepository};
use tracing::{error, info, warn};

use crate::{
    clock::Clock,
    error::ApplicationError,
    identity::{IdentityError, IdentityProvider},
    services::profile_service::ProfileService,
    session::AuthSession,
};

pub struct AuthServiceDependencies {
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub profile_service: Arc<ProfileService>,
    pub registration_repository: Arc<dyn RegistrationRepository>,
    pub clock: Arc<dyn Clock>,
}

/// 账号相关用例。身份服务的错误原样向上返回，文案可直接展示。
pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册并登录。
    ///
    /// 账号创建成功后依次创建初始资料、发送验证邮件、写入注册记录，
    /// 这几步失败只记日志，资料会在第一次读取时补建。
    pub async fn sign_up(
        &self,
        session: &AuthSession,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ApplicationError> {
        let user = self
            .deps
            .identity_provider
            .sign_up(email, password)
            .await
            .inspect_err(|err| warn!(email, error = %err, "sign up rejected"))?;

        if let Err(err) = self
            .deps
            .profile_service
            .create_initial(user.id, &user.email)
            .await
        {
            error!(user_id = %user.id, error = %err, "failed to create initial profile");
        }

        if let Err(err) = self
            .deps
            .identity_provider
            .send_email_verification(user.id)
            .await
        {
            warn!(user_id = %user.id, error = %err, "failed to send verification email");
        }

        self.record_registration(&user).await;

        info!(user_id = %user.id, "user signed up");
        session.set(Some(user.clone()));
        Ok(user)
    }

    async fn record_registration(&self, user: &AuthUser) {
        let domain = match user.tenant() {
            Ok(domain) => domain,
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "registration record skipped");
                return;
            }
        };
        let registration = Registration {
            user_id: user.id,
            email: user.email.clone(),
            domain,
            registered_at: self.deps.clock.now(),
        };
        if let Err(err) = self.deps.registration_repository.record(registration).await {
            error!(user_id = %user.id, error = %err, "failed to write registration record");
        }
    }

    /// 登录。邮箱未验证的账号会被立即登出，会话保持匿名。
    pub async fn sign_in(
        &self,
        session: &AuthSession,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ApplicationError> {
        let user = self
            .deps
            .identity_provider
            .sign_in(email, password)
            .await
            .inspect_err(|err| warn!(email, error = %err, "sign in rejected"))?;

        if !user.email_verified {
            if let Err(err) = self.deps.identity_provider.sign_out(user.id).await {
                warn!(user_id = %user.id, error = %err, "sign out of unverified account failed");
            }
            info!(user_id = %user.id, "sign in refused until email is verified");
            return Err(IdentityError::EmailNotVerified.into());
        }

        info!(user_id = %user.id, "user signed in");
        session.set(Some(user.clone()));
        Ok(user)
    }

    /// 登出；会话无论如何都会被清空
    pub async fn sign_out(&self, session: &AuthSession) -> Result<(), ApplicationError> {
        let Some(user) = session.current() else {
            return Ok(());
        };
        session.set(None);

        self.deps
            .identity_provider
            .sign_out(user.id)
            .await
            .inspect_err(|err| warn!(user_id = %user.id, error = %err, "sign out failed"))?;
        info!(user_id = %user.id, "user signed out");
        Ok(())
    }

    /// 重新发送验证邮件；已验证时返回 `AlreadyVerified`
    pub async fn send_email_verification(
        &self,
        session: &AuthSession,
    ) -> Result<(), ApplicationError> {
        let user = session.require_user()?;
        if user.email_verified {
            return Err(IdentityError::AlreadyVerified.into());
        }

        self.deps
            .identity_provider
            .send_email_verification(user.id)
            .await
            .inspect_err(|err| warn!(user_id = %user.id, error = %err, "verification email failed"))?;
        Ok(())
    }

    /// 确认邮箱；确认的正是当前用户时刷新会话
    pub async fn confirm_email(
        &self,
        session: &AuthSession,
        token: &str,
    ) -> Result<AuthUser, ApplicationError> {
        let user = self
            .deps
            .identity_provider
            .confirm_email(token)
            .await
            .inspect_err(|err| warn!(error = %err, "email confirmation failed"))?;

        if session.current().is_some_and(|current| current.id == user.id) {
            session.set(Some(user.clone()));
        }
        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// 根据令牌里的用户ID恢复会话；账号已不存在时返回 `None`
    pub async fn restore_session(
        &self,
        user_id: domain::UserId,
    ) -> Result<Option<AuthSession>, ApplicationError> {
        let user = self.deps.identity_provider.find_user(user_id).await?;
        Ok(user.map(AuthSession::authenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock, identity::MockIdentityProvider,
        services::profile_service::ProfileServiceDependencies, NicknameIndex,
    };
    use crate::clock::ManualClock;
    use chrono::Utc;
    use domain::{
        ClaimOutcome, MockNicknameRepository, MockProfileRepository, MockRegistrationRepository,
        RepositoryError, UserId,
    };
    use uuid::Uuid;

    fn profile_service(profiles: MockProfileRepository) -> Arc<ProfileService> {
        let mut nicknames = MockNicknameRepository::new();
        nicknames.expect_find().returning(|_| Ok(None));
        nicknames
            .expect_claim()
            .returning(|_| Ok(ClaimOutcome::Claimed));
        nicknames.expect_release().returning(|_, _| Ok(true));

        let profiles = Arc::new(profiles);
        let index = NicknameIndex::new(
            Arc::new(nicknames),
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

    fn registrations() -> MockRegistrationRepository {
        let mut registrations = MockRegistrationRepository::new();
        registrations.expect_record().returning(Ok);
        registrations
    }

    fn service_with(
        identity: MockIdentityProvider,
        profiles: MockProfileRepository,
        registrations: MockRegistrationRepository,
    ) -> AuthService {
        AuthService::new(AuthServiceDependencies {
            identity_provider: Arc::new(identity),
            profile_service: profile_service(profiles),
            registration_repository: Arc::new(registrations),
            clock: Arc::new(SystemClock),
        })
    }

    fn service(identity: MockIdentityProvider, profiles: MockProfileRepository) -> AuthService {
        service_with(identity, profiles, registrations())
    }

    fn new_user(email: &str, verified: bool) -> AuthUser {
        AuthUser::new(UserId::from(Uuid::new_v4()), email, verified)
    }

    #[tokio::test]
    async fn sign_up_creates_profile_and_signs_in() {
        let user = new_user("a@co.com", false);
        let returned = user.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .times(1)
            .returning(move |_, _| Ok(returned.clone()));
        identity
            .expect_send_email_verification()
            .times(1)
            .returning(|_| Ok(()));

        let mut profiles = MockProfileRepository::new();
        profiles.expect_find_by_id().returning(|_| Ok(None));
        profiles.expect_find_by_nickname().returning(|_| Ok(Vec::new()));
        profiles.expect_upsert().times(1).returning(Ok);

        let session = AuthSession::anonymous();
        let signed_up = service(identity, profiles)
            .sign_up(&session, "a@co.com", "secret1")
            .await
            .unwrap();

        assert_eq!(signed_up, user);
        assert_eq!(session.current(), Some(user));
    }

    #[tokio::test]
    async fn sign_up_survives_profile_failure() {
        let user = new_user("a@co.com", false);
        let returned = user.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .returning(move |_, _| Ok(returned.clone()));
        identity
            .expect_send_email_verification()
            .returning(|_| Err(IdentityError::backend("smtp down")));

        let mut profiles = MockProfileRepository::new();
        profiles
            .expect_find_by_id()
            .returning(|_| Err(RepositoryError::storage("unavailable")));

        let session = AuthSession::anonymous();
        let result = service(identity, profiles)
            .sign_up(&session, "a@co.com", "secret1")
            .await;

        assert!(result.is_ok());
        assert!(session.current().is_some());
    }

    #[tokio::test]
    async fn sign_up_writes_registration_record() {
        let user = new_user("a@co.com", false);
        let returned = user.clone();
        let registered_at = Utc::now();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .returning(move |_, _| Ok(returned.clone()));
        identity
            .expect_send_email_verification()
            .returning(|_| Ok(()));

        let mut profiles = MockProfileRepository::new();
        profiles.expect_find_by_id().returning(|_| Ok(None));
        profiles.expect_find_by_nickname().returning(|_| Ok(Vec::new()));
        profiles.expect_upsert().returning(Ok);

        let user_id = user.id;
        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_record()
            .times(1)
            .withf(move |record| {
                record.user_id == user_id
                    && record.email == "a@co.com"
                    && record.domain.as_str() == "co.com"
                    && record.registered_at == registered_at
            })
            .returning(Ok);

        let service = AuthService::new(AuthServiceDependencies {
            identity_provider: Arc::new(identity),
            profile_service: profile_service(profiles),
            registration_repository: Arc::new(registrations),
            clock: Arc::new(ManualClock::new(registered_at)),
        });
        service
            .sign_up(&AuthSession::anonymous(), "a@co.com", "secret1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn registration_record_failure_does_not_block_sign_up() {
        let user = new_user("a@co.com", false);
        let returned = user.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .returning(move |_, _| Ok(returned.clone()));
        identity
            .expect_send_email_verification()
            .returning(|_| Ok(()));

        let mut profiles = MockProfileRepository::new();
        profiles.expect_find_by_id().returning(|_| Ok(None));
        profiles.expect_find_by_nickname().returning(|_| Ok(Vec::new()));
        profiles.expect_upsert().returning(Ok);

        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_record()
            .returning(|_| Err(RepositoryError::storage("unavailable")));

        let session = AuthSession::anonymous();
        let signed_up = service_with(identity, profiles, registrations)
            .sign_up(&session, "a@co.com", "secret1")
            .await
            .unwrap();
        assert_eq!(session.current(), Some(signed_up));
    }

    #[tokio::test]
    async fn unverified_account_cannot_sign_in() {
        let user = new_user("a@co.com", false);
        let returned = user.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_in()
            .returning(move |_, _| Ok(returned.clone()));
        identity.expect_sign_out().times(1).returning(|_| Ok(()));

        let session = AuthSession::anonymous();
        let err = service(identity, MockProfileRepository::new())
            .sign_in(&session, "a@co.com", "secret1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Identity(IdentityError::EmailNotVerified)
        ));
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn verified_account_signs_in() {
        let user = new_user("a@co.com", true);
        let returned = user.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_in()
            .returning(move |_, _| Ok(returned.clone()));
        identity.expect_sign_out().never();

        let session = AuthSession::anonymous();
        service(identity, MockProfileRepository::new())
            .sign_in(&session, "a@co.com", "secret1")
            .await
            .unwrap();
        assert_eq!(session.current(), Some(user));
    }

    #[tokio::test]
    async fn provider_errors_are_reraised() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .returning(|_, _| Err(IdentityError::WeakPassword { min_length: 6 }));

        let session = AuthSession::anonymous();
        let err = service(identity, MockProfileRepository::new())
            .sign_up(&session, "a@co.com", "123")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Password must be at least 6 characters.");
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn verified_user_gets_already_verified() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_send_email_verification().never();

        let session = AuthSession::authenticated(new_user("a@co.com", true));
        let err = service(identity, MockProfileRepository::new())
            .send_email_verification(&session)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Identity(IdentityError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_sign_out().times(1).returning(|_| Ok(()));

        let session = AuthSession::authenticated(new_user("a@co.com", true));
        service(identity, MockProfileRepository::new())
            .sign_out(&session)
            .await
            .unwrap();
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn confirm_email_refreshes_current_user() {
        let user = new_user("a@co.com", false);
        let verified = AuthUser {
            email_verified: true,
            ..user.clone()
        };
        let returned = verified.clone();

        let mut identity = MockIdentityProvider::new();
        identity
            .expect_confirm_email()
            .returning(move |_| Ok(returned.clone()));

        let session = AuthSession::authenticated(user);
        service(identity, MockProfileRepository::new())
            .confirm_email(&session, "token")
            .await
            .unwrap();
        assert_eq!(session.current(), Some(verified));
    }
}
