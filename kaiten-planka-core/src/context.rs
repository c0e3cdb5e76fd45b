//! Per-run state handed to every worker behind an `Arc`.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::cache::{IdentityCache, OnceMap};
use crate::config::MigrationConfig;
use crate::contract::{DestinationWriter, SourceReader};
use crate::error::{Error, Result};
use crate::model::DestId;
use crate::report::MigrationReport;

/// Destination identity a request is made under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: DestId,
    pub token: String,
}

pub struct MigrationContext {
    pub source: Arc<dyn SourceReader>,
    pub destination: Arc<dyn DestinationWriter>,
    pub config: MigrationConfig,
    pub identities: IdentityCache,
    pub report: MigrationReport,
    /// `None` records a login that failed, so it is attempted once.
    tokens: OnceMap<String, Option<String>>,
    admin: OnceCell<Identity>,
}

impl MigrationContext {
    pub fn new(
        source: Arc<dyn SourceReader>,
        destination: Arc<dyn DestinationWriter>,
        config: MigrationConfig,
    ) -> Self {
        let identities = IdentityCache::new(Arc::clone(&destination));
        Self {
            source,
            destination,
            config,
            identities,
            report: MigrationReport::default(),
            tokens: OnceMap::default(),
            admin: OnceCell::new(),
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Logs in as `email` once per run and reuses the token afterwards.
    pub async fn access_token(&self, email: &str) -> Result<String> {
        let cell = self.tokens.cell(email.to_owned());
        let token = cell
            .get_or_init(|| async {
                let password = self.config.password_for(email);
                match self.destination.issue_access_token(email, password).await {
                    Ok(token) => Some(token),
                    Err(e) => {
                        warn!(email, error = %e, "[AUTH] Login failed");
                        None
                    }
                }
            })
            .await;
        token
            .clone()
            .ok_or_else(|| Error::not_found("access token", email))
    }

    /// The admin's user id and token, resolved on first use.
    pub async fn admin_identity(&self) -> Result<Identity> {
        let identity = self
            .admin
            .get_or_try_init(|| async {
                let email = self.config.admin_email.as_str();
                let user_id = self.identities.require_user_id(email).await?;
                let token = self.access_token(email).await?;
                info!(email, user_id = %user_id, "[AUTH] Admin identity resolved");
                Ok::<_, Error>(Identity { user_id, token })
            })
            .await?;
        Ok(identity.clone())
    }

    /// The author's own identity when it resolves, the admin's otherwise.
    pub async fn identity_or_admin(&self, email: &str) -> Result<Identity> {
        let own = async {
            let user_id = self.identities.require_user_id(email).await?;
            let token = self.access_token(email).await?;
            Ok::<_, Error>(Identity { user_id, token })
        };
        match own.await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                warn!(email, error = %e, "[AUTH] Falling back to admin identity");
                self.admin_identity().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockDestinationWriter, MockSourceReader};

    fn context(dest: MockDestinationWriter) -> MigrationContext {
        MigrationContext::new(
            Arc::new(MockSourceReader::new()),
            Arc::new(dest),
            MigrationConfig::new("admin@example.com", "adminpw"),
        )
    }

    #[tokio::test]
    async fn unresolvable_author_falls_back_to_admin() {
        let mut dest = MockDestinationWriter::new();
        dest.expect_user_id_by_email().returning(|email| {
            Ok(match email {
                "admin@example.com" => Some("admin-id".to_string()),
                _ => None,
            })
        });
        dest.expect_issue_access_token()
            .withf(|email, password| email == "admin@example.com" && password == "adminpw")
            .times(1)
            .returning(|_, _| Ok("admin-token".to_string()));

        let ctx = context(dest);
        let identity = ctx.identity_or_admin("gone@example.com").await.unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: "admin-id".into(),
                token: "admin-token".into()
            }
        );
        // memoised: no second login
        ctx.identity_or_admin("gone@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn author_with_login_uses_default_password() {
        let mut dest = MockDestinationWriter::new();
        dest.expect_user_id_by_email()
            .returning(|_| Ok(Some("u1".to_string())));
        dest.expect_issue_access_token()
            .withf(|email, password| email == "dev@example.com" && password == "1234tempPass")
            .times(1)
            .returning(|_, _| Ok("dev-token".to_string()));

        let ctx = context(dest);
        let identity = ctx.identity_or_admin("dev@example.com").await.unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.token, "dev-token");
        assert_eq!(ctx.access_token("dev@example.com").await.unwrap(), "dev-token");
    }

    #[tokio::test]
    async fn failed_login_is_attempted_once() {
        let mut dest = MockDestinationWriter::new();
        dest.expect_issue_access_token()
            .times(1)
            .returning(|_, _| Err(Error::transport("POST /api/access-tokens", "status 401")));

        let ctx = context(dest);
        assert!(ctx.access_token("dev@example.com").await.is_err());
        assert!(ctx.access_token("dev@example.com").await.is_err());
    }
}
