use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_postgres::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Constructed component graph shared by both listeners.
pub struct Server {
    pub credential_service: Arc<dyn CredentialService>,
    account_repo: Arc<dyn AccountRepo>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let account_repo: Arc<dyn AccountRepo> = match settings.store.backend.as_str() {
            "fake" => {
                warn!("using in-memory account store; accounts are lost on exit");
                Arc::new(FakeAccountRepo::new())
            }
            "postgres" => {
                let repo = PostgresAccountRepo::connect_lazy(&PostgresConfig {
                    database_url: settings.store.database_url.clone(),
                    max_connections: settings.store.max_connections,
                    acquire_timeout: Duration::from_millis(settings.store.request_timeout_ms),
                })
                .context("invalid store.database_url")?;
                if settings.store.run_migrations {
                    repo.run_migrations()
                        .await
                        .context("failed to apply migrations")?;
                    info!("migrations applied");
                }
                Arc::new(repo)
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let credential_hasher: Arc<dyn CredentialHasher> =
            Arc::new(Argon2PasswordHasher::new(HasherConfig {
                memory_kib: settings.hasher.memory_kib,
                iterations: settings.hasher.iterations,
                parallelism: settings.hasher.parallelism,
            })
            .map_err(|e| anyhow::anyhow!("invalid hasher settings: {}", e))?);

        let credential_service: Arc<dyn CredentialService> = Arc::new(RealCredentialService::new(
            account_repo.clone(),
            credential_hasher,
            CredentialServiceConfig {
                request_timeout: Duration::from_millis(settings.store.request_timeout_ms),
            },
        ));

        info!(backend = %settings.store.backend, "server components constructed");

        Ok(Self::from_parts(account_repo, credential_service))
    }

    pub fn from_parts(
        account_repo: Arc<dyn AccountRepo>,
        credential_service: Arc<dyn CredentialService>,
    ) -> Self {
        Self {
            credential_service,
            account_repo,
        }
    }

    /// Releases the store. Call after both listeners have stopped.
    pub async fn shutdown(&self) {
        info!("closing account store");
        self.account_repo.close().await;
    }
}
