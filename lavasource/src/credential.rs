//! Credentials partagés par fournisseur
//!
//! Un [`ProviderCredential`] est créé au démarrage et partagé (en lecture)
//! par toutes les requêtes du fournisseur. La ré-authentification est
//! exclusive et mutualisée : les requêtes qui constatent le même credential
//! périmé attendent la même ré-authentification au lieu d'en lancer une
//! chacune. L'ouverture d'une session attend la fin d'une reconnexion en
//! cours, mais pas les autres ouvertures.

use crate::error::{Result, StreamError};
use crate::models::Provider;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Établit une session auprès d'un fournisseur (bibliothèque externe)
#[async_trait]
pub trait Authenticator: Send + Sync {
    type Credential: Send + Sync + 'static;

    async fn authenticate(&self) -> Result<Self::Credential>;
}

struct CredentialState<C> {
    current: Option<Arc<C>>,
    generation: u64,
}

pub struct ProviderCredential<A: Authenticator + ?Sized> {
    provider: Provider,
    authenticator: Arc<A>,
    state: RwLock<CredentialState<A::Credential>>,
    /// Une seule ré-authentification à la fois
    reauth: Mutex<()>,
    /// Tenu en écriture pendant une reconnexion, en lecture pendant une opération
    gate: RwLock<()>,
}

impl<A: Authenticator + ?Sized> ProviderCredential<A> {
    pub fn new(provider: Provider, authenticator: Arc<A>) -> Self {
        Self {
            provider,
            authenticator,
            state: RwLock::new(CredentialState {
                current: None,
                generation: 0,
            }),
            reauth: Mutex::new(()),
            gate: RwLock::new(()),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Client externe du fournisseur
    pub fn api(&self) -> &Arc<A> {
        &self.authenticator
    }

    /// Nombre de (ré-)authentifications effectuées
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Authentifie immédiatement (appelé au démarrage)
    pub async fn establish(&self) -> Result<()> {
        let generation = self.generation().await;
        self.refresh(generation).await.map(|_| ())
    }

    /// Credential courant, établi à la demande
    pub async fn acquire(&self) -> Result<(Arc<A::Credential>, u64)> {
        let generation = {
            let state = self.state.read().await;
            if let Some(current) = &state.current {
                return Ok((current.clone(), state.generation));
            }
            state.generation
        };
        self.refresh(generation).await
    }

    /// Remplace le credential observé à la génération `stale`
    ///
    /// Si un autre appelant l'a déjà remplacé, son résultat est réutilisé.
    pub async fn refresh(&self, stale: u64) -> Result<(Arc<A::Credential>, u64)> {
        let _reauth = self.reauth.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != stale {
                debug!(provider = %self.provider, generation = state.generation, "reusing concurrent re-authentication");
                return match &state.current {
                    Some(current) => Ok((current.clone(), state.generation)),
                    None => Err(StreamError::auth(format!(
                        "{} re-authentication failed",
                        self.provider
                    ))),
                };
            }
        }

        let _gate = self.gate.write().await;
        info!(provider = %self.provider, "authenticating");
        let outcome = self.authenticator.authenticate().await;

        let mut state = self.state.write().await;
        state.generation += 1;
        match outcome {
            Ok(credential) => {
                let credential = Arc::new(credential);
                state.current = Some(credential.clone());
                info!(provider = %self.provider, generation = state.generation, "authenticated");
                Ok((credential, state.generation))
            }
            Err(err) => {
                state.current = None;
                warn!(provider = %self.provider, "authentication failed: {}", err);
                Err(match err {
                    StreamError::Auth { .. } => err,
                    other => StreamError::auth(other.to_string()),
                })
            }
        }
    }

    /// Exécute `op` avec le credential courant
    ///
    /// Une erreur d'authentification provoque une ré-authentification puis
    /// une seule nouvelle tentative.
    pub async fn with_credential<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<A::Credential>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (credential, generation) = self.acquire().await?;
        let first = {
            let _gate = self.gate.read().await;
            op(credential).await
        };

        match first {
            Err(err) if err.is_auth_error() => {
                warn!(provider = %self.provider, generation, "credential rejected, re-authenticating: {}", err);
                let (credential, _) = self.refresh(generation).await?;
                let _gate = self.gate.read().await;
                op(credential).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for Counting {
        type Credential = usize;

        async fn authenticate(&self) -> Result<usize> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(StreamError::upstream("login refused"))
            } else {
                Ok(n)
            }
        }
    }

    fn credential(fail: bool) -> Arc<ProviderCredential<Counting>> {
        Arc::new(ProviderCredential::new(
            Provider::Spotify,
            Arc::new(Counting {
                calls: AtomicUsize::new(0),
                fail,
            }),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let cred = credential(false);
        cred.establish().await.unwrap();
        let stale = cred.generation().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cred = cred.clone();
            handles.push(tokio::spawn(async move { cred.refresh(stale).await }));
        }
        for handle in handles {
            let (value, generation) = handle.await.unwrap().unwrap();
            assert_eq!(*value, 2);
            assert_eq!(generation, 2);
        }
        assert_eq!(cred.api().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_retries_once() {
        let cred = credential(false);
        let attempts = AtomicUsize::new(0);
        let result = cred
            .with_credential(|value| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(StreamError::auth("token expired"))
                    } else {
                        Ok(*value)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_auth_failure_is_surfaced() {
        let cred = credential(false);
        let attempts = AtomicUsize::new(0);
        let err = cred
            .with_credential(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StreamError::auth("still expired")) }
            })
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_authentication_reports_auth() {
        let cred = credential(true);
        let err = cred.acquire().await.unwrap_err();
        assert!(err.is_auth_error());
        // a later request tries again
        assert!(cred.acquire().await.is_err());
        assert_eq!(cred.api().calls.load(Ordering::SeqCst), 2);
    }
}
