//! Association and story resolution against the directory service.
//!
//! The resolver memoizes associations by device signature and stories by
//! URL for the lifetime of the process, and coalesces concurrent lookups
//! for the same key into a single outbound request. Expected failures
//! (network, non-success status, malformed body) resolve to `None` through
//! the normal return path and are never cached, so a later call retries.

use crate::resolver::types::{
    extract_story_from_html, Associations, AssociationsEnvelope, ContextEnvelope, DeviceContext,
    DigitalTwin, Story, StoryOptions, StorySource, TwinOptions,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Request timeout for directory and story lookups.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Resolves device signatures to their digital twins.
///
/// All state is instance-owned; create one resolver per directory service
/// and share it behind an `Arc` as needed.
pub struct AssociationResolver {
    server_url: String,
    client: reqwest::Client,
    state: Mutex<ResolverState>,
}

/// Caches and in-flight request tables.
///
/// The mutex guarding this state is only ever held for map access, never
/// across an `.await`; request coalescing rides on the pending tables.
#[derive(Default)]
struct ResolverState {
    associations: HashMap<String, Associations>,
    stories: HashMap<String, Story>,
    pending_associations: HashMap<String, broadcast::Sender<Option<Associations>>>,
    pending_stories: HashMap<String, broadcast::Sender<Option<Story>>>,
}

impl AssociationResolver {
    /// Create a resolver for the given directory service base URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self::with_client(server_url, client)
    }

    /// Create a resolver with an injected HTTP client.
    pub fn with_client(server_url: impl Into<String>, client: reqwest::Client) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            server_url,
            client,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// The directory service base URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Resolve the associations for the given device signature.
    ///
    /// Returns the cached value when present. Otherwise issues (or joins)
    /// a single lookup for the signature; `None` means temporarily
    /// unknown, not a permanent negative.
    pub async fn resolve_associations(&self, signature: &str) -> Option<Associations> {
        if signature.is_empty() {
            return None;
        }

        let notify = {
            let mut state = self.state();

            if let Some(cached) = state.associations.get(signature) {
                return Some(cached.clone());
            }

            if let Some(pending) = state.pending_associations.get(signature) {
                let mut waiter = pending.subscribe();
                drop(state);
                return waiter.recv().await.ok().flatten();
            }

            let (notify, _) = broadcast::channel(1);
            state
                .pending_associations
                .insert(signature.to_string(), notify.clone());
            notify
        };

        let fetched = self.fetch_associations(signature).await;

        let result = {
            let mut state = self.state();
            state.pending_associations.remove(signature);

            match fetched {
                Some((canonical_signature, associations)) => {
                    state
                        .associations
                        .insert(signature.to_string(), associations.clone());
                    if canonical_signature != signature {
                        state
                            .associations
                            .insert(canonical_signature, associations.clone());
                    }
                    Some(associations)
                }
                None => None,
            }
        };

        // Fan the single result out to any coalesced waiters.
        let _ = notify.send(result.clone());
        result
    }

    /// Resolve the story at the given URL.
    ///
    /// Cache hits return immediately with `StorySource::Cache` unless
    /// `force_refetch` is set. Failures resolve to `None` and are not
    /// cached.
    pub async fn resolve_story(
        &self,
        url: &str,
        options: StoryOptions,
    ) -> Option<(Story, StorySource)> {
        if url.is_empty() {
            return None;
        }

        let notify = {
            let mut state = self.state();

            if !options.force_refetch {
                if let Some(cached) = state.stories.get(url) {
                    return Some((cached.clone(), StorySource::Cache));
                }
            }

            if let Some(pending) = state.pending_stories.get(url) {
                let mut waiter = pending.subscribe();
                drop(state);
                return waiter
                    .recv()
                    .await
                    .ok()
                    .flatten()
                    .map(|story| (story, StorySource::Network));
            }

            let (notify, _) = broadcast::channel(1);
            state.pending_stories.insert(url.to_string(), notify.clone());
            notify
        };

        let fetched = self.fetch_story(url).await;

        {
            let mut state = self.state();
            state.pending_stories.remove(url);
            if let Some(story) = &fetched {
                state.stories.insert(url.to_string(), story.clone());
            }
        }

        let _ = notify.send(fetched.clone());
        fetched.map(|story| (story, StorySource::Network))
    }

    /// Resolve a device's digital twin: associations plus their story.
    ///
    /// `None` only when the associations themselves fail to resolve; a
    /// missing or unresolvable story still yields a twin without one, and
    /// no story lookup is attempted when the associations carry no URL.
    pub async fn resolve_digital_twin(
        &self,
        signature: &str,
        options: TwinOptions,
    ) -> Option<DigitalTwin> {
        let associations = self.resolve_associations(signature).await?;

        let mut story = None;
        if options.fetch_story {
            if let Some(url) = associations.url.clone() {
                story = self
                    .resolve_story(
                        &url,
                        StoryOptions {
                            force_refetch: options.force_refetch,
                        },
                    )
                    .await
                    .map(|(story, _)| story);
            }
        }

        Some(DigitalTwin {
            associations,
            story,
        })
    }

    /// Fetch the real-time context for a device.
    ///
    /// Context is dynamic (nearest rankings change constantly) so no
    /// caching or coalescing applies.
    pub async fn resolve_context(&self, signature: &str) -> Option<DeviceContext> {
        if signature.is_empty() {
            return None;
        }

        let url = self.context_url(signature);
        let response = match self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%url, %error, "context request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "context lookup unsuccessful");
            return None;
        }

        let envelope: ContextEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!(%url, %error, "context response unparseable");
                return None;
            }
        };

        envelope.devices.into_iter().find_map(|(candidate, context)| {
            (candidate == signature).then_some(context)
        })
    }

    /// A cached associations record, without any network activity.
    pub fn cached_associations(&self, signature: &str) -> Option<Associations> {
        self.state().associations.get(signature).cloned()
    }

    /// A cached story, without any network activity.
    pub fn cached_story(&self, url: &str) -> Option<Story> {
        self.state().stories.get(url).cloned()
    }

    /// Perform the associations lookup and normalize the response.
    async fn fetch_associations(&self, signature: &str) -> Option<(String, Associations)> {
        let url = self.associations_url(signature);

        let response = match self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%url, %error, "associations request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "associations lookup unsuccessful");
            return None;
        }

        let envelope: AssociationsEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!(%url, %error, "associations response unparseable");
                return None;
            }
        };

        envelope.into_entry()
    }

    /// Perform the story lookup, handling both JSON and HTML responses.
    async fn fetch_story(&self, url: &str) -> Option<Story> {
        let response = match self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json, text/plain")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%url, %error, "story request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "story lookup unsuccessful");
            return None;
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            match response.json().await {
                Ok(document) => Story::parse(document),
                Err(error) => {
                    tracing::debug!(%url, %error, "story response unparseable");
                    None
                }
            }
        } else {
            match response.text().await {
                Ok(html) => extract_story_from_html(&html),
                Err(error) => {
                    tracing::debug!(%url, %error, "story body unreadable");
                    None
                }
            }
        }
    }

    fn associations_url(&self, signature: &str) -> String {
        format!("{}/associations/{signature}", self.server_url)
    }

    fn context_url(&self, signature: &str) -> String {
        format!("{}/context/device/{signature}", self.server_url)
    }

    fn state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().expect("resolver state lock poisoned")
    }
}

/// Blocking resolver for use in synchronous contexts.
pub struct BlockingResolver {
    inner: AssociationResolver,
    runtime: tokio::runtime::Runtime,
}

impl BlockingResolver {
    /// Create a blocking resolver for the given directory service URL.
    pub fn new(server_url: impl Into<String>) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            inner: AssociationResolver::new(server_url),
            runtime,
        })
    }

    /// Resolve the associations for the given device signature.
    pub fn resolve_associations(&self, signature: &str) -> Option<Associations> {
        self.runtime
            .block_on(self.inner.resolve_associations(signature))
    }

    /// Resolve the story at the given URL.
    pub fn resolve_story(&self, url: &str, options: StoryOptions) -> Option<(Story, StorySource)> {
        self.runtime.block_on(self.inner.resolve_story(url, options))
    }

    /// Resolve a device's digital twin.
    pub fn resolve_digital_twin(
        &self,
        signature: &str,
        options: TwinOptions,
    ) -> Option<DigitalTwin> {
        self.runtime
            .block_on(self.inner.resolve_digital_twin(signature, options))
    }

    /// Fetch the real-time context for a device.
    pub fn resolve_context(&self, signature: &str) -> Option<DeviceContext> {
        self.runtime.block_on(self.inner.resolve_context(signature))
    }

    /// The underlying async resolver.
    pub fn resolver(&self) -> &AssociationResolver {
        &self.inner
    }
}
