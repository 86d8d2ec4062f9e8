//! Public request API
//!
//! [`CompanionClient`] builds typed requests, runs them through admission
//! control and the transport, and decodes typed responses. Every failure
//! surfaces as a [`RequestError`] carrying the operation name and a
//! human-readable reason; callers never see a raw transport fault.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::core::commands::{CommandContext, CommandOptions};
use crate::core::events::{ChatEvent, EntityEvent, TeamEvent};
use crate::core::frame::{Request, RequestBody, ResponseBody, ServerFrame};
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::{CommandMatcher, HandlerRegistry, ListenerHandle};
use crate::core::transport::{ProxyOptions, Transport};
use crate::error::CompanionError;
use crate::identity::ServerIdentity;
use crate::models::{
    ChatMessage, EntityInfo, GameTime, MapData, MapMarker, ServerInfo, TeamInfo,
};
use crate::proxy::VersionCache;

/// A failed operation: which call failed and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub operation: &'static str,
    pub reason: String,
}

impl RequestError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error from {}: {}", self.operation, self.reason)
    }
}

impl Error for RequestError {}

type OperationResult<T> = std::result::Result<T, RequestError>;

/// Client facade over one server connection.
pub struct CompanionClient {
    identity: ServerIdentity,
    transport: Arc<Transport>,
    registry: Arc<HandlerRegistry>,
    rate_limiter: Arc<RateLimiter>,
}

impl CompanionClient {
    /// Build a client with its own rate limiter and registry.
    pub async fn new(config: ClientConfig) -> Self {
        Self::with_shared(config, Arc::new(RateLimiter::new()), Arc::new(HandlerRegistry::new()))
            .await
    }

    /// Build a client sharing a rate limiter and registry with other clients
    /// in the same process.
    pub async fn with_shared(
        config: ClientConfig,
        rate_limiter: Arc<RateLimiter>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let identity = config.identity.clone();
        rate_limiter.register(&identity).await;

        let command_options = config.command_prefix.map(CommandOptions::new);
        let mut transport = Transport::new(identity.clone(), command_options, registry.clone());
        if let Some(proxy) = config.proxy {
            transport = transport.with_proxy(ProxyOptions {
                base_url: proxy.base_url,
                version_cache: Arc::new(VersionCache::new(proxy.version_url)),
            });
        }

        Self {
            identity,
            transport: Arc::new(transport),
            registry,
            rate_limiter,
        }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub async fn connect(&self) -> crate::error::Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
        self.rate_limiter.unregister(&self.identity).await;
    }

    // ---- event and command registration --------------------------------

    pub async fn register_command<F, Fut>(
        &self,
        name: impl Into<String>,
        aliases: Vec<String>,
        matcher: Option<CommandMatcher>,
        handler: F,
    ) where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry
            .register_command(&self.identity, name, aliases, matcher, handler)
            .await;
    }

    pub async fn on_chat_event<F, Fut>(&self, handler: F) -> ListenerHandle
    where
        F: Fn(ChatEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register_chat(&self.identity, handler).await
    }

    pub async fn on_team_event<F, Fut>(&self, handler: F) -> ListenerHandle
    where
        F: Fn(TeamEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register_team(&self.identity, handler).await
    }

    pub async fn on_entity_event<F, Fut>(&self, entity_id: u32, handler: F) -> ListenerHandle
    where
        F: Fn(EntityEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry
            .register_entity(&self.identity, entity_id, handler)
            .await
    }

    pub async fn on_raw_frame<F, Fut>(&self, handler: F) -> ListenerHandle
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.register_raw(&self.identity, handler).await
    }

    // ---- operations ----------------------------------------------------

    /// Current in-game time.
    pub async fn get_time(&self) -> OperationResult<GameTime> {
        match self.roundtrip(RequestBody::GetTime).await? {
            ResponseBody::Time { time } => Ok(time),
            other => Err(unexpected("get_time", other)),
        }
    }

    /// General server information.
    pub async fn get_info(&self) -> OperationResult<ServerInfo> {
        match self.roundtrip(RequestBody::GetInfo).await? {
            ResponseBody::Info { info } => Ok(info),
            other => Err(unexpected("get_info", other)),
        }
    }

    /// Recent team-chat history.
    pub async fn get_team_chat(&self) -> OperationResult<Vec<ChatMessage>> {
        match self.roundtrip(RequestBody::GetTeamChat).await? {
            ResponseBody::TeamChat { messages } => Ok(messages),
            other => Err(unexpected("get_team_chat", other)),
        }
    }

    /// Current team roster and map notes.
    pub async fn get_team_info(&self) -> OperationResult<TeamInfo> {
        match self.roundtrip(RequestBody::GetTeamInfo).await? {
            ResponseBody::TeamInfo { team_info } => Ok(team_info),
            other => Err(unexpected("get_team_info", other)),
        }
    }

    /// All map markers currently active on the server.
    pub async fn get_map_markers(&self) -> OperationResult<Vec<MapMarker>> {
        match self.roundtrip(RequestBody::GetMapMarkers).await? {
            ResponseBody::MapMarkers { markers } => Ok(markers),
            other => Err(unexpected("get_map_markers", other)),
        }
    }

    /// Raw map payload: image bytes and monument placements.
    pub async fn get_map_data(&self) -> OperationResult<MapData> {
        match self.roundtrip(RequestBody::GetMap).await? {
            ResponseBody::Map { map } => Ok(map),
            other => Err(unexpected("get_map_data", other)),
        }
    }

    /// State of one smart entity.
    pub async fn get_entity_info(&self, entity_id: u32) -> OperationResult<EntityInfo> {
        match self
            .roundtrip(RequestBody::GetEntityInfo { entity_id })
            .await?
        {
            ResponseBody::EntityInfo { entity_info } => Ok(entity_info),
            other => Err(unexpected("get_entity_info", other)),
        }
    }

    /// Switch a smart entity on or off. No response is awaited.
    pub async fn set_entity_value(&self, entity_id: u32, value: bool) -> OperationResult<()> {
        self.fire(RequestBody::SetEntityValue { entity_id, value })
            .await
    }

    /// Subscribe to (or unsubscribe from) change broadcasts for an entity.
    /// No response is awaited.
    pub async fn set_subscription(&self, entity_id: u32, value: bool) -> OperationResult<()> {
        self.fire(RequestBody::SetSubscription { entity_id, value })
            .await
    }

    /// Whether this client is subscribed to an entity's broadcasts.
    pub async fn check_subscription(&self, entity_id: u32) -> OperationResult<bool> {
        match self
            .roundtrip(RequestBody::CheckSubscription { entity_id })
            .await?
        {
            ResponseBody::Flag { value } => Ok(value),
            other => Err(unexpected("check_subscription", other)),
        }
    }

    /// Hand team leadership to another member.
    pub async fn promote_to_leader(&self, steam_id: u64) -> OperationResult<()> {
        self.roundtrip(RequestBody::PromoteToLeader { steam_id })
            .await?;
        Ok(())
    }

    /// Send a message to the in-game team chat. No response is awaited.
    pub async fn send_team_message(&self, message: impl Into<String>) -> OperationResult<()> {
        self.fire(RequestBody::SendTeamMessage {
            message: message.into(),
        })
        .await
    }

    // ---- internals -----------------------------------------------------

    /// Admission loop: wait until both buckets can cover `cost`, sleeping
    /// the limiter's own estimate between attempts, never a fixed spin.
    async fn acquire_tokens(&self, operation: &'static str, cost: u32) -> OperationResult<()> {
        loop {
            let admitted = self
                .rate_limiter
                .can_consume(&self.identity, cost)
                .await
                .map_err(|e| RequestError::new(operation, e.to_string()))?;

            if admitted {
                match self.rate_limiter.consume(&self.identity, cost).await {
                    Ok(()) => return Ok(()),
                    // Lost the race to another caller; go around again.
                    Err(CompanionError::RateLimited(_)) => {}
                    Err(e) => return Err(RequestError::new(operation, e.to_string())),
                }
            }

            let wait = self
                .rate_limiter
                .estimated_wait(&self.identity, cost)
                .await
                .map_err(|e| RequestError::new(operation, e.to_string()))?;
            tokio::time::sleep(wait).await;
        }
    }

    fn build_request(&self, body: RequestBody) -> Request {
        Request {
            seq: self.transport.next_seq(),
            account_id: self.identity.account_id,
            account_token: self.identity.account_token,
            body,
        }
    }

    /// Rate-limit, send, and wait for the typed response payload.
    async fn roundtrip(&self, body: RequestBody) -> OperationResult<ResponseBody> {
        let operation = body.operation();
        self.acquire_tokens(operation, body.token_cost()).await?;
        let request = self.build_request(body);

        match self.transport.send_request(request).await {
            Ok(ServerFrame::Response { body, .. }) => Ok(body),
            Ok(ServerFrame::Error { error, .. }) => Err(RequestError::new(operation, error)),
            Ok(other) => Err(RequestError::new(
                operation,
                format!("unexpected frame: {:?}", other),
            )),
            Err(e) => Err(RequestError::new(operation, e.to_string())),
        }
    }

    /// Rate-limit and send without waiting for a response.
    async fn fire(&self, body: RequestBody) -> OperationResult<()> {
        let operation = body.operation();
        self.acquire_tokens(operation, body.token_cost()).await?;
        let request = self.build_request(body);

        self.transport
            .send(request)
            .await
            .map_err(|e| RequestError::new(operation, e.to_string()))
    }
}

fn unexpected(operation: &'static str, body: ResponseBody) -> RequestError {
    RequestError::new(operation, format!("unexpected response payload: {:?}", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display() {
        let err = RequestError::new("get_time", "No response received");
        assert_eq!(err.to_string(), "Error from get_time: No response received");
    }
}
