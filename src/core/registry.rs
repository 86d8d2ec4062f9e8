//! Per-server listener and command registries
//!
//! Handlers are registered explicitly at setup time as boxed async callables
//! and live until removed. Registration volume is low and dispatch is
//! read-mostly, so everything sits behind `RwLock`s.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use crate::core::commands::CommandContext;
use crate::core::events::{ChatEvent, EntityEvent, TeamEvent};
use crate::identity::ServerIdentity;

pub type ChatHandler = Arc<dyn Fn(ChatEvent) -> BoxFuture<'static, ()> + Send + Sync>;
pub type TeamHandler = Arc<dyn Fn(TeamEvent) -> BoxFuture<'static, ()> + Send + Sync>;
pub type EntityHandler = Arc<dyn Fn(EntityEvent) -> BoxFuture<'static, ()> + Send + Sync>;
/// Raw-frame listeners receive every inbound frame's bytes before decoding.
pub type RawHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> BoxFuture<'static, ()> + Send + Sync>;
/// Custom predicate matching a command token when name and aliases miss.
pub type CommandMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Opaque token returned by event registration, usable for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct Listener<H> {
    id: u64,
    handler: H,
}

/// A registered chat command: handler plus its secondary match rules.
pub struct CommandEntry {
    pub handler: CommandHandler,
    pub aliases: Vec<String>,
    pub matcher: Option<CommandMatcher>,
}

/// All listener collections for every tracked server identity.
pub struct HandlerRegistry {
    next_id: AtomicU64,
    chat: RwLock<HashMap<ServerIdentity, Vec<Listener<ChatHandler>>>>,
    team: RwLock<HashMap<ServerIdentity, Vec<Listener<TeamHandler>>>>,
    entity: RwLock<HashMap<ServerIdentity, HashMap<u32, Vec<Listener<EntityHandler>>>>>,
    raw: RwLock<HashMap<ServerIdentity, Vec<Listener<RawHandler>>>>,
    commands: RwLock<HashMap<ServerIdentity, HashMap<String, CommandEntry>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            chat: RwLock::new(HashMap::new()),
            team: RwLock::new(HashMap::new()),
            entity: RwLock::new(HashMap::new()),
            raw: RwLock::new(HashMap::new()),
            commands: RwLock::new(HashMap::new()),
        }
    }

    fn next_handle(&self) -> ListenerHandle {
        ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn register_chat<F, Fut>(
        &self,
        identity: &ServerIdentity,
        handler: F,
    ) -> ListenerHandle
    where
        F: Fn(ChatEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.next_handle();
        let handler: ChatHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.chat
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .push(Listener {
                id: handle.0,
                handler,
            });
        handle
    }

    pub async fn register_team<F, Fut>(
        &self,
        identity: &ServerIdentity,
        handler: F,
    ) -> ListenerHandle
    where
        F: Fn(TeamEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.next_handle();
        let handler: TeamHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.team
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .push(Listener {
                id: handle.0,
                handler,
            });
        handle
    }

    pub async fn register_entity<F, Fut>(
        &self,
        identity: &ServerIdentity,
        entity_id: u32,
        handler: F,
    ) -> ListenerHandle
    where
        F: Fn(EntityEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.next_handle();
        let handler: EntityHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.entity
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .entry(entity_id)
            .or_default()
            .push(Listener {
                id: handle.0,
                handler,
            });
        handle
    }

    pub async fn register_raw<F, Fut>(
        &self,
        identity: &ServerIdentity,
        handler: F,
    ) -> ListenerHandle
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.next_handle();
        let handler: RawHandler = Arc::new(move |data| Box::pin(handler(data)));
        self.raw
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .push(Listener {
                id: handle.0,
                handler,
            });
        handle
    }

    /// Register a chat command under `name`, with optional aliases and an
    /// optional custom-match predicate.
    pub async fn register_command<F, Fut>(
        &self,
        identity: &ServerIdentity,
        name: impl Into<String>,
        aliases: Vec<String>,
        matcher: Option<CommandMatcher>,
        handler: F,
    ) where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: CommandHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.commands
            .write()
            .await
            .entry(identity.clone())
            .or_default()
            .insert(
                name.into(),
                CommandEntry {
                    handler,
                    aliases,
                    matcher,
                },
            );
    }

    pub async fn remove_chat(&self, identity: &ServerIdentity, handle: ListenerHandle) {
        if let Some(listeners) = self.chat.write().await.get_mut(identity) {
            listeners.retain(|l| l.id != handle.0);
        }
    }

    pub async fn remove_team(&self, identity: &ServerIdentity, handle: ListenerHandle) {
        if let Some(listeners) = self.team.write().await.get_mut(identity) {
            listeners.retain(|l| l.id != handle.0);
        }
    }

    pub async fn remove_entity(&self, identity: &ServerIdentity, handle: ListenerHandle) {
        if let Some(by_entity) = self.entity.write().await.get_mut(identity) {
            for listeners in by_entity.values_mut() {
                listeners.retain(|l| l.id != handle.0);
            }
        }
    }

    pub async fn remove_raw(&self, identity: &ServerIdentity, handle: ListenerHandle) {
        if let Some(listeners) = self.raw.write().await.get_mut(identity) {
            listeners.retain(|l| l.id != handle.0);
        }
    }

    pub async fn remove_command(&self, identity: &ServerIdentity, name: &str) {
        if let Some(commands) = self.commands.write().await.get_mut(identity) {
            commands.remove(name);
        }
    }

    /// Snapshot of chat listeners for dispatch.
    pub async fn chat_handlers(&self, identity: &ServerIdentity) -> Vec<ChatHandler> {
        self.chat
            .read()
            .await
            .get(identity)
            .map(|l| l.iter().map(|l| l.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn team_handlers(&self, identity: &ServerIdentity) -> Vec<TeamHandler> {
        self.team
            .read()
            .await
            .get(identity)
            .map(|l| l.iter().map(|l| l.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Listeners registered for one specific entity id.
    pub async fn entity_handlers(
        &self,
        identity: &ServerIdentity,
        entity_id: u32,
    ) -> Vec<EntityHandler> {
        self.entity
            .read()
            .await
            .get(identity)
            .and_then(|by_entity| by_entity.get(&entity_id))
            .map(|l| l.iter().map(|l| l.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn raw_handlers(&self, identity: &ServerIdentity) -> Vec<RawHandler> {
        self.raw
            .read()
            .await
            .get(identity)
            .map(|l| l.iter().map(|l| l.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Resolve a command token: exact name first, then alias, then custom
    /// predicate, in that order.
    pub async fn lookup_command(
        &self,
        identity: &ServerIdentity,
        token: &str,
    ) -> Option<(String, CommandHandler)> {
        let commands = self.commands.read().await;
        let table = commands.get(identity)?;

        if let Some(entry) = table.get(token) {
            return Some((token.to_string(), entry.handler.clone()));
        }
        for (name, entry) in table.iter() {
            if entry.aliases.iter().any(|a| a == token) {
                return Some((name.clone(), entry.handler.clone()));
            }
        }
        for (name, entry) in table.iter() {
            if let Some(matcher) = &entry.matcher {
                if matcher(token) {
                    return Some((name.clone(), entry.handler.clone()));
                }
            }
        }
        None
    }

    /// Drop every registration for one identity.
    pub async fn clear(&self, identity: &ServerIdentity) {
        self.chat.write().await.remove(identity);
        self.team.write().await.remove(identity);
        self.entity.write().await.remove(identity);
        self.raw.write().await.remove(identity);
        self.commands.write().await.remove(identity);
    }
}
