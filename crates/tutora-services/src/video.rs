//! Video room providers
//!
//! `HttpRoomProvider` talks to a hosted conferencing API over JSON/HTTP.
//! `LocalRoomProvider` keeps rooms in memory; it backs development setups
//! with video disabled and the test suite.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, instrument};
use tutora_core::config::VideoConfig;
use tutora_core::models::SessionType;
use tutora_core::traits::VideoRoomProvider;
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    mode: &'a str,
    max_participants: i32,
}

#[derive(Debug, Deserialize)]
struct CreateRoomResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    user_id: Uuid,
    display_name: &'a str,
    is_host: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Client for a hosted video API
pub struct HttpRoomProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl HttpRoomProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> AppResult<Self> {
        if base_url.is_empty() {
            return Err(AppError::Config("video base_url is required".to_string()));
        }

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("video client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_ms,
        })
    }

    pub fn from_config(config: &VideoConfig) -> AppResult<Self> {
        Self::new(&config.base_url, &config.api_key, config.timeout_ms)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::RoomProvisioning(format!("provider timed out after {}ms", self.timeout_ms))
        } else {
            AppError::RoomProvisioning(e.to_string())
        }
    }

    #[instrument(skip(self, body))]
    async fn post<B, R>(&self, path: &str, body: &B) -> AppResult<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Video provider request: POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            error!("Video provider HTTP error: status={}", status);
            return Err(AppError::RoomProvisioning(format!("provider returned {}", status)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AppError::RoomProvisioning(format!("unreadable provider response: {}", e)))
    }
}

#[async_trait]
impl VideoRoomProvider for HttpRoomProvider {
    async fn create_room(
        &self,
        room_name: &str,
        kind: SessionType,
        max_participants: i32,
    ) -> AppResult<String> {
        let mode = match kind {
            SessionType::Individual => "one_to_one",
            SessionType::Group => "group",
        };
        let created: CreateRoomResponse = self
            .post(
                "/rooms",
                &CreateRoomRequest {
                    name: room_name,
                    mode,
                    max_participants,
                },
            )
            .await?;
        Ok(created.id)
    }

    async fn generate_token(
        &self,
        room_id: &str,
        user_id: Uuid,
        display_name: &str,
        is_host: bool,
    ) -> AppResult<String> {
        let issued: TokenResponse = self
            .post(
                &format!("/rooms/{}/tokens", room_id),
                &TokenRequest {
                    user_id,
                    display_name,
                    is_host,
                },
            )
            .await?;
        Ok(issued.token)
    }

    async fn delete_room(&self, room_id: &str) -> AppResult<()> {
        let url = format!("{}/rooms/{}", self.base_url, room_id);
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // Already gone counts as deleted
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(AppError::RoomProvisioning(format!("room delete returned {}", s))),
        }
    }
}

#[derive(Debug, Clone)]
struct LocalRoom {
    name: String,
    max_participants: i32,
}

/// In-process rooms with opaque tokens
#[derive(Default)]
pub struct LocalRoomProvider {
    rooms: RwLock<HashMap<String, LocalRoom>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl LocalRoomProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a provisioning error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::RoomProvisioning("video provider unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VideoRoomProvider for LocalRoomProvider {
    async fn create_room(
        &self,
        room_name: &str,
        _kind: SessionType,
        max_participants: i32,
    ) -> AppResult<String> {
        self.check()?;
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.rooms.write().insert(
            id.clone(),
            LocalRoom {
                name: room_name.to_string(),
                max_participants,
            },
        );
        Ok(id)
    }

    async fn generate_token(
        &self,
        room_id: &str,
        user_id: Uuid,
        _display_name: &str,
        is_host: bool,
    ) -> AppResult<String> {
        self.check()?;
        let rooms = self.rooms.read();
        let room = rooms
            .get(room_id)
            .ok_or_else(|| AppError::RoomProvisioning(format!("unknown room {}", room_id)))?;
        let role = if is_host { "host" } else { "guest" };
        Ok(format!(
            "{}.{}.{}.{}.{}",
            room_id,
            room.name,
            user_id.simple(),
            role,
            room.max_participants
        ))
    }

    async fn delete_room(&self, room_id: &str) -> AppResult<()> {
        self.check()?;
        self.rooms.write().remove(room_id);
        Ok(())
    }
}
