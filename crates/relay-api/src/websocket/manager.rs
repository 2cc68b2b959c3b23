//! 스트림 수명주기 관리.
//!
//! `ConnectionManager`는 N개의 클라이언트 연결을 스트림 키별 폴링 태스크 M개에
//! 다중화합니다. 연결 목록, 스트림 타입 레지스트리, base symbol 인덱스, 폴링 태스크,
//! 호가창 깊이 설정, 표시 심볼 별칭을 하나의 뮤텍스 아래에 두고 모든 변경을
//! 단일 임계 구역 안에서 처리합니다.
//!
//! 임계 구역 안에서는 절대 await하지 않습니다. 업스트림 조회와 소켓 전송은
//! 항상 락 밖에서 수행됩니다.
//!
//! # 불변 조건
//!
//! - 스트림 키에 연결이 1개 이상 있으면 폴링 태스크가 정확히 하나 존재합니다.
//! - 연결이 0개가 되면 태스크, 타입 엔트리, 인덱스 엔트리가 모두 제거됩니다.
//! - base symbol 그룹이 비면 같은 그룹으로 매핑되는 나머지 태스크도 정리됩니다.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};

use relay_core::{
    derive_base_symbol, MarketDataSource, RelayError, StreamKey, StreamSettings, StreamType,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::connection::{ClientConnection, ConnectionId};
use super::messages::ServerMessage;
use super::polling::{self, PollPlan, PollingTask};
use crate::metrics;

/// 스레드 간 공유 가능한 매니저.
pub type SharedConnectionManager = Arc<ConnectionManager>;

/// 수명주기 카운터.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    /// 시작된 폴링 태스크 수 (누적)
    pub tasks_started: u64,
    /// 중지된 폴링 태스크 수 (누적)
    pub tasks_stopped: u64,
    /// 용량 초과로 거절된 구독 수
    pub connections_rejected: u64,
    /// 전송 실패로 정리된 연결 수
    pub connections_pruned: u64,
}

/// 스트림 하나의 현재 상태.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub stream_key: StreamKey,
    pub stream_type: Option<StreamType>,
    pub base_symbol: Option<String>,
    pub subscribers: usize,
    pub polling: bool,
    /// 호가창 깊이 설정 (orderbook만)
    pub limit: Option<usize>,
    pub display_symbol: Option<String>,
}

/// 전체 스트림 상태 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct StreamsSnapshot {
    pub streams: Vec<StreamInfo>,
    pub total_connections: usize,
    pub active_tasks: usize,
    pub stats: LifecycleStats,
}

#[derive(Debug, Default)]
struct StreamState {
    /// 스트림 키 → 구독 연결 (등록 순서 유지)
    connections: HashMap<StreamKey, Vec<ClientConnection>>,
    /// 스트림 키 → 스트림 타입
    stream_types: HashMap<StreamKey, StreamType>,
    /// base symbol → 활성 스트림 키
    symbol_streams: HashMap<String, HashSet<StreamKey>>,
    /// 스트림 키 → 폴링 태스크
    tasks: HashMap<StreamKey, PollingTask>,
    /// 심볼 → 호가창 깊이. 구독이 모두 끊겨도 유지됩니다.
    limits: HashMap<String, usize>,
    /// 스트림 키 → 표시 심볼
    display_aliases: HashMap<StreamKey, String>,
    stats: LifecycleStats,
}

impl StreamState {
    /// 연결 하나를 제거하고 필요하면 스트림을 정리합니다.
    ///
    /// 제거되었으면 `true`. 키가 없거나 연결이 목록에 없으면 아무 것도 하지 않습니다.
    fn remove_connection(&mut self, id: ConnectionId, stream_key: &StreamKey) -> bool {
        let Some(connections) = self.connections.get_mut(stream_key) else {
            debug!(stream_key = %stream_key, "Disconnect for unknown stream ignored");
            return false;
        };
        let Some(position) = connections.iter().position(|c| c.id() == id) else {
            debug!(stream_key = %stream_key, connection_id = %id, "Connection not registered for stream");
            return false;
        };

        connections.remove(position);
        let remaining = connections.len();
        debug!(stream_key = %stream_key, connection_id = %id, remaining, "Client disconnected");

        if remaining == 0 {
            self.teardown_stream(stream_key);
        }
        true
    }

    /// 마지막 구독자가 떠난 스트림을 정리합니다.
    fn teardown_stream(&mut self, stream_key: &StreamKey) {
        self.connections.remove(stream_key);
        self.stop_streaming(stream_key);
        let stream_type = self.stream_types.remove(stream_key);

        let Some(base_symbol) = derive_base_symbol(stream_key.as_str(), stream_type) else {
            return;
        };

        let group_empty = match self.symbol_streams.get_mut(&base_symbol) {
            Some(keys) => {
                keys.remove(stream_key);
                keys.is_empty()
            }
            None => true,
        };

        if group_empty {
            self.symbol_streams.remove(&base_symbol);
            self.display_aliases.remove(stream_key);
            self.cascade_cleanup(&base_symbol, stream_key);
        }
    }

    /// 같은 base symbol로 매핑되는 나머지 태스크와 타입 엔트리를 정리합니다.
    ///
    /// 인덱스가 비었다면 그룹에 남은 태스크는 모두 구독자 없는 고아입니다.
    fn cascade_cleanup(&mut self, base_symbol: &str, removed: &StreamKey) {
        let orphans: BTreeSet<StreamKey> = self
            .tasks
            .keys()
            .chain(self.stream_types.keys())
            .filter(|key| *key != removed)
            .filter(|key| {
                derive_base_symbol(key.as_str(), self.stream_types.get(*key).copied()).as_deref()
                    == Some(base_symbol)
            })
            .cloned()
            .collect();

        for key in orphans {
            warn!(stream_key = %key, base_symbol, "Cleaning up orphaned stream");
            self.stop_streaming(&key);
            self.stream_types.remove(&key);
            self.display_aliases.remove(&key);
        }
    }

    /// 태스크가 있으면 취소하고 테이블에서 제거합니다.
    fn stop_streaming(&mut self, stream_key: &StreamKey) -> bool {
        // drop 시 취소 토큰이 발동됩니다.
        let Some(_task) = self.tasks.remove(stream_key) else {
            return false;
        };
        self.stats.tasks_stopped += 1;
        metrics::set_polling_tasks_active(self.tasks.len());
        info!(stream_key = %stream_key, "Polling stopped");
        true
    }
}

/// 스트림 수명주기 매니저.
pub struct ConnectionManager {
    state: Mutex<StreamState>,
    source: Arc<dyn MarketDataSource>,
    settings: StreamSettings,
    self_ref: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// 새 매니저를 생성합니다.
    ///
    /// 폴링 태스크는 매니저에 대한 약한 참조를 가지므로 항상 `Arc`로 생성됩니다.
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        settings: StreamSettings,
    ) -> SharedConnectionManager {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(StreamState::default()),
            source,
            settings,
            self_ref: self_ref.clone(),
        })
    }

    /// 스트림 설정.
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// 시장 데이터 소스 이름.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    // ==================== 연결 관리 ====================

    /// 연결을 스트림 키에 등록합니다.
    ///
    /// 키의 첫 구독자면 폴링 태스크를 시작합니다. 용량이 가득 찼으면 해당 연결에만
    /// 에러 메시지를 보내고 등록하지 않습니다. 등록되었으면 `true`.
    pub async fn connect(
        &self,
        connection: &ClientConnection,
        stream_key: &StreamKey,
        stream_type: StreamType,
        display_symbol: Option<&str>,
    ) -> bool {
        let mut state = self.state.lock().await;
        self.connect_locked(&mut state, connection, stream_key, stream_type, display_symbol)
    }

    /// 호가창 전용 진입점.
    ///
    /// 이미 구독 중인 심볼의 깊이가 바뀌면 기존 구독자를 유지한 채 폴링 태스크를
    /// 재시작합니다.
    pub async fn connect_orderbook(
        &self,
        connection: &ClientConnection,
        symbol: &str,
        display_symbol: Option<&str>,
        limit: usize,
    ) -> bool {
        let stream_key = StreamKey::orderbook(symbol);
        let mut state = self.state.lock().await;
        if Self::reject_type_conflict(&mut state, connection, &stream_key, StreamType::Orderbook) {
            return false;
        }

        let previous = state.limits.insert(symbol.to_string(), limit);
        let has_subscribers = state
            .connections
            .get(&stream_key)
            .is_some_and(|connections| !connections.is_empty());

        if has_subscribers && previous.is_some_and(|previous| previous != limit) {
            info!(
                stream_key = %stream_key,
                previous = ?previous,
                limit,
                "Orderbook depth changed, restarting polling"
            );
            state.stop_streaming(&stream_key);
            self.start_streaming(&mut state, &stream_key, StreamType::Orderbook);
        }

        self.connect_locked(
            &mut state,
            connection,
            &stream_key,
            StreamType::Orderbook,
            display_symbol,
        )
    }

    /// 연결을 스트림 키에서 제거합니다.
    ///
    /// 마지막 구독자였으면 폴링 태스크를 중지하고 관련 엔트리를 정리합니다.
    /// 모르는 키나 등록되지 않은 연결은 무시합니다.
    pub async fn disconnect(&self, connection: &ClientConnection, stream_key: &StreamKey) -> bool {
        let mut state = self.state.lock().await;
        state.remove_connection(connection.id(), stream_key)
    }

    /// 호가창 구독 해제.
    pub async fn disconnect_orderbook(&self, connection: &ClientConnection, symbol: &str) -> bool {
        self.disconnect(connection, &StreamKey::orderbook(symbol))
            .await
    }

    fn connect_locked(
        &self,
        state: &mut StreamState,
        connection: &ClientConnection,
        stream_key: &StreamKey,
        stream_type: StreamType,
        display_symbol: Option<&str>,
    ) -> bool {
        if Self::reject_type_conflict(state, connection, stream_key, stream_type) {
            return false;
        }

        if let Some(display_symbol) = display_symbol {
            state
                .display_aliases
                .entry(stream_key.clone())
                .or_insert_with(|| display_symbol.to_string());
        }

        let max = self.settings.max_connections_per_stream;
        let current = state.connections.get(stream_key).map_or(0, Vec::len);
        if current >= max {
            let rejection = RelayError::CapacityExceeded {
                stream_key: stream_key.to_string(),
                max,
            };
            warn!(stream_key = %stream_key, connection_id = %connection.id(), "{}", rejection);
            state.stats.connections_rejected += 1;
            metrics::record_connection_rejected(stream_type.as_str());

            if let Err(e) = connection.send_json(&ServerMessage::error(rejection.to_string())) {
                debug!(connection_id = %connection.id(), error = %e, "Rejected client already gone");
            }
            return false;
        }

        let connections = state.connections.entry(stream_key.clone()).or_default();
        let newly_added = !connections.iter().any(|c| c.id() == connection.id());
        if newly_added {
            connections.push(connection.clone());
        }
        let subscribers = connections.len();

        state.stream_types.insert(stream_key.clone(), stream_type);
        if let Some(base_symbol) = derive_base_symbol(stream_key.as_str(), Some(stream_type)) {
            state
                .symbol_streams
                .entry(base_symbol)
                .or_default()
                .insert(stream_key.clone());
        }

        info!(
            stream_key = %stream_key,
            stream_type = %stream_type,
            connection_id = %connection.id(),
            subscribers,
            "Client connected"
        );

        if newly_added && subscribers == 1 {
            self.start_streaming(state, stream_key, stream_type);
        }
        true
    }

    /// 이미 다른 타입으로 등록된 키에 대한 구독을 거절합니다.
    ///
    /// 키 하나의 타입은 등록부터 정리까지 바뀌지 않습니다. 거절되면 해당 연결에만
    /// 에러 메시지를 보내고 `true`를 반환합니다.
    fn reject_type_conflict(
        state: &mut StreamState,
        connection: &ClientConnection,
        stream_key: &StreamKey,
        stream_type: StreamType,
    ) -> bool {
        let Some(registered) = state.stream_types.get(stream_key).copied() else {
            return false;
        };
        if registered == stream_type {
            return false;
        }

        let rejection = RelayError::InvalidStream(format!(
            "stream {} is already registered as {}",
            stream_key, registered
        ));
        warn!(
            stream_key = %stream_key,
            connection_id = %connection.id(),
            requested = %stream_type,
            %registered,
            "Stream type conflict, subscription rejected"
        );
        state.stats.connections_rejected += 1;
        metrics::record_connection_rejected(stream_type.as_str());

        if let Err(e) = connection.send_json(&ServerMessage::error(rejection.to_string())) {
            debug!(connection_id = %connection.id(), error = %e, "Rejected client already gone");
        }
        true
    }

    // ==================== 폴링 ====================

    fn start_streaming(&self, state: &mut StreamState, stream_key: &StreamKey, stream_type: StreamType) {
        if state.tasks.contains_key(stream_key) {
            warn!(stream_key = %stream_key, "Polling task already running");
            return;
        }
        if PollPlan::resolve(stream_key, stream_type).is_none() {
            error!(
                stream_key = %stream_key,
                stream_type = %stream_type,
                "Stream key cannot be polled, no task started"
            );
            return;
        }

        let period = match stream_type {
            StreamType::Orderbook => self.settings.orderbook_interval(),
            StreamType::Ticker => self.settings.ticker_interval(),
            StreamType::Candles => self.settings.candles_interval(),
        };

        let task = polling::spawn_polling_loop(
            self.self_ref.clone(),
            stream_key.clone(),
            stream_type,
            period,
        );
        state.tasks.insert(stream_key.clone(), task);
        state.stats.tasks_started += 1;
        metrics::set_polling_tasks_active(state.tasks.len());

        info!(stream_key = %stream_key, stream_type = %stream_type, ?period, "Polling started");
    }

    /// 스트림 키 하나에 대해 틱을 한 번 실행합니다.
    ///
    /// 조회 실패는 구독자에게 에러 메시지로 전달되고 태스크는 계속 실행됩니다.
    /// 등록이 해제된 키는 조용히 건너뜁니다.
    pub async fn poll_once(&self, stream_key: &StreamKey) {
        let (stream_type, plan, display_symbol, limit) = {
            let state = self.state.lock().await;
            let Some(stream_type) = state.stream_types.get(stream_key).copied() else {
                debug!(stream_key = %stream_key, "Stream no longer registered, skipping tick");
                return;
            };
            let Some(plan) = PollPlan::resolve(stream_key, stream_type) else {
                return;
            };
            let limit = self
                .settings
                .clamp_orderbook_limit(state.limits.get(plan.symbol()).copied());
            (
                stream_type,
                plan,
                state.display_aliases.get(stream_key).cloned(),
                limit,
            )
        };

        let update =
            polling::fetch_update(self.source.as_ref(), &plan, display_symbol.as_deref(), limit)
                .await;

        match update {
            Ok(Some(message)) => {
                self.broadcast_to_stream(stream_key, &message).await;
            }
            Ok(None) => {
                debug!(stream_key = %stream_key, "No data this tick");
            }
            Err(e) => {
                let retryable = matches!(&e, RelayError::Source(source) if source.is_retryable());
                error!(stream_key = %stream_key, error = %e, retryable, "Polling tick failed");
                metrics::record_tick_error(stream_type.as_str());
                self.broadcast_to_stream(stream_key, &ServerMessage::error(e.to_string()))
                    .await;
            }
        }
    }

    // ==================== 브로드캐스트 ====================

    /// 스트림 키의 모든 구독자에게 메시지를 보냅니다.
    ///
    /// 전송에 실패한 연결은 일반 disconnect 경로로 정리됩니다. 전달된 연결 수를 반환합니다.
    pub async fn broadcast_to_stream<T: Serialize + ?Sized>(
        &self,
        stream_key: &StreamKey,
        message: &T,
    ) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!(stream_key = %stream_key, error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        let connections = {
            let state = self.state.lock().await;
            match state.connections.get(stream_key) {
                Some(connections) => connections.clone(),
                None => return 0,
            }
        };

        let failed: Vec<usize> = connections
            .iter()
            .enumerate()
            .filter_map(|(index, connection)| match connection.send_text(text.clone()) {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        stream_key = %stream_key,
                        connection_id = %connection.id(),
                        error = %e,
                        "Send failed, pruning connection"
                    );
                    Some(index)
                }
            })
            .collect();

        if !failed.is_empty() {
            let mut state = self.state.lock().await;
            let mut pruned = 0;
            for index in failed.iter().rev() {
                if state.remove_connection(connections[*index].id(), stream_key) {
                    pruned += 1;
                }
            }
            state.stats.connections_pruned += pruned;
            metrics::record_broadcast_send_failures(failed.len());
        }

        connections.len() - failed.len()
    }

    /// `broadcast_to_stream`의 별칭.
    pub async fn broadcast_to_symbol<T: Serialize + ?Sized>(
        &self,
        symbol: &str,
        message: &T,
    ) -> usize {
        self.broadcast_to_stream(&StreamKey::new(symbol), message)
            .await
    }

    // ==================== 조회 ====================

    /// 스트림 키의 구독자 수.
    pub async fn subscriber_count(&self, stream_key: &StreamKey) -> usize {
        let state = self.state.lock().await;
        state.connections.get(stream_key).map_or(0, Vec::len)
    }

    /// 스트림 키에 폴링 태스크가 있는지 여부.
    pub async fn is_streaming(&self, stream_key: &StreamKey) -> bool {
        self.state.lock().await.tasks.contains_key(stream_key)
    }

    /// 등록된 스트림 타입.
    pub async fn stream_type(&self, stream_key: &StreamKey) -> Option<StreamType> {
        self.state.lock().await.stream_types.get(stream_key).copied()
    }

    /// base symbol 그룹의 활성 스트림 키 (정렬됨).
    pub async fn active_streams(&self, base_symbol: &str) -> Vec<StreamKey> {
        let state = self.state.lock().await;
        let mut keys: Vec<StreamKey> = state
            .symbol_streams
            .get(base_symbol)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// 심볼의 호가창 깊이 설정.
    pub async fn limit_override(&self, symbol: &str) -> Option<usize> {
        self.state.lock().await.limits.get(symbol).copied()
    }

    /// 스트림 키의 표시 심볼.
    pub async fn display_symbol(&self, stream_key: &StreamKey) -> Option<String> {
        self.state.lock().await.display_aliases.get(stream_key).cloned()
    }

    /// 활성 폴링 태스크 수.
    pub async fn active_task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// 수명주기 카운터.
    pub async fn stats(&self) -> LifecycleStats {
        self.state.lock().await.stats
    }

    /// 현재 상태 스냅샷.
    pub async fn snapshot(&self) -> StreamsSnapshot {
        let state = self.state.lock().await;

        let keys: BTreeSet<&StreamKey> = state
            .connections
            .keys()
            .chain(state.stream_types.keys())
            .chain(state.tasks.keys())
            .collect();

        let streams = keys
            .into_iter()
            .map(|key| {
                let stream_type = state.stream_types.get(key).copied();
                StreamInfo {
                    stream_key: key.clone(),
                    stream_type,
                    base_symbol: derive_base_symbol(key.as_str(), stream_type),
                    subscribers: state.connections.get(key).map_or(0, Vec::len),
                    polling: state.tasks.get(key).is_some_and(PollingTask::is_running),
                    limit: match stream_type {
                        Some(StreamType::Orderbook) => state.limits.get(key.as_str()).copied(),
                        _ => None,
                    },
                    display_symbol: state.display_aliases.get(key).cloned(),
                }
            })
            .collect();

        StreamsSnapshot {
            streams,
            total_connections: state.connections.values().map(Vec::len).sum(),
            active_tasks: state.tasks.len(),
            stats: state.stats,
        }
    }

    /// 모든 폴링 태스크를 중지합니다. 연결 목록은 유지됩니다.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let count = state.tasks.len();
        state.tasks.clear();
        state.stats.tasks_stopped += count as u64;
        metrics::set_polling_tasks_active(0);
        info!(count, "All polling tasks stopped");
    }
}
