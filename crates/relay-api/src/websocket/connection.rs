//! 클라이언트 연결 핸들.
//!
//! 소켓 하나당 `ClientConnection` 하나가 만들어집니다. 핸들은 복제 가능하며
//! 동일성은 연결 ID로만 판단합니다. 실제 소켓 쓰기는 핸들러의 writer 태스크가
//! 담당하고, 핸들은 채널에 프레임을 넣기만 합니다. writer가 종료되면 채널이 닫히고
//! 다음 전송이 실패하므로 브로드캐스트가 이를 감지해 연결을 정리합니다.

use relay_core::RelayError;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// 연결 식별자.
pub type ConnectionId = Uuid;

/// 클라이언트 연결 핸들.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
}

impl ClientConnection {
    /// 새 연결 핸들과 송신 프레임 수신기를 생성합니다.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                outbound: tx,
            },
            rx,
        )
    }

    /// 연결 ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 직렬화된 텍스트 프레임 전송.
    pub fn send_text(&self, text: String) -> Result<(), RelayError> {
        self.outbound
            .send(text)
            .map_err(|_| RelayError::ConnectionClosed)
    }

    /// 메시지를 JSON으로 직렬화해 전송.
    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<(), RelayError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text)
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (connection, rx) = ClientConnection::new();
        assert!(connection.send_text("hello".to_string()).is_ok());

        drop(rx);
        assert!(matches!(
            connection.send_text("again".to_string()),
            Err(RelayError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_identity_is_by_id() {
        let (a, _rx_a) = ClientConnection::new();
        let (b, _rx_b) = ClientConnection::new();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_send_json_delivers_frame() {
        let (connection, mut rx) = ClientConnection::new();
        connection
            .send_json(&serde_json::json!({"type": "pong", "timestamp": 1}))
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, r#"{"timestamp":1,"type":"pong"}"#);
    }
}
