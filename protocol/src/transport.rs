//! 对局消息的传输
//!
//! 帧格式：1 字节协议版本 + 4 字节大端长度 + bincode 消息体。
//! 消息体解码失败时整帧已被读走，连接可以继续使用；
//! 版本不符或帧过大时无法再找到下一帧的边界，只能断开。

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::constants::{CONNECT_TIMEOUT, MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};

/// 一条双向的消息连接
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()>;

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M>;

    /// 远端地址，仅用于日志
    fn peer_addr(&self) -> Option<String>;
}

/// 客户端发起连接
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 服务端接受连接
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    async fn bind(addr: &str) -> Result<Self>;

    async fn accept(&mut self) -> Result<Self::Conn>;

    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// 帧
// ============================================================================

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub length: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 5;

    pub fn encode(self) -> [u8; Self::SIZE] {
        let [a, b, c, d] = self.length.to_be_bytes();
        [self.version, a, b, c, d]
    }

    /// 解析并检查帧头，失败时连接已无法继续
    pub fn decode(bytes: [u8; Self::SIZE]) -> Result<Self> {
        let header = Self {
            version: bytes[0],
            length: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        };
        if header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: header.version,
            });
        }
        check_size(header.length as usize)?;
        Ok(header)
    }
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// 把一条消息编码成完整的帧
pub fn encode_frame<M: Serialize>(msg: &M) -> Result<Vec<u8>> {
    let payload = bincode::serialize(msg)?;
    check_size(payload.len())?;

    let header = FrameHeader {
        version: PROTOCOL_VERSION,
        length: payload.len() as u32,
    };
    let mut frame = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// 按帧读取消息
pub struct FrameReader<R> {
    inner: R,
    body: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            body: Vec::new(),
        }
    }

    pub async fn read_frame<M: DeserializeOwned>(&mut self) -> Result<M> {
        let mut raw = [0u8; FrameHeader::SIZE];
        self.inner.read_exact(&mut raw).await.map_err(read_error)?;
        let header = FrameHeader::decode(raw)?;

        self.body.resize(header.length as usize, 0);
        self.inner
            .read_exact(&mut self.body)
            .await
            .map_err(read_error)?;

        Ok(bincode::deserialize(&self.body)?)
    }
}

fn read_error(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset => {
            ProtocolError::ConnectionClosed
        }
        _ => ProtocolError::Io(e),
    }
}

/// 按帧写出消息
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// 帧头与消息体一次写出
    pub async fn write_frame<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let frame = encode_frame(msg)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// TCP
// ============================================================================

pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;
        TcpConnection::new(stream)
    }
}

/// 一条 TCP 连接；服务端拆成读写两半分别交给读循环和写任务
pub struct TcpConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer_addr: Option<String>,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            peer_addr,
        })
    }

    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.reader.read_frame().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

pub struct TcpListener {
    inner: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, _) = self.inner.accept().await?;
        TcpConnection::new(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.inner.local_addr().ok().map(|a| a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientMessage, ErrorCode, ServerMessage};
    use crate::piece::Position;

    fn chariot_move() -> ClientMessage {
        ClientMessage::Move {
            from: "a0".parse::<Position>().unwrap(),
            to: "a1".parse::<Position>().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_tcp_connection() {
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut conn = TcpConnector.connect(&addr).await.unwrap();
            conn.send(&chariot_move()).await.unwrap();
            let msg: ServerMessage = conn.recv().await.unwrap();
            assert_eq!(msg, ServerMessage::HeartbeatAck);
        });

        let mut conn = listener.accept().await.unwrap();
        assert!(conn.peer_addr().is_some());
        let msg: ClientMessage = conn.recv().await.unwrap();
        assert_eq!(msg, chariot_move());
        conn.send(&ServerMessage::HeartbeatAck).await.unwrap();

        client.await.unwrap();
    }

    #[test]
    fn test_encoded_frame_layout() {
        let frame = encode_frame(&ClientMessage::Heartbeat).unwrap();
        let header = FrameHeader::decode(frame[..FrameHeader::SIZE].try_into().unwrap()).unwrap();
        assert_eq!(header.version, PROTOCOL_VERSION);
        assert_eq!(header.length as usize, frame.len() - FrameHeader::SIZE);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_recoverable() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server);

        // 合法帧头 + 无法解码的消息体，紧跟一帧正常消息
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            length: 4,
        };
        client.write_all(&header.encode()).await.unwrap();
        client.write_all(&[0xff; 4]).await.unwrap();
        client
            .write_all(&encode_frame(&ClientMessage::Resign).unwrap())
            .await
            .unwrap();

        let err = reader.read_frame::<ClientMessage>().await.unwrap_err();
        assert!(err.is_recoverable());
        let next: ClientMessage = reader.read_frame().await.unwrap();
        assert_eq!(next, ClientMessage::Resign);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let bytes = FrameHeader {
            version: PROTOCOL_VERSION + 1,
            length: 0,
        }
        .encode();
        let err = FrameHeader::decode(bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::VersionMismatch { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_fatal() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server);
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            length: MAX_FRAME_SIZE as u32 + 1,
        };
        client.write_all(&header.encode()).await.unwrap();

        let err = reader.read_frame::<ClientMessage>().await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_peer_close_reports_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server);
        let err = reader.read_frame::<ClientMessage>().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_rejection_survives_the_wire() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let msg = ServerMessage::rejected(ErrorCode::MalformedMessage, "bad frame");
        writer.write_frame(&msg).await.unwrap();
        assert_eq!(reader.read_frame::<ServerMessage>().await.unwrap(), msg);
    }
}
