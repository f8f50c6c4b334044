//! 象棋对局共享协议库
//!
//! 包含:
//! - 棋子、棋盘、位置等核心数据结构
//! - 七种棋子的走法校验与规则引擎（将军、飞将、将死、困毙）
//! - 重复局面哈希 (Zobrist)
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 传输层抽象 (Connector, Connection, Listener traits) 与帧编解码
//! - 记谱格式 (坐标记谱, FEN, JSON 对局记录)

mod board;
mod constants;
mod error;
mod fen;
mod message;
mod notation;
mod piece;
mod record;
mod rules;
mod transport;
pub mod validators;
mod zobrist;

pub use board::{Board, BoardLayout};
pub use constants::*;
pub use error::{BoardError, ChessError, ProtocolError, Result, RuleViolation};
pub use fen::{Fen, FenPosition, INITIAL_FEN};
pub use message::{
    ClientMessage, ClockReading, DrawReason, ErrorCode, GameResult, PlayerId, RollbackBudgets,
    ServerMessage, SessionId, SessionSnapshot, WinReason,
};
pub use notation::parse_moves;
pub use piece::{Color, Piece, PieceId, PieceType, Position};
pub use record::{MoveRecord, SessionRecord, RECORD_VERSION};
pub use rules::{Move, RulesEngine};
pub use transport::{
    encode_frame, Connection, Connector, FrameHeader, FrameReader, FrameWriter, Listener,
    TcpConnection, TcpConnector, TcpListener,
};
pub use zobrist::{position_hash, ZobristTable};
