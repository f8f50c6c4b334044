//! 错误类型定义

use thiserror::Error;

use crate::piece::Position;

/// 记谱、FEN 等解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChessError {
    /// 无效的坐标记谱
    #[error("Invalid notation: {notation:?}")]
    InvalidNotation { notation: String },

    /// 无效的 FEN 字符串
    #[error("Invalid FEN string: {reason}")]
    InvalidFen { reason: String },

    /// 棋盘构造失败
    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    /// 对局记录无法回放
    #[error("Invalid record at move {move_number}: {reason}")]
    InvalidRecord { move_number: u32, reason: String },
}

/// 棋盘原语错误（不涉及规则）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// 位置越界
    #[error("Position {0:?} is off the board")]
    OutOfBounds(Position),

    /// 目标位置已有棋子
    #[error("Square {0} is already occupied")]
    Occupied(Position),

    /// 某方棋子数量超过上限
    #[error("Too many pieces for one side")]
    SideFull,

    /// 棋子 ID 已用尽
    #[error("Piece ids exhausted")]
    IdsExhausted,

    /// 同一 ID 的棋子已在棋盘上
    #[error("Piece id {0} is already on the board")]
    DuplicateId(u8),

    /// 一方出现第二个将/帅
    #[error("Side already has a general")]
    DuplicateGeneral,
}

/// 走法校验失败原因（只回复给出错的一方，不改变状态）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 起点没有棋子
    #[error("No piece at {0}")]
    NoPieceAtSource(Position),

    /// 不能移动对方棋子
    #[error("Piece at {0} belongs to the opponent")]
    CannotMoveOpponentPiece(Position),

    /// 不符合该棋子走法
    #[error("Illegal move {from} -> {to} for this piece")]
    InvalidMoveForPiece { from: Position, to: Position },

    /// 走后己方被将军
    #[error("Move would leave own general in check")]
    ExposesOwnCheck,

    /// 走后两将对面
    #[error("Move would leave the generals facing each other")]
    CreatesFlyingGeneral,
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// 帧已完整读出、仅消息体无法解码：连接仍可继续使用
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Bincode(_))
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
