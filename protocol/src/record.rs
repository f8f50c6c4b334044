//! 对局记录格式
//!
//! 走法日志是唯一的事实来源：从初始局面完整回放即可得到任意时刻的棋盘。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::ChessError;
use crate::fen::{Fen, INITIAL_FEN};
use crate::message::{GameResult, PlayerId, SessionId};
use crate::piece::{PieceType, Position};
use crate::rules::{Move, RulesEngine};

/// 记录格式版本
pub const RECORD_VERSION: &str = "1.0";

/// 走法记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 步数（从 1 开始，严格递增）
    pub move_number: u32,
    pub from: Position,
    pub to: Position,
    pub piece_type: PieceType,
    /// 被吃的棋子类型；bincode 不自描述，不能省略字段
    #[serde(default)]
    pub captured: Option<PieceType>,
    pub player_id: PlayerId,
    /// 走后对方是否被将军
    pub is_check: bool,
    pub timestamp: DateTime<Utc>,
}

impl MoveRecord {
    pub fn as_move(&self) -> Move {
        Move::new(self.from, self.to)
    }
}

/// 一局结束后交给持久化的完整记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// 版本号
    pub version: String,
    pub session_id: SessionId,
    pub red_player: PlayerId,
    pub black_player: PlayerId,
    pub result: GameResult,
    /// 胜方玩家 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<PlayerId>,
    /// 初始局面 FEN
    pub initial_fen: String,
    /// 终局 FEN
    pub final_fen: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// 走法列表
    pub moves: Vec<MoveRecord>,
}

impl SessionRecord {
    /// 从初始局面回放全部走法，得到终局棋盘
    ///
    /// 每一步都重新经过规则校验，记录被篡改时返回出错的步数。
    pub fn replay(&self) -> Result<Board, ChessError> {
        let start = Fen::parse(&self.initial_fen)?;
        // 标准开局用固定 ID 摆法，保证与对局中的棋子身份一致
        let mut board = if self.initial_fen == INITIAL_FEN {
            Board::initial()
        } else {
            start.board
        };
        let mut turn = start.side_to_move;

        for (i, record) in self.moves.iter().enumerate() {
            let expected = i as u32 + 1;
            if record.move_number != expected {
                return Err(ChessError::InvalidRecord {
                    move_number: record.move_number,
                    reason: format!("expected move number {expected}"),
                });
            }
            RulesEngine::validate_move(&board, turn, record.from, record.to).map_err(|e| {
                ChessError::InvalidRecord {
                    move_number: record.move_number,
                    reason: e.to_string(),
                }
            })?;
            board.move_piece(record.from, record.to);
            turn = turn.opponent();
        }
        Ok(board)
    }

    /// 转换为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 坐标记谱文本，每回合一行
    pub fn to_move_text(&self) -> String {
        let mut output = String::new();
        for (i, pair) in self.moves.chunks(2).enumerate() {
            output.push_str(&format!("{}. {}", i + 1, pair[0].as_move()));
            if let Some(reply) = pair.get(1) {
                output.push_str(&format!(" {}", reply.as_move()));
            }
            output.push('\n');
        }
        output
    }
}
