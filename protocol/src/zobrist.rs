//! Zobrist 哈希
//!
//! 用于重复局面检测：同一棋面且同一走子方得到相同哈希值

use std::sync::OnceLock;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::board::Board;
use crate::constants::BOARD_SQUARES;
use crate::piece::{Color, PieceType, Position};

/// Zobrist 哈希表
///
/// 使用随机数为每个位置的每种棋子生成唯一的哈希值
pub struct ZobristTable {
    /// 棋子哈希值 [color][piece_type][position]
    pieces: [[[u64; BOARD_SQUARES]; 7]; 2],
    /// 黑方走子时叠加的哈希值
    side_to_move: u64,
}

impl ZobristTable {
    /// 创建新的 Zobrist 表（使用固定种子保证确定性）
    pub fn new() -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF_CAFE_1234);

        let mut pieces = [[[0u64; BOARD_SQUARES]; 7]; 2];
        for color in pieces.iter_mut() {
            for piece in color.iter_mut() {
                for square in piece.iter_mut() {
                    *square = rng.gen();
                }
            }
        }

        Self {
            pieces,
            side_to_move: rng.gen(),
        }
    }

    /// 进程内共享的哈希表
    pub fn global() -> &'static ZobristTable {
        static TABLE: OnceLock<ZobristTable> = OnceLock::new();
        TABLE.get_or_init(ZobristTable::new)
    }

    /// 计算棋盘的完整哈希值
    pub fn hash(&self, board: &Board, side_to_move: Color) -> u64 {
        let mut hash = board.all_pieces().fold(0u64, |acc, piece| {
            acc ^ self.piece_hash(piece.color, piece.piece_type, piece.position)
        });
        if side_to_move == Color::Black {
            hash ^= self.side_to_move;
        }
        hash
    }

    /// 获取棋子的哈希值
    #[inline]
    pub fn piece_hash(&self, color: Color, piece_type: PieceType, pos: Position) -> u64 {
        self.pieces[color.index()][piece_type.index()][pos.index()]
    }
}

impl Default for ZobristTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 用共享表计算局面哈希
pub fn position_hash(board: &Board, side_to_move: Color) -> u64 {
    ZobristTable::global().hash(board, side_to_move)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zobrist_deterministic() {
        let board = Board::initial();
        let hash1 = ZobristTable::new().hash(&board, Color::Red);
        let hash2 = ZobristTable::new().hash(&board, Color::Red);
        assert_eq!(hash1, hash2);
        assert_eq!(hash1, position_hash(&board, Color::Red));
    }

    #[test]
    fn test_zobrist_different_positions() {
        let board = Board::initial();
        let mut moved = board.clone();
        moved.move_piece(Position::new_unchecked(1, 2), Position::new_unchecked(1, 4));
        assert_ne!(
            position_hash(&board, Color::Black),
            position_hash(&moved, Color::Black)
        );
    }

    #[test]
    fn test_zobrist_side_matters() {
        let board = Board::initial();
        assert_ne!(
            position_hash(&board, Color::Red),
            position_hash(&board, Color::Black)
        );
    }

    #[test]
    fn test_zobrist_ignores_piece_identity() {
        // 两匹马互换位置后棋面不变，哈希也不变
        let mut board = Board::initial();
        let before = position_hash(&board, Color::Red);
        let left = board.remove(Position::new_unchecked(1, 0)).unwrap();
        let right = board.remove(Position::new_unchecked(7, 0)).unwrap();
        board
            .restore(moved_to(left, Position::new_unchecked(7, 0)))
            .unwrap();
        board
            .restore(moved_to(right, Position::new_unchecked(1, 0)))
            .unwrap();
        assert_eq!(position_hash(&board, Color::Red), before);
    }

    fn moved_to(mut piece: crate::piece::Piece, at: Position) -> crate::piece::Piece {
        piece.position = at;
        piece
    }
}
