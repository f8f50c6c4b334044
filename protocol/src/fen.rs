//! FEN 格式解析和生成
//!
//! 中国象棋 FEN 格式：
//! `<棋盘> <走子方> <无吃子步数> <回合数>`，后两项可省略
//!
//! 示例：
//! `rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR r 0 1`

use crate::board::Board;
use crate::error::ChessError;
use crate::piece::{Color, PieceType, Position};

/// 初始局面 FEN
pub const INITIAL_FEN: &str = "rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR r 0 1";

/// FEN 描述的局面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenPosition {
    pub board: Board,
    pub side_to_move: Color,
    /// 无吃子半回合数
    pub no_capture_plies: u32,
    /// 回合数（从 1 开始）
    pub round: u32,
}

/// FEN 格式处理
pub struct Fen;

impl Fen {
    /// 解析 FEN 字符串
    pub fn parse(fen: &str) -> Result<FenPosition, ChessError> {
        let mut parts = fen.split_whitespace();
        let board_part = parts.next().ok_or_else(|| invalid("Empty FEN string"))?;
        let board = Self::parse_board(board_part)?;

        let side_to_move = match parts.next() {
            None => Color::Red,
            Some(s) => {
                let mut chars = s.chars();
                match (chars.next().and_then(Color::from_fen_char), chars.next()) {
                    (Some(color), None) => color,
                    _ => return Err(invalid(format!("Invalid side to move: {s}"))),
                }
            }
        };

        let no_capture_plies = match parts.next() {
            None => 0,
            Some(s) => s
                .parse()
                .map_err(|_| invalid(format!("Invalid no-capture count: {s}")))?,
        };
        let round = match parts.next() {
            None => 1,
            Some(s) => s
                .parse()
                .map_err(|_| invalid(format!("Invalid round number: {s}")))?,
        };

        Ok(FenPosition {
            board,
            side_to_move,
            no_capture_plies,
            round,
        })
    }

    /// 解析棋盘部分
    fn parse_board(board_str: &str) -> Result<Board, ChessError> {
        let mut board = Board::empty();
        let rows: Vec<&str> = board_str.split('/').collect();

        if rows.len() != 10 {
            return Err(invalid(format!("Expected 10 rows, got {}", rows.len())));
        }

        // FEN 从上到下是 rank 9 到 rank 0
        for (row_idx, row) in rows.iter().enumerate() {
            let rank = 9 - row_idx as u8;
            let mut file = 0u8;

            for c in row.chars() {
                if file >= 9 {
                    return Err(invalid(format!("Row {row_idx} has too many columns")));
                }

                if let Some(empty) = c.to_digit(10).filter(|d| (1..=9).contains(d)) {
                    file += empty as u8;
                } else if let Some((piece_type, color)) = PieceType::from_fen_char(c) {
                    board.place(piece_type, color, Position::new_unchecked(file, rank))?;
                    file += 1;
                } else {
                    return Err(invalid(format!("Invalid piece character: {c}")));
                }
            }

            if file != 9 {
                return Err(invalid(format!(
                    "Row {row_idx} has {file} columns, expected 9"
                )));
            }
        }

        Ok(board)
    }

    /// 将局面转换为 FEN 字符串
    pub fn to_string(position: &FenPosition) -> String {
        format!(
            "{} {} {} {}",
            Self::board_to_string(&position.board),
            position.side_to_move.to_fen_char(),
            position.no_capture_plies,
            position.round
        )
    }

    /// 将棋盘转换为 FEN 棋盘部分
    pub fn board_to_string(board: &Board) -> String {
        let mut rows = Vec::with_capacity(10);

        for rank in (0..10).rev() {
            let mut row = String::new();
            let mut empty_count = 0;

            for file in 0..9 {
                if let Some(piece) = board.get(Position::new_unchecked(file, rank)) {
                    if empty_count > 0 {
                        row.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    row.push(piece.to_fen_char());
                } else {
                    empty_count += 1;
                }
            }

            if empty_count > 0 {
                row.push_str(&empty_count.to_string());
            }

            rows.push(row);
        }

        rows.join("/")
    }
}

fn invalid(reason: impl Into<String>) -> ChessError {
    ChessError::InvalidFen {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;

    #[test]
    fn test_parse_initial_fen() {
        let position = Fen::parse(INITIAL_FEN).unwrap();

        assert_eq!(position.side_to_move, Color::Red);
        assert_eq!(
            Fen::board_to_string(&position.board),
            Fen::board_to_string(&Board::initial())
        );

        let general = position.board.get(Position::new_unchecked(4, 9)).unwrap();
        assert_eq!(general.piece_type, PieceType::General);
        assert_eq!(general.color, Color::Black);
    }

    #[test]
    fn test_fen_roundtrip() {
        let position = Fen::parse(INITIAL_FEN).unwrap();
        assert_eq!(Fen::to_string(&position), INITIAL_FEN);
    }

    #[test]
    fn test_parse_custom_fen() {
        let position = Fen::parse("4k4/9/9/9/9/9/9/9/9/4K4 b 10 5").unwrap();

        assert_eq!(position.side_to_move, Color::Black);
        assert_eq!(position.no_capture_plies, 10);
        assert_eq!(position.round, 5);
        assert_eq!(
            position.board.general_position(Color::Red),
            Some(Position::new_unchecked(4, 0))
        );
        assert_eq!(
            position.board.general_position(Color::Black),
            Some(Position::new_unchecked(4, 9))
        );
    }

    #[test]
    fn test_board_only_defaults() {
        let position = Fen::parse("4k4/9/9/9/9/9/9/9/9/4K4").unwrap();
        assert_eq!(position.side_to_move, Color::Red);
        assert_eq!(position.no_capture_plies, 0);
        assert_eq!(position.round, 1);
    }

    #[test]
    fn test_invalid_fen() {
        assert!(Fen::parse("").is_err());
        // 行数不对
        assert!(Fen::parse("4k4/9/9").is_err());
        // 列数不对
        assert!(Fen::parse("4k44/9/9/9/9/9/9/9/9/4K4 r").is_err());
        // 无效字符
        assert!(Fen::parse("4x4/9/9/9/9/9/9/9/9/4K4 r").is_err());
        // 无效走子方
        assert!(Fen::parse("4k4/9/9/9/9/9/9/9/9/4K4 x").is_err());
        assert!(Fen::parse("4k4/9/9/9/9/9/9/9/9/4K4 r z").is_err());
    }

    #[test]
    fn test_two_generals_rejected() {
        assert_eq!(
            Fen::parse("3kk4/9/9/9/9/9/9/9/9/4K4 r"),
            Err(ChessError::Board(BoardError::DuplicateGeneral))
        );
    }
}
