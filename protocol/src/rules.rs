//! 规则引擎
//!
//! 组合各棋子的走法校验，提供将军、飞将、将死、困毙判断和合法走法枚举。
//! 所有"走后会怎样"的判断都在棋盘副本上模拟完成，不修改原棋盘。

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::RuleViolation;
use crate::piece::{Color, Piece, Position};
use crate::validators;

/// 走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// 起始位置
    pub from: Position,
    /// 目标位置
    pub to: Position,
}

impl Move {
    /// 创建新走法
    pub fn new(from: Position, to: Position) -> Self {
        Self { from, to }
    }
}

/// 规则引擎
pub struct RulesEngine;

impl RulesEngine {
    /// 两将是否在同一列且中间无子
    pub fn is_flying_general(board: &Board) -> bool {
        match (
            board.general_position(Color::Red),
            board.general_position(Color::Black),
        ) {
            (Some(red), Some(black)) => {
                red.file == black.file && board.count_between(red, black) == Some(0)
            }
            _ => false,
        }
    }

    /// 检查指定阵营是否被将军
    ///
    /// 没有将/帅时视为不被将军（将被吃掉的局面由会话直接结束）。
    pub fn is_in_check(board: &Board, color: Color) -> bool {
        let Some(general) = board.general_position(color) else {
            return false;
        };
        if Self::is_flying_general(board) {
            return true;
        }
        board
            .pieces(color.opponent())
            .any(|attacker| validators::is_pseudo_legal(&attacker, general, board))
    }

    /// 模拟走子后己方是否安全（不被将军、不飞将）
    fn leaves_mover_safe(board: &Board, piece: &Piece, to: Position) -> bool {
        let mut sim = board.clone();
        sim.move_piece(piece.position, to);
        !Self::is_flying_general(&sim) && !Self::is_in_check(&sim, piece.color)
    }

    /// 某枚棋子的全部合法落点
    pub fn legal_destinations(board: &Board, piece: &Piece) -> Vec<Position> {
        validators::pseudo_legal_destinations(piece, board)
            .into_iter()
            .filter(|&to| Self::leaves_mover_safe(board, piece, to))
            .collect()
    }

    /// 指定阵营的全部合法走法
    pub fn legal_moves(board: &Board, color: Color) -> Vec<Move> {
        let mut moves = Vec::with_capacity(64);
        for piece in board.pieces(color) {
            for to in Self::legal_destinations(board, &piece) {
                moves.push(Move::new(piece.position, to));
            }
        }
        moves
    }

    /// 是否至少有一步合法走法（找到即返回）
    pub fn has_legal_moves(board: &Board, color: Color) -> bool {
        board.pieces(color).any(|piece| {
            validators::pseudo_legal_destinations(&piece, board)
                .into_iter()
                .any(|to| Self::leaves_mover_safe(board, &piece, to))
        })
    }

    /// 检查是否被将死
    pub fn is_checkmate(board: &Board, color: Color) -> bool {
        Self::is_in_check(board, color) && !Self::has_legal_moves(board, color)
    }

    /// 检查是否被困毙（无子可动但未被将军，判负）
    pub fn is_stalemate(board: &Board, color: Color) -> bool {
        !Self::is_in_check(board, color) && !Self::has_legal_moves(board, color)
    }

    /// 校验 `mover` 一方的走法，返回第一个不满足的规则
    pub fn validate_move(
        board: &Board,
        mover: Color,
        from: Position,
        to: Position,
    ) -> Result<Piece, RuleViolation> {
        let piece = board
            .get(from)
            .ok_or(RuleViolation::NoPieceAtSource(from))?;
        if piece.color != mover {
            return Err(RuleViolation::CannotMoveOpponentPiece(from));
        }
        if !validators::is_pseudo_legal(&piece, to, board) {
            return Err(RuleViolation::InvalidMoveForPiece { from, to });
        }

        let mut sim = board.clone();
        sim.move_piece(from, to);
        if Self::is_flying_general(&sim) {
            return Err(RuleViolation::CreatesFlyingGeneral);
        }
        if Self::is_in_check(&sim, mover) {
            return Err(RuleViolation::ExposesOwnCheck);
        }
        Ok(piece)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::Fen;
    use crate::piece::PieceType;

    fn pos(file: u8, rank: u8) -> Position {
        Position::new_unchecked(file, rank)
    }

    fn board(fen: &str) -> Board {
        Fen::parse(fen).unwrap().board
    }

    #[test]
    fn test_initial_legal_moves() {
        let board = Board::initial();
        let moves = RulesEngine::legal_moves(&board, Color::Red);
        assert_eq!(moves.len(), 44);
        // 炮二平五
        assert!(moves.contains(&Move::new(pos(7, 2), pos(4, 2))));
        assert_eq!(RulesEngine::legal_moves(&board, Color::Black).len(), 44);
    }

    #[test]
    fn test_opening_horse_and_blocked_chariot() {
        let board = Board::initial();
        assert!(RulesEngine::validate_move(&board, Color::Red, pos(1, 0), pos(2, 2)).is_ok());
        assert_eq!(
            RulesEngine::validate_move(&board, Color::Red, pos(0, 0), pos(2, 2)),
            Err(RuleViolation::InvalidMoveForPiece {
                from: pos(0, 0),
                to: pos(2, 2)
            })
        );
    }

    #[test]
    fn test_validate_source_checks() {
        let board = Board::initial();
        assert_eq!(
            RulesEngine::validate_move(&board, Color::Red, pos(4, 4), pos(4, 5)),
            Err(RuleViolation::NoPieceAtSource(pos(4, 4)))
        );
        assert_eq!(
            RulesEngine::validate_move(&board, Color::Red, pos(0, 6), pos(0, 5)),
            Err(RuleViolation::CannotMoveOpponentPiece(pos(0, 6)))
        );
    }

    #[test]
    fn test_chariot_gives_check_on_open_file() {
        let mut board = Board::empty();
        board.place(PieceType::General, Color::Red, pos(4, 0)).unwrap();
        board.place(PieceType::General, Color::Black, pos(3, 9)).unwrap();
        board.place(PieceType::Chariot, Color::Black, pos(4, 5)).unwrap();
        assert!(RulesEngine::is_in_check(&board, Color::Red));

        for rank in 1..=4 {
            let mut blocked = board.clone();
            blocked
                .place(PieceType::Soldier, Color::Red, pos(4, rank))
                .unwrap();
            assert!(!RulesEngine::is_in_check(&blocked, Color::Red), "e{rank}");
        }
    }

    #[test]
    fn test_flying_general() {
        let mut board = Board::empty();
        board.place(PieceType::General, Color::Red, pos(4, 0)).unwrap();
        board.place(PieceType::General, Color::Black, pos(4, 9)).unwrap();
        assert!(RulesEngine::is_flying_general(&board));
        assert!(RulesEngine::is_in_check(&board, Color::Red));
        assert!(RulesEngine::is_in_check(&board, Color::Black));

        // 唯一的挡子不能离开 e 列
        board.place(PieceType::Chariot, Color::Red, pos(4, 4)).unwrap();
        assert!(!RulesEngine::is_flying_general(&board));
        let chariot = board.get(pos(4, 4)).unwrap();
        let moves = RulesEngine::legal_destinations(&board, &chariot);
        assert!(moves.iter().all(|p| p.file == 4));
        assert!(moves.contains(&pos(4, 8)));
        assert!(moves.contains(&pos(4, 1)));
        assert_eq!(
            RulesEngine::validate_move(&board, Color::Red, pos(4, 4), pos(0, 4)),
            Err(RuleViolation::CreatesFlyingGeneral)
        );
    }

    #[test]
    fn test_general_cannot_step_onto_open_file() {
        let board = board("4k4/9/9/9/9/9/9/9/9/3K5 r");
        let general = board.get(pos(3, 0)).unwrap();
        let moves = RulesEngine::legal_destinations(&board, &general);
        assert!(!moves.contains(&pos(4, 0)));
        assert!(moves.contains(&pos(3, 1)));
    }

    #[test]
    fn test_exposes_own_check() {
        // 红车挡在黑车与帅之间，横走会送将
        let board = board("3k5/9/9/9/4r4/9/9/4R4/9/4K4 r");
        assert_eq!(
            RulesEngine::validate_move(&board, Color::Red, pos(4, 2), pos(0, 2)),
            Err(RuleViolation::ExposesOwnCheck)
        );
        assert!(RulesEngine::validate_move(&board, Color::Red, pos(4, 2), pos(4, 5)).is_ok());
    }

    #[test]
    fn test_checkmate() {
        // 双车错杀
        let board = board("R3k4/R8/9/9/9/9/9/9/9/3K5 b");
        assert!(RulesEngine::is_in_check(&board, Color::Black));
        assert!(!RulesEngine::has_legal_moves(&board, Color::Black));
        assert!(RulesEngine::is_checkmate(&board, Color::Black));
        assert!(!RulesEngine::is_stalemate(&board, Color::Black));
    }

    #[test]
    fn test_stalemate_is_not_checkmate() {
        let board = board("4k4/3R5/9/9/9/9/9/9/9/3K1R3 b");
        assert!(!RulesEngine::is_in_check(&board, Color::Black));
        assert!(RulesEngine::is_stalemate(&board, Color::Black));
        assert!(!RulesEngine::is_checkmate(&board, Color::Black));
        assert!(RulesEngine::legal_moves(&board, Color::Black).is_empty());
    }

    #[test]
    fn test_missing_general_is_not_in_check() {
        let mut board = Board::empty();
        board.place(PieceType::Chariot, Color::Black, pos(4, 5)).unwrap();
        assert!(!RulesEngine::is_in_check(&board, Color::Red));
    }

    #[test]
    fn test_legal_moves_never_leave_general_exposed() {
        let fens = [
            crate::fen::INITIAL_FEN,
            "3k5/9/9/9/4r4/9/9/4R4/9/4K4 r",
            "r1bakab1r/9/1cn4c1/p1p1p1p1p/9/2P6/P3P1P1P/1C2B1NC1/9/RN1AKAB1R b",
            "2bak4/4a4/4b1n2/p3C4/2p6/6R2/P3P4/4B4/4A4/2BAK1c2 b",
            "4k4/4a4/9/9/9/9/9/9/4c4/3K5 r",
        ];
        for fen in fens {
            let state = Fen::parse(fen).unwrap();
            for color in Color::BOTH {
                for mv in RulesEngine::legal_moves(&state.board, color) {
                    let mut sim = state.board.clone();
                    sim.move_piece(mv.from, mv.to);
                    assert!(!RulesEngine::is_in_check(&sim, color), "{fen}: {mv:?}");
                    assert!(!RulesEngine::is_flying_general(&sim), "{fen}: {mv:?}");
                }
                assert!(
                    !(RulesEngine::is_checkmate(&state.board, color)
                        && RulesEngine::is_stalemate(&state.board, color))
                );
            }
        }
    }
}
