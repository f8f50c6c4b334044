//! 七种棋子的走法校验
//!
//! 只看几何走法（伪合法），不关心轮次、将军与飞将。
//! 棋子种类是封闭集合，按 `PieceType` 穷举分派。

use crate::board::Board;
use crate::piece::{Piece, PieceType, Position};

const ORTHOGONAL: [(i8, i8); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
const DIAGONAL: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// 马的 8 个落点及对应马腿
const HORSE_JUMPS: [((i8, i8), (i8, i8)); 8] = [
    ((1, 2), (0, 1)),
    ((-1, 2), (0, 1)),
    ((2, 1), (1, 0)),
    ((2, -1), (1, 0)),
    ((1, -2), (0, -1)),
    ((-1, -2), (0, -1)),
    ((-2, 1), (-1, 0)),
    ((-2, -1), (-1, 0)),
];

/// 生成棋子的全部伪合法落点
pub fn pseudo_legal_destinations(piece: &Piece, board: &Board) -> Vec<Position> {
    let mut out = Vec::with_capacity(17);
    match piece.piece_type {
        PieceType::General => general_destinations(piece, board, &mut out),
        PieceType::Advisor => advisor_destinations(piece, board, &mut out),
        PieceType::Elephant => elephant_destinations(piece, board, &mut out),
        PieceType::Horse => horse_destinations(piece, board, &mut out),
        PieceType::Chariot => chariot_destinations(piece, board, &mut out),
        PieceType::Cannon => cannon_destinations(piece, board, &mut out),
        PieceType::Soldier => soldier_destinations(piece, board, &mut out),
    }
    out
}

/// 判断棋子能否（伪合法地）走到 `to`
pub fn is_pseudo_legal(piece: &Piece, to: Position, board: &Board) -> bool {
    let from = piece.position;
    if !to.in_bounds() || from == to || board.is_friendly(to, piece.color) {
        return false;
    }
    let df = to.file as i8 - from.file as i8;
    let dr = to.rank as i8 - from.rank as i8;

    match piece.piece_type {
        PieceType::General => df.abs() + dr.abs() == 1 && to.in_palace(piece.color),
        PieceType::Advisor => df.abs() == 1 && dr.abs() == 1 && to.in_palace(piece.color),
        PieceType::Elephant => {
            df.abs() == 2
                && dr.abs() == 2
                && to.is_own_side(piece.color)
                && from
                    .offset(df / 2, dr / 2)
                    .is_some_and(|eye| !board.has_piece(eye))
        }
        PieceType::Horse => {
            let leg = match (df.abs(), dr.abs()) {
                (1, 2) => (0, dr.signum()),
                (2, 1) => (df.signum(), 0),
                _ => return false,
            };
            from.offset(leg.0, leg.1)
                .is_some_and(|leg| !board.has_piece(leg))
        }
        PieceType::Chariot => board.count_between(from, to) == Some(0),
        PieceType::Cannon => {
            let screens = board.count_between(from, to);
            if board.has_piece(to) {
                screens == Some(1)
            } else {
                screens == Some(0)
            }
        }
        PieceType::Soldier => {
            let forward = piece.color.forward();
            if df == 0 && dr == forward {
                true
            } else {
                dr == 0 && df.abs() == 1 && from.crossed_river(piece.color)
            }
        }
    }
}

/// 目标为空或敌子时加入落点
fn push_if_open(piece: &Piece, board: &Board, to: Position, out: &mut Vec<Position>) {
    if !board.is_friendly(to, piece.color) {
        out.push(to);
    }
}

fn general_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for (df, dr) in ORTHOGONAL {
        if let Some(to) = piece.position.offset(df, dr) {
            if to.in_palace(piece.color) {
                push_if_open(piece, board, to, out);
            }
        }
    }
}

fn advisor_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for (df, dr) in DIAGONAL {
        if let Some(to) = piece.position.offset(df, dr) {
            if to.in_palace(piece.color) {
                push_if_open(piece, board, to, out);
            }
        }
    }
}

fn elephant_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for (df, dr) in DIAGONAL {
        // 象眼被堵
        let Some(eye) = piece.position.offset(df, dr) else {
            continue;
        };
        if board.has_piece(eye) {
            continue;
        }
        if let Some(to) = piece.position.offset(df * 2, dr * 2) {
            if to.is_own_side(piece.color) {
                push_if_open(piece, board, to, out);
            }
        }
    }
}

fn horse_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for ((df, dr), (lf, lr)) in HORSE_JUMPS {
        // 蹩马腿
        let Some(leg) = piece.position.offset(lf, lr) else {
            continue;
        };
        if board.has_piece(leg) {
            continue;
        }
        if let Some(to) = piece.position.offset(df, dr) {
            push_if_open(piece, board, to, out);
        }
    }
}

fn chariot_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for (df, dr) in ORTHOGONAL {
        let mut current = piece.position;
        while let Some(to) = current.offset(df, dr) {
            if board.has_piece(to) {
                push_if_open(piece, board, to, out);
                break;
            }
            out.push(to);
            current = to;
        }
    }
}

fn cannon_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    for (df, dr) in ORTHOGONAL {
        let mut current = piece.position;
        let mut screened = false;
        while let Some(to) = current.offset(df, dr) {
            if board.has_piece(to) {
                if screened {
                    // 隔一子打
                    push_if_open(piece, board, to, out);
                    break;
                }
                screened = true;
            } else if !screened {
                out.push(to);
            }
            current = to;
        }
    }
}

fn soldier_destinations(piece: &Piece, board: &Board, out: &mut Vec<Position>) {
    if let Some(to) = piece.position.offset(0, piece.color.forward()) {
        push_if_open(piece, board, to, out);
    }
    if piece.position.crossed_river(piece.color) {
        for df in [-1, 1] {
            if let Some(to) = piece.position.offset(df, 0) {
                push_if_open(piece, board, to, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::Fen;
    use crate::piece::Color;

    fn pos(file: u8, rank: u8) -> Position {
        Position::new_unchecked(file, rank)
    }

    /// 在空棋盘上放一枚棋子，另外附加若干棋子
    fn setup(
        piece_type: PieceType,
        color: Color,
        at: Position,
        others: &[(PieceType, Color, Position)],
    ) -> (Board, Piece) {
        let mut board = Board::empty();
        let id = board.place(piece_type, color, at).unwrap();
        for (t, c, p) in others {
            board.place(*t, *c, *p).unwrap();
        }
        let piece = board.piece(id).unwrap();
        (board, piece)
    }

    #[test]
    fn test_general_moves() {
        let (board, general) = setup(PieceType::General, Color::Red, pos(4, 1), &[]);
        assert_eq!(pseudo_legal_destinations(&general, &board).len(), 4);

        let (board, general) = setup(PieceType::General, Color::Red, pos(3, 0), &[]);
        let mut moves = pseudo_legal_destinations(&general, &board);
        moves.sort();
        assert_eq!(moves, vec![pos(3, 1), pos(4, 0)]);
    }

    #[test]
    fn test_general_stays_in_palace() {
        let (board, general) = setup(PieceType::General, Color::Black, pos(5, 7), &[]);
        let moves = pseudo_legal_destinations(&general, &board);
        assert!(moves.iter().all(|p| p.in_palace(Color::Black)));
        assert!(!is_pseudo_legal(&general, pos(5, 6), &board));
        assert!(!is_pseudo_legal(&general, pos(6, 7), &board));
    }

    #[test]
    fn test_advisor_moves() {
        let (board, advisor) = setup(PieceType::Advisor, Color::Red, pos(4, 1), &[]);
        assert_eq!(pseudo_legal_destinations(&advisor, &board).len(), 4);

        let (board, advisor) = setup(PieceType::Advisor, Color::Red, pos(3, 0), &[]);
        assert_eq!(pseudo_legal_destinations(&advisor, &board), vec![pos(4, 1)]);
    }

    #[test]
    fn test_elephant_eye_blocked() {
        let (board, elephant) = setup(
            PieceType::Elephant,
            Color::Red,
            pos(2, 0),
            &[(PieceType::Soldier, Color::Black, pos(3, 1))],
        );
        assert_eq!(pseudo_legal_destinations(&elephant, &board), vec![pos(0, 2)]);
        assert!(!is_pseudo_legal(&elephant, pos(4, 2), &board));
    }

    #[test]
    fn test_elephant_cannot_cross_river() {
        let (board, elephant) = setup(PieceType::Elephant, Color::Red, pos(4, 4), &[]);
        let moves = pseudo_legal_destinations(&elephant, &board);
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|p| p.rank < 5));
        assert!(!is_pseudo_legal(&elephant, pos(6, 6), &board));

        let (board, elephant) = setup(PieceType::Elephant, Color::Black, pos(2, 5), &[]);
        assert!(!is_pseudo_legal(&elephant, pos(4, 3), &board));
        assert!(is_pseudo_legal(&elephant, pos(4, 7), &board));
    }

    #[test]
    fn test_horse_moves_and_leg() {
        let (board, horse) = setup(PieceType::Horse, Color::Red, pos(4, 4), &[]);
        assert_eq!(pseudo_legal_destinations(&horse, &board).len(), 8);

        // 马腿 (4,5) 堵住向上的两个落点
        let (board, horse) = setup(
            PieceType::Horse,
            Color::Red,
            pos(4, 4),
            &[(PieceType::Soldier, Color::Black, pos(4, 5))],
        );
        let moves = pseudo_legal_destinations(&horse, &board);
        assert_eq!(moves.len(), 6);
        assert!(!moves.contains(&pos(3, 6)));
        assert!(!moves.contains(&pos(5, 6)));
    }

    #[test]
    fn test_horse_destination_occupancy_does_not_block() {
        // 落点上有敌子可吃，有己子不可去，但都不算蹩腿
        let (board, horse) = setup(
            PieceType::Horse,
            Color::Red,
            pos(4, 4),
            &[
                (PieceType::Chariot, Color::Black, pos(5, 6)),
                (PieceType::Chariot, Color::Red, pos(3, 6)),
            ],
        );
        assert!(is_pseudo_legal(&horse, pos(5, 6), &board));
        assert!(!is_pseudo_legal(&horse, pos(3, 6), &board));
        assert_eq!(pseudo_legal_destinations(&horse, &board).len(), 7);
    }

    #[test]
    fn test_chariot_slides_and_captures_first() {
        let (board, chariot) = setup(PieceType::Chariot, Color::Red, pos(4, 4), &[]);
        assert_eq!(pseudo_legal_destinations(&chariot, &board).len(), 17);

        let (board, chariot) = setup(
            PieceType::Chariot,
            Color::Red,
            pos(4, 4),
            &[
                (PieceType::Soldier, Color::Black, pos(4, 6)),
                (PieceType::Soldier, Color::Black, pos(4, 8)),
                (PieceType::Soldier, Color::Red, pos(6, 4)),
            ],
        );
        assert!(is_pseudo_legal(&chariot, pos(4, 6), &board));
        assert!(!is_pseudo_legal(&chariot, pos(4, 8), &board));
        assert!(!is_pseudo_legal(&chariot, pos(6, 4), &board));
        assert!(is_pseudo_legal(&chariot, pos(5, 4), &board));
        assert!(!is_pseudo_legal(&chariot, pos(5, 5), &board));
    }

    #[test]
    fn test_cannon_needs_exactly_one_screen() {
        let (board, cannon) = setup(
            PieceType::Cannon,
            Color::Red,
            pos(4, 0),
            &[
                (PieceType::Soldier, Color::Red, pos(4, 3)),
                (PieceType::Horse, Color::Black, pos(4, 6)),
                (PieceType::Chariot, Color::Black, pos(4, 9)),
            ],
        );
        let moves = pseudo_legal_destinations(&cannon, &board);
        // 非吃子走法与车相同，被炮架挡住
        assert!(moves.contains(&pos(4, 2)));
        assert!(!moves.contains(&pos(4, 3)));
        assert!(!moves.contains(&pos(4, 4)));
        // 一个炮架：可以打
        assert!(moves.contains(&pos(4, 6)));
        assert!(is_pseudo_legal(&cannon, pos(4, 6), &board));
        // 两个炮架：不能打
        assert!(!moves.contains(&pos(4, 9)));
        assert!(!is_pseudo_legal(&cannon, pos(4, 9), &board));
    }

    #[test]
    fn test_cannon_cannot_capture_without_screen() {
        let (board, cannon) = setup(
            PieceType::Cannon,
            Color::Red,
            pos(4, 4),
            &[(PieceType::Soldier, Color::Black, pos(4, 8))],
        );
        assert!(!is_pseudo_legal(&cannon, pos(4, 8), &board));
        assert!(is_pseudo_legal(&cannon, pos(4, 7), &board));
    }

    #[test]
    fn test_soldier_before_river() {
        let (board, soldier) = setup(PieceType::Soldier, Color::Red, pos(4, 3), &[]);
        assert_eq!(pseudo_legal_destinations(&soldier, &board), vec![pos(4, 4)]);
        assert!(!is_pseudo_legal(&soldier, pos(5, 3), &board));
    }

    #[test]
    fn test_soldier_after_river_never_backward() {
        let (board, soldier) = setup(PieceType::Soldier, Color::Red, pos(4, 5), &[]);
        assert_eq!(pseudo_legal_destinations(&soldier, &board).len(), 3);
        assert!(!is_pseudo_legal(&soldier, pos(4, 4), &board));

        let (board, soldier) = setup(PieceType::Soldier, Color::Black, pos(4, 4), &[]);
        let moves = pseudo_legal_destinations(&soldier, &board);
        assert_eq!(moves.len(), 3);
        assert!(moves.contains(&pos(4, 3)));
        assert!(!is_pseudo_legal(&soldier, pos(4, 5), &board));
    }

    #[test]
    fn test_soldier_on_last_rank() {
        let (board, soldier) = setup(PieceType::Soldier, Color::Red, pos(0, 9), &[]);
        assert_eq!(pseudo_legal_destinations(&soldier, &board), vec![pos(1, 9)]);
    }

    #[test]
    fn test_destinations_agree_with_point_checks() {
        let fens = [
            crate::fen::INITIAL_FEN,
            "r1bakab1r/9/1cn4c1/p1p1p1p1p/9/2P6/P3P1P1P/1C2B1NC1/9/RN1AKAB1R b",
            "3k5/4a4/4b4/2R1c4/9/2n6/4P4/3A5/4A4/4K4 r",
        ];
        for fen in fens {
            let state = Fen::parse(fen).unwrap();
            for piece in state.board.all_pieces() {
                let moves = pseudo_legal_destinations(&piece, &state.board);
                for to in Position::all() {
                    assert_eq!(
                        moves.contains(&to),
                        is_pseudo_legal(&piece, to, &state.board),
                        "{:?} at {} -> {} in {}",
                        piece.piece_type,
                        piece.position,
                        to,
                        fen
                    );
                }
            }
        }
    }
}
