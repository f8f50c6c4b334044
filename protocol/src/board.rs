//! 棋盘状态
//!
//! 90 格扁平数组 + 按阵营维护的棋子列表 + 将帅位置索引。
//! 整个结构是定长值，复制不做堆分配，规则引擎可以随意复制后模拟走子。
//! 这里只提供无条件的摆放/移除/移动，合法性由规则引擎负责。

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_SQUARES, MAX_PIECES_PER_SIDE, MAX_PIECE_IDS};
use crate::error::BoardError;
use crate::piece::{Color, Piece, PieceId, PieceType, Position};

/// 定长棋子列表（某一方在棋盘上的棋子）
#[derive(Debug, Clone, Copy)]
struct PieceList {
    ids: [PieceId; MAX_PIECES_PER_SIDE],
    len: u8,
}

impl PieceList {
    const fn new() -> Self {
        Self {
            ids: [PieceId(0); MAX_PIECES_PER_SIDE],
            len: 0,
        }
    }

    fn as_slice(&self) -> &[PieceId] {
        &self.ids[..self.len as usize]
    }

    fn push(&mut self, id: PieceId) -> Result<(), BoardError> {
        if self.len as usize >= MAX_PIECES_PER_SIDE {
            return Err(BoardError::SideFull);
        }
        self.ids[self.len as usize] = id;
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, id: PieceId) {
        if let Some(i) = self.as_slice().iter().position(|&x| x == id) {
            let last = self.len as usize - 1;
            self.ids.swap(i, last);
            self.len -= 1;
        }
    }
}

/// 棋盘
///
/// 不变式：棋子在 `squares` 中出现当且仅当它出现在恰好一方的棋子列表里，
/// `generals` 与棋盘上的将帅位置一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "BoardLayout", try_from = "BoardLayout")]
pub struct Board {
    squares: [Option<PieceId>; BOARD_SQUARES],
    roster: [Option<Piece>; MAX_PIECE_IDS],
    lists: [PieceList; 2],
    generals: [Option<Position>; 2],
    next_id: u8,
}

/// 标准开局摆法（红方视角，rank 0 一行）
const BACK_RANK: [PieceType; 9] = [
    PieceType::Chariot,
    PieceType::Horse,
    PieceType::Elephant,
    PieceType::Advisor,
    PieceType::General,
    PieceType::Advisor,
    PieceType::Elephant,
    PieceType::Horse,
    PieceType::Chariot,
];

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            squares: [None; BOARD_SQUARES],
            roster: [None; MAX_PIECE_IDS],
            lists: [PieceList::new(); 2],
            generals: [None; 2],
            next_id: 0,
        }
    }

    /// 创建初始棋盘（每方 16 子）
    pub fn initial() -> Self {
        let mut board = Self::empty();
        for color in Color::BOTH {
            let (back, cannon, soldier) = match color {
                Color::Red => (0, 2, 3),
                Color::Black => (9, 7, 6),
            };
            for (file, piece_type) in BACK_RANK.iter().enumerate() {
                board.put_initial(*piece_type, color, file as u8, back);
            }
            board.put_initial(PieceType::Cannon, color, 1, cannon);
            board.put_initial(PieceType::Cannon, color, 7, cannon);
            for file in (0..9).step_by(2) {
                board.put_initial(PieceType::Soldier, color, file, soldier);
            }
        }
        board
    }

    fn put_initial(&mut self, piece_type: PieceType, color: Color, file: u8, rank: u8) {
        // 空棋盘上的标准摆法不会越界或冲突
        let _ = self.place(piece_type, color, Position::new_unchecked(file, rank));
    }

    /// 摆放一枚新棋子，分配新的棋子 ID
    pub fn place(
        &mut self,
        piece_type: PieceType,
        color: Color,
        pos: Position,
    ) -> Result<PieceId, BoardError> {
        if self.next_id as usize >= MAX_PIECE_IDS {
            return Err(BoardError::IdsExhausted);
        }
        let id = PieceId(self.next_id);
        self.restore(Piece::new(id, piece_type, color, pos))?;
        Ok(id)
    }

    /// 按原 ID 放回一枚棋子（回滚或反序列化使用）
    pub fn restore(&mut self, piece: Piece) -> Result<(), BoardError> {
        let pos = piece.position;
        if piece.id.index() >= MAX_PIECE_IDS {
            return Err(BoardError::IdsExhausted);
        }
        if !pos.in_bounds() {
            return Err(BoardError::OutOfBounds(pos));
        }
        if self.squares[pos.index()].is_some() {
            return Err(BoardError::Occupied(pos));
        }
        if self.roster[piece.id.index()].is_some() {
            return Err(BoardError::DuplicateId(piece.id.0));
        }
        if piece.piece_type == PieceType::General && self.generals[piece.color.index()].is_some() {
            return Err(BoardError::DuplicateGeneral);
        }

        self.lists[piece.color.index()].push(piece.id)?;
        self.squares[pos.index()] = Some(piece.id);
        self.roster[piece.id.index()] = Some(piece);
        if piece.piece_type == PieceType::General {
            self.generals[piece.color.index()] = Some(pos);
        }
        self.next_id = self.next_id.max(piece.id.0 + 1);
        Ok(())
    }

    /// 移除指定位置的棋子
    pub fn remove(&mut self, pos: Position) -> Option<Piece> {
        if !pos.in_bounds() {
            return None;
        }
        let id = self.squares[pos.index()].take()?;
        let piece = self.roster[id.index()].take()?;
        self.lists[piece.color.index()].remove(id);
        if piece.piece_type == PieceType::General {
            self.generals[piece.color.index()] = None;
        }
        Some(piece)
    }

    /// 移动棋子（不检查规则），返回被吃掉的棋子；起点为空时不做任何事
    pub fn move_piece(&mut self, from: Position, to: Position) -> Option<Piece> {
        if from == to || !to.in_bounds() {
            return None;
        }
        let mut piece = self.get(from)?;
        let captured = self.remove(to);

        self.squares[from.index()] = None;
        self.squares[to.index()] = Some(piece.id);
        piece.position = to;
        self.roster[piece.id.index()] = Some(piece);
        if piece.piece_type == PieceType::General {
            self.generals[piece.color.index()] = Some(to);
        }
        captured
    }

    /// 获取指定位置的棋子
    pub fn get(&self, pos: Position) -> Option<Piece> {
        if !pos.in_bounds() {
            return None;
        }
        self.squares[pos.index()].and_then(|id| self.roster[id.index()])
    }

    /// 按 ID 查找棋盘上的棋子
    pub fn piece(&self, id: PieceId) -> Option<Piece> {
        self.roster.get(id.index()).copied().flatten()
    }

    pub fn has_piece(&self, pos: Position) -> bool {
        pos.in_bounds() && self.squares[pos.index()].is_some()
    }

    /// 该位置是否是 `color` 的敌方棋子
    pub fn is_enemy(&self, pos: Position, color: Color) -> bool {
        self.get(pos).is_some_and(|p| p.color != color)
    }

    /// 该位置是否是 `color` 的己方棋子
    pub fn is_friendly(&self, pos: Position, color: Color) -> bool {
        self.get(pos).is_some_and(|p| p.color == color)
    }

    /// 指定阵营在棋盘上的全部棋子
    pub fn pieces(&self, color: Color) -> impl Iterator<Item = Piece> + '_ {
        self.lists[color.index()]
            .as_slice()
            .iter()
            .filter_map(move |id| self.roster[id.index()])
    }

    /// 棋盘上的全部棋子
    pub fn all_pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        self.roster.iter().filter_map(|p| *p)
    }

    pub fn piece_count(&self, color: Color) -> usize {
        self.lists[color.index()].len as usize
    }

    /// 将/帅位置
    pub fn general_position(&self, color: Color) -> Option<Position> {
        self.generals[color.index()]
    }

    /// 同一直线上两点之间（不含端点）的棋子数；不在同一直线返回 None
    pub fn count_between(&self, a: Position, b: Position) -> Option<usize> {
        if a == b || (a.file != b.file && a.rank != b.rank) {
            return None;
        }
        let df = (b.file as i8 - a.file as i8).signum();
        let dr = (b.rank as i8 - a.rank as i8).signum();
        let mut count = 0;
        let mut current = a.offset(df, dr)?;
        while current != b {
            if self.has_piece(current) {
                count += 1;
            }
            current = current.offset(df, dr)?;
        }
        Some(count)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        // 列表顺序和 ID 计数器是派生数据，不参与比较
        self.squares == other.squares && self.roster == other.roster
    }
}

impl Eq for Board {}

/// 棋盘的序列化形式：棋盘上的全部棋子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardLayout {
    pub pieces: Vec<Piece>,
}

impl From<Board> for BoardLayout {
    fn from(board: Board) -> Self {
        Self {
            pieces: board.all_pieces().collect(),
        }
    }
}

impl TryFrom<BoardLayout> for Board {
    type Error = BoardError;

    fn try_from(layout: BoardLayout) -> Result<Self, Self::Error> {
        let mut board = Board::empty();
        for piece in layout.pieces {
            board.restore(piece)?;
        }
        Ok(board)
    }
}
