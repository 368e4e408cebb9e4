//! Game state: board, active piece, collision, merge, row clear, scoring, levels.

use crate::highscores::{self, ScoreStore};
use log::{debug, warn};
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use std::collections::VecDeque;
use std::time::Duration;

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;

/// Top-left anchor every new piece is placed at.
pub const SPAWN_COL: i32 = 3;
pub const SPAWN_ROW: i32 = 0;

/// Storage slot for the best score.
pub const HIGH_SCORE_SLOT: &str = "tetrisHighScore";

/// Gravity interval at level 0.
const BASE_DROP_MS: u64 = 1000;
pub const DEFAULT_MIN_DROP_MS: u64 = 50;

/// Points for clearing 0, 1, 2, 3 or 4 rows in one lock, before the level multiplier.
const LINE_POINTS: [u32; 5] = [0, 40, 100, 300, 1200];
const ROWS_PER_LEVEL: u32 = 10;

/// Tetromino kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
}

impl PieceKind {
    pub const ALL: [Self; 7] = [Self::I, Self::J, Self::L, Self::O, Self::S, Self::T, Self::Z];

    /// Occupancy pattern in spawn orientation, one string per row.
    fn pattern(self) -> &'static [&'static str] {
        match self {
            Self::I => &[".#..", ".#..", ".#..", ".#.."],
            Self::J => &[".#.", ".#.", "##."],
            Self::L => &[".#.", ".#.", ".##"],
            Self::O => &["##", "##"],
            Self::S => &[".##", "##.", "..."],
            Self::T => &["...", "###", ".#."],
            Self::Z => &["##.", ".##", "..."],
        }
    }

    /// Shape in spawn orientation.
    pub fn shape(self) -> Shape {
        let pattern = self.pattern();
        let size = pattern.len();
        let cells = pattern
            .iter()
            .flat_map(|row| row.chars())
            .map(|c| (c == '#').then_some(self))
            .collect();
        Shape { size, cells }
    }

    /// Colour index 0..7 for theme.piece_color().
    pub fn color_index(self) -> usize {
        match self {
            Self::I => 0,
            Self::J => 1,
            Self::L => 2,
            Self::O => 3,
            Self::S => 4,
            Self::T => 5,
            Self::Z => 6,
        }
    }
}

/// Square occupancy matrix; each cell is empty or tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    size: usize,
    /// Row-major, `size * size` entries.
    cells: Vec<Option<PieceKind>>,
}

impl Shape {
    /// Occupied cells as (col, row, kind), relative to the top-left corner.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, PieceKind)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|kind| (i % self.size, i / self.size, kind)))
    }

    /// Clockwise quarter turn: transpose, then reverse each row.
    pub fn rotated_cw(&self) -> Self {
        let n = self.size;
        let mut cells = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                cells.push(self.cells[(n - 1 - col) * n + row]);
            }
        }
        Self { size: n, cells }
    }
}

/// Whether a cell is settled or transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellStatus {
    #[default]
    Clear,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub kind: Option<PieceKind>,
    pub status: CellStatus,
}

impl Cell {
    pub const EMPTY: Self = Self {
        kind: None,
        status: CellStatus::Clear,
    };

    pub fn merged(kind: PieceKind) -> Self {
        Self {
            kind: Some(kind),
            status: CellStatus::Merged,
        }
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.status == CellStatus::Merged
    }
}

type Row = [Cell; BOARD_WIDTH];

/// Board: grid of settled cells. y=0 is top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// rows[y][x] = cell. rows[0] is top.
    rows: VecDeque<Row>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            rows: (0..BOARD_HEIGHT).map(|_| [Cell::EMPTY; BOARD_WIDTH]).collect(),
        }
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> Option<Cell> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    #[cfg(test)]
    fn set(&mut self, col: usize, row: usize, cell: Cell) {
        if let Some(r) = self.rows.get_mut(row) {
            if col < BOARD_WIDTH {
                r[col] = cell;
            }
        }
    }

    /// True if `shape` anchored at (col, row) stays inside the board and touches no settled cell.
    pub fn can_place(&self, shape: &Shape, col: i32, row: i32) -> bool {
        shape.occupied().all(|(dx, dy, _)| {
            let x = col + dx as i32;
            let y = row + dy as i32;
            if x < 0 || y < 0 || x >= BOARD_WIDTH as i32 || y >= BOARD_HEIGHT as i32 {
                return false;
            }
            !self.rows[y as usize][x as usize].is_settled()
        })
    }

    /// Write the piece's cells as settled. Caller has checked `can_place`.
    fn merge(&mut self, piece: &ActivePiece) {
        for (x, y, kind) in piece.cells() {
            if x >= 0 && y >= 0 {
                if let Some(r) = self.rows.get_mut(y as usize) {
                    if let Some(cell) = r.get_mut(x as usize) {
                        *cell = Cell::merged(kind);
                    }
                }
            }
        }
    }

    /// Remove every full row at once and push the same number of empty rows on top.
    /// Returns the indices the removed rows had before the clear, top to bottom.
    fn clear_full_rows(&mut self) -> Vec<usize> {
        let full: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.iter().all(|c| c.kind.is_some()))
            .map(|(y, _)| y)
            .collect();
        for &y in full.iter().rev() {
            self.rows.remove(y);
        }
        for _ in &full {
            self.rows.push_front([Cell::EMPTY; BOARD_WIDTH]);
        }
        full
    }
}

/// The falling piece: kind, current (possibly rotated) shape and top-left anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePiece {
    kind: PieceKind,
    shape: Shape,
    col: i32,
    row: i32,
}

impl ActivePiece {
    fn spawn(kind: PieceKind) -> Self {
        Self {
            kind,
            shape: kind.shape(),
            col: SPAWN_COL,
            row: SPAWN_ROW,
        }
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// (col, row) of the shape's top-left corner.
    pub fn anchor(&self) -> (i32, i32) {
        (self.col, self.row)
    }

    /// Absolute board coordinates of the occupied cells.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32, PieceKind)> + '_ {
        self.shape
            .occupied()
            .map(|(dx, dy, kind)| (self.col + dx as i32, self.row + dy as i32, kind))
    }
}

/// Horizontal move direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn delta(self) -> i32 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }
}

/// Supplies the kind of each new piece.
pub trait PieceSource {
    fn next_kind(&mut self) -> PieceKind;
}

/// Uniform draw over the seven kinds.
#[derive(Debug, Clone)]
pub struct RandomPieces {
    rng: Pcg32,
}

impl RandomPieces {
    /// Seeded from the OS's random data source.
    pub fn from_os_rng() -> Self {
        Self {
            rng: Pcg32::from_os_rng(),
        }
    }

    /// Same seed, same piece sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }
}

impl PieceSource for RandomPieces {
    fn next_kind(&mut self) -> PieceKind {
        PieceKind::ALL[self.rng.random_range(0..PieceKind::ALL.len())]
    }
}

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Gravity never ticks faster than this.
    pub min_drop_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_drop_interval: Duration::from_millis(DEFAULT_MIN_DROP_MS),
        }
    }
}

impl EngineConfig {
    /// 1000 ms / (level + 1), clamped to the floor.
    pub fn drop_interval(&self, level: u32) -> Duration {
        Duration::from_millis(BASE_DROP_MS / (u64::from(level) + 1)).max(self.min_drop_interval)
    }
}

/// What happened when a piece locked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockEvent {
    /// False when the piece could not enter play and was discarded.
    pub merged: bool,
    /// Board rows removed by this lock, indices before the clear.
    pub cleared_rows: Vec<usize>,
    pub points: u32,
    pub level_up: bool,
    pub game_over: bool,
}

/// A single game: board, active and next piece, counters, flags and the gravity timer.
#[derive(Debug)]
pub struct Session<P, S> {
    board: Board,
    /// None after a spawn was blocked by the stack.
    active: Option<ActivePiece>,
    next: PieceKind,
    score: u32,
    rows: u32,
    level: u32,
    paused: bool,
    game_over: bool,
    /// None = gravity timer disarmed.
    drop_interval: Option<Duration>,
    best_score: u32,
    pieces: P,
    store: S,
    config: EngineConfig,
}

impl<P: PieceSource, S: ScoreStore> Session<P, S> {
    /// Load the best score from `store` and start a game.
    pub fn new(mut pieces: P, store: S, config: EngineConfig) -> Self {
        let best_score = highscores::load_score(&store, HIGH_SCORE_SLOT);
        let active = ActivePiece::spawn(pieces.next_kind());
        let next = pieces.next_kind();
        debug!("session created: best={best_score} active={:?} next={next:?}", active.kind);
        Self {
            board: Board::new(),
            active: Some(active),
            next,
            score: 0,
            rows: 0,
            level: 0,
            paused: false,
            game_over: false,
            drop_interval: Some(config.drop_interval(0)),
            best_score,
            pieces,
            store,
            config,
        }
    }

    /// Reset to a fresh board with a new active and next piece.
    pub fn start(&mut self) {
        self.board = Board::new();
        let active = ActivePiece::spawn(self.pieces.next_kind());
        self.next = self.pieces.next_kind();
        debug!("game started: active={:?} next={:?}", active.kind, self.next);
        self.active = Some(active);
        self.score = 0;
        self.rows = 0;
        self.level = 0;
        self.paused = false;
        self.game_over = false;
        self.drop_interval = Some(self.config.drop_interval(0));
    }

    #[inline]
    fn accepts_input(&self) -> bool {
        !self.paused && !self.game_over
    }

    /// Shift one column. Returns whether the move was taken.
    pub fn move_horizontal(&mut self, dir: Direction) -> bool {
        if !self.accepts_input() {
            return false;
        }
        let Some(piece) = self.active.as_mut() else {
            return false;
        };
        let col = piece.col + dir.delta();
        if !self.board.can_place(&piece.shape, col, piece.row) {
            return false;
        }
        piece.col = col;
        true
    }

    /// Rotate clockwise in place; no wall kicks.
    pub fn rotate(&mut self) -> bool {
        if !self.accepts_input() {
            return false;
        }
        let Some(piece) = self.active.as_mut() else {
            return false;
        };
        let rotated = piece.shape.rotated_cw();
        if !self.board.can_place(&rotated, piece.col, piece.row) {
            return false;
        }
        piece.shape = rotated;
        true
    }

    /// Move down one row, locking the piece if it cannot.
    pub fn soft_drop(&mut self) -> Option<LockEvent> {
        if !self.accepts_input() {
            return None;
        }
        let piece = self.active.as_mut()?;
        let row = piece.row + 1;
        if self.board.can_place(&piece.shape, piece.col, row) {
            piece.row = row;
            return None;
        }
        Some(self.lock_piece())
    }

    /// One gravity step, called by the host on the `drop_interval()` cadence.
    pub fn tick(&mut self) -> Option<LockEvent> {
        self.soft_drop()
    }

    /// Drop straight to the resting row and lock in the same call.
    pub fn hard_drop(&mut self) -> Option<LockEvent> {
        if !self.accepts_input() {
            return None;
        }
        let row = self.resting_row()?;
        if let Some(piece) = self.active.as_mut() {
            piece.row = row;
        }
        Some(self.lock_piece())
    }

    pub fn toggle_pause(&mut self) {
        if self.game_over {
            return;
        }
        self.paused = !self.paused;
        self.drop_interval = (!self.paused).then(|| self.config.drop_interval(self.level));
        debug!("paused={}", self.paused);
    }

    fn resting_row(&self) -> Option<i32> {
        let piece = self.active.as_ref()?;
        let mut row = piece.row;
        while self.board.can_place(&piece.shape, piece.col, row + 1) {
            row += 1;
        }
        Some(row)
    }

    fn lock_piece(&mut self) -> LockEvent {
        let Some(piece) = self.active.take() else {
            return LockEvent::default();
        };
        if piece.row < 1 {
            // Block-out: the piece never left the spawn row, so nothing is merged.
            self.active = Some(piece);
            self.end_game();
            return LockEvent {
                game_over: true,
                ..LockEvent::default()
            };
        }

        self.board.merge(&piece);
        let cleared_rows = self.board.clear_full_rows();
        let points = LINE_POINTS[cleared_rows.len()] * (self.level + 1);
        self.score = self.score.saturating_add(points);
        self.rows += cleared_rows.len() as u32;

        let level_up = self.rows > (self.level + 1) * ROWS_PER_LEVEL;
        if level_up {
            self.level += 1;
            self.drop_interval = Some(self.config.drop_interval(self.level));
            debug!("level up: level={} rows={}", self.level, self.rows);
        }

        self.spawn_next();
        LockEvent {
            merged: true,
            cleared_rows,
            points,
            level_up,
            game_over: self.game_over,
        }
    }

    /// Promote `next` into play. A blocked spawn ends the game with no piece in play
    /// and leaves the kind that did not fit in `next`.
    fn spawn_next(&mut self) {
        let piece = ActivePiece::spawn(self.next);
        if !self.board.can_place(&piece.shape, piece.col, piece.row) {
            self.end_game();
            return;
        }
        self.active = Some(piece);
        self.next = self.pieces.next_kind();
    }

    fn end_game(&mut self) {
        self.game_over = true;
        self.drop_interval = None;
        debug!("game over: score={} rows={} level={}", self.score, self.rows, self.level);
        if self.score > self.best_score {
            self.best_score = self.score;
            if let Err(e) = self.store.set(HIGH_SCORE_SLOT, &self.score.to_string()) {
                warn!("failed to save best score: {e}");
            }
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The falling piece; None once a spawn has been blocked by the stack.
    pub fn active(&self) -> Option<&ActivePiece> {
        self.active.as_ref()
    }

    pub fn next_kind(&self) -> PieceKind {
        self.next
    }

    pub fn next_shape(&self) -> Shape {
        self.next.shape()
    }

    /// Row a hard drop would land on; None once the game is over.
    pub fn ghost_row(&self) -> Option<i32> {
        if self.game_over {
            return None;
        }
        self.resting_row()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn best_score(&self) -> u32 {
        self.best_score
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Interval the host should wait before the next `tick()`; None while paused or over.
    pub fn drop_interval(&self) -> Option<Duration> {
        self.drop_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highscores::MemoryStore;
    use proptest::prelude::*;

    // Tests seed state directly: `Board::set` and the session's private fields
    // (`board`, `score`, `rows`, `level`) stand in for long scripted games.

    /// Hands out a fixed cycle of kinds.
    #[derive(Debug)]
    struct Scripted {
        kinds: Vec<PieceKind>,
        pos: usize,
    }

    impl Scripted {
        fn new(kinds: &[PieceKind]) -> Self {
            Self {
                kinds: kinds.to_vec(),
                pos: 0,
            }
        }
    }

    impl PieceSource for Scripted {
        fn next_kind(&mut self) -> PieceKind {
            let kind = self.kinds[self.pos % self.kinds.len()];
            self.pos += 1;
            kind
        }
    }

    fn session(kinds: &[PieceKind]) -> Session<Scripted, MemoryStore> {
        Session::new(Scripted::new(kinds), MemoryStore::default(), EngineConfig::default())
    }

    /// Settle every cell of `row` except column `gap`.
    fn fill_row_except(board: &mut Board, row: usize, gap: usize) {
        for col in (0..BOARD_WIDTH).filter(|&c| c != gap) {
            board.set(col, row, Cell::merged(PieceKind::O));
        }
    }

    fn piece<P: PieceSource, S: ScoreStore>(s: &Session<P, S>) -> &ActivePiece {
        s.active().expect("a piece is in play")
    }

    /// The falling piece, when there is one, never overlaps the stack or leaves the board.
    fn assert_piece_legal<P: PieceSource, S: ScoreStore>(s: &Session<P, S>) {
        if let Some(piece) = s.active() {
            let (col, row) = piece.anchor();
            assert!(
                s.board().can_place(piece.shape(), col, row),
                "active piece overlaps or leaves the board at ({col}, {row})"
            );
        }
    }

    fn settled_count(board: &Board) -> usize {
        (0..BOARD_HEIGHT)
            .flat_map(|y| (0..BOARD_WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| board.get(x, y).is_some_and(|c| c.is_settled()))
            .count()
    }

    #[test]
    fn test_rotation_transposes_then_reverses_rows() {
        let t = PieceKind::T.shape().rotated_cw();
        // ...      .#.
        // ###  ->  ##.
        // .#.      .#.
        let occupied: Vec<_> = t.occupied().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(occupied, vec![(1, 0), (0, 1), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_four_rotations_are_identity() {
        for kind in PieceKind::ALL {
            let shape = kind.shape();
            let back = shape.rotated_cw().rotated_cw().rotated_cw().rotated_cw();
            assert_eq!(back, shape, "{kind:?}");
        }
    }

    #[test]
    fn test_every_shape_has_four_cells() {
        for kind in PieceKind::ALL {
            assert_eq!(kind.shape().occupied().count(), 4, "{kind:?}");
        }
    }

    #[test]
    fn test_start_spawns_fresh_game() {
        let mut s = session(&[PieceKind::L, PieceKind::S]);
        s.score = 999;
        s.rows = 12;
        s.level = 1;
        s.board.set(0, 19, Cell::merged(PieceKind::I));
        s.start();
        assert_eq!(piece(&s).anchor(), (SPAWN_COL, SPAWN_ROW));
        assert_eq!(s.board(), &Board::new());
        assert_eq!((s.score(), s.rows(), s.level()), (0, 0, 0));
        assert!(!s.is_paused());
        assert!(!s.is_game_over());
        assert_eq!(s.drop_interval(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_new_draws_active_then_next() {
        let s = session(&[PieceKind::Z, PieceKind::O, PieceKind::J]);
        assert_eq!(piece(&s).kind(), PieceKind::Z);
        assert_eq!(s.next_kind(), PieceKind::O);
    }

    #[test]
    fn test_move_stops_at_walls() {
        let mut s = session(&[PieceKind::O]);
        // O occupies columns 3 and 4 at spawn.
        for _ in 0..3 {
            assert!(s.move_horizontal(Direction::Left));
        }
        assert!(!s.move_horizontal(Direction::Left));
        assert_eq!(piece(&s).anchor(), (0, 0));
        for _ in 0..8 {
            assert!(s.move_horizontal(Direction::Right));
        }
        assert!(!s.move_horizontal(Direction::Right));
        assert_eq!(piece(&s).anchor(), (8, 0));
    }

    #[test]
    fn test_move_blocked_by_settled_cell() {
        let mut s = session(&[PieceKind::O]);
        s.board.set(5, 0, Cell::merged(PieceKind::I));
        assert!(!s.move_horizontal(Direction::Right));
        assert_eq!(piece(&s).anchor(), (SPAWN_COL, SPAWN_ROW));
    }

    #[test]
    fn test_rotation_rejected_without_kick() {
        let mut s = session(&[PieceKind::I]);
        // Vertical I sits in column 4; horizontal would cover row 1, columns 3..=6.
        s.board.set(6, 1, Cell::merged(PieceKind::O));
        let before = piece(&s).shape().clone();
        assert!(!s.rotate());
        assert_eq!(piece(&s).shape(), &before);
        assert_eq!(piece(&s).anchor(), (SPAWN_COL, SPAWN_ROW));
    }

    #[test]
    fn test_skipped_rotation_keeps_base_orientation() {
        let mut s = session(&[PieceKind::I]);
        let base = piece(&s).shape().clone();
        s.board.set(6, 1, Cell::merged(PieceKind::O));
        assert!(!s.rotate());
        s.board.set(6, 1, Cell::EMPTY);
        for _ in 0..4 {
            assert!(s.rotate());
        }
        assert_eq!(piece(&s).shape(), &base);
    }

    #[test]
    fn test_soft_drop_descends_then_merges() {
        let mut s = session(&[PieceKind::O, PieceKind::T]);
        let mut steps = 0;
        let event = loop {
            let before = piece(&s).anchor().1;
            match s.soft_drop() {
                Some(event) => break event,
                None => {
                    assert_eq!(piece(&s).anchor().1, before + 1);
                    steps += 1;
                }
            }
        };
        assert_eq!(steps, 18);
        assert!(event.merged);
        assert!(event.cleared_rows.is_empty());
        assert_eq!(event.points, 0);
        for (x, y) in [(3, 18), (4, 18), (3, 19), (4, 19)] {
            assert_eq!(s.board().get(x, y), Some(Cell::merged(PieceKind::O)));
        }
        assert_eq!(settled_count(s.board()), 4);
        assert_eq!(piece(&s).kind(), PieceKind::T);
        assert_eq!(piece(&s).anchor(), (SPAWN_COL, SPAWN_ROW));
        assert_eq!((s.score(), s.rows()), (0, 0));
    }

    #[test]
    fn test_next_piece_is_promoted() {
        let mut s = session(&[PieceKind::O, PieceKind::S, PieceKind::Z]);
        assert_eq!(s.next_kind(), PieceKind::S);
        s.hard_drop();
        assert_eq!(piece(&s).kind(), PieceKind::S);
        assert_eq!(s.next_kind(), PieceKind::Z);
    }

    #[test]
    fn test_hard_drop_locks_at_ghost_row() {
        let mut s = session(&[PieceKind::T, PieceKind::O]);
        let ghost = s.ghost_row();
        // T's pattern has an empty top row, so it rests one row lower than its footprint.
        assert_eq!(ghost, Some(BOARD_HEIGHT as i32 - 3));
        let event = s.hard_drop().expect("hard drop locks");
        assert!(event.merged);
        for (x, y) in [(3, 18), (4, 18), (5, 18), (4, 19)] {
            assert_eq!(s.board().get(x, y), Some(Cell::merged(PieceKind::T)));
        }
        assert_eq!(piece(&s).kind(), PieceKind::O);
    }

    #[test]
    fn test_single_row_clear_shifts_rows_down() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        fill_row_except(&mut s.board, 19, 4);
        s.board.set(0, 18, Cell::merged(PieceKind::Z));
        let event = s.hard_drop().expect("hard drop locks");
        assert_eq!(event.cleared_rows, vec![19]);
        assert_eq!(event.points, 40);
        assert_eq!((s.score(), s.rows()), (40, 1));
        // Remaining three I cells fell by one row; the Z cell above the clear too.
        for y in 17..20 {
            assert_eq!(s.board().get(4, y), Some(Cell::merged(PieceKind::I)));
        }
        assert_eq!(s.board().get(4, 16), Some(Cell::EMPTY));
        assert_eq!(s.board().get(0, 19), Some(Cell::merged(PieceKind::Z)));
        assert_eq!(settled_count(s.board()), 4);
        assert!((0..BOARD_WIDTH).all(|x| s.board().get(x, 0) == Some(Cell::EMPTY)));
    }

    #[test]
    fn test_tetris_scores_with_level_multiplier() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        for y in 16..20 {
            fill_row_except(&mut s.board, y, 4);
        }
        s.level = 2;
        s.rows = 25;
        let event = s.hard_drop().expect("hard drop locks");
        assert_eq!(event.cleared_rows, vec![16, 17, 18, 19]);
        assert_eq!(event.points, 1200 * 3);
        assert_eq!(s.score(), 3600);
        assert_eq!(s.rows(), 29);
        assert_eq!(settled_count(s.board()), 0);
    }

    #[test]
    fn test_three_rows_score_300_per_level() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        for y in 17..20 {
            fill_row_except(&mut s.board, y, 4);
        }
        s.level = 1;
        s.rows = 3;
        let event = s.hard_drop().expect("hard drop locks");
        assert_eq!(event.cleared_rows, vec![17, 18, 19]);
        assert_eq!(event.points, 300 * 2);
        assert_eq!((s.score(), s.rows(), s.level()), (600, 6, 1));
        // The I's top cell is all that remains, now on the bottom row.
        assert_eq!(s.board().get(4, 19), Some(Cell::merged(PieceKind::I)));
        assert_eq!(settled_count(s.board()), 1);
    }

    #[test]
    fn test_non_adjacent_rows_clear_together() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        fill_row_except(&mut s.board, 17, 4);
        fill_row_except(&mut s.board, 19, 4);
        s.board.set(4, 18, Cell::EMPTY);
        s.board.set(0, 18, Cell::merged(PieceKind::L));
        let event = s.hard_drop().expect("hard drop locks");
        assert_eq!(event.cleared_rows, vec![17, 19]);
        assert_eq!(event.points, 100);
        // Row 18 (L at col 0, I at col 4) drops to the bottom; one I cell remains above it.
        assert_eq!(s.board().get(0, 19), Some(Cell::merged(PieceKind::L)));
        assert_eq!(s.board().get(4, 19), Some(Cell::merged(PieceKind::I)));
        assert_eq!(s.board().get(4, 18), Some(Cell::merged(PieceKind::I)));
        assert_eq!(settled_count(s.board()), 3);
    }

    #[test]
    fn test_level_up_shortens_interval() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        s.rows = 10;
        fill_row_except(&mut s.board, 19, 4);
        let event = s.hard_drop().expect("hard drop locks");
        assert!(event.level_up);
        assert_eq!(event.points, 40);
        assert_eq!(s.level(), 1);
        assert_eq!(s.drop_interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_level_does_not_rise_at_exact_threshold() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        s.rows = 9;
        fill_row_except(&mut s.board, 19, 4);
        let event = s.hard_drop().expect("hard drop locks");
        assert!(!event.level_up);
        assert_eq!((s.rows(), s.level()), (10, 0));
    }

    #[test]
    fn test_drop_interval_clamps_at_floor() {
        let config = EngineConfig::default();
        assert_eq!(config.drop_interval(0), Duration::from_millis(1000));
        assert_eq!(config.drop_interval(3), Duration::from_millis(250));
        assert_eq!(config.drop_interval(19), Duration::from_millis(50));
        assert_eq!(config.drop_interval(200), Duration::from_millis(50));
        let slow = EngineConfig {
            min_drop_interval: Duration::from_millis(200),
        };
        assert_eq!(slow.drop_interval(9), Duration::from_millis(200));
    }

    #[test]
    fn test_block_out_leaves_board_untouched() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        s.board.set(4, 4, Cell::merged(PieceKind::J));
        let board_before = s.board().clone();
        let event = s.soft_drop().expect("blocked piece locks");
        assert!(event.game_over);
        assert!(!event.merged);
        assert!(s.is_game_over());
        assert_eq!(s.drop_interval(), None);
        assert_eq!(s.board(), &board_before);
    }

    #[test]
    fn test_hard_drop_from_spawn_is_block_out() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        s.board.set(4, 4, Cell::merged(PieceKind::J));
        let event = s.hard_drop().expect("hard drop locks");
        assert!(event.game_over);
        assert_eq!(settled_count(s.board()), 1);
    }

    #[test]
    fn test_spawn_into_stack_ends_game() {
        let mut s = session(&[PieceKind::O, PieceKind::T]);
        // Clear of the O at spawn, but inside the T's spawn footprint.
        s.board.set(5, 1, Cell::merged(PieceKind::L));
        let event = s.hard_drop().expect("hard drop locks");
        assert!(event.merged);
        assert!(event.game_over);
        assert!(s.is_game_over());
        // The T never enters play; it stays queued and nothing overlaps the stack.
        assert_eq!(s.active(), None);
        assert_eq!(s.next_kind(), PieceKind::T);
        assert_eq!(s.ghost_row(), None);
        assert_piece_legal(&s);
        assert_eq!(s.drop_interval(), None);
        assert_eq!(settled_count(s.board()), 5);
        assert!(!s.move_horizontal(Direction::Left));
        assert!(s.hard_drop().is_none());
        s.start();
        assert_eq!(piece(&s).anchor(), (SPAWN_COL, SPAWN_ROW));
    }

    #[test]
    fn test_game_over_ignores_input_until_start() {
        let mut s = session(&[PieceKind::I, PieceKind::O]);
        s.board.set(4, 4, Cell::merged(PieceKind::J));
        s.soft_drop();
        assert!(s.is_game_over());
        let before = piece(&s).clone();
        assert!(!s.move_horizontal(Direction::Left));
        assert!(!s.rotate());
        assert!(s.soft_drop().is_none());
        assert!(s.hard_drop().is_none());
        s.toggle_pause();
        assert!(!s.is_paused());
        assert_eq!(piece(&s), &before);
        s.start();
        assert!(!s.is_game_over());
        assert!(s.move_horizontal(Direction::Left));
    }

    #[test]
    fn test_pause_blocks_moves_and_gravity() {
        let mut s = session(&[PieceKind::T]);
        s.toggle_pause();
        assert!(s.is_paused());
        assert_eq!(s.drop_interval(), None);
        let before = piece(&s).clone();
        assert!(!s.move_horizontal(Direction::Right));
        assert!(!s.rotate());
        assert!(s.tick().is_none());
        assert!(s.hard_drop().is_none());
        assert_eq!(piece(&s), &before);
        s.level = 4;
        s.toggle_pause();
        assert!(!s.is_paused());
        assert_eq!(s.drop_interval(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_best_score_updates_only_when_beaten() {
        let store = MemoryStore::default().with_slot(HIGH_SCORE_SLOT, "300");
        let mut s = Session::new(Scripted::new(&[PieceKind::I]), store, EngineConfig::default());
        assert_eq!(s.best_score(), 300);
        s.score = 500;
        s.board.set(4, 4, Cell::merged(PieceKind::J));
        s.soft_drop();
        assert_eq!(s.best_score(), 500);
        assert_eq!(s.store.get(HIGH_SCORE_SLOT).as_deref(), Some("500"));

        let store = MemoryStore::default().with_slot(HIGH_SCORE_SLOT, "900");
        let mut s = Session::new(Scripted::new(&[PieceKind::I]), store, EngineConfig::default());
        s.score = 900;
        s.board.set(4, 4, Cell::merged(PieceKind::J));
        s.soft_drop();
        assert_eq!(s.best_score(), 900);
        assert_eq!(s.store.get(HIGH_SCORE_SLOT).as_deref(), Some("900"));
    }

    #[test]
    fn test_garbage_best_score_reads_as_zero() {
        let store = MemoryStore::default().with_slot(HIGH_SCORE_SLOT, "lots");
        let s = Session::new(Scripted::new(&[PieceKind::I]), store, EngineConfig::default());
        assert_eq!(s.best_score(), 0);
    }

    #[test]
    fn test_seeded_pieces_repeat() {
        let a: Vec<_> = {
            let mut p = RandomPieces::seeded(42);
            (0..32).map(|_| p.next_kind()).collect()
        };
        let b: Vec<_> = {
            let mut p = RandomPieces::seeded(42);
            (0..32).map(|_| p.next_kind()).collect()
        };
        assert_eq!(a, b);
    }

    #[derive(Debug, Clone, Copy)]
    enum Input {
        Left,
        Right,
        Rotate,
        SoftDrop,
        HardDrop,
        Pause,
    }

    fn input_strategy() -> impl Strategy<Value = Input> {
        prop_oneof![
            Just(Input::Left),
            Just(Input::Right),
            Just(Input::Rotate),
            Just(Input::SoftDrop),
            Just(Input::HardDrop),
            Just(Input::Pause),
        ]
    }

    proptest! {
        #[test]
        fn generated_play_keeps_piece_legal(
            seed in any::<u64>(),
            inputs in prop::collection::vec(input_strategy(), 1..400),
        ) {
            let mut s = Session::new(
                RandomPieces::seeded(seed),
                MemoryStore::default(),
                EngineConfig::default(),
            );
            for input in inputs {
                let (score, rows, level) = (s.score(), s.rows(), s.level());
                let event = match input {
                    Input::Left => { s.move_horizontal(Direction::Left); None }
                    Input::Right => { s.move_horizontal(Direction::Right); None }
                    Input::Rotate => { s.rotate(); None }
                    Input::SoftDrop => s.soft_drop(),
                    Input::HardDrop => s.hard_drop(),
                    Input::Pause => { s.toggle_pause(); None }
                };
                if let Some(event) = event {
                    let k = event.cleared_rows.len();
                    prop_assert!(k <= 4);
                    prop_assert_eq!(s.rows(), rows + k as u32);
                    prop_assert_eq!(event.points, LINE_POINTS[k] * (level + 1));
                    prop_assert_eq!(s.score(), score + event.points);
                }
                assert_piece_legal(&s);
                if s.is_game_over() {
                    prop_assert_eq!(s.drop_interval(), None);
                    s.start();
                    assert_piece_legal(&s);
                }
                prop_assert_eq!(s.is_paused(), s.drop_interval().is_none());
            }
        }
    }
}
