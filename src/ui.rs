//! Layout and drawing: board, falling piece, ghost, next preview, stats, pause and game over.

use crate::app::{GameSession, Hud, LineClearFlash};
use crate::game::{BOARD_HEIGHT, BOARD_WIDTH, PieceKind, Shape};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{CellFilter, Duration as TfxDuration, EffectRenderer, Interpolation, fx, ref_count};

/// Each board cell is two terminal columns wide so it looks square.
const CELL_WIDTH: u16 = 2;
const BOARD_OUTER_WIDTH: u16 = BOARD_WIDTH as u16 * CELL_WIDTH + 2;
const BOARD_OUTER_HEIGHT: u16 = BOARD_HEIGHT as u16 + 2;
const SIDEBAR_WIDTH: u16 = 24;

/// Duration of the line-clear flash (TachyonFX) in ms.
const LINE_CLEAR_FLASH_MS: u32 = 300;

const BLOCK: &str = "██";
const GHOST: &str = "░░";
const EMPTY: &str = " ·";

type Glyph = (&'static str, Style);

/// Draw the whole screen: board, sidebar, then flash and overlays on top.
pub fn draw(
    frame: &mut Frame,
    session: &GameSession,
    theme: &Theme,
    hud: Hud,
    flash: &mut LineClearFlash,
    now: Instant,
) {
    let (board_area, sidebar_area) = split_screen(frame.area());
    let board_rect = draw_board(frame, session, theme, hud, board_area);
    draw_sidebar(frame, session, theme, sidebar_area);

    if flash.is_active() {
        apply_line_clear_effect(frame, board_rect, flash, now);
    }
    if session.is_game_over() {
        draw_game_over(frame, session, theme, hud, board_area);
    } else if session.is_paused() {
        draw_pause_overlay(frame, theme, board_area);
    }
}

/// Centre board + sidebar in the terminal.
fn split_screen(area: Rect) -> (Rect, Rect) {
    let total_w = BOARD_OUTER_WIDTH + SIDEBAR_WIDTH;
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(BOARD_OUTER_HEIGHT),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(BOARD_OUTER_WIDTH),
            Constraint::Length(SIDEBAR_WIDTH),
        ])
        .split(vert[1]);
    (inner[0], inner[1])
}

/// Settled cells, then the ghost, then the falling piece.
fn board_glyphs(session: &GameSession, theme: &Theme, hud: Hud) -> [[Glyph; BOARD_WIDTH]; BOARD_HEIGHT] {
    let empty = (EMPTY, Style::default().fg(theme.div_line).bg(theme.bg));
    let mut glyphs = [[empty; BOARD_WIDTH]; BOARD_HEIGHT];

    for (y, row) in glyphs.iter_mut().enumerate() {
        for (x, glyph) in row.iter_mut().enumerate() {
            if let Some(kind) = session.board().get(x, y).and_then(|c| c.kind) {
                *glyph = (BLOCK, Style::default().fg(theme.piece_color(kind)).bg(theme.bg));
            }
        }
    }

    // No piece in play after a blocked spawn.
    let Some(piece) = session.active() else {
        return glyphs;
    };

    let mut put = |x: i32, y: i32, glyph: Glyph| {
        if x >= 0 && y >= 0 && (x as usize) < BOARD_WIDTH && (y as usize) < BOARD_HEIGHT {
            glyphs[y as usize][x as usize] = glyph;
        }
    };

    let (col, row) = piece.anchor();
    if hud.ghost {
        if let Some(ghost) = session.ghost_row().filter(|&g| g != row) {
            let style = Style::default().fg(theme.inactive_fg).bg(theme.bg);
            for (dx, dy, _) in piece.shape().occupied() {
                put(col + dx as i32, ghost + dy as i32, (GHOST, style));
            }
        }
    }
    let style = Style::default().fg(theme.piece_color(piece.kind())).bg(theme.bg);
    for (x, y, _) in piece.cells() {
        put(x, y, (BLOCK, style));
    }
    glyphs
}

/// Draw the board; returns the inner rect holding the cells.
fn draw_board(frame: &mut Frame, session: &GameSession, theme: &Theme, hud: Hud, area: Rect) -> Rect {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Tetris φ ", Style::default().fg(theme.title)));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let glyphs = board_glyphs(session, theme, hud);
    let buf = frame.buffer_mut();
    for (y, row) in glyphs.iter().enumerate() {
        for (x, (symbol, style)) in row.iter().enumerate() {
            let rx = inner.x + x as u16 * CELL_WIDTH;
            let ry = inner.y + y as u16;
            if rx + CELL_WIDTH <= inner.x + inner.width && ry < inner.y + inner.height {
                buf.set_string(rx, ry, *symbol, *style);
            }
        }
    }
    inner
}

/// Fade the rows just cleared from white back to the board (TachyonFX).
fn apply_line_clear_effect(frame: &mut Frame, board_rect: Rect, flash: &mut LineClearFlash, now: Instant) {
    let delta = flash
        .process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    flash.process_time = Some(now);

    if flash.effect.is_none() {
        let ys: HashSet<u16> = flash
            .rows
            .iter()
            .map(|&r| board_rect.y + r as u16)
            .collect();
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| ys.contains(&pos.y)));
        let effect = fx::fade_from(
            Color::White,
            Color::White,
            (LINE_CLEAR_FLASH_MS, Interpolation::Linear),
        )
        .with_filter(filter)
        .with_area(board_rect);
        flash.effect = Some(effect);
    }

    if let Some(effect) = flash.effect.as_mut() {
        frame.render_effect(effect, board_rect, TfxDuration::from_millis(delta_ms));
    }
}

fn draw_sidebar(frame: &mut Frame, session: &GameSession, theme: &Theme, area: Rect) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Next (border + title + 4 rows)
            Constraint::Length(6), // Stats
            Constraint::Min(0),    // Keys
        ])
        .split(area);

    // --- Next ---
    let next_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(" Next ", title_style));
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_color = theme.piece_color(session.next_kind());
    draw_piece_preview(frame, next_color, next_inner, &session.next_shape());

    // --- Stats ---
    let stats_block = Block::default().borders(Borders::ALL).border_style(border_style);
    let stats_inner = stats_block.inner(chunks[1]);
    stats_block.render(chunks[1], frame.buffer_mut());
    let stat = |label: &'static str, value: u32| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value.to_string(), fg_style),
        ])
    };
    let stats = vec![
        stat("Score: ", session.score()),
        stat("Best:  ", session.best_score()),
        stat("Level: ", session.level()),
        stat("Rows:  ", session.rows()),
    ];
    Paragraph::new(Text::from(stats)).render(stats_inner, frame.buffer_mut());

    // --- Keys ---
    let key = |k: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(k, Style::default().fg(theme.piece_color(PieceKind::I))),
            Span::styled(what, fg_style),
        ])
    };
    let keys = vec![
        key(" ← →  ", "move"),
        key(" ↑    ", "rotate"),
        key(" ↓    ", "soft drop"),
        key(" SPC  ", "hard drop"),
        key(" P    ", "pause"),
        key(" R    ", "restart"),
        key(" Q    ", "quit"),
    ];
    Paragraph::new(Text::from(keys)).render(chunks[2], frame.buffer_mut());
}

/// Draw a shape's occupied cells, trimmed to their bounding box and centred.
fn draw_piece_preview(frame: &mut Frame, color: Color, area: Rect, shape: &Shape) {
    let cells: Vec<_> = shape.occupied().collect();
    if cells.is_empty() {
        return;
    }
    let (x_lo, y_lo, x_hi, y_hi) = cells.iter().fold(
        (usize::MAX, usize::MAX, 0, 0),
        |(ax, ay, bx, by), &(x, y, _)| (ax.min(x), ay.min(y), bx.max(x), by.max(y)),
    );
    let bw = (x_hi - x_lo + 1) as u16 * CELL_WIDTH;
    let bh = (y_hi - y_lo + 1) as u16;
    let off_x = area.width.saturating_sub(bw) / 2;
    let off_y = area.height.saturating_sub(bh) / 2;
    let style = Style::default().fg(color);

    let buf = frame.buffer_mut();
    for (x, y, _) in cells {
        let rx = area.x + off_x + (x - x_lo) as u16 * CELL_WIDTH;
        let ry = area.y + off_y + (y - y_lo) as u16;
        if rx + CELL_WIDTH <= area.x + area.width && ry < area.y + area.height {
            buf.set_string(rx, ry, BLOCK, style);
        }
    }
}

/// Rect of `w` x `h` centred in `area`.
fn centered(area: Rect, w: u16, h: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered(area, 20, 5);
    let lines = vec![
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(theme.title),
        )),
        Line::from(""),
        Line::from(Span::styled(" P — Resume ", Style::default().fg(theme.main_fg))),
    ];
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
    );
    Clear.render(popup, frame.buffer_mut());
    p.render(popup, frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, session: &GameSession, theme: &Theme, hud: Hud, area: Rect) {
    let new_record = session.score() > hud.best_at_start;
    let popup = centered(area, 20, if new_record { 10 } else { 9 });
    let fg = Style::default().fg(theme.main_fg);
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", session.score()), fg)),
        Line::from(Span::styled(format!(" Best: {} ", session.best_score()), fg)),
    ];
    if new_record {
        lines.push(Line::from(Span::styled(
            " New record! ",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
    }
    lines.extend([
        Line::from(""),
        Line::from(Span::styled(" R — Play again ", fg)),
        Line::from(Span::styled(" Q — Quit ", fg)),
    ]);
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
    );
    Clear.render(popup, frame.buffer_mut());
    p.render(popup, frame.buffer_mut());
}
