//! App: terminal init, main loop, gravity timer and key handling.

use crate::GameConfig;
use crate::game::{ActivePiece, Direction, EngineConfig, LockEvent, RandomPieces, Session};
use crate::highscores::{self, FileStore, MemoryStore, ScoreStore};
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use log::debug;
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// Render cadence while waiting for input (~60 FPS).
const FRAME_MS: u64 = 16;

pub type GameSession = Session<RandomPieces, Box<dyn ScoreStore>>;

/// Line-clear flash: rows to highlight and the effect driving it (created lazily by ui).
#[derive(Default)]
pub struct LineClearFlash {
    pub rows: Vec<usize>,
    pub effect: Option<Effect>,
    pub process_time: Option<Instant>,
}

impl LineClearFlash {
    pub fn is_active(&self) -> bool {
        !self.rows.is_empty()
    }

    fn start(&mut self, rows: Vec<usize>) {
        self.rows = rows;
        self.effect = None;
        self.process_time = None;
    }

    fn clear(&mut self) {
        self.start(Vec::new());
    }
}

/// HUD values that live outside the engine.
#[derive(Debug, Clone, Copy)]
pub struct Hud {
    /// Best score when the current game started, to spot a new record.
    pub best_at_start: u32,
    pub ghost: bool,
    pub animation: bool,
}

pub struct App {
    theme: Theme,
    session: GameSession,
    hud: Hud,
    /// When gravity was last (re)armed.
    last_tick: Instant,
    flash: LineClearFlash,
}

impl App {
    pub fn new(config: GameConfig, theme: Theme) -> Self {
        let store: Box<dyn ScoreStore> = if config.save {
            let dir = config.data_dir.clone().unwrap_or_else(highscores::default_dir);
            debug!("best score stored in {}", dir.display());
            Box::new(FileStore::new(dir))
        } else {
            Box::new(MemoryStore::default())
        };
        let pieces = config
            .seed
            .map_or_else(RandomPieces::from_os_rng, RandomPieces::seeded);
        let engine_config = EngineConfig {
            min_drop_interval: config.min_drop_interval,
        };
        let session = Session::new(pieces, store, engine_config);
        let hud = Hud {
            best_at_start: session.best_score(),
            ghost: config.ghost,
            animation: config.animation,
        };
        Self {
            theme,
            session,
            hud,
            last_tick: Instant::now(),
            flash: LineClearFlash::default(),
        }
    }

    fn restart(&mut self) {
        self.session.start();
        self.hud.best_at_start = self.session.best_score();
        self.flash.clear();
        self.last_tick = Instant::now();
    }

    fn on_lock(&mut self, event: LockEvent) {
        if self.hud.animation && !event.cleared_rows.is_empty() {
            self.flash.start(event.cleared_rows);
        }
    }

    /// Apply one input. Returns false when the app should exit.
    fn apply_action(&mut self, action: Action) -> bool {
        let changed = match action {
            Action::Quit => return false,
            Action::None => false,
            Action::Restart => {
                self.restart();
                false
            }
            Action::Pause => {
                let was = self.session.is_paused();
                self.session.toggle_pause();
                was != self.session.is_paused()
            }
            Action::MoveLeft => self.session.move_horizontal(Direction::Left),
            Action::MoveRight => self.session.move_horizontal(Direction::Right),
            Action::Rotate => self.session.rotate(),
            Action::SoftDrop | Action::HardDrop => {
                let before = self.session.active().map(ActivePiece::anchor);
                let event = if action == Action::SoftDrop {
                    self.session.soft_drop()
                } else {
                    self.session.hard_drop()
                };
                match event {
                    Some(event) => {
                        self.on_lock(event);
                        true
                    }
                    None => self.session.active().map(ActivePiece::anchor) != before,
                }
            }
        };
        // Every accepted transition re-arms gravity from now.
        if changed {
            self.last_tick = Instant::now();
        }
        true
    }

    fn tick_gravity(&mut self, now: Instant) {
        let Some(interval) = self.session.drop_interval() else {
            return;
        };
        if now.saturating_duration_since(self.last_tick) < interval {
            return;
        }
        if let Some(event) = self.session.tick() {
            self.on_lock(event);
        }
        self.last_tick = Instant::now();
    }

    /// How long to wait for input before the next frame or gravity step.
    fn poll_timeout(&self, now: Instant) -> Duration {
        let frame = Duration::from_millis(FRAME_MS);
        match self.session.drop_interval() {
            Some(interval) => {
                let due = self.last_tick + interval;
                frame.min(due.saturating_duration_since(now))
            }
            None => frame,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = terminal.show_cursor();
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal.draw(|f| {
                crate::ui::draw(f, &self.session, &self.theme, self.hud, &mut self.flash, now);
            })?;

            if self.flash.effect.as_ref().is_some_and(Effect::done) {
                self.flash.clear();
            }

            if event::poll(self.poll_timeout(now))? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if !self.apply_action(key_to_action(key)) {
                            return Ok(());
                        }
                    }
                }
            }

            self.tick_gravity(Instant::now());
        }
    }
}
