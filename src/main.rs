//! PHI Tetris: the "Tetris φ" falling-block game in the terminal.

mod app;
mod game;
mod highscores;
mod input;
mod theme;
mod ui;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Options derived from CLI that affect how the game runs.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub seed: Option<u64>,
    pub min_drop_interval: Duration,
    pub ghost: bool,
    pub animation: bool,
    pub data_dir: Option<PathBuf>,
    pub save: bool,
}

impl From<&Args> for GameConfig {
    fn from(args: &Args) -> Self {
        Self {
            seed: args.seed,
            min_drop_interval: Duration::from_millis(args.min_drop_ms.max(1)),
            ghost: !args.no_ghost,
            animation: !args.no_animation,
            data_dir: args.data_dir.clone(),
            save: !args.no_save,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_default();
    let config = GameConfig::from(&args);
    let mut app = App::new(config, theme);
    app.run()?;
    Ok(())
}

/// Tetris φ in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "phi-tetris",
    version,
    about = "Tetris φ: the PHI falling-block mini-game in the terminal.",
    long_about = "Tetris φ: the PHI falling-block mini-game in the terminal.\n\n\
        Steer falling tetrominoes on a 10x20 board; complete rows to clear them. \
        Scoring is 40/100/300/1200 per 1/2/3/4 rows, times (level + 1). \
        The level rises every ten rows and gravity speeds up with it.\n\n\
        CONTROLS:\n  Left/Right or h/l  Move       Up or k    Rotate\n  \
        Down or j          Soft drop  Space      Hard drop\n  \
        P                  Pause      R          Restart / play again\n  \
        Q / Esc            Quit"
)]
pub struct Args {
    /// Seed for the piece sequence (same seed, same pieces). Random if not set.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Directory holding the best-score file. Defaults to $XDG_CONFIG_HOME/phi-tetris.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep the best score in memory only.
    #[arg(long)]
    pub no_save: bool,

    /// Path to theme file (btop-style theme[key]=\"value\").
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme) or high-contrast.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable the line-clear flash.
    #[arg(long)]
    pub no_animation: bool,

    /// Hide the landing shadow under the falling piece.
    #[arg(long)]
    pub no_ghost: bool,

    /// Fastest gravity interval in ms, reached at high levels.
    #[arg(long, default_value_t = game::DEFAULT_MIN_DROP_MS, value_name = "MS")]
    pub min_drop_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,
}
