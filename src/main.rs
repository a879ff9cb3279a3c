mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use keydrill::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    game::{Game, Phase},
    pack::{builtin_ids, Pack},
    progress::{MemoryProgressStore, ProgressStore, SqliteProgressStore},
    runtime::{CrosstermEventSource, DrillEvent, FixedTicker, Runner},
    timer::SystemClock,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, stdin},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// terminal keybinding trainer with spaced repetition
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Drill keybindings from built-in packs. Commands you miss come back immediately; commands you know come back less and less often."
)]
pub struct Cli {
    /// pack to train (see --list-packs)
    #[clap(short = 'p', long)]
    pack: Option<String>,

    /// number of commands per session
    #[clap(short = 'n', long)]
    commands: Option<usize>,

    /// multiply every time limit by this factor (must be positive)
    #[clap(short = 't', long, value_parser = parse_time_scale)]
    time_scale: Option<f64>,

    /// do not write progress back to disk
    #[clap(long)]
    no_save: bool,

    /// store the given options as the new defaults
    #[clap(long)]
    save_config: bool,

    /// list the built-in packs and exit
    #[clap(long)]
    list_packs: bool,

    /// forget all saved progress for the pack and exit
    #[clap(long)]
    reset_progress: bool,
}

fn parse_time_scale(s: &str) -> Result<f64, String> {
    let scale: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(format!("{s} is not a positive number"))
    }
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(pack) = &self.pack {
            cfg.pack = pack.clone();
        }
        if let Some(n) = self.commands {
            cfg.commands_per_session = n.max(1);
        }
        if let Some(scale) = self.time_scale {
            cfg.time_scale = scale;
        }
        if self.no_save {
            cfg.save_progress = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Training,
    Summary,
}

pub struct App {
    pub pack: Pack,
    pub game: Game<Box<dyn ProgressStore>>,
    pub state: AppState,
}

impl App {
    pub fn new(pack: Pack, store: Box<dyn ProgressStore>, cfg: &Config) -> Result<Self, Box<dyn Error>> {
        let mut game = Game::new(&pack, store, cfg, Arc::new(SystemClock))?;
        game.start()?;
        Ok(Self {
            pack,
            game,
            state: AppState::Training,
        })
    }

    fn sync_state(&mut self) {
        if self.game.phase() == Phase::Finished {
            self.state = AppState::Summary;
        }
    }
}

fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keydrill=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn open_store() -> Box<dyn ProgressStore> {
    match SqliteProgressStore::open_default() {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "progress database unavailable, progress will not persist");
            Box::new(MemoryProgressStore::new())
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    if cli.list_packs {
        for id in builtin_ids() {
            let pack = Pack::builtin(&id)?;
            println!("{:<8} {} ({} commands)", id, pack.name, pack.command_count());
        }
        return Ok(());
    }

    let config_store = FileConfigStore::new();
    let mut cfg = config_store.load();
    cli.apply(&mut cfg);
    if cli.save_config {
        config_store.save(&cfg)?;
    }

    let pack = Pack::builtin(&cfg.pack)?;
    let store = open_store();

    if cli.reset_progress {
        let mut game = Game::new(&pack, store, &cfg, Arc::new(SystemClock))?;
        if game.reset_progress(&pack)? {
            println!("progress for '{}' cleared", pack.id);
        } else {
            println!("no saved progress for '{}'", pack.id);
        }
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut app = App::new(pack, store, &cfg)?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, cfg.tick_rate_ms);
    let finished = app.game.finish();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    finished?;
    Ok(())
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    tick_rate_ms: u64,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(tick_rate_ms)),
    );

    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    loop {
        match runner.step() {
            DrillEvent::Tick => {
                if app.state == AppState::Training {
                    app.game.on_tick()?;
                    app.sync_state();
                }
            }
            DrillEvent::Resize => {}
            DrillEvent::Key(key) => match app.state {
                AppState::Training => {
                    match key.as_str() {
                        "ctrl+c" => {
                            app.game.finish()?;
                        }
                        "ctrl+p" => app.game.toggle_pause(),
                        _ => {
                            app.game.handle_key(&key)?;
                        }
                    }
                    app.sync_state();
                }
                AppState::Summary => match key.as_str() {
                    "esc" | "ctrl+c" => break,
                    "n" => {
                        app.game.restart()?;
                        app.state = AppState::Training;
                    }
                    _ => {}
                },
            },
        }

        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }

    Ok(())
}
