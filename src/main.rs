//! Interactive TUI dashboard for watching hedged races.
//!
//! Runs a simulated remote call with a configurable slow tail through a
//! [`hedged_race::RaceEngine`] and shows:
//! - Primary vs hedge wins and failures
//! - The current cutoff and the adaptive window
//! - Latency trends per winning branch
//! - Batch runs for quickly filling the window

mod app;
mod env;
mod sim;
mod ui;

use std::time::Duration;

use app::{App, AppEvent};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use env::{hedge_config_from_env, workload_from_env};
use sim::spawn_race;
use tokio::sync::mpsc;
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cfg = hedge_config_from_env()?;
    let workload = workload_from_env()?;
    let mut app = App::new(cfg, workload)?;

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app).await;

    ratatui::restore();

    result
}

async fn run_app(terminal: &mut ratatui::DefaultTerminal, app: &mut App) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    loop {
        while let Ok(ev) = rx.try_recv() {
            match ev {
                AppEvent::RaceFinished {
                    branch,
                    latency_ms,
                    cutoff_ms,
                    ok,
                    message,
                } => {
                    app.set_last_result(branch, latency_ms, cutoff_ms, ok, message);
                }
            }
        }

        terminal.draw(|frame| draw_ui(frame, app))?;

        if app.should_run_call() {
            spawn_race(app, tx.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if crossterm::event::poll(Duration::from_millis(50))? {
            if let Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            {
                match code {
                    KeyCode::Char('q') => break,
                    KeyCode::Tab => app.toggle_estimator()?,
                    KeyCode::Char('t') => app.toggle_tail(),
                    KeyCode::Char('r') => {
                        spawn_race(app, tx.clone());
                    }
                    KeyCode::Char('b') => {
                        app.toggle_batch_mode();
                    }
                    KeyCode::Char('[') | KeyCode::Char(',') => {
                        app.decrease_batch_count();
                    }
                    KeyCode::Char(']') | KeyCode::Char('.') | KeyCode::Char('/') => {
                        app.increase_batch_count();
                    }
                    KeyCode::Char('s') => app.reset()?,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
