use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{KeyCode, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use std::error::Error;
use std::fs::File;
use std::io::{self, stdin, Write};
use std::path::PathBuf;
use std::time::Duration;

use typerate::analytics::{self, Window};
use typerate::config::{Config, ConfigStore, FileConfigStore};
use typerate::result::TestResult;
use typerate::runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker};
use typerate::session::{CharState, Phase, Session};
use typerate::source::{fetch_or_fallback, FixedTextSource, PassageBank, TextSource};
use typerate::store::{self, ResultSink, ResultsDb};

const TICK_RATE_MS: u64 = 100;

/// terminal typing trainer with live speed feedback and local leaderboards
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// custom passage to type instead of one from the built-in bank
    #[clap(short, long)]
    passage: Option<String>,

    /// name recorded with submitted results (overrides the config file)
    #[clap(short, long)]
    username: Option<String>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// show averages, best results, and recent activity over a time window
    Stats {
        #[clap(short, long, value_enum, default_value_t = Window::All)]
        window: Window,
    },
    /// rank recorded users by peak speed
    Leaderboard {
        #[clap(short, long, value_enum, default_value_t = Window::All)]
        window: Window,

        /// number of entries to show (defaults to the configured limit)
        #[clap(short, long)]
        limit: Option<usize>,
    },
    /// dump the full result history as CSV
    Export {
        /// write to a file instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Screen {
    Typing,
    Results,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = FileConfigStore::new().load();
    let username = cli
        .username
        .clone()
        .unwrap_or_else(|| config.username.clone());

    match &cli.command {
        Some(Command::Stats { window }) => show_stats(&username, *window, &config),
        Some(Command::Leaderboard { window, limit }) => {
            show_leaderboard(&username, *window, limit.unwrap_or(config.leaderboard_limit))
        }
        Some(Command::Export { output }) => export_history(&username, output.clone()),
        None => run_typing(&cli, &username),
    }
}

fn run_typing(cli: &Cli, username: &str) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let source: Box<dyn TextSource> = match &cli.passage {
        Some(p) => Box::new(FixedTextSource(p.clone())),
        None => Box::new(PassageBank::new()),
    };

    // Practicing continues even when the local store can't be opened.
    let db = ResultsDb::new(username).ok();
    let mut warnings: Vec<String> = Vec::new();
    let mut session = Session::new(fetch_or_fallback(source.as_ref()));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    let outcome = drive(
        &runner,
        &mut session,
        &mut stdout,
        source.as_ref(),
        db.as_ref(),
        &mut warnings,
    );

    execute!(stdout, cursor::Show, LeaveAlternateScreen)?;
    disable_raw_mode()?;

    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    match outcome {
        Ok(Some(result)) => {
            print_summary(&result, db.as_ref());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Single-threaded event loop: each key or tick is processed to completion
/// before the next is taken, so session mutations stay in delivery order.
fn drive<E: EventSource, T: Ticker>(
    runner: &Runner<E, T>,
    session: &mut Session,
    stdout: &mut impl Write,
    source: &dyn TextSource,
    db: Option<&ResultsDb>,
    warnings: &mut Vec<String>,
) -> Result<Option<TestResult>, Box<dyn Error>> {
    let mut buffer = String::new();
    let mut screen = Screen::Typing;
    let mut last_result: Option<TestResult> = None;

    draw_typing(stdout, session)?;

    loop {
        match runner.step() {
            AppEvent::Tick => {
                if screen == Screen::Typing && session.phase == Phase::Active {
                    session.on_tick();
                    draw_typing(stdout, session)?;
                }
            }
            AppEvent::Resize => match screen {
                Screen::Typing => draw_typing(stdout, session)?,
                Screen::Results => {
                    if let Some(result) = &last_result {
                        draw_results(stdout, result, db)?;
                    }
                }
            },
            AppEvent::Key(key) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    return Ok(last_result);
                }

                match screen {
                    Screen::Typing => {
                        let changed = match key.code {
                            KeyCode::Esc => return Ok(last_result),
                            KeyCode::Backspace => {
                                buffer.pop();
                                true
                            }
                            KeyCode::Char(c) => {
                                buffer.push(c);
                                true
                            }
                            _ => false,
                        };

                        if changed {
                            // A deletion can also complete the attempt, when it
                            // trims an overshoot back to an exact match.
                            if let Some(result) = session.on_input(&buffer) {
                                // Completion stands even if persistence fails;
                                // the failure is reported once and not retried.
                                if let Some(db) = db {
                                    if let Err(e) = db.submit(&result) {
                                        warnings.push(format!("result not saved: {e}"));
                                    } else if let Err(e) = store::append_log(&result) {
                                        warnings.push(format!("run log not updated: {e}"));
                                    }
                                }
                                draw_results(stdout, &result, db)?;
                                last_result = Some(result);
                                screen = Screen::Results;
                            } else {
                                draw_typing(stdout, session)?;
                            }
                        }
                    }
                    Screen::Results => match key.code {
                        KeyCode::Char('r') => {
                            session.reset(fetch_or_fallback(source));
                            buffer.clear();
                            screen = Screen::Typing;
                            draw_typing(stdout, session)?;
                        }
                        KeyCode::Esc | KeyCode::Char('q') => return Ok(last_result),
                        _ => {}
                    },
                }
            }
        }
    }
}

fn draw_typing(stdout: &mut impl Write, session: &Session) -> io::Result<()> {
    queue!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        ResetColor,
        Print(format!(
            "wpm {:>3}   accuracy {:>3}%   elapsed {:>3}s",
            session.wpm, session.accuracy, session.elapsed_secs
        )),
        cursor::MoveTo(0, 2)
    )?;

    for (state, expected) in session
        .char_states()
        .into_iter()
        .zip(session.prompt.chars())
    {
        let color = match state {
            CharState::Pending => Color::DarkGrey,
            CharState::Correct => Color::Green,
            CharState::Incorrect => Color::Red,
        };
        queue!(stdout, SetForegroundColor(color), Print(expected))?;
    }

    queue!(stdout, ResetColor, cursor::MoveTo(0, 5), Print("esc to quit"))?;
    stdout.flush()
}

fn draw_results(
    stdout: &mut impl Write,
    result: &TestResult,
    db: Option<&ResultsDb>,
) -> io::Result<()> {
    queue!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        ResetColor,
        Print("test complete"),
        cursor::MoveTo(0, 2),
        Print(format!(
            "wpm {}   accuracy {}%   time {}s",
            result.wpm, result.accuracy, result.time_elapsed
        )),
        cursor::MoveTo(0, 3),
        Print(format!(
            "{} characters, {} correct, {} incorrect",
            result.total_characters, result.correct_characters, result.incorrect_characters
        ))
    )?;

    if let Some(line) = today_line(db) {
        queue!(stdout, cursor::MoveTo(0, 5), Print(line))?;
    }

    queue!(
        stdout,
        cursor::MoveTo(0, 7),
        Print("(r) new passage   (esc) quit")
    )?;
    stdout.flush()
}

fn today_line(db: Option<&ResultsDb>) -> Option<String> {
    let db = db?;
    let all = db.fetch_all().ok()?;
    let today = analytics::filter_by_window(&all, Window::Today, Local::now());
    Some(format!(
        "today: {} tests, avg {} wpm, avg {}% accuracy",
        today.len(),
        analytics::average_wpm(&today),
        analytics::average_accuracy(&today)
    ))
}

fn print_summary(result: &TestResult, db: Option<&ResultsDb>) {
    println!(
        "wpm {}   accuracy {}%   time {}s   ({} characters, {} missed)",
        result.wpm,
        result.accuracy,
        result.time_elapsed,
        result.total_characters,
        result.incorrect_characters
    );
    if let Some(line) = today_line(db) {
        println!("{line}");
    }
}

fn show_stats(username: &str, window: Window, config: &Config) -> Result<(), Box<dyn Error>> {
    let db = ResultsDb::new(username)?;
    let all = db.fetch_all()?;
    let filtered = analytics::filter_by_window(&all, window, Local::now());

    println!(
        "{} results ({})",
        filtered.len(),
        window.to_string().to_lowercase()
    );
    println!(
        "average: {} wpm, {}% accuracy",
        analytics::average_wpm(&filtered),
        analytics::average_accuracy(&filtered)
    );

    let best = analytics::best_n(&filtered, 10);
    if !best.is_empty() {
        println!();
        println!("best results");
        for (i, r) in best.iter().enumerate() {
            println!(
                "{:>3}. {:>4} wpm  {:>3}%  {:>4}s  {}",
                i + 1,
                r.wpm,
                r.accuracy,
                r.time_elapsed,
                date_of(r)
            );
        }
    }

    let recent = db.fetch_recent(config.recent_limit)?;
    if !recent.is_empty() {
        println!();
        println!("recent activity");
        for r in &recent {
            println!(
                "     {:>4} wpm  {:>3}%  {:>4}s  {}",
                r.wpm,
                r.accuracy,
                r.time_elapsed,
                date_of(r)
            );
        }
    }

    Ok(())
}

fn show_leaderboard(username: &str, window: Window, limit: usize) -> Result<(), Box<dyn Error>> {
    let db = ResultsDb::new(username)?;
    let entries = analytics::build_leaderboard(&db.fetch_all()?, window, limit, Local::now());

    if entries.is_empty() {
        println!("no results for this period");
        return Ok(());
    }

    for (i, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}. {:<20} {:>4} wpm   {:>3}% acc   {:>4} tests",
            i + 1,
            entry.username,
            entry.max_wpm,
            entry.avg_accuracy,
            entry.test_count
        );
    }

    Ok(())
}

fn export_history(username: &str, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = ResultsDb::new(username)?;
    let results = db.fetch_all()?;

    match output {
        Some(path) => store::export_csv(&results, File::create(path)?)?,
        None => store::export_csv(&results, io::stdout().lock())?,
    }

    Ok(())
}

fn date_of(result: &TestResult) -> String {
    result
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
