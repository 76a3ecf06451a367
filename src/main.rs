use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod actions;
mod app;
mod config;
mod date_input;
mod integrations;
mod models;
mod pomodoro;
mod runtime;
mod stats;
mod storage;

use app::App;
use chrono::Local;
use config::Config;
use integrations::auth::{AuthProvider, TokenFileAuth};
use models::{Document, Habit, date_key};
use runtime::tick;

/// Track habits, daily tasks, notes and focus time in one JSON document.
#[derive(Parser)]
#[command(name = "habitlog", version, about)]
struct Cli {
    /// More log output (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show habits, tasks, note and focus time for a day.
    Show {
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Manage recurring habits.
    Habit {
        #[command(subcommand)]
        command: HabitCommand,
    },
    /// Manage tasks scoped to one day.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Replace the note for a day. Reads stdin when TEXT is `-`.
    Note {
        text: String,
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Add focused minutes to today (defaults to one work session).
    Pomodoro {
        #[arg(allow_negative_numbers = true)]
        minutes: Option<i64>,
    },
    /// Run a pomodoro focus timer, crediting each finished work phase.
    Focus {
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=12))]
        sessions: u64,
    },
    /// Replace all data with an exported JSON file.
    Import { file: PathBuf },
    /// Print all data as JSON, or write it to FILE.
    Export { file: Option<PathBuf> },
    /// Erase all data.
    Reset {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
    /// Streaks, active days and total focus time.
    Stats {
        /// Days in the completion heatmap.
        #[arg(
            long,
            default_value_t = 42,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(stats::MAX_HEATMAP_DAYS))
        )]
        days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Remote storage session.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand)]
enum HabitCommand {
    List,
    Add {
        label: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Defaults to the slugified label.
        #[arg(long)]
        id: Option<String>,
    },
    Update {
        id: String,
        #[arg(short, long)]
        label: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    Remove {
        id: String,
    },
    /// Move the given habits to the front, in this order.
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Toggle {
        id: String,
        #[arg(short, long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        label: String,
        #[arg(short, long)]
        date: Option<String>,
    },
    Remove {
        id: String,
        #[arg(short, long)]
        date: Option<String>,
    },
    Toggle {
        id: String,
        #[arg(short, long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Store an access token obtained from the OAuth flow.
    Login {
        #[arg(long)]
        token: String,
        /// Token lifetime in seconds.
        #[arg(long)]
        expires_in: Option<u64>,
    },
    Logout,
    Status,
}

const TICK_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load();
    init_logger(&config, cli.verbose);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.log.level.as_str(),
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli, config: Config) -> Result<(), Box<dyn Error>> {
    let auth = Arc::new(TokenFileAuth::new(&config.auth.token_path));

    if let Commands::Auth { command } = &cli.command {
        return run_auth(command, auth, config);
    }

    let mut app = App::new(config, auth);
    if let Some(err) = app.error.clone() {
        // The document could not be loaded, so any write would clobber remote data.
        return Err(err.into());
    }

    match cli.command {
        Commands::Show { date } => {
            let date = resolve_date(date.as_deref())?;
            print_day(&app.document, &date);
            let storage = match (app.active_backend.as_str(), app.remote_ready()) {
                ("local", true) => "local (sign in to sync)",
                (name, _) => name,
            };
            println!("Storage: {storage}");
        }
        Commands::Habit { command } => run_habit(&mut app, command)?,
        Commands::Task { command } => run_task(&mut app, command)?,
        Commands::Note { text, date } => {
            let date = resolve_date(date.as_deref())?;
            let text = if text == "-" {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                text
            };
            app.save_note(&date, text.trim_end());
        }
        Commands::Pomodoro { minutes } => {
            let default = i64::try_from(app.config.pomodoro.work_minutes).unwrap_or(i64::MAX);
            let minutes = minutes.unwrap_or(default);
            app.update_pomodoro_time(minutes);
            let today = models::today_key();
            println!(
                "{} focused today",
                stats::format_focus_time(app.document.minutes_for(&today))
            );
        }
        Commands::Focus { sessions } => run_focus(&mut app, sessions),
        Commands::Import { file } => {
            let text = fs::read_to_string(&file)?;
            app.import_json(&text)?;
            println!("Imported {} habits.", app.document.habits.len());
        }
        Commands::Export { file } => {
            let json = app.export_json();
            match file {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                return Err("refusing to erase data without --yes".into());
            }
            app.reset();
        }
        Commands::Stats { days, json } => {
            let today = Local::now().date_naive();
            let summary = stats::summarize(&app.document, today);
            if json {
                let heatmap = stats::heatmap(&app.document, today, days);
                let out = serde_json::json!({ "summary": summary, "heatmap": heatmap });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_stats(&summary);
            }
        }
        Commands::Auth { .. } => {}
    }

    runtime::flush(&mut app);
    match app.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn run_habit(app: &mut App, command: HabitCommand) -> Result<(), Box<dyn Error>> {
    match command {
        HabitCommand::List => {
            for habit in &app.document.habits {
                println!("{:<20} {}", habit.id, habit.label);
            }
        }
        HabitCommand::Add {
            label,
            description,
            id,
        } => {
            let mut habit = Habit::from_label(&label, &description);
            if let Some(id) = id {
                habit.id = id;
            }
            if habit.id.is_empty() {
                return Err("habit label must not be empty".into());
            }
            if app.document.habit(&habit.id).is_some() {
                return Err(format!("habit `{}` already exists", habit.id).into());
            }
            println!("Added habit `{}`.", habit.id);
            app.add_habit(habit);
        }
        HabitCommand::Update {
            id,
            label,
            description,
        } => {
            let Some(existing) = app.document.habit(&id) else {
                return Err(format!("no habit `{id}`").into());
            };
            let updated = Habit {
                id: existing.id.clone(),
                label: label.unwrap_or_else(|| existing.label.clone()),
                description: description.unwrap_or_else(|| existing.description.clone()),
            };
            app.update_habit(updated);
        }
        HabitCommand::Remove { id } => {
            if app.document.habit(&id).is_none() {
                return Err(format!("no habit `{id}`").into());
            }
            app.delete_habit(&id);
        }
        HabitCommand::Reorder { ids } => {
            let ordered = reordered_habits(&app.document, &ids)?;
            app.reorder_habits(ordered);
        }
        HabitCommand::Toggle { id, date } => {
            let date = resolve_date(date.as_deref())?;
            if app.document.habit(&id).is_none() {
                return Err(format!("no habit `{id}`").into());
            }
            app.toggle_habit(&date, &id);
            print_check(app.document.is_done(&date, &id), &id, &date);
        }
    }
    Ok(())
}

fn run_task(app: &mut App, command: TaskCommand) -> Result<(), Box<dyn Error>> {
    match command {
        TaskCommand::Add { label, date } => {
            let date = resolve_date(date.as_deref())?;
            app.add_daily_task(&date, &label);
            if let Some(task) = app.document.tasks_for(&date).last() {
                println!("Added task {} for {date}.", task.id);
            }
        }
        TaskCommand::Remove { id, date } => {
            let date = resolve_date(date.as_deref())?;
            if !app.document.tasks_for(&date).iter().any(|t| t.id == id) {
                return Err(format!("no task `{id}` on {date}").into());
            }
            app.delete_daily_task(&date, &id);
        }
        TaskCommand::Toggle { id, date } => {
            let date = resolve_date(date.as_deref())?;
            if !app.document.tasks_for(&date).iter().any(|t| t.id == id) {
                return Err(format!("no task `{id}` on {date}").into());
            }
            app.toggle_daily_task(&date, &id);
            print_check(app.document.is_done(&date, &id), &id, &date);
        }
    }
    Ok(())
}

fn run_auth(
    command: &AuthCommand,
    auth: Arc<TokenFileAuth>,
    config: Config,
) -> Result<(), Box<dyn Error>> {
    if let AuthCommand::Status = command {
        if auth.is_authenticated() && config.remote.enabled {
            println!("signed in (remote: {})", config.remote.file_name);
        } else if auth.is_authenticated() {
            println!("signed in, but remote storage is disabled");
        } else {
            println!("signed out (local: {:?})", config.data.local_path);
        }
        return Ok(());
    }

    // Load under the current session first, so the switch is observed like
    // any other auth transition and the new backend is read.
    let mut app = App::new(config, auth.clone());
    match command {
        AuthCommand::Login { token, expires_in } => auth.login(token, *expires_in)?,
        AuthCommand::Logout => auth.logout()?,
        AuthCommand::Status => {}
    }
    tick(&mut app);

    if auth.is_authenticated() {
        println!("Signed in.");
    } else {
        println!("Signed out. Data will be kept locally.");
    }
    println!(
        "Using {} storage ({} habits).",
        app.active_backend.as_str(),
        app.document.habits.len()
    );
    match app.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Runs the timer to completion, ticking the controller so auth changes and
/// write results are handled while it waits.
fn run_focus(app: &mut App, sessions: u64) {
    app.start_focus(sessions);
    loop {
        if let Some(notice) = app.notice.take() {
            println!("{notice}");
        }
        if app.focus.is_none() {
            break;
        }
        thread::sleep(TICK_INTERVAL);
        tick(app);
    }
}

/// Puts `ids` first in the given order and keeps every other habit after them.
fn reordered_habits(doc: &Document, ids: &[String]) -> Result<Vec<Habit>, String> {
    let mut ordered = Vec::with_capacity(doc.habits.len());
    for id in ids {
        let Some(habit) = doc.habit(id) else {
            return Err(format!("no habit `{id}`"));
        };
        if ordered.iter().any(|h: &Habit| &h.id == id) {
            return Err(format!("habit `{id}` listed twice"));
        }
        ordered.push(habit.clone());
    }
    for habit in &doc.habits {
        if !ids.contains(&habit.id) {
            ordered.push(habit.clone());
        }
    }
    Ok(ordered)
}

fn resolve_date(input: Option<&str>) -> Result<String, String> {
    let today = Local::now().date_naive();
    match input {
        None => Ok(date_key(today)),
        Some(raw) => date_input::parse_relative_date_input(raw, today)
            .map(date_key)
            .ok_or_else(|| format!("unrecognised date `{raw}`")),
    }
}

fn print_check(done: bool, id: &str, date: &str) {
    let mark = if done { "x" } else { " " };
    println!("[{mark}] {id} ({date})");
}

fn print_day(doc: &Document, date: &str) {
    println!("{date}");
    println!("Habits:");
    if doc.habits.is_empty() {
        println!("  (none)");
    }
    for habit in &doc.habits {
        let mark = if doc.is_done(date, &habit.id) { "x" } else { " " };
        println!("  [{mark}] {:<20} {}", habit.id, habit.label);
    }

    let tasks = doc.tasks_for(date);
    if !tasks.is_empty() {
        println!("Tasks:");
        for task in tasks {
            let mark = if doc.is_done(date, &task.id) { "x" } else { " " };
            println!("  [{mark}] {}  ({})", task.label, task.id);
        }
    }

    let note = doc.note_for(date);
    if !note.is_empty() {
        println!("Note:");
        for line in note.lines() {
            println!("  {line}");
        }
    }

    println!("Focus: {}", stats::format_focus_time(doc.minutes_for(date)));
}

fn print_stats(summary: &stats::Summary) {
    println!("Current streak:    {} days", summary.streak);
    println!("Total active days: {}", summary.total_active_days);
    println!("Total focus time:  {}", summary.focus_time);
    if !summary.habits.is_empty() {
        println!("Habit streaks:");
        for habit in &summary.habits {
            println!("  {:<20} {}", habit.id, habit.streak);
        }
    }

    println!("Milestones:");
    for milestone in &summary.milestones {
        let mark = if milestone.unlocked { "x" } else { " " };
        println!("  [{mark}] {:>3} days  {}", milestone.days, milestone.label);
    }

    println!("Monthly summary:");
    if summary.months.is_empty() {
        println!("  No active days recorded yet.");
    }
    for month in &summary.months {
        println!("  {:<16} {} days", month.label, month.active_days);
    }
}
