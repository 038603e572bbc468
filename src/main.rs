use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use lecquiz::app::{App, CatalogSource};
use lecquiz::config::Config;
use lecquiz::generator::DemoBackend;
use lecquiz::remote::{ApiError, QuizBackend, SheetsClient};
use lecquiz::session::{Phase, QuizSession};
use lecquiz::store::JsonStore;
use lecquiz::ui::input::{Command, parse_line, parse_yes_no};
use lecquiz::ui::render;

#[derive(Parser)]
#[command(name = "lecquiz", version, about = "Lecture quiz with gated levels and resumable sessions")]
struct Cli {
    #[arg(short, long, help = "Config file (default: <config dir>/lecquiz/config.toml)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Base URL of the quiz API")]
    api_url: Option<String>,

    #[arg(long, help = "Use the built-in demo course")]
    demo: bool,

    #[arg(short, long, help = "Sign in with this email")]
    email: Option<String>,

    #[arg(short, long, help = "Display name", requires = "email")]
    name: Option<String>,

    #[arg(long, conflicts_with = "email", help = "Play as a guest")]
    anonymous: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List levels with their unlock state and best scores
    Levels,
    /// Play a level
    Play {
        level: String,
        #[arg(long, conflicts_with = "restart", help = "Resume a saved attempt without asking")]
        resume: bool,
        #[arg(long, help = "Discard any saved attempt and start over")]
        restart: bool,
    },
    /// Show lecture materials and other course links
    Links,
    /// Show your past attempts
    History {
        #[arg(short, long)]
        level: Option<String>,
    },
    /// Best attempt per user and level (administrators)
    Report,
    /// Check the question bank for content problems
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = &cli.api_url {
        config.api_url = url.trim().to_string();
    }

    let store = JsonStore::with_base_dir(config.data_path())
        .with_context(|| format!("opening data directory {}", config.data_dir))?;
    let mut app = build_app(config, store, cli.demo)?;

    app.load_catalog()?;
    if app.source() == CatalogSource::Demo {
        eprintln!("Using the built-in demo course.");
    }

    match cli.command {
        Cmd::Validate => {
            let issues = app.validate_content()?;
            if issues.is_empty() {
                println!("No content problems found.");
            } else {
                for issue in &issues {
                    println!("{issue}");
                }
                bail!("{} content problem(s)", issues.len());
            }
        }
        Cmd::Levels => {
            sign_in(&mut app, &cli.email, &cli.name, cli.anonymous)?;
            print!("{}", render::level_list(&app.level_overview()));
        }
        Cmd::Links => {
            print!("{}", render::links(&app.links()?));
        }
        Cmd::History { level } => {
            sign_in(&mut app, &cli.email, &cli.name, cli.anonymous)?;
            print!(
                "{}",
                render::history(app.history(), app.levels(), level.as_deref())
            );
        }
        Cmd::Report => {
            sign_in(&mut app, &cli.email, &cli.name, cli.anonymous)?;
            print!("{}", render::report(&app.admin_report()?));
        }
        Cmd::Play {
            level,
            resume,
            restart,
        } => {
            sign_in(&mut app, &cli.email, &cli.name, cli.anonymous)?;
            play(&mut app, &level, resume, restart)?;
        }
    }

    Ok(())
}

fn build_app(config: Config, store: JsonStore, demo: bool) -> Result<App> {
    if demo {
        let mut app = App::new(config, Arc::new(DemoBackend::new()), store);
        app.use_demo_course();
        return Ok(app);
    }
    match SheetsClient::new(&config.api_url) {
        Ok(client) => {
            let backend: Arc<dyn QuizBackend> = Arc::new(client);
            Ok(App::new(config, backend, store))
        }
        Err(ApiError::NotConfigured) if config.demo_fallback => {
            let mut app = App::new(config, Arc::new(DemoBackend::new()), store);
            app.use_demo_course();
            Ok(app)
        }
        Err(e) => Err(e).context("set `api_url` in the config, pass --api-url, or use --demo"),
    }
}

fn sign_in(
    app: &mut App,
    email: &Option<String>,
    name: &Option<String>,
    anonymous: bool,
) -> Result<()> {
    match email {
        Some(email) => {
            let identity = app.login(email, name.as_deref().unwrap_or(""))?;
            debug!(email = %identity.email, "signed in from command line");
        }
        None if anonymous || !app.config.require_auth => {
            app.login_anonymous()?;
        }
        None => bail!("sign in with --email (guests are disabled by configuration)"),
    }
    Ok(())
}

/// Print `prompt` and read one line. `None` on end of input.
fn read_line(prompt: &str) -> Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn play(app: &mut App, level_id: &str, resume: bool, restart: bool) -> Result<()> {
    let mut session = app.start_level(level_id)?;
    session.start()?;

    if session.phase() == Phase::CacheOffered {
        let take_it = if resume {
            true
        } else if restart {
            false
        } else {
            ask_resume(&session)?
        };
        if take_it {
            session.resume_offered()?;
        } else {
            session.begin_fresh();
        }
    }

    if !run_questions(&mut session)? {
        if session.abandon().is_some() {
            println!("\nProgress kept. Run `play {level_id}` again to resume.");
        }
        return Ok(());
    }

    if let Some(record) = session.take_record() {
        print!("{}", render::summary(&record, app.level(level_id)));
        app.record_completion(record);
        app.wait_for_saves();
        for notice in app.drain_notices() {
            println!("{}", render::notice(&notice));
        }
    }
    Ok(())
}

fn ask_resume(session: &QuizSession) -> Result<bool> {
    let Some(snapshot) = session.pending_snapshot() else {
        return Ok(false);
    };
    let prompt = render::resume_offer(snapshot, session.bank_size());
    loop {
        match read_line(&prompt)? {
            None => return Ok(false),
            Some(line) => {
                if let Some(answer) = parse_yes_no(&line) {
                    return Ok(answer);
                }
            }
        }
    }
}

/// Drive the session until it completes. `false` when the user left early.
fn run_questions(session: &mut QuizSession) -> Result<bool> {
    loop {
        match session.phase() {
            Phase::Completed => return Ok(true),
            Phase::Answering => {
                if !answer_current(session)? {
                    return Ok(false);
                }
            }
            Phase::ResultShown => {
                if session.can_retry() {
                    match read_line("Try again? [y/n] ")?.as_deref().map(parse_yes_no) {
                        None => return Ok(false),
                        Some(Some(true)) => {
                            if !answer_current(session)? {
                                return Ok(false);
                            }
                            continue;
                        }
                        Some(_) => {}
                    }
                } else {
                    match read_line("Press Enter to continue (q to leave) ")? {
                        None => return Ok(false),
                        Some(line) if line.trim().eq_ignore_ascii_case("q") => return Ok(false),
                        Some(_) => {}
                    }
                }
                session.next()?;
            }
            phase => bail!("session stuck in {phase:?}"),
        }
    }
}

/// Prompt for the current question until a valid answer, skip or quit.
fn answer_current(session: &mut QuizSession) -> Result<bool> {
    loop {
        let Some(current) = session.current_question() else {
            return Ok(true);
        };
        let elapsed = session
            .settings()
            .show_timer
            .then(|| session.tick().unwrap_or_else(|| session.elapsed_secs(Utc::now())));
        let prompt = render::question_prompt(current, session.index(), session.total(), elapsed);
        let Some(line) = read_line(&prompt)? else {
            return Ok(false);
        };
        let command = parse_line(&current.question, &line);

        match command {
            Command::Quit => return Ok(false),
            Command::Invalid(reason) => println!("{reason}"),
            Command::Skip => match session.skip() {
                Ok(_) => return Ok(true),
                Err(e) => println!("{e}"),
            },
            Command::Answer(answers) => match session.submit(&answers) {
                Ok(outcome) => {
                    print!("{}", render::outcome(&outcome));
                    return Ok(true);
                }
                Err(e) => {
                    warn!(error = %e, "answer not accepted");
                    println!("{e}");
                }
            },
        }
    }
}
