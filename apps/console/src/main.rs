use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use client_core::{
    load_settings, load_settings_file, store_from_settings, NoticeKind, RestClient, ViewEvent,
    ViewModel,
};
use shared::domain::{Domain, UserRecord};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info};

mod render;

#[derive(Parser, Debug)]
struct Args {
    /// REST backend base URL; overrides settings and the host fallback.
    #[arg(long)]
    backend_url: Option<String>,
    /// Firebase Realtime Database URL. Without one an in-process store is used.
    #[arg(long)]
    realtime_url: Option<String>,
    /// Settings file to read instead of ./client.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = Domain::default())]
    domain: Domain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Domain(Domain),
    Name(String),
    Email(String),
    Submit,
    Add { name: String, email: String },
    Show,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));

    let command = match word {
        "domain" => Command::Domain(rest.parse()?),
        "name" => Command::Name(rest.to_string()),
        "email" => Command::Email(rest.to_string()),
        "submit" => Command::Submit,
        "add" => {
            let Some((name, email)) = rest.rsplit_once(char::is_whitespace) else {
                bail!("usage: add <name> <email>");
            };
            Command::Add {
                name: name.trim().to_string(),
                email: email.to_string(),
            }
        }
        "show" => Command::Show,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command `{other}`; try `help`"),
    };
    Ok(command)
}

fn notice_prefix(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Success => "✅",
        NoticeKind::Validation => "⚠",
        NoticeKind::Rest | NoticeKind::Diverged => "❌",
    }
}

/// Last settled contents of one section; prints again only on change.
#[derive(Default)]
struct SectionTracker {
    shown: Option<Vec<UserRecord>>,
}

impl SectionTracker {
    fn update(&mut self, title: &str, loading: bool, users: &[UserRecord]) {
        if loading {
            self.shown = None;
            return;
        }
        if self.shown.as_deref() != Some(users) {
            print!("{}", render::section(title, false, users));
            self.shown = Some(users.to_vec());
        }
    }
}

/// Prints notices and re-renders a section whenever a fetch or pushed update
/// settles it with new contents.
async fn watch_events(view: Arc<ViewModel>) {
    let mut events = view.subscribe_events();
    let mut realtime = SectionTracker::default();
    let mut rest = SectionTracker::default();
    loop {
        match events.recv().await {
            Ok(ViewEvent::Notice(notice)) => {
                println!("{} {}", notice_prefix(notice.kind), notice.message);
            }
            Ok(ViewEvent::StateChanged) => {
                let state = view.snapshot();
                realtime.update(
                    render::REALTIME_TITLE,
                    state.realtime_loading,
                    &state.realtime_users,
                );
                rest.update(render::REST_TITLE, state.rest_loading, &state.rest_users);
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "console: view events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn spawn_refresh(view: &Arc<ViewModel>) {
    let view = Arc::clone(view);
    tokio::spawn(async move { view.refresh_rest().await });
}

fn spawn_submit(view: &Arc<ViewModel>) {
    let (form, domain) = view.pending_submission();
    let view = Arc::clone(view);
    tokio::spawn(async move {
        if let Err(err) = view.submit_form(form, domain).await {
            debug!(error = %err, "console: submit rejected");
        }
    });
}

/// Applies one command without waiting on the network. Fetches and
/// submissions run as tasks and report back through view events. Returns
/// `false` on `quit`.
fn dispatch(view: &Arc<ViewModel>, command: Command) -> bool {
    match command {
        Command::Domain(domain) => {
            view.select_domain(domain);
            println!("{}", render::view(&view.snapshot()));
            spawn_refresh(view);
        }
        Command::Name(name) => view.set_name(name),
        Command::Email(email) => view.set_email(email),
        Command::Submit => spawn_submit(view),
        Command::Add { name, email } => {
            view.set_name(name);
            view.set_email(email);
            spawn_submit(view);
        }
        Command::Show => println!("{}", render::view(&view.snapshot())),
        Command::Help => println!("{}", render::help()),
        Command::Quit => return false,
    }
    true
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_file(path),
        None => load_settings(),
    };
    if args.backend_url.is_some() {
        settings.backend_url = args.backend_url.clone();
    }
    if args.realtime_url.is_some() {
        settings.realtime_url = args.realtime_url.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    let rest = RestClient::new(settings.backend_base_url());
    let realtime = store_from_settings(&settings)?;
    info!(backend = %rest.base_url(), "console: starting");

    let view = Arc::new(ViewModel::new(rest, realtime));
    let watcher = tokio::spawn(watch_events(Arc::clone(&view)));

    println!("{}", render::help());
    dispatch(&view, Command::Domain(args.domain));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if !dispatch(&view, command) {
            break;
        }
    }

    view.shutdown();
    watcher.abort();
    info!("console: stopped");
    Ok(())
}
