use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rustyline::error::ReadlineError;
use studio_core::config::StudioCfg;
use studio_core::features::{audit, channels, chat, marketing, schedule};
use studio_core::gateway::{HttpEngineFactory, ModelGateway};
use studio_core::interpret::Interpreted;
use studio_core::memory::pg::PgMemoryStore;
use studio_core::memory::{InMemoryStore, MemoryStore, Retention};
use studio_core::studio::Studio;
use studio_core::types::{MemoryKind, StoreEvent};
use studio_llm::media::MediaProvider;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
commands:
  <text>                          chat
  /audit <text>                   audit content
  /variants <product> | <audience>
  /week <YYYY-MM-DD> <brief>      plan a week
  /execute <YYYY-MM-DD>           complete a day's tasks
  /schedule                       show the calendar
  /memory                         show strategic memory
  /channel <name> | <description>
  /q                              quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: write to file when RUST_LOG is set so the prompt stays clean
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create("/tmp/studio.log")?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    // DATABASE_URL (optional, no DB = ephemeral mode)
    let mut startup_notice: Option<String> = None;
    let connect_timeout = StudioCfg::default().db_connect_timeout_secs;
    let pool = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let mut fallback = |reason: String| {
                startup_notice = Some(format!(
                    "note: {reason}; running in ephemeral mode, nothing from this session is kept."
                ));
            };
            match tokio::time::timeout(
                Duration::from_secs(connect_timeout),
                sqlx::postgres::PgPoolOptions::new()
                    .max_connections(8)
                    .connect(&url),
            )
            .await
            {
                Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                    Ok(()) => {
                        tracing::info!("database connected and migrations applied");
                        Some(pool)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "database migration failed, falling back to ephemeral mode");
                        fallback("database migration failed".into());
                        None
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "failed to connect DATABASE_URL, falling back to ephemeral mode");
                    fallback("could not connect to DATABASE_URL".into());
                    None
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = connect_timeout, "database connect timed out, falling back to ephemeral mode");
                    fallback(format!("database connect timed out ({connect_timeout}s)"));
                    None
                }
            }
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, running in ephemeral mode");
            None
        }
    };

    let cfg = match pool {
        Some(ref pool) => StudioCfg::load(pool).await?,
        None => StudioCfg::default(),
    };
    let cfg = Arc::new(cfg);

    let retention = Retention::from_cfg(&cfg);
    let store: Arc<dyn MemoryStore> = match pool {
        Some(pool) => Arc::new(PgMemoryStore::new(pool, retention)),
        None => Arc::new(InMemoryStore::new(retention)),
    };

    let engines = HttpEngineFactory::from_env();
    let media: Arc<dyn MediaProvider> = Arc::new(engines.gemini(&cfg.default_model));
    let gateway = ModelGateway::new(Arc::new(engines), Some(media), cfg.clone());
    let studio = Studio::new(cfg, store.clone(), gateway);

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());
    spawn_store_logger(store.subscribe(), token.clone());

    run_repl(studio, token, startup_notice).await
}

async fn run_repl(
    studio: Studio,
    token: CancellationToken,
    startup_notice: Option<String>,
) -> anyhow::Result<()> {
    const SPINNER: [&str; 4] = ["-", "\\", "|", "/"];

    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("{HELP}");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    let mut waiting_for_reply = false;
    let mut spinner_idx: usize = 0;
    let mut spinner_interval = tokio::time::interval(Duration::from_millis(100));
    spinner_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                break;
            }
            _ = spinner_interval.tick(), if waiting_for_reply => {
                spinner_idx = (spinner_idx + 1) % SPINNER.len();
                draw_thinking_frame(SPINNER[spinner_idx])?;
            }
            line = line_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                match line {
                    InputEvent::Line(line) => {
                        let text = line.trim().to_owned();
                        if text.is_empty() {
                            request_next_prompt(&ready_tx);
                            continue;
                        }
                        if matches!(text.as_str(), "/q" | "/exit" | "/quit") {
                            break;
                        }
                        let studio = studio.clone();
                        let reply_tx = reply_tx.clone();
                        let cancel = token.child_token();
                        tokio::spawn(async move {
                            let reply = match handle(&studio, &text, &cancel).await {
                                Ok(reply) => reply,
                                Err(e) => format!("error: {e}"),
                            };
                            let _ = reply_tx.send(reply);
                        });
                        spinner_idx = 0;
                        draw_thinking_frame(SPINNER[spinner_idx])?;
                        waiting_for_reply = true;
                    }
                    InputEvent::Interrupted => {
                        token.cancel();
                        break;
                    }
                    InputEvent::Eof => break,
                    InputEvent::Error(err) => {
                        eprintln!("input error: {err}");
                        break;
                    }
                }
            }
            reply = reply_rx.recv() => {
                let Some(reply) = reply else {
                    break;
                };
                if waiting_for_reply {
                    waiting_for_reply = false;
                    clear_current_line()?;
                }
                println!("{reply}");
                request_next_prompt(&ready_tx);
            }
        }
    }
    drop(ready_tx);

    if waiting_for_reply {
        clear_current_line()?;
    }
    println!();
    Ok(())
}

/// Run one REPL line and render the outcome as text.
async fn handle(studio: &Studio, line: &str, cancel: &CancellationToken) -> anyhow::Result<String> {
    let (command, rest) = match line.strip_prefix('/') {
        Some(cmd) => cmd.split_once(' ').map_or((cmd, ""), |(c, r)| (c, r.trim())),
        None => return Ok(render_chat(chat::chat(studio, line, cancel).await?)),
    };

    match command {
        "help" => Ok(HELP.to_owned()),
        "audit" => {
            let out = audit::audit_content(studio, rest, cancel).await?;
            Ok(match out.structured.value() {
                Some(a) => format!(
                    "score {}\n+ {}\n- {}\ndirective: {}",
                    a.score,
                    a.strengths.join("\n+ "),
                    a.weaknesses.join("\n- "),
                    a.strategic_directive
                ),
                None => format!("(could not read the audit)\n{}", out.text),
            })
        }
        "variants" => {
            let (product, audience) = split_pipe(rest);
            let out = marketing::generate_variants(studio, product, audience, cancel).await?;
            let plan = out.structured.or_default();
            if plan.variants.is_empty() {
                return Ok("(no variants)".into());
            }
            Ok(plan
                .variants
                .iter()
                .map(|v| format!("[{}] {}\n{}\n> {}", v.channel, v.headline, v.body, v.call_to_action))
                .collect::<Vec<_>>()
                .join("\n\n"))
        }
        "week" => {
            let (date, brief) = rest.split_once(' ').unwrap_or((rest, ""));
            let start = parse_date(date)?;
            let plan = schedule::generate_week(studio, start, brief.trim(), cancel).await?;
            let mut out = format!("{} new task(s), {} total", plan.added, plan.tasks.len());
            if plan.skipped > 0 {
                out.push_str(&format!(", {} unreadable", plan.skipped));
            }
            if plan.malformed {
                out.push_str(" (the plan could not be read)");
            }
            Ok(out)
        }
        "execute" => {
            let n = schedule::execute_day(studio, parse_date(rest)?).await?;
            Ok(format!("{n} task(s) completed"))
        }
        "schedule" => {
            let tasks = studio.store.read_schedule().await?;
            let mut dates: Vec<NaiveDate> = tasks.iter().map(|t| t.date).collect();
            dates.sort();
            dates.dedup();
            let mut lines = Vec::new();
            for date in dates {
                lines.push(date.to_string());
                for t in schedule::tasks_on(&tasks, date) {
                    lines.push(format!("  [{:?}] {}: {}", t.status, t.channel_name, t.action));
                }
            }
            Ok(if lines.is_empty() { "(empty calendar)".into() } else { lines.join("\n") })
        }
        "memory" => {
            let mut out = Vec::new();
            for kind in MemoryKind::ALL {
                let blob = studio.store.read(kind).await?;
                out.push(format!("## {} (rev {})\n{}", kind.label(), blob.revision, blob.content));
            }
            Ok(out.join("\n\n"))
        }
        "channel" => {
            let (name, description) = split_pipe(rest);
            channels::register_channel(studio, name, description).await?;
            Ok(format!("channels: {}", channels::list_channels(studio).await?.join(", ")))
        }
        other => Ok(format!("unknown command /{other}\n{HELP}")),
    }
}

fn render_chat(out: Interpreted<()>) -> String {
    let mut text = out.text;
    for call in &out.function_calls {
        text.push_str(&format!("\n(suggested action: {} {})", call.name, call.args));
    }
    for c in &out.citations {
        text.push_str(&format!("\n[{}] {}", c.title, c.uri));
    }
    text
}

fn split_pipe(s: &str) -> (&str, &str) {
    s.split_once('|').map_or((s.trim(), ""), |(a, b)| (a.trim(), b.trim()))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("expected YYYY-MM-DD, got {s:?}: {e}"))
}

fn draw_thinking_frame(frame: &str) -> anyhow::Result<()> {
    print!("\rthinking... {frame}");
    io::stdout().flush()?;
    Ok(())
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_input_thread(
    line_tx: mpsc::UnboundedSender<InputEvent>,
    ready_rx: std::sync::mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("studio> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_store_logger(mut events: broadcast::Receiver<StoreEvent>, token: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(StoreEvent::MemoryChanged { kind, revision }) => {
                        tracing::info!(?kind, revision, "memory changed");
                    }
                    Ok(StoreEvent::DocumentChanged { key }) => {
                        tracing::info!(%key, "document changed");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "store event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                let _ = sigint.recv().await;
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
