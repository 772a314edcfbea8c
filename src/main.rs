use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use threadscribe::core::config::{load_config, load_config_from, ExporterConfig};
use threadscribe::extraction::{classify_css, ExportOptions, Exporter};
use threadscribe::features::analysis::{analyze_transcript, build_client};
use threadscribe::scraping::browser_manager::{self, BrowserSession, LaunchSettings, SharedSession};
use threadscribe::scraping::login::{self, LoginSettings};
use threadscribe::scraping::{CdpChatPage, PageSelectors};
use threadscribe::types::*;

const PRESENT_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "threadscribe", version, about = "Export a rendered chat conversation to a text transcript")]
struct Cli {
    /// Config file (defaults to the usual threadscribe.json search order).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the browser, log in and export one conversation.
    Export(ExportArgs),
    /// Send an existing transcript to the analysis service.
    Analyze {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Print the color bucket of a CSS color, e.g. "rgb(0, 132, 255)".
    Classify { color: String },
}

#[derive(Args)]
struct ExportArgs {
    /// individual | group
    #[arg(long, default_value = "individual")]
    mode: ChatMode,
    #[arg(long)]
    output: Option<PathBuf>,
    /// JSON cookie export to log in with instead of logging in by hand.
    #[arg(long)]
    cookies: Option<PathBuf>,
    /// Analyze the transcript once the export finishes.
    #[arg(long)]
    analyze: bool,
    /// Start exporting without the confirmation prompt.
    #[arg(long)]
    yes: bool,
}

// ─── Presentation ────────────────────────────────────────────────────────────

/// Terminal side of the status / command channels. Never blocks on them:
/// everything is drained with `try_recv` on a fixed interval.
struct Presenter {
    events: EventReceiver,
    commands: CommandReceiver,
    stdin: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct Drained {
    stall_alert: bool,
    complete: bool,
}

impl Presenter {
    fn new(events: EventReceiver, commands: CommandReceiver) -> Self {
        let (tx, stdin) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            events,
            commands,
            stdin,
        }
    }

    fn drain(&mut self) -> Drained {
        let mut out = Drained::default();
        while let Ok(event) = self.events.try_recv() {
            match event {
                StatusEvent::Status { message, level } => match level {
                    StatusLevel::Info => println!("{}", message),
                    StatusLevel::Warning => println!("⚠️  {}", message),
                    StatusLevel::Error => eprintln!("❌ {}", message),
                },
                StatusEvent::StallAlert => out.stall_alert = true,
                StatusEvent::Complete => out.complete = true,
            }
        }
        while let Ok(command) = self.commands.try_recv() {
            match command {
                UiCommand::EnableButton => debug!("control enabled"),
                UiCommand::UpdateButton { properties } => debug!("control updated: {:?}", properties),
            }
        }
        out
    }

    /// Ask a question and wait for one line, draining status meanwhile.
    /// `None` when cancelled or stdin closed.
    async fn ask(&mut self, question: &str, cancel: &CancellationToken) -> Option<String> {
        println!("{}", question);
        loop {
            self.drain();
            tokio::select! {
                line = self.stdin.recv() => return line.map(|l| l.trim().to_string()),
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(PRESENT_INTERVAL) => {}
            }
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn spawn_ctrl_c(root: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping");
            root.cancel();
        }
    });
}

async fn login_flow(
    shared: SharedSession,
    settings: LoginSettings,
    cookie_json: Option<String>,
    events: EventSender,
    cancel: CancellationToken,
) -> Result<()> {
    match cookie_json {
        Some(json) => {
            login::cookie_login(&shared, &settings, &json, &events, &cancel).await?;
        }
        None => login::manual_login(&shared, &settings, &events, &cancel).await?,
    }
    Ok(())
}

async fn run_export_command(cfg: ExporterConfig, args: ExportArgs) -> Result<()> {
    let output = args.output.clone().unwrap_or_else(|| cfg.resolve_output_path());
    let cookie_json = match &args.cookies {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read cookie file {}", path.display()))?,
        ),
        None => None,
    };

    let (events, events_rx) = event_channel();
    let (commands, commands_rx) = command_channel();
    let mut presenter = Presenter::new(events_rx, commands_rx);
    let root = CancellationToken::new();
    spawn_ctrl_c(root.clone());

    let session = BrowserSession::launch(&LaunchSettings {
        executable: cfg.browser.resolve_chrome_executable(),
        user_data_dir: cfg.browser.resolve_user_data_dir(),
        home_url: cfg.site.resolve_home_url(),
    })
    .await?;
    let shared = browser_manager::share(session);

    let login_settings = LoginSettings {
        messages_url: cfg.site.resolve_messages_url(),
        login_marker: cfg.site.resolve_login_marker(),
        manual_timeout: cfg.scan.resolve_login_timeout(),
        cookie_timeout: cfg.scan.resolve_cookie_login_timeout(),
    };
    let login = tokio::spawn(login_flow(
        shared.clone(),
        login_settings,
        cookie_json,
        events.clone(),
        root.clone(),
    ));
    while !login.is_finished() {
        presenter.drain();
        tokio::time::sleep(PRESENT_INTERVAL).await;
    }
    let login_result = login.await.map_err(|e| anyhow!("login task failed: {}", e))?;
    if let Err(e) = login_result {
        send_event(&events, StatusEvent::error(format!("Error: {}", e)));
        browser_manager::teardown(&shared, &events, &commands).await;
        presenter.drain();
        return Err(e);
    }

    if !root.is_cancelled() && !args.yes {
        send_event(&events, StatusEvent::info("Please select the conversation to export."));
        let answer = presenter
            .ask(
                "Open the conversation in the browser, then press Enter to start exporting (q to quit):",
                &root,
            )
            .await;
        if !matches!(answer.as_deref(), Some(a) if !a.eq_ignore_ascii_case("q")) {
            root.cancel();
        }
    }
    if root.is_cancelled() {
        browser_manager::teardown(&shared, &events, &commands).await;
        presenter.drain();
        return Ok(());
    }

    let page = Arc::new(CdpChatPage::new(
        shared.clone(),
        PageSelectors::from_site(&cfg.site),
    ));
    let opts = ExportOptions {
        mode: args.mode,
        output: output.clone(),
        tuning: cfg.scan.resolve_tuning(),
        palette: cfg.palette.resolve(),
        sender_lookups: cfg.site.resolve_sender_lookups(),
    };
    let exporter = Exporter::new();
    let handle = exporter
        .start(page, opts, events.clone())
        .ok_or_else(|| anyhow!("an export is already running"))?;
    let run_cancel = handle.cancel_token();

    let mut awaiting_stall_answer = false;
    loop {
        let drained = presenter.drain();
        if drained.complete || handle.is_finished() {
            break;
        }
        if root.is_cancelled() {
            run_cancel.cancel();
        }
        if drained.stall_alert && !awaiting_stall_answer {
            awaiting_stall_answer = true;
            println!("No new messages after repeated scrolling. Type 'stop' to finish, or press Enter to keep scrolling:");
        }
        if awaiting_stall_answer {
            if let Ok(line) = presenter.stdin.try_recv() {
                awaiting_stall_answer = false;
                if line.trim().eq_ignore_ascii_case("stop") {
                    send_event(&events, StatusEvent::info("Cleaning up resources in background..."));
                    run_cancel.cancel();
                }
            }
        }
        tokio::time::sleep(PRESENT_INTERVAL).await;
    }

    let result = handle.stop(STOP_GRACE).await;
    browser_manager::teardown(&shared, &events, &commands).await;
    presenter.drain();

    let summary = match result {
        Some(Ok(summary)) => summary,
        Some(Err(e)) => return Err(e.into()),
        None => return Err(anyhow!("export worker did not finish cleanly")),
    };
    info!(
        "✅ {} messages exported to {}",
        summary.messages,
        summary.output.display()
    );

    if args.analyze && summary.transcript_written {
        match cfg.analysis.resolve_endpoint() {
            Some(endpoint) => {
                run_analysis(&cfg, &endpoint, &summary.output).await?;
            }
            None => warn!("--analyze given but no analysis endpoint is configured"),
        }
    }
    Ok(())
}

async fn run_analysis(cfg: &ExporterConfig, endpoint: &str, input: &std::path::Path) -> Result<()> {
    let client = build_client(cfg.analysis.resolve_timeout())?;
    println!("Analyzing chat content");
    let outcome = analyze_transcript(&client, endpoint, input).await?;
    println!("{}", outcome.display_text());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config_from(path).unwrap_or_else(|| {
            warn!("config {} unusable; using defaults", path.display());
            ExporterConfig::default()
        }),
        None => load_config(),
    };

    match cli.command {
        Command::Export(args) => run_export_command(cfg, args).await,
        Command::Analyze { input, endpoint } => {
            let input = input.unwrap_or_else(|| cfg.resolve_output_path());
            let endpoint = endpoint
                .or_else(|| cfg.analysis.resolve_endpoint())
                .ok_or_else(|| {
                    anyhow!("no analysis endpoint; pass --endpoint or set THREADSCRIBE_ANALYSIS_URL")
                })?;
            run_analysis(&cfg, &endpoint, &input).await
        }
        Command::Classify { color } => {
            println!("{}", classify_css(&color));
            Ok(())
        }
    }
}
