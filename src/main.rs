use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use dialsmart_chat::session::SessionId;
use dialsmart_chat::settings::{resolve_widget_settings, EnvSettings, SettingsOverrides};
use dialsmart_chat::transcript::{EntryId, Transcript};
use dialsmart_chat::{ChatWidget, HttpChatApi};

#[derive(Debug, Parser)]
#[command(name = "dialsmart_chat")]
#[command(about = "Terminal client for the DialSmart phone recommendation chat", long_about = None)]
struct Cli {
    /// Backend root, e.g. http://127.0.0.1:5000
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send messages; reads stdin interactively when no -m is given
    Chat {
        #[arg(short, long)]
        message: Vec<String>,
        /// Continue an existing session instead of minting a new one
        #[arg(long)]
        session: Option<String>,
        /// Write the final transcript as an HTML page
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Print the stored turns of a session, oldest first
    History {
        #[arg(long)]
        session: String,
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let history_limit = match &cli.command {
        Commands::History { limit, .. } => *limit,
        Commands::Chat { .. } => None,
    };
    let overrides = SettingsOverrides {
        base_url: cli.base_url,
        history_limit,
        timeout_secs: cli.timeout_secs,
        ..Default::default()
    };
    let settings = resolve_widget_settings(&EnvSettings::from_env(), &overrides);
    let api = Arc::new(HttpChatApi::new(&settings)?);

    match cli.command {
        Commands::Chat { message, session, html } => {
            let mut widget = ChatWidget::new(api, settings);
            if let Some(raw) = session {
                widget = widget.with_session(SessionId::from_existing(raw));
            }
            println!("session: {}", widget.open());
            let mut printed = None;
            if message.is_empty() {
                interactive(&mut widget, &mut printed).await?;
            } else {
                for text in &message {
                    widget.send(text).await;
                    widget.load_images().await;
                    print_new(&widget, &mut printed);
                }
            }
            if let Some(path) = html {
                widget.export_html(&path)?;
                println!("transcript written to {}", path.display());
            }
        }
        Commands::History { session, .. } => {
            let limit = settings.history_limit;
            let mut widget = ChatWidget::new(api, settings).with_session(SessionId::from_existing(session));
            let turns = widget.load_history(limit).await?;
            if turns == 0 {
                println!("no history");
            }
            print_new(&widget, &mut None);
        }
    }
    Ok(())
}

async fn interactive(widget: &mut ChatWidget, printed: &mut Option<EntryId>) -> anyhow::Result<()> {
    println!("type a message, /1../9 for quick replies, /history, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "/quit" | "/exit" => break,
            "/history" => {
                let limit = widget.settings().history_limit;
                match widget.load_history(limit).await {
                    Ok(0) => println!("no history"),
                    Ok(_) => *printed = None,
                    Err(err) => eprintln!("could not load history: {err}"),
                }
            }
            _ => {
                let quick = line
                    .strip_prefix('/')
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0);
                match (quick, widget.latest_quick_replies().map(|(id, _)| id)) {
                    (Some(n), Some(row)) => {
                        if !widget.click_quick_reply(row, n - 1).await {
                            eprintln!("no quick reply {n}");
                        }
                    }
                    (Some(_), None) => eprintln!("no quick replies offered"),
                    (None, _) => {
                        widget.set_input(line);
                        widget.submit_input().await;
                    }
                }
            }
        }
        widget.load_images().await;
        print_new(widget, printed);
    }
    Ok(())
}

fn print_new(widget: &ChatWidget, printed: &mut Option<EntryId>) {
    for entry in widget.transcript().entries() {
        if printed.is_some_and(|last| entry.id <= last) {
            continue;
        }
        println!("{}", Transcript::entry_text(entry, widget.settings()));
        *printed = Some(entry.id);
    }
}
