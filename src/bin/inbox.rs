use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use inbox_stream::api::logging::init_logging;
use inbox_stream::config::Config;
use inbox_stream::state::{Step, StepKind, Subscription};
use inbox_stream::types::{HumanInterrupt, HumanResponse, ThreadDetail, ThreadStatus};
use inbox_stream::{ApiClient, Inbox, InboxApi, Resumed, SessionError, SessionUpdate};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Run and review agent inbox threads from the terminal
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Backend base URL (overrides INBOX_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a run and follow its steps until it finishes or pauses
    Ask {
        question: String,
        /// Reuse an existing thread instead of creating one
        #[arg(long)]
        thread_id: Option<String>,
    },
    /// List threads
    Threads {
        /// idle, busy, interrupted or error
        #[arg(long, value_parser = parse_status)]
        status: Option<ThreadStatus>,
    },
    /// Show a thread's messages and pending interrupt
    Show { thread_id: String },
    /// Answer a pending interrupt
    Resume {
        thread_id: String,
        #[command(subcommand)]
        decision: Decision,
    },
    /// Delete a thread
    Delete { thread_id: String },
    /// Check that the backend is reachable
    Health,
}

#[derive(Subcommand)]
enum Decision {
    Accept,
    Ignore,
    Respond {
        text: String,
    },
    Edit {
        action: String,
        /// JSON object with the edited arguments
        args: String,
    },
}

impl Decision {
    fn into_response(self) -> Result<HumanResponse> {
        Ok(match self {
            Self::Accept => HumanResponse::Accept,
            Self::Ignore => HumanResponse::Ignore,
            Self::Respond { text } => HumanResponse::respond(text),
            Self::Edit { action, args } => HumanResponse::Edit {
                action,
                args: parse_edit_args(&args)?,
            },
        })
    }
}

fn parse_status(raw: &str) -> Result<ThreadStatus, String> {
    ThreadStatus::parse(raw).ok_or_else(|| format!("unknown thread status '{raw}'"))
}

fn parse_edit_args(raw: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(raw).context("edit arguments must be a JSON object")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    config.validate()?;
    init_logging(&config)?;

    let client = Arc::new(ApiClient::new(&config)?);
    let inbox = Inbox::new(Arc::clone(&client), &config);
    let preview_chars = config.result_preview_chars;

    match cli.command {
        Command::Ask {
            question,
            thread_id,
        } => {
            let updates = inbox.registry().subscribe();
            let thread_id = inbox.ask(&question, thread_id.as_deref())?;
            println!("* Thread {thread_id}");
            follow(&inbox, &thread_id, updates, preview_chars).await?;
            if let Some(status) = listed_status(&inbox, &thread_id).await? {
                println!("* Thread {thread_id} is {status}");
            }
        }
        Command::Threads { status } => {
            for thread in inbox.refresh(status).await? {
                let summary = thread
                    .interrupt_description
                    .as_deref()
                    .or(thread.question.as_deref())
                    .unwrap_or("");
                println!(
                    "{}  {:<11}  {}  {}",
                    thread.thread_id,
                    thread.status.as_str(),
                    thread.updated_at.format("%Y-%m-%d %H:%M"),
                    summary
                );
            }
        }
        Command::Show { thread_id } => {
            let detail = inbox.thread_detail(&thread_id).await?;
            print_detail(&detail);
        }
        Command::Resume {
            thread_id,
            decision,
        } => match inbox.respond(&thread_id, decision.into_response()?).await? {
            Resumed::Completed(detail) => print_detail(&detail),
            Resumed::Streaming(state) => {
                println!("* Resumed with {} steps so far", state.steps.len());
            }
        },
        Command::Delete { thread_id } => {
            inbox.delete(&thread_id).await?;
            println!("deleted {thread_id}");
        }
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    inbox.registry().shutdown();
    Ok(())
}

/// Print steps as they arrive; prompt for a decision whenever the run pauses.
async fn follow(
    inbox: &Inbox<ApiClient>,
    thread_id: &str,
    mut updates: Subscription,
    preview_chars: usize,
) -> Result<()> {
    let mut printed = 0;
    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::Updated { thread_id: id, state } if id == thread_id => {
                for step in state.steps.iter().skip(printed) {
                    print_step(step, preview_chars);
                }
                printed = state.steps.len();
            }
            SessionUpdate::Completed { thread_id: id } if id == thread_id => {
                let state = inbox
                    .registry()
                    .snapshot(thread_id)
                    .ok_or_else(|| anyhow!("session for {thread_id} disappeared"))?;
                if let Some(answer) = state.final_answer {
                    println!("\n{answer}");
                    return Ok(());
                }
                if let Some(error) = state.error {
                    bail!("run failed: {error}");
                }
                let Some(interrupt) = state.interrupt else {
                    println!("* Done");
                    return Ok(());
                };
                if !answer_interrupt(inbox, thread_id, &interrupt).await? {
                    println!("* Left paused; resume later with `inbox resume {thread_id} ...`");
                    return Ok(());
                }
            }
            _ => {}
        }
    }
    bail!("update channel closed")
}

/// Refresh the thread list once a run stops and report the thread's listed status.
async fn listed_status<C: InboxApi + 'static>(
    inbox: &Inbox<C>,
    thread_id: &str,
) -> Result<Option<ThreadStatus>> {
    let threads = inbox.refresh(None).await?;
    Ok(threads
        .iter()
        .find(|thread| thread.thread_id == thread_id)
        .map(|thread| thread.status))
}

/// Returns false when the user chose to leave the run paused.
async fn answer_interrupt(
    inbox: &Inbox<ApiClient>,
    thread_id: &str,
    interrupt: &HumanInterrupt,
) -> Result<bool> {
    println!("\n* Review: {}", interrupt.display_description());
    let allowed: Vec<String> = interrupt
        .config
        .allowed_kinds()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("  └ allowed: {}", allowed.join(", "));

    loop {
        let line = tokio::task::spawn_blocking(read_decision_line).await??;
        let response = match parse_decision(&line, interrupt) {
            Ok(Some(response)) => response,
            Ok(None) => return Ok(false),
            Err(error) => {
                eprintln!("  └ {error:#}");
                continue;
            }
        };
        match inbox.respond(thread_id, response).await {
            Ok(_) => return Ok(true),
            Err(error) if error.downcast_ref::<SessionError>().is_some() => {
                eprintln!("  └ {error}");
            }
            Err(error) => return Err(error),
        }
    }
}

fn read_decision_line() -> Result<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_decision(line: &str, interrupt: &HumanInterrupt) -> Result<Option<HumanResponse>> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    Ok(Some(match command {
        "" | "quit" | "q" => return Ok(None),
        "accept" | "a" => HumanResponse::Accept,
        "ignore" | "i" => HumanResponse::Ignore,
        "respond" | "r" if !rest.trim().is_empty() => HumanResponse::respond(rest.trim()),
        "edit" | "e" => HumanResponse::Edit {
            action: interrupt.action().to_string(),
            args: parse_edit_args(rest)?,
        },
        _ => bail!("expected accept, ignore, respond <text>, edit <json> or quit"),
    }))
}

fn print_step(step: &Step, preview_chars: usize) {
    match &step.kind {
        StepKind::Thinking { message } => println!("* Thinking\n  └ {message}"),
        StepKind::Status { message } => println!("* {message}"),
        StepKind::ToolCall { tool, .. } => {
            println!("* Tool: {tool}\n  └ {}", step.preview(preview_chars).text)
        }
        StepKind::ToolResult { tool, .. } => {
            println!("* Result: {tool}\n  └ {}", step.preview(preview_chars).text)
        }
    }
}

fn print_detail(detail: &ThreadDetail) {
    println!("* Thread {} ({})", detail.thread_id, detail.status);
    for message in &detail.messages {
        let text = message.text();
        if !text.is_empty() {
            println!("  {text}");
        }
    }
    if let Some(answer) = detail.final_answer() {
        println!("\n{answer}");
    }
    if let Some(interrupt) = &detail.interrupt {
        println!("\n* Review: {}", interrupt.display_description());
    }
}
