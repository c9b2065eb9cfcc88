use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use respstream_core::{
    accumulator::{Edge, ResponseAccumulator},
    config::Config,
    cursor::EventCursor,
    frame::FrameSource,
    http_client::HttpClient,
    responses::{CreateResponseRequest, Input, ResponseStreamEvent},
    sse::SseDecoder,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Streamed response inspector", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a captured SSE transcript from disk
    Replay {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Stream a live response (prints deltas live)
    Stream {
        #[arg(long)]
        model: Option<String>,
        #[arg(short, long, help = "Message from the user")]
        message: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let opts = cfg.stream.cursor_options();

    match cli.command {
        Commands::Replay { file } => {
            let reader = File::open(&file)
                .with_context(|| format!("opening transcript {}", file.display()))?;
            let source = SseDecoder::new(BufReader::new(reader));
            consume(EventCursor::union_with_options(source, opts))
        }
        Commands::Stream { model, message } => {
            let model = model
                .or_else(|| cfg.model.clone())
                .context("no model given and none configured")?;
            let client = HttpClient::from_config(&cfg)?;
            let req = CreateResponseRequest::streaming(model, Input::Text(message));
            let source = client.open_stream(&req)?;
            consume(EventCursor::union_with_options(source, opts))
        }
    }
}

/// Fold every event into an accumulator, echoing text deltas to stdout and
/// edge events to stderr.
fn consume<S: FrameSource>(mut cursor: EventCursor<ResponseStreamEvent, S>) -> anyhow::Result<()> {
    let mut acc = ResponseAccumulator::new();
    let mut stdout = io::stdout();
    let mut saw_delta = false;

    while cursor.advance() {
        let event = cursor.current();
        acc.fold(event);
        if let ResponseStreamEvent::OutputTextDelta(d) = event {
            saw_delta = true;
            print!("{}", d.delta);
            stdout.flush().ok();
        }
        match acc.edge() {
            Edge::TextDone(_) if saw_delta => println!(),
            Edge::FunctionCallAdded(call) => {
                eprintln!("[tool call #{} added: {} ({})]", call.index, call.name, call.call_id)
            }
            Edge::FunctionCallArgsDone(call) => eprintln!(
                "[tool call #{} done: {}({})]",
                call.index, call.name, call.arguments
            ),
            Edge::RefusalDone(r) => eprintln!("[refusal: {}]", r.refusal),
            Edge::ReasoningDone(r) => eprintln!("[reasoning: {}]", r.text),
            Edge::FileSearchCompleted(f) => eprintln!("[file search done: {}]", f.call_id),
            Edge::WebSearchCompleted(w) => eprintln!("[web search done: {}]", w.call_id),
            Edge::CodeInterpreterCompleted(c) => {
                eprintln!("[code interpreter done: {}]", c.item_id)
            }
            Edge::Error(e) => eprintln!("[error: {}]", e.message),
            _ => {}
        }
    }
    cursor.close();

    if let Some(err) = cursor.err() {
        tracing::warn!(error.kind = err.kind(), "stream ended early");
        anyhow::bail!("stream ended with error: {err}");
    }
    if !saw_delta {
        println!("{}", acc.output_text());
    }
    eprintln!(
        "[status: {:?}, complete: {}]",
        acc.response().status,
        acc.is_complete()
    );
    Ok(())
}
