use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use counsel_core::{
    ConfigLoader, Orchestrator, Segmenter, ServiceContext, TelemetryOptions, TurnReply,
    init_telemetry, persist_trace,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tracing::{info, warn};

const DEFAULT_PROMPT: &str = "Provide a comprehensive legal analysis of this document.";

#[derive(Parser, Debug)]
#[command(
    name = "counsel-cli",
    version,
    about = "Ask questions about a legal document"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a text document, then answer follow-up questions from stdin.
    Chat(ChatArgs),
    /// Print the chunks a document would be indexed as.
    Segment(SegmentArgs),
    /// Load and validate the configuration file.
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Configuration file (defaults to $COUNSEL_CONFIG, then ./counsel.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Extracted document text.
    #[arg(long)]
    file: PathBuf,

    /// Question answered by the first analysis.
    #[arg(long, default_value = DEFAULT_PROMPT)]
    prompt: String,

    #[command(flatten)]
    config: ConfigArgs,

    /// Use deterministic in-process services instead of the configured providers.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Print the stage trace after every answer.
    #[arg(long, default_value_t = false)]
    show_trace: bool,

    /// Write each turn's trace as JSON into this directory.
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Extracted document text.
    #[arg(long)]
    file: PathBuf,

    /// Upper chunk size in characters.
    #[arg(long, default_value_t = 1500)]
    max: usize,

    /// Chunks at or below this many characters are dropped.
    #[arg(long, default_value_t = 100)]
    min: usize,

    /// Overlap hint; a tenth of it is carried over as trailing words.
    #[arg(long, default_value_t = 200)]
    overlap: usize,

    /// Emit a JSON array instead of numbered blocks.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Chat(args) => chat_command(args).await?,
            Command::Segment(args) => {
                init_logging(None)?;
                segment_command(args)?
            }
            Command::CheckConfig(args) => {
                init_logging(None)?;
                check_config_command(args)?
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let mut options = TelemetryOptions {
        with_target: false,
        ..TelemetryOptions::default()
    };
    if let Some(level) = level {
        options = options.with_level(level);
    }
    init_telemetry(options)?;
    Ok(())
}

async fn chat_command(args: ChatArgs) -> Result<()> {
    let services = if args.offline {
        init_logging(None)?;
        info!("using offline services");
        ServiceContext::offline()
    } else {
        let config = ConfigLoader::load(args.config.config.clone())?;
        init_logging(Some(config.logging.level.as_str()))?;
        ServiceContext::from_config(&config).await?
    };
    let orchestrator = Orchestrator::new(services);

    let text = read_document(&args.file)?;
    let document_uri = args.file.display().to_string();
    let request_id = orchestrator
        .create_request(&args.prompt, Some(&document_uri))
        .await?;
    let report = orchestrator.index_document(&request_id, &text).await?;
    if report.is_empty() {
        warn!(file = %document_uri, "document produced no chunks");
    }
    info!(
        request_id = %request_id,
        chunks = report.chunks_saved,
        embedded = report.embedded,
        "document indexed"
    );

    let reply = orchestrator.handle_turn(&request_id, &args.prompt).await?;
    print_reply(&reply, &args)?;

    println!("\nAsk follow-up questions (empty line or `exit` to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() || query.eq_ignore_ascii_case("exit") {
            break;
        }

        match orchestrator.handle_turn(&request_id, query).await {
            Ok(reply) => print_reply(&reply, &args)?,
            Err(err) => eprintln!("{err}"),
        }
    }

    Ok(())
}

fn print_reply(reply: &TurnReply, args: &ChatArgs) -> Result<()> {
    println!("\n{}\n", reply.answer);
    if args.show_trace {
        println!("{}", reply.trace_markdown());
    }
    if let Some(dir) = &args.trace_dir {
        let path = persist_trace(dir, &reply.request_id, &reply.trace)?;
        info!(path = %path.display(), "trace written");
    }
    Ok(())
}

fn segment_command(args: SegmentArgs) -> Result<()> {
    let text = read_document(&args.file)?;
    let chunks = Segmenter::new(args.max, args.min, args.overlap).segment(&text);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("No indexable text.");
        return Ok(());
    }
    for (idx, chunk) in chunks.iter().enumerate() {
        println!("--- chunk {} ({} chars) ---", idx + 1, chunk.chars().count());
        println!("{chunk}");
    }
    Ok(())
}

fn check_config_command(args: ConfigArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config)?;
    println!("configuration OK");
    println!("  llm:        {:?} ({} / {})", config.llm.provider, config.llm.fast_model, config.llm.pro_model);
    println!("  search:     {:?}", config.search.provider);
    println!("  embedding:  {:?} ({})", config.embedding.provider, config.embedding.model);
    println!("  index:      {:?}", config.index.backend);
    println!(
        "  segmenter:  max {} / min {} / overlap {}",
        config.segmenter.max_chunk_size,
        config.segmenter.min_chunk_size,
        config.segmenter.overlap_size
    );
    println!("  neighbors:  {}", config.retrieval.neighbors);
    Ok(())
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
