use anyhow::Context;
use clap::Parser;
use litreview::config::{split_list, Config};
use litreview::pipeline::{Orchestrator, PipelineEvent, RunState};
use litreview::report::{export_markdown, render_markdown, render_summary};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "litreview", version, about = "AI-powered literature review assistant", long_about = None)]
struct Cli {
    /// Research topic (prompted for if omitted)
    topic: Option<String>,

    /// Maximum number of papers
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Model identifier for the LLM backend
    #[arg(short, long)]
    model: Option<String>,

    /// LLM provider: ollama or openai
    #[arg(long)]
    provider: Option<String>,

    /// Comma-separated search domains, e.g. arxiv.org,ieee.org
    #[arg(long)]
    domains: Option<String>,

    /// Per-request timeout in seconds for page fetches
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum characters of paper text sent to the model
    #[arg(long)]
    max_input_chars: Option<usize>,

    /// Papers processed at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Retries per network call
    #[arg(long)]
    retries: Option<u32>,

    /// Directory for the markdown export
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip writing the markdown file
    #[arg(long)]
    no_export: bool,

    /// Print the full markdown to stdout instead of the summary
    #[arg(long)]
    print_markdown: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.max_results {
            config.search.max_results = n;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(provider) = &self.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(domains) = &self.domains {
            config.search.domains = split_list(domains);
        }
        if let Some(secs) = self.timeout_secs {
            config.pipeline.request_timeout = Duration::from_secs(secs);
        }
        if let Some(chars) = self.max_input_chars {
            config.pipeline.max_input_chars = chars;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            config.pipeline.max_retries = retries;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
    }
}

fn prompt_topic() -> anyhow::Result<String> {
    eprint!("Enter your research topic: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Mirror pipeline progress on stderr
fn spawn_progress_printer(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::StateChanged(RunState::Discovering) => eprintln!("Searching for papers..."),
                PipelineEvent::StateChanged(RunState::ProcessingItems { total }) => {
                    eprintln!("Found {} paper(s)", total)
                }
                PipelineEvent::ItemStarted { index, total, title } => {
                    eprintln!("Analyzing paper {} of {}: {}", index + 1, total, title)
                }
                PipelineEvent::ItemFinished { index, status, .. } if !status.is_ok() => {
                    eprintln!("  paper {} -> {}", index + 1, status)
                }
                _ => {}
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    litreview::utils::init_logger(cli.verbose);

    // Load configuration
    let mut config = Config::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    let topic = match &cli.topic {
        Some(topic) => topic.clone(),
        None => prompt_topic()?,
    };
    if topic.trim().is_empty() {
        anyhow::bail!("Please enter a search query.");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::from_config(&config)?.with_events(tx);
    let progress = spawn_progress_printer(rx);

    // Ctrl-C stops after the paper in flight; the partial report is still exported
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current paper");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator
        .run(&topic, config.search.max_results, &cancel)
        .await;
    ctrl_c.abort();
    drop(orchestrator);
    let _ = progress.await;

    let report = result.context("Literature review failed")?;

    if cli.print_markdown {
        println!("{}", render_markdown(&report));
    } else {
        println!("{}", render_summary(&report));
    }

    if !cli.no_export {
        let path = export_markdown(&report, &config.export.output_dir).await?;
        info!(path = %path.display(), "Report saved");
        eprintln!("Markdown saved to {}", path.display());
    }

    Ok(())
}
