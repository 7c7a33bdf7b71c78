use clap::{Parser, ValueEnum};
use docgen_rs::ai::client::{AiConfig, GeminiClient};
use docgen_rs::ai::content::ContentSource;
use docgen_rs::ai::outline::OutlineSource;
use docgen_rs::generation::FillState;
use docgen_rs::utils::document_processor::{DocumentProcessor, ProcessorOptions};
use docgen_rs::{OutputFormat, Topic};
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Docx,
    Pdf,
    Both,
}

#[derive(Parser)]
#[command(name = "docgen_rs")]
#[command(about = "Generate a research document outline, fill it and export DOCX/PDF")]
struct Args {
    /// Research topic
    #[arg(short = 't', long)]
    topic: String,

    /// Optional description to steer the outline
    #[arg(short = 'd', long)]
    description: Option<String>,

    /// Academic level (High School, Undergraduate, Graduate, ...)
    #[arg(short = 'l', long, default_value = docgen_rs::DEFAULT_ACADEMIC_LEVEL)]
    level: String,

    /// Citation style shown on the title page
    #[arg(short = 'c', long, default_value = docgen_rs::DEFAULT_CITATION_FORMAT)]
    citation: String,

    /// Target length in pages
    #[arg(short = 'n', long, default_value_t = docgen_rs::DEFAULT_DOCUMENT_LENGTH)]
    length: u32,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "docx")]
    format: FormatArg,

    /// Output directory
    #[arg(short = 'o', long, default_value = "output")]
    out: PathBuf,

    /// Write the Markdown preview next to the exports
    #[arg(long)]
    preview: bool,

    /// Write the final outline as JSON
    #[arg(long)]
    save_outline: bool,

    /// Skip the AI service: static outline and placeholder content
    #[arg(long)]
    offline: bool,

    /// Section title to leave out (repeatable)
    #[arg(short = 'x', long = "exclude-section")]
    exclude_sections: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    if env_logger::try_init().is_err() {
        // logger already initialized
    }
    let args = Args::parse();

    let (topic_format, formats) = match args.format {
        FormatArg::Docx => (OutputFormat::Docx, vec![OutputFormat::Docx]),
        FormatArg::Pdf => (OutputFormat::Pdf, vec![OutputFormat::Pdf]),
        FormatArg::Both => (OutputFormat::Docx, vec![OutputFormat::Docx, OutputFormat::Pdf]),
    };
    let mut topic = Topic::new(args.topic.clone())
        .with_level(args.level.clone())
        .with_length(args.length)
        .with_format(topic_format);
    topic.topic_description = args.description.clone();
    topic.citation_format = Some(args.citation.clone());

    let config = AiConfig::from_env();
    let timeout = config.timeout();
    let (outline_source, content_source) = if args.offline {
        info!("Offline mode, AI service disabled");
        (None, None)
    } else {
        match GeminiClient::new(config) {
            Ok(client) => {
                let client = Arc::new(client);
                let outline: Arc<dyn OutlineSource> = client.clone();
                let content: Arc<dyn ContentSource> = client;
                (Some(outline), Some(content))
            }
            Err(e) => {
                warn!("AI service unavailable ({}), continuing offline", e);
                (None, None)
            }
        }
    };

    let processor = DocumentProcessor::new(outline_source, content_source)
        .with_timeout(timeout)
        .with_options(ProcessorOptions {
            formats,
            write_preview: args.preview,
            save_outline: args.save_outline,
            exclude_sections: args.exclude_sections.clone(),
        });

    let report = match processor.run(topic, &args.out).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let FillState::Failed { .. } = report.fill_state {
        println!("Some sections could not be generated and contain placeholder text.");
    }
    if let Some(path) = &report.preview_path {
        println!("Preview: {}", path.display());
    }
    if let Some(path) = &report.outline_path {
        println!("Outline: {}", path.display());
    }
    for notice in &report.notices {
        println!("{}", notice.message());
    }

    if report.all_saved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
