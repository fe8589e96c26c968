use anyhow::{Context, Result, bail};
use bookvoice::BookVoiceError;
use bookvoice::analysis::{MockAnalyzer, analyze_chapter, list_voices};
use bookvoice::audio::{merge, normalize, normalize_or_fallback, read_format};
use bookvoice::cli::{Cli, Commands, ConfigAction, SplitMode};
use bookvoice::config::{Config, TtsBackend};
use bookvoice::generation::{GenerationSettings, Generator, JobHandle, JobManager, JobOutcome};
use bookvoice::output::{describe_format, render_progress, render_summary};
use bookvoice::progress::ProgressHub;
use bookvoice::project::ProjectStore;
use bookvoice::synth::{MockSynthesizer, Synthesizer};
use bookvoice::text::{split_for_analysis, split_for_synthesis};
use clap::Parser;
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Inspect { file } => {
            let mut reader = std::fs::File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let format = read_format(&mut reader)?;
            println!("{}", describe_format(&format));
        }
        Commands::Split { file, mode, limit } => {
            let config = load_config(cli.config.as_deref())?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chunks = match mode {
                SplitMode::Analysis => {
                    split_for_analysis(&text, limit.unwrap_or(config.analysis.chunk_size))
                }
                SplitMode::Synthesis => {
                    split_for_synthesis(&text, limit.unwrap_or(config.generation.chapter_max_chars))
                }
            };
            for (i, chunk) in chunks.iter().enumerate() {
                println!("--- {} ({} chars)", i + 1, chunk.chars().count());
                println!("{chunk}");
            }
        }
        Commands::Merge {
            output,
            silence_ms,
            normalize: normalize_output,
            inputs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let silence = silence_ms.unwrap_or(config.generation.merge_silence_ms);
            merge_command(&inputs, &output, silence, normalize_output)?;
            if !cli.quiet {
                println!("Wrote {}", output.display());
            }
        }
        Commands::Normalize { input, output } => {
            let outcome = normalize(&input, &output)?;
            if !cli.quiet {
                println!("{outcome:?} -> {}", output.display());
            }
        }
        Commands::Analyze {
            project,
            chapter,
            force,
            text,
        } => {
            let config = load_config(cli.config.as_deref())?;
            analyze_command(&config, &project, &chapter, &text, force, cli.quiet).await?;
        }
        Commands::Generate {
            project,
            mock,
            chapter,
        } => {
            let config = load_generation_config(cli.config.as_deref(), mock)?;
            let manager = job_manager(&config, &project)?;
            let handle = manager.start_chapter(&chapter)?;
            run_job(manager, handle, cli.quiet).await?;
        }
        Commands::GenerateAll { project, mock } => {
            let config = load_generation_config(cli.config.as_deref(), mock)?;
            let manager = job_manager(&config, &project)?;
            let handle = manager.start_book()?;
            run_job(manager, handle, cli.quiet).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flags.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bookvoice={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = read_config(custom_path)?;
    config.validate()?;
    Ok(config)
}

fn load_generation_config(custom_path: Option<&Path>, mock: bool) -> Result<Config> {
    let mut config = read_config(custom_path)?;
    if mock {
        config.tts.backend = TtsBackend::Mock;
    }
    config.validate()?;
    Ok(config)
}

/// Explicit path must exist; the default path falls back to defaults.
fn read_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

fn merge_command(inputs: &[PathBuf], output: &Path, silence_ms: u32, normalize: bool) -> Result<()> {
    if !normalize {
        merge(inputs, output, silence_ms)?;
        return Ok(());
    }

    let scratch = output.with_extension("merged.wav");
    merge(inputs, &scratch, silence_ms)?;
    let result = normalize_or_fallback(&scratch, output);
    if let Err(e) = std::fs::remove_file(&scratch) {
        tracing::warn!(path = %scratch.display(), "failed to remove scratch file: {e}");
    }
    result?;
    Ok(())
}

async fn analyze_command(
    config: &Config,
    project: &Path,
    chapter: &str,
    text: &Path,
    force: bool,
    quiet: bool,
) -> Result<()> {
    let store = ProjectStore::load(project)?;
    if store.chapter(chapter).is_none() {
        return Err(BookVoiceError::ChapterNotFound {
            chapter_id: chapter.to_string(),
        }
        .into());
    }

    let text = tokio::fs::read_to_string(text)
        .await
        .with_context(|| format!("Failed to read {}", text.display()))?;

    let voices = if config.paths.voice_dir.is_dir() {
        list_voices(&config.paths.voice_dir)?
    } else {
        Vec::new()
    };

    let segments = analyze_chapter(
        &MockAnalyzer::new(),
        &store,
        chapter,
        &text,
        config.analysis.chunk_size,
        &voices,
        force,
    )
    .await?;
    store.save(project)?;

    if !quiet {
        println!("{} segments stored for chapter {chapter}", segments.len());
    }
    Ok(())
}

fn synthesizer(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    match config.tts.backend {
        TtsBackend::Mock => Ok(Arc::new(MockSynthesizer::new())),
        #[cfg(feature = "index-tts")]
        TtsBackend::IndexTts => Ok(Arc::new(bookvoice::synth::IndexTtsClient::new(
            &config.tts.url,
            &config.paths.voice_dir,
            &config.tts.default_voice,
        ))),
        #[cfg(not(feature = "index-tts"))]
        TtsBackend::IndexTts => {
            bail!("Built without the index-tts feature; use --mock or set tts.backend = \"mock\"")
        }
    }
}

fn job_manager(config: &Config, project: &Path) -> Result<JobManager> {
    let store = ProjectStore::load(project)
        .with_context(|| format!("Failed to load project {}", project.display()))?;
    let generator = Generator::new(
        store,
        synthesizer(config)?,
        ProgressHub::new(config.progress.subscriber_buffer),
        GenerationSettings::from_config(config),
    );
    Ok(JobManager::new(generator))
}

/// Print progress until the job ends; Ctrl-C cancels at the next segment.
async fn run_job(manager: JobManager, handle: JobHandle, quiet: bool) -> Result<()> {
    let receiver = manager.generator().hub().subscribe();
    let color = std::io::stderr().is_terminal();
    let printer = std::thread::spawn(move || {
        for message in receiver.iter() {
            if !quiet {
                eprintln!("{}", render_progress(&message, color));
            }
        }
    });

    let flag = handle.cancel_flag();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current segment...".yellow());
            flag.cancel();
        }
    });

    let outcome = handle.wait().await;
    signal.abort();

    // Dropping the last hub handle disconnects the printer.
    drop(manager);
    if printer.join().is_err() {
        eprintln!("{}", "Progress printer panicked".red());
    }

    match outcome? {
        JobOutcome::Chapter(path) => println!("{}", path.display()),
        JobOutcome::Book(summary) => {
            println!("{}", render_summary(&summary, std::io::stdout().is_terminal()));
            if !summary.failed.is_empty() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let path = custom_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            let toml = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{toml}");
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(&path)?;
            println!("{} {}", "Wrote".green(), path.display());
        }
    }
    Ok(())
}
