use clap::{Parser, Subcommand};
use ragline::Result;
use ragline::commands::{ingest, init_config, query, show_config, show_status, work};

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "A retrieval-augmented QA pipeline over your own documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize or inspect the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Queue a source for ingestion
    Ingest {
        /// URL of the source, or literal text with --raw
        source: String,
        /// Treat the source as literal text instead of a URL
        #[arg(long)]
        raw: bool,
    },
    /// Run the embedding worker that drains the ingestion queue
    Work {
        /// Process one batch and exit instead of running continuously
        #[arg(long)]
        once: bool,
    },
    /// Ask a question against the ingested corpus
    Query {
        /// The question to answer
        question: String,
        /// Only show retrieved context, skip answer generation
        #[arg(long)]
        no_generate: bool,
    },
    /// Show connectivity and pipeline status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Ingest { source, raw } => {
            ingest(source, raw).await?;
        }
        Commands::Work { once } => {
            work(once).await?;
        }
        Commands::Query {
            question,
            no_generate,
        } => {
            query(question, no_generate).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["ragline", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_url() {
        let cli = Cli::try_parse_from(["ragline", "ingest", "https://example.com"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { source, raw } = parsed.command {
                assert_eq!(source, "https://example.com");
                assert!(!raw);
            }
        }
    }

    #[test]
    fn ingest_command_with_raw_flag() {
        let cli = Cli::try_parse_from(["ragline", "ingest", "some literal text", "--raw"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { source, raw } = parsed.command {
                assert_eq!(source, "some literal text");
                assert!(raw);
            }
        }
    }

    #[test]
    fn work_once_flag() {
        let cli = Cli::try_parse_from(["ragline", "work", "--once"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Work { once } = parsed.command {
                assert!(once);
            }
        }
    }

    #[test]
    fn query_command() {
        let cli = Cli::try_parse_from(["ragline", "query", "what is chunking?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                no_generate,
            } = parsed.command
            {
                assert_eq!(question, "what is chunking?");
                assert!(!no_generate);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["ragline", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["ragline", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["ragline", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
