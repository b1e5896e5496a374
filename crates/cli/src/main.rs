//! Herald CLI
//!
//! Validates an announcement, adapts it per network and publishes it,
//! printing the run summary.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Herald - academic announcement distribution
#[derive(Parser)]
#[command(name = "herald")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate, adapt and publish an announcement across social networks")]
#[command(long_about = r#"
Herald takes one announcement and distributes it to Facebook, Instagram,
LinkedIn, WhatsApp status and TikTok, adapting tone and media per network.

Credentials are read from the environment (a .env file is honoured):
  OPENAI_API_KEY / GEMINI_API_KEY, META_ACCESS_TOKEN, FACEBOOK_PAGE_ID,
  INSTAGRAM_ACCOUNT_ID, LINKEDIN_ACCESS_TOKEN, WHAPI_TOKEN,
  TIKTOK_ACCESS_TOKEN, PEXELS_API_KEY, ELEVENLABS_API_KEY, IMGUR_CLIENT_ID

Examples:
  herald publish --text "La FICCT abre inscripciones" --networks facebook,instagram
  herald adapt --file anuncio.txt --networks tiktok
  herald validate --text "Oferta de celulares"
  herald doctor
"#)]
struct Cli {
    /// Config file (defaults to ~/.herald/config.toml)
    #[arg(short, long, env = "HERALD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// Announcement text, inline or from a file.
#[derive(Args)]
pub struct TextInput {
    /// Announcement text
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,

    /// Read the announcement from a file ("-" for stdin)
    #[arg(long)]
    file: Option<PathBuf>,
}

impl TextInput {
    pub fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) if path.as_os_str() == "-" => {
                std::io::read_to_string(std::io::stdin()).context("reading stdin")
            }
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display())),
            (None, None) => anyhow::bail!("provide --text or --file"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, adapt, synthesize media and publish
    Publish {
        #[command(flatten)]
        input: TextInput,

        /// Comma-separated target networks
        #[arg(short, long, value_delimiter = ',', required = true)]
        networks: Vec<String>,

        /// Caller label recorded in the logs
        #[arg(long, env = "HERALD_CALLER", default_value = "cli")]
        caller: String,
    },

    /// Validate and adapt only; nothing is published
    Adapt {
        #[command(flatten)]
        input: TextInput,

        /// Comma-separated target networks
        #[arg(short, long, value_delimiter = ',', required = true)]
        networks: Vec<String>,
    },

    /// Run the relevance check only
    Validate {
        #[command(flatten)]
        input: TextInput,
    },

    /// Report which networks and media tools are usable
    Doctor,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::logging::init_tracing(if cli.verbose { "debug" } else { "info" });
    herald::HeraldConfig::load_env();

    let config = herald::HeraldConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Publish {
            input,
            networks,
            caller,
        } => {
            commands::publish(&config, &input.read()?, &networks, &caller, cli.format).await?;
        }
        Commands::Adapt { input, networks } => {
            commands::adapt(&config, &input.read()?, &networks, cli.format).await?;
        }
        Commands::Validate { input } => {
            commands::validate(&config, &input.read()?, cli.format).await?;
        }
        Commands::Doctor => {
            commands::doctor(&config, cli.format).await?;
        }
        Commands::Config => {
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn networks_split_on_commas() {
        let cli = Cli::try_parse_from([
            "herald",
            "publish",
            "--text",
            "Inscripciones abiertas",
            "--networks",
            "facebook,instagram",
        ])
        .unwrap();
        match cli.command {
            Commands::Publish { networks, input, .. } => {
                assert_eq!(networks, vec!["facebook", "instagram"]);
                assert_eq!(input.read().unwrap(), "Inscripciones abiertas");
            }
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn text_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anuncio.txt");
        std::fs::write(&path, "Examen final el lunes").unwrap();
        let input = TextInput {
            text: None,
            file: Some(path),
        };
        assert_eq!(input.read().unwrap(), "Examen final el lunes");
    }

    #[test]
    fn text_and_file_conflict() {
        let parsed = Cli::try_parse_from([
            "herald", "validate", "--text", "a", "--file", "b.txt",
        ]);
        assert!(parsed.is_err());
    }
}
