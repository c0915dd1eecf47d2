use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use formpilot::Config;
use formpilot_agent::Session;
use formpilot_resume::ResumePipeline;

#[derive(Parser)]
#[command(name = "formpilot")]
#[command(about = "Fill web application forms from a parsed resume")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the resume parsing HTTP API
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the MCP tool server on stdio
    Mcp,

    /// Catalog a page's interactive elements and print them as JSON
    Catalog {
        /// Page to open
        url: String,
        /// Only list buttons
        #[arg(long, conflicts_with = "inputs")]
        buttons: bool,
        /// Only list input fields
        #[arg(long)]
        inputs: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Parse a resume PDF and print the structured record
    Parse {
        /// PDF file
        pdf: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout belongs to the MCP transport and to JSON output
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            formpilot::server::run(&config).await?;
        }
        Command::Mcp => {
            formpilot::mcp::run_server(&config).await?;
        }
        Command::Catalog {
            url,
            buttons,
            inputs,
            headed,
        } => {
            if headed {
                config.browser.headless = false;
            }
            let mut session = Session::launch(config.browser.clone(), config.catalog.clone()).await?;
            let result = async {
                session.goto(&url).await?;
                let catalog = session.build_catalog().await?;
                let listing = if buttons {
                    serde_json::to_string_pretty(&catalog.button_listing())?
                } else if inputs {
                    serde_json::to_string_pretty(&catalog.input_listing())?
                } else {
                    serde_json::to_string_pretty(&catalog)?
                };
                Ok::<_, anyhow::Error>(listing)
            }
            .await;
            session.close().await?;
            println!("{}", result?);
        }
        Command::Parse { pdf } => {
            let file_name = pdf
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&pdf).await?;
            let pipeline = ResumePipeline::new(config.llm.clone(), config.resume.clone())?;
            let resume = pipeline.run(&file_name, bytes).await?;
            println!("{}", serde_json::to_string_pretty(&resume)?);
        }
    }

    Ok(())
}
