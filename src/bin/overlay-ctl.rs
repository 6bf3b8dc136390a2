use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "overlay-ctl")]
#[command(about = "Management CLI for the IPsec overlay agent", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8111")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the agent is answering
    Ping,
    /// Reload templates and refresh the topology
    Reload,
    /// Show the log level, or set it when LEVEL is given
    LogLevel {
        /// One of trace, debug, info, warn, error, off
        level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Ping => client.get(format!("{base}/ping")).send().await?,
        Commands::Reload => client.post(format!("{base}/v1/reload")).send().await?,
        Commands::LogLevel { level: None } => client.get(format!("{base}/v1/loglevel")).send().await?,
        Commands::LogLevel { level: Some(level) } => {
            client
                .post(format!("{base}/v1/loglevel"))
                .form(&[("level", level)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    if !status.is_success() {
        eprint!("{text}");
        return Err(format!("control API returned status {status}").into());
    }

    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}
