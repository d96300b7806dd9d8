use clap::{Parser, Subcommand};
use guldan_client::{ClientConfig, Error, GuldanClient, NotifyCallback};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Guldan server, overrides `GULDAN_ADDRESS`
    #[arg(short, long)]
    address: Option<String>,

    /// Credential for private items
    #[arg(short, long, default_value = "")]
    token: String,

    /// Read the gray (canary) channel
    #[arg(short, long)]
    gray: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current value of an item
    Get {
        /// Item id, `group.project.name`
        id: String,
    },
    /// Print an item, then every change to it until interrupted
    Watch {
        /// Item id, `group.project.name`
        id: String,

        /// Seconds between polls, overrides `GULDAN_REFRESH_SECS`
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(address) = args.address {
        config.address = address;
    }

    match args.command {
        Command::Get { id } => {
            let client = GuldanClient::new(&config);
            let value = client.get(&id, &args.token, false, args.gray).await?;
            println!("{value}");
        }
        Command::Watch { id, interval } => {
            if let Some(secs) = interval.filter(|s| *s > 0) {
                config.refresh_interval = Duration::from_secs(secs);
            }
            let client = GuldanClient::new(&config);
            client.set_printer(Some(Arc::new(|message: &str| eprintln!("{message}"))));

            let initial = client.get(&id, &args.token, true, args.gray).await?;
            println!("{initial}");

            let notify: NotifyCallback = Arc::new(|err: Option<&Error>, key: &str, value: &str| {
                match err {
                    Some(err) => eprintln!("{key}: {err}"),
                    None => println!("{value}"),
                }
            });
            client
                .watch(&id, &args.token, args.gray, Some(notify), None)
                .await?;

            tokio::signal::ctrl_c().await?;
            client.shutdown();
        }
    }

    Ok(())
}
