mod cli;

use kvwatch::backend::metadata::MetadataBackend;
use kvwatch::backend::{is_stopped, Backend, Cursor, Snapshot};
use kvwatch::config::Settings;
use std::time::Duration;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("KVWATCH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let command_result = match cli.command {
        cli::Command::Get(get_cli) => get(cli.config.as_deref(), get_cli).await,
        cli::Command::Watch(watch_cli) => watch(cli.config.as_deref(), watch_cli).await,
        cli::Command::Flatten(flatten_cli) => flatten(flatten_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

async fn connect(config: Option<&std::path::Path>) -> anyhow::Result<Box<dyn Backend>> {
    let settings = Settings::load(config)?;
    let backend = MetadataBackend::from_config(&settings.metadata).await?;
    Ok(Box::new(backend))
}

pub async fn get(config: Option<&std::path::Path>, cli: cli::GetCommand) -> anyhow::Result<()> {
    let backend = connect(config).await?;
    let values = backend.get_values(&cli.keys).await?;

    output(&cli.output, &values)
}

/// Re-read `prefix` after every watch wakeup and print it when it changed
///
/// Stops on ctrl-c.
pub async fn watch(config: Option<&std::path::Path>, cli: cli::WatchCommand) -> anyhow::Result<()> {
    let backend = connect(config).await?;
    let prefixes = vec![cli.prefix.clone()];
    let keys = if cli.keys.is_empty() {
        prefixes.clone()
    } else {
        cli.keys.clone()
    };

    let (stop_tx, mut stop) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            let _ = stop_tx.send(());
        }
    });

    let mut cursor = Cursor::latest();
    let mut last: Option<Snapshot> = None;

    loop {
        let values = backend.get_values(&prefixes).await?;
        if last.as_ref() != Some(&values) {
            output(&cli.output, &values)?;
            last = Some(values);
        }

        cursor = match backend
            .watch_prefix(&cli.prefix, &keys, cursor, stop.clone())
            .await
        {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(backend = backend.name(), %err, "watch failed, retrying");
                err.cursor
            }
        };

        if is_stopped(&stop) {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.interval)) => {}
            _ = stop.changed() => return Ok(()),
        }
    }
}

pub fn flatten(cli: cli::FlattenCommand) -> anyhow::Result<()> {
    let stdin = std::io::read_to_string(std::io::stdin())?;

    let value: kvwatch::value::Value = match serde_json::from_str::<serde_json::Value>(&stdin) {
        Ok(json) => json.into(),
        Err(_) => serde_yaml::from_str::<serde_yaml::Value>(&stdin)?.into(),
    };

    output(&cli.output, &kvwatch::value::flatten(&cli.root, &value))
}

fn output(output: &cli::OutputArgs, values: &Snapshot) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), values)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), values)?;
            println!();
        }
    };

    Ok(())
}
