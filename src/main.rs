use anyhow::Context;
use clap::{Parser, Subcommand};
use gsq::{errors::Error, QueryClient, QueryConfig, QueryError, RconClient, RconConfig, RconError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{env, fs};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gsq", version, about = "Query and control game servers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Server information (A2S_INFO).
    Info { addr: String },
    /// Connected players (A2S_PLAYER).
    Players { addr: String },
    /// Server rules (A2S_RULES).
    Rules { addr: String },
    /// Run a command over Source RCON.
    Rcon {
        addr: String,
        password: String,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

/// Contents of the file named by `GSQ_CONFIG`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    rcon: RconConfig,
    query: QueryConfig,
}

fn load_config() -> gsq::Result<Config> {
    let path = match env::var_os("GSQ_CONFIG") {
        Some(path) => path,
        None => return Ok(Config::default()),
    };
    debug!("Loading config from {:?}", path);

    let raw = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    Ok(serde_json::from_str(&raw).context(Error::DataParseError)?)
}

fn query_error(e: QueryError) -> anyhow::Error {
    let kind = e.kind();
    anyhow::Error::new(e).context(kind)
}

fn rcon_error(e: RconError) -> anyhow::Error {
    let kind = e.kind();
    anyhow::Error::new(e).context(kind)
}

async fn query(addr: &str, config: QueryConfig, command: &Command) -> gsq::Result<Value> {
    let mut client = QueryClient::connect(addr, config)
        .await
        .context(Error::NetworkError)?;

    let value = match command {
        Command::Info { .. } => serde_json::to_value(client.info().await.map_err(query_error)?),
        Command::Players { .. } => serde_json::to_value(client.players().await.map_err(query_error)?),
        _ => serde_json::to_value(client.rules().await.map_err(query_error)?),
    };
    Ok(value.context(Error::DataParseError)?)
}

async fn rcon(addr: &str, password: &str, command: &str, config: RconConfig) -> gsq::Result<Value> {
    let mut client = RconClient::connect(addr, config)
        .await
        .context(Error::NetworkError)?;
    client.authenticate(password).await.map_err(rcon_error)?;
    let response = client.execute(command).await.map_err(rcon_error)?;
    client.close().await.map_err(rcon_error)?;

    Ok(json!({
        "command": command,
        "response": response,
    }))
}

#[tokio::main]
async fn main() -> gsq::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config()?;

    let output = match &cli.command {
        Command::Info { addr } | Command::Players { addr } | Command::Rules { addr } => {
            query(addr, config.query, &cli.command).await?
        }
        Command::Rcon {
            addr,
            password,
            command,
        } => rcon(addr, password, &command.join(" "), config.rcon).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
