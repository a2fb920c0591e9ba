use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpclass::{
    ClientClasses, Config, Error, ExpressionKind, Family, Metadata, Packet, Pkt4, Pkt6, Result,
    compile,
};

#[derive(Parser)]
#[command(name = "dhcpclass")]
#[command(author, version, about = "DHCP client classification expressions", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an expression and list its tokens
    Check {
        expression: String,

        #[arg(short, long, default_value = "v4")]
        family: Family,

        /// Compile as a string expression instead of a boolean one
        #[arg(short, long)]
        string: bool,
    },
    /// Evaluate an expression against a hex-dumped packet
    Eval {
        expression: String,

        #[arg(short, long)]
        packet: PathBuf,

        #[arg(short, long, default_value = "v4")]
        family: Family,

        #[arg(short, long)]
        string: bool,

        #[command(flatten)]
        receive: ReceiveArgs,
    },
    /// List the configured classes a hex-dumped packet belongs to
    Classify {
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        #[arg(short, long)]
        packet: PathBuf,

        #[command(flatten)]
        receive: ReceiveArgs,
    },
    /// Print the validated configuration
    ShowConfig {
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
}

/// Reception metadata for packets read from files.
#[derive(clap::Args)]
struct ReceiveArgs {
    #[arg(long, default_value = "")]
    iface: String,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    src: IpAddr,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    dst: IpAddr,
}

impl ReceiveArgs {
    fn metadata(&self) -> Metadata {
        Metadata::new(self.iface.clone(), self.src, self.dst)
    }
}

fn kind(string: bool) -> ExpressionKind {
    if string {
        ExpressionKind::String
    } else {
        ExpressionKind::Bool
    }
}

/// Reads a packet written as hex digits, whitespace and an optional `0x`.
async fn read_packet(path: &Path, family: Family, metadata: Metadata) -> Result<Packet> {
    let content = tokio::fs::read_to_string(path).await?;
    let digits: String = content.split_whitespace().collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(Error::InvalidPacket(format!(
            "{} holds a non-hex character '{}'",
            path.display(),
            bad
        )));
    }
    if !digits.len().is_multiple_of(2) {
        return Err(Error::InvalidPacket(format!(
            "{} holds an odd number of hex digits",
            path.display()
        )));
    }

    let data = digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).unwrap_or_default();
            u8::from_str_radix(pair, 16)
                .map_err(|error| Error::InvalidPacket(format!("{}: {}", path.display(), error)))
        })
        .collect::<Result<Vec<u8>>>()?;

    info!("Read {} byte {} packet from {:?}", data.len(), family, path);

    Ok(match family {
        Family::V4 => Packet::V4(Pkt4::parse(&data, metadata)?),
        Family::V6 => Packet::V6(Pkt6::parse(&data, metadata)?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Check {
            expression,
            family,
            string,
        } => {
            let program = compile(&expression, family, kind(string))?;
            println!("{} expression, {} tokens:", family, program.tokens().len());
            print!("{}", program);
            Ok(())
        }
        Commands::Eval {
            expression,
            packet,
            family,
            string,
            receive,
        } => {
            let program = compile(&expression, family, kind(string))?;
            let packet = read_packet(&packet, family, receive.metadata()).await?;
            println!("{}", program.evaluate(&packet)?);
            Ok(())
        }
        Commands::Classify {
            config,
            packet,
            receive,
        } => {
            let loaded = Config::load(&config).await?;
            let classes = ClientClasses::from_config(&loaded)?;
            info!("Loaded {} client classes from {:?}", classes.len(), config);

            let packet = read_packet(&packet, loaded.family, receive.metadata()).await?;
            let matched = classes.classify(&packet);

            if matched.is_empty() {
                println!("No classes matched.");
            } else {
                for name in matched {
                    println!("{}", name);
                }
            }
            Ok(())
        }
        Commands::ShowConfig { config } => {
            let loaded = Config::load(&config).await?;
            println!("{}", serde_json::to_string_pretty(&loaded)?);
            Ok(())
        }
    }
}
