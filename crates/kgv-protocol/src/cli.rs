// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::{
    error::Error,
    fs,
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
    thread,
};

use clap::{Parser, Subcommand};
use kgv_graph::load_ntriples;
use kgv_messages::channel::{ChannelStats, SimplePair, Stats, StreamChannel};
use kgv_protocol::{BuyerReport, BuyerSession, KgvConfig, SellerReport, SellerSession};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "kgv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Private valuation of graph data between a Seller and a Buyer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wait for one Buyer and sell to it
    Seller {
        /// Address to listen on, e.g. 127.0.0.1:7400
        #[arg(long)]
        listen: String,

        /// N-Triples file with the Seller's statements
        #[arg(long)]
        data: PathBuf,

        /// TOML config (defaults apply if not given)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Connect to a Seller and evaluate its data
    Buyer {
        /// Seller address
        #[arg(long)]
        connect: String,

        /// N-Triples file with the Buyer's statements
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run both parties in this process
    Local {
        #[arg(long)]
        seller_data: PathBuf,

        #[arg(long)]
        buyer_data: PathBuf,

        /// Used by both parties
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a config file with every default spelled out
    Init {
        #[arg(long)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(cli: Cli) -> CliResult {
    match cli.command {
        Commands::Seller {
            listen,
            data,
            config,
        } => seller(&listen, &data, config.as_deref()),
        Commands::Buyer {
            connect,
            data,
            config,
        } => buyer(&connect, &data, config.as_deref()),
        Commands::Local {
            seller_data,
            buyer_data,
            config,
        } => local(&seller_data, &buyer_data, config.as_deref()),
        Commands::Init { output, force } => init(&output, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<KgvConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => KgvConfig::load(path)?,
        None => KgvConfig::default(),
    };
    init_tracing(&config.logging.level);

    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn seller(listen: &str, data: &Path, config: Option<&Path>) -> CliResult {
    let config = load_config(config)?;
    let dataset = load_ntriples(data)?;

    let listener = TcpListener::bind(listen)?;
    tracing::info!(%listen, statements = dataset.len(), "waiting for a buyer");

    let (stream, peer) = listener.accept()?;
    stream.set_nodelay(true)?;
    tracing::info!(%peer, "buyer connected");

    let stats = Stats::alloc();
    let channel = ChannelStats::new(StreamChannel::new(stream), stats.clone());

    let rng = config.rng();
    let report = SellerSession::new(channel, config, dataset, rng).run()?;
    print_seller(&report);
    print_stats(&Stats::inner(&stats));

    Ok(())
}

fn buyer(connect: &str, data: &Path, config: Option<&Path>) -> CliResult {
    let config = load_config(config)?;
    let dataset = load_ntriples(data)?;

    let stream = TcpStream::connect(connect)?;
    stream.set_nodelay(true)?;
    tracing::info!(%connect, statements = dataset.len(), "connected to seller");

    let stats = Stats::alloc();
    let channel = ChannelStats::new(StreamChannel::new(stream), stats.clone());

    let rng = config.rng();
    let report = BuyerSession::new(channel, config, dataset, rng).run()?;
    print_buyer(&report);
    print_stats(&Stats::inner(&stats));

    Ok(())
}

fn local(seller_data: &Path, buyer_data: &Path, config: Option<&Path>) -> CliResult {
    let seller_config = load_config(config)?;
    let seller_dataset = load_ntriples(seller_data)?;
    let buyer_dataset = load_ntriples(buyer_data)?;

    // same file, distinct randomness
    let mut buyer_config = seller_config.clone();
    buyer_config.session.seed = seller_config.session.seed.map(|s| s.wrapping_add(1));

    let (seller_end, buyer_end) = SimplePair::connect();
    let seller_stats = Stats::alloc();
    let seller_end = ChannelStats::new(seller_end, seller_stats.clone());
    let buyer_stats = Stats::alloc();
    let buyer_end = ChannelStats::new(buyer_end, buyer_stats.clone());

    let seller = thread::spawn(move || {
        let rng = seller_config.rng();
        SellerSession::new(seller_end, seller_config, seller_dataset, rng).run()
    });

    let rng = buyer_config.rng();
    let buyer = BuyerSession::new(buyer_end, buyer_config, buyer_dataset, rng).run();

    let seller = seller.join().map_err(|_| "seller thread panicked")?;

    // the Seller's error is the cause when both fail
    let seller = seller?;
    let buyer = buyer?;

    print_seller(&seller);
    print_stats(&Stats::inner(&seller_stats));
    print_buyer(&buyer);
    print_stats(&Stats::inner(&buyer_stats));

    Ok(())
}

fn init(output: &Path, force: bool) -> CliResult {
    if output.exists() && !force {
        return Err(format!("{} exists, use --force to overwrite", output.display()).into());
    }

    fs::write(output, KgvConfig::default().to_toml()?)?;
    println!("Wrote default config to {}", output.display());

    Ok(())
}

fn print_seller(report: &SellerReport) {
    println!("Seller, session {}", report.session);
    println!("  parts offered:  {}", report.parts);
    println!(
        "  entropy kinds:  {}",
        report
            .kinds
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(buyer) = &report.buyer_dataset {
        println!("  buyer disclosed {} statements", buyer.len());
    }
    println!(
        "  traffic:        {} bytes sent, {} bytes received",
        report.traffic.bytes_sent, report.traffic.bytes_received
    );
}

fn print_buyer(report: &BuyerReport) {
    match report.session {
        Some(id) => println!("Buyer, session {id}"),
        None => println!("Buyer"),
    }

    if let Some(shared) = &report.intersection {
        println!("  shared statements: {}", shared.len());
    }

    for record in &report.entropies {
        println!(
            "  {:<9} combined {:>8.4}  buyer {:>8.4}  seller {:>8.4}  gain {:>+8.4}",
            record.kind.name(),
            record.combined,
            record.buyer,
            record.seller,
            record.gain
        );
    }

    if let (Some(seller), Some(own)) = (&report.seller_stats, &report.buyer_stats) {
        println!(
            "  statements: seller {}, buyer {}; subjects: seller {}, buyer {}",
            seller.size, own.size, seller.subjects, own.subjects
        );
    }

    if !report.fragments.is_empty() {
        let statements: usize = report.fragments.iter().map(|f| f.len()).sum();
        println!(
            "  obtained {} parts, {} statements",
            report.fragments.len(),
            statements
        );
    }

    if let Some(verdict) = &report.verdict {
        println!("  fair: {}", verdict.fair);
        for check in verdict.failed() {
            println!("    FAILED {}: {}", check.claim, check.diagnostic);
        }
    }

    println!(
        "  traffic: {} bytes sent, {} bytes received",
        report.traffic.bytes_sent, report.traffic.bytes_received
    );
}

fn print_stats(stats: &Stats) {
    println!(
        "  messages: {} sent ({} bytes), {} received ({} bytes), {:.3}s waiting",
        stats.send_count,
        stats.send_size,
        stats.recv_count,
        stats.recv_size,
        stats.wait_time.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_seller() {
        let cli = Cli::parse_from([
            "kgv",
            "seller",
            "--listen",
            "127.0.0.1:7400",
            "--data",
            "seller.nt",
        ]);

        match cli.command {
            Commands::Seller {
                listen,
                data,
                config,
            } => {
                assert_eq!(listen, "127.0.0.1:7400");
                assert_eq!(data, PathBuf::from("seller.nt"));
                assert!(config.is_none());
            }
            _ => panic!("expected seller command"),
        }
    }

    #[test]
    fn parse_local_with_config() {
        let cli = Cli::parse_from([
            "kgv",
            "local",
            "--seller-data",
            "a.nt",
            "--buyer-data",
            "b.nt",
            "--config",
            "kgv.toml",
        ]);

        assert!(matches!(
            cli.command,
            Commands::Local { config: Some(_), .. }
        ));
    }

    #[test]
    fn buyer_needs_an_address() {
        assert!(Cli::try_parse_from(["kgv", "buyer", "--data", "b.nt"]).is_err());
    }
}
