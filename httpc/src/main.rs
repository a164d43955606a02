//! Entry point for `httpc`.
//!
//! Parses CLI arguments, builds a [`Client`] from environment defaults plus
//! flags, and prints the response. `RUST_LOG` controls log verbosity.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use httpc::{Client, ClientConfig, Headers, Response, Transport};
use std::path::PathBuf;

/// HTTP/1.0 client over TCP or over reliable UDP through a router.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Send requests over UDP through the router instead of TCP.
    #[arg(long, global = true)]
    udp: bool,

    /// Router host (overrides HTTPC_ROUTER_HOST).
    #[arg(long, global = true)]
    router_host: Option<String>,

    /// Router port (overrides HTTPC_ROUTER_PORT).
    #[arg(long, global = true)]
    router_port: Option<u16>,

    /// Print the status line and headers, not just the body.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// GET a URL, following redirects.
    Get {
        /// Request header as key:value; repeatable.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        url: String,
    },
    /// POST inline data or a file's contents to a URL.
    Post {
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Inline request body.
        #[arg(short, long, required_unless_present = "file", conflicts_with = "file")]
        data: Option<String>,
        /// Read the request body from a file.
        #[arg(short, long)]
        file: Option<PathBuf>,
        url: String,
    },
}

fn parse_headers(args: &[String]) -> Result<Headers> {
    let mut headers = Headers::new();
    for arg in args {
        let (k, v) = Headers::parse_line(arg)
            .ok_or_else(|| anyhow!("invalid header {arg:?}, expected key:value"))?;
        headers.insert(k, v);
    }
    Ok(headers)
}

fn print_response(response: &Response, verbose: bool) {
    if verbose {
        println!("{}", response.raw);
    } else {
        println!("{}", response.body);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(host) = cli.router_host {
        config.router_host = host;
    }
    if let Some(port) = cli.router_port {
        config.router_port = port;
    }
    let transport = if cli.udp { Transport::Udp } else { Transport::Tcp };
    log::debug!("[httpc] {transport:?} transport, router {}", config.router_addr());
    let client = Client::new(config, transport);

    let response = match cli.cmd {
        Command::Get { headers, url } => {
            let headers = parse_headers(&headers)?;
            client.get(&url, &headers).await.with_context(|| format!("GET {url}"))?
        }
        Command::Post {
            headers,
            data,
            file,
            url,
        } => {
            let headers = parse_headers(&headers)?;
            let body = match (data, file) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => Vec::new(),
            };
            client
                .post(&url, &headers, &body)
                .await
                .with_context(|| format!("POST {url}"))?
        }
    };

    print_response(&response, cli.verbose);
    Ok(())
}
