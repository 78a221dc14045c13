//! DTranx CLI: run a storage node or issue one-shot transactions.
//!
//! - `dtranx serve [--listen ADDR] [--config node.toml]`
//! - `dtranx get --nodes A,B [--snapshot] KEY...`
//! - `dtranx put --nodes A,B KEY VALUE [KEY VALUE...]`
//! - `dtranx ping --nodes A,B`
//!
//! Logging goes to stderr, filtered by `RUST_LOG` (default `info`).

mod commands;
mod parse;

use anyhow::{Context, Result};
use dtranx::{Batch, DtranxDb, NodeServer, NodeSession, Status, StorageNode, TcpSession};
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use parse::{matches_to_action, CliAction};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    let action = match matches_to_action(&matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("(error) {}", e);
            process::exit(1);
        }
    };

    match run(action) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("(error) {:#}", e);
            process::exit(1);
        }
    }
}

fn run(action: CliAction) -> Result<i32> {
    debug!(?action, "running command");
    match action {
        CliAction::Serve(config) => {
            let listen = config.listen.clone();
            let node = Arc::new(StorageNode::new(config));
            let server = NodeServer::bind(listen.as_str(), node)
                .with_context(|| format!("cannot listen on {}", listen))?;
            server.serve()?;
            Ok(0)
        }
        CliAction::Get {
            config,
            keys,
            snapshot,
        } => {
            let db = DtranxDb::init(config)?;
            let batch = if snapshot {
                Batch::read(&keys).snapshot()
            } else {
                Batch::read(&keys)
            };
            let result = db.execute(batch);
            let code = Status::from_result(&result).code();
            match result {
                Ok(done) => {
                    for (key, value) in keys.iter().zip(done.values) {
                        println!("{} = {}", key, value);
                    }
                }
                Err(e) => eprintln!("(error) {}", e),
            }
            db.close();
            Ok(code)
        }
        CliAction::Put { config, pairs } => {
            let db = DtranxDb::init(config)?;
            let result = db.execute(Batch::write(&pairs));
            let code = Status::from_result(&result).code();
            match result {
                Ok(done) => match done.outcome.version {
                    Some(version) => println!("OK (version {})", version),
                    None => println!("OK"),
                },
                Err(e) => eprintln!("(error) {}", e),
            }
            db.close();
            Ok(code)
        }
        CliAction::Ping(config) => {
            let options = config.session_options();
            let mut failures = 0;
            for addr in &config.nodes {
                let reply = TcpSession::connect(addr.clone(), options).and_then(|s| s.ping());
                match reply {
                    Ok(()) => println!("{} PONG", addr),
                    Err(e) => {
                        failures += 1;
                        println!("{} (error) {}", addr, e);
                    }
                }
            }
            Ok(if failures == 0 { 0 } else { 1 })
        }
    }
}
