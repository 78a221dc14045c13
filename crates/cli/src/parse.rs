//! ArgMatches → CliAction conversion.
//!
//! Configuration files are loaded here and command-line flags override
//! their fields, so every action carries a validated configuration.

use clap::ArgMatches;
use dtranx::{ClientConfig, Key, NodeConfig, Value};
use std::time::Duration;

/// What the user asked for.
#[derive(Debug)]
pub enum CliAction {
    /// Run a storage node until killed
    Serve(NodeConfig),
    /// Read keys in one transaction
    Get {
        config: ClientConfig,
        keys: Vec<Key>,
        snapshot: bool,
    },
    /// Write pairs in one transaction
    Put {
        config: ClientConfig,
        pairs: Vec<(Key, Value)>,
    },
    /// Ping every node
    Ping(ClientConfig),
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    let (sub_name, m) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    match sub_name {
        "serve" => parse_serve(m).map(CliAction::Serve),
        "get" => {
            let keys = m
                .get_many::<String>("keys")
                .ok_or("No keys given")?
                .map(Key::from)
                .collect();
            Ok(CliAction::Get {
                config: client_config(m)?,
                keys,
                snapshot: m.get_flag("snapshot"),
            })
        }
        "put" => {
            let raw: Vec<&String> = m.get_many::<String>("pairs").ok_or("No pairs given")?.collect();
            if raw.len() % 2 != 0 {
                return Err(format!("'{}' has no value", raw[raw.len() - 1]));
            }
            let pairs = raw
                .chunks(2)
                .map(|kv| (Key::from(kv[0]), Value::from(kv[1])))
                .collect();
            Ok(CliAction::Put {
                config: client_config(m)?,
                pairs,
            })
        }
        "ping" => client_config(m).map(CliAction::Ping),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn parse_serve(m: &ArgMatches) -> Result<NodeConfig, String> {
    let mut config = match m.get_one::<String>("config") {
        Some(path) => NodeConfig::load(path).map_err(|e| format!("{}: {}", path, e))?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = m.get_one::<String>("listen") {
        config = config.listen(listen.clone());
    }
    if let Some(max) = m.get_one::<usize>("max-versions") {
        config = config.max_versions(*max);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn client_config(m: &ArgMatches) -> Result<ClientConfig, String> {
    let mut config = match m.get_one::<String>("config") {
        Some(path) => ClientConfig::load(path).map_err(|e| format!("{}: {}", path, e))?,
        None => ClientConfig::default(),
    };
    if let Some(nodes) = m.get_many::<String>("nodes") {
        config = config.nodes(nodes.cloned());
    }
    if let Some(ms) = m.get_one::<u64>("timeout-ms") {
        config = config.request_timeout(Duration::from_millis(*ms));
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}
