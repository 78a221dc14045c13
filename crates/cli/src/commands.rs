//! Clap command tree.

use clap::{Arg, ArgAction, Command};

fn nodes_arg() -> Arg {
    Arg::new("nodes")
        .long("nodes")
        .short('n')
        .value_delimiter(',')
        .num_args(1..)
        .help("Storage nodes, comma separated (host:port,...)")
}

fn client_config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .help("Client configuration file (TOML)")
}

fn timeout_arg() -> Arg {
    Arg::new("timeout-ms")
        .long("timeout-ms")
        .value_parser(clap::value_parser!(u64))
        .help("Request timeout in milliseconds")
}

/// Build the top-level command.
pub fn build_cli() -> Command {
    Command::new("dtranx")
        .about("Optimistic distributed transactions over a partitioned key-value store")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Run a storage node")
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .short('l')
                        .help("Address to listen on (default 127.0.0.1:60000)"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .help("Node configuration file (TOML)"),
                )
                .arg(
                    Arg::new("max-versions")
                        .long("max-versions")
                        .value_parser(clap::value_parser!(usize))
                        .help("Versions retained per key for snapshot reads"),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Read keys in one transaction")
                .arg(nodes_arg())
                .arg(client_config_arg())
                .arg(timeout_arg())
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .action(ArgAction::SetTrue)
                        .help("Read at one snapshot"),
                )
                .arg(Arg::new("keys").required(true).num_args(1..).help("Keys to read")),
        )
        .subcommand(
            Command::new("put")
                .about("Write key/value pairs in one transaction")
                .arg(nodes_arg())
                .arg(client_config_arg())
                .arg(timeout_arg())
                .arg(
                    Arg::new("pairs")
                        .required(true)
                        .num_args(2..)
                        .value_names(["KEY", "VALUE"])
                        .help("KEY VALUE [KEY VALUE ...]"),
                ),
        )
        .subcommand(
            Command::new("ping")
                .about("Check that every node answers")
                .arg(nodes_arg())
                .arg(client_config_arg())
                .arg(timeout_arg()),
        )
}
