use clap::Parser;
use clashcore::config::ServerConfig;
use clashcore::server::GameServer;
use pulse::logging;
use std::path::PathBuf;
use std::process;

/// Authoritative ChronoClash server.
#[derive(Parser)]
#[command(name = "clashrunner")]
struct Args {
    /// Path to the server configuration file.
    #[arg(long, default_value = "server.toml")]
    config: PathBuf,
    /// Log severity: trace, debug, info, warning, error or critical.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let level = match logging::severity(&args.log_level) {
        Some(level) => level,
        None => {
            eprintln!("Unknown log level: {}", args.log_level);
            process::exit(1);
        }
    };
    let log = logging::term_root(level);

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            logging::crit!(log, "configuration error";
                           "path" => %args.config.display(),
                           "error" => %err);
            process::exit(1);
        }
    };

    let mut server = match GameServer::bind(config, &log) {
        Ok(server) => server,
        Err(err) => {
            logging::crit!(log, "bind failed"; "error" => %err);
            process::exit(1);
        }
    };

    if let Err(err) = server.run() {
        logging::crit!(log, "server terminated abnormally"; "error" => %err);
        process::exit(1);
    }
}
