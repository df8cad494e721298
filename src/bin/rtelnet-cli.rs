//! Minimal CLI demonstrating the session contract: connect, log in, then
//! read commands from stdin one per line and print the response.
//!
//! This binary is the "external collaborator" `spec.md` §6 describes; the
//! library itself never parses argv or reads stdin.

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use rtelnet::{Session, SessionConfig};

fn init_logging() {
    // RTELNET_LOG follows env_logger's usual RUST_LOG-style syntax; the
    // library never initializes a logger itself (that stays an
    // application decision), so the demo binary is the only place this
    // happens.
    if let Ok(filter) = env::var("RTELNET_LOG") {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn run() -> Result<(), String> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let [_, address, port] = args.as_slice() else {
        return Err(format!("usage: {} <address> <port>", args.first().map(String::as_str).unwrap_or("rtelnet-cli")));
    };
    let port: u16 = port.parse().map_err(|_| format!("invalid port: {port}"))?;

    let username = prompt("username").map_err(|e| e.to_string())?;
    let password = prompt("password").map_err(|e| e.to_string())?;

    let config = SessionConfig::new(address.as_str(), username, password).port(port);
    let mut session = Session::new(config);

    session.connect().map_err(|e| format!("connect failed: {e}\n{}", session.error_stack()))?;
    session.flush_banner().map_err(|e| format!("banner flush failed: {e}"))?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| e.to_string())?;
        if line.is_empty() {
            continue;
        }
        match session.execute(&line) {
            Ok(output) => print!("{output}"),
            Err(e) => return Err(format!("execute failed: {e}\n{}", session.error_stack())),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("rtelnet-cli: {message}");
            ExitCode::FAILURE
        }
    }
}
