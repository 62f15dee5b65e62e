//! Interactive line-oriented client.
//!
//! Reads commands like `SET key value`, frames them for the selected
//! database, and prints the server's response. `SELECT n` switches the
//! database used for subsequent commands (creating it server-side if
//! needed).

use clap::Arg;
use commonware_runtime::{tokio as tokio_runtime, Metrics as _, Network, Runner};
use commonware_stream::utils::codec::{recv_frame, send_frame};
use keybank::{command, crate_version, Command, MAX_MESSAGE_SIZE};
use std::{io::Write as _, net::SocketAddr};

fn main() {
    let matches = clap::Command::new("keybank-client")
        .version(crate_version())
        .about("Interactive client for the keybank server")
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("ADDR")
                .help("Server address to connect to")
                .default_value("127.0.0.1:9090"),
        )
        .get_matches();

    let server: SocketAddr = matches
        .get_one::<String>("server")
        .unwrap()
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("invalid server address: {e}");
            std::process::exit(1);
        });

    let executor = tokio_runtime::Runner::new(tokio_runtime::Config::default());
    executor.start(|context| async move {
        tokio_runtime::telemetry::init(
            context.with_label("telemetry"),
            tokio_runtime::telemetry::Logging {
                level: tracing::Level::WARN,
                json: false,
            },
            None,
            None,
        );

        let (mut sink, mut stream) = match context.dial(server).await {
            Ok(pair) => pair,
            Err(err) => {
                eprintln!("failed to connect to {server}: {err}");
                return;
            }
        };
        println!("connected to {server}");

        let mut database = 0u64;
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            print!("keybank[{database}]> ");
            let _ = std::io::stdout().flush();
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    eprintln!("read failed: {err}");
                    break;
                }
            }
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
                break;
            }

            let (name, statement) = match input.split_once(' ') {
                Some((name, rest)) => (name, rest.trim()),
                None => (input, ""),
            };
            let Some(command) = Command::parse(name) else {
                println!("(error) unknown command '{name}'");
                continue;
            };
            // SELECT carries its target in the frame's database id field
            let (id, statement) = if command == Command::Select {
                match statement.parse::<u64>() {
                    Ok(id) => (id, ""),
                    Err(_) => {
                        println!("(error) value is not an integer or out of range");
                        continue;
                    }
                }
            } else {
                (database, statement)
            };

            let request = command::frame(command, id, statement.as_bytes());
            if let Err(err) = send_frame(&mut sink, &request, MAX_MESSAGE_SIZE).await {
                eprintln!("send failed: {err}");
                break;
            }
            let response = match recv_frame(&mut stream, MAX_MESSAGE_SIZE).await {
                Ok(response) => response,
                Err(err) => {
                    eprintln!("recv failed: {err}");
                    break;
                }
            };
            println!("{}", String::from_utf8_lossy(&response));
            if command == Command::Select && response.as_ref() == b"OK" {
                database = id;
            }
        }
    });
}
