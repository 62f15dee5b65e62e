//! Serves the key/value store over TCP.
//!
//! Accepted clients exchange length-prefixed frames with the store; one
//! housekeeping task ticks once per second and drives the durability cycle.

use clap::{Arg, Command};
use commonware_runtime::{
    tokio as tokio_runtime, Clock, Listener, Metrics as _, Network, Runner, SinkOf, Spawner as _,
    StreamOf,
};
use commonware_stream::utils::codec::{recv_frame, send_frame};
use keybank::{crate_version, store, Manager, DEFAULT_PORT, MAX_MESSAGE_SIZE};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tracing::{error, info, warn};

/// Partition holding the persistence blob.
const PARTITION: &str = "store";

/// Handle one client connection until it disconnects.
///
/// Protocol errors (unknown command, malformed frame, missing database) are
/// returned to the offending client as error payloads; transport errors end
/// the connection.
async fn serve<E>(
    manager: Arc<Manager<E>>,
    mut sink: SinkOf<E>,
    mut stream: StreamOf<E>,
    peer: SocketAddr,
) where
    E: commonware_runtime::Storage + commonware_runtime::Metrics + commonware_runtime::Network,
{
    info!(%peer, "client connected");
    loop {
        let frame = match recv_frame(&mut stream, MAX_MESSAGE_SIZE).await {
            Ok(frame) => frame,
            Err(err) => {
                info!(%peer, ?err, "client disconnected");
                return;
            }
        };
        let response = match manager.query(&frame).await {
            Ok(response) => response,
            Err(err) if err.is_protocol() => {
                warn!(%peer, %err, "rejected request");
                format!("(error) {err}").into_bytes()
            }
            Err(err) => {
                error!(%peer, %err, "query failed");
                return;
            }
        };
        if let Err(err) = send_frame(&mut sink, &response, MAX_MESSAGE_SIZE).await {
            info!(%peer, ?err, "client disconnected");
            return;
        }
    }
}

fn main() {
    let matches = Command::new("keybank-server")
        .version(crate_version())
        .about("Multi-database key/value store with snapshot + command-log durability")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on")
                .default_value("9090"),
        )
        .arg(
            Arg::new("storage-dir")
                .short('d')
                .long("storage-dir")
                .value_name("PATH")
                .help("Directory holding the persistence file")
                .default_value("/tmp/keybank"),
        )
        .arg(
            Arg::new("metrics-port")
                .short('m')
                .long("metrics-port")
                .value_name("PORT")
                .help("Port on which metrics are exposed")
                .default_value("9091"),
        )
        .get_matches();

    let port: u16 = matches
        .get_one::<String>("port")
        .unwrap()
        .parse()
        .unwrap_or(DEFAULT_PORT);
    let storage_dir = matches.get_one::<String>("storage-dir").unwrap().clone();
    let metrics_port: u16 = matches
        .get_one::<String>("metrics-port")
        .unwrap()
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("invalid metrics port: {e}");
            std::process::exit(1);
        });

    let executor_config = tokio_runtime::Config::default().with_storage_directory(storage_dir);
    let executor = tokio_runtime::Runner::new(executor_config);
    executor.start(|context| async move {
        tokio_runtime::telemetry::init(
            context.with_label("telemetry"),
            tokio_runtime::telemetry::Logging {
                level: tracing::Level::INFO,
                json: false,
            },
            Some(SocketAddr::from((Ipv4Addr::LOCALHOST, metrics_port))),
            None,
        );

        let manager = match Manager::init(
            context.with_label("store"),
            store::Config {
                partition: PARTITION.to_string(),
            },
        )
        .await
        {
            Ok(manager) => Arc::new(manager),
            Err(err) => {
                error!(%err, "failed to initialize store");
                return;
            }
        };

        // One housekeeping task drives the durability cycle. A failed step is
        // retried on the next tick; the write buffer stays populated until
        // the cycle completes.
        let flusher = manager.clone();
        context
            .with_label("housekeeping")
            .spawn(move |context| async move {
                loop {
                    context.sleep(Duration::from_secs(1)).await;
                    if !flusher.writable().await {
                        continue;
                    }
                    if flusher.truncatable().await {
                        while let Err(err) = flusher.truncate().await {
                            warn!(%err, "truncate failed");
                            context.sleep(Duration::from_secs(1)).await;
                        }
                    }
                    while let Err(err) = flusher.write().await {
                        warn!(%err, "write failed");
                        context.sleep(Duration::from_secs(1)).await;
                    }
                    flusher.wrote().await;
                }
            });

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let mut listener = match context.with_label("listener").bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%addr, %err, "failed to bind");
                return;
            }
        };
        info!(%addr, "listening");

        loop {
            match listener.accept().await {
                Ok((peer, sink, stream)) => {
                    let manager = manager.clone();
                    context.with_label("client").spawn(move |_| async move {
                        serve(manager, sink, stream, peer).await;
                    });
                }
                Err(err) => {
                    error!(%err, "failed to accept client");
                }
            }
        }
    });
}
