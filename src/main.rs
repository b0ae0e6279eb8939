// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `udrone` — multicast-controlled remote agent.
//!
//! Single-threaded `mio` event loop multiplexing the control socket, the
//! session liveness timer, and the worker-completion channel (§5).

use clap::Parser;
use mio::{Events, Poll};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use udrone::dispatcher::Dispatcher;
use udrone::frame::MAX_DGRAM;
use udrone::handlers::{local_config::ConfigStore, register_builtin_handlers, HandlerContext};
use udrone::net::{self, AgentSocket};
use udrone::registry::HandlerRegistry;
use udrone::{cli, error, identity};

/// `crossbeam::channel::Receiver` isn't an `mio::event::Source`, so the
/// worker-completion channel can't be registered with `Poll` directly; cap
/// the poll timeout so a pending completion is never held up for more than
/// this long behind a quiet socket and a far-off liveness deadline.
const WORKER_POLL_CAP: Duration = Duration::from_millis(200);

fn main() {
    let args = cli::Args::parse();
    init_tracing(&args.log_level);

    if let Err(err) = run(args) {
        tracing::error!(error = %err, "fatal setup failure");
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: cli::Args) -> Result<(), error::SetupError> {
    // Lets a test harness force the bind interface without needing to
    // reinvoke the binary with different arguments.
    let interface = std::env::var("UDRONE_MULTICAST_IF").unwrap_or_else(|_| args.interface.clone());
    tracing::info!(interface = %interface, board = %args.board, "starting udrone");

    let mut socket = AgentSocket::open(&interface)?;
    let mut poll = Poll::new().map_err(error::SetupError::Poll)?;
    socket.register(poll.registry())?;

    let raw_socket = std::net::UdpSocket::bind("0.0.0.0:0").map_err(error::SetupError::Socket)?;
    let unique_id = identity::derive_unique_id(&SocketFd(raw_socket.as_raw_fd()), &interface);
    tracing::info!(unique_id = %unique_id, "derived agent identity");

    let mut registry = HandlerRegistry::new();
    register_builtin_handlers(&mut registry);

    let config = ConfigStore::load(args.config_path());
    let ctx = HandlerContext::new(config);

    let mut dispatcher = Dispatcher::new(unique_id, args.board.clone(), registry);

    let completion_rx = dispatcher.worker().completion_receiver().clone();
    let mut events = Events::with_capacity(16);
    let mut buf = vec![0u8; MAX_DGRAM];

    loop {
        let now = Instant::now();
        let timeout = match dispatcher.poll_timeout(now) {
            Some(d) => Some(d.min(WORKER_POLL_CAP)),
            None => Some(WORKER_POLL_CAP),
        };

        if let Err(e) = poll.poll(&mut events, timeout) {
            if e.kind() != std::io::ErrorKind::Interrupted {
                tracing::debug!(error = %e, "poll error");
            }
            continue;
        }

        let now = Instant::now();
        dispatcher.check_timer(now);

        while let Ok(completion) = completion_rx.try_recv() {
            dispatcher.handle_worker_completion(completion, &socket);
        }

        for event in events.iter() {
            if event.token() == net::socket::SOCKET_TOKEN {
                loop {
                    match socket.try_recv(&mut buf) {
                        Ok(Some((len, from))) => {
                            dispatcher.handle_datagram(&buf[..len], from, &socket, &ctx, Instant::now());
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "socket read error");
                            break;
                        }
                    }
                }
            }
        }

        while let Ok(completion) = completion_rx.try_recv() {
            dispatcher.handle_worker_completion(completion, &socket);
        }
    }
}

/// Thin `AsRawFd` wrapper so identity derivation can use a throwaway
/// socket rather than reaching into `AgentSocket`'s private internals.
struct SocketFd(std::os::unix::io::RawFd);

impl AsRawFd for SocketFd {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.0
    }
}
