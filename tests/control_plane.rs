// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end control-plane scenarios (§8): discovery, assignment, atomic
//! command, duplicate, out-of-sync, and busy — driven against the real
//! [`Dispatcher`] over a loopback `AgentSocket`-free path (loopback
//! `UdpSocket` standing in for the multicast-joined one, since joining a
//! multicast group needs a real interface).

use serde_json::{json, Value};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use udrone::dispatcher::Dispatcher;
use udrone::handlers::{register_builtin_handlers, HandlerContext};
use udrone::net::AgentSocket;
use udrone::registry::HandlerRegistry;

fn send_frame(socket: &UdpSocket, to: &str, from: &str, seq: u32, kind: &str, data: Option<Value>, dest: SocketAddr) {
    let mut frame = json!({"to": to, "from": from, "seq": seq, "type": kind});
    if let Some(data) = data {
        frame["data"] = data;
    }
    socket.send_to(frame.to_string().as_bytes(), dest).unwrap();
}

fn recv_frame(socket: &UdpSocket) -> Value {
    let mut buf = vec![0u8; 4096];
    socket.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let (len, _addr) = socket.recv_from(&mut buf).expect("expected a reply");
    serde_json::from_slice(&buf[..len]).unwrap()
}

fn test_dispatcher() -> Dispatcher {
    let mut registry = HandlerRegistry::new();
    register_builtin_handlers(&mut registry);
    Dispatcher::new("abcdef012345".into(), "generic".into(), registry)
}

#[test]
fn discovery_assignment_atomic_duplicate_out_of_sync_and_busy() {
    let agent_socket = AgentSocket::from_bound(UdpSocket::bind("127.0.0.1:0").unwrap());
    let agent_addr = agent_socket.local_addr().unwrap();
    let mut dispatcher = test_dispatcher();
    let ctx = HandlerContext::for_tests();

    let ctrl = UdpSocket::bind("127.0.0.1:0").unwrap();

    // 1. discovery
    send_frame(&ctrl, "!all-default", "ctrl", 0, "!whois", None, agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let reply = recv_frame(&ctrl);
    assert_eq!(reply["data"]["code"], 0);
    assert_eq!(reply["data"]["board"], "generic");

    // 2. assignment
    send_frame(&ctrl, "!all-default", "ctrl", 1, "!assign", Some(json!({"group": "g1", "seq": 10})), agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let reply = recv_frame(&ctrl);
    assert_eq!(reply["data"]["code"], 0);
    assert_eq!(dispatcher.session().group(), "g1");
    assert_eq!(dispatcher.session().assigned_seq(), 10);

    // 3. atomic command
    send_frame(&ctrl, "g1", "ctrl", 11, "sysinfo", None, agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let reply = recv_frame(&ctrl);
    assert_eq!(reply["type"], "sysinfo");
    assert!(reply["data"]["uptime"].is_number());
    assert_eq!(dispatcher.session().assigned_seq(), 11);

    // 4. duplicate — same seq, no re-execution, same reply content
    send_frame(&ctrl, "g1", "ctrl", 11, "sysinfo", None, agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let dup_reply = recv_frame(&ctrl);
    assert_eq!(dup_reply, reply);
    assert_eq!(dispatcher.session().assigned_seq(), 11);

    // 5. out-of-sync
    send_frame(&ctrl, "g1", "ctrl", 20, "sysinfo", None, agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let err_reply = recv_frame(&ctrl);
    assert_eq!(err_reply["data"]["code"], libc::ESRCH as u64);
    assert_eq!(dispatcher.session().state(), udrone::SessionState::Lost);
}

/// Drains exactly one datagram off `socket`'s underlying fd, blocking
/// briefly. `AgentSocket` is non-blocking internally, so poll for it.
fn recv_on(socket: &AgentSocket) -> (usize, SocketAddr, Vec<u8>) {
    let mut buf = vec![0u8; 4096];
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(Some((len, from))) = socket.try_recv(&mut buf) {
            return (len, from, buf);
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for datagram");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn busy_rejects_in_order_request_while_worker_running() {
    let agent_socket = AgentSocket::from_bound(UdpSocket::bind("127.0.0.1:0").unwrap());
    let agent_addr = agent_socket.local_addr().unwrap();
    let mut dispatcher = test_dispatcher();
    let ctx = HandlerContext::for_tests();
    let ctrl = UdpSocket::bind("127.0.0.1:0").unwrap();

    send_frame(&ctrl, "!all-default", "ctrl", 1, "!assign", Some(json!({"group": "g1", "seq": 10})), agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let _ = recv_frame(&ctrl);

    // Dispatch a non-atomic `system` command; agent replies `accept` then
    // runs the handler on the worker thread.
    send_frame(&ctrl, "g1", "ctrl", 11, "system", Some(json!({"cmd": ["sleep", "1"]})), agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let accept = recv_frame(&ctrl);
    assert_eq!(accept["type"], "accept");
    assert!(dispatcher.worker().is_running());

    // A new in-order request while busy is rejected, seq unchanged.
    send_frame(&ctrl, "g1", "ctrl", 12, "sysinfo", None, agent_addr);
    let (len, from, buf) = recv_on(&agent_socket);
    dispatcher.handle_datagram(&buf[..len], from, &agent_socket, &ctx, Instant::now());
    let busy_reply = recv_frame(&ctrl);
    assert_eq!(busy_reply["data"]["code"], libc::EBUSY as u64);
    assert_eq!(dispatcher.session().assigned_seq(), 11);

    // Drain the worker's own eventual completion so the test doesn't leak
    // a background thread past the end of the process.
    let completion = dispatcher
        .worker()
        .completion_receiver()
        .recv_timeout(Duration::from_secs(3))
        .expect("worker should eventually complete");
    dispatcher.handle_worker_completion(completion, &agent_socket);
    let _final_reply = recv_frame(&ctrl);
}
