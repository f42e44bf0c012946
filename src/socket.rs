//! UDP intake of station reports.
//!
//! A datagram carries the upload path of the station followed by the url encoded parameters,
//! either as `<path>?<query>` or as `<path>\n<body>`.
use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::sleep;
use std::{io, time};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::adapter::Params;
use crate::ingest::Report;
use crate::registry::AdapterRegistry;

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Parameters of the intake socket.
pub struct SocketParameters {
    /// The ip address the socket should listen on.
    pub address: String,
    /// The port the socket should listen on.
    pub port: u32,
}

/// Mapping from upload path to the station type of the adapter serving it.
#[derive(Debug, Clone, Default)]
pub struct Routes(HashMap<String, String>);

impl Routes {
    /// One route per registered adapter.
    pub fn from_registry(registry: &AdapterRegistry) -> Routes {
        let mut routes = HashMap::new();
        for adapter in registry.list_all() {
            log::info!(target: "wxlogd::udp", "Route \'{}\' -> \'{}\'", adapter.endpoint_path(), adapter.station_type());
            routes.insert(adapter.endpoint_path().to_string(), adapter.station_type().to_string());
        }
        Routes(routes)
    }

    /// Builds the report carried by `datagram`, `None` if no route matches.
    pub fn route(&self, datagram: &str) -> Option<Report> {
        let datagram = datagram.trim();
        let split = datagram.find(|c: char| c == '?' || c == '\n').unwrap_or_else(|| datagram.len());
        let (path, rest) = datagram.split_at(split);
        let station_type = self.0.get(path.trim())?;

        Some(Report {
            station_type: station_type.clone(),
            params: Params::from_form(rest.get(1..).unwrap_or("").trim()),
            received_at: Utc::now(),
        })
    }
}

/// Thread function of the intake socket.
///
/// Reports are handed to the ingest workers in turn.
pub fn socket_thread(workers: Vec<Sender<Report>>, thread_finished: Arc<AtomicBool>, params: SocketParameters, routes: Routes) {
    if workers.is_empty() {
        log::error!(target: "wxlogd::udp", "No ingest workers to hand reports to!");
        thread_finished.store(true, Ordering::SeqCst);
        return;
    }

    let socket: UdpSocket = match UdpSocket::bind(format!("{}:{}", params.address, params.port)) {
        Ok(socket) => socket,
        Err(err) => {
            log::error!(target: "wxlogd::udp", "Could not open udp socket: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    };
    match socket.set_nonblocking(true) {
        Ok(_) => log::debug!(target: "wxlogd::udp", "Set socket to nonblocking mode!"),
        Err(err) => {
            log::error!(target: "wxlogd::udp", "Could not set socket to nonblocking mode: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    }

    match socket.local_addr() {
        Ok(res) => {
            log::info!(target: "wxlogd::udp", "Socket Addr: \'{}\'", res);
        }
        Err(err) => {
            log::error!(target: "wxlogd::udp", "Could not get socket address: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    }

    let timeout = time::Duration::from_millis(100);
    let mut next_worker = 0;
    let mut buf: [u8; 4096] = [0; 4096];

    while !thread_finished.load(Ordering::SeqCst) {
        let (buf_size, addr) = match socket.recv_from(&mut buf) {
            Ok(res) => res,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                sleep(timeout);
                continue;
            }
            Err(msg) => {
                log::error!(target: "wxlogd::udp", "Socket cannot recv data: \'{}\'", msg);
                continue;
            }
        };

        log::debug!(target: "wxlogd::udp", "Received data with length: \'{}\' from \'{}\'!", &buf_size, &addr);

        let recv_data_str = match std::str::from_utf8(&buf[..buf_size]) {
            Ok(str) => str,
            Err(err) => {
                log::error!(target: "wxlogd::udp", "Received data cannot be converted to UTF-8 str: \'{}\'", err);
                continue;
            }
        };

        let report = match routes.route(recv_data_str) {
            Some(report) => report,
            None => {
                log::warn!(target: "wxlogd::udp", "Received report for unknown path from \'{}\'!", &addr);
                continue;
            }
        };

        match workers[next_worker].send(report) {
            Ok(_) => log::trace!(target: "wxlogd::udp", "Send report to worker {}!", next_worker),
            Err(err) => {
                log::error!(target: "wxlogd::udp", "Could not send report to worker {}: \'{}\'", next_worker, err);
            }
        };
        next_worker = (next_worker + 1) % workers.len();
    }
}
