extern crate postgres;
extern crate chrono;
extern crate log;
extern crate log4rs;
extern crate ctrlc;
extern crate clap;

use std::sync::mpsc::{Sender, Receiver};
use std::sync::{mpsc, Arc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use serde::{Serialize, Deserialize};

use std::process::exit;

use clap::App;
use std::fs::File;
use std::io::Read;

mod adapter;
mod database;
mod error;
mod ingest;
mod reconcile;
mod record;
mod registry;
mod socket;
mod store;
mod units;

use adapter::{Ecowitt, Wunderground};
use ingest::Report;
use registry::AdapterRegistry;

static DEFAULT_CONFIG_PATH: &str = "/etc/wxlogd/wxlogd.yml";
static DEFAULT_LOG_CONFIG_PATH: &str = "/etc/wxlogd/log.yml";

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Configuration {
    database_connection_parameters: database::DatabaseParameters,
    socket_connection_parameters: socket::SocketParameters,
    #[serde(default)]
    ingest_parameters: ingest::IngestParameters,
}

fn load_configuration(path: &str) -> Result<Configuration, String> {
    let mut configuration_file = File::open(path)
        .map_err(|err| format!("Cannot open the configuration file \'{}\': \'{}\'", path, err))?;

    let mut configuration_string = String::new();
    configuration_file.read_to_string(&mut configuration_string)
        .map_err(|err| format!("Cannot read the configuration from file: \'{}\'", err))?;

    serde_yaml::from_str::<Configuration>(configuration_string.as_str())
        .map_err(|err| format!("Cannot deserialize the configuration: \'{}\'", err))
}

fn main() {
    let cli_yaml = clap::load_yaml!("cli.yml");
    let matches = App::from(cli_yaml).get_matches();
    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let log_config_path = matches.value_of("log-config").unwrap_or(DEFAULT_LOG_CONFIG_PATH);

    match log4rs::init_file(log_config_path, Default::default()) {
        Ok(_) => {},
        Err(err) => {
            eprintln!("Could not create logger from yaml configuration: {}", err);
            exit(-100);
        }
    };

    let configuration = match load_configuration(config_path) {
        Ok(configuration) => configuration,
        Err(err) => {
            log::error!(target: "wxlogd", "{}", err);
            exit(101);
        }
    };

    let policy = configuration.ingest_parameters.field_policy;
    let adapters = match registry::install(AdapterRegistry::builder()
        .register(Ecowitt::new(policy))
        .register(Wunderground::new(policy))
        .freeze()) {
        Ok(adapters) => adapters,
        Err(err) => {
            log::error!(target: "wxlogd", "Cannot install the adapter registry: \'{}\'", err);
            exit(102);
        }
    };
    if adapters.is_empty() {
        log::error!(target: "wxlogd", "No station adapters registered!");
        exit(103);
    }
    log::info!(target: "wxlogd", "Registered {} station adapters", adapters.len());

    let terminate_programm = Arc::new(AtomicBool::new(false));
    let terminate_main_thread = Arc::clone(&terminate_programm);

    let worker_count = configuration.ingest_parameters.workers.max(1);
    let mut worker_senders: Vec<Sender<Report>> = Vec::with_capacity(worker_count);
    let mut worker_threads = Vec::with_capacity(worker_count);

    for worker in 0..worker_count {
        let (tx, rx): (Sender<Report>, Receiver<Report>) = mpsc::channel();
        worker_senders.push(tx);

        let terminate_database_thread = Arc::clone(&terminate_programm);
        let database_configuration = configuration.database_connection_parameters.clone();
        let ingest_configuration = configuration.ingest_parameters.clone();
        let database_thread = match thread::Builder::new()
            .name(format!("database-{}", worker))
            .spawn(move || {
                database::database_thread(worker, rx, terminate_database_thread, database_configuration, ingest_configuration);
            }) {
            Ok(database_handle) => database_handle,
            Err(err) => {
                log::error!(target: "wxlogd", "Cannot start the database thread: \'{}\'", err);
                exit(202);
            }
        };
        worker_threads.push(database_thread);
    }

    let terminate_socket_thread = Arc::clone(&terminate_programm);
    let socket_configuration = configuration.socket_connection_parameters.clone();
    let routes = socket::Routes::from_registry(adapters);
    let socket_thread = match thread::Builder::new()
        .name("socket".to_string())
        .spawn(move || {
            socket::socket_thread(worker_senders, terminate_socket_thread, socket_configuration, routes);
        }) {
        Ok(socket_handle) => socket_handle,
        Err(err) => {
            log::error!(target: "wxlogd", "Cannot start the udp socket thread: \'{}\'", err);
            exit(201);
        }
    };

    match ctrlc::set_handler(move || {
        log::info!(target: "wxlogd", "Termination signal received!");
        terminate_main_thread.store(true, Ordering::SeqCst);
    }) {
        Ok(_) => {},
        Err(err) => {
            log::error!(target: "wxlogd", "Error setting Ctrl-C handler: \'{}\'", err);
            terminate_programm.store(true, Ordering::SeqCst);
        }
    };

    match socket_thread.join() {
        Ok(_) => log::debug!(target: "wxlogd", "Joined socket thread!"),
        Err(_) => {
            log::error!(target: "wxlogd", "Could not join the socket thread!");
            exit(301);
        }
    };
    for database_thread in worker_threads {
        match database_thread.join() {
            Ok(_) => log::debug!(target: "wxlogd", "Joined database thread!"),
            Err(_) => {
                log::error!(target: "wxlogd", "Could not join the database thread!");
                exit(301);
            }
        };
    }

    log::info!(target: "wxlogd", "Exiting");
    exit(0);
}
