//! Module for connecting to a postgres database and storing the reports received from a socket in
//! the database.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{self, Duration};

use chrono::{DateTime, Utc};
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use postgres::{Client, Row};
use postgres_openssl::MakeTlsConnector;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ingest::{ingest, IngestParameters, Report};
use crate::record::{SensorDescriptor, SensorIdentity, SensorReading};
use crate::registry;
use crate::store::{Deadline, ReadingStore, SensorStore};

static SQL_CREATE_DATABASE: &'static str = include_str!("sql/create_database.sql");

static SQL_SELECT_SENSOR: &'static str = include_str!("sql/select_sensor.sql");
static SQL_INSERT_SENSOR: &'static str = include_str!("sql/insert_sensor.sql");
static SQL_UPDATE_SENSOR: &'static str = include_str!("sql/update_sensor.sql");

static SQL_INSERT_READING: &'static str = include_str!("sql/insert_reading.sql");

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Struct modeling the parameters required for a database connection.
///
/// This includes SSL/TLS encryption.
pub struct DatabaseParameters
{
    /// The hostname of the database server.
    pub hostname: String,
    /// The port for the database server.
    pub port: u32,
    /// The username to connect as.
    pub username: String,
    /// The password to connect with.
    pub password: String,
    /// The database to open on the server.
    pub database: String,
    /// Seconds to wait for the connection to be established.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds of silence on the connection before TCP keepalives are sent.
    #[serde(default = "default_keepalives_idle")]
    pub keepalives_idle: u64,
    /// Flag to enable tls for the database server connection.
    pub tls_enable: bool,
    /// Parameters for the tls connection to the database server.
    pub tls_params: Option<DatabaseTlsParameters>,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_keepalives_idle() -> u64 {
    30
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Struct for the parameters required for a tls connection to the database.
pub struct DatabaseTlsParameters {
    /// The path to the server certificate for TLS encryption.
    pub server_ca_path: String,
    /// The path to the client certificate for TLS encryption.
    pub client_cert_path: String,
    /// The path to the client key for TLS encryption.
    pub client_key_path: String,
}

/// Sensor and reading storage backed by a postgres connection.
///
/// Every statement runs with the time left until the report deadline as `statement_timeout`.
/// This costs one extra round trip per statement and only bounds the time spent on the server.
/// A stalled network is detected by the TCP keepalives of the connection, not by the deadline.
pub struct PgStore
{
    client: Client,
    health_check_timeout: Duration,
}

impl PgStore {
    pub fn new(client: Client, health_check_timeout: Duration) -> PgStore {
        PgStore { client, health_check_timeout }
    }

    /// Creates the tables if they do not exist yet.
    pub fn create_schema(&mut self) -> Result<(), StoreError> {
        self.client.batch_execute(SQL_CREATE_DATABASE)?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn bound(&mut self, deadline: &Deadline) -> Result<(), StoreError> {
        let remaining = deadline.remaining()?;
        let millis = remaining.as_millis().max(1);
        self.client.batch_execute(&format!("SET statement_timeout = {}", millis))?;
        Ok(())
    }
}

fn sensor_from_row(row: &Row) -> Result<SensorIdentity, StoreError> {
    Ok(SensorIdentity {
        id: row.try_get("id")?,
        station_id: row.try_get("station_id")?,
        remote_id: row.try_get("remote_id")?,
        kind: row.try_get("kind")?,
        location: row.try_get("location")?,
        name: row.try_get("name")?,
        model: row.try_get("model")?,
        battery: row.try_get("battery")?,
        signal: row.try_get("signal")?,
        enabled: row.try_get("enabled")?,
    })
}

impl SensorStore for PgStore {
    fn ping(&mut self, deadline: &Deadline) -> Result<(), StoreError> {
        if self.client.is_closed() {
            return Err(StoreError::Unavailable(String::from("connection is closed")));
        }
        let timeout = deadline.remaining()?.min(self.health_check_timeout);
        self.client.is_valid(timeout).map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    fn find_sensor(&mut self, station_id: &str, remote_id: &str, deadline: &Deadline)
        -> Result<Option<SensorIdentity>, StoreError>
    {
        self.bound(deadline)?;
        match self.client.query_opt(SQL_SELECT_SENSOR, &[&station_id, &remote_id])? {
            Some(row) => Ok(Some(sensor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    fn insert_sensor(&mut self, station_id: &str, remote_id: &str, descriptor: &SensorDescriptor, deadline: &Deadline)
        -> Result<SensorIdentity, StoreError>
    {
        self.bound(deadline)?;
        let row = self.client.query_one(SQL_INSERT_SENSOR,
                                        &[&station_id, &remote_id,
                                          &descriptor.kind, &descriptor.location, &descriptor.name, &descriptor.model,
                                          &descriptor.battery, &descriptor.signal, &descriptor.enabled])?;
        sensor_from_row(&row)
    }

    fn update_sensor(&mut self, existing: &SensorIdentity, descriptor: &SensorDescriptor, deadline: &Deadline)
        -> Result<SensorIdentity, StoreError>
    {
        self.bound(deadline)?;
        match self.client.query_opt(SQL_UPDATE_SENSOR,
                                    &[&existing.id,
                                      &descriptor.kind, &descriptor.location, &descriptor.name, &descriptor.model,
                                      &descriptor.battery, &descriptor.signal, &descriptor.enabled])? {
            Some(row) => sensor_from_row(&row),
            None => Err(StoreError::Missing),
        }
    }
}

impl ReadingStore for PgStore {
    fn append(&mut self, sensor: &SensorIdentity, value: f64, observed_at: DateTime<Utc>, deadline: &Deadline)
        -> Result<SensorReading, StoreError>
    {
        self.bound(deadline)?;
        let stored_at = Utc::now();
        self.client.execute(SQL_INSERT_READING, &[&sensor.id, &value, &observed_at, &stored_at])?;
        Ok(SensorReading { sensor_id: sensor.id, value, observed_at, stored_at })
    }
}

fn connection_string(connection_parameters: &DatabaseParameters) -> String {
    format!("user={} password={} host={} port={} dbname={} connect_timeout={} keepalives=1 keepalives_idle={} application_name=wxlogd",
            connection_parameters.username,
            connection_parameters.password,
            connection_parameters.hostname,
            connection_parameters.port,
            connection_parameters.database,
            connection_parameters.connect_timeout,
            connection_parameters.keepalives_idle)
}

/// Opens a connection to the database server described by `connection_parameters`.
///
/// # Errors
///
/// Errors occur when one of the following conditions is met:
///
/// * The files for the TLS connection cannot be found.
///
/// * The connection cannot be established.
///
/// * The the user is not authorized for the database.
///
pub fn connect(connection_parameters: &DatabaseParameters) -> Result<Client, String>
{
    let postgres_connection_string = connection_string(connection_parameters);

    if !connection_parameters.tls_enable {
        return Client::connect(postgres_connection_string.as_str(), postgres::NoTls)
            .map_err(|err| format!("Could not establish database connection: \'{}\'", err));
    }

    let tls_params = match &connection_parameters.tls_params {
        Some(tls_params) => tls_params,
        None => return Err(String::from("TLS enabled but no TLS parameters specified!")),
    };

    let mut ssl_connection_builder = SslConnector::builder(SslMethod::tls())
        .map_err(|err| format!("Could not create ssl connection builder: \'{}\'", err))?;

    ssl_connection_builder.set_verify(SslVerifyMode::NONE);

    ssl_connection_builder.set_ca_file(&tls_params.server_ca_path)
        .map_err(|err| format!("Could not set ssl ca file: \'{}\'", err))?;
    ssl_connection_builder.set_certificate_file(&tls_params.client_cert_path, SslFiletype::PEM)
        .map_err(|err| format!("Could not set ssl client cert file: \'{}\'", err))?;
    ssl_connection_builder.set_private_key_file(&tls_params.client_key_path, SslFiletype::PEM)
        .map_err(|err| format!("Could not set ssl client key file: \'{}\'", err))?;

    let tls_connector = MakeTlsConnector::new(ssl_connection_builder.build());
    Client::connect(postgres_connection_string.as_str(), tls_connector)
        .map_err(|err| format!("Could not establish database connection: \'{}\'", err))
}

/// Thread function for an ingest worker.
///
/// The worker establishes its own database connection and ingests all reports arriving on its
/// receive channel.
///
/// This function will run until the `thread_finish` parameter was set. If the connection cannot
/// be established at startup the worker sets `thread_finish` and returns.
///
/// # Arguments
///
/// * `worker` - Number of the worker, used for the log output.
///
/// * `rx` - The channel to receive the reports to ingest from.
///
/// * `thread_finish` - Indicates that the thread should finish operation and should return.
///
/// * `connection_parameters` - Parameters for the database connection.
///
/// * `ingest_parameters` - Deadlines for the storage calls of a report.
///
pub fn database_thread(worker: usize,
                       rx: Receiver<Report>,
                       thread_finish: Arc<AtomicBool>,
                       connection_parameters: DatabaseParameters,
                       ingest_parameters: IngestParameters)
{
    let adapters = match registry::global() {
        Ok(adapters) => adapters,
        Err(err) => {
            log::error!(target: "wxlogd::db", "Worker {} cannot start: \'{}\'", worker, err);
            thread_finish.store(true, Ordering::SeqCst);
            return;
        }
    };

    let mut store = match connect(&connection_parameters) {
        Ok(client) => PgStore::new(client, ingest_parameters.health_check_timeout()),
        Err(err) => {
            log::error!(target: "wxlogd::db", "{}", err);
            thread_finish.store(true, Ordering::SeqCst);
            return;
        }
    };

    if let Err(err) = store.create_schema() {
        log::error!(target: "wxlogd::db", "Could not create database schema: \'{}\'", err);
        thread_finish.store(true, Ordering::SeqCst);
        return;
    }

    log::info!(target: "wxlogd::db", "Worker {}: database connection established!", worker);
    let timeout = time::Duration::from_millis(100);

    while !thread_finish.load(Ordering::SeqCst) {
        let report = match rx.recv_timeout(timeout) {
            Ok(report) => report,
            Err(_) => continue,
        };

        if store.is_closed() {
            log::warn!(target: "wxlogd::db", "Worker {}: database connection lost, reconnecting", worker);
            match connect(&connection_parameters) {
                Ok(client) => store = PgStore::new(client, ingest_parameters.health_check_timeout()),
                Err(err) => log::error!(target: "wxlogd::db", "{}", err),
            }
        }

        match ingest(&mut store, adapters, &report, &ingest_parameters) {
            Ok(summary) if !summary.failures.is_empty() => {
                for (remote_id, err) in &summary.failures {
                    log::warn!(target: "wxlogd::db", "Sensor \'{}\' not stored: \'{}\'", remote_id, err);
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::error!(target: "wxlogd::db", "Report of type \'{}\' dropped: \'{}\'", report.station_type, err);
            }
        }
    }

    log::debug!(target: "wxlogd::db", "Worker {} finished", worker);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        let parameters: DatabaseParameters = serde_yaml::from_str("
hostname: db.local
port: 5432
username: wxlogd
password: secret
database: weather
tls_enable: false
tls_params: ~
").unwrap();

        assert_eq!(connection_string(&parameters),
                   "user=wxlogd password=secret host=db.local port=5432 dbname=weather \
                    connect_timeout=5 keepalives=1 keepalives_idle=30 application_name=wxlogd");
    }
}
