//! Client model
//!
//! A client is the entity that flows through the network. Each client has:
//! - A unique id and a client type (set by the source that created it)
//! - Numeric values and text attributes, both keyed case-insensitively
//! - Arrival time into the system and entry time into its current station

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity moving through stations
///
/// # Example
/// ```
/// use queuesim_core_rs::Client;
///
/// let mut client = Client::new(7, "standard", 12.0);
/// client.set_text("Category", "gold");
/// client.set_number("weight", 3.0);
///
/// assert_eq!(client.text("category"), Some("gold"));
/// assert_eq!(client.number("WEIGHT"), Some(3.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    id: u64,
    client_type: String,
    numbers: BTreeMap<String, f64>,
    texts: BTreeMap<String, String>,
    arrival_time: f64,
    station_enter_time: f64,
}

impl Client {
    pub fn new(id: u64, client_type: impl Into<String>, arrival_time: f64) -> Self {
        Self {
            id,
            client_type: client_type.into(),
            numbers: BTreeMap::new(),
            texts: BTreeMap::new(),
            arrival_time,
            station_enter_time: arrival_time,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    pub fn set_client_type(&mut self, client_type: impl Into<String>) {
        self.client_type = client_type.into();
    }

    pub fn arrival_time(&self) -> f64 {
        self.arrival_time
    }

    pub fn station_enter_time(&self) -> f64 {
        self.station_enter_time
    }

    /// Record entry into a new station
    pub fn enter_station(&mut self, time: f64) {
        self.station_enter_time = time;
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.numbers.get(&name.to_lowercase()).copied()
    }

    pub fn set_number(&mut self, name: &str, value: f64) {
        self.numbers.insert(name.to_lowercase(), value);
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.texts.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.texts.insert(key.to_lowercase(), value.into());
    }

    /// Time spent in the system up to `now`
    pub fn time_in_system(&self, now: f64) -> f64 {
        now - self.arrival_time
    }
}
