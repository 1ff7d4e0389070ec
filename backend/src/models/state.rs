//! Run-time state
//!
//! Mutable state owned by exactly one run:
//! - [`VariableEnvironment`]: global numeric and text variables
//! - [`SystemState`]: clients in the system and per-station occupancy
//!
//! # Invariants
//!
//! 1. Every client id in a station's occupancy exists in the client map
//! 2. `waiting <= in_station` for every station
//! 3. Totals equal the sum over stations

use crate::expression::SystemView;
use crate::models::client::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// VARIABLES
// ============================================================================

/// Global variables, keyed case-insensitively
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::VariableEnvironment;
///
/// let mut env = VariableEnvironment::new();
/// env.set_number("Level", 3.0);
/// env.set_text("Shift", "night");
///
/// assert_eq!(env.number("level"), Some(3.0));
/// assert_eq!(env.text("SHIFT"), Some("night"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableEnvironment {
    numbers: BTreeMap<String, f64>,
    texts: BTreeMap<String, String>,
}

impl VariableEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.numbers.get(&name.to_lowercase()).copied()
    }

    pub fn set_number(&mut self, name: &str, value: f64) {
        self.numbers.insert(name.to_lowercase(), value);
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.texts.insert(name.to_lowercase(), value.into());
    }

    /// All declared names (numbers and texts), lower-cased
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.numbers.keys().chain(self.texts.keys()).map(String::as_str)
    }

    pub fn numbers(&self) -> &BTreeMap<String, f64> {
        &self.numbers
    }

    pub fn texts(&self) -> &BTreeMap<String, String> {
        &self.texts
    }
}

// ============================================================================
// SYSTEM STATE
// ============================================================================

/// Clients currently held by one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationOccupancy {
    /// Clients at the station, waiting or in service
    pub in_station: usize,
    /// Clients waiting in the station's queue
    pub waiting: usize,
}

/// Clients in the system and where they are
#[derive(Debug, Clone)]
pub struct SystemState {
    clients: HashMap<u64, Client>,
    stations: Vec<StationOccupancy>,
    /// Lower-cased station name → index into `stations`
    by_name: HashMap<String, usize>,
    total_waiting: usize,
    next_client_id: u64,
}

impl SystemState {
    /// Create state for stations with the given names (index = station id)
    pub fn new<S: AsRef<str>>(station_names: &[S]) -> Self {
        Self {
            clients: HashMap::new(),
            stations: vec![StationOccupancy::default(); station_names.len()],
            by_name: station_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_ref().to_lowercase(), i))
                .collect(),
            total_waiting: 0,
            next_client_id: 1,
        }
    }

    /// Hand out the next client id
    pub fn allocate_client_id(&mut self) -> u64 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        id
    }

    pub fn insert_client(&mut self, client: Client) {
        self.clients.insert(client.id(), client);
    }

    pub fn remove_client(&mut self, id: u64) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn client(&self, id: u64) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: u64) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn occupancy(&self, station: usize) -> &StationOccupancy {
        &self.stations[station]
    }

    pub fn enter(&mut self, station: usize) {
        self.stations[station].in_station += 1;
    }

    pub fn leave(&mut self, station: usize) {
        let occupancy = &mut self.stations[station];
        debug_assert!(occupancy.in_station > occupancy.waiting);
        occupancy.in_station = occupancy.in_station.saturating_sub(1);
    }

    pub fn start_waiting(&mut self, station: usize) {
        self.stations[station].waiting += 1;
        self.total_waiting += 1;
    }

    pub fn stop_waiting(&mut self, station: usize) {
        let occupancy = &mut self.stations[station];
        occupancy.waiting = occupancy.waiting.saturating_sub(1);
        self.total_waiting = self.total_waiting.saturating_sub(1);
    }
}

impl SystemView for SystemState {
    fn wip(&self) -> usize {
        self.clients.len()
    }

    fn wip_at(&self, station: &str) -> Option<usize> {
        self.by_name
            .get(&station.to_lowercase())
            .map(|&i| self.stations[i].in_station)
    }

    fn queue_length(&self) -> usize {
        self.total_waiting
    }

    fn queue_length_at(&self, station: &str) -> Option<usize> {
        self.by_name
            .get(&station.to_lowercase())
            .map(|&i| self.stations[i].waiting)
    }
}
