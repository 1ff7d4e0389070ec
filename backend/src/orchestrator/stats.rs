//! Indicators collected during a run
//!
//! Kept apart from the report types so replications can merge the raw
//! indicators before summarising them.

use crate::orchestrator::config::StatisticsSettings;
use crate::statistics::{DataIndicator, TimeIndicator};

/// Indicators of one station
#[derive(Debug, Clone)]
pub struct StationStatistics {
    pub name: String,
    pub kind: &'static str,
    /// Clients that reached the station
    pub arrivals: u64,
    /// Time from entering the station to start of service
    pub waiting_time: DataIndicator,
    /// Service or delay duration
    pub service_time: DataIndicator,
    /// Time from entering to leaving the station
    pub residence_time: DataIndicator,
    /// Clients waiting in the queue
    pub queue_length: TimeIndicator,
    /// Clients at the station, waiting or in service
    pub clients: TimeIndicator,
    /// Destination selections, decide stations only
    pub routing: Option<Vec<u64>>,
    /// Recovered expression failures at this station
    pub evaluation_errors: u64,
}

impl StationStatistics {
    pub fn new(name: &str, kind: &'static str, settings: &StatisticsSettings) -> Self {
        let data = || DataIndicator::new(settings.data_upper_bound, settings.data_steps);
        let mut queue_length = TimeIndicator::new(settings.max_state);
        let mut clients = TimeIndicator::new(settings.max_state);
        queue_length.set(0.0, 0.0);
        clients.set(0.0, 0.0);
        Self {
            name: name.to_string(),
            kind,
            arrivals: 0,
            waiting_time: data(),
            service_time: data(),
            residence_time: data(),
            queue_length,
            clients,
            routing: None,
            evaluation_errors: 0,
        }
    }

    pub fn merge(&mut self, other: &StationStatistics) {
        self.arrivals += other.arrivals;
        self.waiting_time.merge(&other.waiting_time);
        self.service_time.merge(&other.service_time);
        self.residence_time.merge(&other.residence_time);
        self.queue_length.merge(&other.queue_length);
        self.clients.merge(&other.clients);
        if let (Some(mine), Some(theirs)) = (&mut self.routing, &other.routing) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        self.evaluation_errors += other.evaluation_errors;
    }

    fn close(&mut self, time: f64) {
        self.queue_length.close(time);
        self.clients.close(time);
    }
}

/// Indicators of one tank or analog value
#[derive(Debug, Clone)]
pub struct ContinuousStatistics {
    pub name: String,
    /// Time-weighted value
    pub level: TimeIndicator,
    /// Notify ticks that reported a change
    pub notifications: u64,
    pub final_value: f64,
    /// Quantity received from flows
    pub flow_in: f64,
    /// Quantity given to flows
    pub flow_out: f64,
}

impl ContinuousStatistics {
    pub fn new(name: &str, initial: f64, settings: &StatisticsSettings) -> Self {
        let mut level = TimeIndicator::new(settings.max_state);
        level.set(0.0, initial);
        Self {
            name: name.to_string(),
            level,
            notifications: 0,
            final_value: initial,
            flow_in: 0.0,
            flow_out: 0.0,
        }
    }
}

/// All indicators of a run
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub clients_created: u64,
    pub clients_disposed: u64,
    pub time_in_system: DataIndicator,
    /// Clients in the system
    pub wip: TimeIndicator,
    pub stations: Vec<StationStatistics>,
    pub continuous: Vec<ContinuousStatistics>,
}

impl RunStatistics {
    pub fn new(settings: &StatisticsSettings) -> Self {
        let mut wip = TimeIndicator::new(settings.max_state);
        wip.set(0.0, 0.0);
        Self {
            clients_created: 0,
            clients_disposed: 0,
            time_in_system: DataIndicator::new(settings.data_upper_bound, settings.data_steps),
            wip,
            stations: Vec::new(),
            continuous: Vec::new(),
        }
    }

    /// Close all open time-weighted intervals at `time`
    pub fn close(&mut self, time: f64) {
        self.wip.close(time);
        for station in &mut self.stations {
            station.close(time);
        }
        for entity in &mut self.continuous {
            entity.level.close(time);
        }
    }

    /// Pool another run of the same model into this one
    pub fn merge(&mut self, other: &RunStatistics) {
        self.clients_created += other.clients_created;
        self.clients_disposed += other.clients_disposed;
        self.time_in_system.merge(&other.time_in_system);
        self.wip.merge(&other.wip);
        for (mine, theirs) in self.stations.iter_mut().zip(&other.stations) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.continuous.iter_mut().zip(&other.continuous) {
            mine.level.merge(&theirs.level);
            mine.notifications += theirs.notifications;
            mine.flow_in += theirs.flow_in;
            mine.flow_out += theirs.flow_out;
        }
    }

    pub fn evaluation_errors(&self) -> u64 {
        self.stations.iter().map(|s| s.evaluation_errors).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counts_and_pools_indicators() {
        let settings = StatisticsSettings::default();
        let mut a = RunStatistics::new(&settings);
        let mut b = RunStatistics::new(&settings);
        a.stations.push(StationStatistics::new("P", "process", &settings));
        b.stations.push(StationStatistics::new("P", "process", &settings));

        a.clients_created = 3;
        b.clients_created = 4;
        a.stations[0].waiting_time.record(1.0);
        b.stations[0].waiting_time.record(3.0);
        a.stations[0].routing = Some(vec![1, 2]);
        b.stations[0].routing = Some(vec![3, 4]);

        a.merge(&b);
        assert_eq!(a.clients_created, 7);
        assert_eq!(a.stations[0].waiting_time.count(), 2);
        assert_eq!(a.stations[0].waiting_time.mean(), 2.0);
        assert_eq!(a.stations[0].routing, Some(vec![4, 6]));
    }

    #[test]
    fn test_close_weights_last_interval() {
        let settings = StatisticsSettings::default();
        let mut stats = RunStatistics::new(&settings);
        stats.wip.set(2.0, 1.0);
        stats.close(10.0);
        // 0 for 2 time units, 1 for 8
        assert!((stats.wip.time_mean() - 0.8).abs() < 1e-12);
    }
}
