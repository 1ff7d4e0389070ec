//! Tests for SimClock and TimeBase

use queuesim_core_rs::{SimClock, TimeBase};

#[test]
fn test_clock_starts_at_zero() {
    let clock = SimClock::new();
    assert_eq!(clock.now(), 0.0);
}

#[test]
fn test_clock_advances_monotonically() {
    let mut clock = SimClock::new();

    clock.advance_to(1.5);
    assert_eq!(clock.now(), 1.5);

    clock.advance_to(4.0);
    assert_eq!(clock.now(), 4.0);
}

#[test]
fn test_clock_accepts_same_instant() {
    // Simultaneous events advance to the current time
    let mut clock = SimClock::new();
    clock.advance_to(3.0);
    clock.advance_to(3.0);
    assert_eq!(clock.now(), 3.0);
}

#[test]
#[should_panic(expected = "simulation clock cannot move backwards")]
fn test_clock_cannot_go_back() {
    let mut clock = SimClock::new();
    clock.advance_to(2.0);
    clock.advance_to(1.999);
}

#[test]
fn test_time_base_seconds() {
    assert_eq!(TimeBase::Seconds.seconds(), 1.0);
    assert_eq!(TimeBase::Minutes.seconds(), 60.0);
    assert_eq!(TimeBase::Hours.seconds(), 3600.0);
}

#[test]
fn test_time_base_default_is_seconds() {
    assert_eq!(TimeBase::default(), TimeBase::Seconds);
}

#[test]
fn test_time_base_serde_names() {
    let base: TimeBase = serde_json::from_str("\"minutes\"").unwrap();
    assert_eq!(base, TimeBase::Minutes);
    assert_eq!(serde_json::to_string(&TimeBase::Hours).unwrap(), "\"hours\"");
}
