//! Cooldown gate: at most one action per key per cooldown window.
//!
//! The gate is owned by the single processing loop and mutated only there, so the
//! check-then-record sequence needs no locking.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::detect::ObjectClass;

/// Granularity of movement cooldowns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CooldownScope {
    /// Independent cooldown per detected class.
    #[default]
    PerClass,
    /// One site-wide cooldown for all movement.
    Global,
}

impl FromStr for CooldownScope {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "class" | "per-class" | "per_class" => Ok(CooldownScope::PerClass),
            "global" => Ok(CooldownScope::Global),
            other => Err(anyhow!(
                "invalid cooldown scope '{}'; expected 'class' or 'global'",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CooldownKey {
    Global,
    Class(ObjectClass),
    /// Zone violations never share a window with ordinary movement.
    ZoneViolation,
}

#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    scope: CooldownScope,
    last_action: HashMap<CooldownKey, Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration, scope: CooldownScope) -> Self {
        Self {
            window,
            scope,
            last_action: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn scope(&self) -> CooldownScope {
        self.scope
    }

    /// Movement key for a class under the configured scope.
    pub fn key_for(&self, class: ObjectClass) -> CooldownKey {
        match self.scope {
            CooldownScope::PerClass => CooldownKey::Class(class),
            CooldownScope::Global => CooldownKey::Global,
        }
    }

    /// Pure check. A key never acted on is always allowed.
    pub fn should_act(&self, key: CooldownKey, now: Instant) -> bool {
        match self.last_action.get(&key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) >= self.window,
        }
    }

    pub fn record(&mut self, key: CooldownKey, now: Instant) {
        self.last_action.insert(key, now);
    }

    /// Check and, when allowed, record in one step.
    pub fn try_acquire(&mut self, key: CooldownKey, now: Instant) -> bool {
        if self.should_act(key, now) {
            self.record(key, now);
            true
        } else {
            false
        }
    }

    /// Time left before `key` may act again.
    pub fn remaining(&self, key: CooldownKey, now: Instant) -> Duration {
        self.last_action
            .get(&key)
            .map(|last| self.window.saturating_sub(now.saturating_duration_since(*last)))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn first_action_for_a_key_is_allowed() {
        let gate = CooldownGate::new(WINDOW, CooldownScope::PerClass);
        assert!(gate.should_act(CooldownKey::Class(ObjectClass::Car), Instant::now()));
    }

    #[test]
    fn second_action_allowed_only_after_full_window() {
        let mut gate = CooldownGate::new(WINDOW, CooldownScope::PerClass);
        let key = gate.key_for(ObjectClass::Person);
        let t0 = Instant::now();

        assert!(gate.try_acquire(key, t0));
        assert!(!gate.try_acquire(key, t0 + Duration::from_secs(10)));
        assert!(!gate.try_acquire(key, t0 + WINDOW - Duration::from_millis(1)));
        assert!(gate.try_acquire(key, t0 + WINDOW));
    }

    #[test]
    fn checking_does_not_start_a_window() {
        let mut gate = CooldownGate::new(WINDOW, CooldownScope::PerClass);
        let key = CooldownKey::Class(ObjectClass::Dog);
        let t0 = Instant::now();

        assert!(gate.should_act(key, t0));
        assert!(gate.should_act(key, t0 + Duration::from_secs(1)));
        gate.record(key, t0 + Duration::from_secs(1));
        assert!(!gate.should_act(key, t0 + Duration::from_secs(2)));
        assert_eq!(
            gate.remaining(key, t0 + Duration::from_secs(2)),
            WINDOW - Duration::from_secs(1)
        );
    }

    #[test]
    fn per_class_scope_keeps_classes_independent() {
        let mut gate = CooldownGate::new(WINDOW, CooldownScope::PerClass);
        let t0 = Instant::now();
        assert!(gate.try_acquire(gate.key_for(ObjectClass::Person), t0));
        assert!(gate.try_acquire(gate.key_for(ObjectClass::Car), t0));
    }

    #[test]
    fn global_scope_shares_one_window() {
        let mut gate = CooldownGate::new(WINDOW, CooldownScope::Global);
        let t0 = Instant::now();
        assert!(gate.try_acquire(gate.key_for(ObjectClass::Person), t0));
        assert!(!gate.try_acquire(gate.key_for(ObjectClass::Car), t0));
        assert!(gate.try_acquire(CooldownKey::ZoneViolation, t0));
    }

    #[test]
    fn scope_parses_from_config() {
        assert_eq!("Global".parse::<CooldownScope>().unwrap(), CooldownScope::Global);
        assert_eq!("class".parse::<CooldownScope>().unwrap(), CooldownScope::PerClass);
        assert!("site".parse::<CooldownScope>().is_err());
    }
}
