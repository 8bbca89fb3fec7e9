//! Node and edge metadata.
//!
//! The metadata bag is open and append-only on the key side: each pipeline
//! stage writes only the keys it owns and readers ignore keys they do not
//! know. The value side is a closed union so every read goes through a typed
//! accessor instead of a dynamic cast.

use std::collections::{BTreeMap, BTreeSet};

// Keys written by the telemetry builder.
pub const RATE: &str = "rate";
pub const RATE_3XX: &str = "rate3xx";
pub const RATE_4XX: &str = "rate4xx";
pub const RATE_5XX: &str = "rate5xx";
pub const RATE_OUT: &str = "rateOut";
pub const TCP_SENT_RATE: &str = "tcpSentRate";
pub const TCP_SENT_RATE_OUT: &str = "tcpSentRateOut";
pub const PROTOCOL: &str = "protocol";
pub const DEST_SERVICES: &str = "destServices";
pub const IS_ROOT: &str = "isRoot";
pub const IS_OUTSIDE: &str = "isOutside";
pub const IS_INACCESSIBLE: &str = "isInaccessible";
pub const IS_MISCONFIGURED: &str = "isMisconfigured";
pub const IS_EGRESS: &str = "isEgress";

// Keys owned by individual appender stages.
pub const IS_DEAD: &str = "isDead";
pub const RESPONSE_TIME: &str = "responseTime";
pub const IS_MTLS: &str = "isMTLS";
pub const IS_UNUSED: &str = "isUnused";
pub const HAS_CB: &str = "hasCB";
pub const HAS_VS: &str = "hasVS";
pub const HAS_MISSING_SC: &str = "hasMissingSC";

/// A single metadata value. The shape per key is fixed by the key's owner;
/// accessors return `None` on a shape mismatch rather than guessing.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    F64(f64),
    Bool(bool),
    Str(String),
    StrSet(BTreeSet<String>),
}

impl MetaValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            MetaValue::StrSet(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::F64(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

/// Metadata bag, ordered so that iteration (and anything derived from it)
/// is deterministic.
pub type Metadata = BTreeMap<&'static str, MetaValue>;

/// Read a rate-style value, treating a missing key as zero.
pub fn rate(md: &Metadata, key: &str) -> f64 {
    md.get(key).and_then(MetaValue::as_f64).unwrap_or(0.0)
}

/// Read a flag, treating a missing key as false.
pub fn flag(md: &Metadata, key: &str) -> bool {
    md.get(key).and_then(MetaValue::as_bool).unwrap_or(false)
}

/// Accumulate into a float-valued key, starting from zero when absent.
pub fn add_rate(md: &mut Metadata, key: &'static str, value: f64) {
    match md.entry(key).or_insert(MetaValue::F64(0.0)) {
        MetaValue::F64(v) => *v += value,
        slot => *slot = MetaValue::F64(value),
    }
}

/// Add a member to a set-valued key, creating the set when absent.
pub fn add_to_set(md: &mut Metadata, key: &'static str, member: &str) {
    match md
        .entry(key)
        .or_insert_with(|| MetaValue::StrSet(BTreeSet::new()))
    {
        MetaValue::StrSet(set) => {
            set.insert(member.to_string());
        }
        slot => *slot = MetaValue::StrSet(BTreeSet::from([member.to_string()])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accessors_reject_shape_mismatch() {
        let v = MetaValue::from(1.5);
        assert_eq!(v.as_f64(), Some(1.5));
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_str(), None);

        let v = MetaValue::from("labels");
        assert_eq!(v.as_str(), Some("labels"));
        assert_eq!(v.as_f64(), None);
    }

    #[test]
    fn add_rate_accumulates() {
        let mut md = Metadata::new();
        add_rate(&mut md, RATE, 14.0);
        add_rate(&mut md, RATE, 1.4);
        assert_eq!(rate(&md, RATE), 15.4);
        assert_eq!(rate(&md, RATE_4XX), 0.0);
    }

    #[test]
    fn add_to_set_collects_members() {
        let mut md = Metadata::new();
        add_to_set(&mut md, DEST_SERVICES, "httpbin");
        add_to_set(&mut md, DEST_SERVICES, "httpbin");
        add_to_set(&mut md, DEST_SERVICES, "reviews");
        let set = md
            .get(DEST_SERVICES)
            .and_then(MetaValue::as_str_set)
            .cloned()
            .unwrap_or_default();
        assert_eq!(set.len(), 2);
        assert!(set.contains("httpbin"));
    }
}
