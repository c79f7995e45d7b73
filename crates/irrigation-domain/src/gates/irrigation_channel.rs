//! Gate 4 backpressure: decide which eligible consumers can take the signal right now.
//!
//! Deduplication, rate limiting and the audit write are sequenced by the engine around this
//! check.

use crate::model::ChannelLoad;
use crate::policy::ChannelPolicy;
use irrigation_types::{ConsumerId, Priority};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelAdmission {
    Open {
        consumers: Vec<ConsumerId>,
        /// Blocked consumers skipped in favour of the open ones.
        spilled: Vec<ConsumerId>,
    },
    Blocked {
        blocked: Vec<ConsumerId>,
    },
}

/// Queue depth at which a consumer stops taking signals of `priority`.
pub fn queue_limit(capacity: usize, priority: Priority, high_water_ratio: f64) -> usize {
    match priority {
        Priority::Low => {
            let mark = (capacity as f64 * high_water_ratio).ceil() as usize;
            mark.clamp(1, capacity.max(1))
        }
        _ => capacity,
    }
}

pub fn admit(priority: Priority, loads: &[ChannelLoad], policy: &ChannelPolicy) -> ChannelAdmission {
    let (open, blocked): (Vec<&ChannelLoad>, Vec<&ChannelLoad>) = loads
        .iter()
        .partition(|l| l.depth < queue_limit(l.capacity, priority, policy.high_water_ratio));

    let ids = |ls: Vec<&ChannelLoad>| -> Vec<ConsumerId> {
        ls.into_iter().map(|l| l.consumer_id.clone()).collect()
    };

    if open.is_empty() {
        return ChannelAdmission::Blocked {
            blocked: ids(blocked),
        };
    }
    if blocked.is_empty() {
        return ChannelAdmission::Open {
            consumers: ids(open),
            spilled: Vec::new(),
        };
    }
    if priority.may_spill() {
        return ChannelAdmission::Open {
            consumers: ids(open),
            spilled: ids(blocked),
        };
    }
    ChannelAdmission::Blocked {
        blocked: ids(blocked),
    }
}
