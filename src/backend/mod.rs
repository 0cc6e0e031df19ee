//! Metric Backends
//!
//! Backend glue behind [`MeterFactory`](crate::api::MeterFactory). Each
//! backend decides how a meter stores its values; all of them report the
//! same measurement layout:
//!
//! | meter                | measurements (`statistic` tag)  |
//! |----------------------|---------------------------------|
//! | counter              | `count`                         |
//! | timer                | `count`, `totalTime` (seconds)  |
//! | distribution summary | `count`, `totalAmount`          |

mod atomic;
mod prometheus;

pub use atomic::{AtomicCounter, AtomicDistributionSummary, AtomicFactory, AtomicTimer};
pub use self::prometheus::{
    PrometheusCounter, PrometheusDistributionSummary, PrometheusFactory, PrometheusTimer,
};

use crate::api::{DataType, Id, Statistic, STATISTIC_TAG, TYPE_TAG};

/// Id of one statistic of a meter. A `type` tag set by the caller wins.
pub(crate) fn stat_id(id: &Id, statistic: Statistic) -> Id {
    let stat = id.with_tag(STATISTIC_TAG, statistic.value());
    match id.tag(TYPE_TAG) {
        Some(_) => stat,
        None => stat.with_tag(TYPE_TAG, DataType::Counter.value()),
    }
}
