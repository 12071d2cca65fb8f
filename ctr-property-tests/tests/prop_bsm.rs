//! Property tests for BSM snapshot sequencing
//!
//! - A well-formed series passes every consistency rule
//! - Breaking a strictly increasing counter costs certainty

use ctr_adapter_vendors::vendors::bsm::{check_consistency, BsmCell, BsmSnapshot, SnapshotType};
use ctr_adapter_vendors::vendors::common::scaled_value;
use ctr_core::time::from_epoch;
use ctr_core::FormatChecks;
use proptest::prelude::*;
use rust_decimal::Decimal;

const METER_ID: &str = "001BZR1521070006";
/// Fixed so certainties of two runs compare on the same denominator
const TOTAL_CHECKS: u32 = 200;

#[derive(Debug, Clone, Copy)]
enum Counter {
    RCnt,
    Os,
    Epoch,
}

// ============================================================================
// Strategies
// ============================================================================

/// Strictly increasing values starting above zero
fn increasing(len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..1000, len).prop_map(|steps| {
        steps
            .iter()
            .scan(0i64, |acc, step| {
                *acc += step;
                Some(*acc)
            })
            .collect()
    })
}

fn series() -> impl Strategy<Value = Vec<BsmSnapshot>> {
    (2usize..8).prop_flat_map(|len| {
        (increasing(len), increasing(len), increasing(len), increasing(len)).prop_map(
            move |(rcnt, os, epoch, energy)| {
                (0..len)
                    .map(|i| {
                        let typ = if i == 0 {
                            SnapshotType::Start
                        } else if i == len - 1 {
                            SnapshotType::End
                        } else {
                            SnapshotType::Current
                        };
                        let mut snapshot = BsmSnapshot::new(METER_ID, typ);
                        snapshot.rcnt = BsmCell::new(rcnt[i]);
                        snapshot.os = BsmCell::new(os[i]);
                        snapshot.epoch = BsmCell::new(1_600_000_000 + epoch[i]);
                        snapshot.tot_wh_imp = BsmCell::new(energy[i]);
                        snapshot
                    })
                    .collect()
            },
        )
    })
}

fn times(snapshots: &[BsmSnapshot]) -> Vec<Option<chrono::DateTime<chrono::FixedOffset>>> {
    snapshots
        .iter()
        .map(|s| from_epoch(s.epoch.value, 60).ok())
        .collect()
}

fn counter() -> impl Strategy<Value = Counter> {
    prop_oneof![Just(Counter::RCnt), Just(Counter::Os), Just(Counter::Epoch)]
}

fn run(snapshots: &[BsmSnapshot]) -> FormatChecks {
    let mut checks = FormatChecks::new(TOTAL_CHECKS);
    check_consistency(snapshots, &times(snapshots), None, &mut checks);
    checks
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn well_formed_series_is_consistent(snapshots in series()) {
        let checks = run(&snapshots);
        prop_assert!(checks.errors().is_empty(), "{:?}", checks.errors());
        prop_assert_eq!(checks.certainty(), 1.0);
    }

    #[test]
    fn broken_counter_lowers_certainty(
        snapshots in series(),
        which in counter(),
        at in any::<prop::sample::Index>(),
    ) {
        let baseline = run(&snapshots);

        let mut broken = snapshots.clone();
        let i = 1 + at.index(broken.len() - 1);
        let previous = broken[i - 1].clone();
        match which {
            Counter::RCnt => broken[i].rcnt = previous.rcnt,
            Counter::Os => broken[i].os = previous.os,
            Counter::Epoch => broken[i].epoch = previous.epoch,
        }

        let checks = run(&broken);
        prop_assert!(checks.errors().len() > baseline.errors().len());
        prop_assert!(checks.certainty() < baseline.certainty());
    }

    #[test]
    fn changed_meter_id_is_flagged(snapshots in series(), at in any::<prop::sample::Index>()) {
        let mut broken = snapshots;
        let i = 1 + at.index(broken.len() - 1);
        broken[i].meter_id = format!("{}X", METER_ID);
        prop_assert!(!run(&broken).errors().is_empty());
    }

    #[test]
    fn negative_scale_shifts_decimal_point(raw in -1_000_000_000i64..1_000_000_000, scale in 0u32..10) {
        let value = scaled_value(raw, -(scale as i8)).unwrap();
        prop_assert_eq!(value, Decimal::new(raw, scale));
    }
}
