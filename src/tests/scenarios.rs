use super::fixtures::{triangle, two_zone};
use crate::dc::make_b_dc;
use crate::math::entry;
use crate::opt::ReduceOpt;
use crate::reduce::network_sensitivity;
use crate::select::select_representatives;
use crate::transaction::Transaction;
use crate::ttc::{transfer_capacity, TtcOutcome};
use crate::ybus::make_ybus;
use anyhow::Result;

#[test]
fn triangle_ybus_is_fully_populated() {
    let net = triangle();
    let y = make_ybus(&net.bus, &net.branch);
    assert_eq!(y.shape(), (3, 3));
    assert_eq!(y.nnz(), 9);
    for i in 0..3 {
        for j in 0..3 {
            assert!(entry(&y, i, j).norm() > 0.0);
            assert_eq!(entry(&y, i, j), entry(&y, j, i));
        }
    }
}

#[test]
fn triangle_ttc_is_limited_by_parallel_path() -> Result<()> {
    let net = triangle();
    let y = make_ybus(&net.bus, &net.branch);
    let (sens, warnings) = network_sensitivity(&net, &y, &ReduceOpt::default())?;
    assert!(warnings.is_empty());
    assert_eq!(sens.ttc.len(), 3);

    let t13 = Transaction::new(1, 3)?;
    let rec = sens
        .ttc
        .iter()
        .find(|r| r.transaction == t13)
        .expect("transaction (1,3)");

    // Half the transfer flows on 1-3 directly, half through bus 2.
    let ttc = rec.value().expect("bounded TTC");
    assert!((ttc - 100.0).abs() < 1e-6);
    assert!(ttc < 200.0);
    let l = rec.limiting_branch().expect("limiting branch");
    assert_eq!(sens.ptdf.branch_ids(l), (1, 3));
    Ok(())
}

#[test]
fn ttc_is_the_smallest_ratio() -> Result<()> {
    let net = two_zone();
    let y = make_ybus(&net.bus, &net.branch);
    let opt = ReduceOpt::default();
    let (sens, _) = network_sensitivity(&net, &y, &opt)?;

    for rec in &sens.ttc {
        let p = sens.ptdf.transaction(&rec.transaction)?;
        let (value, branch) = match rec.outcome {
            TtcOutcome::Limited { value, branch } => (value, branch),
            TtcOutcome::Unbounded => panic!("{} unbounded", rec.transaction),
        };
        assert_eq!(value, sens.capacity[branch] / p[branch].abs());
        for (l, pl) in p.iter().enumerate() {
            if pl.abs() > opt.ptdf_epsilon {
                assert!(value <= sens.capacity[l] / pl.abs());
            }
        }
        assert_eq!(
            transfer_capacity(&p, &sens.capacity, opt.ptdf_epsilon),
            rec.outcome
        );
    }
    Ok(())
}

#[test]
fn two_zone_representatives_are_degree_three_buses() -> Result<()> {
    let mut net = two_zone();
    let b_bus = make_b_dc(&make_ybus(&net.bus, &net.branch));
    let reps = select_representatives(&mut net.bus, &b_bus, 1e-9)?;
    assert_eq!(reps, vec![1, 3]);
    assert_eq!(net.representatives(), vec![1, 3]);
    Ok(())
}
