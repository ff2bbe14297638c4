use crate::dc::bus_degrees;
use crate::error::{ReductionError, Result};
use crate::network::Bus;
use sprs::CsMat;
use std::collections::BTreeMap;

/// Chooses one representative bus per zone and flags it on the bus record.
///
/// Within each zone the bus with the highest network degree wins, degree
/// being the number of other buses connected through `|B_ij| > tol`. Ties
/// go to the lowest bus id. Zones are visited in lexicographic label order
/// and the returned ids follow that order.
pub fn select_representatives(bus: &mut [Bus], b_bus: &CsMat<f64>, tol: f64) -> Result<Vec<usize>> {
    if b_bus.rows() != bus.len() {
        return Err(ReductionError::InvalidTopology(format!(
            "susceptance matrix has {} rows for {} buses",
            b_bus.rows(),
            bus.len()
        )));
    }
    let degree = bus_degrees(b_bus, tol);

    // zone -> (degree, id, position) of the best bus so far
    let mut best: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
    for (k, b) in bus.iter().enumerate() {
        let cand = (degree[k], b.id, k);
        best.entry(b.zone.as_str())
            .and_modify(|cur| {
                if cand.0 > cur.0 || (cand.0 == cur.0 && cand.1 < cur.1) {
                    *cur = cand;
                }
            })
            .or_insert(cand);
    }

    let chosen = best
        .iter()
        .map(|(zone, &(deg, id, k))| {
            log::debug!("zone {}: representative bus {} (degree {})", zone, id, deg);
            (id, k)
        })
        .collect::<Vec<(usize, usize)>>();

    for &(_, k) in &chosen {
        bus[k].representative = true;
    }
    log::info!("selected {} representatives", chosen.len());

    Ok(chosen.into_iter().map(|(id, _)| id).collect())
}
