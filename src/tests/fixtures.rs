use crate::network::{Branch, Bus, Network};

fn line(from: usize, to: usize, capacity: f64) -> Branch {
    Branch::new(from, to, 0.01, 0.1, capacity)
}

fn zoned(zones: &[&str]) -> Vec<Bus> {
    zones
        .iter()
        .enumerate()
        .map(|(i, z)| Bus::new(i + 1, z))
        .collect()
}

/// Three buses in one zone, two parallel paths between 1 and 3.
pub fn triangle() -> Network {
    Network {
        base_mva: 100.0,
        bus: zoned(&["A", "A", "A"]),
        branch: vec![
            Branch::new(1, 2, 0.01, 0.1, 100.0),
            Branch::new(2, 3, 0.01, 0.1, 100.0),
            Branch::new(1, 3, 0.02, 0.2, 50.0),
        ],
    }
}

/// Zones A {1, 2} and B {3, 4}; buses 1 and 3 have degree 3.
pub fn two_zone() -> Network {
    let mut net = Network {
        base_mva: 100.0,
        bus: zoned(&["A", "A", "B", "B"]),
        branch: vec![
            line(1, 2, 1.0),
            line(1, 3, 1.0),
            line(1, 4, 0.8),
            line(3, 2, 0.6),
            line(3, 4, 1.0),
        ],
    };
    mark_ties(&mut net);
    net
}

/// Zones A {1, 2}, B {3, 4} and C {5, 6} in a meshed ring.
pub fn three_zone() -> Network {
    let mut net = Network {
        base_mva: 100.0,
        bus: zoned(&["A", "A", "B", "B", "C", "C"]),
        branch: vec![
            line(1, 2, 2.0),
            line(3, 4, 2.0),
            line(5, 6, 2.0),
            line(1, 3, 1.0),
            line(2, 4, 0.5),
            line(3, 5, 1.2),
            line(4, 6, 0.7),
            line(1, 5, 0.9),
        ],
    };
    mark_ties(&mut net);
    net
}

fn mark_ties(net: &mut Network) {
    for br in net.branch.iter_mut() {
        br.tie = net.bus[br.from - 1].zone != net.bus[br.to - 1].zone;
    }
}
