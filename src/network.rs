use crate::error::{ReductionError, Result};
use num_complex::Complex64;
use std::collections::HashSet;

/// Network is a transmission system in per-unit quantities, with buses
/// numbered consecutively from 1.
#[derive(Debug, Clone, Default)]
pub struct Network {
    /// System MVA base the per-unit quantities were derived from.
    pub base_mva: f64,

    /// Power system nodes, including shunts.
    pub bus: Vec<Bus>,

    /// Lines and tie-lines in a single list.
    pub branch: Vec<Branch>,
}

/// Bus is a node in the network graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bus {
    /// Bus number (1..N).
    pub id: usize,

    /// Zone label used to group buses under one representative.
    pub zone: String,

    /// Area label.
    pub area: String,

    /// Shunt conductance (p.u.).
    pub gs: f64,

    /// Shunt susceptance (p.u.).
    pub bs: f64,

    /// Set once the bus has been chosen to stand in for its zone.
    pub representative: bool,
}

impl Bus {
    pub fn new(id: usize, zone: &str) -> Self {
        Self {
            id,
            zone: zone.to_string(),
            area: zone.to_string(),
            ..Default::default()
        }
    }

    /// Internal zero-based index.
    pub fn idx(&self) -> usize {
        self.id - 1
    }

    pub(crate) fn y_sh(&self) -> Complex64 {
        Complex64::new(self.gs, self.bs)
    }
}

/// Branch is a line or tie-line. Both directions share rating and impedance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    /// "From" bus number.
    pub from: usize,

    /// "To" bus number.
    pub to: usize,

    /// Resistance (p.u.).
    pub r: f64,

    /// Reactance (p.u.).
    pub x: f64,

    /// Total line charging susceptance (p.u.).
    pub b: f64,

    /// Thermal rating (p.u.).
    pub capacity: f64,

    /// Connects buses in different zones.
    pub tie: bool,
}

impl Branch {
    pub fn new(from: usize, to: usize, r: f64, x: f64, capacity: f64) -> Self {
        Self {
            from,
            to,
            r,
            x,
            capacity,
            ..Default::default()
        }
    }

    /// Series admittance `1 / (r + jx)`.
    pub(crate) fn y_s(&self) -> Complex64 {
        Complex64::new(1.0, 0.0) / Complex64::new(self.r, self.x)
    }

    /// Series susceptance used for DC flows, `Im(-y_s)`.
    pub(crate) fn b_s(&self) -> f64 {
        -self.y_s().im
    }
}

impl Network {
    pub fn new(base_mva: f64, bus: Vec<Bus>, branch: Vec<Branch>) -> Result<Self> {
        let network = Self {
            base_mva,
            bus,
            branch,
        };
        network.validate()?;
        Ok(network)
    }

    pub fn nb(&self) -> usize {
        self.bus.len()
    }

    pub fn nl(&self) -> usize {
        self.branch.len()
    }

    /// Checks the topology preconditions the numerical stages rely on:
    /// consecutive bus numbering, existing branch end-points and no self-loops.
    pub fn validate(&self) -> Result<()> {
        if self.bus.is_empty() {
            return Err(ReductionError::InvalidTopology(
                "network has no buses".to_string(),
            ));
        }
        for (i, bus) in self.bus.iter().enumerate() {
            if bus.id != i + 1 {
                return Err(ReductionError::InvalidTopology(format!(
                    "buses must be numbered consecutively from 1; position {} has id {}",
                    i, bus.id
                )));
            }
        }
        let nb = self.nb();
        for (l, br) in self.branch.iter().enumerate() {
            for id in [br.from, br.to] {
                if id == 0 || id > nb {
                    return Err(ReductionError::InvalidTopology(format!(
                        "branch {} references missing bus {}",
                        l, id
                    )));
                }
            }
            if br.from == br.to {
                return Err(ReductionError::InvalidTopology(format!(
                    "branch {} is a self-loop at bus {}",
                    l, br.from
                )));
            }
        }
        Ok(())
    }

    /// Distinct zone labels, sorted.
    pub fn zones(&self) -> Vec<String> {
        let mut zones = self
            .bus
            .iter()
            .map(|b| b.zone.clone())
            .collect::<HashSet<String>>()
            .into_iter()
            .collect::<Vec<String>>();
        zones.sort();
        zones
    }

    /// Ids of the buses flagged as representative.
    pub fn representatives(&self) -> Vec<usize> {
        self.bus
            .iter()
            .filter(|b| b.representative)
            .map(|b| b.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_gaps_in_numbering() {
        let bus = vec![Bus::new(1, "A"), Bus::new(3, "A")];
        let err = Network::new(100.0, bus, vec![]).unwrap_err();
        assert!(matches!(err, ReductionError::InvalidTopology(_)));
    }

    #[test]
    fn validate_rejects_missing_endpoint() {
        let bus = vec![Bus::new(1, "A"), Bus::new(2, "A")];
        let branch = vec![Branch::new(1, 5, 0.0, 0.1, 1.0)];
        let err = Network::new(100.0, bus, branch).unwrap_err();
        assert!(err.to_string().contains("missing bus 5"));
    }

    #[test]
    fn validate_rejects_self_loop() {
        let bus = vec![Bus::new(1, "A"), Bus::new(2, "A")];
        let branch = vec![Branch::new(2, 2, 0.0, 0.1, 1.0)];
        assert!(Network::new(100.0, bus, branch).is_err());
    }

    #[test]
    fn series_susceptance_is_positive_for_inductive_lines() {
        let br = Branch::new(1, 2, 0.01, 0.1, 1.0);
        let expect = 0.1 / (0.01 * 0.01 + 0.1 * 0.1);
        assert!((br.b_s() - expect).abs() < 1e-12);
    }

    #[test]
    fn zones_are_sorted_and_distinct() {
        let bus = vec![Bus::new(1, "B"), Bus::new(2, "A"), Bus::new(3, "B")];
        let network = Network::new(100.0, bus, vec![]).unwrap();
        assert_eq!(network.zones(), vec!["A".to_string(), "B".to_string()]);
    }
}
