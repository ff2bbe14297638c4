use crate::network::{Branch, Bus, Network};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

/// Row of `bus.csv`. Shunts are in MW/MVAr at 1 p.u. voltage.
#[derive(Debug, Deserialize)]
struct BusRecord {
    id: usize,
    zone: String,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    gs: f64,
    #[serde(default)]
    bs: f64,
}

/// Row of `branch.csv`. Impedances are per-unit, capacity in MW.
#[derive(Debug, Deserialize)]
struct BranchRecord {
    from: usize,
    to: usize,
    r: f64,
    x: f64,
    #[serde(default)]
    b: f64,
    capacity: f64,
    #[serde(default)]
    tie: Option<bool>,
}

fn read_records<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<T>().enumerate() {
        records.push(row.with_context(|| format!("invalid row {} in {}", i + 1, path.display()))?);
    }
    Ok(records)
}

/// Loads a network from a case directory holding `bus.csv` and
/// `branch.csv`, converting MW quantities to per-unit on `base_mva`.
///
/// Buses may appear in any order but must be numbered 1..N. Self-loop
/// branches carry no transfer and are dropped with a warning. Tie-line
/// flags missing from the file are derived from the bus zones.
pub fn load_case(case_dir: &Path, base_mva: f64) -> Result<Network> {
    if base_mva <= 0.0 {
        return Err(anyhow::anyhow!("base MVA must be positive, got {}", base_mva));
    }
    let bus_path = case_dir.join("bus.csv");
    let branch_path = case_dir.join("branch.csv");

    let mut bus = read_records::<BusRecord>(&bus_path)?
        .into_iter()
        .map(|r| Bus {
            id: r.id,
            area: r.area.unwrap_or_else(|| r.zone.clone()),
            zone: r.zone,
            gs: r.gs / base_mva,
            bs: r.bs / base_mva,
            representative: false,
        })
        .collect::<Vec<Bus>>();
    bus.sort_by_key(|b| b.id);

    let mut branch = Vec::new();
    for (l, r) in read_records::<BranchRecord>(&branch_path)?
        .into_iter()
        .enumerate()
    {
        if r.from == r.to {
            log::warn!("branch {} is a self-loop at bus {}, dropped", l + 1, r.from);
            continue;
        }
        let zone = |id: usize| bus.get(id.wrapping_sub(1)).map(|b| b.zone.as_str());
        let tie = r.tie.unwrap_or_else(|| zone(r.from) != zone(r.to));
        branch.push(Branch {
            from: r.from,
            to: r.to,
            r: r.r,
            x: r.x,
            b: r.b,
            capacity: r.capacity / base_mva,
            tie,
        });
    }

    let network = Network::new(base_mva, bus, branch)
        .with_context(|| format!("invalid case {}", case_dir.display()))?;
    log::info!(
        "loaded {}: {} buses, {} branches",
        case_dir.display(),
        network.nb(),
        network.nl()
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_case(dir: &Path, bus: &str, branch: &str) -> Result<()> {
        fs::write(dir.join("bus.csv"), bus)?;
        fs::write(dir.join("branch.csv"), branch)?;
        Ok(())
    }

    #[test]
    fn converts_to_per_unit_and_drops_self_loops() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_case(
            dir.path(),
            "id,zone,gs,bs\n2,B,0,0\n1,A,10,-20\n",
            "from,to,r,x,b,capacity\n1,2,0.01,0.1,0.02,150\n2,2,0.0,0.1,0,10\n",
        )?;

        let net = load_case(dir.path(), 100.0)?;
        assert_eq!(net.nb(), 2);
        assert_eq!(net.bus[0].id, 1);
        assert_eq!(net.bus[0].area, "A");
        assert_eq!(net.bus[0].gs, 0.1);
        assert_eq!(net.bus[0].bs, -0.2);
        assert_eq!(net.nl(), 1);
        assert_eq!(net.branch[0].capacity, 1.5);
        assert!(net.branch[0].tie);
        Ok(())
    }

    #[test]
    fn rejects_missing_endpoint() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_case(
            dir.path(),
            "id,zone\n1,A\n2,A\n",
            "from,to,r,x,capacity\n1,3,0.01,0.1,100\n",
        )?;
        assert!(load_case(dir.path(), 100.0).is_err());
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_case(dir.path(), 100.0).unwrap_err();
        assert!(format!("{}", err).contains("bus.csv"));
    }
}
