use crate::fit::CapacityFit;
use crate::ptdf::InjectionPtdf;
use crate::reduce::{Reduction, TtcComparison};
use crate::ttc::TtcRecord;
use anyhow::{Context, Result};
use csv::Writer;
use num_complex::Complex64;
use serde::Serialize;
use sprs::CsMat;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

#[derive(Serialize)]
struct YbusRow {
    row: usize,
    col: usize,
    g: f64,
    b: f64,
}

#[derive(Serialize)]
struct PtdfRow {
    a: usize,
    b: usize,
    branch_from: usize,
    branch_to: usize,
    ptdf: f64,
}

#[derive(Serialize)]
struct TtcRow {
    a: usize,
    b: usize,
    /// Empty when unbounded.
    ttc_mw: Option<f64>,
    limiting_from: Option<usize>,
    limiting_to: Option<usize>,
}

#[derive(Serialize)]
struct CapacityRow {
    from: usize,
    to: usize,
    capacity_mw: f64,
}

#[derive(Serialize)]
struct ComparisonRow {
    a: usize,
    b: usize,
    original_mw: Option<f64>,
    fitted_mw: Option<f64>,
    reduced_mw: Option<f64>,
    relative_error: Option<f64>,
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    let mut writer = Writer::from_writer(BufWriter::new(file));
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed writing {}", path.display()))?;
    }
    writer.flush()?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Writes the stored entries of an admittance matrix, labelled with the
/// external bus ids of its rows.
pub fn write_ybus(path: &Path, y_bus: &CsMat<Complex64>, bus_ids: &[usize]) -> Result<()> {
    let mut rows = y_bus
        .iter()
        .map(|(y, (i, j))| YbusRow {
            row: bus_ids[i],
            col: bus_ids[j],
            g: y.re,
            b: y.im,
        })
        .collect::<Vec<YbusRow>>();
    rows.sort_by_key(|r| (r.row, r.col));
    write_rows(path, rows)
}

/// Writes transaction PTDFs with magnitude above `eps`.
pub fn write_ptdf(path: &Path, ptdf: &InjectionPtdf, eps: f64) -> Result<()> {
    write_rows(
        path,
        ptdf.entries(eps).map(|e| {
            let (branch_from, branch_to) = ptdf.branch_ids(e.branch);
            PtdfRow {
                a: e.transaction.a,
                b: e.transaction.b,
                branch_from,
                branch_to,
                ptdf: e.value,
            }
        }),
    )
}

pub fn write_ttc(path: &Path, ttc: &[TtcRecord], ptdf: &InjectionPtdf, base_mva: f64) -> Result<()> {
    write_rows(
        path,
        ttc.iter().map(|r| {
            let limiting = r.limiting_branch().map(|l| ptdf.branch_ids(l));
            TtcRow {
                a: r.transaction.a,
                b: r.transaction.b,
                ttc_mw: r.value().map(|v| v * base_mva),
                limiting_from: limiting.map(|(f, _)| f),
                limiting_to: limiting.map(|(_, t)| t),
            }
        }),
    )
}

pub fn write_capacities(path: &Path, fit: &CapacityFit, base_mva: f64) -> Result<()> {
    write_rows(
        path,
        fit.lines.iter().map(|l| CapacityRow {
            from: l.from,
            to: l.to,
            capacity_mw: l.capacity * base_mva,
        }),
    )
}

pub fn write_comparison(path: &Path, comparison: &[TtcComparison], base_mva: f64) -> Result<()> {
    write_rows(
        path,
        comparison.iter().map(|c| ComparisonRow {
            a: c.transaction.a,
            b: c.transaction.b,
            original_mw: c.original.map(|v| v * base_mva),
            fitted_mw: c.fitted.map(|v| v * base_mva),
            reduced_mw: c.reduced.map(|v| v * base_mva),
            relative_error: c.relative_error,
        }),
    )
}

/// Writes every table of a reduction run into `dir`, creating it if needed.
pub fn write_reduction(dir: &Path, reduction: &Reduction, base_mva: f64, eps: f64) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("unable to create {}", dir.display()))?;

    let original_ids = reduction.original.ptdf.bus_ids();
    write_ybus(&dir.join("ybus.csv"), &reduction.y_bus, original_ids)?;
    write_ybus(
        &dir.join("ybus_reduced.csv"),
        &reduction.kron.y_bus,
        &reduction.kron.bus_ids,
    )?;
    write_ptdf(&dir.join("ptdf.csv"), &reduction.original.ptdf, eps)?;
    write_ptdf(&dir.join("ptdf_reduced.csv"), &reduction.reduced.ptdf, eps)?;
    write_ttc(
        &dir.join("ttc.csv"),
        &reduction.original.ttc,
        &reduction.original.ptdf,
        base_mva,
    )?;
    write_ttc(
        &dir.join("ttc_reduced.csv"),
        &reduction.reduced.ttc,
        &reduction.reduced.ptdf,
        base_mva,
    )?;
    write_capacities(&dir.join("capacity.csv"), &reduction.fit, base_mva)?;
    write_comparison(&dir.join("comparison.csv"), &reduction.comparison, base_mva)?;
    log::info!("results written to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::SyntheticLine;
    use crate::opt::Formulation;
    use crate::solver::SolveStatus;
    use crate::transaction::Transaction;

    #[test]
    fn capacities_are_written_in_mw() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capacity.csv");
        let fit = CapacityFit {
            formulation: Formulation::QP,
            lines: vec![SyntheticLine {
                from: 1,
                to: 3,
                capacity: 1.5,
            }],
            transactions: vec![],
            status: SolveStatus::Optimal,
            objective: 0.0,
            warnings: vec![],
        };
        write_capacities(&path, &fit, 100.0)?;

        let text = fs::read_to_string(&path)?;
        let lines = text.lines().collect::<Vec<&str>>();
        assert_eq!(lines, vec!["from,to,capacity_mw", "1,3,150.0"]);
        Ok(())
    }

    #[test]
    fn unbounded_comparison_leaves_empty_fields() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("comparison.csv");
        let rows = vec![TtcComparison {
            transaction: Transaction { a: 1, b: 2 },
            original: Some(2.0),
            fitted: None,
            reduced: None,
            relative_error: None,
        }];
        write_comparison(&path, &rows, 100.0)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(text.lines().nth(1), Some("1,2,200.0,,,"));
        Ok(())
    }
}
