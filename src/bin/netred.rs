use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use netred::solver::default_solver;
use netred::{
    load_case, make_ybus, network_sensitivity, reduce_network, write_ptdf, write_reduction,
    write_ttc, Formulation, ReduceOpt,
};
use std::path::PathBuf;

/// Zonal network reduction preserving inter-zonal transfer capacity.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce to one bus per zone and fit synthetic line capacities
    Reduce(ReduceArgs),

    /// Power Transfer Distribution Factors of the original network
    PTDF(TableArgs),

    /// Total Transfer Capacities of the original network
    TTC(TableArgs),
}

#[derive(Args)]
struct CaseArgs {
    /// Case directory holding bus.csv and branch.csv
    #[arg(required = true)]
    input: PathBuf,

    /// System MVA base.
    #[arg(long)]
    base_mva: Option<f64>,

    /// PTDF magnitudes at or below this value are treated as zero.
    #[arg(long)]
    epsilon: Option<f64>,

    /// Computational slack bus id.
    #[arg(long)]
    slack: Option<usize>,
}

#[derive(Args)]
struct TableArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Output CSV file
    #[arg(short, long, required = true)]
    output: PathBuf,
}

#[derive(Args)]
struct ReduceArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Output directory
    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Capacity fitting formulation (qp, miqp or lp).
    #[arg(long)]
    formulation: Option<Formulation>,

    /// Capacity regularization weight.
    #[arg(long)]
    lambda: Option<f64>,

    /// Safety factor (>= 1) on the big-M capacity bound of LP and MIQP.
    #[arg(long)]
    big_m_factor: Option<f64>,

    /// Maximum interior-point iterations.
    #[arg(long)]
    max_iter: Option<u32>,

    /// Interior-point feasibility and duality gap tolerance.
    #[arg(long)]
    tol: Option<f64>,

    /// Maximum branch-and-bound nodes.
    #[arg(long)]
    node_limit: Option<usize>,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn case_opt(args: &CaseArgs) -> ReduceOpt {
    let mut opt = ReduceOpt::default();
    if let Some(base_mva) = args.base_mva {
        opt.base_mva = base_mva;
    }
    if let Some(eps) = args.epsilon {
        opt.ptdf_epsilon = eps;
    }
    opt.slack_bus = args.slack;
    opt
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Reduce(args) => {
            let mut opt = case_opt(&args.case);
            if let Some(formulation) = args.formulation {
                opt.formulation = formulation;
            }
            if let Some(lambda) = args.lambda {
                opt.lambda = lambda;
            }
            if let Some(factor) = args.big_m_factor {
                opt.big_m_factor = factor;
            }
            if let Some(max_iter) = args.max_iter {
                opt.solver.max_iter = max_iter;
            }
            if let Some(tol) = args.tol {
                opt.solver.tol_feas = tol;
                opt.solver.tol_gap = tol;
            }
            if let Some(node_limit) = args.node_limit {
                opt.solver.node_limit = node_limit;
            }

            let mut network = load_case(&args.case.input, opt.base_mva)?;
            let solver = default_solver(&opt.solver);
            let reduction = reduce_network(&mut network, &opt, &solver)?;
            for w in &reduction.warnings {
                eprintln!("warning: {}", w);
            }
            write_reduction(&args.output, &reduction, opt.base_mva, opt.ptdf_epsilon)?;
        }
        Commands::PTDF(args) | Commands::TTC(args) => {
            let opt = case_opt(&args.case);
            let network = load_case(&args.case.input, opt.base_mva)?;
            let y_bus = make_ybus(&network.bus, &network.branch);
            let (sens, warnings) = network_sensitivity(&network, &y_bus, &opt)?;
            for w in &warnings {
                eprintln!("warning: {}", w);
            }
            if let Commands::PTDF(_) = &cli.command {
                write_ptdf(&args.output, &sens.ptdf, opt.ptdf_epsilon)?;
            } else {
                write_ttc(&args.output, &sens.ttc, &sens.ptdf, opt.base_mva)?;
            }
        }
    }
    Ok(())
}
