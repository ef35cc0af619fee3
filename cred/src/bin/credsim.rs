use cred::*;
use cred::gen::{simulate, SimParams};
use rand::{rngs::StdRng, SeedableRng};

/// Runs `cred` on random workloads
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of independent trials
    #[arg(short, long, default_value_t = 1)]
    trials:     u64,

    /// Seed of the first trial; trial `i` uses `seed + i`
    #[arg(long, default_value_t = 0)]
    seed:       u64,

    /// Slots each machine offers per time unit (S)
    #[arg(short, long, default_value_t = 4)]
    slots:      Slots,

    /// Distinct chunks a machine may take per packing round (B)
    #[arg(short = 'b', long, default_value_t = 128)]
    max_chunks: usize,

    /// Seed a warm machine worth this many time units of slots
    #[arg(short, long, default_value_t = 4)]
    warm:       Deadline,

    /// Maximum number of jobs per trial
    #[arg(long, default_value_t = 10)]
    max_jobs:   usize,

    /// Maximum number of distinct chunks per trial
    #[arg(long, default_value_t = 20)]
    max_catalog: usize,

    /// Maximum number of chunk reads per job
    #[arg(long, default_value_t = 20)]
    max_reads:  usize,

    /// Latest possible deadline
    #[arg(long, default_value_t = 10)]
    max_deadline: Deadline,

    /// Print every trial's workload profile
    #[arg(short, long, default_value_t = false)]
    verbose:    bool,
}

/// What one trial came down to.
struct Outcome {
    seed:       u64,
    jobs:       usize,
    demand:     Slots,
    machines:   usize,
}

fn run_trial(
    seed:   u64,
    params: &SimParams,
    config: Config,
    warm:   Deadline,
    verbose: bool,
) -> anyhow::Result<Outcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let jobs = init(simulate(params, &mut rng))?;
    if verbose {
        let profile = jobs.iter()
            .map(|j| format!("  job {} @ {}: {}", j.id, j.deadline, j.chunk_ids().join(" ")))
            .join("\n");
        println!("Trial {seed}:\n{profile}");
    }

    let mut cluster = Cluster::new(config);
    if warm > 0 {
        cluster.spawn_machine(config.capacity(warm));
    }
    let machines = cluster.cred_m(&jobs);
    analyze::audit(&cluster, &jobs)
        .map_err(|e| anyhow::anyhow!("trial {seed}: {e}"))?;

    Ok(Outcome {
        seed,
        jobs:   jobs.len(),
        demand: get_total_demand(&jobs),
        machines,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Args::parse();
    let config = Config::new(cli.slots, cli.max_chunks)?;
    let params = SimParams {
        jobs:           (1, cli.max_jobs),
        catalog:        (1, cli.max_catalog),
        reads_per_job:  (1, cli.max_reads),
        deadlines:      (1, cli.max_deadline),
    };
    anyhow::ensure!(params.is_valid(), "Invalid simulation bounds: {params:?}");
    config.checked_capacity(cli.max_deadline)?;
    config.checked_capacity(cli.warm)?;

    let total = Instant::now();
    let outcomes = (cli.seed..cli.seed + cli.trials)
        .into_par_iter()
        .map(|seed| run_trial(seed, &params, config, cli.warm, cli.verbose))
        .collect::<anyhow::Result<Vec<Outcome>>>()?;

    for o in &outcomes {
        println!("seed {:<8} jobs {:<4} demand {:<6} N_a {}", o.seed, o.jobs, o.demand, o.machines);
    }
    if let Some((lo, hi)) = outcomes.iter().map(|o| o.machines).minmax().into_option() {
        let mean = outcomes.iter().map(|o| o.machines).sum::<usize>() as f64 / outcomes.len() as f64;
        println!("N_a over {} trials:\tmin {lo}\tmean {mean:.2}\tmax {hi}", outcomes.len());
    }
    println!("Total time: {} ms", total.elapsed().as_millis());

    Ok(())
}
