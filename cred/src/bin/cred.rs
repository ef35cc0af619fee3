use cred::*;

/// Finds how few machines can serve a deadline-bound workload
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to input
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    input:      PathBuf,

    /// Input format
    #[arg(value_enum)]
    format:     InputFormat,

    /// Slots each machine offers per time unit (S)
    #[arg(short, long, default_value_t = 4)]
    slots:      Slots,

    /// Distinct chunks a machine may take per packing round (B)
    #[arg(short = 'b', long, default_value_t = 128)]
    max_chunks: usize,

    /// Seed a warm machine worth this many time units of slots
    #[arg(short, long)]
    warm:       Option<Deadline>,

    /// Check the result against the allocator's invariants
    #[arg(short, long, default_value_t = false)]
    audit:      bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Args::parse();
    let input_path = cli.input;
    anyhow::ensure!(input_path.is_file(), "Invalid input path: {}", input_path.display());
    let config = Config::new(cli.slots, cli.max_chunks)?;
    let jobs = match cli.format {
        InputFormat::Jobs   => read_from_path::<JobCSVParser, RawJob>(input_path),
        InputFormat::Trace  => read_from_path::<TraceCSVParser, RawJob>(input_path),
    }?;

    // Every window and pre-staging budget is sized by a span no longer
    // than the latest deadline.
    if let Some(&last) = deadlines(&jobs).last() {
        config.checked_capacity(last)?;
    }
    let mut cluster = Cluster::new(config);
    if let Some(units) = cli.warm {
        cluster.spawn_machine(config.checked_capacity(units)?);
    }
    let n_a = cluster.cred_m(&jobs);
    if cli.audit {
        analyze::audit(&cluster, &jobs)?;
        println!("Audit passed.");
    }

    println!(
        "Jobs:\t\t{}\nDeadlines:\t{}\nDemand:\t\t{} slots\n",
        jobs.len(),
        deadlines(&jobs).len(),
        get_total_demand(&jobs)
    );
    print!("{cluster}");
    println!("N_a:\t{n_a}");

    Ok(())
}
