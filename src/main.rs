use std::env;
use std::str::FromStr;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_nn::{Dataset, Error, NetworkBuilder, Result, StrategyKind};

const INPUTS: usize = 4;
const CLASSES: usize = 3;
const ROWS_PER_CLASS: usize = 50;

const CENTERS: [[f64; INPUTS]; CLASSES] = [
    [5.0, 3.4, 1.5, 0.2],
    [5.9, 2.8, 4.3, 1.3],
    [6.6, 3.0, 5.6, 2.0],
];
const SPREAD: [[f64; INPUTS]; CLASSES] = [
    [0.35, 0.38, 0.17, 0.10],
    [0.52, 0.31, 0.47, 0.20],
    [0.64, 0.32, 0.55, 0.27],
];

struct Options {
    adam: bool,
    seed: u64,
    halt: f64,
    max_iterations: usize,
    hidden: Vec<usize>,
}

fn parse<T: FromStr>(flag: &str, value: Option<String>) -> Result<T> {
    let value = value.ok_or_else(|| Error::InvalidConfig(format!("{flag} needs a value")))?;
    value
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{flag}: cannot parse {value:?}")))
}

fn parse_options() -> Result<Options> {
    let mut opts = Options {
        adam: false,
        seed: 1,
        halt: 1e-5,
        max_iterations: 5000,
        hidden: Vec::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--adam" => opts.adam = true,
            "--seed" => opts.seed = parse(&arg, args.next())?,
            "--halt" => opts.halt = parse(&arg, args.next())?,
            "--max-iterations" => opts.max_iterations = parse(&arg, args.next())?,
            width => opts.hidden.push(parse("hidden width", Some(width.to_owned()))?),
        }
    }
    if opts.hidden.is_empty() {
        opts.hidden.push(8);
    }
    Ok(opts)
}

/// Iris-shaped synthetic data: three classes of four measurements.
fn load_data(rng: &mut StdRng) -> Result<Dataset> {
    let mut features = Vec::with_capacity(CLASSES * ROWS_PER_CLASS * INPUTS);
    let mut labels = Vec::with_capacity(CLASSES * ROWS_PER_CLASS);
    for class in 0..CLASSES {
        for _ in 0..ROWS_PER_CLASS {
            for f in 0..INPUTS {
                let jitter: f64 = rng.gen_range(-1.0..=1.0);
                features.push(CENTERS[class][f] + jitter * SPREAD[class][f]);
            }
            labels.push(class);
        }
    }
    Dataset::from_flat(features, labels, INPUTS)
}

fn main() -> Result<()> {
    env_logger::init();

    let opts = parse_options()?;
    println!("Seed {}", opts.seed);

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let data = load_data(&mut rng)?;

    let strategy = if opts.adam {
        StrategyKind::adam()
    } else {
        StrategyKind::rprop()
    };

    let mut builder = NetworkBuilder::new(INPUTS)?;
    for &width in &opts.hidden {
        builder = builder.add_dense_layer(width, strategy)?;
    }
    let mut net = builder
        .add_logits_layer(CLASSES, strategy)?
        .build_with_rng(&mut rng)?;
    info!(
        "training {} strata, {} trainable weights",
        net.num_strata(),
        net.trainable_weights()
    );

    net.set_halt(opts.halt);
    net.set_accuracy();
    net.set_keep_alive(50);
    net.set_normalize(&data)?;

    let outcome = net.train_for(&data, opts.max_iterations)?;
    if !outcome.is_accepted() {
        warn!("training stopped without converging: {outcome:?}");
    }

    println!("\n\tLoss\t\tAccuracy\tSteps");
    println!(
        "\t{:.6}\t{:.6}\t{}\n",
        net.loss(),
        net.accuracy(),
        net.steps()
    );

    println!("\t\tTrain\tGuess\t\tCorrect");
    let mut wrong = 0;
    for idx in 0..data.len() {
        let guess = net.compute(data.input(idx));
        let correct = guess == data.label(idx);
        if !correct {
            wrong += 1;
        }
        println!(
            "\t{idx}\t{}\t{guess}\t\t{}",
            data.label(idx),
            if correct { "Yes" } else { "No" }
        );
    }

    let verdict = if outcome.is_accepted() && wrong == 0 {
        "ACCEPTED"
    } else {
        "REJECTED"
    };
    println!("\n{verdict}: {wrong} of {} wrong", data.len());
    Ok(())
}
