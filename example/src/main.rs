//! Trains a small convolutional classifier on synthetic bar images.
//! Builds the network, trains it with momentum gradient descent, reports
//! accuracy on a held-out split and optionally saves the trained network.

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaChaRng;
use tensor::{Activation, AnyLayer, ConfigFS, Layer, Network, Shape2, Shape3, TensorResult};
use tracing::info;
use tracing_subscriber::EnvFilter;
use training::{metrics, train, Dataset, TrainingContext};

mod synthetic;

/// Command-line arguments of the training demo
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON file with a stored training context; flags below override it
    #[arg(long)]
    pub context: Option<String>,
    /// Number of generated images (default: 200)
    #[arg(long)]
    pub samples: Option<usize>,
    /// Share of images kept for testing (default: 0.25)
    #[arg(long)]
    pub test_fraction: Option<f32>,
    /// Noise amplitude added to every pixel (default: 0.2)
    #[arg(long)]
    pub noise: Option<f32>,
    /// Convolution filters in the first layer (default: 4)
    #[arg(long)]
    pub features: Option<usize>,
    #[arg(long)]
    pub learning_rate: Option<f32>,
    /// Mini-batch size (default: whole training set)
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Wall-clock budget in seconds
    #[arg(long)]
    pub time_budget: Option<u64>,
    #[arg(long)]
    pub loss_goal: Option<f32>,
    /// Multiplicative learning-rate decay per epoch
    #[arg(long)]
    pub decay: Option<f32>,
    /// Random seed for data, initialisation and shuffling
    #[arg(long)]
    pub seed: Option<u64>,
    /// Where to save the trained network (.json)
    #[arg(long)]
    pub out: Option<String>,
}

fn build_network(features: usize) -> TensorResult<Network> {
    let input = Shape3::new(1, synthetic::SIDE, synthetic::SIDE);
    let conv_out = Shape3::new(features, synthetic::SIDE, synthetic::SIDE);
    let pooled = Shape3::new(features, synthetic::SIDE / 2, synthetic::SIDE / 2);
    Network::new(vec![
        AnyLayer::input(input),
        AnyLayer::conv(input, Shape2::new(3, 3), features, 1, (1, 1))?,
        AnyLayer::activation(conv_out, Activation::LeakyRelu { alpha: 0.01 }),
        AnyLayer::max_pool(conv_out, 2)?,
        AnyLayer::flatten(pooled),
        AnyLayer::fully_connected(Shape3::new(1, 1, pooled.volume()), 2)?,
        AnyLayer::activation(Shape3::new(1, 1, 2), Activation::Sigmoid),
    ])
}

async fn load_context(path: Option<&str>) -> Result<TrainingContext, Box<dyn Error>> {
    match path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path).await?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(TrainingContext { learning_rate: 0.05, max_epochs: 300, ..TrainingContext::default() }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Args = Args::parse();

    let mut ctx = load_context(args.context.as_deref()).await?;
    ctx.learning_rate = args.learning_rate.unwrap_or(ctx.learning_rate);
    ctx.batch_size = args.batch_size.or(ctx.batch_size);
    ctx.max_epochs = args.epochs.unwrap_or(ctx.max_epochs);
    ctx.time_budget = args.time_budget.map(Duration::from_secs).unwrap_or(ctx.time_budget);
    ctx.loss_goal = args.loss_goal.unwrap_or(ctx.loss_goal);
    ctx.learning_rate_decay = args.decay.or(ctx.learning_rate_decay);
    ctx.seed = args.seed.or(ctx.seed);

    let mut rng: Box<dyn RngCore> = match ctx.seed {
        Some(seed) => Box::new(ChaChaRng::seed_from_u64(seed)),
        None => Box::new(rand::rng()),
    };

    let samples = synthetic::bars(args.samples.unwrap_or(200), args.noise.unwrap_or(0.2), &mut *rng)?;
    let mut dataset = Dataset::split(samples, args.test_fraction.unwrap_or(0.25), &mut *rng);
    dataset.normalize_inputs()?;
    info!("{} training and {} test images", dataset.training.len(), dataset.test.len());

    let mut network = build_network(args.features.unwrap_or(4))?;
    network.random_init_params(&mut *rng)?;

    let report = train(&mut network, &dataset.training, &ctx)?;
    info!(
        "stopped: {:?} after {} epochs / {} batches, loss {:.6e}, {:?}",
        report.stop_reason, report.epochs, report.batches, report.final_loss, report.elapsed
    );

    let train_accuracy = metrics::accuracy(&mut network, &dataset.training)?;
    info!("training accuracy {:.1}%", 100.0 * train_accuracy);
    if !dataset.test.is_empty() {
        let test_accuracy = metrics::accuracy(&mut network, &dataset.test)?;
        let test_loss = metrics::mean_loss(&mut network, &dataset.test)?;
        info!("test accuracy {:.1}%, test loss {:.6e}", 100.0 * test_accuracy, test_loss);
    }

    if let Some(out) = args.out {
        network.save(&out).await?;
        info!("network saved to {}", out);
    }
    Ok(())
}
