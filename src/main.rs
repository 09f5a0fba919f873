use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use gaitnet::model::{Activation, Network, Sequential};
use gaitnet::training::{Dataset, ObjectiveKind, PreTrainer, Trainer, TrainingConfig};
use gaitnet::GaitNetError;

/// Command line front end over a model file and bincode dataset files.
///
/// The best checkpoint of a model lives next to it with a `.ckpt` extension.
struct GaitNet {
    model_path: PathBuf,
    config: TrainingConfig,
}

impl GaitNet {
    fn new(model_path: &str, config: TrainingConfig) -> Self {
        Self { model_path: PathBuf::from(model_path), config }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.model_path.with_extension("ckpt")
    }

    fn load_model(&self) -> Result<Sequential, GaitNetError> {
        Ok(Sequential::from_file(&self.model_path)?)
    }

    /// Create a fresh dense stack
    fn init(&self, activation: &str, sizes: &[usize]) -> Result<(), GaitNetError> {
        let activation = Activation::from_name(activation)
            .ok_or_else(|| GaitNetError::Config(format!("unknown activation: {}", activation)))?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let network = Sequential::dense_stack(sizes, activation, &mut rng)?;
        network.to_file(&self.model_path)?;
        info!("Initialized {} layers in {}", network.len(), self.model_path.display());
        Ok(())
    }

    fn pretrain(&self, data_path: &Path) -> Result<(), GaitNetError> {
        let mut network = self.load_model()?;
        let data = Dataset::from_file(data_path)?;

        let mut pretrainer = PreTrainer::new(self.config.clone())?;
        let report = pretrainer.pretrain(&mut network, data.input())?;
        info!("Pretrained {} blocks", report.iterations());

        network.to_file(&self.model_path)?;
        Ok(())
    }

    fn train(&self, train_path: &Path, valid_path: Option<&Path>) -> Result<(), GaitNetError> {
        let mut network = self.load_model()?;
        let train = Dataset::from_file(train_path)?;
        let valid = valid_path.map(Dataset::from_file).transpose()?;

        let mut trainer = Trainer::new(self.config.clone())?;
        let checkpoint = self.checkpoint_path();
        let report = trainer.train(&mut network, &train, valid.as_ref(), Some(checkpoint.as_path()))?;

        // keep the best parameters, not the last ones
        if report.best_epoch.is_some() {
            network.load(&checkpoint)?;
        }
        network.to_file(&self.model_path)?;
        Ok(())
    }

    fn eval(&self, data_path: &Path) -> Result<f32, GaitNetError> {
        let mut network = self.load_model()?;
        let data = Dataset::from_file(data_path)?;
        let trainer = Trainer::new(self.config.clone())?;
        Ok(trainer.evaluate(&mut network, &data, &self.checkpoint_path())?)
    }

    fn predict(&self, data_path: &Path, output: &Path) -> Result<(), GaitNetError> {
        let network = self.load_model()?;
        let data = Dataset::from_file(data_path)?;
        let trainer = Trainer::new(self.config.clone())?;
        let labels = trainer.predict(&network, data.input(), output)?;
        info!("Wrote {} predictions to {}", labels.len(), output.display());
        Ok(())
    }
}

fn parse_config(objective: Option<&String>, epochs: Option<&String>) -> anyhow::Result<TrainingConfig> {
    let mut config = TrainingConfig::default();
    if let Some(name) = objective {
        let kind: ObjectiveKind = name.parse().map_err(anyhow::Error::msg)?;
        config = config.objective(kind);
    }
    if let Some(epochs) = epochs {
        config = config.epochs(epochs.parse().context("epochs must be a number")?);
    }
    Ok(config)
}

fn usage() {
    println!("Usage: gaitnet <command> <model> ...");
    println!("Commands:");
    println!("  init     <model> <activation> <size>...");
    println!("  pretrain <model> <data> [epochs]");
    println!("  train    <model> <train-data> <valid-data|-> [objective] [epochs]");
    println!("  eval     <model> <test-data> [objective]");
    println!("  predict  <model> <data> <output>");
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let (Some(command), Some(model)) = (args.get(1), args.get(2)) else {
        usage();
        return Ok(());
    };

    match command.as_str() {
        "init" => {
            let activation = args.get(3).context("missing activation")?;
            let sizes = args[4..]
                .iter()
                .map(|s| s.parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .context("layer sizes must be numbers")?;
            GaitNet::new(model, TrainingConfig::default()).init(activation, &sizes)?;
        }
        "pretrain" => {
            let data = args.get(3).context("missing pretraining data")?;
            let config = parse_config(None, args.get(4))?;
            GaitNet::new(model, config).pretrain(Path::new(data))?;
        }
        "train" => {
            let train = args.get(3).context("missing training data")?;
            let valid = args.get(4).filter(|v| v.as_str() != "-").map(Path::new);
            let config = parse_config(args.get(5), args.get(6))?;
            GaitNet::new(model, config).train(Path::new(train), valid)?;
        }
        "eval" => {
            let data = args.get(3).context("missing test data")?;
            let config = parse_config(args.get(4), None)?;
            let error = GaitNet::new(model, config).eval(Path::new(data))?;
            println!("{}", error);
        }
        "predict" => {
            let data = args.get(3).context("missing input data")?;
            let output = args.get(4).context("missing output path")?;
            GaitNet::new(model, TrainingConfig::default()).predict(Path::new(data), Path::new(output))?;
        }
        _ => usage(),
    }

    Ok(())
}
