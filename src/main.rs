#![recursion_limit = "256"]

use burn::optim::{momentum::MomentumConfig, SgdConfig};
use mnist_train::{logger, model::CnnConfig, training::TrainingConfig};

static ARTIFACT_DIR: &str = "/tmp/mnist-train";

const NUM_EPOCHS: usize = 10;
const BATCH_SIZE: usize = 32;
const LEARNING_RATE: f64 = 0.005;
const MOMENTUM: f64 = 0.9;
const SEED: u64 = 0;

fn config() -> TrainingConfig {
    // Plain heavy-ball momentum, no dampening.
    let momentum = MomentumConfig::new()
        .with_momentum(MOMENTUM)
        .with_dampening(0.0);
    let optimizer = SgdConfig::new().with_momentum(Some(momentum));

    TrainingConfig::new(CnnConfig::new(10), optimizer)
        .with_num_epochs(NUM_EPOCHS)
        .with_batch_size(BATCH_SIZE)
        .with_learning_rate(LEARNING_RATE)
        .with_seed(SEED)
}

#[cfg(all(feature = "ndarray", not(any(feature = "wgpu", feature = "tch-cpu"))))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };

    pub fn run(config: mnist_train::training::TrainingConfig) -> mnist_train::Result<()> {
        let device = NdArrayDevice::Cpu;
        mnist_train::training::run::<Autodiff<NdArray>>(super::ARTIFACT_DIR, config, device)?;
        Ok(())
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn run(config: mnist_train::training::TrainingConfig) -> mnist_train::Result<()> {
        let device = LibTorchDevice::Cpu;
        mnist_train::training::run::<Autodiff<LibTorch>>(super::ARTIFACT_DIR, config, device)?;
        Ok(())
    }
}

#[cfg(all(feature = "wgpu", not(feature = "tch-cpu")))]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };

    pub fn run(config: mnist_train::training::TrainingConfig) -> mnist_train::Result<()> {
        let device = WgpuDevice::default();
        mnist_train::training::run::<Autodiff<Wgpu>>(super::ARTIFACT_DIR, config, device)?;
        Ok(())
    }
}

fn main() {
    if let Err(err) = logger::install(Some(&format!("{ARTIFACT_DIR}.log"))) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    #[cfg(feature = "tch-cpu")]
    let result = tch_cpu::run(config());
    #[cfg(all(feature = "wgpu", not(feature = "tch-cpu")))]
    let result = wgpu::run(config());
    #[cfg(all(feature = "ndarray", not(any(feature = "wgpu", feature = "tch-cpu"))))]
    let result = ndarray::run(config());

    if let Err(err) = result {
        log::error!("Training failed: {err}");
        std::process::exit(1);
    }
}
