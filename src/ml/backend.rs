use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

use burn::backend::Autodiff;
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(target_os = "macos")]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Metal};
#[cfg(not(target_os = "macos"))]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Vulkan};
#[cfg(feature = "cuda")]
use burn::backend::{Cuda, cuda::CudaDevice};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment override for the compute backend.
pub const BACKEND_ENV: &str = "ASL_BACKEND";

pub type CpuBackend = NdArray;
pub type WgpuBackend = wgpu::Wgpu;
#[cfg(feature = "cuda")]
pub type CudaBackend = Cuda;

pub type CpuTrainBackend = Autodiff<CpuBackend>;
pub type WgpuTrainBackend = Autodiff<WgpuBackend>;
#[cfg(feature = "cuda")]
pub type CudaTrainBackend = Autodiff<CudaBackend>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" | "ndarray" => Ok(BackendKind::Cpu),
            "wgpu" | "vulkan" | "metal" | "gpu" => Ok(BackendKind::Wgpu),
            #[cfg(feature = "cuda")]
            "cuda" => Ok(BackendKind::Cuda),
            other => Err(format!("Unknown backend '{other}'")),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Wgpu => "wgpu",
            BackendKind::Cpu => "cpu",
            #[cfg(feature = "cuda")]
            BackendKind::Cuda => "cuda",
        };
        f.write_str(name)
    }
}

/// Pick the backend: `ASL_BACKEND` wins over the configured value.
pub fn backend_kind(configured: BackendKind) -> BackendKind {
    let Some(requested) = env::var(BACKEND_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
    else {
        return configured;
    };
    match requested.parse() {
        Ok(kind) => kind,
        Err(err) => {
            warn!("{err} in {BACKEND_ENV}, using {configured}.");
            configured
        }
    }
}

/// Work that runs on whichever autodiff backend gets selected at runtime.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output;
}

/// Initialise `kind` and run `task` on it.
pub fn dispatch<T: BackendTask>(kind: BackendKind, task: T) -> T::Output {
    init_cubecl_config();
    info!("Using {kind} backend");
    match kind {
        BackendKind::Cpu => task.run::<CpuTrainBackend>(NdArrayDevice::default()),
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            init_wgpu(&device);
            task.run::<WgpuTrainBackend>(device)
        }
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => task.run::<CudaTrainBackend>(CudaDevice::default()),
    }
}

static WGPU_INIT: OnceLock<()> = OnceLock::new();

fn init_wgpu(device: &WgpuDevice) {
    WGPU_INIT.get_or_init(|| {
        #[cfg(target_os = "macos")]
        wgpu::init_setup::<Metal>(device, Default::default());
        #[cfg(not(target_os = "macos"))]
        wgpu::init_setup::<Vulkan>(device, Default::default());
    });
}

fn init_cubecl_config() {
    static CUBECL_CONFIG: OnceLock<()> = OnceLock::new();
    CUBECL_CONFIG.get_or_init(|| {
        let mut config = cubecl_runtime::config::GlobalConfig::default();
        config.compilation.cache = Some(cubecl_runtime::config::cache::CacheConfig::Global);
        config.autotune.cache = cubecl_runtime::config::cache::CacheConfig::Global;
        let _ = std::panic::catch_unwind(|| cubecl_runtime::config::GlobalConfig::set(config));
    });
}
