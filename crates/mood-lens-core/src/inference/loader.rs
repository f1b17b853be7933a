//! Weight loading from safetensors files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use tracing::debug;

use crate::ports::{ModelLocation, ModelUnit};

/// Resolves `unit` inside `location` and loads its weights.
///
/// # Errors
///
/// Returns an error for URL locations, which must be fetched to a local
/// directory first, and for unreadable or invalid files.
pub fn load_unit(location: &ModelLocation, unit: ModelUnit, device: &Device) -> Result<VarBuilder<'static>> {
    match location {
        ModelLocation::Directory(dir) => load_safetensors(dir.join(unit.file_name()), device),
        ModelLocation::Url(base) => {
            bail!("{unit} weights at {base} are remote; fetch them into a local directory first")
        }
    }
}

/// Reads a safetensors file into a `VarBuilder`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the data is invalid.
pub fn load_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<VarBuilder<'static>> {
    let path = path.as_ref();
    debug!("loading weights from {}", path.display());

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read model file: {}", path.display()))?;
    let file = SafeTensors::deserialize(&bytes)
        .with_context(|| format!("failed to parse safetensors: {}", path.display()))?;

    let tensors = file
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            let dtype = candle_dtype(view.dtype())?;
            let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)
                .with_context(|| format!("invalid tensor '{name}'"))?;
            Ok((name, tensor))
        })
        .collect::<Result<HashMap<String, Tensor>>>()?;

    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

fn candle_dtype(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    Ok(match dtype {
        S::F32 => DType::F32,
        S::F64 => DType::F64,
        S::F16 => DType::F16,
        S::BF16 => DType::BF16,
        S::I64 => DType::I64,
        S::U8 => DType::U8,
        S::U32 => DType::U32,
        other => bail!("unsupported tensor dtype: {other:?}"),
    })
}
