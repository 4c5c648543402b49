//! Conversions between ndarray values and candle tensors.
//!
//! Steps accept and return `ArrayD<f32>` at the pipeline boundary; candle
//! tensors exist only inside a step's live state.

use crate::Result;
use candle_core::{DType, Device, Tensor};
use ndarray::{ArrayD, IxDyn};

/// Convert a dynamic-dimensional array into a candle tensor on `device`.
pub fn to_tensor(array: &ArrayD<f32>, device: &Device) -> Result<Tensor> {
    let dims = array.shape().to_vec();
    // iter() walks logical order, so non-contiguous views convert correctly
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, dims, device)?)
}

/// Convert a candle tensor back into a dynamic-dimensional array.
pub fn to_array(tensor: &Tensor) -> Result<ArrayD<f32>> {
    let dims = tensor.dims().to_vec();
    let flat = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    Ok(ArrayD::from_shape_vec(IxDyn(&dims), flat)?)
}
