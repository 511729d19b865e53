use pyo3::buffer::PyBuffer;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use moe_gate::{DType, Error, Tensor, TopkSoftmaxParams};
use moe_gate_cpu::CpuTensor;

use crate::binding::{forward_topk_softmax, gating_from_bits, to_host_indices, BindingShapes};

fn to_py_err(e: Error) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn writable<T: pyo3::buffer::Element>(
    name: &str,
    obj: &Bound<'_, PyAny>,
) -> PyResult<PyBuffer<T>> {
    let buf = PyBuffer::<T>::get_bound(obj)?;
    if buf.readonly() {
        return Err(PyValueError::new_err(format!("{name} must be writable")));
    }
    Ok(buf)
}

/// Apply top-k softmax to the gating outputs.
#[pyfunction]
#[pyo3(signature = (topk_weights, topk_indices, token_expert_indices, gating_output, *, gating_dtype="f32", renormalize=false))]
fn topk_softmax(
    py: Python<'_>,
    topk_weights: &Bound<'_, PyAny>,
    topk_indices: &Bound<'_, PyAny>,
    token_expert_indices: &Bound<'_, PyAny>,
    gating_output: &Bound<'_, PyAny>,
    gating_dtype: &str,
    renormalize: bool,
) -> PyResult<()> {
    let weights_buf = writable::<f32>("topk_weights", topk_weights)?;
    let indices_buf = writable::<i32>("topk_indices", topk_indices)?;
    let sources_buf = writable::<i32>("token_expert_indices", token_expert_indices)?;

    let dtype = DType::from_name(gating_dtype)
        .ok_or_else(|| PyValueError::new_err(format!("unknown gating_dtype {gating_dtype:?}")))?;

    let (gating_shape, gating) = match dtype {
        DType::F32 => {
            let buf = PyBuffer::<f32>::get_bound(gating_output)?;
            let shape = buf.shape().to_vec();
            let data = buf.to_vec(py)?;
            (shape.clone(), CpuTensor::from_f32(&shape, &data))
        }
        DType::F16 | DType::BF16 => {
            let buf = PyBuffer::<u16>::get_bound(gating_output)?;
            let shape = buf.shape().to_vec();
            let bits = buf.to_vec(py)?;
            let tensor = gating_from_bits(&shape, dtype, &bits).map_err(to_py_err)?;
            (shape, tensor)
        }
        DType::U32 => {
            return Err(to_py_err(Error::UnsupportedDtype(format!(
                "gating output must be f32/f16/bf16, got {dtype}"
            ))))
        }
    };

    let shapes = BindingShapes::resolve(
        weights_buf.shape(),
        indices_buf.shape(),
        sources_buf.shape(),
        &gating_shape,
    )
    .map_err(to_py_err)?;
    let gating = gating.reshape(&shapes.gating_shape());
    let params = TopkSoftmaxParams::new(shapes.top_k).with_renormalize(renormalize);

    let routing = py
        .allow_threads(|| forward_topk_softmax(&gating, &params))
        .map_err(to_py_err)?;

    weights_buf.copy_from_slice(py, routing.weights.as_f32_slice())?;
    indices_buf.copy_from_slice(
        py,
        &to_host_indices(routing.indices.as_u32_slice()).map_err(to_py_err)?,
    )?;
    sources_buf.copy_from_slice(
        py,
        &to_host_indices(routing.token_expert_indices.as_u32_slice()).map_err(to_py_err)?,
    )?;
    Ok(())
}

#[pymodule]
#[pyo3(name = "_moe_C")]
fn moe_c(m: &Bound<'_, PyModule>) -> PyResult<()> {
    moe_gate_cpu::init();
    m.add_function(wrap_pyfunction!(topk_softmax, m)?)?;
    tracing::debug!("_moe_C module initialised");
    Ok(())
}
