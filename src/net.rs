//! Small MLP building block shared by the actor and critic networks, and
//! the hard-copy / soft-update helpers used to maintain target networks.
//!
//! Built on `candle-core`/`candle-nn`'s `VarBuilder`/`VarMap` idiom.

use candle_core::{Device, Result as CResult, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};

const HIDDEN: usize = 180;
const LEAKY_SLOPE: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputActivation {
    Tanh,
    Linear,
}

/// Three hidden layers of width 180 with a leaky-rectified activation,
/// matching the network topology specified for both the actor and the
/// critic.
pub struct Mlp {
    l1: Linear,
    l2: Linear,
    l3: Linear,
    out: Linear,
    out_activation: OutputActivation,
}

impl Mlp {
    pub fn new(
        vb: VarBuilder,
        in_dim: usize,
        out_dim: usize,
        out_activation: OutputActivation,
    ) -> CResult<Self> {
        let l1 = linear(in_dim, HIDDEN, vb.pp("l1"))?;
        let l2 = linear(HIDDEN, HIDDEN, vb.pp("l2"))?;
        let l3 = linear(HIDDEN, HIDDEN, vb.pp("l3"))?;
        let out = linear(HIDDEN, out_dim, vb.pp("out"))?;
        Ok(Mlp { l1, l2, l3, out, out_activation })
    }

    pub fn forward(&self, x: &Tensor) -> CResult<Tensor> {
        let x = leaky_relu(&self.l1.forward(x)?)?;
        let x = leaky_relu(&self.l2.forward(&x)?)?;
        let x = leaky_relu(&self.l3.forward(&x)?)?;
        let x = self.out.forward(&x)?;
        match self.out_activation {
            OutputActivation::Tanh => x.tanh(),
            OutputActivation::Linear => Ok(x),
        }
    }
}

fn leaky_relu(x: &Tensor) -> CResult<Tensor> {
    let pos = x.relu()?;
    let neg = x.neg()?.relu()?.affine(LEAKY_SLOPE, 0.0)?;
    pos - neg
}

pub fn device() -> Device {
    Device::Cpu
}

/// Hard-copies every variable in `src` into the identically-named variable
/// in `dst`. Panics (via `Result`) only on a programming error -- `dst` and
/// `src` are always built from the same layer layout in this crate.
pub fn hard_copy(dst: &VarMap, src: &VarMap) -> CResult<()> {
    let src_data = src.data().lock().unwrap();
    let dst_data = dst.data().lock().unwrap();
    for (name, dvar) in dst_data.iter() {
        let svar = src_data.get(name).expect("target/online layer layouts must match");
        dvar.set(svar.as_tensor())?;
    }
    Ok(())
}

/// Polyak (soft) update: `theta_t <- tau*theta + (1-tau)*theta_t`.
pub fn soft_update(dst: &VarMap, src: &VarMap, tau: f64) -> CResult<()> {
    let src_data = src.data().lock().unwrap();
    let dst_data = dst.data().lock().unwrap();
    for (name, dvar) in dst_data.iter() {
        let svar = src_data.get(name).expect("target/online layer layouts must match");
        let blended = svar.as_tensor().affine(tau, 0.0)?.add(&dvar.as_tensor().affine(1.0 - tau, 0.0)?)?;
        dvar.set(&blended)?;
    }
    Ok(())
}
