use rand::rngs::StdRng;

use crate::error::{Error, SamplexRuntimeError};
use crate::noise::NoiseModel;
use crate::tensor::TensorInterface;
use virtual_registers::distributions::Distribution;
use virtual_registers::registers::{VirtualKind, VirtualRegister};

/// Draws twirling samples: a *left* register of random group elements and a
/// *right* register holding their elementwise inverses.
#[derive(Debug, Clone)]
pub struct TwirlSamplingNode {
    pub lhs_register: String,
    pub rhs_register: String,
    pub distribution: Distribution,
}

impl TwirlSamplingNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        let info = (
            self.distribution.num_subsystems(),
            self.distribution.register_kind(),
        );
        vec![
            (self.lhs_register.clone(), info.0, info.1),
            (self.rhs_register.clone(), info.0, info.1),
        ]
    }

    pub fn sample(
        &self,
        rng: &mut StdRng,
        num_randomizations: usize,
    ) -> Result<Vec<(String, VirtualRegister)>, Error> {
        let samples = self.distribution.sample(num_randomizations, rng);
        let inverses = samples.invert();
        Ok(vec![
            (self.lhs_register.clone(), samples),
            (self.rhs_register.clone(), inverses),
        ])
    }
}

/// Signed-samples a Pauli-Lindblad noise map into a Pauli register and a
/// one-subsystem sign register.
///
/// The rates come from the input `noise_maps.<ref>`, optionally rescaled:
/// `noise_scales.<modifier>` (falling back to `noise_scales.all`) applies a
/// scalar factor and `local_scales.<modifier>` rescales each rate
/// individually.
#[derive(Debug, Clone)]
pub struct InjectNoiseNode {
    pub register: String,
    pub sign_register: String,
    pub noise_ref: String,
    pub modifier_ref: Option<String>,
    pub model: NoiseModel,
}

impl InjectNoiseNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        vec![
            (
                self.register.clone(),
                self.model.num_qubits(),
                VirtualKind::Pauli,
            ),
            (self.sign_register.clone(), 1, VirtualKind::Z2),
        ]
    }

    fn resolved_rates(&self, inputs: &TensorInterface) -> Result<Vec<f64>, Error> {
        let rates_name = format!("noise_maps.{}", self.noise_ref);
        let rates = inputs
            .get(&rates_name)
            .and_then(|tensor| tensor.as_f64())
            .ok_or_else(|| SamplexRuntimeError::InputNotFound(rates_name.clone()))?;
        let mut rates: Vec<f64> = rates.iter().copied().collect();

        if let Some(modifier) = &self.modifier_ref {
            let scale = inputs
                .get(&format!("noise_scales.{modifier}"))
                .or_else(|| inputs.get("noise_scales.all"))
                .and_then(|tensor| tensor.scalar_value())
                .unwrap_or(1.0);
            for rate in &mut rates {
                *rate *= scale;
            }
            if let Some(local) = inputs
                .get(&format!("local_scales.{modifier}"))
                .and_then(|tensor| tensor.as_f64())
            {
                for (rate, factor) in rates.iter_mut().zip(local.iter()) {
                    *rate *= factor;
                }
            }
        }
        Ok(rates)
    }

    pub fn sample(
        &self,
        rng: &mut StdRng,
        inputs: &TensorInterface,
        num_randomizations: usize,
    ) -> Result<Vec<(String, VirtualRegister)>, Error> {
        let rates = self.resolved_rates(inputs)?;
        let (paulis, signs) = self.model.signed_sample(&rates, num_randomizations, rng);
        Ok(vec![
            (self.register.clone(), paulis.into()),
            (self.sign_register.clone(), signs.into()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Dtype, Tensor, TensorSpec};
    use rand::SeedableRng;
    use virtual_registers::distributions::UniformPauli;

    #[test]
    fn twirl_sampling_writes_inverse_pairs() {
        let node = TwirlSamplingNode {
            lhs_register: "lhs".into(),
            rhs_register: "rhs".into(),
            distribution: UniformPauli::new(3).into(),
        };
        let mut rng = StdRng::seed_from_u64(0);
        let written = node.sample(&mut rng, 20).unwrap();
        assert_eq!(written.len(), 2);
        let product = written[0].1.multiply(&written[1].1, None).unwrap();
        assert_eq!(
            product,
            VirtualRegister::identity(VirtualKind::Pauli, 3, 20)
        );
    }

    #[test]
    fn noise_rates_respect_modifiers() {
        let node = InjectNoiseNode {
            register: "noise".into(),
            sign_register: "sign".into(),
            noise_ref: "my_noise".into(),
            modifier_ref: Some("mod".into()),
            model: NoiseModel::from_labels(2, &["XX", "ZI"]).unwrap(),
        };
        let mut inputs = TensorInterface::new([
            TensorSpec::new("noise_maps.my_noise", &[2], Dtype::F64),
            TensorSpec::new("noise_scales.mod", &[], Dtype::F64).optional(),
            TensorSpec::new("local_scales.mod", &[2], Dtype::F64).optional(),
        ]);
        inputs
            .bind("noise_maps.my_noise", Tensor::from_f64_slice(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(node.resolved_rates(&inputs).unwrap(), vec![1.0, 2.0]);

        inputs.bind("noise_scales.mod", Tensor::scalar(0.5)).unwrap();
        assert_eq!(node.resolved_rates(&inputs).unwrap(), vec![0.5, 1.0]);

        inputs
            .bind("local_scales.mod", Tensor::from_f64_slice(&[1.0, 0.0]))
            .unwrap();
        assert_eq!(node.resolved_rates(&inputs).unwrap(), vec![0.5, 0.0]);
    }

    #[test]
    fn missing_rates_are_a_runtime_error() {
        let node = InjectNoiseNode {
            register: "noise".into(),
            sign_register: "sign".into(),
            noise_ref: "absent".into(),
            modifier_ref: None,
            model: NoiseModel::from_labels(1, &["X"]).unwrap(),
        };
        let inputs = TensorInterface::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(node.sample(&mut rng, &inputs, 1).is_err());
    }
}
