//! Named, typed tensor bundles: the input and output interfaces of a
//! samplex.

use std::collections::{BTreeMap, HashMap};

use ndarray::{ArrayD, IxDyn};

use crate::error::{SamplexConstructionError, SamplexInputError};
use virtual_registers::registers::VirtualRegister;

/// Element dtype of an interface tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    F64,
    Bool,
    U8,
}

impl Dtype {
    pub fn name(self) -> &'static str {
        match self {
            Dtype::F64 => "f64",
            Dtype::Bool => "bool",
            Dtype::U8 => "u8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "f64" => Some(Dtype::F64),
            "bool" => Some(Dtype::Bool),
            "u8" => Some(Dtype::U8),
            _ => None,
        }
    }
}

/// A dynamically shaped tensor of one of the supported dtypes.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F64(ArrayD<f64>),
    Bool(ArrayD<bool>),
    U8(ArrayD<u8>),
}

impl Tensor {
    pub fn zeros(dtype: Dtype, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match dtype {
            Dtype::F64 => Tensor::F64(ArrayD::zeros(dim)),
            Dtype::Bool => Tensor::Bool(ArrayD::from_elem(dim, false)),
            Dtype::U8 => Tensor::U8(ArrayD::zeros(dim)),
        }
    }

    /// A 1-D f64 tensor.
    pub fn from_f64_slice(values: &[f64]) -> Self {
        Tensor::F64(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap())
    }

    /// A 0-D f64 tensor (a scalar).
    pub fn scalar(value: f64) -> Self {
        Tensor::F64(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// A 1-D u8 tensor.
    pub fn from_u8_slice(values: &[u8]) -> Self {
        Tensor::U8(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap())
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Tensor::F64(_) => Dtype::F64,
            Tensor::Bool(_) => Dtype::Bool,
            Tensor::U8(_) => Dtype::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::F64(array) => array.shape(),
            Tensor::Bool(array) => array.shape(),
            Tensor::U8(array) => array.shape(),
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            Tensor::F64(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_f64_mut(&mut self) -> Option<&mut ArrayD<f64>> {
        match self {
            Tensor::F64(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match self {
            Tensor::Bool(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_bool_mut(&mut self) -> Option<&mut ArrayD<bool>> {
        match self {
            Tensor::Bool(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&ArrayD<u8>> {
        match self {
            Tensor::U8(array) => Some(array),
            _ => None,
        }
    }

    /// The scalar value of a 0-D f64 tensor.
    pub fn scalar_value(&self) -> Option<f64> {
        match self {
            Tensor::F64(array) if array.ndim() == 0 => array.first().copied(),
            _ => None,
        }
    }
}

/// Specification of a single named tensor interface entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: Dtype,
    pub description: String,
    pub optional: bool,
    pub default: Option<Tensor>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: &[usize], dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            dtype,
            description: String::new(),
            optional: false,
            default: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, default: Tensor) -> Self {
        self.optional = true;
        self.default = Some(default);
        self
    }

    fn validate(&self, value: &Tensor) -> Result<(), SamplexInputError> {
        if value.dtype() != self.dtype {
            return Err(SamplexInputError::DtypeMismatch {
                name: self.name.clone(),
                expected: self.dtype.name(),
                found: value.dtype().name(),
            });
        }
        if value.shape() != self.shape.as_slice() {
            return Err(SamplexInputError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.shape.clone(),
                found: value.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// A bindable bundle of named tensors; the input side of `sample`.
#[derive(Debug, Clone, Default)]
pub struct TensorInterface {
    specs: BTreeMap<String, TensorSpec>,
    data: HashMap<String, Tensor>,
}

impl TensorInterface {
    pub fn new(specs: impl IntoIterator<Item = TensorSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
            data: HashMap::new(),
        }
    }

    pub fn add_spec(
        &mut self,
        spec: TensorSpec,
        overwrite: bool,
    ) -> Result<(), SamplexConstructionError> {
        if !overwrite && self.specs.contains_key(&spec.name) {
            return Err(SamplexConstructionError::DuplicateInput(spec.name));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn specs(&self) -> impl Iterator<Item = &TensorSpec> {
        self.specs.values()
    }

    pub fn spec(&self, name: &str) -> Option<&TensorSpec> {
        self.specs.get(name)
    }

    /// Binds a value after validating it against its specification.
    pub fn bind(&mut self, name: &str, value: Tensor) -> Result<&mut Self, SamplexInputError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| SamplexInputError::UnknownName(name.to_string()))?;
        spec.validate(&value)?;
        self.data.insert(name.to_string(), value);
        Ok(self)
    }

    /// The bound value, falling back to the specification default.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.data
            .get(name)
            .or_else(|| self.specs.get(name).and_then(|spec| spec.default.as_ref()))
    }

    /// Names of non-optional specifications with no bound value.
    pub fn missing(&self) -> Vec<String> {
        self.specs
            .values()
            .filter(|spec| !spec.optional && !self.data.contains_key(&spec.name))
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Whether every non-optional specification has a value.
    pub fn fully_bound(&self) -> bool {
        self.missing().is_empty()
    }
}

/// The output bundle of a single `sample` call. Every tensor carries a
/// leading `num_randomizations` axis.
#[derive(Debug, Clone, Default)]
pub struct SamplexOutput {
    specs: BTreeMap<String, TensorSpec>,
    data: BTreeMap<String, Tensor>,
    /// The register map used during sampling, retained on request.
    pub registers: Option<HashMap<String, VirtualRegister>>,
}

impl SamplexOutput {
    /// Allocates zeroed outputs with the randomizations axis prepended to
    /// each specification's trailing shape.
    pub fn allocate(
        specs: impl IntoIterator<Item = TensorSpec>,
        num_randomizations: usize,
    ) -> Self {
        let mut full_specs = BTreeMap::new();
        let mut data = BTreeMap::new();
        for spec in specs {
            let mut shape = vec![num_randomizations];
            shape.extend_from_slice(&spec.shape);
            data.insert(spec.name.clone(), Tensor::zeros(spec.dtype, &shape));
            let full = TensorSpec {
                shape,
                ..spec.clone()
            };
            full_specs.insert(spec.name, full);
        }
        Self {
            specs: full_specs,
            data,
            registers: None,
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &TensorSpec> {
        self.specs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.data.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.data.get_mut(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_validates_shape_and_dtype() {
        let mut interface =
            TensorInterface::new([TensorSpec::new("parameter_values", &[3], Dtype::F64)]);
        assert!(
            interface
                .bind("parameter_values", Tensor::from_f64_slice(&[1.0, 2.0]))
                .is_err()
        );
        assert!(
            interface
                .bind("parameter_values", Tensor::from_u8_slice(&[1, 2, 3]))
                .is_err()
        );
        assert!(
            interface
                .bind("parameter_values", Tensor::from_f64_slice(&[1.0, 2.0, 3.0]))
                .is_ok()
        );
        assert!(interface.fully_bound());
    }

    #[test]
    fn optional_specs_do_not_block_binding() {
        let interface = TensorInterface::new([
            TensorSpec::new("required", &[1], Dtype::F64),
            TensorSpec::new("maybe", &[], Dtype::F64).optional(),
        ]);
        assert_eq!(interface.missing(), vec!["required".to_string()]);
    }

    #[test]
    fn defaults_are_visible_through_get() {
        let interface = TensorInterface::new([
            TensorSpec::new("scale", &[], Dtype::F64).with_default(Tensor::scalar(1.0)),
        ]);
        assert!(interface.fully_bound());
        assert_eq!(interface.get("scale").unwrap().scalar_value(), Some(1.0));
    }

    #[test]
    fn outputs_get_a_leading_randomizations_axis() {
        let output = SamplexOutput::allocate(
            [TensorSpec::new("parameter_values", &[4], Dtype::F64)],
            10,
        );
        assert_eq!(
            output.get("parameter_values").unwrap().shape(),
            &[10usize, 4]
        );
    }
}
